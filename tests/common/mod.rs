//! Shared Java fixture workspace for integration tests.

#![allow(dead_code)]

use assert_fs::prelude::*;
use assert_fs::TempDir;

use codescope::{Config, Engine};

const BASE: &str = "src/main/java/com/shop";

pub const ORDER_CONTROLLER: &str = r#"package com.shop.web;

import com.shop.domain.Order;
import com.shop.domain.OrderRequest;
import com.shop.service.OrderService;
import org.springframework.web.bind.annotation.*;

@RestController
@RequestMapping("/api/orders")
public class OrderController {

    private final OrderService orderService;

    public OrderController(OrderService orderService) {
        this.orderService = orderService;
    }

    @PostMapping
    public Order create(@RequestBody OrderRequest request) {
        return orderService.placeOrder(request);
    }

    @GetMapping("/{id}")
    public Order get(@PathVariable Long id) {
        return orderService.findOrder(id);
    }

    @GetMapping("/recent")
    public String recent() {
        return "recent";
    }
}
"#;

pub const ORDER_SERVICE: &str = r#"package com.shop.service;

import com.shop.domain.Order;
import com.shop.domain.OrderRequest;

public interface OrderService {
    Order placeOrder(OrderRequest request);

    Order findOrder(Long id);
}
"#;

pub const ORDER_SERVICE_IMPL: &str = r#"package com.shop.service;

import com.shop.domain.Order;
import com.shop.domain.OrderRequest;
import com.shop.repo.OrderRepository;
import org.springframework.stereotype.Service;

@Service
public class OrderServiceImpl implements OrderService {

    private final OrderRepository orderRepository;
    private final PricingPolicy pricingPolicy;
    private final ShopSettings settings;

    public OrderServiceImpl(OrderRepository orderRepository, PricingPolicy pricingPolicy, ShopSettings settings) {
        this.orderRepository = orderRepository;
        this.pricingPolicy = pricingPolicy;
        this.settings = settings;
    }

    @Override
    public Order placeOrder(OrderRequest request) {
        Order order = new Order();
        order.setTotal(pricingPolicy.price(request));
        return orderRepository.save(order);
    }

    @Override
    public Order findOrder(Long id) {
        return orderRepository.findById(id).orElseThrow();
    }
}
"#;

pub const PRICING_POLICY: &str = r#"package com.shop.service;

import com.shop.domain.OrderRequest;

public class PricingPolicy {

    public long price(OrderRequest request) {
        if (request.quantity() > 10) {
            return discounted(request.quantity());
        }
        return request.quantity() * 100L;
    }

    long discounted(int quantity) {
        if (quantity > 100) {
            return base(quantity);
        }
        return quantity * 90L;
    }

    long base(int quantity) {
        if (quantity <= 0) {
            return 0;
        }
        return discounted(quantity - 1);
    }
}
"#;

pub const SHOP_SETTINGS: &str = r#"package com.shop.service;

public record ShopSettings(int maxItems) {
}
"#;

/// Line 7 is inside `describe`, line 11 and 12 inside `current`.
pub const DISCOUNT_CALCULATOR: &str = r#"package com.shop.service;

public class DiscountCalculator {
    private String rate = "standard";

    public String describe(int rate) {
        return "rate " + rate;
    }

    public String current() {
        String label = rate;
        return label;
    }
}
"#;

pub const ORDER_REPOSITORY: &str = r#"package com.shop.repo;

import com.shop.domain.Order;
import org.springframework.data.jpa.repository.JpaRepository;

public interface OrderRepository extends JpaRepository<Order, Long> {
}
"#;

pub const ORDER: &str = r#"package com.shop.domain;

import java.util.List;
import javax.persistence.Entity;
import javax.persistence.Id;

@Entity
public class Order {
    @Id
    private Long id;
    private long total;
    private OrderStatus status;
    private Customer customer;
    private List<OrderLine> lines;

    public void setTotal(long total) {
        this.total = total;
    }
}
"#;

pub const CUSTOMER: &str = r#"package com.shop.domain;

import javax.persistence.Entity;

@Entity
public class Customer {
    private String name;
    private Order lastOrder;
}
"#;

pub const ORDER_LINE: &str = r#"package com.shop.domain;

public class OrderLine {
    private String sku;
    private int quantity;
    private Order order;
}
"#;

pub const ORDER_STATUS: &str = r#"package com.shop.domain;

public enum OrderStatus {
    OPEN,
    PAID,
    SHIPPED
}
"#;

pub const ORDER_REQUEST: &str = r#"package com.shop.domain;

public record OrderRequest(String customerId, int quantity) {
}
"#;

pub const BROKEN: &str = r#"package com.shop.legacy;

public class Broken {
    void oops( {
    }
}
"#;

/// Root-relative path of a fixture file, e.g. `fixture_path("service/PricingPolicy.java")`.
pub fn fixture_path(relative: &str) -> String {
    format!("{}/{}", BASE, relative)
}

/// A workspace holding a small Spring-style order service.
pub fn workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    let files = [
        ("web/OrderController.java", ORDER_CONTROLLER),
        ("service/OrderService.java", ORDER_SERVICE),
        ("service/OrderServiceImpl.java", ORDER_SERVICE_IMPL),
        ("service/PricingPolicy.java", PRICING_POLICY),
        ("service/ShopSettings.java", SHOP_SETTINGS),
        ("service/DiscountCalculator.java", DISCOUNT_CALCULATOR),
        ("repo/OrderRepository.java", ORDER_REPOSITORY),
        ("domain/Order.java", ORDER),
        ("domain/Customer.java", CUSTOMER),
        ("domain/OrderLine.java", ORDER_LINE),
        ("domain/OrderStatus.java", ORDER_STATUS),
        ("domain/OrderRequest.java", ORDER_REQUEST),
    ];
    for (path, content) in files {
        temp.child(fixture_path(path)).write_str(content).unwrap();
    }
    temp
}

/// The order workspace plus one file that does not parse.
pub fn workspace_with_broken_file() -> TempDir {
    let temp = workspace();
    temp.child(fixture_path("legacy/Broken.java"))
        .write_str(BROKEN)
        .unwrap();
    temp
}

pub fn engine(temp: &TempDir) -> Engine {
    Engine::new(temp.path(), Config::default()).unwrap()
}
