use serde::{Deserialize, Serialize};

/// How a type reference holds other types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    None,
    Collection,
    Map,
    Array,
    Optional,
}

const COLLECTION_TYPES: &[&str] = &[
    "Collection",
    "Iterable",
    "List",
    "ArrayList",
    "LinkedList",
    "CopyOnWriteArrayList",
    "Vector",
    "Stack",
    "Set",
    "HashSet",
    "LinkedHashSet",
    "TreeSet",
    "SortedSet",
    "NavigableSet",
    "EnumSet",
    "Queue",
    "Deque",
    "ArrayDeque",
    "PriorityQueue",
    "Stream",
    "Flux",
    "Page",
    "Slice",
];

const MAP_TYPES: &[&str] = &[
    "Map",
    "HashMap",
    "LinkedHashMap",
    "TreeMap",
    "SortedMap",
    "NavigableMap",
    "ConcurrentMap",
    "ConcurrentHashMap",
    "EnumMap",
    "Hashtable",
    "MultiValueMap",
];

const OPTIONAL_TYPES: &[&str] = &["Optional", "Mono", "CompletableFuture", "Future"];

const PRIMITIVES: &[&str] = &[
    "boolean", "byte", "char", "short", "int", "long", "float", "double", "void",
];

/// A type as written in source, with its generic arguments broken out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeReference {
    pub raw: String,
    /// Qualified name once resolved against a workspace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<TypeReference>,
    pub container: ContainerKind,
}

impl TypeReference {
    /// Parse a type as written in source (`Map<String, List<Order>>`,
    /// `Order[]`, `? extends Item`, `String...`).
    pub fn parse(raw: &str) -> Self {
        let text = strip_type_annotations(raw.trim());

        if let Some(inner) = text
            .strip_suffix("[]")
            .or_else(|| text.strip_suffix("..."))
        {
            let element = Self::parse(inner);
            return Self {
                raw: text.to_string(),
                resolved: None,
                arguments: vec![element],
                container: ContainerKind::Array,
            };
        }

        if let Some(rest) = text.strip_prefix('?') {
            let rest = rest.trim();
            let bound = rest
                .strip_prefix("extends")
                .or_else(|| rest.strip_prefix("super"))
                .map(str::trim);
            return match bound {
                Some(bound) if !bound.is_empty() => Self::parse(bound),
                _ => Self::plain("?"),
            };
        }

        let (base, arguments) = match (text.find('<'), text.rfind('>')) {
            (Some(open), Some(close)) if close > open => {
                let args = split_top_level(&text[open + 1..close])
                    .into_iter()
                    .filter(|a| !a.is_empty())
                    .map(Self::parse)
                    .collect();
                (text[..open].trim(), args)
            }
            _ => (text, Vec::new()),
        };

        let simple = base.rsplit('.').next().unwrap_or(base);
        let container = if MAP_TYPES.contains(&simple) {
            ContainerKind::Map
        } else if COLLECTION_TYPES.contains(&simple) {
            ContainerKind::Collection
        } else if OPTIONAL_TYPES.contains(&simple) {
            ContainerKind::Optional
        } else {
            ContainerKind::None
        };

        Self {
            raw: text.to_string(),
            resolved: None,
            arguments,
            container,
        }
    }

    fn plain(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            resolved: None,
            arguments: Vec::new(),
            container: ContainerKind::None,
        }
    }

    /// The type name without generic arguments or array suffixes.
    pub fn base_name(&self) -> &str {
        if self.container == ContainerKind::Array {
            return self.arguments.first().map_or("", |e| e.base_name());
        }
        self.raw.split('<').next().unwrap_or(&self.raw).trim()
    }

    pub fn simple_name(&self) -> &str {
        let base = self.base_name();
        base.rsplit('.').next().unwrap_or(base)
    }

    pub fn is_primitive(&self) -> bool {
        self.container == ContainerKind::None && PRIMITIVES.contains(&self.raw.as_str())
    }

    pub fn is_container(&self) -> bool {
        self.container != ContainerKind::None
    }

    /// Element types a container holds, labelled by role. Maps yield key and value.
    pub fn element_types(&self) -> Vec<(&'static str, &TypeReference)> {
        match self.container {
            ContainerKind::None => Vec::new(),
            ContainerKind::Map => {
                let mut out = Vec::new();
                if let Some(key) = self.arguments.first() {
                    out.push(("key", key));
                }
                if let Some(value) = self.arguments.get(1) {
                    out.push(("value", value));
                }
                out
            }
            ContainerKind::Collection | ContainerKind::Array | ContainerKind::Optional => self
                .arguments
                .first()
                .map(|e| vec![("element", e)])
                .unwrap_or_default(),
        }
    }

    /// Every type name mentioned, outermost first.
    pub fn mentioned_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if self.container != ContainerKind::Array {
            out.push(self.base_name());
        }
        for arg in &self.arguments {
            out.extend(arg.mentioned_names());
        }
        out
    }
}

impl std::fmt::Display for TypeReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split on commas that are not nested inside `<...>`.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

/// Drop type-use annotations such as `@NonNull` from the front of a type.
fn strip_type_annotations(mut text: &str) -> &str {
    while let Some(rest) = text.strip_prefix('@') {
        let end = rest
            .find(|c: char| c.is_whitespace())
            .unwrap_or(rest.len());
        text = rest[end..].trim_start();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_nested_generics() {
        let ty = TypeReference::parse("Map<String, List<Order>>");
        assert_eq!(ty.container, ContainerKind::Map);
        assert_eq!(ty.base_name(), "Map");
        assert_eq!(ty.arguments.len(), 2);
        assert_eq!(ty.arguments[1].container, ContainerKind::Collection);
        assert_eq!(ty.arguments[1].arguments[0].raw, "Order");

        let roles: Vec<_> = ty.element_types().into_iter().map(|(r, _)| r).collect();
        assert_eq!(roles, vec!["key", "value"]);
    }

    #[test]
    fn test_arrays_and_varargs() {
        let array = TypeReference::parse("Order[]");
        assert_eq!(array.container, ContainerKind::Array);
        assert_eq!(array.base_name(), "Order");

        let varargs = TypeReference::parse("String...");
        assert_eq!(varargs.container, ContainerKind::Array);
        assert_eq!(varargs.simple_name(), "String");
    }

    #[test]
    fn test_wildcards_take_their_bound() {
        let ty = TypeReference::parse("List<? extends Item>");
        assert_eq!(ty.arguments[0].raw, "Item");
        let unbounded = TypeReference::parse("Class<?>");
        assert_eq!(unbounded.arguments[0].raw, "?");
    }

    #[test]
    fn test_qualified_and_primitive_names() {
        let ty = TypeReference::parse("java.util.Optional<com.shop.Order>");
        assert_eq!(ty.container, ContainerKind::Optional);
        assert_eq!(ty.simple_name(), "Optional");
        assert_eq!(ty.mentioned_names(), vec!["java.util.Optional", "com.shop.Order"]);

        assert!(TypeReference::parse("int").is_primitive());
        assert!(!TypeReference::parse("Integer").is_primitive());
    }

    #[test]
    fn test_strips_type_use_annotations() {
        let ty = TypeReference::parse("@NonNull String");
        assert_eq!(ty.raw, "String");
    }
}
