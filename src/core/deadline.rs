use std::time::{Duration, Instant};

use crate::error::{CodescopeError, Result};

/// Wall-clock budget for one request.
///
/// Traversals call [`Deadline::check`] at each expansion step and bail out
/// with [`CodescopeError::Timeout`] once the budget is spent.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            start: Instant::now(),
            limit: Some(limit),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            start: Instant::now(),
            limit: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.limit.map_or(false, |limit| self.elapsed() >= limit)
    }

    pub fn check(&self) -> Result<()> {
        match self.limit {
            Some(limit) if self.elapsed() >= limit => Err(CodescopeError::Timeout {
                elapsed_ms: self.elapsed().as_millis(),
                limit_ms: limit.as_millis(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_expires_immediately() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert!(matches!(deadline.check(), Err(CodescopeError::Timeout { .. })));
    }

    #[test]
    fn test_unbounded_never_expires() {
        let deadline = Deadline::unbounded();
        assert!(deadline.check().is_ok());
        assert!(Deadline::after(Duration::from_secs(3600)).check().is_ok());
    }
}
