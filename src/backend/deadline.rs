//! Per-route timeouts.
//!
//! # Responsibilities
//! - Pick the response deadline for an operation
//! - Derive the stream idle timeout that must outlive that deadline
//!
//! # Design Decisions
//! - Streaming operations never get a bounded response timeout
//! - Unary idle timeout is one second past the deadline, never below the global value

use std::time::Duration;

use serde::Serialize;

pub const DEFAULT_RESPONSE_DEADLINE: Duration = Duration::from_secs(15);
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

const IDLE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseTimeout {
    Bounded { timeout_ms: u64 },
    Unbounded,
}

impl ResponseTimeout {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            ResponseTimeout::Bounded { timeout_ms } => Some(Duration::from_millis(*timeout_ms)),
            ResponseTimeout::Unbounded => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteTimeouts {
    pub response: ResponseTimeout,
    pub idle_timeout_ms: u64,
}

impl RouteTimeouts {
    pub fn compute(
        rule_deadline: Option<Duration>,
        streaming: bool,
        default_deadline: Duration,
        stream_idle_timeout: Duration,
    ) -> Self {
        if streaming {
            let idle = rule_deadline.unwrap_or_else(|| stream_idle_timeout.max(default_deadline));
            return Self {
                response: ResponseTimeout::Unbounded,
                idle_timeout_ms: millis(idle),
            };
        }

        let deadline = rule_deadline.unwrap_or(default_deadline);
        Self {
            response: ResponseTimeout::Bounded { timeout_ms: millis(deadline) },
            idle_timeout_ms: millis(stream_idle_timeout.max(deadline.saturating_add(IDLE_GRACE))),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compute(deadline: Option<u64>, streaming: bool) -> RouteTimeouts {
        RouteTimeouts::compute(
            deadline.map(Duration::from_secs),
            streaming,
            DEFAULT_RESPONSE_DEADLINE,
            DEFAULT_STREAM_IDLE_TIMEOUT,
        )
    }

    #[test]
    fn test_unary_default_deadline() {
        let t = compute(None, false);
        assert_eq!(t.response.as_duration(), Some(Duration::from_secs(15)));
        assert_eq!(t.idle_timeout_ms, 300_000);
    }

    #[test]
    fn test_unary_long_deadline_extends_idle() {
        let t = compute(Some(600), false);
        assert_eq!(t.response, ResponseTimeout::Bounded { timeout_ms: 600_000 });
        assert_eq!(t.idle_timeout_ms, 601_000);
    }

    #[test]
    fn test_streaming_is_unbounded() {
        let t = compute(Some(20), true);
        assert_eq!(t.response, ResponseTimeout::Unbounded);
        assert_eq!(t.idle_timeout_ms, 20_000);

        let t = compute(None, true);
        assert_eq!(t.response, ResponseTimeout::Unbounded);
        assert_eq!(t.idle_timeout_ms, 300_000);
    }

    #[test]
    fn test_streaming_small_global_idle_uses_default_deadline() {
        let t = RouteTimeouts::compute(
            None,
            true,
            DEFAULT_RESPONSE_DEADLINE,
            Duration::from_secs(5),
        );
        assert_eq!(t.idle_timeout_ms, 15_000);
    }

    #[test]
    fn test_max_deadline_does_not_overflow() {
        let t = RouteTimeouts::compute(
            Some(Duration::MAX),
            false,
            DEFAULT_RESPONSE_DEADLINE,
            DEFAULT_STREAM_IDLE_TIMEOUT,
        );
        assert_eq!(t.response, ResponseTimeout::Bounded { timeout_ms: u64::MAX });
        assert_eq!(t.idle_timeout_ms, u64::MAX);
    }
}
