//! The `utils` module provides the pieces shared across `popmq`: the error
//! types and logging setup.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::error::BrokerError;
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
        logging::init("nonsense");
    }

    #[test]
    fn level_directive_normalizes_and_falls_back() {
        assert_eq!(logging::level_directive("DEBUG"), "debug");
        assert_eq!(logging::level_directive(" warning "), "warn");
        assert_eq!(logging::level_directive("trace"), "trace");
        assert_eq!(logging::level_directive("nonsense"), "info");
        assert_eq!(logging::level_directive(""), "info");
    }

    #[test]
    fn broker_errors_use_lookup_miss_wording() {
        let err = BrokerError::NoSubscribers {
            topic: "news".to_string(),
        };
        assert_eq!(err.to_string(), "There are no subscribers for topic: news");
        assert_eq!(err.status(), 404);

        let err = BrokerError::UnknownQueue {
            queue: "inbox".to_string(),
        };
        assert_eq!(err.to_string(), "There is no queue named: inbox");
    }
}
