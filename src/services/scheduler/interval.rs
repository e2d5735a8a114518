use std::time::Duration;

use crate::domain::models::SchedulerConfig;
use crate::domain::ports::Agent;

/// Timing of one agent: spacing after success, after failure, and the
/// execution timeout that doubles as the lock TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentInterval {
    pub interval: Duration,
    pub error_interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentIntervalProvider {
    interval: Duration,
    error_interval: Duration,
    timeout: Duration,
}

impl AgentIntervalProvider {
    pub const fn new(interval: Duration, error_interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            error_interval,
            timeout,
        }
    }

    pub const fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            Duration::from_secs(config.poll_interval_seconds),
            Duration::from_secs(config.error_interval_seconds),
            Duration::from_secs(config.agent_lock_ttl_seconds),
        )
    }

    /// Interval triple for an agent, honoring its poll override.
    ///
    /// The timeout never drops below the interval so a lock outlives the
    /// period it guards.
    pub fn interval_for(&self, agent: &dyn Agent) -> AgentInterval {
        let interval = agent
            .poll_interval_override_seconds()
            .map_or(self.interval, Duration::from_secs);
        AgentInterval {
            interval,
            error_interval: self.error_interval,
            timeout: self.timeout.max(interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<u64>);

    impl Agent for Fixed {
        fn agent_type(&self) -> &str {
            "fixed"
        }

        fn provider_name(&self) -> &str {
            "test"
        }

        fn poll_interval_override_seconds(&self) -> Option<u64> {
            self.0
        }
    }

    #[test]
    fn test_defaults_from_config() {
        let provider = AgentIntervalProvider::from_config(&SchedulerConfig::default());
        let interval = provider.interval_for(&Fixed(None));
        assert_eq!(interval.interval, Duration::from_secs(60));
        assert_eq!(interval.error_interval, Duration::from_secs(60));
        assert_eq!(interval.timeout, Duration::from_secs(240));
    }

    #[test]
    fn test_override_stretches_timeout() {
        let provider = AgentIntervalProvider::new(
            Duration::from_secs(60),
            Duration::from_secs(30),
            Duration::from_secs(120),
        );
        let interval = provider.interval_for(&Fixed(Some(600)));
        assert_eq!(interval.interval, Duration::from_secs(600));
        assert_eq!(interval.timeout, Duration::from_secs(600));
        assert_eq!(interval.error_interval, Duration::from_secs(30));
    }
}
