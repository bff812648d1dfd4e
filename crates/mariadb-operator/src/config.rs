use tokio::time::Duration;

use crate::error::ConfigError;

/// Field manager used for server-side apply and status patches.
pub const FIELD_MANAGER: &str = "mariadb-operator";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches the whole cluster
    pub watch_namespace: Option<String>,
    /// Delay after the root secret was created, before children are built
    pub bootstrap_requeue: Duration,
    /// Periodic resync of a converged object
    pub resync: Duration,
    pub error_requeue: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            bootstrap_requeue: Duration::from_secs(5),
            resync: Duration::from_secs(300),
            error_requeue: Duration::from_secs(30),
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let secs = |var: &'static str, default: Duration| match lookup(var) {
            None => Ok(default),
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Seconds { var, value }),
        };
        Ok(Self {
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
            bootstrap_requeue: secs("BOOTSTRAP_REQUEUE_SECS", defaults.bootstrap_requeue)?,
            resync: secs("RESYNC_SECS", defaults.resync)?,
            error_requeue: secs("ERROR_REQUEUE_SECS", defaults.error_requeue)?,
        })
    }
}
