//! Process-level configuration consumed at init.
//!
//! All values have defaults. Override via environment variables (prefixed
//! `GRADLINK_`) or by constructing a custom `GradlinkConfig`.

/// Environment variables the engine reads for transport and membership setup.
const ENV_TRANSPORT: &str = "GRADLINK_TRANSPORT";
const ENV_PM_MODE: &str = "GRADLINK_PM_MODE";
const ENV_WORLD_SIZE: &str = "GRADLINK_WORLD_SIZE";
const ENV_COORDINATOR_ADDR: &str = "GRADLINK_COORDINATOR_ADDR";

/// Transport and cluster-membership settings handed to the engine at init.
#[derive(Debug, Clone)]
pub struct GradlinkConfig {
    /// Transport fabric the engine should use.
    pub transport: String,

    /// Process-management mode; `resizable` enables elastic membership.
    pub pm_mode: String,

    /// Target world size the resize policy aims for.
    pub world_size: u32,

    /// Address of the coordination service used for rank discovery.
    pub coordinator_addr: Option<String>,
}

impl Default for GradlinkConfig {
    fn default() -> Self {
        Self {
            transport: "ofi".to_string(),
            pm_mode: "resizable".to_string(),
            world_size: 1,
            coordinator_addr: None,
        }
    }
}

impl GradlinkConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `GRADLINK_TRANSPORT`
    /// - `GRADLINK_PM_MODE`
    /// - `GRADLINK_WORLD_SIZE`
    /// - `GRADLINK_COORDINATOR_ADDR`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var(ENV_TRANSPORT) {
            cfg.transport = v;
        }
        if let Ok(v) = std::env::var(ENV_PM_MODE) {
            cfg.pm_mode = v;
        }
        if let Ok(v) = std::env::var(ENV_WORLD_SIZE) {
            if let Ok(n) = v.parse::<u32>() {
                cfg.world_size = n;
            }
        }
        if let Ok(v) = std::env::var(ENV_COORDINATOR_ADDR) {
            cfg.coordinator_addr = Some(v);
        }

        cfg
    }

    /// Config for joining a coordinated cluster of `world_size` workers.
    pub fn for_cluster(coordinator_addr: impl Into<String>, world_size: u32) -> Self {
        Self {
            world_size,
            coordinator_addr: Some(coordinator_addr.into()),
            ..Self::default()
        }
    }

    /// Publish the settings into the process environment for the engine to
    /// pick up when it bootstraps. Must run before the engine initializes.
    pub fn apply_env(&self) {
        std::env::set_var(ENV_TRANSPORT, &self.transport);
        std::env::set_var(ENV_PM_MODE, &self.pm_mode);
        std::env::set_var(ENV_WORLD_SIZE, self.world_size.to_string());
        if let Some(addr) = &self.coordinator_addr {
            std::env::set_var(ENV_COORDINATOR_ADDR, addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = GradlinkConfig::default();
        assert_eq!(cfg.transport, "ofi");
        assert_eq!(cfg.pm_mode, "resizable");
        assert_eq!(cfg.world_size, 1);
        assert!(cfg.coordinator_addr.is_none());
    }

    #[test]
    fn test_for_cluster() {
        let cfg = GradlinkConfig::for_cluster("10.0.0.1:7777", 8);
        assert_eq!(cfg.world_size, 8);
        assert_eq!(cfg.coordinator_addr.as_deref(), Some("10.0.0.1:7777"));
        assert_eq!(cfg.transport, "ofi");
    }
}
