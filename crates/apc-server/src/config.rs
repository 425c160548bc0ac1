//! Configuration loading and validation for the APC daemon

use apc::ApcConfig;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Invalid election settings: {0}")]
    Election(#[from] common::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub interface: InterfaceSettings,

    #[serde(default)]
    pub election: ElectionSettings,

    #[serde(default)]
    pub auth_proxy: AuthProxySettings,

    #[serde(default)]
    pub status: StatusSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.interface.validate()?;
        self.election.validate()?;
        self.auth_proxy.validate()?;
        self.status.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}

/// Segment interface settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct InterfaceSettings {
    #[validate(length(min = 1, max = 15))]
    pub name: String,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_poll_interval")]
    pub address_poll: Duration,
}

/// Election protocol settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ElectionSettings {
    pub group_id: u32,

    pub priority: u8,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_hello_interval")]
    pub hello_interval: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_whole_seconds")]
    pub dead_interval: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_whole_seconds")]
    pub wait_interval: Duration,

    #[validate(range(min = 1))]
    pub port: u16,

    pub broadcast_addr: Ipv4Addr,

    #[validate(range(min = 1, max = 100))]
    pub stability_cycles: u32,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_heartbeat")]
    pub heartbeat: Duration,
}

/// External authentication proxy controller
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AuthProxySettings {
    pub enabled: bool,

    #[validate(length(min = 1), custom = "validate_socket_path")]
    pub socket: String,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_request_timeout")]
    pub timeout: Duration,

    #[validate(range(min = 1, max = 1024))]
    pub queue: usize,
}

/// Status publication
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StatusSettings {
    /// JSON file rewritten on every published status
    #[validate(custom = "validate_state_file")]
    pub state_file: Option<String>,
}

/// HTTP endpoint for metrics and status
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,

    #[validate(length(min = 1))]
    pub listen_addr: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

// Default implementations

impl Default for InterfaceSettings {
    fn default() -> Self {
        let defaults = ApcConfig::default();
        Self {
            name: defaults.interface,
            address_poll: defaults.address_poll_interval,
        }
    }
}

impl Default for ElectionSettings {
    fn default() -> Self {
        let defaults = ApcConfig::default();
        Self {
            group_id: defaults.group_id,
            priority: defaults.priority,
            hello_interval: defaults.hello_period(),
            dead_interval: defaults.dead_period(),
            wait_interval: defaults.wait_period(),
            port: defaults.port,
            broadcast_addr: defaults.broadcast_addr,
            stability_cycles: defaults.stability_cycles,
            heartbeat: defaults.heartbeat_interval,
        }
    }
}

impl Default for AuthProxySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            socket: "/var/run/apc/auth-proxy.sock".to_string(),
            timeout: Duration::from_secs(5),
            queue: apc::DEFAULT_DISPATCH_QUEUE,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9570".to_string(),
        }
    }
}

// Custom validators

fn validate_socket_path(path: &str) -> Result<(), ValidationError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("socket_path_empty"));
    }

    // Must be absolute path or relative (starting with ./)
    if !trimmed.starts_with('/') && !trimmed.starts_with("./") {
        return Err(ValidationError::new("socket_path_invalid_format"));
    }

    Ok(())
}

fn validate_state_file(path: &str) -> Result<(), ValidationError> {
    validate_socket_path(path).map_err(|_| ValidationError::new("state_file_invalid_format"))
}

fn validate_whole_seconds(interval: &Duration) -> Result<(), ValidationError> {
    if interval.subsec_nanos() != 0 || interval.as_secs() == 0 {
        return Err(ValidationError::new("interval_not_whole_seconds"));
    }
    if interval.as_secs() > u32::MAX as u64 {
        return Err(ValidationError::new("interval_too_large"));
    }
    Ok(())
}

fn validate_hello_interval(interval: &Duration) -> Result<(), ValidationError> {
    validate_whole_seconds(interval)?;
    // Carried in 16 bits on the wire
    if interval.as_secs() > u16::MAX as u64 {
        return Err(ValidationError::new("hello_interval_too_large"));
    }
    Ok(())
}

fn validate_poll_interval(interval: &Duration) -> Result<(), ValidationError> {
    let millis = interval.as_millis();
    if !(100..=60_000).contains(&millis) {
        return Err(ValidationError::new("address_poll_out_of_range"));
    }
    Ok(())
}

fn validate_heartbeat(interval: &Duration) -> Result<(), ValidationError> {
    if interval.as_secs() < 1 || interval.as_secs() > 3600 {
        return Err(ValidationError::new("heartbeat_out_of_range"));
    }
    Ok(())
}

fn validate_request_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if !(10..=60_000).contains(&millis) {
        return Err(ValidationError::new("timeout_out_of_range"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from an explicit path or the default search paths
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            tracing::info!("Loading configuration from: {}", path.display());
            return Self::load_from_file(path);
        }

        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.check()?;
        Ok(config)
    }

    /// Field validation plus the cross-field protocol rules
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        self.to_apc_config().validate()?;
        Ok(())
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/apc/apcd.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./apcd.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/apc/apcd.yaml"))
    }

    /// Protocol parameters for the election
    pub fn to_apc_config(&self) -> ApcConfig {
        let e = &self.election;
        ApcConfig {
            interface: self.interface.name.clone(),
            group_id: e.group_id,
            priority: e.priority,
            hello_interval: e.hello_interval.as_secs().min(u16::MAX as u64) as u16,
            dead_interval: e.dead_interval.as_secs().min(u32::MAX as u64) as u32,
            wait_interval: e.wait_interval.as_secs().min(u32::MAX as u64) as u32,
            port: e.port,
            broadcast_addr: e.broadcast_addr,
            stability_cycles: e.stability_cycles,
            heartbeat_interval: e.heartbeat,
            address_poll_interval: self.interface.address_poll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_valid_yaml_parsing() {
        let yaml = r#"
interface:
  name: br-lan
  address_poll: 2s

election:
  group_id: 12
  priority: 50
  hello_interval: 5s
  dead_interval: 20s
  wait_interval: 20s
  stability_cycles: 2
  heartbeat: 30s

auth_proxy:
  socket: "/tmp/proxy.sock"
  timeout: 500ms

status:
  state_file: "/tmp/apc/state.json"
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.check().is_ok());
        assert_eq!(config.interface.name, "br-lan");
        assert_eq!(config.auth_proxy.timeout, Duration::from_millis(500));

        let apc = config.to_apc_config();
        assert_eq!(apc.group_id, 12);
        assert_eq!(apc.priority, 50);
        assert_eq!(apc.hello_interval, 5);
        assert_eq!(apc.dead_interval, 20);
        assert_eq!(apc.stability_cycles, 2);
        assert_eq!(apc.address_poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
election:
  priority: 0
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.check().is_ok());

        let apc = config.to_apc_config();
        assert_eq!(apc.priority, 0);
        assert_eq!(apc.hello_interval, 10);
        assert_eq!(apc.dead_interval, 40);
        assert_eq!(apc.wait_interval, 40);
        assert_eq!(apc.port, apc::APC_ELECTION_PORT);
        assert_eq!(apc.interface, "br-wan");
    }

    #[test]
    fn test_fractional_hello_interval_rejected() {
        let yaml = r#"
election:
  hello_interval: 1500ms
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dead_interval_must_exceed_hello() {
        let yaml = r#"
election:
  hello_interval: 10s
  dead_interval: 10s
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert!(matches!(config.check(), Err(ConfigError::Election(_))));
    }

    #[test]
    fn test_invalid_stability_cycles() {
        let yaml = r#"
election:
  stability_cycles: 0
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_socket_path_validation() {
        // Valid paths
        assert!(validate_socket_path("/tmp/test.sock").is_ok());
        assert!(validate_socket_path("/var/run/apc/auth-proxy.sock").is_ok());
        assert!(validate_socket_path("./test.sock").is_ok());

        // Invalid paths
        assert!(validate_socket_path("").is_err());
        assert!(validate_socket_path("   ").is_err());
        assert!(validate_socket_path("relative/path.sock").is_err());
    }

    #[test]
    fn test_invalid_state_file() {
        let yaml = r#"
status:
  state_file: "state.json"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interface_name_length() {
        let yaml = r#"
interface:
  name: "a-very-long-interface-name"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/apcd.yaml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
