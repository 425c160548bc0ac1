//! APC daemon
//!
//! Runs the APC election on one segment interface and connects it to the
//! rest of the access point.
//!
//! # Components
//!
//! - **Config**: YAML configuration with validation
//! - **Proxy**: controls the authentication proxy over a Unix socket
//! - **Notifier**: publishes confirmed status to a state file and metrics
//! - **HTTP server**: Prometheus `/metrics`, `/status` and `/neighbors`

pub mod config;
pub mod http_server;
pub mod metrics;
pub mod notifier;
pub mod proxy;
pub mod server;

pub use config::{Config, ConfigError};
pub use http_server::MetricsServer;
pub use metrics::MetricsRegistry;
pub use notifier::StatusNotifier;
pub use proxy::UnixSocketAuthProxy;
pub use server::ApcServer;
