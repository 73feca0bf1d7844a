//! Configuration module.
//!
//! Provides `AppConfig` (service and channel settings), `SessionStore`
//! (remembered picks and credentials), `AppPaths` for cross-platform config
//! directories, and TOML persistence for both files.

pub mod paths;
pub mod session;
pub mod settings;

pub use paths::AppPaths;
pub use session::SessionStore;
pub use settings::{AppConfig, ChannelConfig, ReconnectPolicy, ServerConfig};
