//! Socketry Toolkit - Main Library
//!
//! Ties the `socketry` connection core to the command-line binaries.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//! - **socketry**: Client sessions, server and transports (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,no_run
//! use socketry_toolkit::bin_common::{load_or_default, CliArgs, ConfigType};
//! use socketry_toolkit::socketry::ServerConfig;
//!
//! let path = CliArgs::from_env().config_path(ConfigType::Server);
//! let config = load_or_default(&path, |path| ServerConfig::load(path));
//! ```

// Re-export workspace libraries for convenience
pub use socketry;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{load_or_default, CliArgs, ConfigType};
    pub use runner::{init_tracing, BinaryRunner, RunConfig, ShutdownManager};
}
