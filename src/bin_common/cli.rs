//! Command line handling shared by the socket binaries
//!
//! Both binaries take `[config.yaml] [--flag ...]`. The config file comes
//! from the positional argument, then the binary's environment variable,
//! then the shipped default under `config/`.

use socketry::ConfigError;
use std::path::{Path, PathBuf};

/// Which binary's configuration is being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigType {
    Server,
    Client,
}

impl ConfigType {
    pub fn default_path(self) -> &'static str {
        match self {
            ConfigType::Server => "config/server.yaml",
            ConfigType::Client => "config/client.yaml",
        }
    }

    pub fn env_var_name(self) -> &'static str {
        match self {
            ConfigType::Server => "SOCKETRY_SERVER_CONFIG",
            ConfigType::Client => "SOCKETRY_CLIENT_CONFIG",
        }
    }
}

/// Parsed command line, program name excluded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// First argument not starting with `--`
    pub config: Option<PathBuf>,
    /// Every `--name` argument, dashes stripped
    pub flags: Vec<String>,
}

impl CliArgs {
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Self::default();
        for arg in args.into_iter().map(Into::into) {
            match arg.strip_prefix("--") {
                Some(flag) => parsed.flags.push(flag.to_string()),
                None if parsed.config.is_none() => parsed.config = Some(arg.into()),
                None => eprintln!("Ignoring extra argument '{}'", arg),
            }
        }
        parsed
    }

    pub fn from_env() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|flag| flag == name)
    }

    /// Explicit path, else the environment variable, else the default
    ///
    /// # Examples
    /// ```
    /// use socketry_toolkit::bin_common::{CliArgs, ConfigType};
    ///
    /// let args = CliArgs::parse(["demo.yaml", "--broadcast"]);
    /// assert_eq!(args.config_path(ConfigType::Server).to_str(), Some("demo.yaml"));
    /// assert!(args.has_flag("broadcast"));
    /// ```
    pub fn config_path(&self, config_type: ConfigType) -> PathBuf {
        if let Some(path) = &self.config {
            return path.clone();
        }
        std::env::var(config_type.env_var_name())
            .unwrap_or_else(|_| config_type.default_path().to_string())
            .into()
    }
}

/// Load `path` when it exists, otherwise fall back to defaults
///
/// A file that exists but fails to parse or validate is still an error.
pub fn load_or_default<T, F>(path: &Path, load: F) -> Result<T, ConfigError>
where
    T: Default,
    F: FnOnce(&Path) -> Result<T, ConfigError>,
{
    if path.exists() {
        load(path)
    } else {
        eprintln!("{} not found, using defaults", path.display());
        Ok(T::default())
    }
}
