//! Integration test: Configuration utilities
//!
//! Tests config path lookup and loading the shipped YAML files.

use socketry_toolkit::bin_common::{load_or_default, CliArgs, ConfigType};
use socketry_toolkit::socketry::{ClientConfig, ConfigError, ServerConfig, TransportKind};
use std::env;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

#[test]
fn test_client_config_default_path() {
    env::remove_var("SOCKETRY_CLIENT_CONFIG");

    let config_path = CliArgs::parse(["--broadcast"]).config_path(ConfigType::Client);
    assert_eq!(config_path.to_str().unwrap(), "config/client.yaml");
}

#[test]
fn test_server_config_path_from_env() {
    env::set_var("SOCKETRY_SERVER_CONFIG", "/etc/socketry/server.yaml");
    let config_path = CliArgs::default().config_path(ConfigType::Server);
    env::remove_var("SOCKETRY_SERVER_CONFIG");

    assert_eq!(config_path.to_str().unwrap(), "/etc/socketry/server.yaml");
}

#[test]
fn test_positional_path_wins() {
    let config_path = CliArgs::parse(["custom/path.yaml"]).config_path(ConfigType::Client);

    assert_eq!(config_path.to_str().unwrap(), "custom/path.yaml");
}

#[test]
fn test_shipped_server_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/server.yaml");
    let config = ServerConfig::load(path).unwrap();

    assert_eq!(config.transport, TransportKind::Ws);
    assert_eq!(config.path, "/");
    assert_eq!(config.max_connections, 1000);
    assert_eq!(config.ping_interval(), Some(Duration::from_secs(30)));
    assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
}

#[test]
fn test_shipped_client_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/client.yaml");
    let config = ClientConfig::load(path).unwrap();

    assert_eq!(config.transport, TransportKind::Ws);
    assert!(config.auto_reconnect);
    assert_eq!(config.max_reconnects, 0);
    assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
    assert_eq!(
        config.headers.get("User-Agent").map(String::as_str),
        Some("socketry-client/0.1")
    );
}

#[test]
fn test_partial_yaml_uses_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "bind_address: \"0.0.0.0:9000\"").unwrap();
    writeln!(file, "transport: tcp").unwrap();

    let config = ServerConfig::load(file.path()).unwrap();
    assert_eq!(config.transport, TransportKind::Tcp);
    assert_eq!(config.read_buffer_size, 4096);
    assert_eq!(config.write_timeout(), Duration::from_secs(10));
}

#[test]
fn test_invalid_heartbeat_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "ping_interval_ms: 5000").unwrap();
    writeln!(file, "pong_wait_ms: 1000").unwrap();

    assert!(matches!(
        ServerConfig::load(file.path()),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn test_load_or_default_rejects_bad_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "pong_wait_ms: 10").unwrap();
    writeln!(file, "ping_interval_ms: 20").unwrap();

    assert!(matches!(
        load_or_default(file.path(), |path| ServerConfig::load(path)),
        Err(ConfigError::ValidationError(_))
    ));
    let defaults =
        load_or_default(Path::new("does/not/exist.yaml"), |path| ClientConfig::load(path)).unwrap();
    assert_eq!(defaults.reconnect_delay(), Duration::from_secs(5));
}

#[test]
fn test_missing_file_is_a_file_error() {
    assert!(matches!(
        ServerConfig::load("does/not/exist.yaml"),
        Err(ConfigError::FileError(_))
    ));
}
