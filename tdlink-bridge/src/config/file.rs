//! TOML file configuration structures.
//!
//! These structs directly map to the `tdlink.toml` file format.

use serde::{Deserialize, Serialize};
use tdlink_sdk::config::{ClientConfig, ProxyConfig};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub client: ClientConfig,
    pub engine: EngineConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

/// How to start the engine process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Executable speaking newline-delimited JSON on stdin/stdout.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Engine-side logging, applied right after start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub verbosity: Option<i32>,
    /// Redirect the engine log to this file.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

/// Engine log files rotate at 10 MiB unless configured otherwise.
pub const DEFAULT_MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_LOG_FILE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use tdlink_sdk::ObjectType;
    use tdlink_sdk::config::ProxyKind;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[client]
catch_timeout_secs = 10
send_patch = false
pending_update_types = ["updateNewMessage", "updateAuthorizationState"]

[engine]
command = "/usr/local/bin/engine-json"
args = ["--database", "/var/lib/engine"]

[log]
verbosity = 1
file = "/var/log/engine.log"

[proxy]
server = "127.0.0.1"
port = 1080
kind = "socks5"
username = "user"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.client.catch_timeout_secs, 10);
        assert!(!config.client.send_patch);
        assert_eq!(
            config.client.pending_update_types,
            vec![ObjectType::UpdateNewMessage, ObjectType::UpdateAuthorizationState]
        );
        assert_eq!(config.engine.args.len(), 2);

        let log = config.log.unwrap();
        assert_eq!(log.verbosity, Some(1));
        assert_eq!(log.max_file_size, DEFAULT_MAX_LOG_FILE_SIZE);

        let proxy = config.proxy.unwrap();
        assert!(proxy.enable);
        assert_eq!(
            proxy.kind,
            ProxyKind::Socks5 {
                username: "user".to_string(),
                password: String::new(),
            }
        );
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: FileConfig = toml::from_str(
            r#"
[engine]
command = "engine-json"
"#,
        )
        .unwrap();
        assert_eq!(config.client, ClientConfig::default());
        assert!(config.engine.args.is_empty());
        assert!(config.log.is_none());
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_missing_engine_section_is_rejected() {
        assert!(toml::from_str::<FileConfig>("[client]\nsend_patch = true\n").is_err());
    }
}
