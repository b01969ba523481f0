//! Proxy configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Kind of proxy and its credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProxyKind {
    Socks5 {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
    Http {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
        #[serde(default)]
        http_only: bool,
    },
    Mtproto {
        secret: String,
    },
}

/// A proxy the engine should route its traffic through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub server: String,
    pub port: u16,
    #[serde(default = "default_enable")]
    pub enable: bool,
    #[serde(flatten)]
    pub kind: ProxyKind,
}

fn default_enable() -> bool {
    true
}

impl ProxyConfig {
    /// Payload of the engine's `addProxy` request.
    pub fn to_request_payload(&self) -> Value {
        let kind = match &self.kind {
            ProxyKind::Socks5 { username, password } => json!({
                "@type": "proxyTypeSocks5",
                "username": username,
                "password": password,
            }),
            ProxyKind::Http {
                username,
                password,
                http_only,
            } => json!({
                "@type": "proxyTypeHttp",
                "username": username,
                "password": password,
                "http_only": http_only,
            }),
            ProxyKind::Mtproto { secret } => json!({
                "@type": "proxyTypeMtproto",
                "secret": secret,
            }),
        };

        json!({
            "server": self.server,
            "port": self.port,
            "enable": self.enable,
            "type": kind,
        })
    }
}
