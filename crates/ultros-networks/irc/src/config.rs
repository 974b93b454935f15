//! Configuration of one IRC network.
//!
//! Loaded from the network's file in the config directory, e.g.
//! `networks/libera.toml`:
//!
//! ```toml
//! type = "irc"
//! host = "irc.libera.chat"
//! port = 6697
//! tls = true
//! nickname = "Ultros"
//! channels = ["#ultros"]
//! ```

use serde::{Deserialize, Serialize};
use ultros_core::{Endpoint, NetworkError, NetworkResult};

/// Connection and identity settings for an IRC network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrcConfig {
    /// Server host name.
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Connect over TLS.
    #[serde(default)]
    pub tls: bool,

    /// Skip TLS certificate verification. Only for testing.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default = "default_nickname")]
    pub nickname: String,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_realname")]
    pub realname: String,

    /// Server password, sent as `PASS` before registering.
    #[serde(default)]
    pub password: Option<String>,

    /// Channels to join once registered.
    #[serde(default)]
    pub channels: Vec<String>,
}

fn default_port() -> u16 {
    6667
}

fn default_nickname() -> String {
    "Ultros".to_owned()
}

fn default_username() -> String {
    "ultros".to_owned()
}

fn default_realname() -> String {
    "Ultros".to_owned()
}

impl IrcConfig {
    /// A config for `host` with every other field at its default.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            tls: false,
            accept_invalid_certs: false,
            nickname: default_nickname(),
            username: default_username(),
            realname: default_realname(),
            password: None,
            channels: Vec::new(),
        }
    }

    /// The endpoint to dial.
    pub fn endpoint(&self) -> Endpoint {
        if self.tls {
            Endpoint::Tls {
                host: self.host.clone(),
                port: self.port,
                accept_invalid_certs: self.accept_invalid_certs,
            }
        } else {
            Endpoint::tcp(&self.host, self.port)
        }
    }

    /// Rejects settings that cannot produce a valid registration.
    pub fn validate(&self) -> NetworkResult<()> {
        if self.host.trim().is_empty() {
            return Err(NetworkError::config("IRC host must not be empty"));
        }
        for (field, value) in [
            ("nickname", &self.nickname),
            ("username", &self.username),
        ] {
            if value.is_empty() || value.contains([' ', '\r', '\n', '\0']) {
                return Err(NetworkError::config(format!(
                    "IRC {field} {value:?} must be a single non-empty word"
                )));
            }
        }
        if let Some(channel) = self
            .channels
            .iter()
            .find(|channel| channel.is_empty() || channel.contains([' ', ',', '\r', '\n', '\0']))
        {
            return Err(NetworkError::config(format!("invalid IRC channel {channel:?}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_toml() {
        let config: IrcConfig = toml::from_str("type = \"irc\"\nhost = \"irc.example.net\"\n").unwrap();
        assert_eq!(config, IrcConfig::new("irc.example.net"));
        assert_eq!(config.endpoint(), Endpoint::tcp("irc.example.net", 6667));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r##"
host: irc.libera.chat
port: 6697
tls: true
nickname: Bot
username: bot
realname: The Bot
password: hunter2
channels: ["#one", "#two"]
"##;
        let config: IrcConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.endpoint(), Endpoint::tls("irc.libera.chat", 6697));
        assert_eq!(config.password.as_deref(), Some("hunter2"));
        assert_eq!(config.channels, vec!["#one", "#two"]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = IrcConfig::new(" ");
        assert!(matches!(config.validate(), Err(NetworkError::Config(_))));

        config.host = "irc.example.net".into();
        config.nickname = "two words".into();
        assert!(config.validate().is_err());

        config.nickname = "Ultros".into();
        config.channels = vec!["#a,#b".into()];
        assert!(config.validate().is_err());
    }
}
