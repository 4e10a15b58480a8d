use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the server, the broker and logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the server will bind to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the broker.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    /// Connections beyond this are refused at accept time.
    pub max_connections: usize,
    /// Default wait for a `take` before giving up. `0` waits until disconnect.
    pub take_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub max_connections: Option<usize>,
    pub take_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 9620,
            },
            broker: BrokerSettings {
                max_connections: 1000,
                take_timeout_ms: 0,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fill every value missing from `partial` with the default.
    pub fn merged(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let server = partial.server;
        let broker = partial.broker;
        let log = partial.log;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
            },
            broker: BrokerSettings {
                max_connections: broker
                    .as_ref()
                    .and_then(|b| b.max_connections)
                    .unwrap_or(default.broker.max_connections),
                take_timeout_ms: broker
                    .as_ref()
                    .and_then(|b| b.take_timeout_ms)
                    .unwrap_or(default.broker.take_timeout_ms),
            },
            log: LogSettings {
                level: log
                    .and_then(|l| l.level)
                    .unwrap_or(default.log.level),
            },
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
