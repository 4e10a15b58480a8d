//! CLI for PopMQ
//!
//! Subcommands:
//! - `server`: run the message queue server
//! - `client`: send a single request to a running server

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use popmq::Broker;
use popmq::client::Connection;
use popmq::config::load_config_from;
use popmq::transport::start_websocket_server;
use popmq::utils::logging;

#[derive(Parser)]
#[command(name = "popmq", version, about = "Topic-based in-memory message queue")]
enum Command {
    /// Start the server
    Server {
        /// Configuration file (default: config/default.*)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Address to listen on
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Log level (error, warn, info, debug, trace)
        #[arg(short, long)]
        log_level: Option<String>,
    },
    /// Send one request to a running server
    Client {
        /// WebSocket server URL
        #[arg(long, default_value = "ws://127.0.0.1:9620")]
        url: String,
        #[command(subcommand)]
        action: Action,
    },
}

#[derive(Subcommand)]
enum Action {
    /// Publish BODY to TOPIC
    Publish { topic: String, body: String },
    /// Retrieve one message from QUEUE, waiting until one arrives
    Take {
        queue: String,
        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Subscribe QUEUE to TOPIC
    Subscribe { queue: String, topic: String },
    /// Unsubscribe QUEUE from TOPIC
    Unsubscribe { queue: String, topic: String },
}

#[tokio::main]
async fn main() {
    let cmd = Command::parse();

    let result = match cmd {
        Command::Server {
            config,
            host,
            port,
            log_level,
        } => run_server(config, host, port, log_level).await,
        Command::Client { url, action } => {
            logging::init("warn");
            run_client(&url, action).await
        }
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_server(
    config: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    log_level: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = match load_config_from(config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init(log_level.as_deref().unwrap_or("info"));
            return Err(format!("Failed to load configuration: {e}").into());
        }
    };
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }
    if let Some(level) = log_level {
        settings.log.level = level;
    }

    logging::init(&settings.log.level);

    let addr = settings.bind_addr();
    let broker = Arc::new(Broker::new());

    tokio::select! {
        result = start_websocket_server(broker, settings) => {
            result.map_err(|e| format!("Unable to listen on {addr}: {e}"))?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_client(url: &str, action: Action) -> Result<(), Box<dyn std::error::Error>> {
    let conn = Connection::connect(url).await?;

    match action {
        Action::Publish { topic, body } => {
            let subscribers = conn.publish(&topic, &body).await?;
            println!(
                "Published message ({} bytes) to {subscribers} subscribers of {topic}",
                body.len()
            );
        }
        Action::Take { queue, timeout_ms } => {
            let body = conn.take(&queue, timeout_ms.map(Duration::from_millis)).await?;
            println!("{body}");
        }
        Action::Subscribe { queue, topic } => {
            conn.subscribe(&queue, &topic).await?;
            println!("Subscribed queue ({queue}) to topic ({topic})");
        }
        Action::Unsubscribe { queue, topic } => {
            conn.unsubscribe(&queue, &topic).await?;
            println!("Unsubscribed queue ({queue}) from topic ({topic})");
        }
    }

    conn.close();
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_actions_take_queue_positionally() {
        let cmd = Command::try_parse_from(["popmq", "client", "take", "inbox", "--timeout-ms", "5"])
            .unwrap();
        match cmd {
            Command::Client {
                url,
                action: Action::Take { queue, timeout_ms },
            } => {
                assert_eq!(url, "ws://127.0.0.1:9620");
                assert_eq!(queue, "inbox");
                assert_eq!(timeout_ms, Some(5));
            }
            _ => panic!("Expected a take action"),
        }

        let cmd = Command::try_parse_from([
            "popmq", "client", "--url", "ws://h:1", "subscribe", "inbox", "news",
        ])
        .unwrap();
        assert!(matches!(
            cmd,
            Command::Client { action: Action::Subscribe { ref queue, ref topic }, .. }
                if queue == "inbox" && topic == "news"
        ));
        assert!(Command::try_parse_from(["popmq", "client", "--queue", "inbox", "take"]).is_err());
    }
}
