//! Murmur -- headless encrypted chat client.
//!
//! Reads lines from stdin and sends them to the configured peer; prints
//! delivery events and incoming messages to stdout. Configuration via CLI
//! flags, environment variables, or config file
//! (`~/.config/murmur/config.toml`).
//!
//! ```bash
//! cargo run --bin murmur -- \
//!     --api-url http://127.0.0.1:8080 --socket-url ws://127.0.0.1:8080 \
//!     --token alice --user-id alice --peer-id bob \
//!     --encryption-key "$(head -c 32 /dev/urandom | base64)"
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;
use url::Url;

use murmur::cipher::aes::AesGcmCipher;
use murmur::config::{CliArgs, ClientConfig};
use murmur::coordinator::{ChatClient, ChatConfig, ChatEvent, SendOptions};
use murmur_proto::message::MessageStatus;
use murmur::rest::HttpBackend;
use murmur::store::memory::MemoryStore;
use murmur::token::StaticToken;
use murmur::transport::socket::SocketClient;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("murmur starting");

    match run(config).await {
        Ok(()) => {
            tracing::info!("murmur exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Pulls a required setting out of the resolved config.
fn require(value: Option<String>, flag: &str) -> Result<String, String> {
    value.ok_or_else(|| format!("missing required setting: {flag}"))
}

async fn run(config: ClientConfig) -> Result<(), String> {
    let api_url = require(config.api_url.clone(), "--api-url")?;
    let user_id = require(config.user_id.clone(), "--user-id")?;
    let peer_id = require(config.peer_id.clone(), "--peer-id")?;
    let token = require(config.token.clone(), "--token")?;
    let key = require(config.encryption_key.clone(), "--encryption-key")?;
    let socket_config = config
        .to_socket_config()
        .ok_or_else(|| "missing required setting: --socket-url".to_owned())?;

    let cipher =
        AesGcmCipher::from_base64_key(&key).map_err(|e| format!("invalid encryption key: {e}"))?;
    let base = Url::parse(&api_url).map_err(|e| format!("invalid api url: {e}"))?;
    let tokens = Arc::new(StaticToken::new(token));
    let backend =
        HttpBackend::new(base, Arc::clone(&tokens)).map_err(|e| format!("http client: {e}"))?;
    let link = SocketClient::spawn(socket_config, tokens);
    let store = MemoryStore::new();

    let mut chat_config = ChatConfig::new(user_id);
    chat_config.page_size = config.page_size;
    chat_config.event_buffer = config.event_buffer;
    let (client, mut events) = ChatClient::new(cipher, backend, store, link, chat_config);
    client.initialize().await;

    println!(
        "signed in as {}; chatting with {peer_id}. Type to send, /quit to exit.",
        client.user_id()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim() == "/quit" => break,
                Ok(Some(line)) if !line.trim().is_empty() => {
                    match client.send_message(&peer_id, line.trim(), SendOptions::default()).await {
                        Ok(record) => println!("[{}] you: {}", status_label(record.status), line.trim()),
                        Err(e) => eprintln!("send failed: {e}"),
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    eprintln!("stdin error: {e}");
                    break;
                }
            },
            event = events.recv() => match event {
                Some(ChatEvent::MessageReceived { message }) => {
                    println!("{}: {}", message.sender_id, client.decrypt_message(&message));
                }
                Some(ChatEvent::StatusChanged { status, .. }) => {
                    println!("  (message {})", status_label(status));
                }
                Some(ChatEvent::ConnectionChanged(status)) => {
                    println!("  (connection: {status})");
                }
                Some(ChatEvent::TypingChanged { sender_id, is_typing }) => {
                    if is_typing {
                        println!("  ({sender_id} is typing...)");
                    }
                }
                Some(ChatEvent::ErrorRecorded(text)) => eprintln!("  (error: {text})"),
                Some(ChatEvent::MessageListChanged) => {}
                None => break,
            },
        }
    }

    client.shutdown();
    Ok(())
}

fn status_label(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Queued => "queued",
        MessageStatus::Sending => "sending",
        MessageStatus::Sent => "sent",
        MessageStatus::Delivered => "delivered",
        MessageStatus::Read => "read",
        MessageStatus::Failed => "failed",
    }
}

/// Initialize file-based logging.
///
/// Logs go to a file, never stdout (stdout is the chat surface). Returns a
/// [`WorkerGuard`] that must be held until shutdown so buffered entries are
/// flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("murmur.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
