//! Alternator CLI - inspect and exercise the bridge from a terminal.
//!
//! This is the binary entry point. See the `alternator_bridge` library for
//! the core functionality.

use std::sync::Arc;

use alternator_bridge::bridge::peer::WebPeer;
use alternator_bridge::bridge::transport::payload_from_script;
use alternator_bridge::bridge::{
    BridgeHandler, Coordinate, Envelope, MessageType, Payload, ScriptQueue, TokenError,
    TokenProvider, MESSAGE_CHANNEL,
};
use alternator_bridge::storage::{FileStore, KeyValueStore, MemoryStore};
use alternator_bridge::{Alternator, Config, Environment};
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "alternator")]
#[command(version)]
#[command(about = "Encrypted native/web bridge for the Alternator charging flow")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change the backend environment
    Env {
        #[command(subcommand)]
        action: EnvAction,
    },
    /// Print the URL the web view should load (consumes a saved path)
    Url,
    /// Run a handshake and a few messages against an in-process web page
    Simulate {
        /// Token handed out by the simulated token provider
        #[arg(long, default_value = "abc123")]
        token: String,
    },
}

#[derive(Subcommand)]
enum EnvAction {
    /// Print the active environment and its URLs
    Show,
    /// Persist a new environment (staging or production)
    Set {
        /// Environment name
        environment: Environment,
    },
}

/// Token provider that always returns the same token.
struct StaticToken(String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn refresh_token(&self) -> Result<String, TokenError> {
        Ok(self.0.clone())
    }
}

/// Prints bridge events to stdout.
struct PrintingHandler;

impl BridgeHandler for PrintingHandler {
    fn on_message(&self, envelope: &Envelope) {
        println!("  <- {} {:?}", envelope.message_type, envelope.data);
    }

    fn on_error(&self, message: &str) {
        println!("  !! {message}");
    }

    fn on_loading_changed(&self, loading: bool) {
        println!("  <- loading={loading}");
    }

    fn on_established(&self) {
        println!("  == bridge established");
    }

    fn on_navigate(&self, coordinate: Coordinate, label: Option<&str>) {
        println!(
            "  <- navigate to {},{} ({})",
            coordinate.latitude,
            coordinate.longitude,
            label.unwrap_or("unnamed")
        );
    }
}

fn open_store(config: &Config) -> Result<FileStore> {
    let path = config.storage_path()?;
    FileStore::open(&path).with_context(|| format!("Failed to open store at {}", path.display()))
}

async fn simulate(token: String) -> Result<()> {
    let config = Config::load()?;
    let (queue, mut scripts) = ScriptQueue::channel();
    let alternator = Alternator::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(StaticToken(token)),
        Arc::new(queue),
        Arc::new(PrintingHandler),
    )?;
    let handle = alternator.handle();
    let mut peer = WebPeer::new();

    println!("web -> native: handshake request");
    handle.on_script_message(MESSAGE_CHANNEL, Some(&peer.handshake_request()))?;

    let script = scripts.recv().await.context("Bridge closed before responding")?;
    println!("native -> web: {script}");
    let payload = payload_from_script(&script).context("Unexpected script format")?;
    let response = peer.accept_response(payload)?;
    println!(
        "web: handshake accepted, jwt={}",
        response.data.jwt.as_deref().unwrap_or("<none>")
    );

    println!("web -> native: LOADING (sealed)");
    let sealed = peer.seal(&Envelope::new(MessageType::Loading, Payload::setting(true)))?;
    handle.on_script_message(MESSAGE_CHANNEL, Some(&sealed))?;

    println!("web -> native: TOKEN (sealed)");
    let sealed = peer.seal(&Envelope::new(MessageType::Token, Payload::default()))?;
    handle.on_script_message(MESSAGE_CHANNEL, Some(&sealed))?;

    let script = scripts.recv().await.context("Bridge closed before renewing")?;
    let payload = payload_from_script(&script).context("Unexpected script format")?;
    let renewed = peer.open(payload)?;
    println!(
        "native -> web: {} value={}",
        renewed.message_type,
        renewed.data.value.as_deref().unwrap_or("<none>")
    );

    alternator.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Env { action } => {
            let config = Config::load()?;
            let store = open_store(&config)?;
            let store: &dyn KeyValueStore = &store;
            match action {
                EnvAction::Show => {
                    let env = Environment::active(store);
                    println!("environment: {env}");
                    println!("web url:     {}", config.web_url(env));
                    println!("profile url: {}", config.profile_url(env));
                }
                EnvAction::Set { environment } => {
                    environment.activate(store)?;
                    println!("environment set to {environment}");
                }
            }
        }
        Commands::Url => {
            let config = Config::load()?;
            let store = open_store(&config)?;
            let store: &dyn KeyValueStore = &store;
            let env = config.environment.unwrap_or_else(|| Environment::active(store));
            println!(
                "{}",
                alternator_bridge::env::page_url(&config.web_url(env), store, chrono::Utc::now())
            );
        }
        Commands::Simulate { token } => simulate(token).await?,
    }

    Ok(())
}
