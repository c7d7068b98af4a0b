use anyhow::Context;
use clap::Parser;
use peerchat_core::{
    Client, Credentials, JsonFileCache, MemoryAuth, MemoryStore, SyncConfig, UserId,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const LOOPBACK_PASSWORD: &str = "peerchat-loopback";
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "peerchat-node")]
#[command(about = "Loopback peerchat node: two clients, one store")]
struct Cli {
    /// Data root for caches (overrides PEERCHAT_ROOT)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Remember --root for later runs
    #[arg(long, requires = "root")]
    save_root: bool,

    /// Name of the sending user
    #[arg(long, default_value = "alice")]
    from: String,

    /// Name of the receiving user
    #[arg(long, default_value = "bob")]
    to: String,

    /// Messages to send
    messages: Vec<String>,
}

/// One signed-in client with its own auth session and file cache.
struct Device {
    name: String,
    id: UserId,
    client: Client,
}

impl Device {
    async fn join(name: &str, store: Arc<MemoryStore>, config: &SyncConfig) -> anyhow::Result<Self> {
        let email = format!("{}@peerchat.local", name.trim().to_lowercase());
        let cache_dir = config.user_cache_dir(&email);
        let cache = JsonFileCache::new(cache_dir.clone())
            .await
            .with_context(|| format!("opening cache at {:?}", cache_dir))?;

        let auth = Arc::new(MemoryAuth::with_cost(config.password_cost));
        let client = Client::new(config.clone(), auth, store, Arc::new(cache));
        let user = client
            .accounts()
            .sign_in_or_register(&Credentials::new(name, email, LOOPBACK_PASSWORD))
            .await?;

        info!("{} signed in as {}", name, user.id);
        Ok(Self {
            name: name.to_string(),
            id: user.id,
            client,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    if cli.from.trim().eq_ignore_ascii_case(cli.to.trim()) {
        anyhow::bail!("--from and --to must name different users");
    }

    if let Some(root) = &cli.root {
        peerchat_common::set_peerchat_root(root);
        if cli.save_root {
            peerchat_common::save_persistent_root(root.clone())?;
        }
    }
    let root = peerchat_common::init_structure()?;

    info!("=== peerchat loopback node [crate: peerchat-node] ===");
    info!("Data root: {:?}", root);

    let config = SyncConfig::from_env()?;
    config.ensure_dirs().await?;

    let messages = if cli.messages.is_empty() {
        vec!["hi".to_string()]
    } else {
        cli.messages
    };

    let store = Arc::new(MemoryStore::new());
    let sender = Device::join(&cli.from, store.clone(), &config).await?;
    let receiver = Device::join(&cli.to, store.clone(), &config).await?;

    let mut roster = sender.client.roster().await?;
    if let Some(others) = roster.next().await {
        for profile in others? {
            info!("Roster of {}: {} ({})", sender.name, profile.display_name(), profile.id);
        }
    }
    roster.unsubscribe();

    let mut outgoing = sender.client.open_conversation(&receiver.id).await?;
    let mut incoming = receiver.client.open_conversation(&sender.id).await?;
    info!("Conversation {}", outgoing.id());

    outgoing.wait_live().await?;
    incoming.wait_live().await?;

    for text in &messages {
        outgoing.send(text).await?;
    }

    let expected = messages.len();
    let view = tokio::time::timeout(
        DELIVERY_TIMEOUT,
        incoming.wait_until(|view| view.messages.len() >= expected),
    )
    .await
    .context("timed out waiting for delivery")??;

    for message in view.messages.iter() {
        let who = if message.is_from(&sender.id) {
            &sender.name
        } else {
            &receiver.name
        };
        println!("[{}] {}: {}", message.created_at.format("%H:%M:%S%.3f"), who, message.text);
    }

    outgoing.close().await;
    incoming.close().await;
    sender.client.sign_out().await?;
    receiver.client.sign_out().await?;

    info!("Done");
    Ok(())
}
