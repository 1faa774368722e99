use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mvirt_inventory::{
    Enumerator, MemoryStore, PassConfig, PassScope, RemoteIdentity, SnapshotInventory,
};

#[derive(Parser)]
#[command(name = "mvirt-inventory")]
#[command(about = "mvirt inventory sync - mirrors a remote virtualization inventory locally")]
struct Args {
    /// Link of the endpoint being synced
    #[arg(long)]
    endpoint_link: String,

    /// Tenant links stamped on every resource (can be repeated)
    #[arg(long = "tenant")]
    tenant_links: Vec<String>,

    /// Region the endpoint belongs to
    #[arg(long)]
    region: Option<String>,

    /// Remote inventory snapshot (JSON)
    #[arg(short, long)]
    snapshot: PathBuf,

    /// Local resource state file (JSON)
    #[arg(long, default_value = "/var/lib/mvirt/inventory.json")]
    state: PathBuf,

    /// Root object to enumerate below (format: Kind:value)
    #[arg(long, default_value = "Folder:group-d1")]
    root: RemoteIdentity,

    /// Seconds between passes
    #[arg(long, default_value = "300")]
    interval: u64,

    /// Upper bound on one pass in seconds
    #[arg(long, default_value = "1800")]
    pass_timeout: u64,

    /// How long a child waits for its parent, in seconds
    #[arg(long, default_value = "60")]
    link_timeout: u64,

    /// Remote fetches in flight at once
    #[arg(long, default_value = "32")]
    max_concurrent_fetches: usize,

    /// Run a single pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("mvirt_inventory=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let scope = PassScope {
        endpoint_link: args.endpoint_link.clone(),
        tenant_links: args.tenant_links.clone(),
        region_id: args.region.clone(),
    };
    let config = PassConfig {
        pass_timeout: Duration::from_secs(args.pass_timeout),
        link_timeout: Duration::from_secs(args.link_timeout),
        max_concurrent_fetches: args.max_concurrent_fetches,
    };

    if let Some(dir) = args.state.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let store = Arc::new(
        MemoryStore::load(&args.state)
            .await
            .with_context(|| format!("Failed to load state {}", args.state.display()))?,
    );
    info!(
        "Starting mvirt-inventory for {} ({} resources known, root {})",
        scope.endpoint_link,
        store.len().await,
        args.root
    );

    loop {
        if let Err(e) = run_once(&args, &scope, &config, &store).await {
            error!("Pass failed: {:#}", e);
        }
        if args.once {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.interval)) => {}
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!("mvirt-inventory stopped");
    Ok(())
}

/// Reload the snapshot, run one pass, persist the result.
async fn run_once(
    args: &Args,
    scope: &PassScope,
    config: &PassConfig,
    store: &Arc<MemoryStore>,
) -> Result<()> {
    let remote = Arc::new(SnapshotInventory::load(&args.snapshot).await?);
    let enumerator = Enumerator::new(remote, store.clone(), config.clone());

    let result = enumerator.run_pass(scope, &args.root).await?;
    store
        .save(&args.state)
        .await
        .with_context(|| format!("Failed to save state {}", args.state.display()))?;

    info!(
        "Pass result: {}",
        serde_json::to_string(&result).unwrap_or_default()
    );
    Ok(())
}
