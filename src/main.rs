//! rig - push, wait on and tear down Kubernetes resources from manifests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rollout_rig::client::KubeClient;
use rollout_rig::manifest::{self, AnyRollout};
use rollout_rig::telemetry::{init_logging, LogFormat};

/// rig - create-or-update, cascading delete and rollout status for Kubernetes resources
#[derive(Parser, Debug)]
#[command(name = "rig", version, about, long_about = None)]
struct Cli {
    /// Log output format (text or json)
    #[arg(long, env = "RIG_LOG_FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or replace every resource in a manifest
    Upsert(UpsertArgs),

    /// Wait for every resource in a manifest to finish rolling out
    Status(StatusArgs),

    /// Delete every resource in a manifest, last document first
    ///
    /// Pods owned by workload resources are deleted after their owner.
    Delete(DeleteArgs),
}

/// Manifest source
#[derive(Args, Debug)]
struct ManifestArgs {
    /// YAML or JSON manifest, `-` for stdin
    #[arg(short = 'f', long = "filename")]
    file: PathBuf,
}

/// Retry budget for rollout status checks
#[derive(Args, Debug)]
struct RetryArgs {
    /// Number of status checks per resource (0 for the default of 60)
    #[arg(long, default_value_t = 0)]
    retry_attempts: u32,

    /// Seconds between status checks (0 for the default of 1)
    #[arg(long, default_value_t = 0)]
    retry_period_secs: u64,
}

impl RetryArgs {
    fn period(&self) -> Duration {
        Duration::from_secs(self.retry_period_secs)
    }
}

#[derive(Args, Debug)]
struct UpsertArgs {
    #[command(flatten)]
    manifest: ManifestArgs,

    /// Wait for each resource to roll out after submitting the manifest
    #[arg(long)]
    wait: bool,

    #[command(flatten)]
    retry: RetryArgs,
}

#[derive(Args, Debug)]
struct StatusArgs {
    #[command(flatten)]
    manifest: ManifestArgs,

    #[command(flatten)]
    retry: RetryArgs,
}

#[derive(Args, Debug)]
struct DeleteArgs {
    #[command(flatten)]
    manifest: ManifestArgs,

    /// Request cascading deletion (owned pods are removed either way)
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    cascade: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            trigger.cancel();
        }
    });

    let client = Arc::new(
        KubeClient::try_default()
            .await
            .context("failed to connect to the cluster")?,
    );

    match cli.command {
        Commands::Upsert(args) => run_upsert(args, client, &cancel).await,
        Commands::Status(args) => run_status(args, client, &cancel).await,
        Commands::Delete(args) => run_delete(args, client, &cancel).await,
    }
}

async fn read_manifest(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut bytes = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut bytes)
            .await
            .context("failed to read manifest from stdin")?;
        return Ok(bytes);
    }
    tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read manifest {}", path.display()))
}

async fn load(
    args: &ManifestArgs,
    client: Arc<KubeClient>,
) -> anyhow::Result<Vec<AnyRollout<KubeClient>>> {
    let bytes = read_manifest(&args.file).await?;
    let rollouts = manifest::load(&bytes, client)
        .with_context(|| format!("invalid manifest {}", args.file.display()))?;
    if rollouts.is_empty() {
        warn!(file = %args.file.display(), "manifest contains no documents");
    }
    Ok(rollouts)
}

async fn wait_all(
    rollouts: &[AnyRollout<KubeClient>],
    retry: &RetryArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    for rollout in rollouts {
        rollout
            .status(cancel, retry.retry_attempts, retry.period())
            .await
            .with_context(|| format!("{} did not roll out", rollout.id()))?;
        println!("{} rolled out", rollout.id());
    }
    Ok(())
}

async fn run_upsert(
    args: UpsertArgs,
    client: Arc<KubeClient>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut rollouts = load(&args.manifest, client).await?;
    for rollout in rollouts.iter_mut() {
        rollout
            .upsert(cancel)
            .await
            .with_context(|| format!("failed to upsert {}", rollout.id()))?;
        println!("{} configured", rollout.id());
    }
    info!(resources = rollouts.len(), "manifest applied");

    if args.wait {
        wait_all(&rollouts, &args.retry, cancel).await?;
    }
    Ok(())
}

async fn run_status(
    args: StatusArgs,
    client: Arc<KubeClient>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let rollouts = load(&args.manifest, client).await?;
    wait_all(&rollouts, &args.retry, cancel).await
}

async fn run_delete(
    args: DeleteArgs,
    client: Arc<KubeClient>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let rollouts = load(&args.manifest, client).await?;
    for rollout in rollouts.iter().rev() {
        rollout
            .delete(cancel, args.cascade)
            .await
            .with_context(|| format!("failed to delete {}", rollout.id()))?;
        println!("{} deleted", rollout.id());
    }
    Ok(())
}
