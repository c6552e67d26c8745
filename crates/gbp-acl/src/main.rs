//! aclrenderd - GBP ACL renderer
//!
//! Loads a resolved policy snapshot, compiles the ACLs of every renderer
//! endpoint and prints the resulting device state as JSON.

use anyhow::{bail, Context};
use clap::Parser;
use gbp_acl::{AclManager, InMemoryAclWriter, RendererConfig};
use gbp_policy::{AddressEndpointKey, PolicySnapshot};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Group-based policy to VPP ACL renderer
#[derive(Parser, Debug)]
#[command(name = "aclrenderd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Policy snapshot (JSON if the extension is .json, YAML otherwise)
    #[arg(short = 's', long)]
    snapshot: PathBuf,

    /// Renderer configuration file (YAML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Only render the endpoint with this address
    #[arg(short = 'e', long)]
    endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("--- Starting aclrenderd ---");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => RendererConfig::load_or_default(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RendererConfig::default(),
    };
    config.validate().context("validating config")?;

    let ctx = PolicySnapshot::load(&args.snapshot)
        .with_context(|| format!("loading snapshot {}", args.snapshot.display()))?
        .into_context();

    let writer = Arc::new(InMemoryAclWriter::new());
    let manager = AclManager::new(Arc::clone(&writer), config);
    manager.rebuild_multihome(&ctx);

    let endpoints: Vec<&AddressEndpointKey> = ctx
        .renderer_endpoints()
        .filter(|key| args.endpoint.as_ref().map_or(true, |addr| &key.address == addr))
        .collect();
    if endpoints.is_empty() {
        match &args.endpoint {
            Some(addr) => bail!("no renderer endpoint with address {}", addr),
            None => warn!("Snapshot has no renderer endpoints"),
        }
    }

    let mut failed = 0;
    for key in &endpoints {
        if manager.update_acls_for_endpoint(key, &ctx).await.is_err() {
            failed += 1;
        }
    }
    info!(
        "Rendered {} of {} endpoints",
        endpoints.len() - failed,
        endpoints.len()
    );

    let output = serde_json::json!({
        "acls": writer.acls(),
        "bindings": writer.bindings(),
    });
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", rendered);
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}
