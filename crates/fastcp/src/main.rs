//! `fastcp` — intra-cluster fast file copy.
//!
//! Copies files inside a block-replicated distributed filesystem without
//! moving block data across the network: every replica of every source
//! block is duplicated locally on the datanode that already hosts it.
//!
//! # Usage
//!
//! ```text
//! fastcp dfs://nn:8020/logs/app.log dfs://nn:8020/backup/
//! fastcp -t 10 'dfs://nn:8020/tables/part-*' dfs://nn:8020/snapshots/t1
//! fastcp -c fastcp.toml dfs://nn-a:8020/data dfs://nn-b:8020/data
//! ```
//!
//! Exits 0 on full success, 1 on a usage error, 2 when any copy failed.

mod config;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{error, info};
use url::Url;

use fastcp_engine::{CopyError, FastCopy, expand};
use fastcp_ipc::{IpcDatanodeConnector, IpcNamenode};
use fastcp_rpc::NamenodeRpc;

use config::CliConfig;

#[derive(Parser)]
#[command(
    name = "fastcp",
    version,
    about = "Intra-cluster fast file copy: duplicate blocks locally on the datanodes that already host them"
)]
struct Cli {
    /// Number of files copied concurrently.
    #[arg(short = 't', long = "threads")]
    threads: Option<usize>,

    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG).
    #[arg(long)]
    log_level: Option<String>,

    /// Source paths or glob patterns, then the destination path, all as
    /// `dfs://host:port/path` URIs.
    #[arg(required = true, num_args = 2.., value_name = "SRC... DST")]
    paths: Vec<String>,
}

/// A parsed `dfs://host:port/path` URI.
struct DfsPath {
    authority: String,
    path: String,
}

fn parse_dfs_uri(raw: &str) -> anyhow::Result<DfsPath> {
    let url = Url::parse(raw).with_context(|| format!("invalid path URI: {raw}"))?;
    if url.scheme() != "dfs" {
        bail!("unsupported scheme {:?} in {raw}, expected dfs://", url.scheme());
    }
    let host = url
        .host_str()
        .with_context(|| format!("missing namenode host in {raw}"))?;
    let port = url.port().unwrap_or(8020);
    if url.path().is_empty() || url.path() == "/" {
        bail!("missing path component in {raw}");
    }
    Ok(DfsPath {
        authority: format!("{host}:{port}"),
        path: url.path().to_string(),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version land here too; only real usage errors
            // exit non-zero.
            return ExitCode::from(u8::from(e.use_stderr()));
        }
    };

    let config = match CliConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fastcp: {e:#}");
            return ExitCode::from(1);
        }
    };
    telemetry::init(cli.log_level.as_deref().unwrap_or(&config.log.level));

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Usage(message)) => {
            eprintln!("fastcp: {message}");
            eprintln!("usage: fastcp [options] <src...> <dst>");
            ExitCode::from(1)
        }
        Err(RunError::Failed(e)) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

enum RunError {
    /// Bad arguments: print usage, exit 1.
    Usage(String),
    /// The copy itself failed: exit 2.
    Failed(anyhow::Error),
}

impl From<anyhow::Error> for RunError {
    fn from(e: anyhow::Error) -> Self {
        Self::Failed(e)
    }
}

async fn run(cli: Cli, config: CliConfig) -> Result<(), RunError> {
    let Some((destination_raw, sources)) = cli.paths.split_last() else {
        return Err(RunError::Usage("expected <src...> <dst>".to_string()));
    };

    let destination =
        parse_dfs_uri(destination_raw).map_err(|e| RunError::Usage(format!("{e:#}")))?;
    let mut source_paths = Vec::with_capacity(sources.len());
    let mut source_authority: Option<String> = None;
    for raw in sources {
        let parsed = parse_dfs_uri(raw).map_err(|e| RunError::Usage(format!("{e:#}")))?;
        match &source_authority {
            None => source_authority = Some(parsed.authority.clone()),
            Some(authority) if *authority != parsed.authority => {
                return Err(RunError::Usage(format!(
                    "all sources must share one namenode, found {authority} and {}",
                    parsed.authority
                )));
            }
            Some(_) => {}
        }
        source_paths.push(parsed.path);
    }
    let Some(source_authority) = source_authority else {
        return Err(RunError::Usage("expected at least one source".to_string()));
    };

    // One RPC connection when source and destination namenodes coincide.
    let src_namenode: Arc<dyn NamenodeRpc> = Arc::new(
        IpcNamenode::connect(source_authority.clone())
            .await
            .with_context(|| format!("failed to connect to namenode {source_authority}"))
            .map_err(RunError::Failed)?,
    );
    let dst_namenode: Arc<dyn NamenodeRpc> = if destination.authority == source_authority {
        src_namenode.clone()
    } else {
        Arc::new(
            IpcNamenode::connect(destination.authority.clone())
                .await
                .with_context(|| {
                    format!("failed to connect to namenode {}", destination.authority)
                })
                .map_err(RunError::Failed)?,
        )
    };

    let requests = match expand::expand_requests(
        &src_namenode,
        &dst_namenode,
        &source_paths,
        &destination.path,
    )
    .await
    {
        Ok(requests) => requests,
        Err(
            e @ (CopyError::DestinationMissing(_) | CopyError::DestinationNotDirectory(_)),
        ) => return Err(RunError::Usage(e.to_string())),
        Err(e) => return Err(RunError::Failed(e.into())),
    };
    info!(
        files = requests.len(),
        src = %source_authority,
        dst = %destination.authority,
        "starting fast copy"
    );

    let connector = Arc::new(IpcDatanodeConnector::new(config.datanode_timeout()));
    let engine = FastCopy::new(
        config.engine_config(cli.threads),
        src_namenode,
        dst_namenode,
        connector,
    )
    .await
    .context("failed to start the copy engine")
    .map_err(RunError::Failed)?;

    let started = Instant::now();
    let result = engine.copy_all(requests).await;
    engine.shutdown().await;

    match result {
        Ok(()) => {
            info!(elapsed = ?started.elapsed(), "fast copy finished");
            Ok(())
        }
        Err(e) => Err(RunError::Failed(
            anyhow::Error::new(e).context("fast copy failed"),
        )),
    }
}
