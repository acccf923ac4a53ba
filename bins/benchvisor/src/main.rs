use anyhow::{anyhow, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};

use benchvisor_common::{ConfigError, CrashPolicy, HarnessError};
use benchvisor_harness::{parse_duration, Harness, HarnessConfig, KvConfig, TpccConfig, WorkloadConfig};

/// Benchvisor - run a workload against an ephemeral single-node server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML); flags override its values
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Hostname the server listens on
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server binary (defaults to $COCKROACH_BIN)
    #[arg(long = "cockroachdb-bin", value_name = "PATH", global = true)]
    cockroachdb_bin: Option<PathBuf>,

    /// Base directory for the ephemeral store and log directories
    #[arg(long = "tmp", value_name = "DIR", global = true)]
    tmp: Option<PathBuf>,

    /// GOMAXPROCS for the server; 0 or less detects the host parallelism
    #[arg(long, allow_negative_numbers = true, global = true)]
    threads: Option<i64>,

    /// First port; the instance uses it for SQL and the next one for HTTP
    #[arg(long, global = true)]
    base_port: Option<u16>,

    /// Operation cap per core (0 means unbounded)
    #[arg(long, global = true)]
    max_ops: Option<u64>,

    /// Fail the readiness wait as soon as the server exits
    #[arg(long, global = true)]
    fail_fast: bool,

    /// Deadline for the whole cluster to become ready (e.g. 60s, 2m)
    #[arg(long, value_parser = parse_duration, global = true)]
    readiness_timeout: Option<Duration>,

    /// Time between SIGTERM and SIGKILL at shutdown (e.g. 1m)
    #[arg(long, value_parser = parse_duration, global = true)]
    grace_period: Option<Duration>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<WorkloadCommand>,
}

#[derive(Subcommand, Debug)]
enum WorkloadCommand {
    /// Key-value workload
    Kv(KvArgs),
    /// TPC-C workload
    Tpcc(TpccArgs),
}

#[derive(ClapArgs, Debug)]
struct KvArgs {
    /// Read percentage (0, 50 or 95)
    #[arg(long, visible_alias = "kv")]
    read_percent: Option<u32>,
}

#[derive(ClapArgs, Debug)]
struct TpccArgs {
    /// Warehouses per core
    #[arg(long)]
    warehouses: Option<u64>,

    /// Concurrent workers per core
    #[arg(long)]
    concurrency: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = initialize_logging(args.debug) {
        eprintln!("error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let config = match build_config(&args).and_then(|config| config.resolve()) {
        Ok(config) => config,
        Err(e) => {
            report_failure(&HarnessError::from(e));
            return ExitCode::FAILURE;
        }
    };

    info!(
        workload = config.workload().kind(),
        binary = %config.binary.display(),
        procs = config.procs_per_inst,
        "Starting benchmark"
    );

    let harness = Harness::new(config);
    let abort = harness.abort_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        abort.cancel();
    });

    let outcome = harness.run().await;
    match &outcome.result {
        Ok(report) => println!("{}", report.result_line()),
        Err(e) => report_failure(e),
    }

    ExitCode::from(u8::try_from(outcome.exit_code()).unwrap_or(1))
}

/// Merge the optional YAML file with the command-line overrides
fn build_config(args: &Args) -> Result<HarnessConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::load_from_file(path)?,
        None => HarnessConfig::default(),
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(bin) = &args.cockroachdb_bin {
        config.cockroach_bin = Some(bin.clone());
    }
    if let Some(tmp) = &args.tmp {
        config.tmp_dir = Some(tmp.clone());
    }
    if let Some(threads) = args.threads {
        config.procs_per_inst = threads;
    }
    if let Some(port) = args.base_port {
        config.base_port = port;
    }
    if let Some(timeout) = args.readiness_timeout {
        config.readiness_timeout = timeout;
    }
    if let Some(grace) = args.grace_period {
        config.grace_period = grace;
    }
    if args.fail_fast {
        config.crash_policy = CrashPolicy::FailFast;
    }

    config.workload = match (&args.command, config.workload) {
        (Some(WorkloadCommand::Kv(kv)), current) => {
            let mut workload = match current {
                WorkloadConfig::Kv(existing) => existing,
                WorkloadConfig::Tpcc(_) => KvConfig::default(),
            };
            if let Some(read_percent) = kv.read_percent {
                workload.read_percent = read_percent;
            }
            WorkloadConfig::Kv(workload)
        }
        (Some(WorkloadCommand::Tpcc(tpcc)), current) => {
            let mut workload = match current {
                WorkloadConfig::Tpcc(existing) => existing,
                WorkloadConfig::Kv(_) => TpccConfig::default(),
            };
            if let Some(warehouses) = tpcc.warehouses {
                workload.warehouses = warehouses;
            }
            if let Some(concurrency) = tpcc.concurrency {
                workload.concurrency = concurrency;
            }
            WorkloadConfig::Tpcc(workload)
        }
        (None, current) => current,
    };

    if let Some(max_ops) = args.max_ops {
        match &mut config.workload {
            WorkloadConfig::Kv(kv) => kv.max_ops = max_ops,
            WorkloadConfig::Tpcc(tpcc) => tpcc.max_ops = max_ops,
        }
    }

    config.validate()?;
    Ok(config)
}

/// One diagnostic line naming the failing phase and its cause
fn report_failure(error: &HarnessError) {
    let message = error.to_string();
    let flattened = message
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");
    eprintln!("error: [{}] {}", error.phase(), flattened);
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    // Logs go to stderr; stdout carries only the result line
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers: {}", e);
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if signal::ctrl_c().await.is_err() {
            return std::future::pending().await;
        }
        info!("Received Ctrl+C signal");
    }
}
