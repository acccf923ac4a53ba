//! Stand-in for the server binary in end-to-end tests.
//!
//! Understands the same subcommands the harness issues. Behavior is steered
//! by environment variables so a test can inject a fault into one phase:
//!
//! - `FAKEROACH_RECORD`: append `GOMAXPROCS=<v> <args...>` to this file
//! - `FAKEROACH_EXIT_ON_START`: `start-single-node` exits with code 3 at once
//! - `FAKEROACH_START_DELAY_MS`: delay before the server binds its ports
//! - `FAKEROACH_IGNORE_SIGTERM`: the server only dies on SIGKILL
//! - `FAKEROACH_STATUS_FAIL`: `node status` always fails
//! - `FAKEROACH_FAIL_INIT` / `FAKEROACH_FAIL_RUN`: the workload phase fails
//! - `FAKEROACH_RUN_MS`: how long `workload run` takes

use clap::{Parser, Subcommand};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "fakeroach")]
#[command(about = "Fake server binary for benchvisor tests", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the fake server until terminated
    StartSingleNode {
        #[arg(long)]
        insecure: bool,
        #[arg(long)]
        listen_addr: String,
        #[arg(long)]
        http_addr: String,
        #[arg(long)]
        cache: Option<String>,
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Node administration
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },
    /// Workload driver
    Workload {
        #[command(subcommand)]
        command: WorkloadCommand,
    },
}

#[derive(Subcommand, Debug)]
enum NodeCommand {
    Status {
        #[arg(long)]
        insecure: bool,
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: u16,
    },
}

#[derive(Subcommand, Debug)]
enum WorkloadCommand {
    Init {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    // stdout of the server is captured by the harness, keep logs there
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stdout)
        .init();

    record_invocation();

    let args = Args::parse();
    let code = match args.command {
        Command::StartSingleNode {
            listen_addr,
            http_addr,
            store,
            log_dir,
            ..
        } => start_single_node(&listen_addr, &http_addr, store, log_dir).await,
        Command::Node {
            command: NodeCommand::Status { host, port, .. },
        } => node_status(&host, port).await,
        Command::Workload {
            command: WorkloadCommand::Init { args },
        } => workload("init", &args, "FAKEROACH_FAIL_INIT").await,
        Command::Workload {
            command: WorkloadCommand::Run { args },
        } => {
            if let Some(ms) = env_u64("FAKEROACH_RUN_MS") {
                sleep(Duration::from_millis(ms)).await;
            }
            workload("run", &args, "FAKEROACH_FAIL_RUN").await
        }
    };
    std::process::exit(code);
}

async fn start_single_node(
    listen_addr: &str,
    http_addr: &str,
    store: Option<PathBuf>,
    log_dir: Option<PathBuf>,
) -> i32 {
    if env_flag("FAKEROACH_EXIT_ON_START") {
        eprintln!("fakeroach: refusing to start");
        return 3;
    }

    let ignore_term = env_flag("FAKEROACH_IGNORE_SIGTERM");
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("Failed to setup SIGTERM handler: {}", e);
            return 1;
        }
    };

    if let Some(ms) = env_u64("FAKEROACH_START_DELAY_MS") {
        info!("Start delay: waiting {}ms", ms);
        sleep(Duration::from_millis(ms)).await;
    }

    // Leave a marker in each directory so cleanup has something to remove
    for dir in [store, log_dir].into_iter().flatten() {
        if let Err(e) = std::fs::write(dir.join("fakeroach.marker"), "started\n") {
            warn!("Failed to write marker in {}: {}", dir.display(), e);
        }
    }

    let sql = match TcpListener::bind(listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("fakeroach: cannot listen on {}: {}", listen_addr, e);
            return 1;
        }
    };
    let http = match TcpListener::bind(http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("fakeroach: cannot listen on {}: {}", http_addr, e);
            return 1;
        }
    };

    tokio::spawn(accept_sql(sql));
    tokio::spawn(serve_http(http));
    info!("Node started: sql={} http={}", listen_addr, http_addr);

    loop {
        sigterm.recv().await;
        if ignore_term {
            warn!("Received SIGTERM, ignoring");
            continue;
        }
        info!("Received SIGTERM, shutting down");
        return 0;
    }
}

async fn accept_sql(listener: TcpListener) {
    // Connections are accepted and dropped; only reachability matters
    while let Ok((stream, _)) = listener.accept().await {
        drop(stream);
    }
}

async fn serve_http(listener: TcpListener) {
    while let Ok((stream, _)) = listener.accept().await {
        let io = TokioIo::new(stream);
        tokio::spawn(async move {
            let service = service_fn(|req: Request<hyper::body::Incoming>| async move {
                let body = if req.uri().path().starts_with("/debug/pprof") {
                    "heap profile\n"
                } else {
                    "not found\n"
                };
                Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(body.as_bytes()))))
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!("HTTP connection error: {}", e);
            }
        });
    }
}

async fn node_status(host: &str, port: u16) -> i32 {
    if env_flag("FAKEROACH_STATUS_FAIL") {
        eprintln!("ERROR: cannot dial server (forced failure)");
        return 1;
    }
    match TcpStream::connect((host, port)).await {
        Ok(_) => {
            println!("id\taddress\tis_available\tis_live");
            println!("1\t{}:{}\ttrue\ttrue", host, port);
            0
        }
        Err(e) => {
            eprintln!("ERROR: cannot dial server at {}:{}: {}", host, port, e);
            1
        }
    }
}

async fn workload(phase: &str, args: &[String], fail_var: &str) -> i32 {
    if env_flag(fail_var) {
        eprintln!("Error: workload {} failed (forced by {})", phase, fail_var);
        return 1;
    }
    println!("workload {} ok: {}", phase, args.join(" "));
    0
}

fn record_invocation() {
    let Some(path) = std::env::var_os("FAKEROACH_RECORD") else {
        return;
    };
    let procs = std::env::var("GOMAXPROCS").unwrap_or_else(|_| "-".to_string());
    let args: Vec<String> = std::env::args().skip(1).collect();
    let line = format!("GOMAXPROCS={} {}\n", procs, args.join(" "));

    let written = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
    if let Err(e) = written {
        eprintln!("fakeroach: failed to record invocation: {}", e);
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|v| !v.is_empty() && v != "0")
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
