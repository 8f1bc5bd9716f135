//! `sqlited-server`: boots a listener against a data directory and serves
//! connections until Ctrl-C, mirroring the teacher's `binlog_cli` entry
//! point (`binlog_cli/src/main.rs`) — parse flags, load+merge config,
//! init tracing, then hand off to the long-running service.
//!
//! Exit codes: `0` clean shutdown, `1` bad configuration, `2` failed to
//! bind the listener.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use common::config::ServerConfig;
use common::log::tracing_factory::TracingFactory;
use common::server::{Server, ShutdownHandle};
use engine::fake::FakeEngine;
use server::meta_db::load_bootstrap_hash;
use server::SqliteServer;

#[derive(Parser, Debug)]
#[command(name = "sqlited-server")]
#[command(version)]
#[command(about = "A MySQL-wire-compatible front end for an embedded SQL database")]
struct CliArgs {
    /// Path to a TOML config file, layered under any flags/env overrides below.
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding database files and the meta database (spec-literal `-D`).
    #[arg(short = 'D', long = "data-dir", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long = "host", value_name = "HOST")]
    host: Option<String>,

    #[arg(long = "port", value_name = "PORT")]
    port: Option<u16>,

    #[arg(long = "worker-count", value_name = "N")]
    worker_count: Option<usize>,

    #[arg(long = "max-conns", value_name = "N")]
    max_conns: Option<usize>,

    /// Enable debug-level tracing.
    #[arg(long, default_value_t = false)]
    trace: bool,

    /// Restrict tracing to error-level only.
    #[arg(long = "trace-error", default_value_t = false)]
    trace_error: bool,
}

impl CliArgs {
    fn apply_to(&self, config: &mut ServerConfig) {
        if let Some(d) = &self.data_dir {
            config.data_dir = d.clone();
        }
        if let Some(h) = &self.host {
            config.host = h.clone();
        }
        if let Some(p) = self.port {
            config.port = p;
        }
        if let Some(w) = self.worker_count {
            config.worker_count = w;
        }
        if let Some(m) = self.max_conns {
            config.max_conns = m;
        }
        config.trace = config.trace || self.trace;
        config.trace_error = config.trace_error || self.trace_error;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let mut config = match ServerConfig::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(1);
        }
    };
    args.apply_to(&mut config);

    let _tracing = TracingFactory::init(config.trace, config.trace_error, Some(config.data_dir.join("logs").to_string_lossy().to_string()));
    info!(data_dir = ?config.data_dir, host = %config.host, port = config.port, worker_count = config.worker_count, "starting sqlited-server");

    let bootstrap_hash = load_bootstrap_hash(&config.data_dir);
    if bootstrap_hash.is_none() {
        info!("no bootstrap file found, run `initdb` first if this is a fresh data directory");
    }

    let engine = Arc::new(FakeEngine::new());
    let mut server = SqliteServer::new(config, engine);
    if let Some(hash) = bootstrap_hash {
        server.meta().bootstrap_super_admin(hash);
    }
    server.start().await;

    if !server.is_listening() {
        eprintln!("failed to bind listener, see logs for details");
        return ExitCode::from(2);
    }

    let mut shutdown = ShutdownHandle::create();
    shutdown.add_service(Box::new(server));

    if tokio::signal::ctrl_c().await.is_err() {
        eprintln!("failed to listen for ctrl-c, shutting down immediately");
    }
    info!("shutdown signal received");

    match shutdown.shutdown_services(true).await {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            eprintln!("error during shutdown: {e}");
            ExitCode::from(1)
        }
    }
}
