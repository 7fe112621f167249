mod logging;
mod rpc;

use clap::Parser;
use organizer_services::{
    AccountDirectory, Database, MembershipDirectory, ServiceContext, StaticDirectory,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{error, info};

const DEFAULT_ADDR: &str = "127.0.0.1:42300";
const DEFAULT_DB: &str = "organizer.db";
const DEFAULT_WORKERS: usize = 8;
const DEFAULT_LOG_DIR: &str = ".organizer/logs";

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    db_path: PathBuf,
    workers: usize,
    log_dir: Option<PathBuf>,
    directory: Option<PathBuf>,
    debug: bool,
}

#[derive(Parser, Debug)]
#[command(name = "organizer-rpc")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long, default_value = "")]
    db: String,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long, default_value = "")]
    log_dir: String,
    /// JSON grants file; capabilities come from membership roles when unset.
    #[arg(long, default_value = "")]
    directory: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let config = load_config();
    logging::init(config.log_dir.as_deref(), &config.db_path, config.debug);
    let addr: SocketAddr = match config.addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.addr);
            return;
        }
    };

    let directory: Arc<dyn AccountDirectory> = match &config.directory {
        Some(path) => match StaticDirectory::load(path) {
            Ok(directory) => {
                info!(
                    event = "directory_loaded",
                    path = %path.display(),
                    grants = directory.len()
                );
                Arc::new(directory)
            }
            Err(err) => {
                error!(event = "directory_error", path = %path.display(), error = %err);
                return;
            }
        },
        None => Arc::new(MembershipDirectory),
    };

    let database = Database::new(&config.db_path);
    if let Err(err) = database.open() {
        error!(event = "db_error", path = %config.db_path.display(), error = %err);
        return;
    }

    let state = rpc::AppState::new(ServiceContext::new(database, directory), config.workers);
    let app = rpc::router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "rpc_error", error = %err);
            return;
        }
    };

    info!(
        event = "rpc_start",
        addr = %config.addr,
        db = %config.db_path.display(),
        workers = config.workers
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(event = "rpc_error", error = %err);
    }
    info!(event = "rpc_stop");
}

fn load_config() -> Config {
    let args = Args::parse();
    let addr = non_empty(&args.addr)
        .or_else(|| env_value("ORGANIZER_ADDR"))
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let db_path = non_empty(&args.db)
        .or_else(|| env_value("ORGANIZER_DB"))
        .unwrap_or_else(|| DEFAULT_DB.to_string());
    let workers = args
        .workers
        .or_else(|| env_value("ORGANIZER_WORKERS").and_then(|value| value.parse().ok()))
        .unwrap_or(DEFAULT_WORKERS)
        .max(1);
    // an explicit "off" disables the file layer
    let log_dir = non_empty(&args.log_dir)
        .or_else(|| env_value("ORGANIZER_LOG_DIR"))
        .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string());
    let log_dir = (log_dir != "off").then(|| PathBuf::from(log_dir));
    let directory = non_empty(&args.directory)
        .or_else(|| env_value("ORGANIZER_DIRECTORY"))
        .map(PathBuf::from);
    let debug = args.debug || env_true("ORGANIZER_DEBUG");
    Config {
        addr,
        db_path: PathBuf::from(db_path),
        workers,
        log_dir,
        directory,
        debug,
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| non_empty(&value))
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}
