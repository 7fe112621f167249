//! Subscriber setup: a stdout layer always, plus a plain-text file layer per
//! database when a log directory is configured.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_PREFIX: &str = "organizer-rpc";

/// Log file for the server bound to `db_path`, so servers sharing a log
/// directory but not a database never interleave.
pub fn log_file_path(log_dir: &Path, db_path: &Path) -> PathBuf {
    let stem = db_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "default".to_string());
    log_dir.join(format!("{LOG_PREFIX}-{stem}.log"))
}

pub fn open_log_file(log_dir: &Path, db_path: &Path) -> io::Result<(PathBuf, File)> {
    fs::create_dir_all(log_dir)?;
    let path = log_file_path(log_dir, db_path);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// `RUST_LOG` wins; otherwise `--debug`, then `ORGANIZER_LOG_LEVEL`, then info.
fn filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if debug {
            "debug".to_string()
        } else {
            std::env::var("ORGANIZER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
        };
        EnvFilter::new(level)
    })
}

pub fn init(log_dir: Option<&Path>, db_path: &Path, debug: bool) {
    let opened = log_dir.map(|dir| open_log_file(dir, db_path));
    let (log_path, file_layer) = match opened {
        Some(Ok((path, file))) => (
            Some(path),
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
        ),
        Some(Err(err)) => {
            // no subscriber yet
            eprintln!("log_file_error: {err}");
            (None, None)
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter(debug))
        .with(fmt::layer().with_writer(io::stdout))
        .with(file_layer)
        .try_init();
    if let Err(err) = installed {
        eprintln!("tracing_init_error: {err}");
        return;
    }

    match log_path {
        Some(path) => info!(event = "log_file_opened", path = %path.display()),
        None if log_dir.is_some() => warn!(event = "log_file_unavailable"),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn log_file_is_named_after_the_database() {
        let dir = TempDir::new().expect("temp dir");
        let log_dir = dir.path().join("logs");

        let (path, _file) =
            open_log_file(&log_dir, Path::new("/srv/data/spring-fair.db")).expect("open log");
        assert_eq!(path, log_dir.join("organizer-rpc-spring-fair.log"));
        assert!(path.exists());

        assert_eq!(
            log_file_path(&log_dir, Path::new("")),
            log_dir.join("organizer-rpc-default.log")
        );
    }
}
