use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

fn filter(debug: bool) -> EnvFilter {
    // RUST_LOG only wins when debug output was asked for
    if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::new("info")
    }
}

fn open(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber. The terminal belongs to the game, so
/// output goes to `log_file` or nowhere at all.
pub fn init(log_file: Option<&Path>, debug: bool) -> io::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(debug))
        .with_ansi(false);

    let _ = match log_file {
        Some(path) => builder.with_writer(Mutex::new(open(path)?)).try_init(),
        None => builder.with_writer(io::sink).try_init(),
    };
    Ok(())
}
