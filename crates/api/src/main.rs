//! Proctor Engine - Main Entry Point
//!
//! `proctor-engine` runs the server. `proctor-engine hash-password` reads a
//! password from stdin and prints the Argon2 hash for a `[[teachers]]` entry.

use std::io::BufRead;

use anyhow::Context;
use api::{init_logging, run_server, AppConfig};
use tracing::info;

fn hash_password_from_stdin() -> anyhow::Result<()> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("reading password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']);
    anyhow::ensure!(!password.is_empty(), "password must not be empty");

    let hash = sessions::hash_password(password)?;
    println!("{}", hash);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().nth(1).as_deref() == Some("hash-password") {
        return hash_password_from_stdin();
    }

    let config = AppConfig::load().context("loading configuration")?;
    init_logging(&config.logging);

    info!("=== Proctor Engine v{} ===", env!("CARGO_PKG_VERSION"));

    run_server(config).await.context("running server")?;
    Ok(())
}
