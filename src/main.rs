/*
 * keyceremony: key-splitting ceremony engine and shell
 * Copyright (C) 2024-2026 keyceremony authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

mod shell;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Parser, Subcommand};
use tracing::warn;

use keyceremony_core::ceremony::CeremonyEngine;
use keyceremony_core::config::CeremonyConfig;

use shell::TerminalShell;

#[derive(Parser, Debug)]
#[command(name = "keyceremony", version, about = "Key-splitting ceremonies with Shamir Secret Sharing")]
struct Cli {
    /// Path to the keyceremony.toml configuration file
    #[arg(long, short = 'c', env = "KEYCEREMONY_CONFIG", default_value = "keyceremony.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "KEYCEREMONY_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a master secret into encrypted keeper shares
    Create,
    /// Reconstruct a secret from an emitted shares file
    Reconstruct {
        /// Shares file to reconstruct from; prompted for when omitted
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log);

    match run(cli) {
        Ok(success) if success => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let config = load_config(&cli.config)?;

    let shell = TerminalShell::new(config.security.secure_delete_passes);
    let mut engine = CeremonyEngine::new(&config, shell)
        .with_context(|| "failed to open a ceremony session")?;

    println!("session {}", engine.session_id());
    println!("output folder {}", engine.session_folder().display());

    let result = match &cli.command {
        Command::Create => engine.create_shares(),
        Command::Reconstruct { file } => engine.reconstruct_secret(file.as_deref()),
    };

    if let Some(secret) = &result.reconstructed_secret {
        println!("recovered secret (base64): {}", BASE64.encode(secret.expose()));
        if let Ok(text) = std::str::from_utf8(secret.expose()) {
            if text.chars().all(|c| !c.is_control()) {
                println!("recovered secret (utf-8): {}", text);
            }
        }
    }

    let finalized = engine.finalize_session();
    if !finalized.success {
        warn!(message = %finalized.message, "session could not be finalized");
    }

    Ok(result.success)
}

fn load_config(path: &PathBuf) -> Result<CeremonyConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    } else {
        warn!(
            "config file not found: {}  (using defaults)",
            path.display()
        );
        Ok(CeremonyConfig::default())
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
