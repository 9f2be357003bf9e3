//! rs-captive-core - stream closed-ledger metadata out of a captive
//! stellar-core.
//!
//! This binary drives the captive backend from the command line: it spawns a
//! stellar-core executable as a child process, replays the requested ledger
//! range against the configured history archives, and emits the resulting
//! `LedgerCloseMeta` records in strict ascending order.
//!
//! # Quick Start
//!
//! ```bash
//! # Latest ledger known to the testnet archives
//! rs-captive-core latest
//!
//! # Replay testnet ledgers 100..200 and re-frame them to a file
//! rs-captive-core stream --from 100 --to 200 --output meta.xdr
//!
//! # Mainnet, sequences only, to the log
//! rs-captive-core --mainnet stream --from 5000000 --to 5000100
//! ```
//!
//! The child executable defaults to `stellar-core` on `PATH` and can be
//! pointed elsewhere with `--executable`. Network presets (`--testnet`,
//! `--mainnet`) choose the passphrase and SDF archive endpoints; both can
//! be overridden individually.

mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};

use captive_core_common::{network, XdrOutputStream};
use captive_core_history::archive;
use captive_core_ledgerbackend::CaptiveCore;

use logging::{LogConfig, LogFormat};

/// Stream closed-ledger metadata from a captive stellar-core subprocess
#[derive(Parser)]
#[command(name = "rs-captive-core")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the stellar-core executable run as the captive child
    #[arg(long, value_name = "PATH", default_value = "stellar-core", global = true)]
    executable: PathBuf,

    /// Use testnet configuration (default)
    #[arg(long, global = true)]
    testnet: bool,

    /// Use mainnet configuration
    #[arg(long, global = true)]
    mainnet: bool,

    /// History archive URL (repeatable; overrides the network preset)
    #[arg(long = "archive-url", value_name = "URL", global = true)]
    archive_urls: Vec<String>,

    /// Network passphrase (overrides the network preset)
    #[arg(long, value_name = "PASSPHRASE", global = true)]
    network_passphrase: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Log output format
    #[arg(long, default_value = "text", global = true)]
    log_format: CliLogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Log output format for CLI
#[derive(Clone, Copy, Debug, Default, PartialEq, clap::ValueEnum)]
enum CliLogFormat {
    #[default]
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the latest ledger known to the history archive
    Latest,

    /// Replay a ledger range and emit the records in order
    Stream {
        /// First ledger to emit (must be at least 2)
        #[arg(long, value_name = "SEQ")]
        from: u32,

        /// Last ledger to emit
        #[arg(long, value_name = "SEQ")]
        to: u32,

        /// Where to write framed records: a file path, `fd:N`, or `-` to
        /// log sequences only
        #[arg(long, value_name = "STREAM", default_value = "-")]
        output: String,
    },
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        let level = if self.trace {
            Level::TRACE
        } else if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        };
        LogConfig {
            level,
            format: self.log_format.into(),
            ansi_colors: self.log_format == CliLogFormat::Text,
        }
    }

    /// Resolve the passphrase and archive URLs from presets and overrides.
    fn network_config(&self) -> anyhow::Result<(String, Vec<String>)> {
        if self.testnet && self.mainnet {
            anyhow::bail!("--testnet and --mainnet are mutually exclusive");
        }
        let preset_urls: &[&str] = if self.mainnet {
            archive::mainnet::ARCHIVE_URLS
        } else {
            archive::testnet::ARCHIVE_URLS
        };
        let preset_passphrase = if self.mainnet {
            network::MAINNET_PASSPHRASE
        } else {
            network::TESTNET_PASSPHRASE
        };

        let urls = if self.archive_urls.is_empty() {
            preset_urls.iter().map(|u| u.to_string()).collect()
        } else {
            self.archive_urls.clone()
        };
        let passphrase = self
            .network_passphrase
            .clone()
            .unwrap_or_else(|| preset_passphrase.to_string());
        Ok((passphrase, urls))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_config())?;

    let (passphrase, urls) = cli.network_config()?;
    let mut backend = CaptiveCore::new(cli.executable.clone(), &passphrase, urls);

    match cli.command {
        Commands::Latest => {
            let latest = backend.get_latest_ledger_sequence().await?;
            println!("{latest}");
        }
        Commands::Stream { from, to, output } => {
            stream_range(&mut backend, from, to, &output).await?;
        }
    }
    Ok(())
}

/// Replay `[from, to]` and re-frame each record to `output`.
async fn stream_range(
    backend: &mut CaptiveCore,
    from: u32,
    to: u32,
    output: &str,
) -> anyhow::Result<()> {
    let mut sink = open_output(output)?;

    info!(from, to, "preparing ledger range");
    backend.prepare_range(from, to).await?;

    for seq in from..=to {
        let meta = backend
            .get_ledger(seq)
            .await?
            .ok_or_else(|| anyhow::anyhow!("ledger {seq} not found"))?;
        match sink.as_mut() {
            Some(stream) => {
                stream.write_one(&meta)?;
            }
            None => info!(sequence = seq, "ledger"),
        }
    }

    backend.close().await?;
    info!(from, to, "range complete");
    Ok(())
}

/// Open the output sink: `-` logs sequences only, `fd:N` adopts a file
/// descriptor, anything else is a file path.
fn open_output(dest: &str) -> anyhow::Result<Option<XdrOutputStream<std::fs::File>>> {
    if dest == "-" {
        return Ok(None);
    }
    if let Some(fd_str) = dest.strip_prefix("fd:") {
        #[cfg(unix)]
        {
            let fd: i32 = fd_str
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid fd number '{fd_str}': {e}"))?;
            // SAFETY: the caller handed us this descriptor for exclusive
            // use as the output stream.
            return Ok(Some(unsafe { XdrOutputStream::from_raw_fd(fd) }));
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("fd: syntax is only supported on Unix");
        }
    }
    Ok(Some(XdrOutputStream::create(dest)?))
}
