//! # blobtier CLI
//!
//! Loads a payload into a size-adaptive container, optionally runs the
//! `to_upper` stage on it, and writes the result out.
//!
//! Usage:
//!   blobtier [--config FILE] [--upper] [--output FILE] [INPUT]
//!
//! Without `INPUT` the payload is read from stdin; without `--output` it is
//! written to stdout. The tier that ended up holding the payload is logged.

use blobtier::{config, BlobConfig, ContainerFactory, SeekableChannel, SelectingContainer};
use clap::Parser;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "blobtier")]
#[command(about = "Stream a payload through a size-adaptive container", long_about = None)]
struct Cli {
    /// Tier configuration (JSON). Defaults to $BLOBTIER_CONFIG.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Upper-case the payload on the way through
    #[arg(short, long)]
    upper: bool,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Read the payload from this file instead of stdin
    input: Option<PathBuf>,
}

fn load_factory(path: Option<&PathBuf>) -> Result<ContainerFactory, blobtier::BlobError> {
    match path {
        Some(path) => BlobConfig::from_path(path)?.factory(),
        None => Ok(config::factory_from_env()),
    }
}

/// Stream `source` into a fresh container, sized by `estimate`
fn load(
    factory: &ContainerFactory,
    mut source: impl Read,
    estimate: u64,
) -> io::Result<SelectingContainer> {
    let mut container = factory.create();
    {
        let mut channel = container.open_sized_channel(estimate)?;
        io::copy(&mut source, &mut channel)?;
        channel.flush()?;
        info!(
            bytes = channel.position()?,
            migrations = channel.migrations(),
            "payload loaded"
        );
    }
    Ok(container)
}

fn store(container: &mut SelectingContainer, mut sink: impl Write) -> io::Result<u64> {
    let mut channel = container.open_channel()?;
    let n = io::copy(&mut channel, &mut sink)?;
    sink.flush()?;
    Ok(n)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout stays clean for the payload
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let factory = load_factory(cli.config.as_ref())?;
    info!(tiers = %factory.tiers(), "container factory ready");

    let mut container = match &cli.input {
        Some(path) => {
            let file = File::open(path)?;
            let estimate = file.metadata()?.len();
            load(&factory, file, estimate)?
        }
        None => load(&factory, io::stdin().lock(), 0)?,
    };

    if cli.upper {
        let mut upper = factory.create();
        to_upper::execute(&mut container, &mut upper)?;
        container = upper;
    }

    let written = match &cli.output {
        Some(path) => store(&mut container, File::create(path)?)?,
        None => store(&mut container, io::stdout().lock())?,
    };

    info!(
        bytes = written,
        tier = %container.backend_kind(),
        file = ?container.file_path(),
        "done"
    );
    Ok(())
}
