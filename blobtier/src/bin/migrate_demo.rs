//! Migration CLI Demo
//!
//! Streams stdin lines into a container with a tiny in-memory tier and shows
//! the payload moving to a spool file once it outgrows that tier.
//! Run with `RUST_LOG=debug` to see the switch being logged.

use blobtier::{BackendKind, BackendRegistry, ContainerFactory, SeekableChannel, Tier, TierTable};
use std::io::{self, BufRead, Write};

const MEMORY_CEILING: u64 = 64;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let tiers = TierTable::new(
        vec![
            Tier::new(BackendKind::Memory, MEMORY_CEILING),
            Tier::unbounded(BackendKind::File),
        ],
        u64::MAX,
    )?;
    let factory = ContainerFactory::new(tiers, BackendRegistry::default());
    log::info!("Demo tiers: {}", factory.tiers());

    let mut container = factory.create();
    {
        let mut channel = container.open_sized_channel(0)?;
        println!("Enter text (empty line to quit):");
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                break;
            }
            channel.write_all(line.as_bytes())?;
            channel.write_all(b"\n")?;
            println!(
                "size={} position={} migrations={}",
                channel.size()?,
                channel.position()?,
                channel.migrations()
            );
        }
        channel.close()?;
    }

    println!(
        "Payload: {} bytes in {} backend",
        container.len()?,
        container.backend_kind()
    );
    if let Some(path) = container.file_path() {
        println!("Spool file: {}", path.display());
    }
    Ok(())
}
