//! Pipeline stage that upper-cases a payload
//!
//! Reads the input container through a channel and streams the result into
//! the output container in fixed-size chunks, so payloads of any tier pass
//! through without being materialized.

use blobtier::SelectingContainer;
use std::io::{self, Read, Write};
use tracing::debug;

const BUFFER_SIZE: usize = 1024;

/// Write an ASCII upper-cased copy of `input` into `output`.
///
/// `output` is sized for the input length up front and may still migrate
/// while it is written. Returns the number of bytes written.
///
/// # Errors
///
/// Returns the first I/O error from either channel. `output` then holds a
/// partial copy.
pub fn execute(input: &mut SelectingContainer, output: &mut SelectingContainer) -> io::Result<u64> {
    let len = input.len()?;
    let mut reader = input.open_channel()?;
    let mut writer = output.open_sized_channel(len)?;
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut total: u64 = 0;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let chunk = &mut buffer[..bytes_read];
        chunk.make_ascii_uppercase();
        writer.write_all(chunk)?;
        total += bytes_read as u64;
    }
    writer.flush()?;

    debug!(bytes = total, migrations = writer.migrations(), "to_upper done");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobtier::ContainerFactory;

    #[test]
    fn test_upper_cases_ascii_only() {
        let factory = ContainerFactory::default();
        let mut input = factory.create();
        input.write_all(Some("hello, Wörld 42!".as_bytes())).unwrap();
        let mut output = factory.create();

        let n = execute(&mut input, &mut output).unwrap();
        assert_eq!(n, input.len().unwrap());
        assert_eq!(output.read_all().unwrap(), "HELLO, WöRLD 42!".as_bytes());
        assert_eq!(input.read_all().unwrap(), "hello, Wörld 42!".as_bytes());
    }

    #[test]
    fn test_empty_input() {
        let factory = ContainerFactory::default();
        let mut input = factory.create();
        let mut output = factory.create();
        output.write_all(Some(b"stale")).unwrap();

        assert_eq!(execute(&mut input, &mut output).unwrap(), 0);
        assert!(output.is_empty().unwrap());
    }
}
