//! Reads the surrounding text of a topic from a file or stdin.

use anyhow::{Context, Result, bail};
use std::fs;
use std::io::{self, Read};

const MAX_CONTEXT_SIZE: usize = 64 * 1024;

/// Path that selects stdin.
pub const STDIN_PATH: &str = "-";

/// Reads context text from `path`, or from stdin when `path` is `-`.
///
/// Surrounding whitespace is trimmed; empty input is an error.
pub fn read_context(path: &str) -> Result<String> {
    let text = if path == STDIN_PATH {
        read_stdin()?
    } else {
        read_file(path)?
    };

    let text = text.trim();
    if text.is_empty() {
        bail!("Context is empty");
    }
    Ok(text.to_string())
}

fn too_large(size: usize) -> anyhow::Error {
    anyhow::anyhow!(
        "Context size ({} KB) exceeds the maximum allowed size ({} KB).\n\n\
         Pass only the passage around the topic.",
        size / 1024,
        MAX_CONTEXT_SIZE / 1024
    )
}

fn read_file(path: &str) -> Result<String> {
    let metadata = fs::metadata(path).with_context(|| format!("Failed to access file: {path}"))?;

    let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
    if size > MAX_CONTEXT_SIZE {
        return Err(too_large(size));
    }

    fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))
}

#[allow(clippy::significant_drop_tightening)]
fn read_stdin() -> Result<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];
    let mut stdin = io::stdin().lock();

    loop {
        let bytes_read = stdin
            .read(&mut chunk)
            .context("Failed to read from stdin")?;

        if bytes_read == 0 {
            break;
        }

        buffer.extend_from_slice(&chunk[..bytes_read]);

        if buffer.len() > MAX_CONTEXT_SIZE {
            return Err(too_large(buffer.len()));
        }
    }

    String::from_utf8(buffer).context("Context is not valid UTF-8")
}
