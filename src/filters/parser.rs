//! Single-pass filter list scanner.
//!
//! Counts rules, extracts the first `! Title:` line and accumulates a CRC-32
//! (IEEE) over every raw line, terminators included.
//!
//! Line classes:
//!   blank:                    skipped
//!   `! Title: <name>`:        declared title (first occurrence only)
//!   `! ...`:                  comment
//!   `# ...`:                  comment
//!   anything else:            one rule

use regex::Regex;
use std::sync::LazyLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

static TITLE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^! Title: +(.*)$").expect("Invalid regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFilter {
    pub rules_count: u64,
    pub checksum: u32,
    pub title: Option<String>,
    /// Total bytes scanned.
    pub bytes: u64,
}

/// Scan a filter list from `reader` until EOF.
pub async fn parse_filter<R>(reader: &mut R) -> std::io::Result<ParsedFilter>
where
    R: AsyncBufRead + Unpin,
{
    let mut hasher = crc32fast::Hasher::new();
    let mut parsed = ParsedFilter::default();
    let mut raw = Vec::with_capacity(256);

    loop {
        raw.clear();
        let n = reader.read_until(b'\n', &mut raw).await?;
        if n == 0 {
            break;
        }
        hasher.update(&raw);
        parsed.bytes += n as u64;

        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('!') {
            if parsed.title.is_none() {
                if let Some(caps) = TITLE_LINE.captures(line) {
                    parsed.title = caps.get(1).map(|m| m.as_str().to_string());
                }
            }
            continue;
        }

        parsed.rules_count += 1;
    }

    parsed.checksum = hasher.finalize();
    Ok(parsed)
}
