//! Proxy list parsing and persistence

use crate::proxy::models::ProxyRecord;
use crate::Result;
use anyhow::Context;
use std::fs;
use std::path::Path;

/// Separator between a proxy's scheme and its address
const SCHEME_SEPARATOR: &str = "://";

/// Extract the IP segment from a proxy string
///
/// Supports formats:
/// - IP:PORT
/// - scheme://IP:PORT
///
/// The result is not validated as an address; malformed input surfaces later
/// as a lookup failure.
pub fn extract_ip(proxy: &str) -> &str {
    let address = match proxy.find(SCHEME_SEPARATOR) {
        Some(idx) => &proxy[idx + SCHEME_SEPARATOR.len()..],
        None => proxy,
    };

    address.split(':').next().unwrap_or(address)
}

/// Proxy parser for reading input lists and writing result lists
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single proxy line, skipping blank lines
    pub fn parse_line(line: &str) -> Option<ProxyRecord> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(ProxyRecord::new(line))
    }

    /// Parse proxies from a string (multiple lines)
    pub fn parse_string(content: &str) -> Vec<ProxyRecord> {
        content.lines().filter_map(Self::parse_line).collect()
    }

    /// Parse proxies from a file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Vec<ProxyRecord>> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read proxy list {}", path.display()))?;
        Ok(Self::parse_string(&content))
    }

    /// Save proxy strings to a file, one per line
    pub fn save_to_file<P: AsRef<Path>>(proxies: &[String], path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }

        let content: String = proxies.iter().map(|p| format!("{}\n", p)).collect();

        fs::write(path, content)
            .with_context(|| format!("failed to write proxy list {}", path.display()))?;
        Ok(())
    }
}
