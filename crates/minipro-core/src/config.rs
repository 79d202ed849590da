//! Fuse file
//!
//! The config page is exchanged with the user as a small text file of
//! `name = value` lines:
//!
//! ```text
//! fuses_lo = 0x0062
//! fuses_hi = 0x00df
//! fuses_ext = 0x00ff
//! lock_byte = 0x003f
//! ```
//!
//! Values are read as `0x`-prefixed hex or plain decimal and written back
//! as `0x%04x`. Lines that are not entries (blank lines, `#` comments) are
//! kept as they are.

use std::fmt;

use crate::error::{Error, Result};
use crate::fuse::{FuseSink, FuseSource};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Line {
    raw: String,
    entry: Option<(String, String)>,
}

impl Line {
    fn entry(key: &str, value: &str) -> Self {
        Self {
            raw: format!("{} = {}", key, value),
            entry: Some((key.to_string(), value.to_string())),
        }
    }
}

/// Parsed fuse file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuseFile {
    lines: Vec<Line>,
}

impl FuseFile {
    /// Create an empty fuse file
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse fuse file text
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = Vec::new();

        for (number, raw) in text.lines().enumerate() {
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                lines.push(Line {
                    raw: raw.to_string(),
                    entry: None,
                });
                continue;
            }

            let (key, value) = trimmed.split_once('=').ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "config line {}: expected 'name = value', got '{}'",
                    number + 1,
                    trimmed
                ))
            })?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "config line {}: empty name or value",
                    number + 1
                )));
            }

            lines.push(Line {
                raw: raw.to_string(),
                entry: Some((key.to_string(), value.to_string())),
            });
        }

        Ok(Self { lines })
    }

    /// Parse fuse file bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::InvalidArgument(format!("config file is not UTF-8: {}", e)))?;
        Self::parse(text)
    }

    /// Raw value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .filter_map(|line| line.entry.as_ref())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key` to `value`, replacing the existing line or appending one
    pub fn set(&mut self, key: &str, value: &str) {
        match self
            .lines
            .iter_mut()
            .find(|line| matches!(&line.entry, Some((k, _)) if k == key))
        {
            Some(line) => *line = Line::entry(key, value),
            None => self.lines.push(Line::entry(key, value)),
        }
    }

    /// Names of all entries, in file order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter_map(|line| line.entry.as_ref())
            .map(|(k, _)| k.as_str())
    }
}

/// Parse a `0x`-prefixed hex or decimal value
fn parse_int(value: &str) -> Option<u32> {
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

impl FuseSource for FuseFile {
    fn read_named_int(&self, name: &str) -> Result<Option<u32>> {
        let Some(raw) = self.get(name) else {
            return Ok(None);
        };
        parse_int(raw).map(Some).ok_or_else(|| {
            Error::InvalidArgument(format!("config value '{}' = '{}' is not a number", name, raw))
        })
    }
}

impl FuseSink for FuseFile {
    fn write_named_int(&mut self, name: &str, value: u32) {
        self.set(name, &format!("0x{:04x}", value));
    }
}

impl fmt::Display for FuseFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line.raw)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_lookup() {
        let file = FuseFile::parse("fuses_lo = 0x0062\nfuses_hi=223\n\n# lock\nlock_byte =0X3F\n")
            .unwrap();

        assert_eq!(file.read_named_int("fuses_lo").unwrap(), Some(0x62));
        assert_eq!(file.read_named_int("fuses_hi").unwrap(), Some(223));
        assert_eq!(file.read_named_int("lock_byte").unwrap(), Some(0x3F));
        assert_eq!(file.read_named_int("fuses_ext").unwrap(), None);
        assert_eq!(file.keys().collect::<Vec<_>>(), ["fuses_lo", "fuses_hi", "lock_byte"]);
    }

    #[test]
    fn test_invalid_number() {
        let file = FuseFile::parse("conf_word = banana\n").unwrap();
        assert_eq!(file.get("conf_word"), Some("banana"));
        assert!(matches!(
            file.read_named_int("conf_word"),
            Err(Error::InvalidArgument(msg)) if msg.contains("conf_word") && msg.contains("banana")
        ));
    }

    #[test]
    fn test_malformed_line() {
        assert!(matches!(
            FuseFile::parse("fuses_lo 0x62\n"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(FuseFile::parse("= 0x62\n").is_err());
    }

    #[test]
    fn test_render_updates_in_place() {
        let mut file = FuseFile::parse("# saved\nfuses_lo = 0x0062\nlock_byte = 0x003f\n").unwrap();
        file.write_named_int("fuses_lo", 0xE2);
        file.write_named_int("fuses_ext", 0xFF);

        assert_eq!(
            file.to_string(),
            "# saved\nfuses_lo = 0x00e2\nlock_byte = 0x003f\nfuses_ext = 0x00ff\n"
        );
    }

    #[test]
    fn test_render_round_trip() {
        let mut file = FuseFile::new();
        file.write_named_int("conf_word", 0x3FF1);
        file.write_named_int("user_id0", 0x12);

        let parsed = FuseFile::from_bytes(file.to_string().as_bytes()).unwrap();
        assert_eq!(parsed.read_named_int("conf_word").unwrap(), Some(0x3FF1));
        assert_eq!(parsed.read_named_int("user_id0").unwrap(), Some(0x12));
    }
}
