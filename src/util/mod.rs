//! Utility module
//!
//! Logging setup and small formatting helpers shared by the driver and the
//! demos.

use tracing::Level;

use crate::core::{Error, Result};

/// Installs a plain `fmt` subscriber at `level`
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(level: Level) -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::config(format!("tracing already initialised: {}", e)))
}

/// Parses a log level name as given on a command line
pub fn parse_level(name: &str) -> Result<Level> {
    name.parse::<Level>()
        .map_err(|_| Error::config(format!("unknown log level '{}'", name)))
}

/// Formats octets as space separated hex, the way frames are usually quoted
pub fn hex(octets: &[u8]) -> String {
    let mut out = String::with_capacity(octets.len() * 3);
    for (i, octet) in octets.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{:02X}", octet));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x55, 0xFF, 0x00, 0x10]), "55 FF 00 10");
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("WARN").unwrap(), Level::WARN);
        assert!(matches!(parse_level("loud"), Err(Error::Config(_))));
    }
}
