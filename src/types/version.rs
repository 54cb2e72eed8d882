//! NatNet protocol version

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::NatNetError;

/// NatNet bitstream version negotiated during the handshake.
///
/// Ordering compares `major` first, then `minor`, which is what the version gate
/// table relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    /// Oldest bitstream layout this client can decode.
    pub const MINIMUM: ProtocolVersion = ProtocolVersion::new(2, 0);

    /// Newest bitstream layout this client knows about.
    pub const LATEST: ProtocolVersion = ProtocolVersion::new(4, 1);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Motive reports 0.0 when it streams its own native (latest) layout.
    pub fn is_unspecified(self) -> bool {
        self.major == 0 && self.minor == 0
    }

    pub fn is_supported(self) -> bool {
        self >= Self::MINIMUM && self <= Self::LATEST
    }

    /// Version bytes as sent in a Ping request (`major.minor.0.0`).
    pub fn to_bytes(self) -> [u8; 4] {
        [self.major, self.minor, 0, 0]
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = NatNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| NatNetError::config(format!("version '{s}' is not major.minor")))?;
        let parse = |part: &str| {
            part.parse::<u8>()
                .map_err(|e| NatNetError::config(format!("version '{s}' is not major.minor: {e}")))
        };
        Ok(Self::new(parse(major)?, parse(minor)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_major_then_minor() {
        assert!(ProtocolVersion::new(2, 11) > ProtocolVersion::new(2, 9));
        assert!(ProtocolVersion::new(3, 0) > ProtocolVersion::new(2, 11));
        assert!(ProtocolVersion::new(4, 1) > ProtocolVersion::new(4, 0));
    }

    #[test]
    fn supported_range() {
        assert!(ProtocolVersion::new(2, 0).is_supported());
        assert!(ProtocolVersion::new(3, 1).is_supported());
        assert!(ProtocolVersion::LATEST.is_supported());
        assert!(!ProtocolVersion::new(1, 4).is_supported());
        assert!(!ProtocolVersion::new(5, 0).is_supported());
        assert!(ProtocolVersion::new(0, 0).is_unspecified());
    }

    #[test]
    fn parses_dotted_form() {
        let version: ProtocolVersion = "3.1".parse().expect("valid version");
        assert_eq!(version, ProtocolVersion::new(3, 1));
        assert_eq!(version.to_string(), "3.1");

        assert!("3".parse::<ProtocolVersion>().is_err());
        assert!("three.one".parse::<ProtocolVersion>().is_err());
    }
}
