use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::probe::Tag;

/// Protocol family the engine operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    V4,
    V6,
}

impl Protocol {
    /// Whether an address belongs to this family
    pub fn matches(&self, addr: &std::net::IpAddr) -> bool {
        match self {
            Protocol::V4 => addr.is_ipv4(),
            Protocol::V6 => addr.is_ipv6(),
        }
    }
}

/// Engine tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Echo payload size in bytes (the 8-byte tag is carved out of this)
    pub payload_size: usize,
    /// Attempts to allocate a unique probe identifier before giving up
    pub register_attempts: u32,
    /// Socket read timeout; bounds how long the receive loop blocks
    /// between cancellation checks
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            payload_size: 56,
            register_attempts: 8,
            read_timeout: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Payload size clamped so the tag always fits
    pub(crate) fn effective_payload_size(&self) -> usize {
        self.payload_size.max(Tag::WIRE_SIZE)
    }
}

/// Serde helper for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_protocol_matches() {
        let v4 = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);

        assert!(Protocol::V4.matches(&v4));
        assert!(!Protocol::V4.matches(&v6));
        assert!(Protocol::V6.matches(&v6));
        assert!(!Protocol::V6.matches(&v4));
    }

    #[test]
    fn test_payload_never_smaller_than_tag() {
        let config = Config {
            payload_size: 0,
            ..Config::default()
        };
        assert_eq!(config.effective_payload_size(), Tag::WIRE_SIZE);
    }
}
