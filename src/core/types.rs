use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Destination address meaning "all stations"
pub const BROADCAST_ADDRESS: u8 = 255;

/// Highest address a master station may use
pub const MAX_MASTER_ADDRESS: u8 = 127;

/// Largest payload a standard frame may carry
pub const MAX_PAYLOAD_LENGTH: usize = 501;

/// Line speeds a station may be configured for
pub const SUPPORTED_BAUD_RATES: [u32; 6] = [9600, 19200, 38400, 57600, 76800, 115200];

/// What to discard when the inbound queue is already full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Keep the queued entries, lose the arriving one
    DropNewest,
    /// Evict the oldest queued entry to make room
    DropOldest,
}

/// Wall-clock timeouts of the master node state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Longest wait for the answer to a request expecting a reply
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub reply_timeout: Duration,
    /// Window in which a request addressed to us must be answered
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub reply_delay: Duration,
    /// Longest time the token may be held
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub usage_timeout: Duration,
    /// Line silence after which the token is presumed lost
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub no_token: Duration,
    /// Wait for a reply to a single poll-for-master probe
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub slot: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            reply_timeout: Duration::from_millis(255),
            reply_delay: Duration::from_millis(250),
            usage_timeout: Duration::from_millis(20),
            no_token: Duration::from_millis(500),
            slot: Duration::from_millis(10),
        }
    }
}

impl Timeouts {
    /// Checks every timeout against its permitted range
    pub fn validate(&self) -> Result<()> {
        check_range("reply_timeout", self.reply_timeout, 255, 300)?;
        check_range("reply_delay", self.reply_delay, 0, 250)?;
        check_range("usage_timeout", self.usage_timeout, 15, 100)?;
        check_range("no_token", self.no_token, 500, 1000)?;
        check_range("slot", self.slot, 5, 15)?;
        Ok(())
    }
}

fn check_range(name: &str, value: Duration, min_ms: u64, max_ms: u64) -> Result<()> {
    let min = Duration::from_millis(min_ms);
    let max = Duration::from_millis(max_ms);
    if value < min || value > max {
        return Err(Error::config(format!(
            "{} of {:?} outside {}..={} ms",
            name, value, min_ms, max_ms
        )));
    }
    Ok(())
}

/// Per-station configuration, fixed for the lifetime of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This station's address (`This_Station`)
    pub station: u8,
    /// Highest address that may hold a master (`Nmax_master`)
    pub max_master: u8,
    /// Payload frames sent per token hold (`Nmax_info_frames`)
    pub max_info_frames: u8,
    /// Token rotations between maintenance polls (`Npoll`)
    pub poll_interval: u8,
    /// Line speed in bits per second
    pub baud_rate: u32,
    /// Largest accepted payload length
    pub max_payload: usize,
    /// Capacity of the outbound queue
    pub outbound_capacity: usize,
    /// Capacity of the inbound queue
    pub inbound_capacity: usize,
    /// Inbound overflow behaviour
    pub inbound_overflow: OverflowPolicy,
    /// State machine timeouts
    pub timeouts: Timeouts,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            station: 3,
            max_master: MAX_MASTER_ADDRESS,
            max_info_frames: 1,
            poll_interval: 50,
            baud_rate: 38400,
            max_payload: MAX_PAYLOAD_LENGTH,
            outbound_capacity: 16,
            inbound_capacity: 16,
            inbound_overflow: OverflowPolicy::DropNewest,
            timeouts: Timeouts::default(),
        }
    }
}

impl NodeConfig {
    /// Creates a default configuration for the given station address
    pub fn for_station(station: u8) -> Self {
        NodeConfig {
            station,
            ..Default::default()
        }
    }

    /// Validates the configuration as a whole
    pub fn validate(&self) -> Result<()> {
        if self.max_master > MAX_MASTER_ADDRESS {
            return Err(Error::config(format!(
                "max_master {} exceeds {}",
                self.max_master, MAX_MASTER_ADDRESS
            )));
        }
        if self.station > self.max_master {
            return Err(Error::config(format!(
                "station {} above max_master {}",
                self.station, self.max_master
            )));
        }
        if self.max_info_frames == 0 {
            return Err(Error::config("max_info_frames must be at least 1"));
        }
        if self.poll_interval == 0 {
            return Err(Error::config("poll_interval must be at least 1"));
        }
        if !SUPPORTED_BAUD_RATES.contains(&self.baud_rate) {
            return Err(Error::config(format!("unsupported baud rate {}", self.baud_rate)));
        }
        if self.max_payload == 0 || self.max_payload > MAX_PAYLOAD_LENGTH {
            return Err(Error::config(format!(
                "max_payload {} outside 1..={}",
                self.max_payload, MAX_PAYLOAD_LENGTH
            )));
        }
        if self.outbound_capacity == 0 || self.inbound_capacity == 0 {
            return Err(Error::config("queue capacities must be at least 1"));
        }
        self.timeouts.validate()
    }

    /// Address following `address` in ring order, wrapping after `max_master`
    pub fn successor(&self, address: u8) -> u8 {
        ((address as u16 + 1) % (self.max_master as u16 + 1)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_successor_wraps_at_max_master() {
        let config = NodeConfig::default();
        assert_eq!(config.successor(3), 4);
        assert_eq!(config.successor(126), 127);
        assert_eq!(config.successor(127), 0);

        let small = NodeConfig {
            station: 2,
            max_master: 5,
            ..Default::default()
        };
        assert_eq!(small.successor(5), 0);
        assert_eq!(small.successor(2), 3);
    }

    #[test]
    fn test_station_above_max_master_rejected() {
        let config = NodeConfig {
            station: 10,
            max_master: 5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_timeout_ranges_enforced() {
        let mut config = NodeConfig::default();
        config.timeouts.slot = Duration::from_millis(20);
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.timeouts.no_token = Duration::from_millis(1000);
        config.timeouts.usage_timeout = Duration::from_millis(100);
        assert!(config.validate().is_ok());

        config.timeouts.reply_timeout = Duration::from_millis(200);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unsupported_baud_rejected() {
        let config = NodeConfig {
            baud_rate: 4800,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = NodeConfig {
            station: 12,
            inbound_overflow: OverflowPolicy::DropOldest,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""no_token":500"#));
        assert!(json.contains(r#""inbound_overflow":"drop_oldest""#));

        let parsed: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
