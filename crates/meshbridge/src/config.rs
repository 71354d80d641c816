//! Bridge configuration with 802.1D parameter validation.

use crate::error::{BridgeError, BridgeResult};
use meshbridge_types::MacAddress;
use std::time::Duration;

/// Default FDB ageing time (IEEE 802.1D, 5 minutes).
pub const DEFAULT_AGEING_TIME: Duration = Duration::from_secs(300);

/// Default multicast membership ageing time.
pub const DEFAULT_MCAST_AGEING_TIME: Duration = Duration::from_secs(260);

/// Default hello time.
pub const DEFAULT_HELLO_TIME: Duration = Duration::from_secs(2);

/// Default max age.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(20);

/// Default forward delay.
pub const DEFAULT_FORWARD_DELAY: Duration = Duration::from_secs(15);

/// Minimum quiet period on a port after STP activity before the direct-route
/// shortcut is taken again.
pub const DEFAULT_DIRECT_HOLDOFF: Duration = Duration::from_secs(30);

/// Upper bound on FDB entries; a learn that would exceed it fails the single
/// operation and drops the frame.
pub const DEFAULT_FDB_CAPACITY: usize = 4096;

/// Upper bound on tracked multicast groups.
pub const DEFAULT_MCAST_CAPACITY: usize = 256;

/// Configuration for one bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bridge priority (high 16 bits of the bridge id).
    pub priority: u16,
    /// Pinned bridge MAC; when unset the lowest attached port MAC is used.
    pub static_mac: Option<MacAddress>,
    /// FDB ageing time.
    pub ageing_time: Duration,
    /// Multicast membership ageing time.
    pub mcast_ageing_time: Duration,
    /// Configured hello time (used while this bridge is root).
    pub hello_time: Duration,
    /// Configured max age.
    pub max_age: Duration,
    /// Configured forward delay.
    pub forward_delay: Duration,
    /// Uplink/proxy operation: satellite traffic is presented upstream
    /// under the bridge's own address.
    pub proxy_uplink: bool,
    /// Quiet period after STP activity before direct routing resumes.
    pub direct_holdoff: Duration,
    /// OUI prefixes whose stations get the priority forwarding class.
    pub priority_ouis: Vec<[u8; 3]>,
    /// FDB entry cap.
    pub fdb_capacity: usize,
    /// Multicast group cap.
    pub mcast_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            priority: meshbridge_types::DEFAULT_BRIDGE_PRIORITY,
            static_mac: None,
            ageing_time: DEFAULT_AGEING_TIME,
            mcast_ageing_time: DEFAULT_MCAST_AGEING_TIME,
            hello_time: DEFAULT_HELLO_TIME,
            max_age: DEFAULT_MAX_AGE,
            forward_delay: DEFAULT_FORWARD_DELAY,
            proxy_uplink: false,
            direct_holdoff: DEFAULT_DIRECT_HOLDOFF,
            priority_ouis: Vec::new(),
            fdb_capacity: DEFAULT_FDB_CAPACITY,
            mcast_capacity: DEFAULT_MCAST_CAPACITY,
        }
    }
}

impl BridgeConfig {
    /// Validates the 802.1D timer relationships:
    /// `2 * (forward_delay - 1s) >= max_age >= 2 * (hello_time + 1s)`,
    /// with each timer inside its standard range.
    pub fn validate(&self) -> BridgeResult<()> {
        check_range("hello time", self.hello_time, 1, 10)?;
        check_range("max age", self.max_age, 6, 40)?;
        check_range("forward delay", self.forward_delay, 4, 30)?;

        let two = |d: Duration| d * 2;
        if two(self.forward_delay - Duration::from_secs(1)) < self.max_age {
            return Err(BridgeError::InvalidArgument(format!(
                "max age {:?} incompatible with forward delay {:?}",
                self.max_age, self.forward_delay
            )));
        }
        if self.max_age < two(self.hello_time + Duration::from_secs(1)) {
            return Err(BridgeError::InvalidArgument(format!(
                "max age {:?} incompatible with hello time {:?}",
                self.max_age, self.hello_time
            )));
        }
        Ok(())
    }

    /// Returns the forwarding class for a station address.
    pub fn is_priority_oui(&self, mac: &MacAddress) -> bool {
        self.priority_ouis.iter().any(|p| *p == mac.oui())
    }
}

fn check_range(name: &str, value: Duration, min_secs: u64, max_secs: u64) -> BridgeResult<()> {
    if value < Duration::from_secs(min_secs) || value > Duration::from_secs(max_secs) {
        return Err(BridgeError::InvalidArgument(format!(
            "{} {:?} outside [{}s, {}s]",
            name, value, min_secs, max_secs
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(BridgeConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_out_of_range_hello_rejected() {
        let config = BridgeConfig {
            hello_time: Duration::from_secs(11),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_incompatible_max_age_rejected() {
        // max age larger than twice (forward delay - 1)
        let config = BridgeConfig {
            max_age: Duration::from_secs(40),
            forward_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_priority_oui_match() {
        let config = BridgeConfig {
            priority_ouis: vec![[0x00, 0x0e, 0x58]],
            ..Default::default()
        };
        let station: MacAddress = "00:0e:58:11:22:33".parse().unwrap();
        let other: MacAddress = "00:11:22:33:44:55".parse().unwrap();
        assert!(config.is_priority_oui(&station));
        assert!(!config.is_priority_oui(&other));
    }
}
