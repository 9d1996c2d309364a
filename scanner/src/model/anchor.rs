//! Anchor table
//!
//! Anchors are the fixed beacons the scanner measures. The table is loaded
//! from configuration once and never mutated while a session runs.

use std::collections::{HashMap, HashSet};

use anyhow::bail;
use lib_utils::mac;
use serde::Deserialize;

/// Planar anchor coordinate in metres
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnchorInfo {
    pub name: String,
    pub address: String,
    /// Carried for trilateration downstream; the scanner does not use it
    #[serde(default)]
    pub position: Option<Position>,
}

/// Registered anchors indexed by normalized hardware address
#[derive(Debug, Clone, Default)]
pub struct AnchorRegistry {
    by_address: HashMap<String, AnchorInfo>,
}

impl AnchorRegistry {
    /// Build the registry, rejecting duplicate names or addresses and
    /// unparsable addresses.
    pub fn new(anchors: Vec<AnchorInfo>) -> anyhow::Result<Self> {
        let mut names = HashSet::new();
        let mut by_address = HashMap::new();

        for anchor in anchors {
            let Some(address) = mac::normalize(&anchor.address) else {
                bail!(
                    "Anchor {} has an invalid address: {:?}",
                    anchor.name,
                    anchor.address
                );
            };
            if !names.insert(anchor.name.clone()) {
                bail!("Anchor name {} is registered more than once", anchor.name);
            }
            if by_address.contains_key(&address) {
                bail!("Anchor address {} is registered more than once", address);
            }
            by_address.insert(address.clone(), AnchorInfo { address, ..anchor });
        }

        Ok(Self { by_address })
    }

    /// Look up an anchor by an already normalized address
    pub fn lookup(&self, address: &str) -> Option<&AnchorInfo> {
        self.by_address.get(address)
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

/// Resolve the name an observation is reported under.
///
/// Registered name for the address first, then the advertised name, then the
/// raw address.
pub fn resolve_anchor_name(
    registry: &AnchorRegistry,
    advertised_name: Option<&str>,
    address: &str,
) -> String {
    if let Some(anchor) = registry.lookup(address) {
        return anchor.name.clone();
    }

    match advertised_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => address.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(name: &str, address: &str) -> AnchorInfo {
        AnchorInfo {
            name: name.to_string(),
            address: address.to_string(),
            position: None,
        }
    }

    fn registry() -> AnchorRegistry {
        AnchorRegistry::new(vec![
            anchor("Anchor1", "aa:bb:cc:dd:ee:01"),
            anchor("Anchor2", "AA-BB-CC-DD-EE-02"),
        ])
        .unwrap()
    }

    #[test]
    fn test_registry_normalizes_addresses() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        let anchor = registry.lookup("AA:BB:CC:DD:EE:02").unwrap();
        assert_eq!(anchor.name, "Anchor2");
        assert_eq!(anchor.address, "AA:BB:CC:DD:EE:02");
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let duplicate_name = AnchorRegistry::new(vec![
            anchor("Anchor1", "AA:BB:CC:DD:EE:01"),
            anchor("Anchor1", "AA:BB:CC:DD:EE:02"),
        ]);
        assert!(duplicate_name.is_err());

        let duplicate_address = AnchorRegistry::new(vec![
            anchor("Anchor1", "AA:BB:CC:DD:EE:01"),
            anchor("Anchor2", "aa:bb:cc:dd:ee:01"),
        ]);
        assert!(duplicate_address.is_err());
    }

    #[test]
    fn test_registry_rejects_bad_address() {
        assert!(AnchorRegistry::new(vec![anchor("Anchor1", "nope")]).is_err());
    }

    #[test]
    fn test_resolve_prefers_registered_name() {
        let registry = registry();
        assert_eq!(
            resolve_anchor_name(&registry, Some("nRF52-DK"), "AA:BB:CC:DD:EE:01"),
            "Anchor1"
        );
    }

    #[test]
    fn test_resolve_falls_back_to_advertised_then_address() {
        let registry = registry();
        assert_eq!(
            resolve_anchor_name(&registry, Some("Beacon7"), "AA:BB:CC:DD:EE:07"),
            "Beacon7"
        );
        assert_eq!(
            resolve_anchor_name(&registry, Some("  "), "AA:BB:CC:DD:EE:07"),
            "AA:BB:CC:DD:EE:07"
        );
        assert_eq!(
            resolve_anchor_name(&registry, None, "AA:BB:CC:DD:EE:07"),
            "AA:BB:CC:DD:EE:07"
        );
    }
}
