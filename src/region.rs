//! In-process I/O-port resource table.
//!
//! Plays the role of the kernel resource registrar: every reservation is an
//! exclusive claim on a port range, and overlapping requests are refused.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::traits::{PortRange, PortRegistrar, RegionError};

/// Table of exclusive I/O-port claims.
#[derive(Debug, Default)]
pub struct IoRegionTable {
    /// Claims keyed by their range, with the label they were made under.
    claims: Mutex<BTreeMap<PortRange, String>>,
}

impl IoRegionTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PortRange, String>> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether any port of `range` is claimed.
    pub fn is_claimed(&self, range: PortRange) -> bool {
        self.lock().keys().any(|held| held.overlaps(&range))
    }

    /// Label of the claim covering `port`, if any.
    pub fn owner_of(&self, port: u16) -> Option<String> {
        self.lock()
            .iter()
            .find(|(held, _)| held.contains(port))
            .map(|(_, label)| label.clone())
    }

    /// All claims in port order.
    pub fn claims(&self) -> Vec<(PortRange, String)> {
        self.lock()
            .iter()
            .map(|(range, label)| (*range, label.clone()))
            .collect()
    }

    /// Render the table in the `/proc/ioports` layout.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (range, label) in self.lock().iter() {
            let _ = writeln!(
                out,
                "{:04x}-{:04x} : {label}",
                range.base,
                range.end().saturating_sub(1)
            );
        }
        out
    }
}

impl PortRegistrar for IoRegionTable {
    fn request(&self, range: PortRange, label: &str) -> Result<(), RegionError> {
        if !range.is_valid() {
            return Err(RegionError::Invalid(range));
        }
        let mut claims = self.lock();
        if let Some((held, owner)) = claims.iter().find(|(held, _)| held.overlaps(&range)) {
            warn!(%range, %held, owner = %owner, label, "I/O region busy");
            return Err(RegionError::Busy {
                range,
                held: *held,
                owner: owner.clone(),
            });
        }
        claims.insert(range, label.to_owned());
        debug!(%range, label, "I/O region claimed");
        Ok(())
    }

    fn release(&self, range: PortRange) -> Result<(), RegionError> {
        match self.lock().remove(&range) {
            Some(label) => {
                debug!(%range, label = %label, "I/O region released");
                Ok(())
            }
            None => {
                warn!(%range, "release of I/O region that is not reserved");
                Err(RegionError::NotReserved(range))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_and_release() {
        let table = IoRegionTable::new();
        let lpt1 = PortRange::new(0x378, 3);

        table.request(lpt1, "sbiglpt").expect("request failed");
        assert!(table.is_claimed(lpt1));
        assert_eq!(table.owner_of(0x37A).as_deref(), Some("sbiglpt"));
        assert_eq!(table.owner_of(0x37B), None);

        table.release(lpt1).expect("release failed");
        assert!(!table.is_claimed(lpt1));
    }

    #[test]
    fn test_overlapping_request_is_busy() {
        let table = IoRegionTable::new();
        table
            .request(PortRange::new(0x378, 8), "parport0")
            .expect("request failed");

        let err = table
            .request(PortRange::new(0x37A, 1), "sbiglpt")
            .expect_err("overlap must be refused");
        assert_eq!(
            err,
            RegionError::Busy {
                range: PortRange::new(0x37A, 1),
                held: PortRange::new(0x378, 8),
                owner: "parport0".to_owned(),
            }
        );
    }

    #[test]
    fn test_adjacent_ranges_do_not_conflict() {
        let table = IoRegionTable::new();
        table
            .request(PortRange::new(0x378, 3), "a")
            .expect("request failed");
        table
            .request(PortRange::new(0x37B, 5), "b")
            .expect("adjacent request failed");
        assert_eq!(table.claims().len(), 2);
    }

    #[test]
    fn test_invalid_ranges() {
        let table = IoRegionTable::new();
        assert_eq!(
            table.request(PortRange::new(0x378, 0), "empty"),
            Err(RegionError::Invalid(PortRange::new(0x378, 0)))
        );
        assert!(table.request(PortRange::new(0xFFFE, 4), "wrap").is_err());
        assert!(table.claims().is_empty());
    }

    #[test]
    fn test_release_requires_exact_range() {
        let table = IoRegionTable::new();
        table
            .request(PortRange::new(0x378, 3), "sbiglpt")
            .expect("request failed");
        assert_eq!(
            table.release(PortRange::new(0x378, 2)),
            Err(RegionError::NotReserved(PortRange::new(0x378, 2)))
        );
        assert!(table.is_claimed(PortRange::new(0x378, 3)));
    }

    #[test]
    fn test_listing() {
        let table = IoRegionTable::new();
        table
            .request(PortRange::new(0x3BC, 3), "sbiglpt")
            .expect("request failed");
        table
            .request(PortRange::new(0x278, 3), "parport1")
            .expect("request failed");
        assert_eq!(
            table.listing(),
            "0278-027a : parport1\n03bc-03be : sbiglpt\n"
        );
    }
}
