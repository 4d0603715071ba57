//! Resolution of platform-native references to internal driver identities.
//!
//! Each platform knows a driver by a different key: Uber by API id, Bolt by
//! account email, myPrio by fuel card, Via Verde by toll tag. The index is
//! rebuilt from the active driver registry on every run so admin edits take
//! effect without restarts.

use std::collections::HashMap;

use tracing::warn;

use super::domain::{DriverId, DriverIdentity, Platform};

/// In-memory lookup keyed by `(platform, normalized key)` with a plate
/// fallback for fuel and toll rows that carry a vehicle label.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    keys: HashMap<(Platform, String), DriverId>,
    plates: HashMap<String, DriverId>,
}

impl IdentityIndex {
    /// Build the lookup from the active subset of `drivers`.
    ///
    /// Drivers are indexed in id order, and the first registration of a key
    /// wins, so a duplicate key across two drivers resolves deterministically
    /// to the lexicographically smaller id. The collision is logged for admin
    /// follow-up rather than silently shadowed.
    pub fn build(drivers: &[DriverIdentity]) -> Self {
        let mut active: Vec<&DriverIdentity> = drivers.iter().filter(|d| d.active).collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));

        let mut index = Self::default();
        for driver in active {
            for account in &driver.uber_account_ids {
                // API ids are matched verbatim.
                index.insert_key(Platform::Uber, account.clone(), &driver.id);
            }
            for email in &driver.bolt_account_ids {
                index.insert_key(Platform::Bolt, normalize_email(email), &driver.id);
            }
            if let Some(card) = &driver.fuel_card_key {
                index.insert_key(Platform::MyPrio, normalize_card_key(card), &driver.id);
            }
            if let Some(tag) = &driver.toll_tag_id {
                index.insert_key(Platform::ViaVerde, normalize_card_key(tag), &driver.id);
            }
            if let Some(plate) = &driver.vehicle_plate {
                index.insert_plate(normalize_plate(plate), &driver.id);
            }
        }
        index
    }

    /// Resolve a platform reference to a driver, trying the exact key first
    /// and the plate hint second. `None` means unmapped; the caller must
    /// surface the row for manual reconciliation, never default it.
    pub fn resolve(
        &self,
        platform: Platform,
        reference: &str,
        plate_hint: Option<&str>,
    ) -> Option<&DriverId> {
        let key = match platform {
            Platform::Uber => reference.to_string(),
            Platform::Bolt => normalize_email(reference),
            Platform::MyPrio | Platform::ViaVerde => normalize_card_key(reference),
        };

        if let Some(driver) = self.keys.get(&(platform, key)) {
            return Some(driver);
        }

        plate_hint
            .map(normalize_plate)
            .and_then(|plate| self.plates.get(&plate))
    }

    fn insert_key(&mut self, platform: Platform, key: String, driver: &DriverId) {
        if key.is_empty() {
            return;
        }
        match self.keys.get(&(platform, key.clone())) {
            Some(existing) if existing != driver => {
                warn!(
                    platform = platform.label(),
                    key = %key,
                    kept = %existing,
                    dropped = %driver,
                    "duplicate integration key; keeping first registration"
                );
            }
            Some(_) => {}
            None => {
                self.keys.insert((platform, key), driver.clone());
            }
        }
    }

    fn insert_plate(&mut self, plate: String, driver: &DriverId) {
        if plate.is_empty() {
            return;
        }
        match self.plates.get(&plate) {
            Some(existing) if existing != driver => {
                warn!(
                    plate = %plate,
                    kept = %existing,
                    dropped = %driver,
                    "duplicate vehicle plate; keeping first registration"
                );
            }
            Some(_) => {}
            None => {
                self.plates.insert(plate, driver.clone());
            }
        }
    }
}

/// Fuel-card and toll-tag keys: lower-case, trimmed, nothing further.
pub(crate) fn normalize_card_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Account emails: lower-case, trimmed.
pub(crate) fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Vehicle plates: upper-case with every non-alphanumeric stripped, so
/// `aa-12-bb`, `AA 12 BB`, and `AA·12·BB` all collapse to `AA12BB`.
pub(crate) fn normalize_plate(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
