//! Persistence boundary for earning records and settlements.
//!
//! The traits keep the service testable in isolation; the in-memory store is
//! what the binary and the test suites run against. Both the freeze check and
//! the version compare happen inside one locked read-modify-write section, so
//! a settlement can never be observed pending at check time and paid at write
//! time.

use std::collections::HashMap;
use std::sync::Mutex;

use super::domain::{DriverId, NormalizedEarningRecord, Platform};
use super::lifecycle::DriverWeeklySettlement;
use super::week::WeekId;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("settlement for {driver} {week} is frozen")]
    Frozen { driver: DriverId, week: WeekId },
    #[error("settlement for {driver} {week} changed underneath the writer (expected version {expected})")]
    VersionConflict {
        driver: DriverId,
        week: WeekId,
        expected: u64,
    },
    #[error("settlement for {driver} {week} does not exist")]
    Missing { driver: DriverId, week: WeekId },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Normalized platform records, replaced batch-wise per (platform, week).
pub trait EarningRecordRepository: Send + Sync {
    /// Replace all records for the `(platform, week)` pair. Must reject the
    /// whole batch with [`RepositoryError::Frozen`] when any driver touched
    /// by the old or new record set already has a paid settlement for the
    /// week, leaving stored records byte-identical.
    fn replace_batch(
        &self,
        platform: Platform,
        week: WeekId,
        records: Vec<NormalizedEarningRecord>,
    ) -> Result<(), RepositoryError>;

    fn week_records(&self, week: WeekId) -> Result<Vec<NormalizedEarningRecord>, RepositoryError>;
}

/// Weekly settlements, upserted per driver-week under the freeze invariant.
pub trait SettlementRepository: Send + Sync {
    fn fetch(
        &self,
        driver: &DriverId,
        week: WeekId,
    ) -> Result<Option<DriverWeeklySettlement>, RepositoryError>;

    fn week_settlements(&self, week: WeekId)
        -> Result<Vec<DriverWeeklySettlement>, RepositoryError>;

    /// Insert or replace one settlement. `expected_version` carries the
    /// version the writer read before computing; a mismatch means another
    /// writer won the race. A frozen stored settlement rejects any replace.
    fn upsert(
        &self,
        settlement: DriverWeeklySettlement,
        expected_version: Option<u64>,
    ) -> Result<DriverWeeklySettlement, RepositoryError>;

    /// Append-only proof update on a paid settlement.
    fn attach_proof(
        &self,
        driver: &DriverId,
        week: WeekId,
        proof: String,
    ) -> Result<DriverWeeklySettlement, RepositoryError>;
}

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<(Platform, WeekId), Vec<NormalizedEarningRecord>>,
    settlements: HashMap<(DriverId, WeekId), DriverWeeklySettlement>,
}

/// Mutex-guarded in-memory store backing the service binary and the tests.
#[derive(Debug, Default)]
pub struct MemorySettlementStore {
    inner: Mutex<StoreState>,
}

impl MemorySettlementStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreState>, RepositoryError> {
        self.inner
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl EarningRecordRepository for MemorySettlementStore {
    fn replace_batch(
        &self,
        platform: Platform,
        week: WeekId,
        records: Vec<NormalizedEarningRecord>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;

        let existing = state.records.get(&(platform, week));
        let touched = existing
            .into_iter()
            .flatten()
            .chain(records.iter())
            .filter_map(|record| record.driver.clone());
        for driver in touched {
            if let Some(settlement) = state.settlements.get(&(driver.clone(), week)) {
                if settlement.is_frozen() {
                    return Err(RepositoryError::Frozen { driver, week });
                }
            }
        }

        state.records.insert((platform, week), records);
        Ok(())
    }

    fn week_records(&self, week: WeekId) -> Result<Vec<NormalizedEarningRecord>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .records
            .iter()
            .filter(|((_, record_week), _)| *record_week == week)
            .flat_map(|(_, records)| records.iter().cloned())
            .collect())
    }
}

impl SettlementRepository for MemorySettlementStore {
    fn fetch(
        &self,
        driver: &DriverId,
        week: WeekId,
    ) -> Result<Option<DriverWeeklySettlement>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.settlements.get(&(driver.clone(), week)).cloned())
    }

    fn week_settlements(
        &self,
        week: WeekId,
    ) -> Result<Vec<DriverWeeklySettlement>, RepositoryError> {
        let state = self.lock()?;
        let mut settlements: Vec<DriverWeeklySettlement> = state
            .settlements
            .values()
            .filter(|s| s.week() == week)
            .cloned()
            .collect();
        settlements.sort_by(|a, b| a.driver().cmp(b.driver()));
        Ok(settlements)
    }

    fn upsert(
        &self,
        mut settlement: DriverWeeklySettlement,
        expected_version: Option<u64>,
    ) -> Result<DriverWeeklySettlement, RepositoryError> {
        let mut state = self.lock()?;
        let key = (settlement.driver().clone(), settlement.week());

        match (state.settlements.get(&key), expected_version) {
            (Some(stored), _) if stored.is_frozen() => {
                return Err(RepositoryError::Frozen {
                    driver: key.0,
                    week: key.1,
                });
            }
            (Some(stored), Some(expected)) => {
                if stored.version() != expected {
                    return Err(RepositoryError::VersionConflict {
                        driver: key.0,
                        week: key.1,
                        expected,
                    });
                }
                settlement.set_version(stored.version() + 1);
            }
            (Some(stored), None) => {
                settlement.set_version(stored.version() + 1);
            }
            (None, Some(expected)) => {
                return Err(RepositoryError::VersionConflict {
                    driver: key.0,
                    week: key.1,
                    expected,
                });
            }
            (None, None) => {
                settlement.set_version(1);
            }
        }

        state.settlements.insert(key, settlement.clone());
        Ok(settlement)
    }

    fn attach_proof(
        &self,
        driver: &DriverId,
        week: WeekId,
        proof: String,
    ) -> Result<DriverWeeklySettlement, RepositoryError> {
        let mut state = self.lock()?;
        let key = (driver.clone(), week);
        let settlement = state
            .settlements
            .get_mut(&key)
            .ok_or(RepositoryError::Missing {
                driver: driver.clone(),
                week,
            })?;
        settlement
            .attach_proof(proof)
            .map_err(|_| RepositoryError::Frozen {
                driver: driver.clone(),
                week,
            })?;
        Ok(settlement.clone())
    }
}
