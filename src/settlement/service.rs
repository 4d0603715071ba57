//! Orchestration of imports, settlement runs, and the payment lifecycle.
//!
//! The service owns no business arithmetic itself: identities, normalizers,
//! the calculator, and the commission engine are all pure, and the service
//! wires them to the repository under per-(driver, week) advisory locks.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use super::aggregate::aggregate_week;
use super::calculator::{calculate, CalculatorError, FeeConfig};
use super::commission::{CommissionEngine, DriverWeekDraft, GoalRule, ReferralConfig, ReferralForest};
use super::domain::{
    Cents, DriverId, DriverIdentity, FinancingAgreement, Platform, RawRecord, ReferralLink,
    SettlementBreakdown,
};
use super::identity::IdentityIndex;
use super::lifecycle::{DriverWeeklySettlement, LifecycleError};
use super::normalizer::normalize_batch;
use super::report::{export_csv, SkipCategory, SkippedDriver, WeekRunReport};
use super::repository::{EarningRecordRepository, RepositoryError, SettlementRepository};
use super::week::WeekId;

/// The full admin-editable rule surface, snapshotted at the top of each run.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub fees: FeeConfig,
    pub referral: ReferralConfig,
    pub goals: Vec<GoalRule>,
    /// Unreconciled amount (cents) a week may carry and still count as
    /// complete.
    pub unreconciled_threshold: Cents,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            fees: FeeConfig::default(),
            referral: ReferralConfig::default(),
            goals: Vec::new(),
            unreconciled_threshold: 0,
        }
    }
}

/// Source of the current rule sets. Implementations re-read admin-edited
/// configuration; the engine never caches rules across runs.
pub trait RuleProvider: Send + Sync {
    fn current(&self) -> RuleSet;
}

/// Read side of the driver registry plus the write-back hook for financing
/// countdowns. Refetched per run so admin edits apply without restarts.
pub trait FleetDirectory: Send + Sync {
    fn active_drivers(&self) -> Vec<DriverIdentity>;
    fn financing_agreements(&self) -> Vec<FinancingAgreement>;
    fn referral_links(&self) -> Vec<ReferralLink>;
    /// Persist the post-settlement financing state for one driver. Called
    /// only after that driver's settlement upsert succeeded.
    fn commit_financing(&self, driver: &DriverId, agreements: Vec<FinancingAgreement>);
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettlementError {
    #[error("settlement for {driver} {week} is frozen")]
    Frozen { driver: DriverId, week: WeekId },
    #[error("another writer holds {driver} {week}; retry")]
    Conflict { driver: DriverId, week: WeekId },
    #[error("no settlement for {driver} {week}")]
    NotFound { driver: DriverId, week: WeekId },
    #[error("invalid payment state: {0}")]
    InvalidTransition(String),
    #[error("export failed: {0}")]
    Export(String),
    #[error("repository failure: {0}")]
    Repository(String),
}

impl From<RepositoryError> for SettlementError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Frozen { driver, week } => SettlementError::Frozen { driver, week },
            RepositoryError::VersionConflict { driver, week, .. } => {
                SettlementError::Conflict { driver, week }
            }
            RepositoryError::Missing { driver, week } => SettlementError::NotFound { driver, week },
            RepositoryError::Unavailable(message) => SettlementError::Repository(message),
        }
    }
}

impl From<LifecycleError> for SettlementError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Frozen { driver, week } => SettlementError::Frozen { driver, week },
            other => SettlementError::InvalidTransition(other.to_string()),
        }
    }
}

/// Outcome of one import batch, reported back to the ingestion caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub platform: Platform,
    pub week: WeekId,
    pub imported: usize,
    pub skipped: usize,
    pub unmapped: usize,
}

pub struct SettlementService<S, D, P> {
    store: Arc<S>,
    directory: Arc<D>,
    rules: Arc<P>,
    locks: Mutex<HashSet<(DriverId, WeekId)>>,
    last_reports: Mutex<HashMap<WeekId, WeekRunReport>>,
}

impl<S, D, P> SettlementService<S, D, P>
where
    S: SettlementRepository + EarningRecordRepository + 'static,
    D: FleetDirectory + 'static,
    P: RuleProvider + 'static,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, rules: Arc<P>) -> Self {
        Self {
            store,
            directory,
            rules,
            locks: Mutex::new(HashSet::new()),
            last_reports: Mutex::new(HashMap::new()),
        }
    }

    /// Normalize and persist one `(platform, week)` batch, replacing any
    /// prior import of the same pair. Paid driver-weeks reject the batch.
    pub fn import_batch(
        &self,
        platform: Platform,
        week: WeekId,
        rows: &[RawRecord],
    ) -> Result<ImportSummary, SettlementError> {
        let drivers = self.directory.active_drivers();
        let index = IdentityIndex::build(&drivers);
        let batch = normalize_batch(platform, week, rows, &index);
        let summary = ImportSummary {
            platform,
            week,
            imported: batch.records.len(),
            skipped: batch.skipped,
            unmapped: batch.unmapped,
        };
        self.store.replace_batch(platform, week, batch.records)?;
        info!(
            platform = platform.label(),
            week = %week,
            imported = summary.imported,
            skipped = summary.skipped,
            unmapped = summary.unmapped,
            "import batch stored"
        );
        Ok(summary)
    }

    /// Settle every driver with records in `week`. Already-paid driver-weeks
    /// are skipped and counted; per-driver failures land in the report
    /// without aborting the batch.
    pub fn run_week(&self, week: WeekId) -> Result<WeekRunReport, SettlementError> {
        self.run_internal(week, None)
    }

    /// Recompute the whole week, or a single driver when `driver` is given.
    /// A single-driver recompute of a frozen settlement is a hard error.
    pub fn recompute(
        &self,
        week: WeekId,
        driver: Option<DriverId>,
    ) -> Result<WeekRunReport, SettlementError> {
        self.run_internal(week, driver.as_ref())
    }

    pub fn settlement(
        &self,
        driver: &DriverId,
        week: WeekId,
    ) -> Result<DriverWeeklySettlement, SettlementError> {
        self.store
            .fetch(driver, week)?
            .ok_or_else(|| SettlementError::NotFound {
                driver: driver.clone(),
                week,
            })
    }

    pub fn settlements(&self, week: WeekId) -> Result<Vec<DriverWeeklySettlement>, SettlementError> {
        Ok(self.store.week_settlements(week)?)
    }

    /// `pending → paid` with the freeze check and the version compare folded
    /// into the store's transactional upsert.
    pub fn mark_paid(
        &self,
        driver: &DriverId,
        week: WeekId,
        paid_on: NaiveDate,
        proof_reference: String,
    ) -> Result<DriverWeeklySettlement, SettlementError> {
        let _guard = self.acquire(driver, week)?;
        let mut settlement = self.settlement(driver, week)?;
        let expected = settlement.version();
        settlement.mark_paid(paid_on, proof_reference)?;
        let stored = self.store.upsert(settlement, Some(expected))?;
        info!(driver = %driver, week = %week, "settlement marked paid and frozen");
        Ok(stored)
    }

    /// `pending → cancelled`, terminal with no money moved.
    pub fn cancel(
        &self,
        driver: &DriverId,
        week: WeekId,
    ) -> Result<DriverWeeklySettlement, SettlementError> {
        let _guard = self.acquire(driver, week)?;
        let mut settlement = self.settlement(driver, week)?;
        let expected = settlement.version();
        settlement.cancel()?;
        let stored = self.store.upsert(settlement, Some(expected))?;
        info!(driver = %driver, week = %week, "settlement cancelled");
        Ok(stored)
    }

    /// Append-only proof re-upload on a paid settlement.
    pub fn attach_proof(
        &self,
        driver: &DriverId,
        week: WeekId,
        proof_reference: String,
    ) -> Result<DriverWeeklySettlement, SettlementError> {
        Ok(self.store.attach_proof(driver, week, proof_reference)?)
    }

    /// Last run's report for the week, or a state-derived summary when the
    /// engine has not run since startup. The fallback never claims
    /// `complete`: per-driver errors from the last real run cannot be
    /// recovered from stored settlements alone.
    pub fn weekly_report(&self, week: WeekId) -> Result<WeekRunReport, SettlementError> {
        if let Ok(reports) = self.last_reports.lock() {
            if let Some(report) = reports.get(&week) {
                return Ok(report.clone());
            }
        }

        let records = self.store.week_records(week)?;
        let aggregation = aggregate_week(week, &records);
        let settlements = self.store.week_settlements(week)?;

        let mut report = WeekRunReport::empty(week);
        report.processed = settlements.len();
        report.frozen_skipped = settlements.iter().filter(|s| s.is_frozen()).count();
        report.unreconciled = aggregation.unreconciled.clone();
        report.unreconciled_total = aggregation.unreconciled_total();
        Ok(report)
    }

    /// Itemized CSV of the week's settlements for the export collaborator.
    pub fn export_week_csv(&self, week: WeekId) -> Result<String, SettlementError> {
        let settlements = self.settlements(week)?;
        export_csv(&settlements).map_err(|err| SettlementError::Export(err.to_string()))
    }

    fn run_internal(
        &self,
        week: WeekId,
        only: Option<&DriverId>,
    ) -> Result<WeekRunReport, SettlementError> {
        let rules = self.rules.current();
        let drivers: BTreeMap<DriverId, DriverIdentity> = self
            .directory
            .active_drivers()
            .into_iter()
            .map(|driver| (driver.id.clone(), driver))
            .collect();
        let agreements = self.directory.financing_agreements();
        let forest = ReferralForest::from_links(&self.directory.referral_links());

        let records = self.store.week_records(week)?;
        let aggregation = aggregate_week(week, &records);
        let existing: HashMap<DriverId, DriverWeeklySettlement> = self
            .store
            .week_settlements(week)?
            .into_iter()
            .map(|settlement| (settlement.driver().clone(), settlement))
            .collect();

        if let Some(target) = only {
            if !aggregation.per_driver.contains_key(target) {
                return Err(SettlementError::NotFound {
                    driver: target.clone(),
                    week,
                });
            }
        }

        let mut report = WeekRunReport::empty(week);
        report.unreconciled = aggregation.unreconciled.clone();
        report.unreconciled_total = aggregation.unreconciled_total();

        // Phase one: pure base calculation per driver. The whole week is
        // always computed, even for a single-driver recompute, because
        // commissions read other drivers' bases.
        let mut drafts: BTreeMap<DriverId, DriverWeekDraft> = BTreeMap::new();
        let mut settled: BTreeMap<DriverId, SettlementBreakdown> = BTreeMap::new();
        let mut financing_updates: BTreeMap<DriverId, Vec<FinancingAgreement>> = BTreeMap::new();
        for (driver_id, totals) in &aggregation.per_driver {
            if let Some(frozen) = existing
                .get(driver_id)
                .filter(|settlement| settlement.is_frozen())
            {
                if only == Some(driver_id) {
                    return Err(SettlementError::Frozen {
                        driver: driver_id.clone(),
                        week,
                    });
                }
                // Not recomputed, but its stored base still anchors the
                // commissions of drivers who recruited it.
                settled.insert(driver_id.clone(), frozen.breakdown().clone());
                report.frozen_skipped += 1;
                continue;
            }

            let Some(identity) = drivers.get(driver_id) else {
                report.skipped.push(SkippedDriver {
                    driver: driver_id.clone(),
                    category: SkipCategory::UnknownDriver,
                    reason: "records resolve to a driver no longer active".to_string(),
                });
                continue;
            };

            let driver_agreements: Vec<FinancingAgreement> = agreements
                .iter()
                .filter(|agreement| &agreement.driver == driver_id)
                .cloned()
                .collect();

            match calculate(identity, week, totals, &driver_agreements, &rules.fees) {
                Ok(outcome) => {
                    drafts.insert(
                        driver_id.clone(),
                        DriverWeekDraft {
                            totals: totals.clone(),
                            breakdown: outcome.breakdown,
                        },
                    );
                    financing_updates.insert(driver_id.clone(), outcome.financing);
                }
                Err(error @ CalculatorError::NegativeGross { .. }) => {
                    report.data_integrity_errors += 1;
                    report.skipped.push(SkippedDriver {
                        driver: driver_id.clone(),
                        category: SkipCategory::DataIntegrity,
                        reason: error.to_string(),
                    });
                }
                Err(error) => {
                    report.configuration_errors += 1;
                    report.skipped.push(SkippedDriver {
                        driver: driver_id.clone(),
                        category: SkipCategory::Configuration,
                        reason: error.to_string(),
                    });
                }
            }
        }

        // Phase two: commissions and bonuses across the week's drafts, with
        // frozen settlements contributing their bases read-only.
        let engine = CommissionEngine::new(&rules.referral, &rules.goals);
        engine.apply_week(&forest, &drivers, week, &mut drafts, &settled);

        // Phase three: per-driver transactional writes.
        let computed_at = Utc::now().naive_utc();
        for (driver_id, draft) in drafts {
            if let Some(target) = only {
                if &driver_id != target {
                    continue;
                }
            }

            let guard = match self.acquire(&driver_id, week) {
                Ok(guard) => guard,
                Err(error @ SettlementError::Conflict { .. }) => {
                    if only.is_some() {
                        return Err(error);
                    }
                    report.skipped.push(SkippedDriver {
                        driver: driver_id.clone(),
                        category: SkipCategory::Conflict,
                        reason: error.to_string(),
                    });
                    continue;
                }
                Err(other) => return Err(other),
            };

            let (settlement, expected) = match existing.get(&driver_id) {
                Some(previous) => {
                    let mut next = previous.clone();
                    match next.replace_breakdown(draft.breakdown, computed_at) {
                        Ok(()) => (next, Some(previous.version())),
                        Err(_) => {
                            report.frozen_skipped += 1;
                            drop(guard);
                            continue;
                        }
                    }
                }
                None => (
                    DriverWeeklySettlement::new(driver_id.clone(), week, draft.breakdown, computed_at),
                    None,
                ),
            };

            match self.store.upsert(settlement, expected) {
                Ok(_) => {
                    report.processed += 1;
                    if let Some(updates) = financing_updates.remove(&driver_id) {
                        self.directory.commit_financing(&driver_id, updates);
                    }
                }
                Err(RepositoryError::Frozen { driver, week }) => {
                    if only.is_some() {
                        return Err(SettlementError::Frozen { driver, week });
                    }
                    report.frozen_skipped += 1;
                }
                Err(RepositoryError::VersionConflict { driver, week, .. }) => {
                    let error = SettlementError::Conflict {
                        driver: driver.clone(),
                        week,
                    };
                    if only.is_some() {
                        return Err(error);
                    }
                    report.skipped.push(SkippedDriver {
                        driver,
                        category: SkipCategory::Conflict,
                        reason: error.to_string(),
                    });
                }
                Err(other) => return Err(other.into()),
            }
            drop(guard);
        }

        report.complete = report.skipped.is_empty()
            && report.configuration_errors == 0
            && report.data_integrity_errors == 0
            && aggregation.is_reconciled(rules.unreconciled_threshold);

        if let Ok(mut reports) = self.last_reports.lock() {
            reports.insert(week, report.clone());
        }
        info!(
            week = %week,
            processed = report.processed,
            skipped = report.skipped.len(),
            frozen = report.frozen_skipped,
            unreconciled = report.unreconciled_total,
            complete = report.complete,
            "settlement run finished"
        );
        Ok(report)
    }

    fn acquire(&self, driver: &DriverId, week: WeekId) -> Result<KeyGuard<'_>, SettlementError> {
        let mut held = self
            .locks
            .lock()
            .map_err(|_| SettlementError::Repository("lock table poisoned".to_string()))?;
        let key = (driver.clone(), week);
        if !held.insert(key.clone()) {
            return Err(SettlementError::Conflict {
                driver: driver.clone(),
                week,
            });
        }
        Ok(KeyGuard {
            locks: &self.locks,
            key,
        })
    }
}

/// Advisory lock released on drop, even on early returns.
struct KeyGuard<'a> {
    locks: &'a Mutex<HashSet<(DriverId, WeekId)>>,
    key: (DriverId, WeekId),
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut held) = self.locks.lock() {
            held.remove(&self.key);
        }
    }
}

/// Mutex-backed directory used by the binary and the test suites. Real
/// deployments put the admin portal's registry behind this trait.
#[derive(Debug, Default)]
pub struct MemoryFleetDirectory {
    drivers: Mutex<Vec<DriverIdentity>>,
    financing: Mutex<Vec<FinancingAgreement>>,
    links: Mutex<Vec<ReferralLink>>,
}

impl MemoryFleetDirectory {
    pub fn upsert_driver(&self, driver: DriverIdentity) {
        if let Ok(mut drivers) = self.drivers.lock() {
            if let Some(slot) = drivers.iter_mut().find(|d| d.id == driver.id) {
                *slot = driver;
            } else {
                drivers.push(driver);
            }
        }
    }

    pub fn add_financing(&self, agreement: FinancingAgreement) {
        if let Ok(mut financing) = self.financing.lock() {
            financing.push(agreement);
        }
    }

    pub fn add_referral(&self, link: ReferralLink) {
        if let Ok(mut links) = self.links.lock() {
            links.push(link);
        }
    }

    pub fn financing_for(&self, driver: &DriverId) -> Vec<FinancingAgreement> {
        self.financing
            .lock()
            .map(|financing| {
                financing
                    .iter()
                    .filter(|agreement| &agreement.driver == driver)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl FleetDirectory for MemoryFleetDirectory {
    fn active_drivers(&self) -> Vec<DriverIdentity> {
        self.drivers
            .lock()
            .map(|drivers| drivers.iter().filter(|d| d.active).cloned().collect())
            .unwrap_or_default()
    }

    fn financing_agreements(&self) -> Vec<FinancingAgreement> {
        self.financing
            .lock()
            .map(|financing| financing.clone())
            .unwrap_or_default()
    }

    fn referral_links(&self) -> Vec<ReferralLink> {
        self.links
            .lock()
            .map(|links| links.clone())
            .unwrap_or_default()
    }

    fn commit_financing(&self, driver: &DriverId, agreements: Vec<FinancingAgreement>) {
        if let Ok(mut financing) = self.financing.lock() {
            financing.retain(|agreement| &agreement.driver != driver);
            financing.extend(agreements);
        }
    }
}

/// Rule provider over a mutex so admin edits land between runs; every run
/// still sees one consistent snapshot.
#[derive(Debug)]
pub struct StaticRuleProvider {
    rules: Mutex<RuleSet>,
}

impl StaticRuleProvider {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules: Mutex::new(rules),
        }
    }

    pub fn replace(&self, rules: RuleSet) {
        if let Ok(mut current) = self.rules.lock() {
            *current = rules;
        }
    }
}

impl Default for StaticRuleProvider {
    fn default() -> Self {
        Self::new(RuleSet::default())
    }
}

impl RuleProvider for StaticRuleProvider {
    fn current(&self) -> RuleSet {
        self.rules
            .lock()
            .map(|rules| rules.clone())
            .unwrap_or_default()
    }
}
