//! Folding normalized records into per-driver weekly totals.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{Cents, DriverId, NormalizedEarningRecord, Platform, RecordKind};
use super::week::WeekId;

/// Raw money totals for one driver-week, prior to any calculation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeekTotals {
    pub revenue_by_platform: BTreeMap<Platform, Cents>,
    pub tips: Cents,
    pub trip_count: u32,
    /// Toll charges as billed by the operator, before markup correction.
    pub tolls: Cents,
    pub fuel: Cents,
}

impl WeekTotals {
    /// Trip revenue plus tips across all platforms.
    pub fn gross_revenue(&self) -> Cents {
        self.revenue_by_platform.values().sum::<Cents>() + self.tips
    }
}

/// Everything the aggregator knows about one week: per-driver totals plus
/// the unreconciled remainder that belongs to nobody yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekAggregation {
    pub week: WeekId,
    pub per_driver: BTreeMap<DriverId, WeekTotals>,
    /// Amounts from unmapped records, per platform. A week is not complete
    /// while this is materially non-zero.
    pub unreconciled: BTreeMap<Platform, Cents>,
}

impl WeekAggregation {
    pub fn unreconciled_total(&self) -> Cents {
        self.unreconciled.values().sum()
    }

    pub fn is_reconciled(&self, threshold: Cents) -> bool {
        self.unreconciled_total() <= threshold
    }
}

/// Sum records by driver, kind, and platform. Unmapped records never enter a
/// driver's totals; they only feed the unreconciled tally.
pub fn aggregate_week(week: WeekId, records: &[NormalizedEarningRecord]) -> WeekAggregation {
    let mut per_driver: BTreeMap<DriverId, WeekTotals> = BTreeMap::new();
    let mut unreconciled: BTreeMap<Platform, Cents> = BTreeMap::new();

    for record in records.iter().filter(|r| r.week == week) {
        let Some(driver) = &record.driver else {
            *unreconciled.entry(record.platform).or_default() += record.amount;
            continue;
        };

        let totals = per_driver.entry(driver.clone()).or_default();
        match record.kind {
            RecordKind::TripRevenue => {
                *totals.revenue_by_platform.entry(record.platform).or_default() += record.amount;
                totals.trip_count += 1;
            }
            RecordKind::Tip => totals.tips += record.amount,
            RecordKind::Toll => totals.tolls += record.amount,
            RecordKind::FuelCharge => totals.fuel += record.amount,
        }
    }

    WeekAggregation {
        week,
        per_driver,
        unreconciled,
    }
}
