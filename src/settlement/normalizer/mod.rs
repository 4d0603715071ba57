//! Conversion of raw platform rows into [`NormalizedEarningRecord`]s.
//!
//! Each platform has its own raw shape and its own notion of which record
//! kinds are legitimate, so normalization dispatches through a per-platform
//! registry instead of branching inline. Malformed rows are skipped and
//! counted; coercing them to zero-value records would corrupt aggregates.

mod bolt;
mod myprio;
mod uber;
mod viaverde;

use tracing::debug;

use super::domain::{NormalizedEarningRecord, Platform, RawRecord, RecordKind};
use super::identity::IdentityIndex;
use super::week::WeekId;

/// Pure per-platform interpretation of a raw row.
pub trait PlatformNormalizer: Send + Sync {
    fn platform(&self) -> Platform;

    /// Record kinds this platform can legitimately produce.
    fn accepts(&self, kind: RecordKind) -> bool;

    /// Whether the platform's rows may carry a plate label usable as a
    /// fallback identity key.
    fn uses_plate_fallback(&self) -> bool {
        false
    }
}

/// Reasons a row is rejected during normalization. Rejections are counted,
/// not persisted; an unmapped row is *not* a rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    WrongPlatform,
    UnsupportedKind,
    EmptyReference,
    NonPositiveAmount,
    OutsideWeek,
}

impl RowRejection {
    pub const fn label(&self) -> &'static str {
        match self {
            RowRejection::WrongPlatform => "wrong_platform",
            RowRejection::UnsupportedKind => "unsupported_kind",
            RowRejection::EmptyReference => "empty_reference",
            RowRejection::NonPositiveAmount => "non_positive_amount",
            RowRejection::OutsideWeek => "outside_week",
        }
    }
}

/// Outcome of normalizing one import batch.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub records: Vec<NormalizedEarningRecord>,
    /// Malformed rows dropped from the batch.
    pub skipped: usize,
    /// Rows kept but resolved to no driver.
    pub unmapped: usize,
}

pub fn normalizer_for(platform: Platform) -> &'static dyn PlatformNormalizer {
    static UBER: uber::UberNormalizer = uber::UberNormalizer;
    static BOLT: bolt::BoltNormalizer = bolt::BoltNormalizer;
    static VIAVERDE: viaverde::ViaVerdeNormalizer = viaverde::ViaVerdeNormalizer;
    static MYPRIO: myprio::MyPrioNormalizer = myprio::MyPrioNormalizer;

    match platform {
        Platform::Uber => &UBER,
        Platform::Bolt => &BOLT,
        Platform::ViaVerde => &VIAVERDE,
        Platform::MyPrio => &MYPRIO,
    }
}

/// Normalize one `(platform, week)` import batch. Pure with respect to the
/// inputs; persistence and freeze checks belong to the service layer.
pub fn normalize_batch(
    platform: Platform,
    week: WeekId,
    rows: &[RawRecord],
    index: &IdentityIndex,
) -> NormalizedBatch {
    let normalizer = normalizer_for(platform);
    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0;
    let mut unmapped = 0;

    for row in rows {
        match normalize_row(normalizer, week, row, index) {
            Ok(record) => {
                if record.driver.is_none() {
                    unmapped += 1;
                }
                records.push(record);
            }
            Err(rejection) => {
                debug!(
                    platform = platform.label(),
                    week = %week,
                    reference = %row.reference,
                    reason = rejection.label(),
                    "skipping malformed platform row"
                );
                skipped += 1;
            }
        }
    }

    NormalizedBatch {
        records,
        skipped,
        unmapped,
    }
}

fn normalize_row(
    normalizer: &dyn PlatformNormalizer,
    week: WeekId,
    row: &RawRecord,
    index: &IdentityIndex,
) -> Result<NormalizedEarningRecord, RowRejection> {
    if row.platform != normalizer.platform() {
        return Err(RowRejection::WrongPlatform);
    }
    if !normalizer.accepts(row.kind) {
        return Err(RowRejection::UnsupportedKind);
    }
    if row.reference.trim().is_empty() {
        return Err(RowRejection::EmptyReference);
    }
    // Tips of zero are noise; charges and revenue must move money.
    if row.amount <= 0 {
        return Err(RowRejection::NonPositiveAmount);
    }
    if !week.contains(row.occurred_at.date()) {
        return Err(RowRejection::OutsideWeek);
    }

    let plate_hint = if normalizer.uses_plate_fallback() {
        row.secondary_reference.as_deref()
    } else {
        None
    };
    let driver = index
        .resolve(normalizer.platform(), &row.reference, plate_hint)
        .cloned();

    Ok(NormalizedEarningRecord {
        platform: normalizer.platform(),
        week,
        raw_reference: row.reference.clone(),
        driver,
        amount: row.amount,
        kind: row.kind,
        occurred_at: row.occurred_at,
    })
}
