use super::PlatformNormalizer;
use crate::settlement::domain::{Platform, RecordKind};

/// Bolt weekly earnings feed: trip revenue and tips keyed by the driver's
/// account email.
pub(super) struct BoltNormalizer;

impl PlatformNormalizer for BoltNormalizer {
    fn platform(&self) -> Platform {
        Platform::Bolt
    }

    fn accepts(&self, kind: RecordKind) -> bool {
        matches!(kind, RecordKind::TripRevenue | RecordKind::Tip)
    }
}
