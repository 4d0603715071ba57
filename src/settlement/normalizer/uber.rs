use super::PlatformNormalizer;
use crate::settlement::domain::{Platform, RecordKind};

/// Uber weekly earnings feed: trip revenue and rider tips keyed by the API
/// driver id.
pub(super) struct UberNormalizer;

impl PlatformNormalizer for UberNormalizer {
    fn platform(&self) -> Platform {
        Platform::Uber
    }

    fn accepts(&self, kind: RecordKind) -> bool {
        matches!(kind, RecordKind::TripRevenue | RecordKind::Tip)
    }
}
