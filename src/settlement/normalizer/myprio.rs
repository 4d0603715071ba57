use super::PlatformNormalizer;
use crate::settlement::domain::{Platform, RecordKind};

/// myPrio fuel card statement: charges keyed by card number. Statement lines
/// also print the plate, which serves as the fallback key when a card was
/// reissued and the registry lags behind.
pub(super) struct MyPrioNormalizer;

impl PlatformNormalizer for MyPrioNormalizer {
    fn platform(&self) -> Platform {
        Platform::MyPrio
    }

    fn accepts(&self, kind: RecordKind) -> bool {
        matches!(kind, RecordKind::FuelCharge)
    }

    fn uses_plate_fallback(&self) -> bool {
        true
    }
}
