use super::PlatformNormalizer;
use crate::settlement::domain::{Platform, RecordKind};

/// Via Verde toll statement: one charge per passage, keyed by the toll tag
/// with the vehicle plate as a secondary label.
pub(super) struct ViaVerdeNormalizer;

impl PlatformNormalizer for ViaVerdeNormalizer {
    fn platform(&self) -> Platform {
        Platform::ViaVerde
    }

    fn accepts(&self, kind: RecordKind) -> bool {
        matches!(kind, RecordKind::Toll)
    }

    fn uses_plate_fallback(&self) -> bool {
        true
    }
}
