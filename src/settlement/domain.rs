//! Core domain types shared across the settlement pipeline.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::week::WeekId;

/// All monetary amounts are euro cents. Floating point only ever appears
/// transiently inside rounding helpers, never in stored state.
pub type Cents = i64;

/// Identifier wrapper for drivers registered with the fleet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DriverId(pub String);

impl std::fmt::Display for DriverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// External platforms feeding earnings and expense rows into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Uber,
    Bolt,
    ViaVerde,
    MyPrio,
}

impl Platform {
    pub const fn label(self) -> &'static str {
        match self {
            Platform::Uber => "uber",
            Platform::Bolt => "bolt",
            Platform::ViaVerde => "viaverde",
            Platform::MyPrio => "myprio",
        }
    }

    pub const fn all() -> [Platform; 4] {
        [
            Platform::Uber,
            Platform::Bolt,
            Platform::ViaVerde,
            Platform::MyPrio,
        ]
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "uber" => Ok(Platform::Uber),
            "bolt" => Ok(Platform::Bolt),
            "viaverde" => Ok(Platform::ViaVerde),
            "myprio" => Ok(Platform::MyPrio),
            other => Err(format!("unknown platform `{other}`")),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of monetary fact a platform row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    TripRevenue,
    Tip,
    Toll,
    FuelCharge,
}

/// Commercial relationship between the driver and the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverType {
    Affiliate,
    Renter,
}

impl DriverType {
    pub const fn label(self) -> &'static str {
        match self {
            DriverType::Affiliate => "affiliate",
            DriverType::Renter => "renter",
        }
    }
}

impl std::fmt::Display for DriverType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-driver administrative fee override negotiated by an admin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminFeeRule {
    Fixed(Cents),
    /// Fraction of gross-minus-VAT, e.g. `0.05` for 5%.
    PercentOfNet(f64),
}

/// Registered driver with the integration keys each platform knows them by.
///
/// Drivers are never deleted; admins deactivate them instead so historic
/// settlements keep resolving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverIdentity {
    pub id: DriverId,
    pub display_name: String,
    pub driver_type: DriverType,
    /// Uber API driver ids, matched verbatim.
    pub uber_account_ids: Vec<String>,
    /// Bolt account emails, matched case-insensitively.
    pub bolt_account_ids: Vec<String>,
    /// myPrio fuel card key.
    pub fuel_card_key: Option<String>,
    /// Via Verde toll tag identifier.
    pub toll_tag_id: Option<String>,
    /// Vehicle plate, used as a fallback key for fuel and toll rows.
    pub vehicle_plate: Option<String>,
    pub admin_fee_override: Option<AdminFeeRule>,
    /// Weekly vehicle rental charged to renter drivers.
    pub weekly_rental_fee: Option<Cents>,
    pub active: bool,
    /// Week the driver joined the fleet; drives referral tenure checks.
    pub onboarded_week: WeekId,
}

/// Raw row exactly as an ingestion collaborator hands it over. Shapes vary
/// per platform; the normalizer registry owns the interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub platform: Platform,
    /// Platform-native reference: API id, account email, card key, tag id.
    pub reference: String,
    /// Optional secondary label, e.g. the vehicle plate printed on a fuel
    /// card statement line.
    pub secondary_reference: Option<String>,
    pub amount: Cents,
    pub kind: RecordKind,
    pub occurred_at: NaiveDateTime,
}

/// One reconciled platform row. Immutable once created; reimports replace
/// whole (platform, week) batches rather than editing rows in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEarningRecord {
    pub platform: Platform,
    pub week: WeekId,
    pub raw_reference: String,
    /// `None` marks an unmapped row awaiting manual reconciliation. It never
    /// contributes to any driver's totals.
    pub driver: Option<DriverId>,
    pub amount: Cents,
    pub kind: RecordKind,
    pub occurred_at: NaiveDateTime,
}

/// Financing arrangement deducted from weekly payouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancingAgreement {
    pub driver: DriverId,
    pub kind: FinancingKind,
    /// Weekly interest added on top of loan amortization.
    pub weekly_interest: Cents,
    pub status: FinancingStatus,
    /// Weeks left on a loan; unused for discounts.
    pub remaining_weeks: u32,
    /// Weeks already amortized. Recomputing one of these weeks repeats the
    /// same installment without moving the countdown.
    #[serde(default)]
    pub applied_weeks: BTreeSet<WeekId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancingKind {
    Loan { principal: Cents, total_weeks: u32 },
    Discount { weekly_amount: Cents },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancingStatus {
    Active,
    Completed,
}

/// Directed recruiter → recruit edge in the referral forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralLink {
    pub recruiter: DriverId,
    pub recruit: DriverId,
    pub accepted_week: WeekId,
    pub active: bool,
}

/// Which admin-fee rule ended up applying. Exactly one ever does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeRuleApplied {
    PersonalFixed,
    PersonalPercent,
    TypeDefault,
    LegacyPercent,
}

impl FeeRuleApplied {
    pub const fn label(self) -> &'static str {
        match self {
            FeeRuleApplied::PersonalFixed => "personal_fixed",
            FeeRuleApplied::PersonalPercent => "personal_percent",
            FeeRuleApplied::TypeDefault => "type_default",
            FeeRuleApplied::LegacyPercent => "legacy_percent",
        }
    }
}

/// Itemized weekly breakdown. The calculator fills the base figures; the
/// commission engine adds `referral_commission` and `goal_bonus` and settles
/// the final `net_payout`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementBreakdown {
    pub revenue_by_platform: BTreeMap<Platform, Cents>,
    pub tips: Cents,
    pub gross_revenue: Cents,
    pub trip_count: u32,
    pub vat_amount: Cents,
    pub gross_minus_vat: Cents,
    pub admin_fee: Cents,
    pub fee_rule: FeeRuleApplied,
    pub fuel: Cents,
    /// Toll total after the operator markup correction.
    pub tolls: Cents,
    pub rental_fee: Cents,
    pub financing_deduction: Cents,
    pub referral_commission: Cents,
    pub goal_bonus: Cents,
    pub net_payout: Cents,
    /// A negative payout is surfaced, never clamped; clamping would hide a
    /// miscalculation from the admin team.
    pub negative_net: bool,
}
