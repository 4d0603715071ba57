//! Weekly driver settlement engine.
//!
//! The pipeline runs identity resolution over imported platform batches,
//! aggregates each ISO week per driver, applies the ordered deduction
//! arithmetic, layers referral commissions and goal bonuses on top, and
//! guards every written settlement with the paid-week freeze.

pub mod aggregate;
pub mod calculator;
pub mod commission;
pub mod domain;
pub mod identity;
pub mod lifecycle;
pub(crate) mod normalizer;
pub mod report;
pub mod repository;
pub mod router;
pub mod service;
pub mod week;

pub use aggregate::{aggregate_week, WeekAggregation, WeekTotals};
pub use calculator::{calculate, CalculationOutcome, CalculatorError, FeeConfig};
pub use commission::{
    CommissionEngine, DriverWeekDraft, GoalCriterion, GoalReward, GoalRule, ReferralConfig,
    ReferralForest,
};
pub use domain::{
    AdminFeeRule, Cents, DriverId, DriverIdentity, DriverType, FeeRuleApplied, FinancingAgreement,
    FinancingKind, FinancingStatus, Platform, RawRecord, RecordKind, ReferralLink,
    SettlementBreakdown,
};
pub use identity::IdentityIndex;
pub use lifecycle::{DriverWeeklySettlement, LifecycleError, PaymentStatus};
pub use report::{export_csv, SettlementView, SkipCategory, SkippedDriver, WeekRunReport};
pub use repository::{
    EarningRecordRepository, MemorySettlementStore, RepositoryError, SettlementRepository,
};
pub use router::settlement_router;
pub use service::{
    FleetDirectory, ImportSummary, MemoryFleetDirectory, RuleProvider, RuleSet, SettlementError,
    SettlementService, StaticRuleProvider,
};
pub use week::{WeekId, WeekIdError};
