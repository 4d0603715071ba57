//! Admin-editable rule sets for referral commissions and goal bonuses.

use serde::{Deserialize, Serialize};

use crate::settlement::domain::Cents;

/// Which figure of the recruit's settlement the commission percentage
/// applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionBase {
    /// The recruit's base net payout ("repasse").
    NetPayout,
    /// The recruit's gross revenue minus VAT.
    GrossMinusVat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralConfig {
    /// How many ancestor levels a recruit's settlement can pay out to.
    pub max_levels: u8,
    /// Ancestor's own weekly gross revenue required to earn at any level.
    pub min_weekly_revenue: Cents,
    /// Weeks a recruit must have been active before their settlements start
    /// paying commissions upward.
    pub min_weeks_active: i64,
    /// Commission fraction per level; index 0 is the direct recruiter.
    pub level_percents: Vec<f64>,
    pub base: CommissionBase,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            max_levels: 3,
            min_weekly_revenue: 20_000,
            min_weeks_active: 4,
            level_percents: vec![0.05, 0.03, 0.01],
            base: CommissionBase::NetPayout,
        }
    }
}

/// Metric a goal rule tests against the driver's week.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalCriterion {
    /// Weekly gross revenue threshold.
    Revenue { min: Cents },
    /// Weekly trip-count threshold.
    Trips { min: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalReward {
    Fixed(Cents),
    /// Fraction of the week's gross revenue.
    PercentOfRevenue(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRule {
    pub id: u32,
    pub criterion: GoalCriterion,
    pub reward: GoalReward,
    /// When several rules qualify, the highest priority wins outright;
    /// rewards are never summed.
    pub priority: u32,
    pub active: bool,
}
