//! Goal-bonus evaluation.
//!
//! When several rules are satisfied the highest priority wins outright;
//! rewards are deliberately not summed, so stacking "€500 revenue" and
//! "€1000 revenue" goals pays only the bigger tier. Equal-priority ties are
//! broken by the lower rule id, which keeps the award deterministic when an
//! admin configures a revenue and a trip-count rule at the same level.

use crate::settlement::domain::Cents;

use super::config::{GoalCriterion, GoalReward, GoalRule};

/// The winning rule id and its reward for this driver-week, if any rule was
/// satisfied.
pub fn best_goal_bonus(
    rules: &[GoalRule],
    gross_revenue: Cents,
    trip_count: u32,
) -> Option<(u32, Cents)> {
    rules
        .iter()
        .filter(|rule| rule.active && satisfied(rule, gross_revenue, trip_count))
        .max_by(|a, b| a.priority.cmp(&b.priority).then(b.id.cmp(&a.id)))
        .map(|rule| (rule.id, reward_amount(&rule.reward, gross_revenue)))
}

fn satisfied(rule: &GoalRule, gross_revenue: Cents, trip_count: u32) -> bool {
    match rule.criterion {
        GoalCriterion::Revenue { min } => gross_revenue >= min,
        GoalCriterion::Trips { min } => trip_count >= min,
    }
}

fn reward_amount(reward: &GoalReward, gross_revenue: Cents) -> Cents {
    match reward {
        GoalReward::Fixed(amount) => *amount,
        GoalReward::PercentOfRevenue(percent) => (gross_revenue as f64 * percent).round() as Cents,
    }
}
