//! Referral commissions and goal bonuses layered on top of base settlements.

pub mod config;
pub mod goals;
pub mod referral;

pub use config::{CommissionBase, GoalCriterion, GoalReward, GoalRule, ReferralConfig};
pub use referral::ReferralForest;

use std::collections::BTreeMap;

use tracing::debug;

use super::aggregate::WeekTotals;
use super::domain::{Cents, DriverId, DriverIdentity, SettlementBreakdown};
use super::week::WeekId;

/// One driver's in-flight settlement for the week being processed.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverWeekDraft {
    pub totals: WeekTotals,
    pub breakdown: SettlementBreakdown,
}

/// Applies the referral and goal rule sets across a whole week of drafts.
pub struct CommissionEngine<'a> {
    referral: &'a ReferralConfig,
    goals: &'a [GoalRule],
}

impl<'a> CommissionEngine<'a> {
    pub fn new(referral: &'a ReferralConfig, goals: &'a [GoalRule]) -> Self {
        Self { referral, goals }
    }

    /// Mutates each draft in place: sets `goal_bonus` and
    /// `referral_commission`, then settles the final `net_payout`.
    ///
    /// Commission bases are snapshotted from the drafts *before* any bonus
    /// or commission lands, so the result does not depend on iteration
    /// order and a recruit's commission income never compounds upward.
    ///
    /// `settled` carries the stored breakdowns of driver-weeks that are
    /// already frozen. They get no draft and are never rewritten, but their
    /// base figures still anchor their recruiters' commissions, so rerunning
    /// a week after a recruit was paid reproduces the same amounts.
    pub fn apply_week(
        &self,
        forest: &ReferralForest,
        drivers: &BTreeMap<DriverId, DriverIdentity>,
        week: WeekId,
        drafts: &mut BTreeMap<DriverId, DriverWeekDraft>,
        settled: &BTreeMap<DriverId, SettlementBreakdown>,
    ) {
        // Base figures frozen up front.
        let mut bases: BTreeMap<DriverId, (Cents, Cents)> = drafts
            .iter()
            .map(|(id, draft)| {
                (
                    id.clone(),
                    (draft.breakdown.net_payout, draft.breakdown.gross_minus_vat),
                )
            })
            .collect();
        for (id, breakdown) in settled {
            // Stored nets already include that run's commission and bonus;
            // strip them back out to recover the pre-bonus base.
            bases.entry(id.clone()).or_insert((
                breakdown.net_payout - breakdown.referral_commission - breakdown.goal_bonus,
                breakdown.gross_minus_vat,
            ));
        }

        for draft in drafts.values_mut() {
            if let Some((rule_id, bonus)) = goals::best_goal_bonus(
                self.goals,
                draft.breakdown.gross_revenue,
                draft.breakdown.trip_count,
            ) {
                debug!(rule_id, bonus, "goal bonus awarded");
                draft.breakdown.goal_bonus = bonus;
            }
        }

        let mut commissions: BTreeMap<DriverId, Cents> = BTreeMap::new();
        for (recruit_id, (base_net, base_gross_minus_vat)) in &bases {
            let Some(recruit) = drivers.get(recruit_id) else {
                continue;
            };
            // The recruit's tenure gates the whole chain.
            if week.weeks_since(recruit.onboarded_week) < self.referral.min_weeks_active {
                continue;
            }

            let base = match self.referral.base {
                CommissionBase::NetPayout => *base_net,
                CommissionBase::GrossMinusVat => *base_gross_minus_vat,
            };
            if base <= 0 {
                continue;
            }

            for (ancestor_id, level) in forest.ancestors(recruit_id, self.referral.max_levels) {
                // Eligibility is per ancestor, per level; an ineligible link
                // never short-circuits the levels above it.
                let Some(ancestor_draft) = drafts.get(&ancestor_id) else {
                    continue;
                };
                if ancestor_draft.breakdown.gross_revenue < self.referral.min_weekly_revenue {
                    continue;
                }
                let Some(percent) = self.referral.level_percents.get(level as usize - 1) else {
                    continue;
                };
                let amount = (base as f64 * percent).round() as Cents;
                if amount > 0 {
                    *commissions.entry(ancestor_id).or_default() += amount;
                }
            }
        }

        for (driver, earned) in commissions {
            if let Some(draft) = drafts.get_mut(&driver) {
                draft.breakdown.referral_commission = earned;
            }
        }

        for draft in drafts.values_mut() {
            let b = &mut draft.breakdown;
            b.net_payout = b.gross_minus_vat
                - b.admin_fee
                - b.fuel
                - b.tolls
                - b.rental_fee
                - b.financing_deduction
                + b.referral_commission
                + b.goal_bonus;
            b.negative_net = b.net_payout < 0;
        }
    }
}
