//! The base settlement arithmetic for one driver-week.
//!
//! The order of operations is contractual: gross revenue, VAT extraction,
//! administrative fee, expense deductions, financing. Reordering changes the
//! taxable base and is a correctness bug, not a style choice.

use serde::{Deserialize, Serialize};

use super::aggregate::WeekTotals;
use super::domain::{
    AdminFeeRule, Cents, DriverId, DriverIdentity, DriverType, FeeRuleApplied, FinancingAgreement,
    FinancingKind, FinancingStatus, SettlementBreakdown,
};
use super::week::WeekId;

/// Fee and VAT configuration, re-read from the admin-editable store on every
/// run and passed in explicitly so tests can pin it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// VAT rate, e.g. `0.06` for 6%.
    pub vat_rate: f64,
    /// Current per-type defaults; absent when an admin has not configured
    /// them yet, in which case the legacy flat rate applies.
    pub fee_defaults: Option<AdminFeeDefaults>,
    /// Flat percentage of gross-minus-VAT from before per-type fees existed.
    pub legacy_fee_percent: Option<f64>,
    /// Multiplier correcting the toll operator's built-in markup, applied to
    /// the billed toll total. `1.0` means the feed is already clean.
    pub toll_markup_correction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdminFeeDefaults {
    /// Renters pay a percentage of gross-minus-VAT.
    pub renter_percent: f64,
    /// Affiliates pay a fixed weekly amount.
    pub affiliate_fixed: Cents,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            vat_rate: 0.06,
            fee_defaults: Some(AdminFeeDefaults {
                renter_percent: 0.04,
                affiliate_fixed: 2_500,
            }),
            legacy_fee_percent: Some(0.07),
            toll_markup_correction: 1.0,
        }
    }
}

/// Result of the base calculation: the breakdown plus the financing
/// agreements as they should look after this week is committed. The service
/// persists the updates only once the settlement upsert succeeds, keeping
/// the per-driver boundary transactional.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationOutcome {
    pub breakdown: SettlementBreakdown,
    pub financing: Vec<FinancingAgreement>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalculatorError {
    #[error("no admin fee rule configured for {driver_type} drivers")]
    MissingFeeRule { driver_type: DriverType },
    #[error("vat rate {0} is not usable")]
    InvalidVatRate(f64),
    #[error("negative gross revenue {amount} for driver {driver}")]
    NegativeGross { driver: DriverId, amount: Cents },
}

/// Pure base settlement for one driver-week. Does not touch commissions or
/// bonuses; those layer on top via the commission engine.
pub fn calculate(
    driver: &DriverIdentity,
    week: WeekId,
    totals: &WeekTotals,
    financing: &[FinancingAgreement],
    config: &FeeConfig,
) -> Result<CalculationOutcome, CalculatorError> {
    if !config.vat_rate.is_finite() || config.vat_rate < 0.0 || config.vat_rate >= 1.0 {
        return Err(CalculatorError::InvalidVatRate(config.vat_rate));
    }

    // 1. Gross revenue.
    let gross = totals.gross_revenue();
    if gross < 0 {
        return Err(CalculatorError::NegativeGross {
            driver: driver.id.clone(),
            amount: gross,
        });
    }

    // 2. VAT extraction. vat = gross - net by construction, so the pair
    // always round-trips to the original gross.
    let gross_minus_vat = round_cents(gross as f64 / (1.0 + config.vat_rate));
    let vat_amount = gross - gross_minus_vat;

    // 3. Administrative fee: exactly one rule applies, never a stack.
    let (admin_fee, fee_rule) = admin_fee(driver, gross_minus_vat, config)?;

    // 4. Expense deductions.
    let tolls = round_cents(totals.tolls as f64 * config.toll_markup_correction);
    let rental_fee = match driver.driver_type {
        DriverType::Renter => driver.weekly_rental_fee.unwrap_or(0),
        DriverType::Affiliate => 0,
    };

    // 5. Financing.
    let (financing_deduction, financing) = apply_financing(week, financing);

    // 6. Net payout; negative results are flagged, not clamped.
    let net_payout =
        gross_minus_vat - admin_fee - totals.fuel - tolls - rental_fee - financing_deduction;

    let breakdown = SettlementBreakdown {
        revenue_by_platform: totals.revenue_by_platform.clone(),
        tips: totals.tips,
        gross_revenue: gross,
        trip_count: totals.trip_count,
        vat_amount,
        gross_minus_vat,
        admin_fee,
        fee_rule,
        fuel: totals.fuel,
        tolls,
        rental_fee,
        financing_deduction,
        referral_commission: 0,
        goal_bonus: 0,
        net_payout,
        negative_net: net_payout < 0,
    };

    Ok(CalculationOutcome {
        breakdown,
        financing,
    })
}

fn admin_fee(
    driver: &DriverIdentity,
    gross_minus_vat: Cents,
    config: &FeeConfig,
) -> Result<(Cents, FeeRuleApplied), CalculatorError> {
    if let Some(rule) = &driver.admin_fee_override {
        return Ok(match rule {
            AdminFeeRule::Fixed(amount) => (*amount, FeeRuleApplied::PersonalFixed),
            AdminFeeRule::PercentOfNet(percent) => (
                round_cents(gross_minus_vat as f64 * percent),
                FeeRuleApplied::PersonalPercent,
            ),
        });
    }

    if let Some(defaults) = &config.fee_defaults {
        return Ok(match driver.driver_type {
            DriverType::Renter => (
                round_cents(gross_minus_vat as f64 * defaults.renter_percent),
                FeeRuleApplied::TypeDefault,
            ),
            DriverType::Affiliate => (defaults.affiliate_fixed, FeeRuleApplied::TypeDefault),
        });
    }

    if let Some(percent) = config.legacy_fee_percent {
        return Ok((
            round_cents(gross_minus_vat as f64 * percent),
            FeeRuleApplied::LegacyPercent,
        ));
    }

    Err(CalculatorError::MissingFeeRule {
        driver_type: driver.driver_type,
    })
}

/// Deduct every active agreement and return the updated copies. Loans count
/// down and complete at zero; discounts deduct the same amount every week.
///
/// The countdown moves at most once per settled week: a week already in
/// `applied_weeks` repeats its installment unchanged, so recomputes never
/// consume extra weeks of the loan.
fn apply_financing(
    week: WeekId,
    agreements: &[FinancingAgreement],
) -> (Cents, Vec<FinancingAgreement>) {
    let mut deduction: Cents = 0;
    let mut updated = Vec::with_capacity(agreements.len());

    for agreement in agreements {
        let mut next = agreement.clone();
        match agreement.kind {
            FinancingKind::Loan {
                principal,
                total_weeks,
            } if total_weeks > 0 => {
                if agreement.applied_weeks.contains(&week) {
                    deduction +=
                        round_cents(principal as f64 / total_weeks as f64) + agreement.weekly_interest;
                } else if agreement.status == FinancingStatus::Active {
                    if agreement.remaining_weeks > 0 {
                        deduction += round_cents(principal as f64 / total_weeks as f64)
                            + agreement.weekly_interest;
                        next.remaining_weeks = agreement.remaining_weeks - 1;
                        next.applied_weeks.insert(week);
                        if next.remaining_weeks == 0 {
                            next.status = FinancingStatus::Completed;
                        }
                    } else {
                        // Exhausted but never closed; close it without deducting.
                        next.status = FinancingStatus::Completed;
                    }
                }
            }
            FinancingKind::Loan { .. } => {
                if agreement.status == FinancingStatus::Active {
                    next.status = FinancingStatus::Completed;
                }
            }
            FinancingKind::Discount { weekly_amount } => {
                if agreement.status == FinancingStatus::Active {
                    deduction += weekly_amount;
                }
            }
        }
        updated.push(next);
    }

    (deduction, updated)
}

fn round_cents(value: f64) -> Cents {
    value.round() as Cents
}
