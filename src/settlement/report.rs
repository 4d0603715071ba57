//! Admin-facing run reports and the itemized settlement export.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{Cents, DriverId, Platform};
use super::lifecycle::{DriverWeeklySettlement, PaymentStatus};
use super::week::WeekId;

/// Why a driver was left out of a settlement run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipCategory {
    Configuration,
    DataIntegrity,
    UnknownDriver,
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedDriver {
    pub driver: DriverId,
    pub category: SkipCategory,
    pub reason: String,
}

/// Structured summary of one settlement run, suitable for the admin
/// dashboard and the notification exporter. Skipped drivers are listed, not
/// discarded; a week only claims `complete` when nothing is outstanding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekRunReport {
    pub week: WeekId,
    pub processed: usize,
    /// Driver-weeks left untouched because they were already paid.
    pub frozen_skipped: usize,
    pub configuration_errors: usize,
    pub data_integrity_errors: usize,
    pub skipped: Vec<SkippedDriver>,
    pub unreconciled: BTreeMap<Platform, Cents>,
    pub unreconciled_total: Cents,
    pub complete: bool,
}

impl WeekRunReport {
    pub fn empty(week: WeekId) -> Self {
        Self {
            week,
            processed: 0,
            frozen_skipped: 0,
            configuration_errors: 0,
            data_integrity_errors: 0,
            skipped: Vec::new(),
            unreconciled: BTreeMap::new(),
            unreconciled_total: 0,
            complete: false,
        }
    }
}

/// Flattened settlement row for API responses and the CSV export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementView {
    pub driver: DriverId,
    pub week: WeekId,
    pub status: &'static str,
    pub gross_revenue: Cents,
    pub tips: Cents,
    pub trip_count: u32,
    pub vat_amount: Cents,
    pub gross_minus_vat: Cents,
    pub admin_fee: Cents,
    pub fee_rule: &'static str,
    pub fuel: Cents,
    pub tolls: Cents,
    pub rental_fee: Cents,
    pub financing_deduction: Cents,
    pub referral_commission: Cents,
    pub goal_bonus: Cents,
    pub net_payout: Cents,
    pub negative_net: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_on: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_reference: Option<String>,
}

impl From<&DriverWeeklySettlement> for SettlementView {
    fn from(settlement: &DriverWeeklySettlement) -> Self {
        let b = settlement.breakdown();
        let (paid_on, proof_reference) = match settlement.status() {
            PaymentStatus::Paid {
                paid_on,
                proof_reference,
            } => (Some(*paid_on), Some(proof_reference.clone())),
            _ => (None, None),
        };
        Self {
            driver: settlement.driver().clone(),
            week: settlement.week(),
            status: settlement.status().label(),
            gross_revenue: b.gross_revenue,
            tips: b.tips,
            trip_count: b.trip_count,
            vat_amount: b.vat_amount,
            gross_minus_vat: b.gross_minus_vat,
            admin_fee: b.admin_fee,
            fee_rule: b.fee_rule.label(),
            fuel: b.fuel,
            tolls: b.tolls,
            rental_fee: b.rental_fee,
            financing_deduction: b.financing_deduction,
            referral_commission: b.referral_commission,
            goal_bonus: b.goal_bonus,
            net_payout: b.net_payout,
            negative_net: b.negative_net,
            paid_on,
            proof_reference,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("could not serialize settlement rows: {0}")]
    Csv(#[from] csv::Error),
    #[error("could not flush settlement rows: {0}")]
    Flush(String),
    #[error("exported CSV was not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// CSV row shape: flat scalars only, every column present on every row.
#[derive(Debug, Serialize)]
struct CsvRow {
    driver: String,
    week: String,
    status: &'static str,
    gross_revenue: Cents,
    tips: Cents,
    trip_count: u32,
    vat_amount: Cents,
    gross_minus_vat: Cents,
    admin_fee: Cents,
    fee_rule: &'static str,
    fuel: Cents,
    tolls: Cents,
    rental_fee: Cents,
    financing_deduction: Cents,
    referral_commission: Cents,
    goal_bonus: Cents,
    net_payout: Cents,
    negative_net: bool,
    paid_on: String,
    proof_reference: String,
}

impl From<SettlementView> for CsvRow {
    fn from(view: SettlementView) -> Self {
        Self {
            driver: view.driver.0,
            week: view.week.to_string(),
            status: view.status,
            gross_revenue: view.gross_revenue,
            tips: view.tips,
            trip_count: view.trip_count,
            vat_amount: view.vat_amount,
            gross_minus_vat: view.gross_minus_vat,
            admin_fee: view.admin_fee,
            fee_rule: view.fee_rule,
            fuel: view.fuel,
            tolls: view.tolls,
            rental_fee: view.rental_fee,
            financing_deduction: view.financing_deduction,
            referral_commission: view.referral_commission,
            goal_bonus: view.goal_bonus,
            net_payout: view.net_payout,
            negative_net: view.negative_net,
            paid_on: view
                .paid_on
                .map(|date| date.to_string())
                .unwrap_or_default(),
            proof_reference: view.proof_reference.unwrap_or_default(),
        }
    }
}

/// Itemized CSV export of a week's settlements, amounts in euro cents.
pub fn export_csv(settlements: &[DriverWeeklySettlement]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for settlement in settlements {
        writer.serialize(CsvRow::from(SettlementView::from(settlement)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Flush(err.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
