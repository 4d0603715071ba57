//! Payment lifecycle for weekly settlements.
//!
//! `pending → paid` and `pending → cancelled` are one-way doors. The fields
//! of [`DriverWeeklySettlement`] are private so the guarded transitions in
//! this module are the only code able to flip the freeze flag or touch
//! financial figures; everything else goes through accessors.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::domain::{DriverId, SettlementBreakdown};
use super::week::WeekId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PaymentStatus {
    Pending,
    Paid {
        paid_on: NaiveDate,
        proof_reference: String,
    },
    Cancelled,
}

impl PaymentStatus {
    pub const fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid { .. } => "paid",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

/// The terminal settlement artifact for one driver-week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverWeeklySettlement {
    driver: DriverId,
    week: WeekId,
    breakdown: SettlementBreakdown,
    status: PaymentStatus,
    frozen: bool,
    version: u64,
    computed_at: NaiveDateTime,
}

impl DriverWeeklySettlement {
    pub fn new(
        driver: DriverId,
        week: WeekId,
        breakdown: SettlementBreakdown,
        computed_at: NaiveDateTime,
    ) -> Self {
        Self {
            driver,
            week,
            breakdown,
            status: PaymentStatus::Pending,
            frozen: false,
            version: 1,
            computed_at,
        }
    }

    pub fn driver(&self) -> &DriverId {
        &self.driver
    }

    pub fn week(&self) -> WeekId {
        self.week
    }

    pub fn breakdown(&self) -> &SettlementBreakdown {
        &self.breakdown
    }

    pub fn status(&self) -> &PaymentStatus {
        &self.status
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn computed_at(&self) -> NaiveDateTime {
        self.computed_at
    }

    /// Replace the financial figures after a recompute. Rejected once the
    /// settlement left the pending state.
    pub fn replace_breakdown(
        &mut self,
        breakdown: SettlementBreakdown,
        computed_at: NaiveDateTime,
    ) -> Result<(), LifecycleError> {
        self.ensure_pending()?;
        self.breakdown = breakdown;
        self.computed_at = computed_at;
        Ok(())
    }

    /// `pending → paid`: records the payment date and proof and freezes all
    /// financial fields.
    pub fn mark_paid(&mut self, paid_on: NaiveDate, proof_reference: String) -> Result<(), LifecycleError> {
        self.ensure_pending()?;
        self.status = PaymentStatus::Paid {
            paid_on,
            proof_reference,
        };
        self.frozen = true;
        Ok(())
    }

    /// `pending → cancelled`: terminal, no money moved.
    pub fn cancel(&mut self) -> Result<(), LifecycleError> {
        self.ensure_pending()?;
        self.status = PaymentStatus::Cancelled;
        self.frozen = true;
        Ok(())
    }

    /// Re-attach a proof-of-payment reference on a paid settlement. This is
    /// the one append-only mutation allowed after freezing.
    pub fn attach_proof(&mut self, proof: String) -> Result<(), LifecycleError> {
        match &mut self.status {
            PaymentStatus::Paid {
                proof_reference, ..
            } => {
                *proof_reference = proof;
                Ok(())
            }
            _ => Err(LifecycleError::NotPaid {
                driver: self.driver.clone(),
                week: self.week,
            }),
        }
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn ensure_pending(&self) -> Result<(), LifecycleError> {
        if self.frozen {
            return Err(LifecycleError::Frozen {
                driver: self.driver.clone(),
                week: self.week,
            });
        }
        match self.status {
            PaymentStatus::Pending => Ok(()),
            _ => Err(LifecycleError::Frozen {
                driver: self.driver.clone(),
                week: self.week,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error("settlement for {driver} {week} is frozen")]
    Frozen { driver: DriverId, week: WeekId },
    #[error("settlement for {driver} {week} is not paid; nothing to attach proof to")]
    NotPaid { driver: DriverId, week: WeekId },
}
