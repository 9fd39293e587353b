//! Provider earnings ledger.
//!
//! Nothing here is stored: revenue, balance and history are derived from the
//! provider's completed bookings and withdrawals every time they are asked for.
//!
//! - `revenue` = sum of `price` over completed bookings
//! - `withdrawn` = sum of withdrawal amounts
//! - `balance` = `revenue - withdrawn`
//! - `pending` = sum of `price` over accepted, not yet completed bookings

use crate::error::MarketplaceError;
use crate::matching::newest_first;
use crate::money::Money;
use crate::types::{Booking, BookingId, BookingStatus, UserId, Withdrawal};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt::Write as _;

/// One completed job in the earnings history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Booking the earnings come from.
    pub booking_id: BookingId,
    /// Day the job was scheduled.
    pub date: NaiveDate,
    /// Service performed.
    pub service_name: String,
    /// Customer served.
    pub customer_name: String,
    /// What the customer paid (`price + fee`).
    pub amount: Money,
    /// Platform fee.
    pub fee: Money,
    /// What the provider earned.
    pub net: Money,
    /// When the booking was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    fn from_booking(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            date: booking.date,
            service_name: booking.service_name.clone(),
            customer_name: booking.customer_name.clone(),
            amount: booking.total,
            fee: booking.service_fee,
            net: booking.price,
            created_at: booking.created_at,
        }
    }
}

/// Earnings overview of one provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsSummary {
    /// Lifetime earnings from completed jobs.
    pub revenue: Money,
    /// Total already withdrawn.
    pub withdrawn: Money,
    /// What can still be withdrawn.
    pub balance: Money,
    /// Earnings of accepted jobs not completed yet.
    pub pending: Money,
    /// Completed jobs, newest first.
    pub transactions: Vec<Transaction>,
}

impl EarningsSummary {
    /// Derive the summary for `provider_id`.
    ///
    /// Bookings and withdrawals of other providers are ignored, so callers may
    /// pass broader sets.
    #[must_use]
    pub fn compute(provider_id: UserId, bookings: &[Booking], withdrawals: &[Withdrawal]) -> Self {
        let mine = || bookings.iter().filter(|b| b.is_assigned_to(provider_id));

        let mut completed: Vec<&Booking> = mine()
            .filter(|b| b.status == BookingStatus::Completed)
            .collect();
        completed.sort_by(|a, b| newest_first(a, b));

        let revenue: Money = completed.iter().map(|b| b.price).sum();
        let pending: Money = mine()
            .filter(|b| b.status.is_active())
            .map(|b| b.price)
            .sum();
        let withdrawn: Money = withdrawals
            .iter()
            .filter(|w| w.provider_id == provider_id)
            .map(|w| w.amount)
            .sum();

        Self {
            revenue,
            withdrawn,
            balance: revenue.saturating_sub(withdrawn),
            pending,
            transactions: completed.into_iter().map(Transaction::from_booking).collect(),
        }
    }

    /// Check that `amount` may be withdrawn from this balance.
    ///
    /// # Errors
    ///
    /// - [`MarketplaceError::InvalidAmount`]: the amount is zero
    /// - [`MarketplaceError::InsufficientBalance`]: the amount exceeds the balance
    pub fn check_withdrawal(&self, amount: Money) -> Result<(), MarketplaceError> {
        if amount.is_zero() {
            return Err(MarketplaceError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }
        if amount > self.balance {
            return Err(MarketplaceError::InsufficientBalance {
                requested: amount,
                available: self.balance,
            });
        }
        Ok(())
    }
}

/// Header row of the earnings report.
pub const REPORT_HEADER: &str = "Job ID,Date,Service,Customer,Amount,Fee,Net Earnings";

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render the earnings history as CSV, one line per transaction.
#[must_use]
pub fn export_csv(transactions: &[Transaction]) -> String {
    let mut out = String::with_capacity(64 * (transactions.len() + 1));
    out.push_str(REPORT_HEADER);
    out.push('\n');
    for tx in transactions {
        // writing to a String cannot fail
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{}",
            tx.booking_id,
            tx.date,
            csv_field(&tx.service_name),
            csv_field(&tx.customer_name),
            tx.amount,
            tx.fee,
            tx.net
        );
    }
    out
}
