//! Payments received against project contracts
//!
//! Only completed payments count toward any total. Pending and failed
//! payments are kept for the record but are invisible to the summaries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ParseError;

/// Payment entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub project_id: i64,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_completed(&self) -> bool {
        self.status == PaymentStatus::Completed
    }
}

/// Payment settlement status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(ParseError::PaymentStatus(other.to_string())),
        }
    }
}

/// How the client paid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    BankTransfer,
    Cash,
    Check,
    Card,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Check => "check",
            PaymentMethod::Card => "card",
            PaymentMethod::Other => "other",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "cash" => Ok(PaymentMethod::Cash),
            "check" => Ok(PaymentMethod::Check),
            "card" => Ok(PaymentMethod::Card),
            "other" => Ok(PaymentMethod::Other),
            other => Err(ParseError::PaymentMethod(other.to_string())),
        }
    }
}

/// Sum of completed payment amounts
pub fn total_completed<'a>(payments: impl IntoIterator<Item = &'a Payment>) -> f64 {
    payments
        .into_iter()
        .filter(|p| p.is_completed())
        .map(|p| p.amount)
        .sum()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a payment with only the fields the summaries look at
    pub(crate) fn payment(amount: f64, date: &str, status: PaymentStatus) -> Payment {
        Payment {
            id: 0,
            project_id: 1,
            amount,
            payment_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            status,
            method: PaymentMethod::BankTransfer,
            reference: None,
            notes: None,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_total_completed_skips_pending_and_failed() {
        let payments = vec![
            payment(100.0, "2024-01-01", PaymentStatus::Completed),
            payment(200.0, "2024-01-02", PaymentStatus::Pending),
            payment(400.0, "2024-01-03", PaymentStatus::Failed),
            payment(50.0, "2024-01-04", PaymentStatus::Completed),
        ];
        assert_eq!(total_completed(&payments), 150.0);
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert_eq!("completed".parse::<PaymentStatus>(), Ok(PaymentStatus::Completed));
        assert_eq!(
            "refunded".parse::<PaymentStatus>(),
            Err(ParseError::PaymentStatus("refunded".to_string()))
        );
    }

    #[test]
    fn test_method_serializes_snake_case() {
        let json = serde_json::to_string(&PaymentMethod::BankTransfer).unwrap();
        assert_eq!(json, "\"bank_transfer\"");
        assert_eq!("card".parse::<PaymentMethod>(), Ok(PaymentMethod::Card));
    }
}
