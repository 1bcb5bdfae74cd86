//! Projects and their financial summary
//!
//! A project carries the contract value; the summary compares it with the
//! completed payments recorded against it. Summaries are derived on every
//! read and never stored.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ParseError;
use crate::payments::{Payment, total_completed};

/// Project record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub client_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Contract value in currency units
    pub total_price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project lifecycle status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Planning,
    InProgress,
    Review,
    Completed,
    OnHold,
}

impl ProjectStatus {
    /// Every status, in the order charts list them
    pub const ALL: [ProjectStatus; 5] = [
        ProjectStatus::Planning,
        ProjectStatus::InProgress,
        ProjectStatus::Review,
        ProjectStatus::Completed,
        ProjectStatus::OnHold,
    ];

    /// Planning, in progress and review count as active work
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ProjectStatus::Planning | ProjectStatus::InProgress | ProjectStatus::Review
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Review => "review",
            ProjectStatus::Completed => "completed",
            ProjectStatus::OnHold => "on_hold",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planning" => Ok(ProjectStatus::Planning),
            "in_progress" => Ok(ProjectStatus::InProgress),
            "review" => Ok(ProjectStatus::Review),
            "completed" => Ok(ProjectStatus::Completed),
            "on_hold" => Ok(ProjectStatus::OnHold),
            other => Err(ParseError::ProjectStatus(other.to_string())),
        }
    }
}

/// Contract price against what has actually been collected
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    pub total_price: f64,
    pub total_paid: f64,
    /// Never negative; overpayment clamps to zero
    pub remaining_balance: f64,
    /// Percentage in 0..=100; zero when there is no positive price
    pub payment_progress: f64,
}

impl FinancialSummary {
    /// Summarize a contract price against a project's payments
    pub fn compute<'a>(
        total_price: f64,
        payments: impl IntoIterator<Item = &'a Payment>,
    ) -> Self {
        let total_paid = total_completed(payments);
        let remaining_balance = normalize_zero((total_price - total_paid).max(0.0));

        let payment_progress = if total_price > 0.0 {
            (total_paid / total_price * 100.0).min(100.0)
        } else {
            0.0
        };

        Self {
            total_price,
            total_paid,
            remaining_balance,
            payment_progress: normalize_zero(payment_progress),
        }
    }

    pub fn for_project(project: &Project, payments: &[Payment]) -> Self {
        Self::compute(
            project.total_price,
            payments.iter().filter(|p| p.project_id == project.id),
        )
    }
}

/// Normalize -0.0 to 0.0 for cleaner output
pub(crate) fn normalize_zero(val: f64) -> f64 {
    if val == 0.0 { 0.0 } else { val }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::payments::PaymentStatus;
    use crate::payments::tests::payment;

    pub(crate) fn project(id: i64, status: ProjectStatus, created_ts: i64) -> Project {
        let created = DateTime::from_timestamp(created_ts, 0).unwrap();
        Project {
            id,
            client_id: 1,
            name: format!("Project {id}"),
            description: None,
            status,
            start_date: None,
            end_date: None,
            total_price: 0.0,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_fully_paid_project() {
        let payments = vec![payment(60000.0, "2024-03-01", PaymentStatus::Completed)];
        let summary = FinancialSummary::compute(60000.0, &payments);

        assert_eq!(
            summary,
            FinancialSummary {
                total_price: 60000.0,
                total_paid: 60000.0,
                remaining_balance: 0.0,
                payment_progress: 100.0,
            }
        );
    }

    #[test]
    fn test_no_payments() {
        let summary = FinancialSummary::compute(100000.0, &[]);
        assert_eq!(summary.total_paid, 0.0);
        assert_eq!(summary.remaining_balance, 100000.0);
        assert_eq!(summary.payment_progress, 0.0);
    }

    #[test]
    fn test_overpayment_clamps() {
        let payments = vec![
            payment(700.0, "2024-03-01", PaymentStatus::Completed),
            payment(500.0, "2024-03-02", PaymentStatus::Completed),
        ];
        let summary = FinancialSummary::compute(1000.0, &payments);

        assert_eq!(summary.total_paid, 1200.0);
        assert_eq!(summary.remaining_balance, 0.0);
        assert_eq!(summary.payment_progress, 100.0);
    }

    #[test]
    fn test_zero_price_has_no_progress() {
        let payments = vec![payment(250.0, "2024-03-01", PaymentStatus::Completed)];
        let summary = FinancialSummary::compute(0.0, &payments);

        assert_eq!(summary.payment_progress, 0.0);
        assert_eq!(summary.remaining_balance, 0.0);
    }

    #[test]
    fn test_only_completed_payments_count() {
        let payments = vec![
            payment(1000.0, "2024-03-01", PaymentStatus::Completed),
            payment(3000.0, "2024-03-02", PaymentStatus::Pending),
            payment(5000.0, "2024-03-03", PaymentStatus::Failed),
        ];
        let summary = FinancialSummary::compute(4000.0, &payments);

        assert_eq!(summary.total_paid, 1000.0);
        assert_eq!(summary.remaining_balance, 3000.0);
        assert_eq!(summary.payment_progress, 25.0);
    }

    #[test]
    fn test_for_project_ignores_other_projects() {
        let mut p = project(7, ProjectStatus::InProgress, 1_700_000_000);
        p.total_price = 2000.0;

        let mut other = payment(900.0, "2024-03-01", PaymentStatus::Completed);
        other.project_id = 8;
        let mut own = payment(500.0, "2024-03-01", PaymentStatus::Completed);
        own.project_id = 7;

        let summary = FinancialSummary::for_project(&p, &[other, own]);
        assert_eq!(summary.total_paid, 500.0);
        assert_eq!(summary.remaining_balance, 1500.0);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let summary = FinancialSummary::compute(100.0, &[]);
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["remainingBalance"], 100.0);
        assert_eq!(json["paymentProgress"], 0.0);
    }

    #[test]
    fn test_active_statuses() {
        let active: Vec<_> = ProjectStatus::ALL.iter().filter(|s| s.is_active()).collect();
        assert_eq!(
            active,
            vec![
                &ProjectStatus::Planning,
                &ProjectStatus::InProgress,
                &ProjectStatus::Review
            ]
        );
        assert_eq!("on_hold".parse::<ProjectStatus>(), Ok(ProjectStatus::OnHold));
    }
}
