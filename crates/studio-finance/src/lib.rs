//! Studio finance
//!
//! Domain records and the pure accounting functions behind the CRM:
//! per-project financial summaries, monthly revenue and the dashboard
//! overview. Nothing in this crate performs I/O; callers fetch rows and
//! hand them in.

pub mod dashboard;
pub mod error;
pub mod payments;
pub mod projects;
pub mod revenue;

pub use dashboard::{DashboardStats, dashboard_stats};
pub use error::ParseError;
pub use payments::{Payment, PaymentMethod, PaymentStatus};
pub use projects::{FinancialSummary, Project, ProjectStatus};
pub use revenue::{MonthlyRevenue, YearSelection, monthly_revenue, resolve_year};
