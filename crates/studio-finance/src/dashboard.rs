//! Dashboard overview aggregation
//!
//! Counts and sums for the landing page, computed from already-fetched
//! projects and payments. "Overdue" projects are simply the ones that are
//! not completed; there is no due-date comparison.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::payments::{Payment, total_completed};
use crate::projects::{Project, ProjectStatus};

/// How many recent projects and payments the dashboard lists
pub const RECENT_LIMIT: usize = 5;

/// How many outstanding projects are considered for alerts
pub const OVERDUE_FETCH_LIMIT: usize = 10;

/// How many outstanding projects are listed in alerts
pub const OVERDUE_SHOWN: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub overview: Overview,
    pub recent_activity: RecentActivity,
    pub charts: Charts,
    pub alerts: Alerts,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_clients: u64,
    pub active_projects: u64,
    /// All-time completed revenue
    pub total_revenue: f64,
    /// Completed revenue dated on or after the first of the current month
    pub monthly_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentActivity {
    pub projects: Vec<Project>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Charts {
    pub projects_by_status: Vec<StatusCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: ProjectStatus,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alerts {
    pub overdue_projects: Vec<Project>,
    pub overdue_count: usize,
}

/// Build the dashboard from full project and payment collections
pub fn dashboard_stats(
    total_clients: u64,
    projects: &[Project],
    payments: &[Payment],
    today: NaiveDate,
) -> DashboardStats {
    let month_start = today.with_day(1).unwrap_or(today);

    let overview = Overview {
        total_clients,
        active_projects: projects.iter().filter(|p| p.status.is_active()).count() as u64,
        total_revenue: total_completed(payments),
        monthly_revenue: total_completed(payments.iter().filter(|p| p.payment_date >= month_start)),
    };

    let mut recent_projects: Vec<&Project> = projects.iter().collect();
    recent_projects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

    let mut recent_payments: Vec<&Payment> = payments.iter().collect();
    recent_payments.sort_by(|a, b| {
        b.payment_date
            .cmp(&a.payment_date)
            .then(b.created_at.cmp(&a.created_at))
            .then(b.id.cmp(&a.id))
    });

    let projects_by_status = ProjectStatus::ALL
        .iter()
        .map(|status| StatusCount {
            status: *status,
            count: projects.iter().filter(|p| p.status == *status).count() as u64,
        })
        .collect();

    // Oldest outstanding work first
    let mut outstanding: Vec<&Project> = projects
        .iter()
        .filter(|p| p.status != ProjectStatus::Completed)
        .collect();
    outstanding.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    outstanding.truncate(OVERDUE_FETCH_LIMIT);

    DashboardStats {
        overview,
        recent_activity: RecentActivity {
            projects: recent_projects.into_iter().take(RECENT_LIMIT).cloned().collect(),
            payments: recent_payments.into_iter().take(RECENT_LIMIT).cloned().collect(),
        },
        charts: Charts { projects_by_status },
        alerts: Alerts {
            overdue_count: outstanding.len(),
            overdue_projects: outstanding.into_iter().take(OVERDUE_SHOWN).cloned().collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::PaymentStatus;
    use crate::payments::tests::payment;
    use crate::projects::tests::project;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 18).unwrap()
    }

    #[test]
    fn test_overview_counts_and_sums() {
        let projects = vec![
            project(1, ProjectStatus::Planning, 100),
            project(2, ProjectStatus::InProgress, 200),
            project(3, ProjectStatus::Review, 300),
            project(4, ProjectStatus::Completed, 400),
            project(5, ProjectStatus::OnHold, 500),
        ];
        let payments = vec![
            payment(1000.0, "2024-01-10", PaymentStatus::Completed),
            payment(250.0, "2024-03-01", PaymentStatus::Completed),
            payment(125.0, "2024-03-17", PaymentStatus::Completed),
            payment(9000.0, "2024-03-10", PaymentStatus::Pending),
            payment(7000.0, "2024-02-29", PaymentStatus::Failed),
        ];

        let stats = dashboard_stats(8, &projects, &payments, today());

        assert_eq!(stats.overview.total_clients, 8);
        assert_eq!(stats.overview.active_projects, 3);
        assert_eq!(stats.overview.total_revenue, 1375.0);
        assert_eq!(stats.overview.monthly_revenue, 375.0);
    }

    #[test]
    fn test_recent_lists_are_capped_and_newest_first() {
        let projects: Vec<_> = (1..=7)
            .map(|i| project(i, ProjectStatus::Planning, i * 1000))
            .collect();
        let payments: Vec<_> = (1..=7)
            .map(|day| {
                let mut p = payment(10.0, &format!("2024-02-0{day}"), PaymentStatus::Completed);
                p.id = day as i64;
                p
            })
            .collect();

        let stats = dashboard_stats(0, &projects, &payments, today());

        let project_ids: Vec<i64> = stats.recent_activity.projects.iter().map(|p| p.id).collect();
        assert_eq!(project_ids, vec![7, 6, 5, 4, 3]);

        let payment_ids: Vec<i64> = stats.recent_activity.payments.iter().map(|p| p.id).collect();
        assert_eq!(payment_ids, vec![7, 6, 5, 4, 3]);
    }

    #[test]
    fn test_status_chart_includes_empty_statuses() {
        let projects = vec![
            project(1, ProjectStatus::Review, 1),
            project(2, ProjectStatus::Review, 2),
        ];
        let stats = dashboard_stats(0, &projects, &[], today());

        let chart = &stats.charts.projects_by_status;
        assert_eq!(chart.len(), ProjectStatus::ALL.len());
        assert_eq!(chart[0], StatusCount { status: ProjectStatus::Planning, count: 0 });
        assert_eq!(chart[2], StatusCount { status: ProjectStatus::Review, count: 2 });
    }

    #[test]
    fn test_overdue_is_every_non_completed_project() {
        let mut projects: Vec<_> = (1..=12)
            .map(|i| project(i, ProjectStatus::InProgress, i * 10))
            .collect();
        projects.push(project(13, ProjectStatus::Completed, 1));

        let stats = dashboard_stats(0, &projects, &[], today());

        assert_eq!(stats.alerts.overdue_count, OVERDUE_FETCH_LIMIT);
        let ids: Vec<i64> = stats.alerts.overdue_projects.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_dashboard() {
        let stats = dashboard_stats(0, &[], &[], today());
        assert_eq!(stats.overview.total_revenue, 0.0);
        assert!(stats.recent_activity.projects.is_empty());
        assert_eq!(stats.alerts.overdue_count, 0);

        let json = serde_json::to_value(&stats).unwrap();
        assert!(json["recentActivity"]["payments"].is_array());
        assert_eq!(json["charts"]["projectsByStatus"][1]["status"], "in_progress");
    }
}
