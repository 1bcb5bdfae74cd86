//! Report generation (CSV exports and console tables)

use anyhow::Result;
use chrono::Month;
use csv::Writer;
use std::io::Write;
use std::path::Path;
use studio_finance::{MonthlyRevenue, Payment};

// =============================================================================
// CSV
// =============================================================================

/// Write payments as CSV, one row per payment
pub fn write_payments_csv<W: Write>(payments: &[Payment], writer: W) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);

    wtr.write_record([
        "ID",
        "Project_ID",
        "Date",
        "Amount",
        "Status",
        "Method",
        "Reference",
        "Notes",
    ])?;

    for payment in payments {
        wtr.write_record([
            payment.id.to_string().as_str(),
            &payment.project_id.to_string(),
            &payment.payment_date.to_string(),
            &format!("{:.2}", payment.amount),
            payment.status.as_str(),
            payment.method.as_str(),
            payment.reference.as_deref().unwrap_or(""),
            payment.notes.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn export_payments(payments: &[Payment], path: &Path) -> Result<()> {
    write_payments_csv(payments, std::fs::File::create(path)?)
}

/// Write the twelve monthly totals plus an annual total row
pub fn write_revenue_csv<W: Write>(year: i32, months: &[MonthlyRevenue], writer: W) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);

    wtr.write_record(["Year", "Month", "Month_Name", "Revenue"])?;

    for entry in months {
        wtr.write_record([
            year.to_string().as_str(),
            &entry.month.to_string(),
            month_name(entry.month),
            &format!("{:.2}", entry.total),
        ])?;
    }

    let total: f64 = months.iter().map(|m| m.total).sum();
    wtr.write_record([year.to_string().as_str(), "", "Total", &format!("{:.2}", total)])?;

    wtr.flush()?;
    Ok(())
}

pub fn export_revenue(year: i32, months: &[MonthlyRevenue], path: &Path) -> Result<()> {
    write_revenue_csv(year, months, std::fs::File::create(path)?)
}

// =============================================================================
// Console
// =============================================================================

pub fn print_payments(payments: &[Payment]) {
    println!(
        "{:<5} {:<8} {:<12} {:>12}  {:<10} {:<14} Reference",
        "ID", "Project", "Date", "Amount", "Status", "Method"
    );
    println!("{}", "-".repeat(80));

    for payment in payments {
        println!(
            "{:<5} {:<8} {:<12} ${:>11.2}  {:<10} {:<14} {}",
            payment.id,
            payment.project_id,
            payment.payment_date,
            payment.amount,
            payment.status.as_str(),
            payment.method.as_str(),
            truncate(payment.reference.as_deref().unwrap_or(""), 20),
        );
    }

    let completed = studio_finance::payments::total_completed(payments);
    println!("{}", "-".repeat(80));
    println!("{:>27} ${:>11.2}", "Completed:", completed);
    println!("\n{} payment(s)", payments.len());
}

pub fn print_revenue(year: i32, months: &[MonthlyRevenue]) {
    println!("Monthly revenue for {}", year);
    println!("{}", "=".repeat(30));

    for entry in months {
        println!("{:<12} ${:>14.2}", month_name(entry.month), entry.total);
    }

    let total: f64 = months.iter().map(|m| m.total).sum();
    println!("{}", "-".repeat(30));
    println!("{:<12} ${:>14.2}", "Total", total);
}

fn month_name(month: u32) -> &'static str {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
        .unwrap_or("")
}

/// Truncate to at most `max` characters
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}
