//! Records owned by the CRM itself and the request bodies that create or
//! change them. Projects and payments live in `studio_finance`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use studio_finance::{Payment, PaymentMethod, PaymentStatus, Project, ProjectStatus};

use crate::constants;

/// Account role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// User account; the password hash never leaves the server
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored file attached to a project
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub storage_key: String,
    /// Backend-specific file id (B2 needs it for deletion)
    #[serde(skip)]
    pub storage_id: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

// =============================================================================
// Request bodies
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

/// Partial client update; absent fields are left unchanged and empty
/// strings clear optional fields
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub client_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_price: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    pub client_id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_price: Option<f64>,
}

/// Payment body. Older clients send `paymentMethod`; it is accepted here
/// and nowhere else.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPayment {
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub status: Option<PaymentStatus>,
    #[serde(alias = "paymentMethod")]
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPatch {
    pub amount: Option<f64>,
    pub payment_date: Option<NaiveDate>,
    pub status: Option<PaymentStatus>,
    #[serde(alias = "paymentMethod")]
    pub method: Option<PaymentMethod>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// Document metadata before insertion
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub project_id: i64,
    pub name: String,
    pub storage_key: String,
    pub storage_id: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub url: String,
}

// =============================================================================
// Validation
// =============================================================================

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_name(&self.name)?;
        if !self.email.contains('@') {
            return Err("A valid email is required".to_string());
        }
        if self.password.chars().count() < constants::MIN_PASSWORD_LEN {
            return Err(format!(
                "Password must be at least {} characters",
                constants::MIN_PASSWORD_LEN
            ));
        }
        Ok(())
    }
}

impl NewClient {
    pub fn validate(&self) -> Result<(), String> {
        require_name(&self.name)
    }
}

impl ClientPatch {
    pub fn validate(&self) -> Result<(), String> {
        self.name.as_deref().map_or(Ok(()), require_name)
    }
}

impl NewProject {
    pub fn validate(&self) -> Result<(), String> {
        require_name(&self.name)?;
        check_price(self.total_price)?;
        check_dates(self.start_date, self.end_date)
    }
}

impl ProjectPatch {
    pub fn validate(&self) -> Result<(), String> {
        self.name.as_deref().map_or(Ok(()), require_name)?;
        check_price(self.total_price)
    }
}

impl NewPayment {
    pub fn validate(&self) -> Result<(), String> {
        check_amount(self.amount)
    }
}

impl PaymentPatch {
    pub fn validate(&self) -> Result<(), String> {
        self.amount.map_or(Ok(()), check_amount)
    }
}

// =============================================================================
// Partial updates
// =============================================================================

impl ClientPatch {
    /// Merge into an existing client
    pub fn apply(self, client: &mut Client) {
        if let Some(name) = self.name {
            client.name = name.trim().to_string();
        }
        merge_text(&mut client.email, self.email);
        merge_text(&mut client.phone, self.phone);
        merge_text(&mut client.company, self.company);
        merge_text(&mut client.address, self.address);
        merge_text(&mut client.notes, self.notes);
    }
}

impl ProjectPatch {
    /// Merge into an existing project
    pub fn apply(self, project: &mut Project) {
        if let Some(client_id) = self.client_id {
            project.client_id = client_id;
        }
        if let Some(name) = self.name {
            project.name = name.trim().to_string();
        }
        merge_text(&mut project.description, self.description);
        if let Some(status) = self.status {
            project.status = status;
        }
        if self.start_date.is_some() {
            project.start_date = self.start_date;
        }
        if self.end_date.is_some() {
            project.end_date = self.end_date;
        }
        if let Some(price) = self.total_price {
            project.total_price = price;
        }
    }
}

impl PaymentPatch {
    /// Merge into an existing payment
    pub fn apply(self, payment: &mut Payment) {
        if let Some(amount) = self.amount {
            payment.amount = amount;
        }
        if let Some(date) = self.payment_date {
            payment.payment_date = date;
        }
        if let Some(status) = self.status {
            payment.status = status;
        }
        if let Some(method) = self.method {
            payment.method = method;
        }
        merge_text(&mut payment.reference, self.reference);
        merge_text(&mut payment.notes, self.notes);
    }
}

/// Absent leaves the field alone; blank clears it
fn merge_text(field: &mut Option<String>, patch: Option<String>) {
    if patch.is_some() {
        *field = non_empty(patch);
    }
}

/// Project dates are checked again after a patch is merged
pub fn check_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), String> {
    match (start, end) {
        (Some(s), Some(e)) if e < s => Err("End date is before start date".to_string()),
        _ => Ok(()),
    }
}

fn require_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        Err("Name is required".to_string())
    } else {
        Ok(())
    }
}

fn check_price(price: Option<f64>) -> Result<(), String> {
    match price {
        Some(p) if !p.is_finite() || p < 0.0 => {
            Err("Total price must be a non-negative number".to_string())
        }
        _ => Ok(()),
    }
}

fn check_amount(amount: f64) -> Result<(), String> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err("Amount must be a positive number".to_string())
    }
}

/// Empty or whitespace-only text is stored as NULL
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
