//! SQLite persistence for users, sessions, clients, projects, payments and
//! documents
//!
//! Aggregates are never stored here. Every summary is computed from the rows
//! returned by these queries.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use studio_finance::{Payment, Project, ProjectStatus};

use crate::constants;
use crate::models::{
    Client, Document, NewClient, NewDocument, NewPayment, NewProject, Role, Session, User,
    non_empty,
};

/// Database wrapper; cheap to clone
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

/// One page of a list query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based
    pub page: u32,
    pub limit: u32,
}

impl Page {
    /// Clamp raw query values into a usable page
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(constants::DEFAULT_PAGE_SIZE)
                .clamp(1, constants::MAX_PAGE_SIZE),
        }
    }

    fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Filters for the project list
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub client_id: Option<i64>,
    pub page: Page,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at";
const CLIENT_COLUMNS: &str =
    "id, name, email, phone, company, address, notes, created_at, updated_at";
const PROJECT_COLUMNS: &str = "id, client_id, name, description, status, start_date, end_date, \
     total_price, created_at, updated_at";
const PAYMENT_COLUMNS: &str =
    "id, project_id, amount, payment_date, status, method, reference, notes, created_at";
const DOCUMENT_COLUMNS: &str = "id, project_id, name, storage_key, storage_id, content_type, \
     size_bytes, url, uploaded_at";

/// Row type for users query
#[derive(FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

/// Row type for sessions query
#[derive(FromRow)]
struct SessionRow {
    token: String,
    user_id: i64,
    expires_at: i64,
}

/// Row type for clients query
#[derive(FromRow)]
struct ClientRow {
    id: i64,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    company: Option<String>,
    address: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row type for projects query
#[derive(FromRow)]
struct ProjectRow {
    id: i64,
    client_id: i64,
    name: String,
    description: Option<String>,
    status: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    total_price: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row type for payments query
#[derive(FromRow)]
struct PaymentRow {
    id: i64,
    project_id: i64,
    amount: f64,
    payment_date: NaiveDate,
    status: String,
    method: String,
    reference: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

/// Row type for documents query
#[derive(FromRow)]
struct DocumentRow {
    id: i64,
    project_id: i64,
    name: String,
    storage_key: String,
    storage_id: Option<String>,
    content_type: String,
    size_bytes: i64,
    url: String,
    uploaded_at: DateTime<Utc>,
}

impl Database {
    /// Open or create the database file
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // WAL plus a busy timeout prevents SQLITE_BUSY when the CLI and the
        // server touch the file at the same time
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let db = Self { pool };
        db.init_schema().await?;

        Ok(db)
    }

    /// Private in-memory database
    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // A single connection that is never recycled, or the data disappears
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        let db = Self { pool };
        db.init_schema().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'member',
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            -- Opaque bearer tokens; expires_at is a unix timestamp
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT,
                phone TEXT,
                company TEXT,
                address TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id INTEGER NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'planning',
                start_date TEXT,
                end_date TEXT,
                total_price REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                amount REAL NOT NULL,
                payment_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                method TEXT NOT NULL DEFAULT 'bank_transfer',
                reference TEXT,
                notes TEXT,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                storage_key TEXT NOT NULL UNIQUE,
                storage_id TEXT,
                content_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                url TEXT NOT NULL,
                uploaded_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_projects_client ON projects(client_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_payments_project ON payments(project_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_payments_date ON payments(payment_date)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> sqlx::Result<User> {
        let result = sqlx::query(
            "INSERT INTO users (name, email, password_hash, role, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name.trim())
        .bind(email.trim().to_lowercase())
        .bind(password_hash)
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_user(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Self-service registration. The first account becomes admin; later
    /// ones become members, and only when `open` is set. Returns `None` when
    /// registration is closed.
    ///
    /// The role decision and the insert are one statement, so concurrent
    /// registrations on an empty table cannot both become admin.
    pub async fn register_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        open: bool,
    ) -> sqlx::Result<Option<User>> {
        let result = sqlx::query(
            "INSERT INTO users (name, email, password_hash, role, created_at)
             SELECT ?, ?, ?,
                    CASE WHEN EXISTS (SELECT 1 FROM users) THEN ? ELSE ? END,
                    ?
             WHERE ? OR NOT EXISTS (SELECT 1 FROM users)",
        )
        .bind(name.trim())
        .bind(email.trim().to_lowercase())
        .bind(password_hash)
        .bind(Role::Member.as_str())
        .bind(Role::Admin.as_str())
        .bind(Utc::now())
        .bind(open)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_user(result.last_insert_rowid()).await
    }

    pub async fn get_user(&self, id: i64) -> sqlx::Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(UserRow::into_user).transpose()
    }

    pub async fn find_user_by_email(&self, email: &str) -> sqlx::Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
                .bind(email.trim().to_lowercase())
                .fetch_optional(&self.pool)
                .await?;

        row.map(UserRow::into_user).transpose()
    }

    pub async fn list_users(&self) -> sqlx::Result<Vec<User>> {
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(UserRow::into_user).collect()
    }

    pub async fn count_users(&self) -> sqlx::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Issue a new session token for a user
    pub async fn create_session(
        &self,
        user_id: i64,
        ttl: chrono::Duration,
    ) -> sqlx::Result<Session> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let token = uuid::Uuid::new_v4().simple().to_string();

        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&token)
        .bind(user_id)
        .bind(now.timestamp())
        .bind(expires_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(Session {
            token,
            user_id,
            expires_at,
        })
    }

    /// Resolve a token to its user; expired sessions resolve to nothing
    pub async fn session_user(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> sqlx::Result<Option<User>> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT token, user_id, expires_at FROM sessions WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        let Some(session) = row else {
            return Ok(None);
        };

        if session.expires_at <= now.timestamp() {
            self.delete_session(&session.token).await?;
            return Ok(None);
        }

        self.get_user(session.user_id).await
    }

    pub async fn delete_session(&self, token: &str) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop every session that has expired, returns how many
    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Clients
    // =========================================================================

    /// List clients, newest first, optionally matching name/email/company
    pub async fn list_clients(
        &self,
        search: Option<&str>,
        page: Page,
    ) -> sqlx::Result<Vec<Client>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {CLIENT_COLUMNS} FROM clients"));

        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{term}%");
            qb.push(" WHERE name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR email LIKE ")
                .push_bind(pattern.clone())
                .push(" OR company LIKE ")
                .push_bind(pattern);
        }

        qb.push(" ORDER BY id DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows: Vec<ClientRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(ClientRow::into_client).collect())
    }

    pub async fn get_client(&self, id: i64) -> sqlx::Result<Option<Client>> {
        let row: Option<ClientRow> =
            sqlx::query_as(&format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(ClientRow::into_client))
    }

    pub async fn create_client(&self, client: &NewClient) -> sqlx::Result<Client> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO clients
                (name, email, phone, company, address, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(client.name.trim())
        .bind(non_empty(client.email.clone()))
        .bind(non_empty(client.phone.clone()))
        .bind(non_empty(client.company.clone()))
        .bind(non_empty(client.address.clone()))
        .bind(non_empty(client.notes.clone()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_client(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Write every field of an existing client
    pub async fn update_client(&self, client: &Client) -> sqlx::Result<Option<Client>> {
        let result = sqlx::query(
            "UPDATE clients
             SET name = ?, email = ?, phone = ?, company = ?, address = ?, notes = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&client.name)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(&client.company)
        .bind(&client.address)
        .bind(&client.notes)
        .bind(Utc::now())
        .bind(client.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_client(client.id).await
    }

    /// Delete a client with its projects, payments and document records
    pub async fn delete_client(&self, id: i64) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_clients(&self) -> sqlx::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM clients")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Projects
    // =========================================================================

    /// List projects, newest first
    pub async fn list_projects(&self, filter: &ProjectFilter) -> sqlx::Result<Vec<Project>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE 1 = 1"));

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(client_id) = filter.client_id {
            qb.push(" AND client_id = ").push_bind(client_id);
        }

        qb.push(" ORDER BY id DESC LIMIT ")
            .push_bind(i64::from(filter.page.limit))
            .push(" OFFSET ")
            .push_bind(filter.page.offset());

        let rows: Vec<ProjectRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(ProjectRow::into_project).collect()
    }

    /// Every project, oldest first
    pub async fn all_projects(&self) -> sqlx::Result<Vec<Project>> {
        let rows: Vec<ProjectRow> =
            sqlx::query_as(&format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(ProjectRow::into_project).collect()
    }

    pub async fn projects_for_client(&self, client_id: i64) -> sqlx::Result<Vec<Project>> {
        let rows: Vec<ProjectRow> = sqlx::query_as(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE client_id = ? ORDER BY id DESC"
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ProjectRow::into_project).collect()
    }

    pub async fn get_project(&self, id: i64) -> sqlx::Result<Option<Project>> {
        let row: Option<ProjectRow> =
            sqlx::query_as(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(ProjectRow::into_project).transpose()
    }

    pub async fn create_project(&self, project: &NewProject) -> sqlx::Result<Project> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO projects
                (client_id, name, description, status, start_date, end_date, total_price,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project.client_id)
        .bind(project.name.trim())
        .bind(non_empty(project.description.clone()))
        .bind(project.status.unwrap_or_default().as_str())
        .bind(project.start_date)
        .bind(project.end_date)
        .bind(project.total_price.unwrap_or(0.0))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_project(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Write every field of an existing project
    pub async fn update_project(&self, project: &Project) -> sqlx::Result<Option<Project>> {
        let result = sqlx::query(
            "UPDATE projects
             SET client_id = ?, name = ?, description = ?, status = ?, start_date = ?,
                 end_date = ?, total_price = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(project.client_id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.status.as_str())
        .bind(project.start_date)
        .bind(project.end_date)
        .bind(project.total_price)
        .bind(Utc::now())
        .bind(project.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_project(project.id).await
    }

    pub async fn delete_project(&self, id: i64) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Payments newest first, optionally for one project
    pub async fn list_payments(&self, project_id: Option<i64>) -> sqlx::Result<Vec<Payment>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {PAYMENT_COLUMNS} FROM payments"));

        if let Some(id) = project_id {
            qb.push(" WHERE project_id = ").push_bind(id);
        }
        qb.push(" ORDER BY payment_date DESC, id DESC");

        let rows: Vec<PaymentRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(PaymentRow::into_payment).collect()
    }

    /// Payments belonging to any of the given projects
    pub async fn payments_for_projects(&self, project_ids: &[i64]) -> sqlx::Result<Vec<Payment>> {
        if project_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE project_id IN ("
        ));
        let mut ids = qb.separated(", ");
        for id in project_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(") ORDER BY payment_date DESC, id DESC");

        let rows: Vec<PaymentRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(PaymentRow::into_payment).collect()
    }

    pub async fn get_payment(&self, id: i64) -> sqlx::Result<Option<Payment>> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(PaymentRow::into_payment).transpose()
    }

    pub async fn create_payment(
        &self,
        project_id: i64,
        payment: &NewPayment,
    ) -> sqlx::Result<Payment> {
        let result = sqlx::query(
            "INSERT INTO payments
                (project_id, amount, payment_date, status, method, reference, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(payment.amount)
        .bind(payment.payment_date)
        .bind(payment.status.unwrap_or_default().as_str())
        .bind(payment.method.unwrap_or_default().as_str())
        .bind(non_empty(payment.reference.clone()))
        .bind(non_empty(payment.notes.clone()))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_payment(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Write every field of an existing payment
    pub async fn update_payment(&self, payment: &Payment) -> sqlx::Result<Option<Payment>> {
        let result = sqlx::query(
            "UPDATE payments
             SET amount = ?, payment_date = ?, status = ?, method = ?, reference = ?, notes = ?
             WHERE id = ?",
        )
        .bind(payment.amount)
        .bind(payment.payment_date)
        .bind(payment.status.as_str())
        .bind(payment.method.as_str())
        .bind(&payment.reference)
        .bind(&payment.notes)
        .bind(payment.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_payment(payment.id).await
    }

    pub async fn delete_payment(&self, id: i64) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM payments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Documents
    // =========================================================================

    pub async fn documents_for_project(&self, project_id: i64) -> sqlx::Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE project_id = ? ORDER BY id DESC"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DocumentRow::into_document).collect())
    }

    /// Documents under every project of a client
    pub async fn documents_for_client(&self, client_id: i64) -> sqlx::Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents
             WHERE project_id IN (SELECT id FROM projects WHERE client_id = ?)"
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DocumentRow::into_document).collect())
    }

    pub async fn get_document(&self, id: i64) -> sqlx::Result<Option<Document>> {
        let row: Option<DocumentRow> =
            sqlx::query_as(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(DocumentRow::into_document))
    }

    pub async fn create_document(&self, document: &NewDocument) -> sqlx::Result<Document> {
        let result = sqlx::query(
            "INSERT INTO documents
                (project_id, name, storage_key, storage_id, content_type, size_bytes, url,
                 uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(document.project_id)
        .bind(&document.name)
        .bind(&document.storage_key)
        .bind(&document.storage_id)
        .bind(&document.content_type)
        .bind(document.size_bytes)
        .bind(&document.url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_document(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn delete_document(&self, id: i64) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Utilities
    // =========================================================================

    /// Row counts per table
    pub async fn stats(&self) -> sqlx::Result<DbStats> {
        Ok(DbStats {
            users: self.count_rows("users").await?,
            clients: self.count_rows("clients").await?,
            projects: self.count_rows("projects").await?,
            payments: self.count_rows("payments").await?,
            documents: self.count_rows("documents").await?,
            sessions: self.count_rows("sessions").await?,
        })
    }

    async fn count_rows(&self, table: &'static str) -> sqlx::Result<u64> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

// =============================================================================
// Helper functions
// =============================================================================

/// Parse a stored enum column, reporting bad values as decode errors
fn parse_column<T>(value: &str) -> sqlx::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    value.parse().map_err(|e: T::Err| sqlx::Error::Decode(e.into()))
}

impl UserRow {
    fn into_user(self) -> sqlx::Result<User> {
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role: parse_column(&self.role)?,
            created_at: self.created_at,
        })
    }
}

impl ClientRow {
    fn into_client(self) -> Client {
        Client {
            id: self.id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            company: self.company,
            address: self.address,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl ProjectRow {
    fn into_project(self) -> sqlx::Result<Project> {
        Ok(Project {
            id: self.id,
            client_id: self.client_id,
            name: self.name,
            description: self.description,
            status: parse_column(&self.status)?,
            start_date: self.start_date,
            end_date: self.end_date,
            total_price: self.total_price,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PaymentRow {
    fn into_payment(self) -> sqlx::Result<Payment> {
        Ok(Payment {
            id: self.id,
            project_id: self.project_id,
            amount: self.amount,
            payment_date: self.payment_date,
            status: parse_column(&self.status)?,
            method: parse_column(&self.method)?,
            reference: self.reference,
            notes: self.notes,
            created_at: self.created_at,
        })
    }
}

impl DocumentRow {
    fn into_document(self) -> Document {
        Document {
            id: self.id,
            project_id: self.project_id,
            name: self.name,
            storage_key: self.storage_key,
            storage_id: self.storage_id,
            content_type: self.content_type,
            size_bytes: self.size_bytes,
            url: self.url,
            uploaded_at: self.uploaded_at,
        }
    }
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub users: u64,
    pub clients: u64,
    pub projects: u64,
    pub payments: u64,
    pub documents: u64,
    pub sessions: u64,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} users, {} clients, {} projects, {} payments, {} documents, {} sessions",
            self.users, self.clients, self.projects, self.payments, self.documents, self.sessions
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use studio_finance::{PaymentMethod, PaymentStatus};

    pub(crate) async fn seed_project(db: &Database, total_price: f64) -> Project {
        let client = db
            .create_client(&NewClient {
                name: "Hartley Residence".to_string(),
                email: Some("owner@hartley.example".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        db.create_project(&NewProject {
            client_id: client.id,
            name: "Kitchen extension".to_string(),
            total_price: Some(total_price),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    pub(crate) fn new_payment(amount: f64, date: &str, status: PaymentStatus) -> NewPayment {
        NewPayment {
            amount,
            payment_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            status: Some(status),
            method: None,
            reference: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_client_roundtrip_and_search() {
        let db = Database::open_in_memory().await.unwrap();

        let created = db
            .create_client(&NewClient {
                name: "  Marlow & Sons ".to_string(),
                company: Some("Marlow Holdings".to_string()),
                phone: Some("   ".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.name, "Marlow & Sons");
        assert_eq!(created.phone, None);

        db.create_client(&NewClient {
            name: "Quinn".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        let found = db.list_clients(Some("holdings"), Page::default()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, created.id);

        let all = db.list_clients(None, Page::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(db.count_clients().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_project_filters_and_pagination() {
        let db = Database::open_in_memory().await.unwrap();
        let first = seed_project(&db, 1000.0).await;

        for i in 0..3 {
            db.create_project(&NewProject {
                client_id: first.client_id,
                name: format!("Phase {i}"),
                status: Some(ProjectStatus::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let completed = db
            .list_projects(&ProjectFilter {
                status: Some(ProjectStatus::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(completed.len(), 3);

        let page_two = db
            .list_projects(&ProjectFilter {
                page: Page::new(Some(2), Some(3)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page_two.len(), 1);
        assert_eq!(page_two[0].id, first.id);
    }

    #[tokio::test]
    async fn test_payment_crud() {
        let db = Database::open_in_memory().await.unwrap();
        let project = seed_project(&db, 5000.0).await;

        let mut payment = db
            .create_payment(project.id, &new_payment(1200.0, "2024-04-02", PaymentStatus::Pending))
            .await
            .unwrap();
        assert_eq!(payment.method, PaymentMethod::BankTransfer);

        payment.status = PaymentStatus::Completed;
        payment.method = PaymentMethod::Check;
        let updated = db.update_payment(&payment).await.unwrap().unwrap();
        assert_eq!(updated.status, PaymentStatus::Completed);
        assert_eq!(updated.method, PaymentMethod::Check);

        let listed = db.list_payments(Some(project.id)).await.unwrap();
        assert_eq!(listed, vec![updated.clone()]);

        assert!(db.delete_payment(updated.id).await.unwrap());
        assert!(!db.delete_payment(updated.id).await.unwrap());
        assert!(db.get_payment(updated.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_payments_for_projects() {
        let db = Database::open_in_memory().await.unwrap();
        let a = seed_project(&db, 100.0).await;
        let b = seed_project(&db, 100.0).await;
        let c = seed_project(&db, 100.0).await;

        for project in [&a, &b, &c] {
            let payment = new_payment(10.0, "2024-01-01", PaymentStatus::Completed);
            db.create_payment(project.id, &payment).await.unwrap();
        }

        let payments = db.payments_for_projects(&[a.id, c.id]).await.unwrap();
        assert_eq!(payments.len(), 2);
        assert!(payments.iter().all(|p| p.project_id != b.id));
        assert!(db.payments_for_projects(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleting_client_cascades() {
        let db = Database::open_in_memory().await.unwrap();
        let project = seed_project(&db, 100.0).await;
        let payment = new_payment(10.0, "2024-01-01", PaymentStatus::Completed);
        db.create_payment(project.id, &payment).await.unwrap();

        assert!(db.delete_client(project.client_id).await.unwrap());
        assert!(db.get_project(project.id).await.unwrap().is_none());
        assert!(db.list_payments(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payment_requires_existing_project() {
        let db = Database::open_in_memory().await.unwrap();
        let result = db
            .create_payment(999, &new_payment(10.0, "2024-01-01", PaymentStatus::Completed))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sessions_expire() {
        let db = Database::open_in_memory().await.unwrap();
        let user = db
            .create_user("Ada", "Ada@Example.com", "hash", Role::Admin)
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert!(db.find_user_by_email("ADA@example.com").await.unwrap().is_some());

        let session = db.create_session(user.id, chrono::Duration::hours(1)).await.unwrap();
        let now = Utc::now();

        let resolved = db.session_user(&session.token, now).await.unwrap();
        assert_eq!(resolved.map(|u| u.id), Some(user.id));

        let later = now + chrono::Duration::hours(2);
        assert!(db.session_user(&session.token, later).await.unwrap().is_none());
        // Expired lookups remove the session
        assert!(!db.delete_session(&session.token).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = Database::open_in_memory().await.unwrap();
        db.create_user("Ada", "ada@example.com", "hash", Role::Admin)
            .await
            .unwrap();
        let err = db
            .create_user("Ada 2", "ADA@example.com", "hash", Role::Member)
            .await
            .unwrap_err();

        match err {
            sqlx::Error::Database(db_err) => assert!(db_err.is_unique_violation()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_register_user_bootstraps_one_admin() {
        let db = Database::open_in_memory().await.unwrap();

        let first = db
            .register_user("Ada", "ada@example.com", "hash", false)
            .await
            .unwrap();
        assert_eq!(first.map(|u| u.role), Some(Role::Admin));

        let closed = db
            .register_user("Eve", "eve@example.com", "hash", false)
            .await
            .unwrap();
        assert!(closed.is_none());
        assert_eq!(db.count_users().await.unwrap(), 1);

        let open = db
            .register_user("Grace", "grace@example.com", "hash", true)
            .await
            .unwrap();
        assert_eq!(open.map(|u| u.role), Some(Role::Member));
    }

    #[tokio::test]
    async fn test_register_user_on_file_database_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("crm.sqlite")).await.unwrap();

        let (a, b, c) = tokio::join!(
            db.register_user("Ada", "ada@example.com", "hash", false),
            db.register_user("Eve", "eve@example.com", "hash", false),
            db.register_user("Bob", "bob@example.com", "hash", false),
        );
        let created: Vec<User> = [a, b, c].into_iter().filter_map(|r| r.unwrap()).collect();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].role, Role::Admin);
        assert_eq!(db.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let db = Database::open_in_memory().await.unwrap();
        seed_project(&db, 100.0).await;

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.clients, 1);
        assert_eq!(stats.projects, 1);
        assert_eq!(stats.payments, 0);
        assert!(stats.to_string().contains("1 projects"));
    }
}
