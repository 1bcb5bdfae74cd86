//! Centralized constants for the studio CRM
//!
//! Deployment-specific settings are loaded from config.toml; these are the
//! defaults and fixed values.

// =============================================================================
// Server
// =============================================================================

/// Default listen address
pub const DEFAULT_BIND: &str = "0.0.0.0:5000";

/// Route prefix for locally stored documents
pub const FILES_ROUTE: &str = "/files";

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "CRM_LOG";

/// Environment variable `user add` reads the new password from
pub const PASSWORD_ENV: &str = "CRM_USER_PASSWORD";

// =============================================================================
// File Names
// =============================================================================

/// Default config file path
pub const CONFIG_FILE: &str = "config.toml";

/// Default data directory
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Database filename
pub const DATABASE_FILENAME: &str = "crm.sqlite";

/// Local document storage directory (inside the data directory)
pub const DOCUMENTS_DIRNAME: &str = "documents";

// =============================================================================
// Limits
// =============================================================================

/// Login sessions last a week by default
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 168;

/// Longest accepted session lifetime (one year)
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

/// Largest accepted document upload (25 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Default and maximum page sizes for list endpoints
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Minimum password length at registration
pub const MIN_PASSWORD_LEN: usize = 8;

// =============================================================================
// Backblaze B2
// =============================================================================

/// Account authorization endpoint
pub const B2_AUTHORIZE_URL: &str = "https://api.backblazeb2.com/b2api/v2/b2_authorize_account";

/// API version path appended to the per-account API URL
pub const B2_API_PATH: &str = "/b2api/v2";
