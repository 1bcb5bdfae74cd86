//! Studio CRM
//!
//! Client, project and payment tracking for an architecture studio. Runs the
//! REST API by default; the subcommands work against the same database from
//! the shell.

mod auth;
mod config;
mod constants;
mod db;
mod error;
mod models;
mod reports;
mod routes;
mod state;
mod storage;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use config::{Config, FileConfig, Overrides};
use db::Database;
use models::Role;
use state::AppState;
use studio_finance::YearSelection;

#[derive(Parser, Debug)]
#[command(name = "studio-crm")]
#[command(about = "Client, project and payment tracking for an architecture studio")]
struct Args {
    /// Config file
    #[arg(short, long, default_value = constants::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Listen address (overrides [server] bind)
    #[arg(long, global = true)]
    bind: Option<String>,

    /// SQLite database file (overrides [database] path)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the REST API (default)
    Serve,

    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Inspect and export payments
    Payment {
        #[command(subcommand)]
        action: PaymentCommand,
    },

    /// Print completed revenue per month for a year
    Revenue {
        /// Year to report (default: year of the latest payment)
        #[arg(long)]
        year: Option<i32>,

        /// Also write the table to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Show database row counts
    Stats,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Create a user. The password is read from CRM_USER_PASSWORD, or from
    /// the first line of stdin when that is unset.
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        email: String,

        /// admin or member
        #[arg(long, default_value = "member")]
        role: String,
    },

    /// List users
    List,
}

#[derive(Subcommand, Debug)]
enum PaymentCommand {
    /// List payments, newest first
    List {
        /// Only payments for this project
        #[arg(long)]
        project: Option<i64>,
    },

    /// Export payments to CSV
    Export {
        /// Output CSV file
        file: PathBuf,

        /// Only payments for this project
        #[arg(long)]
        project: Option<i64>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env(constants::LOG_ENV)
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let file_config = FileConfig::load_or_default(&args.config)?;
    let config = Config::from_file(
        &file_config,
        Overrides {
            bind: args.bind,
            database: args.database,
        },
    )?;

    match args.command {
        None | Some(Command::Serve) => serve(config).await,
        Some(Command::User { action }) => {
            let db = Database::open(&config.database_path).await?;
            handle_user_command(action, &db).await
        }
        Some(Command::Payment { action }) => {
            let db = Database::open(&config.database_path).await?;
            handle_payment_command(action, &db).await
        }
        Some(Command::Revenue { year, csv }) => {
            let db = Database::open(&config.database_path).await?;
            handle_revenue(year, csv, &db).await
        }
        Some(Command::Stats) => {
            let db = Database::open(&config.database_path).await?;
            println!("Database: {}", db.stats().await?);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let state = AppState::new(config).await?;
    let app = routes::router(state.clone());

    let listener = TcpListener::bind(&state.config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", state.config.bind))?;
    info!(address = %state.config.bind, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Handle user subcommands
async fn handle_user_command(action: UserCommand, db: &Database) -> Result<()> {
    match action {
        UserCommand::Add { name, email, role } => {
            let role: Role = role.parse().map_err(anyhow::Error::msg)?;
            let password = read_password(
                std::env::var(constants::PASSWORD_ENV).ok(),
                std::io::stdin().lock(),
            )?;
            models::RegisterRequest {
                name: name.clone(),
                email: email.clone(),
                password: password.clone(),
            }
            .validate()
            .map_err(anyhow::Error::msg)?;

            let hash = auth::hash_password(&password)?;
            let user = db
                .create_user(&name, &email, &hash, role)
                .await
                .with_context(|| format!("Failed to create user {}", email))?;

            println!(
                "Added user #{}: {} <{}> ({})",
                user.id,
                user.name,
                user.email,
                user.role.as_str()
            );
            Ok(())
        }

        UserCommand::List => {
            let users = db.list_users().await?;
            if users.is_empty() {
                println!("No users yet.");
                println!("\nUse 'studio-crm user add' or POST /auth/register to create one");
                return Ok(());
            }

            println!("{:<4} {:<24} {:<32} {:<8} Created", "ID", "Name", "Email", "Role");
            println!("{}", "-".repeat(84));
            for user in &users {
                println!(
                    "{:<4} {:<24} {:<32} {:<8} {}",
                    user.id,
                    user.name,
                    user.email,
                    user.role.as_str(),
                    user.created_at.format("%Y-%m-%d")
                );
            }
            println!("\n{} user(s)", users.len());
            Ok(())
        }
    }
}

/// Handle payment subcommands
async fn handle_payment_command(action: PaymentCommand, db: &Database) -> Result<()> {
    match action {
        PaymentCommand::List { project } => {
            let payments = db.list_payments(project).await?;
            if payments.is_empty() {
                println!("No payments recorded.");
            } else {
                reports::print_payments(&payments);
            }
            Ok(())
        }

        PaymentCommand::Export { file, project } => {
            let payments = db.list_payments(project).await?;
            reports::export_payments(&payments, &file)?;
            println!("Exported {} payments to {}", payments.len(), file.display());
            Ok(())
        }
    }
}

async fn handle_revenue(year: Option<i32>, csv: Option<PathBuf>, db: &Database) -> Result<()> {
    let payments = db.list_payments(None).await?;

    let selection = year.map_or(YearSelection::LatestPayment, YearSelection::Year);
    let year = studio_finance::resolve_year(selection, &payments, Utc::now().date_naive());
    let months = studio_finance::monthly_revenue(year, &payments);

    reports::print_revenue(year, &months);

    if let Some(path) = csv {
        reports::export_revenue(year, &months, &path)?;
        println!("\nWrote {}", path.display());
    }
    Ok(())
}

/// Password for `user add`: the environment value when set, otherwise the
/// first line of `input`
fn read_password(from_env: Option<String>, mut input: impl BufRead) -> Result<String> {
    if let Some(password) = from_env.filter(|p| !p.is_empty()) {
        return Ok(password);
    }

    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!(
            "No password given; set {} or pipe it on stdin",
            constants::PASSWORD_ENV
        );
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_from_env_wins() {
        let password = read_password(Some("from-env".to_string()), "from-stdin\n".as_bytes());
        assert_eq!(password.unwrap(), "from-env");
    }

    #[test]
    fn test_password_from_stdin() {
        let password = read_password(None, "s3cret pass\r\nignored\n".as_bytes());
        assert_eq!(password.unwrap(), "s3cret pass");

        let password = read_password(Some(String::new()), "fallback\n".as_bytes());
        assert_eq!(password.unwrap(), "fallback");
    }

    #[test]
    fn test_missing_password_is_an_error() {
        let err = read_password(None, "".as_bytes()).unwrap_err();
        assert!(err.to_string().contains(constants::PASSWORD_ENV));
        assert!(read_password(None, "\n".as_bytes()).is_err());
    }

    #[test]
    fn test_cli_parses_without_password_flag() {
        let args = Args::try_parse_from([
            "studio-crm",
            "user",
            "add",
            "--name",
            "Ada",
            "--email",
            "ada@studio.example",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Some(Command::User { action: UserCommand::Add { .. } })
        ));

        assert!(Args::try_parse_from(["studio-crm", "user", "add", "--password", "x"]).is_err());
        assert!(Args::try_parse_from(["studio-crm"]).unwrap().command.is_none());
    }
}
