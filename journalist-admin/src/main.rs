//! Journalist Admin - Main entry point
//!
//! Runs the account administration web interface and provides a few
//! bootstrap commands for operators.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use journalist_admin::account::{AccountError, AccountStore, NewAccount};
use journalist_admin::admin::AdminState;
use journalist_admin::config::{self, Config};
use journalist_admin::db::Database;
use journalist_admin::otp;
use journalist_admin::server::run_server;

/// Journalist Admin - Manage journalist accounts and two-factor enrollment
#[derive(Parser)]
#[command(name = "journalist-admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value_os_t = Config::default_path())]
    config: PathBuf,

    /// Data directory for the database, static files and logs
    #[arg(short, long, default_value_os_t = Config::default_data_dir())]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the admin web interface
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// Create an administrator account
    AddAdmin {
        /// Username for the new administrator
        #[arg(long)]
        username: String,

        /// 40-character hex secret of an HOTP hardware token (TOTP if omitted)
        #[arg(long)]
        hotp_secret: Option<String>,
    },

    /// Generate a default configuration file
    InitConfig {
        /// Output path (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    match cli.command {
        Commands::Serve { listen } => {
            init_daemon_logging(&cli.data_dir, filter)?;
            serve(&cli.config, &cli.data_dir, listen).await
        }
        Commands::AddAdmin {
            username,
            hotp_secret,
        } => {
            init_cli_logging(filter);
            add_admin(&cli.config, &cli.data_dir, username, hotp_secret).await
        }
        Commands::InitConfig { output } => {
            init_cli_logging(filter);
            generate_config(output)
        }
    }
}

/// Initialize logging for CLI commands (stdout only).
fn init_cli_logging(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// Initialize logging for the web interface (stdout + rotating file).
fn init_daemon_logging(data_dir: &Path, filter: EnvFilter) -> Result<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    // e.g. journalist-admin.2026-01-15.log
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("journalist-admin")
        .filename_suffix("log")
        .build(&log_dir)
        .context("Failed to create log file appender")?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The writer must outlive every log call in the process
    std::mem::forget(guard);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_target(true).with_ansi(false).with_writer(non_blocking))
        .init();

    info!("Logging to: {}", log_dir.display());
    Ok(())
}

/// Ensure data directory exists
fn ensure_data_dir(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        info!("Created data directory: {}", data_dir.display());
    }
    Ok(())
}

/// Run the admin web interface
async fn serve(config_path: &Path, data_dir: &Path, listen_override: Option<SocketAddr>) -> Result<()> {
    ensure_data_dir(data_dir)?;
    let config = Config::load(config_path)?;

    let listen_addr: SocketAddr = match listen_override {
        Some(addr) => addr,
        None => config.http.listen_addr.parse().with_context(|| {
            format!("Invalid listen address in config: {}", config.http.listen_addr)
        })?,
    };

    let db = Database::new(&config.database, data_dir).await?;
    let state = Arc::new(AdminState::new(db.pool(), &config, data_dir));

    info!("Journalist admin starting...");
    info!("Static files served from: {}", state.static_dir.display());

    run_server(listen_addr, state).await
}

/// Create an administrator account and print its credentials
async fn add_admin(
    config_path: &Path,
    data_dir: &Path,
    username: String,
    hotp_secret: Option<String>,
) -> Result<()> {
    ensure_data_dir(data_dir)?;
    let config = Config::load(config_path)?;
    let db = Database::new(&config.database, data_dir).await?;
    let accounts = AccountStore::new(db.pool(), config.passwords.clone());

    let password = accounts.policy().generate();
    let account = match accounts
        .create(NewAccount {
            username,
            password: password.clone(),
            is_admin: true,
            hotp_secret,
        })
        .await
    {
        Ok(account) => account,
        Err(AccountError::DuplicateUsername(name)) => {
            bail!("Username \"{name}\" is already in use")
        }
        Err(e) => return Err(e).context("Failed to create administrator"),
    };

    println!("Created administrator '{}' (id {})", account.username, account.id);
    println!("  Passphrase: {password}");
    println!(
        "  {} secret: {}",
        account.otp_mode.as_str().to_uppercase(),
        otp::formatted_secret(&account.otp_secret)
    );
    println!(
        "  Provisioning URI: {}",
        otp::provisioning_uri(
            account.otp_mode,
            &account.otp_secret,
            &account.username,
            &config.admin.otp_issuer
        )
    );
    println!();
    println!("Log in to the web interface with the passphrase and a code from the token.");

    Ok(())
}

/// Generate default configuration file
fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = config::default_config_template();

    match output {
        Some(path) => {
            std::fs::write(&path, &config)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Configuration written to: {}", path.display());
        }
        None => {
            print!("{config}");
        }
    }

    Ok(())
}
