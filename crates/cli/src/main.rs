//! Bakehouse CLI - Database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! bakehouse-cli migrate
//!
//! # Validate a store settings document (file or URL)
//! bakehouse-cli settings check ./settings.json
//!
//! # Preview the delivery dates the order form would offer
//! bakehouse-cli dates preview --count 5
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `settings check` - Parse and validate a settings document
//! - `dates preview` - Show upcoming delivery dates

#![cfg_attr(not(test), forbid(unsafe_code))]

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "bakehouse-cli")]
#[command(author, version, about = "Bakehouse CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Work with the store settings document
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Delivery date tools
    Dates {
        #[command(subcommand)]
        action: DatesAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Parse and validate a settings document
    Check {
        /// Path or http(s) URL of the document
        source: String,
    },
}

#[derive(Subcommand)]
enum DatesAction {
    /// Show the next deliverable dates
    Preview {
        /// Number of dates to show
        #[arg(short, long, default_value_t = 3)]
        count: usize,

        /// Settings document (path or URL); built-in settings if omitted
        #[arg(short, long)]
        settings: Option<String>,

        /// Bakery timezone
        #[arg(short, long, default_value = "America/Los_Angeles")]
        timezone: String,

        /// Pretend the order is placed at this instant (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Settings { action } => match action {
            SettingsAction::Check { source } => commands::settings::check(&source).await?,
        },
        Commands::Dates { action } => match action {
            DatesAction::Preview {
                count,
                settings,
                timezone,
                at,
            } => {
                commands::dates::preview(count, settings.as_deref(), &timezone, at).await?;
            }
        },
    }
    Ok(())
}
