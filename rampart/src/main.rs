use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use rampart::{ConfigScope, LockoutKey, Rampart, SqliteStorage, Surface, UserType};
use rampart_core::repositories::{ConfigRepository, ConfigRepositoryProvider};
use tracing_subscriber::EnvFilter;

/// Command line interface for Rampart
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env = "RAMPART_DATABASE_URL")]
    db_url: String,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(clap::Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Show the lockout record for an identifier
    Status(Target),
    /// Delete the lockout record for an identifier
    Unlock(Target),
    /// Manage scoped settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Print version information
    Version,
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Store a setting
    Set {
        path: String,
        value: String,
        /// Apply to a website instead of the default scope
        #[arg(long, conflicts_with = "store")]
        website: Option<i64>,
        /// Apply to a single store view
        #[arg(long)]
        store: Option<i64>,
    },
}

#[derive(clap::Args)]
struct Target {
    /// Email or username the lockout is keyed by
    identifier: String,
    /// Look up an admin account instead of a customer
    #[arg(long)]
    admin: bool,
    /// Website the customer belongs to
    #[arg(long, conflicts_with = "admin")]
    website: Option<i64>,
    /// Use the forgot-password lockout instead of the login lockout
    #[arg(long)]
    forgot_password: bool,
}

impl Target {
    fn key(&self) -> LockoutKey {
        let user_type = if self.admin {
            UserType::Admin
        } else {
            UserType::Customer
        };
        let surface = if self.forgot_password {
            Surface::ForgotPassword
        } else {
            Surface::Login
        };
        LockoutKey::new(&self.identifier, user_type, self.website, surface)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("Rampart v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let provider = Arc::new(
        SqliteStorage::connect(&cli.db_url)
            .await?
            .into_repository_provider(),
    );

    match cli.command {
        Commands::Migrate => {
            println!("Running migrations...");
            Rampart::new(provider).migrate().await?;
        }
        Commands::Status(target) => {
            let key = target.key();
            match Rampart::new(provider).lockout_status(&key).await? {
                Some(record) => {
                    println!("identifier:      {}", record.identifier);
                    println!("user type:       {}", record.user_type);
                    println!("surface:         {}", record.surface);
                    if let Some(website) = record.website_id {
                        println!("website:         {website}");
                    }
                    println!("failed attempts: {}", record.failed_attempts);
                    println!("lock:            {}", record.lock_type.as_str());
                    if let Some(until) = record.lock_until {
                        println!("locked until:    {}", until.to_rfc3339());
                    }
                    if let Some(seconds) = record.retry_after_seconds(Utc::now()) {
                        println!("retry after:     {seconds}s");
                    }
                    println!("email sent:      {}", record.sent_email);
                }
                None => println!("No lockout record for {}", key.identifier),
            }
        }
        Commands::Unlock(target) => {
            let key = target.key();
            if Rampart::new(provider).unlock_account(&key).await? {
                println!("Unlocked {}", key.identifier);
            } else {
                println!("No lockout record for {}", key.identifier);
            }
        }
        Commands::Config {
            command:
                ConfigCommands::Set {
                    path,
                    value,
                    website,
                    store,
                },
        } => {
            let scope = match (website, store) {
                (_, Some(store)) => ConfigScope::Store(store),
                (Some(website), None) => ConfigScope::Website(website),
                (None, None) => ConfigScope::Default,
            };
            provider.config().write(&path, &value, scope).await?;
            println!("Set {path} = {value} ({scope})");
        }
        Commands::Version => {}
    }

    Ok(())
}
