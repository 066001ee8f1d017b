//! Cardfile CLI - runs the gateway and administrative commands.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cardfile_auth::{CredentialStore, NewAccount, Role, TokenService, password::hash_password};
use cardfile_core::Config;
use cardfile_gateway::{GatewayBuilder, GatewayConfig, SledAccountStore};

#[derive(Parser)]
#[command(name = "cardfile")]
#[command(about = "Cardfile - contact book API")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (defaults to ~/.cardfile/cardfile.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,

        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Administrative account commands
    #[command(subcommand)]
    Admin(AdminCommands),

    /// Generate a signing secret for the config file
    Secret,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create a pre-confirmed account with an elevated role.
    ///
    /// This is the out-of-band path for minting non-user roles; the signup
    /// endpoint always assigns role `user`.
    Create {
        /// Account email
        #[arg(long)]
        email: String,

        /// Display name
        #[arg(long)]
        username: String,

        /// Password (hashed before storage)
        #[arg(long, env = "CARDFILE_ADMIN_PASSWORD")]
        password: String,

        /// Role to assign
        #[arg(long, default_value = "admin")]
        role: Role,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path).context("failed to load config")?,
        None => Config::load_default().context("failed to load config")?,
    };

    match cli.command {
        Commands::Serve { port, bind } => {
            let mut gateway_config = GatewayConfig::from_config(&config);
            if let Some(port) = port {
                gateway_config.port = port;
            }
            if let Some(bind) = bind {
                gateway_config.bind_address = bind;
            }

            let gateway = GatewayBuilder::new()
                .with_config(gateway_config)
                .build()
                .context("failed to assemble gateway")?;
            gateway.run().await.context("server failed")?;
        }

        Commands::Admin(AdminCommands::Create {
            email,
            username,
            password,
            role,
        }) => {
            let email = cardfile_core::normalize_email(&email)
                .map_err(|e| anyhow::anyhow!("unusable email: {e}"))?;
            let username = cardfile_core::sanitize_display_name(&username)
                .map_err(|e| anyhow::anyhow!("unusable display name: {e}"))?;

            let store = SledAccountStore::open(&config.server.data_dir)
                .map_err(|e| anyhow::anyhow!("failed to open account store: {e}"))?;

            let password_hash =
                hash_password(&password).map_err(|e| anyhow::anyhow!("hashing failed: {e}"))?;

            let mut account = store
                .insert(NewAccount {
                    email,
                    username,
                    password_hash,
                    role,
                    avatar_url: None,
                })
                .map_err(|e| anyhow::anyhow!("failed to create account: {e}"))?;

            // Administrative accounts skip the confirmation flow.
            account.confirmed = true;
            store
                .update(&account)
                .map_err(|e| anyhow::anyhow!("failed to confirm account: {e}"))?;

            tracing::info!(account = %account.id, role = %account.role, "account created");
            println!("Created {} account {} ({})", account.role, account.email, account.id);
        }

        Commands::Secret => {
            println!("{}", TokenService::generate_hex_secret());
        }
    }

    Ok(())
}
