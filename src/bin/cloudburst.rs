use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cloudburst::{
    AppState, SharedState, api, auth, cloudflare::CloudflareClient, config::AppConfig,
    settings::{DEFAULT_SETTINGS_PATH, SettingsStore},
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, rename_all = "kebab-case")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the admin HTTP service
    Serve(ServeArgs),
    /// Print an Argon2 hash for the admin password
    HashPassword {
        /// Plaintext password to hash
        #[arg(value_name = "PASSWORD")]
        password: String,
    },
}

#[derive(clap::Args, Debug)]
#[command(rename_all = "kebab-case")]
struct ServeArgs {
    /// Cloudflare API token with Zone:Read and Cache Purge permissions
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", value_name = "TOKEN", hide_env_values = true)]
    api_token: String,
    /// Comma-separated domains to connect (overrides the app URL host)
    #[arg(long, env = "CLOUDFLARE_DOMAIN", value_name = "DOMAINS")]
    domain: Option<String>,
    /// Public URL of the site, used when no domain is given
    #[arg(long, env = "APP_URL", value_name = "URL")]
    app_url: Option<String>,
    /// Path to the YAML settings file
    #[arg(long, env = "CLOUDBURST_SETTINGS_PATH", value_name = "PATH", default_value = DEFAULT_SETTINGS_PATH)]
    settings_path: PathBuf,
    /// Listen address for the HTTP server
    #[arg(long, env = "CLOUDBURST_LISTEN", value_name = "ADDR", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
    /// Admin username for Basic auth
    #[arg(long, env = "CLOUDBURST_ADMIN_USER", value_name = "USER", default_value = "admin")]
    admin_user: String,
    /// Argon2 hash of the admin password (see `hash-password`)
    #[arg(long, env = "CLOUDBURST_ADMIN_PASSWORD_HASH", value_name = "HASH", hide_env_values = true)]
    admin_password_hash: String,
    /// Timeout for each Cloudflare API call, in seconds
    #[arg(long, env = "CLOUDBURST_TIMEOUT_SECS", value_name = "SECS", default_value_t = 20)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    match Cli::parse().command {
        Command::Serve(args) => serve(args).await,
        Command::HashPassword { password } => {
            println!("{}", auth::hash_password(&password)?);
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = build_app_config(&args)?;
    let state = init_shared_state(&args, config)?;

    let app = api::create_router(state);

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind to {}", args.listen))?;

    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    Ok(())
}

fn init_shared_state(args: &ServeArgs, config: AppConfig) -> Result<SharedState> {
    let cloudflare = CloudflareClient::new(&args.api_token)
        .context("failed to create Cloudflare client")?
        .with_timeout(Duration::from_secs(args.timeout_secs));

    let settings = SettingsStore::new(&args.settings_path);
    info!(path = %settings.path().display(), "using settings file");

    Ok(Arc::new(AppState::new(config, settings, cloudflare)))
}

fn build_app_config(args: &ServeArgs) -> Result<AppConfig> {
    if args.timeout_secs == 0 {
        bail!("--timeout-secs must be greater than zero");
    }

    let admin_user = args.admin_user.trim().to_string();
    if admin_user.is_empty() {
        bail!("--admin-user cannot be empty");
    }

    let admin_password_hash = args.admin_password_hash.trim().to_string();
    auth::verify_password(&admin_password_hash, "")
        .context("--admin-password-hash is not a valid Argon2 hash")?;

    let domain_override = args
        .domain
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    Ok(AppConfig {
        domain_override,
        app_url: args.app_url.clone(),
        admin_user,
        admin_password_hash,
    })
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to install CTRL+C handler: {err}");
    }
    info!("shutdown signal received");
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
