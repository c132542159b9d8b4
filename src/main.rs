use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use forum_thread_notifier::config::{Config, EmailProviderKind, StorageBackend};
use forum_thread_notifier::email::{BrevoProvider, Emailer, MailProvider, MockProvider, Sender};
use forum_thread_notifier::forum::ForumClient;
use forum_thread_notifier::poll::{poll_loop, Scheduler, SmartFetcher};
use forum_thread_notifier::retry::RetryPolicy;
use forum_thread_notifier::store::{LocalStore, S3Store, Store};
use forum_thread_notifier::web;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting forum-thread-notifier");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        poll_interval_secs = config.poll_interval.as_secs(),
        poll_on_startup = config.poll_on_startup,
        max_posts_per_email = config.max_posts_per_email,
        base_url = %config.base_url,
        "Configuration loaded"
    );

    let store = build_store(&config).await?;
    let emailer = build_emailer(&config)?;
    let fetcher = ForumClient::new(
        config.fetch_timeout,
        RetryPolicy::with_attempts(config.fetch_max_attempts),
    )
    .context("Failed to initialize forum client")?;

    if config.token_salt.is_empty() {
        error!("TOKEN_SALT is not set, subscription tokens can be derived from email addresses");
    }

    let planner = SmartFetcher::new(Arc::new(fetcher));
    let shutdown = CancellationToken::new();
    let scheduler = Arc::new(Scheduler::new(
        planner.clone(),
        store.clone(),
        emailer.clone(),
        config.max_posts_per_email,
        shutdown.clone(),
    ));

    // Start polling loop
    let poll_handle = tokio::spawn(poll_loop(
        scheduler.clone(),
        config.poll_interval,
        config.poll_on_startup,
    ));

    // Start web server in background
    let state = web::AppState {
        scheduler,
        store,
        planner,
        emailer,
        token_salt: Arc::from(config.token_salt.as_str()),
    };
    let web_shutdown = shutdown.clone();
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web::serve(&config.web_host, config.web_port, state, web_shutdown).await {
            error!("Web server error: {e:#}");
        }
    });

    shutdown_signal().await;

    info!("Shutting down...");

    // An in-flight fetch or save finishes; the cycle stops before the next thread
    shutdown.cancel();
    if let Err(e) = poll_handle.await {
        error!("Poll loop task failed: {e}");
    }
    web_handle.abort();

    info!("Shutdown complete");

    Ok(())
}

async fn build_store(config: &Config) -> Result<Arc<dyn Store>> {
    match &config.storage {
        StorageBackend::Local { path } => {
            let store = LocalStore::new(path.clone())
                .await
                .context("Failed to initialize local storage")?;
            info!(path = %path.display(), "Using local subscription storage");
            Ok(Arc::new(store))
        }
        StorageBackend::S3 {
            bucket,
            region,
            endpoint,
            prefix,
        } => {
            let store = S3Store::new(
                bucket,
                region,
                endpoint.as_deref(),
                prefix,
                RetryPolicy::with_attempts(config.store_max_attempts),
            )
            .context("Failed to initialize S3 storage")?;
            info!(bucket = %bucket, prefix = %prefix, "Using S3 subscription storage");
            Ok(Arc::new(store))
        }
    }
}

fn build_emailer(config: &Config) -> Result<Arc<dyn Emailer>> {
    let provider: Arc<dyn MailProvider> = match config.email_provider {
        EmailProviderKind::Mock => {
            info!("Using mock email provider, emails will only be logged");
            Arc::new(MockProvider)
        }
        EmailProviderKind::Brevo => {
            let api_key = config
                .brevo_api_key
                .clone()
                .context("BREVO_API_KEY is required for the Brevo provider")?;
            let from_address = config
                .mail_from_address
                .clone()
                .context("MAIL_FROM_ADDRESS is required for the Brevo provider")?;
            info!(from = %from_address, "Using Brevo email provider");
            Arc::new(BrevoProvider::new(
                config.brevo_api_url.clone(),
                api_key,
                from_address,
                config.mail_from_name.clone(),
                RetryPolicy::with_attempts(config.email_max_attempts),
            )?)
        }
    };

    Ok(Arc::new(Sender::new(provider, config.base_url.clone())))
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,forum_thread_notifier=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
