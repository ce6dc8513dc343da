use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mail_digest::api::{self, AppState};
use mail_digest::config::{
    ApiConfig, GatewayConfig, MonitorConfig, ProcessorConfig, SenderConfig, StoreConfig,
};
use mail_digest::gateway::OllamaGateway;
use mail_digest::monitor::spawn_monitor;
use mail_digest::processor::{Processor, spawn_sweeper};
use mail_digest::sender::MailSender;
use mail_digest::store::EmailLogStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Log to stderr and to a rolling file, mirroring the deployment's
    // expectations for post-hoc diagnosis.
    let file_appender = tracing_appender::rolling::never(".", "mail-digest.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    let monitor_config = MonitorConfig::from_env()?;
    let store_config = StoreConfig::from_env();
    let gateway_config = GatewayConfig::from_env();
    let processor_config = ProcessorConfig::from_env();
    let sender_config = SenderConfig::from_env()?;
    let api_config = ApiConfig::from_env();

    eprintln!("📬 Mail Digest v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {} on {}", monitor_config.mailbox, monitor_config.imap_host);
    eprintln!("   Database: {}", store_config.db_path.display());
    eprintln!("   Model: {} at {}", gateway_config.model, gateway_config.endpoint);
    eprintln!("   API: http://{}/logs", api_config.bind_addr);

    // ── Store ────────────────────────────────────────────────────────────
    let store = Arc::new(EmailLogStore::connect(&store_config).await.unwrap_or_else(
        |e| {
            eprintln!(
                "Error: Failed to open database at {}: {}",
                store_config.db_path.display(),
                e
            );
            std::process::exit(1);
        },
    ));

    // ── Processing ───────────────────────────────────────────────────────
    let gateway = Arc::new(OllamaGateway::new(&gateway_config)?);
    let processor = Arc::new(Processor::new(
        Arc::clone(&store),
        gateway,
        monitor_config.attachment_dir.clone(),
    ));
    let (sweeper_handle, sweeper_stop) = spawn_sweeper(
        Arc::clone(&processor),
        Duration::from_secs(processor_config.sweep_interval_secs),
    );

    // ── Mailbox monitor ──────────────────────────────────────────────────
    let (monitor_handle, monitor_stop) = spawn_monitor(monitor_config, Arc::clone(&store))?;

    // ── Outbound sender ──────────────────────────────────────────────────
    let sender = match sender_config {
        Some(config) => {
            eprintln!("   Forwarding: {} recipient(s)", config.recipients.len());
            Some(Arc::new(MailSender::new(config)?))
        }
        None => {
            eprintln!("   Forwarding: disabled (RECIPIENTS not set)");
            None
        }
    };

    // ── HTTP API ─────────────────────────────────────────────────────────
    let app = api::router(AppState {
        store,
        processor,
        sender,
    });
    let bind_addr = api_config.bind_addr.clone();
    let server_handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("Failed to bind API port");
        tracing::info!(addr = %bind_addr, "API server started");
        axum::serve(listener, app).await.ok();
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    monitor_stop.store(true, Ordering::Relaxed);
    sweeper_stop.store(true, Ordering::Relaxed);
    let _ = monitor_handle.await;
    let _ = sweeper_handle.await;
    server_handle.abort();

    Ok(())
}
