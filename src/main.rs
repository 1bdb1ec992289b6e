use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use daybreak_checkmail::checkmail::CheckMailService;
use daybreak_checkmail::config::CheckMailConfig;
use daybreak_checkmail::mail::ImapTransport;
use daybreak_checkmail::scheduler::{parse_schedule, spawn_checkmail_scheduler};
use daybreak_checkmail::staging::DirectorySink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Console logging, plus a daily log file when CHECKMAIL_LOG_DIR is set
    let (file_layer, _log_guard) = match std::env::var("CHECKMAIL_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "checkmail.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    let config = CheckMailConfig::from_env().context("Invalid CheckMail configuration")?;
    let once = std::env::args().nth(1).is_some_and(|arg| arg == "once");

    eprintln!("📬 Daybreak CheckMail v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   IMAP: {}:{} as {}", config.imap_host, config.imap_port, config.username);
    eprintln!(
        "   Folders: {} -> {}",
        config.receiving_path(),
        config.processed_path()
    );
    eprintln!("   Staging: {}", config.daybreak_staging_dir().display());
    eprintln!(
        "   Required: {}",
        config
            .required_types
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let transport = ImapTransport::from_config(&config);
    let sink = DirectorySink::new(config.daybreak_staging_dir());
    let schedule = parse_schedule(&config.cron_schedule).map_err(anyhow::Error::msg)?;
    let scheduled = config.scheduled;
    let service = Arc::new(CheckMailService::new(config, transport, sink));

    // On-demand pass, regardless of the scheduling flag
    if once {
        let svc = Arc::clone(&service);
        let summary = tokio::task::spawn_blocking(move || svc.check_mail()).await??;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if !scheduled {
        eprintln!("   Schedule: disabled (CHECKMAIL_SCHEDULED=false); run with `once` for a single pass");
        return Ok(());
    }

    eprintln!("   Schedule: {}\n", service.config().cron_schedule);
    let (handle, shutdown) = spawn_checkmail_scheduler(service, schedule);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl-C, stopping scheduler");
    shutdown.store(true, Ordering::Relaxed);
    handle.abort();

    Ok(())
}
