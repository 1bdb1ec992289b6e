//! Cron-driven trigger for scheduled mail checks.
//!
//! One pass at a time: the loop awaits each pass before it computes the
//! next fire time, so passes for a mailbox never overlap.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::checkmail::CheckMailService;
use crate::mail::MailTransport;
use crate::staging::StagingSink;

/// Parse a six-field cron expression.
pub fn parse_schedule(schedule: &str) -> Result<cron::Schedule, String> {
    cron::Schedule::from_str(schedule).map_err(|e| format!("invalid cron: {e}"))
}

/// Next fire time strictly after `after`.
pub fn next_fire(schedule: &cron::Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Spawn a background task that runs a pass on every cron fire.
///
/// Returns a `JoinHandle` and a shutdown flag. The flag is checked before
/// each pass; a pass already running is never interrupted.
pub fn spawn_checkmail_scheduler<T, S>(
    service: Arc<CheckMailService<T, S>>,
    schedule: cron::Schedule,
) -> (JoinHandle<()>, Arc<AtomicBool>)
where
    T: MailTransport + Send + Sync + 'static,
    S: StagingSink + Send + Sync + 'static,
{
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("CheckMail scheduler started");

        loop {
            let Some(next) = next_fire(&schedule, Utc::now()) else {
                warn!("Cron schedule has no upcoming fire time, stopping scheduler");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            if shutdown.load(Ordering::Relaxed) {
                info!("CheckMail scheduler shutting down");
                return;
            }

            let svc = Arc::clone(&service);
            match tokio::task::spawn_blocking(move || svc.check_mail()).await {
                // The pass logs its own outcome.
                Ok(_) => {}
                Err(e) => error!("CheckMail pass panicked: {e}"),
            }
        }
    });

    (handle, shutdown_flag)
}
