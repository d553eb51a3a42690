use tokio::sync::watch;
use tokio::time::{sleep, Duration};

use trial_kernel::SourceError;

use crate::{EngineApi, FacadeError};

/// Timer-driven ingest loop. One task owns the shutdown receiver and the
/// single suspension point between poll cycles; no callback is scattered
/// anywhere else. A recoverable miss (stream not there yet, persistence
/// hiccup) is logged and retried on the next cycle; a truncated stream is
/// fatal. On shutdown the current state is flushed before returning, so
/// no event stays processed only in memory.
pub async fn watch_transcript(
    api: &mut EngineApi,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), FacadeError> {
    let interval = Duration::from_millis(api.config().poll_interval_ms.max(100));

    loop {
        match api.ingest_pass() {
            Ok(report) => {
                if report.processed > 0 || !report.actions.is_empty() {
                    log::info!(
                        "ingested {} event(s), {} action(s) pending: {}",
                        report.processed,
                        report.status.pending_action_count,
                        report.status
                    );
                }
            }
            Err(FacadeError::Source(SourceError::Unavailable(path))) => {
                log::warn!("transcript not present yet, retrying: {}", path.display());
            }
            Err(err @ FacadeError::StreamTruncated { .. }) => {
                api.flush_now().ok();
                return Err(err);
            }
            Err(err) => {
                // Cursor only moves durably with a successful save, so the
                // next cycle retries both the save and anything unsaved.
                log::error!("ingest cycle failed, will retry: {err}");
            }
        }

        tokio::select! {
            _ = sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    api.flush_now()?;
                    return Ok(());
                }
            }
        }
    }
}
