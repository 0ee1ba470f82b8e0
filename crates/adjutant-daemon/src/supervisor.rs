//! Resilient ingest supervision and heartbeat plumbing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use adjutant_core::config::{
    HEARTBEAT_INTERVAL_SECS, LISTENER_BACKOFF_CAP_SECS, LISTENER_BACKOFF_START_SECS,
};
use adjutant_core::notify::NotifySender;
use adjutant_ingest::{AccountListener, ChatEvent};
use adjutant_store::health::HealthStore;

/// Next delay in the reconnect sequence: doubles from 30 s, capped at 5 min.
pub fn next_backoff(current_secs: u64) -> u64 {
    (current_secs * 2).min(LISTENER_BACKOFF_CAP_SECS)
}

/// Keep one upstream account connected for the life of the process.
///
/// Crash → one-shot "offline" notice → capped exponential backoff →
/// reconnect → "restored" notice and backoff reset. The backoff sleep is
/// interruptible by shutdown.
pub async fn run_resilient_listener(
    listener: Arc<dyn AccountListener>,
    events_tx: mpsc::Sender<ChatEvent>,
    health: HealthStore,
    notify: NotifySender,
    mut shutdown: watch::Receiver<bool>,
) {
    let label = listener.label().to_string();
    let mut backoff_secs = LISTENER_BACKOFF_START_SECS;
    let mut was_down = false;

    loop {
        if *shutdown.borrow() {
            break;
        }

        match listener.start().await {
            Ok(()) => {
                info!(account = %label, "ingest connected");
                let _ = health.heartbeat("ingest", "ok", None);
                if was_down {
                    was_down = false;
                    backoff_secs = LISTENER_BACKOFF_START_SECS;
                    notify
                        .send_text("✅ Мониторинг восстановлен\nЧтение чатов снова работает.")
                        .await;
                }

                // Heartbeat while the pump runs.
                let hb_health = health.clone();
                let hb = tokio::spawn(async move {
                    let mut interval =
                        tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
                    loop {
                        interval.tick().await;
                        let _ = hb_health.heartbeat("ingest", "ok", None);
                    }
                });

                let run_result = tokio::select! {
                    r = listener.run(events_tx.clone()) => r,
                    _ = shutdown.changed() => {
                        hb.abort();
                        listener.disconnect().await;
                        break;
                    }
                };
                hb.abort();

                let reason = match run_result {
                    Ok(()) => "listener returned".to_string(),
                    Err(e) => e.to_string(),
                };
                error!(account = %label, %reason, "ingest disconnected");
                let _ = health.heartbeat("ingest", "error", Some(&reason));
            }
            Err(e) => {
                error!(account = %label, error = %e, "ingest connect failed");
                let _ = health.heartbeat("ingest", "error", Some(&e.to_string()));
            }
        }

        // One notice per outage; further crashes stay silent until recovery.
        if !was_down {
            was_down = true;
            notify
                .send_text(
                    "⚠️ Мониторинг чатов отключился\nПереподключаюсь с нарастающей паузой.",
                )
                .await;
        }

        info!(account = %label, backoff_secs, "ingest reconnect scheduled");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
            _ = shutdown.changed() => break,
        }
        backoff_secs = next_backoff(backoff_secs);
    }

    info!(account = %label, "ingest supervisor stopped");
}

/// Plain periodic heartbeat for modules without their own loop.
pub async fn heartbeat_loop(
    health: HealthStore,
    module: &'static str,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = health.heartbeat(module, "ok", None) {
                    warn!(module, error = %e, "heartbeat write failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjutant_ingest::IngestError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_sequence_doubles_to_cap() {
        // 30, 60, 120, 240, 300, 300 …
        let mut seq = vec![LISTENER_BACKOFF_START_SECS];
        for _ in 0..5 {
            seq.push(next_backoff(*seq.last().unwrap()));
        }
        assert_eq!(seq, vec![30, 60, 120, 240, 300, 300]);
    }

    /// Fails to connect `failures` times, then connects and pumps forever.
    struct FlakyListener {
        attempts: AtomicU32,
        failures: u32,
    }

    #[async_trait]
    impl AccountListener for FlakyListener {
        fn label(&self) -> &str {
            "test"
        }

        async fn start(&self) -> Result<(), IngestError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(IngestError::Disconnected("boom".into()))
            } else {
                Ok(())
            }
        }

        async fn run(
            &self,
            _events: mpsc::Sender<ChatEvent>,
        ) -> Result<(), IngestError> {
            // Stay "connected" until aborted by shutdown.
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_offline_notice_then_restored_on_reconnect() {
        let store = adjutant_store::Store::open_in_memory().unwrap();
        let (notify, mut notify_rx) = NotifySender::channel(16);
        let (events_tx, _events_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let listener = Arc::new(FlakyListener {
            attempts: AtomicU32::new(0),
            failures: 3,
        });

        let task = tokio::spawn(run_resilient_listener(
            listener.clone(),
            events_tx,
            store.health(),
            notify,
            shutdown_rx,
        ));

        // Let the paused clock run through the backoff cycle (30+60+120 s).
        tokio::time::sleep(Duration::from_secs(400)).await;

        let mut texts = Vec::new();
        while let Ok(note) = notify_rx.try_recv() {
            texts.push(note.text);
        }
        let offline = texts.iter().filter(|t| t.contains("отключился")).count();
        let restored = texts.iter().filter(|t| t.contains("восстановлен")).count();
        assert_eq!(offline, 1, "exactly one offline notice per outage");
        assert_eq!(restored, 1, "exactly one restored notice");
        assert!(listener.attempts.load(Ordering::SeqCst) >= 4);

        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
    }
}
