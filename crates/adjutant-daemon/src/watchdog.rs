//! Heartbeat watchdog: escalates silent modules to the owner, with a known
//! error → operator instruction table.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use adjutant_core::config::{HEARTBEAT_INTERVAL_SECS, MAX_MISSED_HEARTBEATS};
use adjutant_core::notify::NotifySender;
use adjutant_store::health::HealthStore;
use adjutant_store::types::HealthRow;

/// Modules expected to heartbeat.
const MONITORED_MODULES: &[&str] = &["ingest", "bot", "scheduler", "classifier"];

/// Alerts per outage before going silent until recovery.
const MAX_ALERTS: u32 = 3;

/// Error substring → short operator instruction.
const ERROR_INSTRUCTIONS: &[(&str, &str)] = &[
    (
        "session expired",
        "Upstream-аккаунт требует переавторизации.\n\
         ЧТО ДЕЛАТЬ:\n\
         1. ssh на сервер\n\
         2. adjutant-reauth и введи код из приложения\n\
         3. Listener перезапустится сам.",
    ),
    (
        "unauthorized",
        "Авторизация отклонена. Проверь api_id/api_hash/токены в adjutant.toml\n\
         и перезапусти: systemctl restart adjutant.",
    ),
    (
        "connection refused",
        "База данных или сеть не принимает подключения.\n\
         Проверь диск и сеть; модули переподключатся сами через 30 сек.",
    ),
    (
        "rate limit",
        "API вернул лимит запросов. Подожди 60 секунд — автоповтор сработает.\n\
         Если повторяется, проверь тариф через /mode.",
    ),
    (
        "timed out",
        "LLM не ответил вовремя.\n\
         1. Проверь режим: /mode\n\
         2. Переключи на другой бэкенд: «переключи на API» или «переключи на CLI»",
    ),
    (
        "disk",
        "Похоже, закончилось место на диске. Освободи место и перезапусти процесс.",
    ),
];

/// Look up the instruction for an error string.
pub fn find_instruction(error_text: &str) -> &'static str {
    let lowered = error_text.to_lowercase();
    for (needle, instruction) in ERROR_INSTRUCTIONS {
        if lowered.contains(needle) {
            return instruction;
        }
    }
    "Инструкции для этой ошибки нет. Проверь журнал: journalctl -u adjutant -n 100."
}

/// A module is down once its heartbeat is this old.
fn down_threshold() -> chrono::Duration {
    chrono::Duration::seconds((MAX_MISSED_HEARTBEATS as u64 * HEARTBEAT_INTERVAL_SECS) as i64)
}

/// State transition produced by one scan.
#[derive(Debug, PartialEq, Eq)]
pub enum WatchdogEvent {
    Down {
        module: String,
        minutes_silent: i64,
        error: Option<String>,
    },
    Recovered {
        module: String,
    },
}

pub struct Watchdog {
    health: HealthStore,
    notify: NotifySender,
    alert_counts: HashMap<String, u32>,
    known_down: HashSet<String>,
}

impl Watchdog {
    pub fn new(health: HealthStore, notify: NotifySender) -> Self {
        Self {
            health,
            notify,
            alert_counts: HashMap::new(),
            known_down: HashSet::new(),
        }
    }

    /// Scan every heartbeat interval until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("watchdog started");
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.scan(Utc::now()).await {
                        error!(error = %e, "watchdog scan failed");
                    }
                    let _ = self.health.heartbeat("watchdog", "ok", None);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("watchdog stopped");
    }

    async fn scan(&mut self, now: DateTime<Utc>) -> adjutant_core::Result<()> {
        let rows = self.health.all()?;
        for event in self.evaluate(&rows, now) {
            match event {
                WatchdogEvent::Down {
                    module,
                    minutes_silent,
                    error,
                } => {
                    let count = self.alert_counts.entry(module.clone()).or_insert(0);
                    if *count >= MAX_ALERTS {
                        continue; // silent until recovery
                    }
                    *count += 1;
                    let error_text = error.unwrap_or_else(|| "нет heartbeat".to_string());
                    let instruction = find_instruction(&error_text);
                    warn!(module = %module, minutes_silent, "module down");
                    self.notify
                        .send_text(format!(
                            "🚨 ПРОБЛЕМА: модуль {module} не отвечает ({minutes_silent} мин).\n\
                             Ошибка: «{error_text}»\n\n{instruction}\n\n\
                             Уведомление {count}/{MAX_ALERTS} (дальше молчу до восстановления).",
                            count = *count,
                        ))
                        .await;
                }
                WatchdogEvent::Recovered { module } => {
                    info!(module = %module, "module recovered");
                    self.alert_counts.remove(&module);
                    self.notify
                        .send_text(format!("✅ Модуль {module} восстановился."))
                        .await;
                }
            }
        }
        Ok(())
    }

    /// Pure transition logic: compares heartbeat ages against the 3× rule and
    /// tracks down/up edges. Exposed for tests.
    pub fn evaluate(&mut self, rows: &[HealthRow], now: DateTime<Utc>) -> Vec<WatchdogEvent> {
        let mut events = Vec::new();
        let threshold = down_threshold();

        for &module in MONITORED_MODULES {
            // A module that never heartbeat yet is still booting; skip it.
            let Some(row) = rows.iter().find(|r| r.module == module) else {
                continue;
            };
            let silent_for = now - row.timestamp;

            if silent_for >= threshold {
                self.known_down.insert(module.to_string());
                events.push(WatchdogEvent::Down {
                    module: module.to_string(),
                    minutes_silent: silent_for.num_minutes(),
                    error: row.error.clone(),
                });
            } else if self.known_down.remove(module) {
                events.push(WatchdogEvent::Recovered {
                    module: module.to_string(),
                });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(module: &str, age_secs: i64, error: Option<&str>) -> HealthRow {
        HealthRow {
            module: module.to_string(),
            status: if error.is_some() { "error" } else { "ok" }.to_string(),
            error: error.map(String::from),
            timestamp: Utc::now() - chrono::Duration::seconds(age_secs),
        }
    }

    fn watchdog() -> Watchdog {
        let store = adjutant_store::Store::open_in_memory().unwrap();
        let (notify, _rx) = NotifySender::channel(8);
        Watchdog::new(store.health(), notify)
    }

    #[test]
    fn fresh_heartbeats_produce_no_events() {
        let mut dog = watchdog();
        let rows = vec![row("ingest", 60, None), row("scheduler", 10, None)];
        assert!(dog.evaluate(&rows, Utc::now()).is_empty());
    }

    #[test]
    fn three_missed_heartbeats_mark_down_then_recover() {
        let mut dog = watchdog();
        let now = Utc::now();

        // 3 × 300 s = 900 s. At 899 s the module is still alive.
        let rows = vec![row("ingest", 899, None)];
        assert!(dog.evaluate(&rows, now).is_empty());

        let rows = vec![row("ingest", 900, Some("session expired"))];
        let events = dog.evaluate(&rows, now);
        assert!(matches!(&events[0], WatchdogEvent::Down { module, .. } if module == "ingest"));

        let rows = vec![row("ingest", 5, None)];
        let events = dog.evaluate(&rows, now);
        assert_eq!(
            events,
            vec![WatchdogEvent::Recovered {
                module: "ingest".into()
            }]
        );
    }

    #[test]
    fn unknown_modules_are_ignored_until_first_heartbeat() {
        let mut dog = watchdog();
        // No rows at all - nothing to report, nothing to alert.
        assert!(dog.evaluate(&[], Utc::now()).is_empty());
    }

    #[test]
    fn instruction_lookup_matches_substrings() {
        assert!(find_instruction("Telegram: Session expired, please reauth").contains("adjutant-reauth"));
        assert!(find_instruction("connection refused (os error 111)").contains("переподключатся"));
        assert!(find_instruction("request timed out after 120s").contains("/mode"));
        assert!(find_instruction("что-то совсем новое").contains("journalctl"));
    }

    #[tokio::test]
    async fn alerts_stop_after_three_per_outage() {
        let store = adjutant_store::Store::open_in_memory().unwrap();
        let (notify, mut rx) = NotifySender::channel(32);
        let mut dog = Watchdog::new(store.health(), notify);

        // Keep the module down across five scans.
        store.health().heartbeat("ingest", "error", Some("boom")).unwrap();
        let stale = Utc::now() + chrono::Duration::seconds(10_000);
        for _ in 0..5 {
            dog.scan(stale).await.unwrap();
        }

        let mut alerts = 0;
        while let Ok(note) = rx.try_recv() {
            if note.text.contains("ПРОБЛЕМА") {
                alerts += 1;
            }
        }
        assert_eq!(alerts, 3);
    }
}
