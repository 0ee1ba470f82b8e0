//! Per-lookup caches: the whitelist/blacklist settings (60 s TTL) and chat
//! titles (5 min TTL). Single-writer, stale-tolerant up to the TTL.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use adjutant_core::config::{CHAT_NAME_CACHE_TTL_SECS, LIST_CACHE_TTL_SECS};
use adjutant_store::settings::SettingsStore;

use crate::listener::EntityResolver;

/// Cached view of one id-list setting.
pub struct TtlIdSet {
    key: &'static str,
    ttl: Duration,
    state: Mutex<Option<(Instant, HashSet<i64>)>>,
}

impl TtlIdSet {
    pub fn whitelist() -> Self {
        Self::new("whitelist")
    }

    pub fn blacklist() -> Self {
        Self::new("blacklist")
    }

    fn new(key: &'static str) -> Self {
        Self {
            key,
            ttl: Duration::from_secs(LIST_CACHE_TTL_SECS),
            state: Mutex::new(None),
        }
    }

    /// Current set, reloading from settings once the TTL lapses. A load
    /// failure keeps serving the stale view.
    pub fn get(&self, settings: &SettingsStore) -> HashSet<i64> {
        let mut guard = self.state.lock().unwrap();
        if let Some((loaded_at, set)) = guard.as_ref() {
            if loaded_at.elapsed() < self.ttl {
                return set.clone();
            }
        }
        let fresh: HashSet<i64> = match self.key {
            "whitelist" => settings.whitelist(),
            _ => settings.blacklist(),
        }
        .map(|ids| ids.into_iter().collect())
        .unwrap_or_else(|_| {
            guard
                .as_ref()
                .map(|(_, set)| set.clone())
                .unwrap_or_default()
        });
        *guard = Some((Instant::now(), fresh.clone()));
        fresh
    }

    /// Drop the cached view (used by tests and the /whitelist command path).
    pub fn invalidate(&self) {
        *self.state.lock().unwrap() = None;
    }
}

/// Chat-title cache over an [`EntityResolver`].
pub struct ChatNameCache {
    ttl: Duration,
    entries: Mutex<HashMap<i64, (Instant, String)>>,
}

impl Default for ChatNameCache {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(CHAT_NAME_CACHE_TTL_SECS),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl ChatNameCache {
    pub async fn resolve(&self, id: i64, resolver: &dyn EntityResolver) -> String {
        {
            let entries = self.entries.lock().unwrap();
            if let Some((cached_at, title)) = entries.get(&id) {
                if cached_at.elapsed() < self.ttl {
                    return title.clone();
                }
            }
        }
        let title = resolver
            .resolve_title(id)
            .await
            .unwrap_or_else(|| id.to_string());
        self.entries
            .lock()
            .unwrap()
            .insert(id, (Instant::now(), title.clone()));
        title
    }
}
