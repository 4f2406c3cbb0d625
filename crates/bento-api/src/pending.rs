//! Interceptions awaiting a user decision.
//!
//! Entries live in memory only and are removed on first read, so the
//! original payload is never retained past the decision or the TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use bento_types::api::InterceptMetadata;
use bento_types::models::Hit;

use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct PendingInterception {
    pub original: Value,
    pub redacted: Value,
    pub hits: Vec<Hit>,
    pub policy_prompt: Option<String>,
    pub request_id: String,
    pub source: String,
    pub metadata: Option<InterceptMetadata>,
}

struct Entry {
    item: PendingInterception,
    expires_at: Instant,
}

pub struct PendingStore {
    entries: RwLock<HashMap<Uuid, Entry>>,
    ttl: Duration,
}

impl PendingStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn insert(&self, item: PendingInterception) -> Uuid {
        let id = Uuid::new_v4();
        let entry = Entry {
            item,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(id, entry);
        id
    }

    /// Remove and return an entry. Expired entries are dropped and
    /// reported as missing.
    pub async fn take(&self, id: &Uuid) -> Option<PendingInterception> {
        let entry = self.entries.write().await.remove(id)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.item)
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        self.entries.write().await.remove(id).is_some()
    }

    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Drop expired interceptions and closed rate-limit windows on a fixed
/// interval. Runs until the task is aborted.
pub async fn run_sweeper(state: AppState, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;

    loop {
        interval.tick().await;
        let swept = state.pending.sweep_expired().await;
        if swept > 0 {
            info!("Swept {} expired pending interception(s)", swept);
        }
        state.limiter.sweep().await;
        let remaining = state.pending.len().await;
        if remaining > 1000 {
            warn!("{} interceptions still awaiting a decision", remaining);
        }
    }
}
