//! Health, terminal feed and safety score shown alongside the chat.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveTime, Utc};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use bento_types::events::FeedEvent;

use crate::api::{HttpShieldApi, ShieldApi};
use crate::error::ClientError;

pub const TERMINAL_CAPACITY: usize = 100;
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const SAFETY_SCORE_RANGE: &str = "24h";

const BOOT_LINES: [&str; 2] = ["> SYSTEM_INIT_COMPLETE", "> CONNECTED_TO_BENTO_SHIELD_V1"];

/// Ring of the most recent terminal lines, oldest first.
#[derive(Debug, Clone)]
pub struct TerminalLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl TerminalLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for TerminalLog {
    fn default() -> Self {
        let mut log = Self::new(TERMINAL_CAPACITY);
        for line in BOOT_LINES {
            log.push(line.to_string());
        }
        log
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Error,
}

impl HealthStatus {
    pub fn from_server(status: &str) -> Self {
        match status {
            "healthy" => Self::Healthy,
            "degraded" => Self::Degraded,
            _ => Self::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthData {
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub db: String,
    pub last_checked: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SystemMonitor {
    pub log: TerminalLog,
    pub health: Option<HealthData>,
    safety_score: i32,
}

impl SystemMonitor {
    pub fn new() -> Self {
        Self {
            log: TerminalLog::default(),
            health: None,
            safety_score: 100,
        }
    }

    /// Append a line stamped with the local wall clock.
    pub fn add_log(&mut self, line: &str) {
        self.add_log_at(Local::now().time(), line);
    }

    pub fn add_log_at(&mut self, at: NaiveTime, line: &str) {
        self.log.push(format!("[{}] {}", at.format("%H:%M:%S"), line));
    }

    pub fn safety_score(&self) -> i32 {
        self.safety_score
    }

    pub fn set_safety_score(&mut self, score: i32) {
        self.safety_score = score.clamp(0, 100);
    }

    pub fn update_safety_score(&mut self, delta: i32) {
        self.set_safety_score(self.safety_score.saturating_add(delta));
    }

    /// Ledger line for an audit row pushed over the realtime feed.
    pub fn record_feed_event(&mut self, event: &FeedEvent) {
        let FeedEvent::AuditLogInsert {
            id,
            verdict,
            source,
            created_at,
        } = event
        else {
            return;
        };
        let short: String = id.to_string().chars().take(8).collect();
        let at = created_at.with_timezone(&Local).time();
        self.add_log_at(at, &format!("LEDGER: [{}] ({}) #{}", verdict, source, short));
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// `SystemMonitor` shared between the chat session, the policy store and
/// background tasks.
#[derive(Debug, Clone, Default)]
pub struct SharedMonitor(Arc<Mutex<SystemMonitor>>);

impl SharedMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SystemMonitor) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn add_log(&self, line: &str) {
        self.with(|m| m.add_log(line));
    }

    pub fn update_safety_score(&self, delta: i32) {
        self.with(|m| m.update_safety_score(delta));
    }

    pub fn safety_score(&self) -> i32 {
        self.with(|m| m.safety_score())
    }

    pub fn health(&self) -> Option<HealthData> {
        self.with(|m| m.health.clone())
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.with(|m| m.log.lines().map(str::to_string).collect())
    }
}

/// Query `/health` once and store the result. An unreachable server is
/// recorded as `Error` rather than returned.
pub async fn refresh_health<A: ShieldApi + ?Sized>(api: &A, monitor: &SharedMonitor) -> HealthData {
    let started = Instant::now();
    let result = api.health().await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let data = match result {
        Ok(resp) => HealthData {
            status: HealthStatus::from_server(&resp.status),
            latency_ms,
            db: resp.checks.database.status,
            last_checked: Utc::now(),
        },
        Err(e) => {
            debug!("Health check failed: {}", e);
            HealthData {
                status: HealthStatus::Error,
                latency_ms,
                db: "unknown".to_string(),
                last_checked: Utc::now(),
            }
        }
    };

    monitor.with(|m| m.health = Some(data.clone()));
    data
}

/// Seed the safety score from the analytics endpoint.
pub async fn fetch_safety_score<A: ShieldApi + ?Sized>(
    api: &A,
    monitor: &SharedMonitor,
) -> Result<i32, ClientError> {
    let analytics = api.analytics(SAFETY_SCORE_RANGE).await?;
    let score = i32::try_from(analytics.safety_score).unwrap_or(100);
    monitor.with(|m| m.set_safety_score(score));
    Ok(monitor.safety_score())
}

pub fn spawn_health_poller<A>(api: Arc<A>, monitor: SharedMonitor, every: Duration) -> JoinHandle<()>
where
    A: ShieldApi + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            refresh_health(api.as_ref(), &monitor).await;
        }
    })
}

/// Follow the realtime audit feed until the server closes it, writing one
/// ledger line per inserted audit row.
pub async fn follow_feed(api: &HttpShieldApi, monitor: &SharedMonitor) -> Result<(), ClientError> {
    let mut socket = api.connect_feed().await?;

    while let Some(frame) = socket.next().await {
        match frame? {
            WsMessage::Text(text) => match serde_json::from_str::<FeedEvent>(text.as_str()) {
                Ok(event) => monitor.with(|m| m.record_feed_event(&event)),
                Err(e) => warn!("Unreadable feed event: {}", e),
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
    debug!("Realtime feed closed");
    Ok(())
}
