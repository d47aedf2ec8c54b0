//! Session Management
//!
//! Each session owns one `CampusPipeline` (and with it the conversation).
//! Turns on the same session are serialised by the pipeline mutex; sessions
//! idle longer than the TTL are removed by a background sweep.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};

use campus_guide_agent::CampusPipeline;
use campus_guide_config::SessionConfig;

use crate::metrics::set_active_sessions;
use crate::ServerError;

/// A chat session
pub struct Session {
    pub id: String,
    pub pipeline: Mutex<CampusPipeline>,
    pub created_at: Instant,
    last_activity: RwLock<Instant>,
}

impl Session {
    fn new(id: String, pipeline: CampusPipeline) -> Self {
        let now = Instant::now();
        Self {
            id,
            pipeline: Mutex::new(pipeline),
            created_at: now,
            last_activity: RwLock::new(now),
        }
    }

    /// Update last activity
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.idle_for() > ttl
    }
}

/// Session registry
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    ttl: Duration,
    sweep_interval: Duration,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_limits(
            config.max_sessions,
            Duration::from_secs(config.ttl_secs),
            Duration::from_secs(config.sweep_interval_secs),
        )
    }

    pub fn with_limits(max_sessions: usize, ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            ttl,
            sweep_interval,
        }
    }

    /// Register a pipeline under a fresh session id
    ///
    /// At capacity, expired sessions are dropped first; if that frees
    /// nothing the call fails with [`ServerError::Capacity`].
    pub fn insert(&self, pipeline: CampusPipeline) -> Result<Arc<Session>, ServerError> {
        let mut sessions = self.sessions.write();

        if sessions.len() >= self.max_sessions {
            self.expire_locked(&mut sessions);
            if sessions.len() >= self.max_sessions {
                tracing::warn!(max_sessions = self.max_sessions, "Session limit reached");
                return Err(ServerError::Capacity);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), pipeline));
        sessions.insert(id.clone(), Arc::clone(&session));
        set_active_sessions(sessions.len());

        tracing::info!(session_id = %id, active = sessions.len(), "Created session");
        Ok(session)
    }

    /// Look up a session and mark it as used
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.read().get(id).cloned()?;
        session.touch();
        Some(session)
    }

    /// Remove a session, returning whether it existed
    pub fn remove(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(id).is_some();
        if removed {
            set_active_sessions(sessions.len());
            tracing::info!(session_id = %id, "Ended session");
        }
        removed
    }

    /// Drop sessions idle longer than the TTL, returning how many went
    pub fn expire(&self) -> usize {
        let mut sessions = self.sessions.write();
        self.expire_locked(&mut sessions)
    }

    fn expire_locked(&self, sessions: &mut HashMap<String, Arc<Session>>) -> usize {
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(self.ttl))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(session) = sessions.remove(id) {
                tracing::info!(
                    session_id = %id,
                    idle_secs = session.idle_for().as_secs(),
                    "Session expired"
                );
            }
        }
        if !expired.is_empty() {
            set_active_sessions(sessions.len());
        }
        expired.len()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.max_sessions
    }

    /// Start the periodic expiry sweep.
    ///
    /// Sending `true` on the returned channel stops the task.
    pub fn start_sweep_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let period = manager.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = manager.expire();
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = manager.count(),
                                "Session sweep complete"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Session sweep task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
