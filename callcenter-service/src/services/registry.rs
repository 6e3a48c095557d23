//! In-memory session registry.
//!
//! Sessions live in a `DashMap` of reference-counted slots. A slot carries
//! two locks: an async lock around the agent conversation, held for the
//! whole of one exchange so turns on a session are serialized, and a short
//! synchronous lock around the transcript and activity time. Map shards are
//! never held across an await or while taking an async lock.

use crate::models::{
    RegistryStats, Selector, SessionSnapshot, SessionSummary, Tier, TranscriptEntry,
};
use crate::services::catalog::AgentCatalog;
use crate::services::clock::Clock;
use crate::services::metrics;
use crate::services::providers::{AgentSetup, Conversation, ConversationAgent, ProviderError};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Session not found")]
    NotFound,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Conversational agent unavailable: {0}")]
    ExternalUnavailable(#[source] ProviderError),

    #[error("Conversational agent rate limited")]
    RateLimited,

    #[error("Maximum of {max} concurrent sessions reached")]
    CapacityExceeded { active: usize, max: usize },
}

impl From<ProviderError> for RegistryError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited => RegistryError::RateLimited,
            other => RegistryError::ExternalUnavailable(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Sessions idle for longer than this are removed by [`SessionRegistry::sweep`].
    pub inactivity_timeout: Duration,
    /// Live-session ceiling enforced when a premium session is created.
    pub premium_capacity: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::seconds(3600),
            premium_capacity: 20,
        }
    }
}

/// Result of [`SessionRegistry::create`].
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session_id: String,
    pub selector: Selector,
    pub agent_name: String,
    pub greeting: String,
    pub created_at: DateTime<Utc>,
    /// Live sessions right after this one was added.
    pub active_sessions: usize,
}

/// Result of [`SessionRegistry::send`].
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub session_id: String,
    pub selector: Selector,
    pub agent_name: String,
    pub reply: String,
    pub timestamp: DateTime<Utc>,
}

struct SessionState {
    transcript: Vec<TranscriptEntry>,
    last_activity_at: DateTime<Utc>,
    /// Set when the session leaves the map; a waiting sender must not
    /// resurrect it.
    closed: bool,
}

impl SessionState {
    /// Move the activity time forward, strictly, even if the clock has not.
    fn touch(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.last_activity_at = if now > self.last_activity_at {
            now
        } else {
            self.last_activity_at + Duration::microseconds(1)
        };
        self.last_activity_at
    }
}

struct SessionSlot {
    selector: Selector,
    agent_name: String,
    setup: AgentSetup,
    created_at: DateTime<Utc>,
    /// Opened on the first user turn.
    conversation: tokio::sync::Mutex<Option<Box<dyn Conversation>>>,
    state: Mutex<SessionState>,
}

impl SessionSlot {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionSlot>>,
    catalog: Arc<AgentCatalog>,
    agent: Arc<dyn ConversationAgent>,
    clock: Arc<dyn Clock>,
    settings: RegistrySettings,
    /// Serializes capacity check and insert.
    admission: Mutex<()>,
}

impl SessionRegistry {
    pub fn new(
        catalog: Arc<AgentCatalog>,
        agent: Arc<dyn ConversationAgent>,
        clock: Arc<dyn Clock>,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            catalog,
            agent,
            clock,
            settings,
            admission: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Start a session with a persona and greeting drawn from the catalog
    /// entry for `selector`, or from the tier's fallback entry.
    pub fn create(&self, selector: Selector) -> Result<CreatedSession, RegistryError> {
        let (resolved, profile) = self.catalog.resolve(selector).ok_or_else(|| {
            RegistryError::InvalidInput(format!("No agents configured for tier {}", selector.tier))
        })?;

        let (agent_name, greeting) = {
            let mut rng = rand::thread_rng();
            let name = profile.pick_agent_name(&mut rng).to_string();
            let greeting = profile.pick_greeting(&name, &mut rng);
            (name, greeting)
        };
        let setup = self.catalog.setup_for(profile, &agent_name);

        let _admission = self
            .admission
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if resolved.tier == Tier::Premium {
            let active = self.sessions.len();
            if active >= self.settings.premium_capacity {
                tracing::warn!(
                    active,
                    max = self.settings.premium_capacity,
                    "Premium session capacity reached"
                );
                return Err(RegistryError::CapacityExceeded {
                    active,
                    max: self.settings.premium_capacity,
                });
            }
        }

        let session_id = Uuid::new_v4().to_string();
        let now = self.clock.now();
        let slot = SessionSlot {
            selector: resolved,
            agent_name: agent_name.clone(),
            setup,
            created_at: now,
            conversation: tokio::sync::Mutex::new(None),
            state: Mutex::new(SessionState {
                transcript: vec![TranscriptEntry::assistant(greeting.clone(), now)],
                last_activity_at: now,
                closed: false,
            }),
        };
        self.sessions.insert(session_id.clone(), Arc::new(slot));
        let active_sessions = self.sessions.len();

        metrics::record_session_created(resolved.tier.as_str());
        metrics::set_active_sessions(active_sessions);
        tracing::info!(
            session_id = %session_id,
            selector = %resolved,
            agent = %agent_name,
            "Session created"
        );

        Ok(CreatedSession {
            session_id,
            selector: resolved,
            agent_name,
            greeting,
            created_at: now,
            active_sessions,
        })
    }

    fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, RegistryError> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(RegistryError::NotFound)
    }

    /// Send one user turn and return the agent's reply.
    ///
    /// The user entry is recorded before the agent is called and stays if the
    /// call fails; only a successful reply moves the activity time.
    pub async fn send(&self, session_id: &str, message: &str) -> Result<ChatReply, RegistryError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(RegistryError::InvalidInput("Message is required".to_string()));
        }

        let slot = self.slot(session_id)?;
        let mut guard = slot.conversation.lock().await;

        {
            let mut state = slot.state();
            if state.closed {
                return Err(RegistryError::NotFound);
            }
            // Never earlier than the last reply, which `touch` may have nudged
            // past the clock.
            let stamp = self.clock.now().max(state.last_activity_at);
            state.transcript.push(TranscriptEntry::user(message, stamp));
        }

        let conversation = guard.get_or_insert_with(|| self.agent.open(&slot.setup));

        let tier = slot.selector.tier.as_str();
        let started = Instant::now();
        let result = conversation.send(message).await;
        metrics::record_agent_latency(self.agent.provider(), started.elapsed().as_secs_f64());

        match result {
            Ok(reply) => {
                let timestamp = {
                    let mut state = slot.state();
                    if state.closed {
                        None
                    } else {
                        let timestamp = state.touch(self.clock.now());
                        state
                            .transcript
                            .push(TranscriptEntry::assistant(reply.clone(), timestamp));
                        Some(timestamp)
                    }
                };
                let Some(timestamp) = timestamp else {
                    metrics::record_chat_exchange(tier, "session_closed");
                    tracing::info!(
                        session_id = %session_id,
                        "Session ended while the agent was replying, reply dropped"
                    );
                    return Err(RegistryError::NotFound);
                };
                metrics::record_chat_exchange(tier, "ok");

                Ok(ChatReply {
                    session_id: session_id.to_string(),
                    selector: slot.selector,
                    agent_name: slot.agent_name.clone(),
                    reply,
                    timestamp,
                })
            }
            Err(e) => {
                metrics::record_chat_exchange(tier, e.kind());
                tracing::warn!(
                    session_id = %session_id,
                    provider = self.agent.provider(),
                    error = %e,
                    "Conversational agent call failed"
                );
                Err(e.into())
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Result<SessionSnapshot, RegistryError> {
        let slot = self.slot(session_id)?;
        let state = slot.state();
        if state.closed {
            return Err(RegistryError::NotFound);
        }

        Ok(SessionSnapshot {
            session_id: session_id.to_string(),
            selector: slot.selector,
            agent_name: slot.agent_name.clone(),
            transcript: state.transcript.clone(),
            created_at: slot.created_at,
            last_activity_at: state.last_activity_at,
        })
    }

    /// Selector and persona of a live session.
    pub fn selector(&self, session_id: &str) -> Result<(Selector, String), RegistryError> {
        let slot = self.slot(session_id)?;
        if slot.state().closed {
            return Err(RegistryError::NotFound);
        }
        Ok((slot.selector, slot.agent_name.clone()))
    }

    /// Remove a session. Returns false if it did not exist.
    pub fn delete(&self, session_id: &str) -> bool {
        let Some((_, slot)) = self.sessions.remove(session_id) else {
            return false;
        };
        slot.state().closed = true;

        metrics::record_sessions_closed("deleted", 1);
        metrics::set_active_sessions(self.sessions.len());
        tracing::info!(session_id = %session_id, "Session deleted");
        true
    }

    /// Summaries of all live sessions, oldest first. No transcript text.
    pub fn list(&self) -> Vec<SessionSummary> {
        let slots: Vec<(String, Arc<SessionSlot>)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut summaries: Vec<SessionSummary> = slots
            .into_iter()
            .filter_map(|(session_id, slot)| {
                let state = slot.state();
                if state.closed {
                    return None;
                }
                Some(SessionSummary {
                    session_id,
                    tier: slot.selector.tier,
                    language: slot.selector.language,
                    product_category: slot.selector.product,
                    agent_name: slot.agent_name.clone(),
                    message_count: state.transcript.len(),
                    created_at: slot.created_at,
                    last_activity: state.last_activity_at,
                })
            })
            .collect();

        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        summaries
    }

    /// Aggregate counters; "today" is the UTC day containing `now`.
    pub fn stats(&self, now: DateTime<Utc>) -> RegistryStats {
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or(now);

        let slots: Vec<Arc<SessionSlot>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut stats = RegistryStats {
            max_sessions: self.settings.premium_capacity,
            language_distribution: BTreeMap::new(),
            product_distribution: BTreeMap::new(),
            ..RegistryStats::default()
        };

        for slot in slots {
            let state = slot.state();
            if state.closed {
                continue;
            }
            stats.active_sessions += 1;
            stats.total_messages += state.transcript.len();
            stats.messages_today += state
                .transcript
                .iter()
                .filter(|entry| entry.timestamp >= day_start)
                .count();
            *stats
                .language_distribution
                .entry(slot.selector.language.to_string())
                .or_insert(0) += 1;
            *stats
                .product_distribution
                .entry(slot.selector.product.to_string())
                .or_insert(0) += 1;
        }

        stats
    }

    /// Remove sessions idle for longer than the inactivity timeout. A session
    /// with an exchange in flight is active and is skipped.
    pub fn sweep(&self) -> usize {
        let Some(cutoff) = self
            .clock
            .now()
            .checked_sub_signed(self.settings.inactivity_timeout)
        else {
            return 0;
        };
        let mut expired = 0;

        self.sessions.retain(|session_id, slot| {
            let Ok(_busy) = slot.conversation.try_lock() else {
                return true;
            };
            let mut state = slot.state();
            if state.last_activity_at < cutoff {
                state.closed = true;
                expired += 1;
                tracing::info!(session_id = %session_id, "Session expired after inactivity");
                false
            } else {
                true
            }
        });

        if expired > 0 {
            metrics::record_sessions_closed("expired", expired);
            metrics::set_active_sessions(self.sessions.len());
        }
        expired
    }
}
