//! The chat session controller.
//!
//! [`ChatSessionController`] owns the transcript of the active session and keeps it consistent
//! with the server.  Every method takes `&self`; state lives behind a mutex that is never held
//! across a request, so operations may overlap.  Overlap is constrained three ways:
//!
//! - at most one chat request is outstanding at a time;
//! - mutations of one session are serialized by a per-session lock;
//! - session-list refreshes are sequenced and an older response never replaces a newer one.
//!
//! After every transition the controller hands a [`ChatView`] snapshot to its
//! [`RenderSurface`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use regex::Regex;

use crate::api::ChatApi;
use crate::error::{Error, Result};
use crate::health::{self, ConnectivityState, DEFAULT_HEALTH_INTERVAL, HealthProbe};
use crate::observability::{
    HISTORY_CACHE_FALLBACKS, SEND_ACCEPTED, SEND_DURATION, SEND_FAILED, SEND_REJECTED,
    SESSION_SWITCH_FAILURES, SESSION_SWITCHES, STALE_SESSION_LISTS,
};
use crate::render::{ChatView, Notification, RenderSurface};
use crate::store::LocalStore;
use crate::types::{
    AiStatus, ChatId, ChatRequest, Connectivity, HistoryEntry, Message, MessageId, Origin,
    PreferredService, SessionId, SessionInfo, UsageStats,
};

/// Name given to sessions created without one.
pub const DEFAULT_SESSION_NAME: &str = "New Chat";

/// Longest auto-generated session title, in characters, before the ellipsis.
pub const SESSION_TITLE_MAX_CHARS: usize = 40;

/// Text of the synthetic message appended when a chat request fails.
pub const SEND_ERROR_TEXT: &str =
    "Sorry, I encountered an error while processing your message. Please try again.";

/// Service tag carried by the synthetic error message.
pub const SEND_ERROR_SERVICE: &str = "error";

const WELCOME_TEXT: &str = "Welcome to your new chat session! I'm here to help you with any \
questions or tasks. Choose your preferred AI service with /service, or let me automatically \
select the best available option for you.";

static FENCED_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```[\s\S]*?```").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`[^`]*`").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Derive a session title from the first message of a session.
///
/// Fenced code blocks and inline code spans are dropped, whitespace runs collapse to a single
/// space, and the result is cut to [`SESSION_TITLE_MAX_CHARS`] characters with `…` appended when
/// anything was cut.  Returns `None` when nothing is left.
pub fn session_title_from_text(text: &str) -> Option<String> {
    let cleaned = FENCED_CODE.replace_all(text, "");
    let cleaned = INLINE_CODE.replace_all(&cleaned, "");
    let cleaned = WHITESPACE.replace_all(&cleaned, " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned.chars().count() > SESSION_TITLE_MAX_CHARS {
        let mut title: String = cleaned.chars().take(SESSION_TITLE_MAX_CHARS).collect();
        title.push('…');
        Some(title)
    } else {
        Some(cleaned.to_string())
    }
}

/// Why a send was not issued.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The text was empty after trimming.
    EmptyInput,
    /// Another chat request is still outstanding.
    SendPending,
    /// The active session changed and its transcript has not been reloaded yet.
    Resyncing,
}

/// The result of [`ChatSessionController::send_message`].
#[derive(Debug)]
pub enum SendOutcome {
    /// Nothing was appended and no request was made.
    Ignored(IgnoreReason),
    /// The server answered; a bot message was appended.
    Answered,
    /// The request failed; a synthetic error message was appended.
    Failed(Error),
}

impl SendOutcome {
    /// True if a request was issued.
    pub fn was_sent(&self) -> bool {
        !matches!(self, SendOutcome::Ignored(_))
    }
}

/// Where [`ChatSessionController::load_chat_history`] found the transcript.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HistorySource {
    /// Loaded from the server; authoritative.
    Server,
    /// Loaded from the local backup after a network failure; advisory.
    Cache,
    /// Loaded from the server, but the active session changed while the request was in flight,
    /// so the result was dropped.
    Superseded,
}

#[derive(Debug)]
struct State {
    transcript: Vec<Message>,
    welcome: Option<Message>,
    sessions: Vec<SessionInfo>,
    active_session: Option<SessionId>,
    // Set when the active session moved without the transcript following it.
    transcript_stale: bool,
    // Bumped every time the transcript is replaced wholesale.
    transcript_epoch: u64,
    switches_in_flight: usize,
    send_pending: bool,
    ai_status: AiStatus,
    stats: Option<UsageStats>,
    preferred_service: PreferredService,
    applied_list_seq: u64,
}

impl State {
    fn replace_transcript(&mut self, messages: Vec<Message>) {
        self.welcome = if messages.is_empty() {
            Some(welcome_message())
        } else {
            None
        };
        self.transcript = messages;
        self.transcript_epoch += 1;
    }
}

fn welcome_message() -> Message {
    Message::synthetic(WELCOME_TEXT, None)
}

// Runs `reset` against the state when dropped, so a cancelled operation cannot leave a flag set.
struct Reset<'a> {
    state: &'a Mutex<State>,
    reset: fn(&mut State),
}

impl Drop for Reset<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        (self.reset)(&mut state);
    }
}

/// Owner of the session/transcript state machine.
pub struct ChatSessionController<A: ChatApi> {
    api: Arc<A>,
    surface: Arc<dyn RenderSurface>,
    store: Option<LocalStore>,
    chat_id: ChatId,
    history_limit: Option<u32>,
    state: Mutex<State>,
    connectivity: Arc<ConnectivityState>,
    health: HealthProbe,
    list_seq: AtomicU64,
    session_locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<A: ChatApi + 'static> ChatSessionController<A> {
    /// Create a controller that talks to `api` and draws on `surface`.
    ///
    /// The controller starts with no active session, an empty transcript, a freshly generated
    /// [`ChatId`], and no local store.
    pub fn new(api: A, surface: Arc<dyn RenderSurface>) -> Self {
        Self {
            api: Arc::new(api),
            surface,
            store: None,
            chat_id: ChatId::generate(),
            history_limit: None,
            state: Mutex::new(State {
                transcript: Vec::new(),
                welcome: None,
                sessions: Vec::new(),
                active_session: None,
                transcript_stale: false,
                transcript_epoch: 0,
                switches_in_flight: 0,
                send_pending: false,
                ai_status: AiStatus::Ready,
                stats: None,
                preferred_service: PreferredService::Auto,
                applied_list_seq: 0,
            }),
            connectivity: Arc::new(ConnectivityState::new()),
            health: HealthProbe::new(DEFAULT_HEALTH_INTERVAL),
            list_seq: AtomicU64::new(0),
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Back up transcripts to `store` and fall back to it when the network is down.
    pub fn with_store(mut self, store: LocalStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Pin the id that keys the transcript backup.
    pub fn with_chat_id(mut self, chat_id: ChatId) -> Self {
        self.chat_id = chat_id;
        self
    }

    /// Ask the server for at most `limit` history entries.
    pub fn with_history_limit(mut self, limit: Option<u32>) -> Self {
        self.history_limit = limit;
        self
    }

    /// Set the service selector sent with every chat request.
    pub fn with_preferred_service(self, service: PreferredService) -> Self {
        self.lock().preferred_service = service;
        self
    }

    /// Set the spacing of the background health probe.
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health = HealthProbe::new(interval);
        self
    }

    /// The id keying the transcript backup.
    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    /// The remote API.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// The current service selector.
    pub fn preferred_service(&self) -> PreferredService {
        self.lock().preferred_service.clone()
    }

    /// Change the service selector used by subsequent sends.
    pub fn set_preferred_service(&self, service: PreferredService) {
        self.lock().preferred_service = service;
    }

    /// The active session, if known.
    pub fn active_session(&self) -> Option<SessionId> {
        self.lock().active_session
    }

    /// Last known reachability.
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity.get()
    }

    /// Snapshot of everything a surface draws.
    pub fn view(&self) -> ChatView {
        let state = self.lock();
        ChatView {
            welcome: state.welcome.clone(),
            transcript: state.transcript.clone(),
            sessions: state.sessions.clone(),
            active_session: state.active_session,
            connectivity: self.connectivity.get(),
            ai_status: state.ai_status,
            stats: state.stats,
            send_pending: state.send_pending,
        }
    }

    /// Load sessions, the current transcript, and usage stats.
    ///
    /// Each step logs and tolerates its own failure.  The welcome message is shown when no
    /// transcript could be loaded.
    pub async fn initialize(&self) {
        if let Err(err) = self.refresh_sessions().await {
            tracing::warn!(error = %err, "failed to load sessions");
        }
        if let Err(err) = self.load_chat_history().await {
            tracing::warn!(error = %err, "failed to load chat history");
        }
        if let Err(err) = self.load_stats().await {
            tracing::warn!(error = %err, "failed to load stats");
        }
        {
            let mut state = self.lock();
            if state.transcript.is_empty() && state.welcome.is_none() {
                state.welcome = Some(welcome_message());
            }
        }
        self.render();
    }

    /// Send `text` as a chat message.
    ///
    /// The user message is appended before the request is issued; exactly one bot or error
    /// message follows it.  The first message of an empty, known session also renames the
    /// session after its content, concurrently with the chat request.
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored(IgnoreReason::EmptyInput);
        }

        let (user_id, epoch, rename, request) = {
            let mut state = self.lock();
            if state.send_pending {
                SEND_REJECTED.click();
                tracing::debug!("send rejected: a send is already pending");
                return SendOutcome::Ignored(IgnoreReason::SendPending);
            }
            if state.transcript_stale || state.switches_in_flight > 0 {
                SEND_REJECTED.click();
                tracing::debug!("send rejected: transcript is resynchronizing");
                return SendOutcome::Ignored(IgnoreReason::Resyncing);
            }
            let rename = if state.transcript.is_empty() {
                state
                    .active_session
                    .and_then(|id| session_title_from_text(text).map(|title| (id, title)))
            } else {
                None
            };
            let message = Message::user(text);
            let user_id = message.id.clone();
            state.transcript.push(message);
            state.welcome = None;
            state.send_pending = true;
            state.ai_status = AiStatus::Thinking;
            let request = ChatRequest::new(text, state.preferred_service.clone());
            (user_id, state.transcript_epoch, rename, request)
        };
        let _pending = Reset {
            state: &self.state,
            reset: |state: &mut State| {
                if state.send_pending {
                    state.send_pending = false;
                    state.ai_status = AiStatus::Ready;
                }
            },
        };
        SEND_ACCEPTED.click();
        self.render();

        let start = Instant::now();
        let (result, ()) = futures::join!(self.api.chat(&request), self.auto_rename(rename));
        SEND_DURATION.add(start.elapsed().as_secs_f64());

        let outcome = {
            let mut state = self.lock();
            state.send_pending = false;
            let current = state.transcript_epoch == epoch;
            match result {
                Ok(reply) => {
                    state.ai_status = AiStatus::Ready;
                    if current {
                        confirm(&mut state.transcript, &user_id);
                        state
                            .transcript
                            .push(Message::bot(reply.response, reply.service));
                    }
                    SendOutcome::Answered
                }
                Err(err) => {
                    SEND_FAILED.click();
                    state.ai_status = AiStatus::Error;
                    if current {
                        state.transcript.push(Message::synthetic(
                            SEND_ERROR_TEXT,
                            Some(SEND_ERROR_SERVICE.to_string()),
                        ));
                    }
                    SendOutcome::Failed(err)
                }
            }
        };
        if let SendOutcome::Failed(err) = &outcome {
            tracing::error!(error = %err, "chat request failed");
            if self.connectivity.set(Connectivity::Offline) {
                self.surface.connectivity_changed(Connectivity::Offline);
            }
        }
        self.render();
        outcome
    }

    async fn auto_rename(&self, target: Option<(SessionId, String)>) {
        let Some((id, title)) = target else {
            return;
        };
        let lock = self.session_lock(id);
        let result = {
            let _guard = lock.lock().await;
            self.api.rename_session(id, &title).await
        };
        match result {
            Ok(()) => {
                tracing::debug!(session = %id, %title, "auto-renamed session");
                if let Err(err) = self.refresh_sessions().await {
                    tracing::warn!(error = %err, "failed to refresh sessions after auto-rename");
                }
            }
            Err(err) => {
                tracing::warn!(session = %id, error = %err, "auto-rename failed");
            }
        }
    }

    /// Make `id` the active session and load its transcript.
    ///
    /// The active session and the transcript change together, and only if both the switch and
    /// the history load succeed.  The session list is refreshed afterward.
    pub async fn switch_session(&self, id: SessionId) -> Result<()> {
        let lock = self.session_lock(id);
        let _guard = lock.lock().await;
        self.lock().switches_in_flight += 1;
        let _in_flight = Reset {
            state: &self.state,
            reset: |state: &mut State| state.switches_in_flight -= 1,
        };

        let loaded = match self.api.switch_session(id).await {
            Ok(()) => self.api.history(self.history_limit).await,
            Err(err) => Err(err),
        };
        let messages = match loaded {
            Ok(entries) => to_messages(entries),
            Err(err) => {
                SESSION_SWITCH_FAILURES.click();
                tracing::error!(session = %id, error = %err, "failed to switch session");
                self.surface
                    .notify(&Notification::error(format!("Failed to switch session: {err}")));
                return Err(err);
            }
        };

        SESSION_SWITCHES.click();
        tracing::info!(session = %id, messages = messages.len(), "switched session");
        self.backup(&messages);
        {
            let mut state = self.lock();
            state.active_session = Some(id);
            state.replace_transcript(messages);
            state.transcript_stale = false;
            // Refreshes issued before this point may carry the old active session.
            state.applied_list_seq = self.list_seq.fetch_add(1, Ordering::SeqCst) + 1;
        }
        self.render();
        if let Err(err) = self.refresh_sessions().await {
            tracing::warn!(error = %err, "failed to refresh sessions after switch");
        }
        Ok(())
    }

    /// Create a session and switch to it.
    ///
    /// A missing or blank name becomes [`DEFAULT_SESSION_NAME`].
    pub async fn create_new_session(&self, name: Option<&str>) -> Result<SessionId> {
        let name = name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_SESSION_NAME);
        let id = match self.api.create_session(name).await {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(error = %err, "failed to create session");
                self.surface
                    .notify(&Notification::error(format!("Failed to create new chat: {err}")));
                return Err(err);
            }
        };
        tracing::info!(session = %id, name, "created session");
        if let Err(err) = self.switch_session(id).await {
            // The session exists even though it is not active; list it.
            if let Err(err) = self.refresh_sessions().await {
                tracing::warn!(error = %err, "failed to refresh sessions after create");
            }
            return Err(err);
        }
        self.surface
            .notify(&Notification::success("New chat created!"));
        Ok(id)
    }

    /// Rename session `id`.  A blank name is ignored.
    pub async fn rename_session(&self, id: SessionId, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(());
        }
        let lock = self.session_lock(id);
        let result = {
            let _guard = lock.lock().await;
            self.api.rename_session(id, name).await
        };
        match &result {
            Ok(()) => {
                tracing::info!(session = %id, name, "renamed session");
                self.surface
                    .notify(&Notification::success("Session renamed successfully!"));
            }
            Err(err) => {
                tracing::error!(session = %id, error = %err, "failed to rename session");
                self.surface
                    .notify(&Notification::error(format!("Failed to rename session: {err}")));
            }
        }
        if let Err(err) = self.refresh_sessions().await {
            tracing::warn!(error = %err, "failed to refresh sessions after rename");
        }
        result
    }

    /// Delete session `id`.
    ///
    /// Deleting the active session clears the transcript at once and reloads it from whatever
    /// session the server makes active next.
    pub async fn delete_session(&self, id: SessionId) -> Result<()> {
        let lock = self.session_lock(id);
        let result = {
            let _guard = lock.lock().await;
            self.api.delete_session(id).await
        };
        let was_active = match &result {
            Ok(()) => {
                tracing::info!(session = %id, "deleted session");
                self.surface
                    .notify(&Notification::success("Session deleted successfully!"));
                self.forget_session_lock(id);
                let mut state = self.lock();
                let was_active = state.active_session == Some(id);
                if was_active {
                    state.active_session = None;
                    state.replace_transcript(Vec::new());
                    state.transcript_stale = true;
                }
                was_active
            }
            Err(err) => {
                tracing::error!(session = %id, error = %err, "failed to delete session");
                self.surface
                    .notify(&Notification::error(format!("Failed to delete session: {err}")));
                false
            }
        };
        if was_active {
            // The backup holds the deleted session; a cached reload must not resurrect it.
            self.backup(&[]);
            self.render();
        }
        if let Err(err) = self.refresh_sessions().await {
            tracing::warn!(error = %err, "failed to refresh sessions after delete");
        }
        if was_active && let Err(err) = self.load_chat_history().await {
            tracing::warn!(error = %err, "failed to reload history after deleting the active session");
        }
        result
    }

    /// Replace the transcript with the server's history for its current session.
    ///
    /// On a network failure the local backup is used instead, if there is one; a cached
    /// transcript does not clear a pending resynchronization.  On a server error the transcript
    /// is left untouched.
    pub async fn load_chat_history(&self) -> Result<HistorySource> {
        let expected = self.lock().active_session;
        match self.api.history(self.history_limit).await {
            Ok(entries) => {
                let messages = to_messages(entries);
                {
                    let mut state = self.lock();
                    if state.active_session != expected {
                        tracing::debug!("dropping history loaded for a session that is no longer active");
                        return Ok(HistorySource::Superseded);
                    }
                    state.replace_transcript(messages.clone());
                    state.transcript_stale = false;
                }
                tracing::debug!(messages = messages.len(), "loaded chat history");
                self.backup(&messages);
                self.render();
                Ok(HistorySource::Server)
            }
            Err(err) if err.is_network_failure() => {
                tracing::warn!(error = %err, "history unavailable; trying local backup");
                let Some(store) = &self.store else {
                    return Err(err);
                };
                match store.load_transcript(&self.chat_id) {
                    Ok(Some(messages)) => {
                        HISTORY_CACHE_FALLBACKS.click();
                        self.lock().replace_transcript(messages);
                        self.render();
                        Ok(HistorySource::Cache)
                    }
                    Ok(None) => Err(err),
                    Err(cache_err) => {
                        tracing::warn!(error = %cache_err, "failed to read local backup");
                        Err(err)
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to load chat history");
                Err(err)
            }
        }
    }

    /// Reload the session list and the server's notion of the active session.
    ///
    /// A response that was overtaken by a later refresh is discarded.  If the server reports a
    /// different active session than the controller holds, the transcript is marked stale and
    /// sends are refused until the history is reloaded.
    pub async fn refresh_sessions(&self) -> Result<()> {
        let seq = self.list_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.api.current_session().await;
        let sessions = self.api.list_sessions().await?;
        {
            let mut state = self.lock();
            if seq < state.applied_list_seq {
                STALE_SESSION_LISTS.click();
                tracing::debug!(seq, applied = state.applied_list_seq, "discarding stale session list");
                return Ok(());
            }
            state.applied_list_seq = seq;
            match current {
                Ok(current) if current != state.active_session => {
                    tracing::info!(
                        from = ?state.active_session,
                        to = ?current,
                        "server reports a different active session"
                    );
                    state.active_session = current;
                    state.transcript_stale = true;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read current session");
                }
            }
            state.sessions = sessions;
        }
        self.render();
        Ok(())
    }

    /// Fetch usage counters.
    pub async fn load_stats(&self) -> Result<UsageStats> {
        let stats = self.api.stats().await?;
        self.lock().stats = Some(stats);
        self.render();
        Ok(stats)
    }

    /// Probe the server once.
    pub async fn check_health(&self) -> Connectivity {
        let connectivity =
            health::probe(self.api.as_ref(), &self.connectivity, self.surface.as_ref()).await;
        self.render();
        connectivity
    }

    /// Start the periodic health probe, replacing one that is already running.
    pub fn start_health_check(&self) {
        self.health.start(
            Arc::clone(&self.api),
            Arc::clone(&self.connectivity),
            Arc::clone(&self.surface),
        );
    }

    /// Stop the periodic health probe.
    pub fn stop_health_check(&self) {
        self.health.stop();
    }

    /// True while the periodic health probe is running.
    pub fn health_check_running(&self) -> bool {
        self.health.is_running()
    }

    /// Write the current transcript to the local backup.
    pub fn persist_backup(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let transcript = self.lock().transcript.clone();
        store.save_transcript(&self.chat_id, &transcript)
    }

    fn backup(&self, messages: &[Message]) {
        if let Some(store) = &self.store
            && let Err(err) = store.save_transcript(&self.chat_id, messages)
        {
            tracing::warn!(error = %err, "failed to write transcript backup");
        }
    }

    fn render(&self) {
        let view = self.view();
        self.surface.render(&view);
    }

    fn session_lock(&self, id: SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .session_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(id).or_default())
    }

    fn forget_session_lock(&self, id: SessionId) {
        self.session_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // No operation leaves State half-updated across a panic.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn to_messages(entries: Vec<HistoryEntry>) -> Vec<Message> {
    entries.into_iter().map(HistoryEntry::into_message).collect()
}

fn confirm(transcript: &mut [Message], id: &MessageId) {
    if let Some(message) = transcript.iter_mut().rev().find(|m| &m.id == id) {
        message.origin = Origin::Confirmed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use tokio::sync::Notify;

    use crate::render::NotificationLevel;
    use crate::types::{ChatReply, Sender};

    struct FakeSession {
        name: String,
        history: Vec<HistoryEntry>,
    }

    #[derive(Default)]
    struct Backend {
        sessions: BTreeMap<u64, FakeSession>,
        current: Option<u64>,
        next_id: u64,
    }

    impl Backend {
        fn create(&mut self, name: &str) -> u64 {
            self.next_id += 1;
            self.sessions.insert(
                self.next_id,
                FakeSession {
                    name: name.to_string(),
                    history: Vec::new(),
                },
            );
            self.next_id
        }
    }

    /// In-memory stand-in for the chat server, one user, cookie state implied.
    #[derive(Default)]
    struct FakeServer {
        backend: Mutex<Backend>,
        network_down: AtomicBool,
        fail_chat: AtomicBool,
        fail_history: AtomicBool,
        unhealthy: AtomicBool,
        hold_chat: AtomicBool,
        chat_released: Notify,
        hold_next_list: AtomicBool,
        list_released: Notify,
        hold_next_history: AtomicBool,
        history_released: Notify,
        chat_calls: AtomicUsize,
        rename_calls: AtomicUsize,
        list_calls: AtomicUsize,
    }

    impl FakeServer {
        fn with_session(name: &str, history: Vec<HistoryEntry>) -> (Self, SessionId) {
            let server = Self::default();
            let id = {
                let mut backend = server.backend.lock().unwrap();
                let id = backend.create(name);
                backend.sessions.get_mut(&id).unwrap().history = history;
                backend.current = Some(id);
                id
            };
            (server, SessionId(id))
        }

        fn add_session(&self, name: &str, history: Vec<HistoryEntry>) -> SessionId {
            let mut backend = self.backend.lock().unwrap();
            let id = backend.create(name);
            backend.sessions.get_mut(&id).unwrap().history = history;
            SessionId(id)
        }

        fn session_name(&self, id: SessionId) -> Option<String> {
            let backend = self.backend.lock().unwrap();
            backend.sessions.get(&id.get()).map(|s| s.name.clone())
        }

        fn history_len(&self, id: SessionId) -> usize {
            let backend = self.backend.lock().unwrap();
            backend.sessions.get(&id.get()).map_or(0, |s| s.history.len())
        }

        fn set_current(&self, id: SessionId) {
            self.backend.lock().unwrap().current = Some(id.get());
        }

        fn check_network(&self) -> Result<()> {
            if self.network_down.load(Ordering::SeqCst) {
                Err(Error::connection("connection refused", None))
            } else {
                Ok(())
            }
        }

        fn snapshot_sessions(&self) -> Vec<SessionInfo> {
            let backend = self.backend.lock().unwrap();
            backend
                .sessions
                .iter()
                .rev()
                .map(|(id, session)| {
                    SessionInfo::new(SessionId(*id), session.name.clone())
                        .with_message_count(session.history.len() as u64)
                })
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl ChatApi for FakeServer {
        async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
            self.check_network()?;
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            if self.hold_chat.load(Ordering::SeqCst) {
                self.chat_released.notified().await;
            }
            if self.fail_chat.load(Ordering::SeqCst) {
                return Err(Error::internal_server("model exploded"));
            }
            let mut backend = self.backend.lock().unwrap();
            let current = match backend.current {
                Some(id) => id,
                None => {
                    let id = backend.create(DEFAULT_SESSION_NAME);
                    backend.current = Some(id);
                    id
                }
            };
            let answer = format!("echo: {}", request.message);
            let session = backend.sessions.get_mut(&current).unwrap();
            session
                .history
                .push(HistoryEntry::new("user", request.message.clone()));
            session
                .history
                .push(HistoryEntry::new("ai", answer.clone()).with_service("Backup AI"));
            Ok(ChatReply::new(answer, "Backup AI"))
        }

        async fn health(&self) -> Result<()> {
            self.check_network()?;
            if self.unhealthy.load(Ordering::SeqCst) {
                Err(Error::service_unavailable("unhealthy"))
            } else {
                Ok(())
            }
        }

        async fn history(&self, limit: Option<u32>) -> Result<Vec<HistoryEntry>> {
            self.check_network()?;
            if self.hold_next_history.swap(false, Ordering::SeqCst) {
                self.history_released.notified().await;
            }
            if self.fail_history.load(Ordering::SeqCst) {
                return Err(Error::internal_server("database locked"));
            }
            let backend = self.backend.lock().unwrap();
            let history = backend
                .current
                .and_then(|id| backend.sessions.get(&id))
                .map(|s| s.history.clone())
                .unwrap_or_default();
            Ok(match limit {
                Some(limit) => {
                    let skip = history.len().saturating_sub(limit as usize);
                    history.into_iter().skip(skip).collect()
                }
                None => history,
            })
        }

        async fn current_session(&self) -> Result<Option<SessionId>> {
            self.check_network()?;
            Ok(self.backend.lock().unwrap().current.map(SessionId))
        }

        async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
            self.check_network()?;
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let sessions = self.snapshot_sessions();
            if self.hold_next_list.swap(false, Ordering::SeqCst) {
                self.list_released.notified().await;
            }
            Ok(sessions)
        }

        async fn create_session(&self, name: &str) -> Result<SessionId> {
            self.check_network()?;
            Ok(SessionId(self.backend.lock().unwrap().create(name)))
        }

        async fn switch_session(&self, id: SessionId) -> Result<()> {
            self.check_network()?;
            let mut backend = self.backend.lock().unwrap();
            if !backend.sessions.contains_key(&id.get()) {
                return Err(Error::not_found("Session not found", Some(id.to_string())));
            }
            backend.current = Some(id.get());
            Ok(())
        }

        async fn rename_session(&self, id: SessionId, name: &str) -> Result<()> {
            self.check_network()?;
            self.rename_calls.fetch_add(1, Ordering::SeqCst);
            let mut backend = self.backend.lock().unwrap();
            match backend.sessions.get_mut(&id.get()) {
                Some(session) => {
                    session.name = name.to_string();
                    Ok(())
                }
                None => Err(Error::not_found("Session not found", Some(id.to_string()))),
            }
        }

        async fn delete_session(&self, id: SessionId) -> Result<()> {
            self.check_network()?;
            let mut backend = self.backend.lock().unwrap();
            if backend.sessions.remove(&id.get()).is_none() {
                return Err(Error::not_found("Session not found", Some(id.to_string())));
            }
            if backend.current == Some(id.get()) {
                let next = backend.create(DEFAULT_SESSION_NAME);
                backend.current = Some(next);
            }
            Ok(())
        }

        async fn stats(&self) -> Result<UsageStats> {
            self.check_network()?;
            let backend = self.backend.lock().unwrap();
            let messages = backend
                .sessions
                .values()
                .map(|s| s.history.len() as u64)
                .sum();
            Ok(UsageStats {
                users: 1,
                sessions: backend.sessions.len() as u64,
                messages,
                user_sessions: backend.sessions.len() as u64,
                user_messages: messages,
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        renders: AtomicUsize,
        notifications: Mutex<Vec<Notification>>,
    }

    impl Recorder {
        fn last_notification(&self) -> Option<Notification> {
            self.notifications.lock().unwrap().last().cloned()
        }
    }

    impl RenderSurface for Recorder {
        fn render(&self, _: &ChatView) {
            self.renders.fetch_add(1, Ordering::SeqCst);
        }

        fn notify(&self, notification: &Notification) {
            self.notifications.lock().unwrap().push(notification.clone());
        }
    }

    fn controller(server: FakeServer) -> (ChatSessionController<FakeServer>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let controller = ChatSessionController::new(server, recorder.clone());
        (controller, recorder)
    }

    async fn ready(server: FakeServer) -> (ChatSessionController<FakeServer>, Arc<Recorder>) {
        let (controller, recorder) = controller(server);
        controller.initialize().await;
        (controller, recorder)
    }

    #[test]
    fn title_keeps_short_text() {
        assert_eq!(
            session_title_from_text("  How do   I\nparse JSON?  ").as_deref(),
            Some("How do I parse JSON?")
        );
    }

    #[test]
    fn title_truncates_past_forty_chars() {
        let forty = "a".repeat(40);
        let forty_one = "a".repeat(41);
        assert_eq!(session_title_from_text(&forty), Some(forty.clone()));
        assert_eq!(
            session_title_from_text(&forty_one),
            Some(format!("{forty}…"))
        );
    }

    #[test]
    fn title_counts_characters_not_bytes() {
        let text = "é".repeat(41);
        let title = session_title_from_text(&text).unwrap();
        assert_eq!(title.chars().count(), 41);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn title_drops_code() {
        let text = "Fix this ```rust\nfn main() {}\n``` please and `x` too";
        assert_eq!(
            session_title_from_text(text).as_deref(),
            Some("Fix this please and too")
        );
        assert_eq!(session_title_from_text("```only code```"), None);
    }

    #[tokio::test]
    async fn send_appends_user_then_bot() {
        let (server, _) = FakeServer::with_session("Empty", vec![]);
        let (controller, recorder) = ready(server).await;

        let outcome = controller.send_message("  hello  ").await;
        assert!(matches!(outcome, SendOutcome::Answered));

        let view = controller.view();
        assert_eq!(view.transcript.len(), 2);
        assert_eq!(view.transcript[0].text, "hello");
        assert_eq!(view.transcript[0].sender, Sender::User);
        assert_eq!(view.transcript[0].origin, Origin::Confirmed);
        assert_eq!(view.transcript[1].text, "echo: hello");
        assert_eq!(view.transcript[1].ai_service.as_deref(), Some("Backup AI"));
        assert_eq!(view.ai_status, AiStatus::Ready);
        assert!(view.welcome.is_none());
        assert!(!view.send_pending);
        assert!(recorder.renders.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn failed_send_appends_error_and_goes_offline() {
        let (server, _) = FakeServer::with_session("Empty", vec![]);
        server.fail_chat.store(true, Ordering::SeqCst);
        let (controller, _) = ready(server).await;

        let outcome = controller.send_message("hello").await;
        assert!(matches!(outcome, SendOutcome::Failed(ref err) if err.is_server_error()));

        let view = controller.view();
        assert_eq!(view.transcript.len(), 2);
        assert!(view.transcript[0].is_local_echo());
        assert_eq!(view.transcript[1].text, SEND_ERROR_TEXT);
        assert_eq!(view.transcript[1].origin, Origin::Synthetic);
        assert_eq!(
            view.transcript[1].ai_service.as_deref(),
            Some(SEND_ERROR_SERVICE)
        );
        assert_eq!(view.ai_status, AiStatus::Error);
        assert_eq!(view.connectivity, Connectivity::Offline);
        assert_eq!(controller.api().chat_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_input_is_ignored() {
        let (server, _) = FakeServer::with_session("Empty", vec![]);
        let (controller, _) = ready(server).await;

        let outcome = controller.send_message(" \n\t ").await;
        assert!(matches!(
            outcome,
            SendOutcome::Ignored(IgnoreReason::EmptyInput)
        ));
        assert!(!outcome.was_sent());
        assert!(controller.view().transcript.is_empty());
        assert_eq!(controller.api().chat_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn send_while_pending_is_a_no_op() {
        let (server, _) = FakeServer::with_session("Empty", vec![]);
        server.hold_chat.store(true, Ordering::SeqCst);
        let (controller, _) = ready(server).await;

        let (first, (second, during)) = tokio::join!(controller.send_message("one"), async {
            while !controller.view().send_pending {
                tokio::task::yield_now().await;
            }
            let outcome = controller.send_message("two").await;
            let during = controller.view().transcript.len();
            controller.api().chat_released.notify_one();
            (outcome, during)
        });

        assert!(matches!(first, SendOutcome::Answered));
        assert!(matches!(
            second,
            SendOutcome::Ignored(IgnoreReason::SendPending)
        ));
        assert_eq!(during, 1);
        let view = controller.view();
        assert_eq!(view.transcript.len(), 2);
        assert_eq!(view.transcript[1].text, "echo: one");
        assert_eq!(controller.api().chat_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_message_renames_the_session() {
        let (server, id) = FakeServer::with_session(DEFAULT_SESSION_NAME, vec![]);
        let (controller, _) = ready(server).await;

        let text = "a".repeat(41);
        controller.send_message(&text).await;
        let expected = format!("{}…", "a".repeat(40));
        assert_eq!(controller.api().session_name(id), Some(expected.clone()));
        assert_eq!(
            controller.view().active_session_info().unwrap().name,
            expected
        );

        controller.send_message("second message").await;
        assert_eq!(controller.api().rename_calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.api().session_name(id), Some(expected));
    }

    #[tokio::test]
    async fn non_empty_session_is_not_renamed() {
        let history = vec![
            HistoryEntry::new("user", "earlier"),
            HistoryEntry::new("ai", "reply").with_service("Gemini"),
        ];
        let (server, id) = FakeServer::with_session("Kept", history);
        let (controller, _) = ready(server).await;

        controller.send_message("another").await;
        assert_eq!(controller.api().rename_calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.api().session_name(id).as_deref(), Some("Kept"));
    }

    #[tokio::test]
    async fn switch_commits_session_and_transcript() {
        let (server, first) = FakeServer::with_session("First", vec![]);
        let second = server.add_session(
            "Second",
            vec![
                HistoryEntry::new("user", "hi"),
                HistoryEntry::new("ai", "hello").with_service("DeepSeek"),
            ],
        );
        let (controller, _) = ready(server).await;
        assert_eq!(controller.active_session(), Some(first));

        controller.switch_session(second).await.unwrap();
        let view = controller.view();
        assert_eq!(view.active_session, Some(second));
        assert_eq!(view.transcript.len(), 2);
        assert_eq!(view.transcript[1].ai_service.as_deref(), Some("DeepSeek"));
        assert!(view.welcome.is_none());
        assert_eq!(view.sessions.len(), 2);

        assert!(matches!(
            controller.send_message("next").await,
            SendOutcome::Answered
        ));
    }

    #[tokio::test]
    async fn failed_switch_leaves_state_untouched() {
        let (server, first) = FakeServer::with_session(
            "First",
            vec![HistoryEntry::new("user", "keep me")],
        );
        let (controller, recorder) = ready(server).await;
        let before = controller.view().transcript;

        let err = controller.switch_session(SessionId(999)).await.unwrap_err();
        assert!(err.is_not_found());
        let view = controller.view();
        assert_eq!(view.active_session, Some(first));
        assert_eq!(view.transcript, before);
        let note = recorder.last_notification().unwrap();
        assert_eq!(note.level, NotificationLevel::Error);
    }

    #[tokio::test]
    async fn failed_history_reload_fails_the_switch() {
        let (server, first) = FakeServer::with_session("First", vec![]);
        let second = server.add_session("Second", vec![HistoryEntry::new("user", "x")]);
        let (controller, _) = ready(server).await;

        controller.api().fail_history.store(true, Ordering::SeqCst);
        assert!(controller.switch_session(second).await.is_err());
        assert_eq!(controller.active_session(), Some(first));
        assert!(controller.view().transcript.is_empty());
    }

    #[tokio::test]
    async fn create_switch_and_welcome_round_trip() {
        let (server, _) = FakeServer::with_session(
            "Old",
            vec![HistoryEntry::new("user", "old message")],
        );
        let (controller, recorder) = ready(server).await;

        let id = controller.create_new_session(Some("Foo")).await.unwrap();
        let listed = controller.api().list_sessions().await.unwrap();
        assert!(listed.iter().any(|s| s.id == id && s.name == "Foo"));

        let view = controller.view();
        assert_eq!(view.active_session, Some(id));
        assert!(view.transcript.is_empty());
        let welcome = view.welcome.clone().unwrap();
        assert_eq!(welcome.origin, Origin::Synthetic);
        assert_eq!(view.messages().count(), 1);
        assert_eq!(controller.api().history_len(id), 0);
        assert_eq!(
            recorder.last_notification().unwrap().level,
            NotificationLevel::Success
        );
    }

    #[tokio::test]
    async fn blank_session_name_gets_the_default() {
        let (server, _) = FakeServer::with_session("Old", vec![]);
        let (controller, _) = ready(server).await;

        let id = controller.create_new_session(Some("   ")).await.unwrap();
        assert_eq!(
            controller.api().session_name(id).as_deref(),
            Some(DEFAULT_SESSION_NAME)
        );
        let id = controller.create_new_session(None).await.unwrap();
        assert_eq!(
            controller.api().session_name(id).as_deref(),
            Some(DEFAULT_SESSION_NAME)
        );
    }

    #[tokio::test]
    async fn create_failure_does_not_switch() {
        let (server, first) = FakeServer::with_session("Old", vec![]);
        let (controller, recorder) = ready(server).await;

        controller.api().network_down.store(true, Ordering::SeqCst);
        assert!(controller.create_new_session(Some("Nope")).await.is_err());
        assert_eq!(controller.active_session(), Some(first));
        assert_eq!(
            recorder.last_notification().unwrap().level,
            NotificationLevel::Error
        );
    }

    #[tokio::test]
    async fn rename_refreshes_the_list_either_way() {
        let (server, id) = FakeServer::with_session("Old", vec![]);
        let (controller, recorder) = ready(server).await;

        let before = controller.api().list_calls.load(Ordering::SeqCst);
        controller.rename_session(id, "  New name ").await.unwrap();
        assert_eq!(controller.view().sessions[0].name, "New name");
        assert_eq!(controller.api().list_calls.load(Ordering::SeqCst), before + 1);

        assert!(controller.rename_session(SessionId(77), "x").await.is_err());
        assert_eq!(controller.api().list_calls.load(Ordering::SeqCst), before + 2);
        assert_eq!(
            recorder.last_notification().unwrap().level,
            NotificationLevel::Error
        );
    }

    #[tokio::test]
    async fn blank_rename_is_ignored() {
        let (server, id) = FakeServer::with_session("Old", vec![]);
        let (controller, _) = ready(server).await;

        controller.rename_session(id, "   ").await.unwrap();
        assert_eq!(controller.api().rename_calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.api().session_name(id).as_deref(), Some("Old"));
    }

    #[tokio::test]
    async fn deleting_the_active_session_reloads_the_transcript() {
        let (server, doomed) = FakeServer::with_session(
            "Doomed",
            vec![
                HistoryEntry::new("user", "secret"),
                HistoryEntry::new("ai", "noted"),
            ],
        );
        let (controller, _) = ready(server).await;
        assert_eq!(controller.view().transcript.len(), 2);

        controller.delete_session(doomed).await.unwrap();
        let view = controller.view();
        assert_ne!(view.active_session, Some(doomed));
        assert!(view.active_session.is_some());
        assert!(view.transcript.iter().all(|m| m.text != "secret"));
        assert!(view.sessions.iter().all(|s| s.id != doomed));
        assert!(matches!(
            controller.send_message("fresh start").await,
            SendOutcome::Answered
        ));
    }

    #[tokio::test]
    async fn deleting_the_active_session_offline_does_not_restore_it_from_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let chat_id = ChatId::new("chat_delete");
        let (server, doomed) = FakeServer::with_session(
            "Doomed",
            vec![
                HistoryEntry::new("user", "secret"),
                HistoryEntry::new("ai", "noted"),
            ],
        );
        let recorder = Arc::new(Recorder::default());
        let controller = ChatSessionController::new(server, recorder)
            .with_store(store.clone())
            .with_chat_id(chat_id.clone());
        controller.initialize().await;
        assert_eq!(store.load_transcript(&chat_id).unwrap().unwrap().len(), 2);

        // The delete and the list refresh get through; the history reload does not.
        controller.api().hold_next_list.store(true, Ordering::SeqCst);
        let (deleted, ()) = tokio::join!(controller.delete_session(doomed), async {
            while controller.api().hold_next_list.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
            controller.api().network_down.store(true, Ordering::SeqCst);
            controller.api().list_released.notify_one();
        });
        deleted.unwrap();

        let view = controller.view();
        assert_ne!(view.active_session, Some(doomed));
        assert!(view.transcript.iter().all(|m| m.text != "secret"));
        assert!(view.transcript.is_empty());
        assert!(store.load_transcript(&chat_id).unwrap().unwrap().is_empty());

        assert_eq!(
            controller.load_chat_history().await.unwrap(),
            HistorySource::Cache
        );
        assert!(controller.view().transcript.is_empty());
    }

    #[tokio::test]
    async fn deleting_another_session_keeps_the_transcript() {
        let (server, active) =
            FakeServer::with_session("Active", vec![HistoryEntry::new("user", "stay")]);
        let other = server.add_session("Other", vec![]);
        let (controller, _) = ready(server).await;

        controller.delete_session(other).await.unwrap();
        let view = controller.view();
        assert_eq!(view.active_session, Some(active));
        assert_eq!(view.transcript.len(), 1);
        assert_eq!(view.sessions.len(), 1);
    }

    #[tokio::test]
    async fn server_side_session_change_blocks_sends_until_reload() {
        let (server, _) = FakeServer::with_session("First", vec![]);
        let second = server.add_session("Second", vec![HistoryEntry::new("user", "there")]);
        let (controller, _) = ready(server).await;

        controller.api().set_current(second);
        controller.refresh_sessions().await.unwrap();
        assert_eq!(controller.active_session(), Some(second));
        assert!(matches!(
            controller.send_message("too soon").await,
            SendOutcome::Ignored(IgnoreReason::Resyncing)
        ));

        assert_eq!(
            controller.load_chat_history().await.unwrap(),
            HistorySource::Server
        );
        assert_eq!(controller.view().transcript.len(), 1);
        assert!(matches!(
            controller.send_message("now").await,
            SendOutcome::Answered
        ));
    }

    #[tokio::test]
    async fn history_for_a_replaced_session_is_dropped() {
        let (server, _) = FakeServer::with_session("First", vec![HistoryEntry::new("user", "one")]);
        let second = server.add_session("Second", vec![HistoryEntry::new("user", "two")]);
        let (controller, _) = ready(server).await;

        controller.api().hold_next_history.store(true, Ordering::SeqCst);
        let (loaded, ()) = tokio::join!(controller.load_chat_history(), async {
            while controller.api().hold_next_history.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
            controller.api().set_current(second);
            controller.refresh_sessions().await.unwrap();
            controller.api().history_released.notify_one();
        });

        assert_eq!(loaded.unwrap(), HistorySource::Superseded);
        let view = controller.view();
        assert_eq!(view.active_session, Some(second));
        let texts: Vec<&str> = view.transcript.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one"]);
        assert!(matches!(
            controller.send_message("which one?").await,
            SendOutcome::Ignored(IgnoreReason::Resyncing)
        ));
    }

    #[tokio::test]
    async fn late_reply_is_not_appended_to_a_replaced_transcript() {
        let (server, _) = FakeServer::with_session("First", vec![HistoryEntry::new("user", "one")]);
        let second = server.add_session("Second", vec![HistoryEntry::new("user", "two")]);
        server.hold_chat.store(true, Ordering::SeqCst);
        let (controller, _) = ready(server).await;

        let (sent, switched) = tokio::join!(controller.send_message("slow question"), async {
            while controller.api().chat_calls.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
            let switched = controller.switch_session(second).await;
            controller.api().chat_released.notify_one();
            switched
        });

        switched.unwrap();
        assert!(matches!(sent, SendOutcome::Answered));
        let view = controller.view();
        assert_eq!(view.active_session, Some(second));
        let texts: Vec<&str> = view.transcript.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["two"]);
        assert!(!view.send_pending);
        assert_eq!(view.ai_status, AiStatus::Ready);
    }

    #[tokio::test]
    async fn sends_are_refused_while_a_switch_is_in_flight() {
        let (server, _) = FakeServer::with_session("First", vec![HistoryEntry::new("user", "one")]);
        let second = server.add_session("Second", vec![HistoryEntry::new("user", "two")]);
        let (controller, _) = ready(server).await;

        controller.api().hold_next_history.store(true, Ordering::SeqCst);
        let (switched, during) = tokio::join!(controller.switch_session(second), async {
            while controller.api().hold_next_history.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
            let during = controller.send_message("in between").await;
            controller.api().history_released.notify_one();
            during
        });

        switched.unwrap();
        assert!(matches!(
            during,
            SendOutcome::Ignored(IgnoreReason::Resyncing)
        ));
        assert_eq!(controller.api().chat_calls.load(Ordering::SeqCst), 0);
        assert_eq!(controller.view().transcript.len(), 1);
        assert!(matches!(
            controller.send_message("after").await,
            SendOutcome::Answered
        ));
    }

    #[tokio::test]
    async fn stale_session_list_is_discarded() {
        let (server, id) = FakeServer::with_session("Before", vec![]);
        let (controller, _) = ready(server).await;

        controller.api().hold_next_list.store(true, Ordering::SeqCst);
        let ((), older) = tokio::join!(
            async {
                while controller.api().hold_next_list.load(Ordering::SeqCst) {
                    tokio::task::yield_now().await;
                }
                controller.api().rename_session(id, "After").await.unwrap();
                controller.refresh_sessions().await.unwrap();
                controller.api().list_released.notify_one();
            },
            controller.refresh_sessions(),
        );
        older.unwrap();

        assert_eq!(controller.view().sessions[0].name, "After");
    }

    #[tokio::test]
    async fn network_failure_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let (server, _) = FakeServer::with_session(
            "Cached",
            vec![
                HistoryEntry::new("user", "remember"),
                HistoryEntry::new("ai", "remembered"),
            ],
        );
        let recorder = Arc::new(Recorder::default());
        let controller = ChatSessionController::new(server, recorder)
            .with_store(store.clone())
            .with_chat_id(ChatId::new("chat_test"));

        assert_eq!(
            controller.load_chat_history().await.unwrap(),
            HistorySource::Server
        );
        controller.api().network_down.store(true, Ordering::SeqCst);
        assert_eq!(
            controller.load_chat_history().await.unwrap(),
            HistorySource::Cache
        );
        let view = controller.view();
        assert_eq!(view.transcript.len(), 2);
        assert_eq!(view.transcript[0].text, "remember");

        let saved = store.load_transcript(&ChatId::new("chat_test")).unwrap();
        assert_eq!(saved.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn network_failure_without_backup_is_an_error() {
        let (server, _) = FakeServer::with_session("None", vec![]);
        server.network_down.store(true, Ordering::SeqCst);
        let (controller, _) = controller(server);

        let err = controller.load_chat_history().await.unwrap_err();
        assert!(err.is_network_failure());
    }

    #[tokio::test]
    async fn server_error_leaves_the_transcript_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (server, _) =
            FakeServer::with_session("Kept", vec![HistoryEntry::new("user", "keep")]);
        let recorder = Arc::new(Recorder::default());
        let controller =
            ChatSessionController::new(server, recorder).with_store(LocalStore::new(dir.path()));
        controller.load_chat_history().await.unwrap();

        controller.api().fail_history.store(true, Ordering::SeqCst);
        let err = controller.load_chat_history().await.unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(controller.view().transcript.len(), 1);
    }

    #[tokio::test]
    async fn history_limit_is_forwarded() {
        let history = (0..5)
            .map(|i| HistoryEntry::new("user", format!("m{i}")))
            .collect();
        let (server, _) = FakeServer::with_session("Long", history);
        let recorder = Arc::new(Recorder::default());
        let controller = ChatSessionController::new(server, recorder).with_history_limit(Some(2));
        controller.refresh_sessions().await.unwrap();
        controller.load_chat_history().await.unwrap();

        let texts: Vec<String> = controller
            .view()
            .transcript
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn initialize_loads_everything_and_welcomes() {
        let (server, id) = FakeServer::with_session("Empty", vec![]);
        let (controller, _) = ready(server).await;

        let view = controller.view();
        assert_eq!(view.active_session, Some(id));
        assert_eq!(view.sessions.len(), 1);
        assert!(view.welcome.is_some());
        assert_eq!(view.stats.unwrap().sessions, 1);
    }

    #[tokio::test]
    async fn initialize_offline_still_welcomes() {
        let server = FakeServer::default();
        server.network_down.store(true, Ordering::SeqCst);
        let (controller, _) = ready(server).await;

        let view = controller.view();
        assert!(view.welcome.is_some());
        assert!(view.stats.is_none());
        assert!(view.active_session.is_none());
    }

    #[tokio::test]
    async fn health_check_goes_offline_then_online() {
        let server = FakeServer::default();
        server.unhealthy.store(true, Ordering::SeqCst);
        let (controller, _) = controller(server);

        assert_eq!(controller.check_health().await, Connectivity::Offline);
        assert_eq!(controller.view().connectivity, Connectivity::Offline);
        controller.api().unhealthy.store(false, Ordering::SeqCst);
        assert_eq!(controller.check_health().await, Connectivity::Online);
        assert_eq!(controller.connectivity(), Connectivity::Online);
    }

    #[tokio::test]
    async fn health_check_restarts_in_place() {
        let (controller, _) = controller(FakeServer::default());
        controller.start_health_check();
        controller.start_health_check();
        assert!(controller.health_check_running());
        controller.stop_health_check();
        assert!(!controller.health_check_running());
    }

    #[tokio::test]
    async fn preferred_service_is_sent() {
        let (server, _) = FakeServer::with_session("Empty", vec![]);
        let (controller, _) = ready(server).await;
        controller.set_preferred_service(PreferredService::Gemini);
        assert_eq!(controller.preferred_service(), PreferredService::Gemini);
        assert!(matches!(
            controller.send_message("hi").await,
            SendOutcome::Answered
        ));
    }

    #[tokio::test]
    async fn persist_backup_writes_the_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let (server, _) = FakeServer::with_session("Empty", vec![]);
        let recorder = Arc::new(Recorder::default());
        let controller = ChatSessionController::new(server, recorder).with_store(store.clone());
        controller.initialize().await;
        controller.send_message("save me").await;

        controller.persist_backup().unwrap();
        let saved = store.load_transcript(controller.chat_id()).unwrap().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].text, "save me");
    }
}
