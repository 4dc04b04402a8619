//! Debounced access-id lookup.
//!
//! A [`LookupResolver`] owns one text field. Keystrokes are coalesced over a
//! quiescence window, distinct values are searched through an
//! [`AccessIdSearch`], and the outcome is broadcast as a validity flag plus
//! the selected record.

use std::{sync::Arc, time::Duration};

use futures::{stream::BoxStream, StreamExt};
use shared::{
    domain::ButtonAction,
    protocol::{AccessIdRecord, SavedAccessId},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{AccessIdSearch, CustomisationSource};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(750);

/// Placeholder of the free search field; that field never reports an empty
/// record back to its owner.
pub const SEARCH_PLACEHOLDER: &str = "Search for AccessId";

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    Empty,
    NoMatch,
    Match(AccessIdRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupPhase {
    Idle,
    Debouncing,
    Searching,
    Resolved(LookupResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    Incorrect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupEvent {
    FormValidity(bool),
    AccessIdSelected(AccessIdRecord),
    SearchFailed { query: String, message: String },
}

#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    pub saved_access_id: Option<SavedAccessId>,
    pub entity_id: Option<String>,
    pub placeholder_message: Option<String>,
    pub required: bool,
    pub disabled: bool,
    pub display_error: bool,
}

impl LookupOptions {
    fn emits_empty_record(&self) -> bool {
        self.placeholder_message.as_deref() != Some(SEARCH_PLACEHOLDER)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSnapshot {
    pub value: String,
    pub name: String,
    pub phase: LookupPhase,
    pub suggestions: Vec<AccessIdRecord>,
    pub last_confirmed: AccessIdRecord,
    pub error: Option<ControlError>,
    pub disabled: bool,
    pub debounce: Duration,
}

struct InFlightSearch {
    seq: u64,
    token: CancellationToken,
}

struct LookupState {
    options: LookupOptions,
    value: String,
    name: String,
    phase: LookupPhase,
    suggestions: Vec<AccessIdRecord>,
    confirmed: AccessIdRecord,
    error: Option<ControlError>,
    debounce: Duration,
    debounce_overridden: bool,
    // Last value that made it through the debounce window (or was set
    // programmatically); equal values are not searched again.
    last_accepted: Option<String>,
    debounce_generation: u64,
    debounce_timer: Option<JoinHandle<()>>,
    search_seq: u64,
    search: Option<InFlightSearch>,
}

impl LookupState {
    fn new(options: LookupOptions) -> Self {
        let mut state = Self {
            options,
            value: String::new(),
            name: String::new(),
            phase: LookupPhase::Idle,
            suggestions: Vec::new(),
            confirmed: AccessIdRecord::empty(),
            error: None,
            debounce: DEFAULT_DEBOUNCE,
            debounce_overridden: false,
            last_accepted: None,
            debounce_generation: 0,
            debounce_timer: None,
            search_seq: 0,
            search: None,
        };
        state.apply_preset();
        state
    }

    fn stop_debounce(&mut self) {
        if let Some(timer) = self.debounce_timer.take() {
            timer.abort();
        }
        self.debounce_generation += 1;
    }

    fn cancel_search(&mut self) {
        if let Some(search) = self.search.take() {
            trace!(seq = search.seq, "superseding in-flight search");
            search.token.cancel();
        }
    }

    fn restore(&mut self, record: AccessIdRecord) {
        self.stop_debounce();
        self.cancel_search();
        self.value = record.access_id.clone();
        self.name = record.name;
        self.last_accepted = Some(record.access_id);
        self.error = None;
        self.phase = LookupPhase::Idle;
    }

    fn apply_preset(&mut self) {
        let record = SavedAccessId::resolve(self.options.saved_access_id.as_ref());
        self.confirmed = record.clone();
        self.restore(record);
    }

    fn snapshot(&self) -> LookupSnapshot {
        LookupSnapshot {
            value: self.value.clone(),
            name: self.name.clone(),
            phase: self.phase.clone(),
            suggestions: self.suggestions.clone(),
            last_confirmed: self.confirmed.clone(),
            error: self.error,
            disabled: self.options.disabled,
            debounce: self.debounce,
        }
    }
}

struct LookupInner {
    search: Arc<dyn AccessIdSearch>,
    state: Mutex<LookupState>,
    events: broadcast::Sender<LookupEvent>,
    cancel: CancellationToken,
}

impl LookupInner {
    async fn input(self: &Arc<Self>, value: String) {
        let mut state = self.state.lock().await;
        if state.options.disabled {
            trace!("ignoring input on disabled lookup");
            return;
        }

        state.value = value;
        state.error = None;
        state.stop_debounce();
        if state.search.is_some() {
            state.cancel_search();
            // The superseded query is searched again if it comes back.
            state.last_accepted = None;
        }

        let generation = state.debounce_generation;
        let delay = state.debounce;
        let inner = Arc::clone(self);
        let token = self.cancel.child_token();
        state.debounce_timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => inner.debounce_elapsed(generation).await,
            }
        }));
        state.phase = LookupPhase::Debouncing;
    }

    async fn debounce_elapsed(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock().await;
        if self.cancel.is_cancelled() || state.debounce_generation != generation {
            return;
        }
        state.debounce_timer = None;

        let value = state.value.clone();
        if state.last_accepted.as_deref() == Some(value.as_str()) {
            trace!(value = %value, "suppressing unchanged lookup value");
            state.phase = LookupPhase::Idle;
            return;
        }
        state.last_accepted = Some(value.clone());

        if value.is_empty() {
            self.resolve_empty(&mut state);
        } else {
            self.start_search(&mut state, value);
        }
    }

    fn resolve_empty(&self, state: &mut LookupState) {
        state.cancel_search();
        state.name.clear();
        state.phase = LookupPhase::Resolved(LookupResult::Empty);

        let _ = self
            .events
            .send(LookupEvent::FormValidity(!state.options.required));
        if state.options.emits_empty_record() {
            let _ = self
                .events
                .send(LookupEvent::AccessIdSelected(AccessIdRecord::empty()));
        }
        if state.options.required {
            state.error = Some(ControlError::Incorrect);
        }
    }

    fn start_search(self: &Arc<Self>, state: &mut LookupState, query: String) {
        state.cancel_search();
        state.search_seq += 1;
        let seq = state.search_seq;
        let token = self.cancel.child_token();
        debug!(seq, query = %query, "searching access ids");

        let inner = Arc::clone(self);
        let search_token = token.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = search_token.cancelled() => return,
                result = inner.search.search_for_access_id(&query) => result,
            };
            inner.search_completed(seq, query, result).await;
        });

        state.search = Some(InFlightSearch { seq, token });
        state.phase = LookupPhase::Searching;
    }

    async fn search_completed(
        &self,
        seq: u64,
        query: String,
        result: anyhow::Result<Vec<AccessIdRecord>>,
    ) {
        let mut state = self.state.lock().await;
        if self.cancel.is_cancelled() {
            return;
        }
        if state.search.as_ref().map(|search| search.seq) != Some(seq) {
            debug!(seq, query = %query, "discarding stale access id search");
            return;
        }
        state.search = None;

        let candidates = match result {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(query = %query, error = %err, "access id search failed");
                state.phase = LookupPhase::Idle;
                let _ = self.events.send(LookupEvent::SearchFailed {
                    query,
                    message: err.to_string(),
                });
                return;
            }
        };

        let wanted = query.to_lowercase();
        let matched = candidates
            .iter()
            .find(|candidate| candidate.access_id.to_lowercase() == wanted)
            .cloned();
        state.suggestions = candidates;

        match matched {
            Some(record) => {
                state.name = record.name.clone();
                state.phase = LookupPhase::Resolved(LookupResult::Match(record.clone()));
                let _ = self.events.send(LookupEvent::FormValidity(true));
                let _ = self.events.send(LookupEvent::AccessIdSelected(record));
            }
            None if state.options.display_error => {
                state.phase = LookupPhase::Resolved(LookupResult::NoMatch);
                state.error = Some(ControlError::Incorrect);
                let _ = self.events.send(LookupEvent::FormValidity(false));
                let _ = self
                    .events
                    .send(LookupEvent::AccessIdSelected(AccessIdRecord::empty()));
            }
            None => {
                trace!(query = %query, "no exact access id match yet");
                state.phase = LookupPhase::Idle;
            }
        }
    }

    async fn undo(&self) {
        let mut state = self.state.lock().await;
        let confirmed = state.confirmed.clone();
        debug!(access_id = %confirmed.access_id, "restoring last confirmed access id");
        state.restore(confirmed);
    }

    async fn set_entity(&self, entity_id: Option<String>, saved: Option<SavedAccessId>) {
        let mut state = self.state.lock().await;
        state.options.saved_access_id = saved;
        if state.options.entity_id == entity_id {
            return;
        }
        debug!(?entity_id, "lookup reused for another record");
        state.options.entity_id = entity_id;
        state.apply_preset();
    }

    async fn override_debounce(&self, debounce: Duration) {
        let mut state = self.state.lock().await;
        if state.debounce_overridden {
            return;
        }
        debug!(?debounce, "applying lookup debounce override");
        state.debounce = debounce;
        state.debounce_overridden = true;
    }
}

/// Handle to a running lookup. Dropping it cancels every timer, search and
/// subscription the lookup started.
pub struct LookupResolver {
    inner: Arc<LookupInner>,
    tasks: Vec<JoinHandle<()>>,
}

impl LookupResolver {
    /// Starts the lookup on the current Tokio runtime.
    ///
    /// The preset in `options` is applied as the confirmed value right away.
    /// `button_actions` is watched for [`ButtonAction::Undo`].
    pub fn start(
        options: LookupOptions,
        search: Arc<dyn AccessIdSearch>,
        customisation: Arc<dyn CustomisationSource>,
        button_actions: BoxStream<'static, ButtonAction>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(LookupInner {
            search,
            state: Mutex::new(LookupState::new(options)),
            events,
            cancel: CancellationToken::new(),
        });

        let tasks = vec![
            spawn_undo_listener(Arc::clone(&inner), button_actions),
            spawn_customisation_fetch(Arc::clone(&inner), customisation),
        ];

        Self { inner, tasks }
    }

    /// Feeds a new value typed by the user.
    pub async fn input(&self, value: impl Into<String>) {
        self.inner.input(value.into()).await;
    }

    pub async fn undo(&self) {
        self.inner.undo().await;
    }

    /// Re-initializes from `saved` when the owning record changed.
    pub async fn set_entity(&self, entity_id: Option<String>, saved: Option<SavedAccessId>) {
        self.inner.set_entity(entity_id, saved).await;
    }

    pub async fn snapshot(&self) -> LookupSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LookupEvent> {
        self.inner.events.subscribe()
    }

    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

impl Drop for LookupResolver {
    fn drop(&mut self) {
        self.shutdown();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

fn spawn_undo_listener(
    inner: Arc<LookupInner>,
    mut actions: BoxStream<'static, ButtonAction>,
) -> JoinHandle<()> {
    let token = inner.cancel.child_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                action = actions.next() => match action {
                    Some(ButtonAction::Undo) => inner.undo().await,
                    Some(_) => {}
                    None => break,
                },
            }
        }
    })
}

fn spawn_customisation_fetch(
    inner: Arc<LookupInner>,
    customisation: Arc<dyn CustomisationSource>,
) -> JoinHandle<()> {
    let token = inner.cancel.child_token();
    tokio::spawn(async move {
        let result = tokio::select! {
            _ = token.cancelled() => return,
            result = customisation.debounce_override() => result,
        };
        match result {
            Ok(Some(millis)) if millis > 0 => {
                inner
                    .override_debounce(Duration::from_millis(millis))
                    .await
            }
            Ok(_) => trace!("no lookup debounce override configured"),
            Err(err) => debug!(error = %err, "lookup customisation unavailable, keeping default"),
        }
    })
}

#[cfg(test)]
#[path = "tests/lookup_tests.rs"]
mod tests;
