//! In-process state container for selection, filter and toolbar signals.

use futures::{stream::BoxStream, StreamExt};
use shared::{
    domain::ButtonAction,
    protocol::{FilterCriteria, SelectionIntent, SelectionState},
};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing::debug;

use crate::WorkbasketStore;

const SIGNAL_CAPACITY: usize = 64;

/// Single-writer store backing [`WorkbasketStore`].
///
/// Intents are applied synchronously through [`SelectionState::apply`], so a
/// read right after `dispatch` already observes the new selection.
pub struct InMemoryWorkbasketStore {
    selection: watch::Sender<SelectionState>,
    filter: watch::Sender<Option<FilterCriteria>>,
    buttons: broadcast::Sender<ButtonAction>,
    intents: broadcast::Sender<SelectionIntent>,
}

impl Default for InMemoryWorkbasketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWorkbasketStore {
    pub fn new() -> Self {
        let (selection, _) = watch::channel(SelectionState::default());
        let (filter, _) = watch::channel(None);
        let (buttons, _) = broadcast::channel(SIGNAL_CAPACITY);
        let (intents, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self {
            selection,
            filter,
            buttons,
            intents,
        }
    }

    pub fn with_filter(filter: FilterCriteria) -> Self {
        let store = Self::new();
        store.publish_filter(filter);
        store
    }

    pub fn publish_filter(&self, filter: FilterCriteria) {
        debug!(?filter, "publishing list filter");
        self.filter.send_replace(Some(filter));
    }

    pub fn publish_button_action(&self, action: ButtonAction) {
        debug!(?action, "publishing button action");
        let _ = self.buttons.send(action);
    }

    /// Every intent dispatched to the store, in dispatch order.
    pub fn subscribe_intents(&self) -> broadcast::Receiver<SelectionIntent> {
        self.intents.subscribe()
    }
}

impl WorkbasketStore for InMemoryWorkbasketStore {
    fn dispatch(&self, intent: SelectionIntent) {
        debug!(?intent, "applying selection intent");
        self.selection.send_modify(|state| state.apply(&intent));
        let _ = self.intents.send(intent);
    }

    fn selection(&self) -> SelectionState {
        self.selection.borrow().clone()
    }

    fn selection_updates(&self) -> BoxStream<'static, SelectionState> {
        WatchStream::new(self.selection.subscribe()).boxed()
    }

    fn filter_updates(&self) -> BoxStream<'static, FilterCriteria> {
        WatchStream::new(self.filter.subscribe())
            .filter_map(|filter| async move { filter })
            .boxed()
    }

    fn button_actions(&self) -> BoxStream<'static, ButtonAction> {
        BroadcastStream::new(self.buttons.subscribe())
            .filter_map(|action| async move { action.ok() })
            .boxed()
    }
}
