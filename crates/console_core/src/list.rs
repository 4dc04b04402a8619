//! Workbasket list coordination.
//!
//! [`ListCoordinator`] holds the filter, sort order and page cursor of one
//! list view and mirrors the selection owned by the [`WorkbasketStore`].
//! Every change to the query triple issues a fire-and-forget fetch; a
//! response is applied only while its triple is still the one being shown.

use std::sync::Arc;

use futures::StreamExt;
use shared::{
    domain::{PendingAction, WorkbasketId},
    protocol::{
        FilterCriteria, PageCursor, PageMetadata, SelectionIntent, SelectionState, Sorting,
        WorkbasketPage, WorkbasketQueryParameters, WorkbasketSortKey, WorkbasketSummary,
        DEFAULT_PAGE_SIZE,
    },
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{WorkbasketQuery, WorkbasketStore};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListView {
    pub selected_id: Option<WorkbasketId>,
    pub action: PendingAction,
    pub sort: Sorting<WorkbasketSortKey>,
    pub filter: FilterCriteria,
    pub page: PageCursor,
    pub workbaskets: Vec<WorkbasketSummary>,
    pub page_info: Option<PageMetadata>,
    pub loading: bool,
}

impl ListView {
    pub fn query(&self) -> WorkbasketQueryParameters {
        WorkbasketQueryParameters {
            filter: self.filter.clone(),
            sort: self.sort,
            page: self.page,
        }
    }

    pub fn shows_detail(&self) -> bool {
        self.selected_id.is_some() || self.action == PendingAction::Create
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    SelectionChanged(Option<WorkbasketId>),
    SortChanged(Sorting<WorkbasketSortKey>),
    PageChanged(u32),
    PageLoaded { count: usize, total_elements: u64 },
    FetchFailed { message: String },
}

struct ListState {
    view: ListView,
    request_seq: u64,
    applied_seq: u64,
}

struct ListInner {
    store: Arc<dyn WorkbasketStore>,
    query: Arc<dyn WorkbasketQuery>,
    state: Mutex<ListState>,
    events: broadcast::Sender<ListEvent>,
    cancel: CancellationToken,
}

impl ListInner {
    async fn select_entity(&self, id: WorkbasketId) {
        let mut state = self.state.lock().await;
        // Toggle against the container's selection, not the mirror: the
        // mirror lags behind intents until the next selection notification.
        let current = self.store.selection().selected_id;

        if current.as_ref() == Some(&id) {
            self.store.dispatch(SelectionIntent::DeselectEntity);
            if state.view.selected_id.take().is_some() {
                let _ = self.events.send(ListEvent::SelectionChanged(None));
            }
        } else {
            self.store.dispatch(SelectionIntent::SelectEntity(id));
        }
    }

    async fn selection_changed(&self, selection: SelectionState) {
        let mut state = self.state.lock().await;
        state.view.action = selection.action;
        if state.view.selected_id != selection.selected_id {
            state.view.selected_id = selection.selected_id.clone();
            let _ = self
                .events
                .send(ListEvent::SelectionChanged(selection.selected_id));
        }
    }

    async fn perform_sorting(self: &Arc<Self>, sort: Sorting<WorkbasketSortKey>) {
        let mut state = self.state.lock().await;
        state.view.sort = sort;
        let _ = self.events.send(ListEvent::SortChanged(sort));
        self.refetch(&mut state);
    }

    async fn perform_filter(self: &Arc<Self>, partial: FilterCriteria) {
        let mut state = self.state.lock().await;
        state.view.filter.merge(partial);
        self.refetch(&mut state);
    }

    async fn change_page(self: &Arc<Self>, page: u32) {
        let mut state = self.state.lock().await;
        state.view.page.page = page;
        let _ = self.events.send(ListEvent::PageChanged(page));
        self.refetch(&mut state);
    }

    async fn set_page_size(self: &Arc<Self>, page_size: u32) {
        let mut state = self.state.lock().await;
        state.view.page = PageCursor {
            page: 1,
            page_size: page_size.max(1),
        };
        self.refetch(&mut state);
    }

    async fn reset_for_domain(self: &Arc<Self>, domain: String) {
        let mut state = self.state.lock().await;
        state.view.filter = FilterCriteria::for_domain(domain);
        state.view.page.page = 1;
        self.refetch(&mut state);
    }

    async fn refresh(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        self.refetch(&mut state);
    }

    fn refetch(self: &Arc<Self>, state: &mut ListState) {
        state.request_seq += 1;
        state.view.loading = true;
        let seq = state.request_seq;
        let params = state.view.query();
        debug!(seq, ?params, "fetching workbaskets");

        let inner = Arc::clone(self);
        let token = self.cancel.child_token();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = inner.query.query_workbaskets(&params) => result,
            };
            inner.fetch_completed(seq, params, result).await;
        });
    }

    async fn fetch_completed(
        &self,
        seq: u64,
        params: WorkbasketQueryParameters,
        result: anyhow::Result<WorkbasketPage>,
    ) {
        let mut state = self.state.lock().await;
        if self.cancel.is_cancelled() {
            return;
        }
        if seq < state.applied_seq || params != state.view.query() {
            debug!(seq, latest = state.request_seq, "discarding stale workbasket page");
            return;
        }
        state.applied_seq = seq;
        if seq == state.request_seq {
            state.view.loading = false;
        }

        match result {
            Ok(page) => {
                let event = ListEvent::PageLoaded {
                    count: page.workbaskets.len(),
                    total_elements: page.page.total_elements,
                };
                state.view.workbaskets = page.workbaskets;
                state.view.page_info = Some(page.page);
                let _ = self.events.send(event);
            }
            Err(err) => {
                warn!(seq, error = %err, "workbasket query failed");
                let _ = self.events.send(ListEvent::FetchFailed {
                    message: err.to_string(),
                });
            }
        }
    }
}

/// Coordinates one workbasket list view.
///
/// Dropping the coordinator cancels its store subscriptions and every
/// in-flight fetch.
pub struct ListCoordinator {
    inner: Arc<ListInner>,
    tasks: Vec<JoinHandle<()>>,
}

impl ListCoordinator {
    pub fn new(store: Arc<dyn WorkbasketStore>, query: Arc<dyn WorkbasketQuery>) -> Self {
        Self::with_page_size(store, query, DEFAULT_PAGE_SIZE)
    }

    /// Like [`ListCoordinator::new`] with an initial page size; no fetch is
    /// issued.
    pub fn with_page_size(
        store: Arc<dyn WorkbasketStore>,
        query: Arc<dyn WorkbasketQuery>,
        page_size: u32,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let selection = store.selection();
        let view = ListView {
            selected_id: selection.selected_id,
            action: selection.action,
            page: PageCursor {
                page: 1,
                page_size: page_size.max(1),
            },
            ..ListView::default()
        };
        Self {
            inner: Arc::new(ListInner {
                store,
                query,
                state: Mutex::new(ListState {
                    view,
                    request_seq: 0,
                    applied_seq: 0,
                }),
                events,
                cancel: CancellationToken::new(),
            }),
            tasks: Vec::new(),
        }
    }

    /// Subscribes to the store's filter and selection streams.
    ///
    /// Every filter the store publishes, starting with the current one, is
    /// merged through [`ListCoordinator::perform_filter`].
    pub fn on_init(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }
        self.tasks.push(spawn_filter_sync(Arc::clone(&self.inner)));
        self.tasks.push(spawn_selection_sync(Arc::clone(&self.inner)));
    }

    /// Toggles the selection of `id` through the store.
    pub async fn select_entity(&self, id: impl Into<WorkbasketId>) {
        self.inner.select_entity(id.into()).await;
    }

    pub async fn perform_sorting(&self, sort: Sorting<WorkbasketSortKey>) {
        self.inner.perform_sorting(sort).await;
    }

    /// Merges `partial` into the held filter. The page cursor is left alone;
    /// call [`ListCoordinator::reset_page`] first when the result set changes.
    pub async fn perform_filter(&self, partial: FilterCriteria) {
        self.inner.perform_filter(partial).await;
    }

    pub async fn change_page(&self, page: u32) {
        self.inner.change_page(page).await;
    }

    pub async fn reset_page(&self) {
        self.inner.state.lock().await.view.page.page = 1;
    }

    pub async fn set_page_size(&self, page_size: u32) {
        self.inner.set_page_size(page_size).await;
    }

    pub async fn reset_for_domain(&self, domain: impl Into<String>) {
        self.inner.reset_for_domain(domain.into()).await;
    }

    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    pub async fn view(&self) -> ListView {
        self.inner.state.lock().await.view.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListEvent> {
        self.inner.events.subscribe()
    }

    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl Drop for ListCoordinator {
    fn drop(&mut self) {
        self.shutdown();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

fn spawn_filter_sync(inner: Arc<ListInner>) -> JoinHandle<()> {
    let token = inner.cancel.child_token();
    let mut filters = inner.store.filter_updates();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                filter = filters.next() => match filter {
                    Some(filter) => inner.perform_filter(filter).await,
                    None => break,
                },
            }
        }
    })
}

fn spawn_selection_sync(inner: Arc<ListInner>) -> JoinHandle<()> {
    let token = inner.cancel.child_token();
    let mut updates = inner.store.selection_updates();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                selection = updates.next() => match selection {
                    Some(selection) => inner.selection_changed(selection).await,
                    None => break,
                },
            }
        }
    })
}

#[cfg(test)]
#[path = "tests/list_tests.rs"]
mod tests;
