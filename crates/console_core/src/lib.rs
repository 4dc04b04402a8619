//! Selection and lookup coordination for the workbasket administration console.
//!
//! Two components live here. [`ListCoordinator`] keeps selection, filter, sort
//! and page state of a workbasket list consistent with an external state
//! container and an asynchronous query backend. [`LookupResolver`] turns free
//! text into a validated access-id record through a debounced, cancellable
//! search pipeline.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::{
    domain::ButtonAction,
    protocol::{
        AccessIdRecord, FilterCriteria, SelectionIntent, SelectionState, WorkbasketPage,
        WorkbasketQueryParameters,
    },
};

pub mod error;
pub mod list;
pub mod lookup;
pub mod store;
pub mod transport;

pub use list::{ListCoordinator, ListEvent, ListView};
pub use lookup::{
    ControlError, LookupEvent, LookupOptions, LookupPhase, LookupResolver, LookupResult,
    LookupSnapshot, DEFAULT_DEBOUNCE, SEARCH_PLACEHOLDER,
};
pub use store::InMemoryWorkbasketStore;
pub use transport::HttpConsoleApi;

/// Free-text identity search. No ordering of the returned candidates is assumed.
#[async_trait]
pub trait AccessIdSearch: Send + Sync {
    async fn search_for_access_id(&self, query: &str) -> Result<Vec<AccessIdRecord>>;
}

#[async_trait]
pub trait WorkbasketQuery: Send + Sync {
    async fn query_workbaskets(&self, params: &WorkbasketQueryParameters)
        -> Result<WorkbasketPage>;
}

/// Global UI customisation, read once when a lookup starts.
#[async_trait]
pub trait CustomisationSource: Send + Sync {
    /// Debounce window for lookup fields in milliseconds. `None` or `0` keeps
    /// the built-in default.
    async fn debounce_override(&self) -> Result<Option<u64>>;
}

/// Typed access to the process-wide state container.
///
/// The container owns [`SelectionState`]; components read it, subscribe to
/// it and send intents, but never write it directly.
pub trait WorkbasketStore: Send + Sync {
    fn dispatch(&self, intent: SelectionIntent);
    fn selection(&self) -> SelectionState;
    fn selection_updates(&self) -> BoxStream<'static, SelectionState>;
    fn filter_updates(&self) -> BoxStream<'static, FilterCriteria>;
    fn button_actions(&self) -> BoxStream<'static, ButtonAction>;
}

pub struct DefaultCustomisation;

#[async_trait]
impl CustomisationSource for DefaultCustomisation {
    async fn debounce_override(&self) -> Result<Option<u64>> {
        Ok(None)
    }
}

pub struct FixedCustomisation(pub Option<u64>);

#[async_trait]
impl CustomisationSource for FixedCustomisation {
    async fn debounce_override(&self) -> Result<Option<u64>> {
        Ok(self.0)
    }
}
