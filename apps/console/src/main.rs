mod config;

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use console_core::{
    FixedCustomisation, HttpConsoleApi, InMemoryWorkbasketStore, ListCoordinator, ListEvent,
    ListView, LookupEvent, LookupOptions, LookupPhase, LookupResolver, WorkbasketStore,
};
use shared::{
    domain::Direction,
    protocol::{
        FilterCriteria, PageCursor, Sorting, WorkbasketQueryParameters, WorkbasketSortKey,
        FILTER_KEY_LIKE, FILTER_NAME_LIKE,
    },
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::config::{load_settings, Settings};

#[derive(Parser, Debug)]
#[command(name = "console", about = "Workbasket administration console")]
struct Cli {
    /// REST root of the backend; overrides `api_base_url` from settings.
    #[arg(long, global = true)]
    api_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List one page of workbaskets.
    Workbaskets {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        name_like: Option<String>,
        #[arg(long)]
        key_like: Option<String>,
        #[arg(long, default_value = "name")]
        sort_by: WorkbasketSortKey,
        #[arg(long, default_value = "asc")]
        order: Direction,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Resolve free text to an access id.
    Lookup {
        text: String,
        #[arg(long)]
        required: bool,
        #[arg(long)]
        display_error: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(url) = cli.api_url {
        settings.api_base_url = url;
    }
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();

    let api = HttpConsoleApi::new(
        &settings.api_base_url,
        Duration::from_secs(settings.request_timeout_secs),
    )?;
    info!(base_url = %api.base_url(), "console api configured");

    match cli.command {
        Command::Workbaskets {
            domain,
            name_like,
            key_like,
            sort_by,
            order,
            page,
        } => {
            let mut partial = FilterCriteria::new();
            if let Some(name_like) = name_like {
                partial.insert(FILTER_NAME_LIKE, name_like.as_str());
            }
            if let Some(key_like) = key_like {
                partial.insert(FILTER_KEY_LIKE, key_like.as_str());
            }
            let domain = domain.or_else(|| settings.default_domain.clone());
            let view = list_workbaskets(
                api,
                &settings,
                domain,
                partial,
                Sorting::new(sort_by, order),
                page,
            )
            .await?;
            print_workbaskets(&view);
        }
        Command::Lookup {
            text,
            required,
            display_error,
        } => {
            let options = LookupOptions {
                required,
                display_error,
                ..LookupOptions::default()
            };
            lookup_access_id(api, &settings, options, text).await?;
        }
    }

    Ok(())
}

async fn list_workbaskets(
    api: HttpConsoleApi,
    settings: &Settings,
    domain: Option<String>,
    partial: FilterCriteria,
    sort: Sorting<WorkbasketSortKey>,
    page: u32,
) -> Result<ListView> {
    let store = Arc::new(match &domain {
        Some(domain) => InMemoryWorkbasketStore::with_filter(FilterCriteria::for_domain(domain)),
        None => InMemoryWorkbasketStore::new(),
    });

    let mut expected_filter = domain.map(FilterCriteria::for_domain).unwrap_or_default();
    expected_filter.merge(partial.clone());
    let expected = WorkbasketQueryParameters {
        filter: expected_filter,
        sort,
        page: PageCursor {
            page,
            page_size: settings.page_size.max(1),
        },
    };

    let mut list = ListCoordinator::with_page_size(store, Arc::new(api), settings.page_size);
    let mut events = list.subscribe();
    list.on_init();
    list.perform_sorting(sort).await;
    if !partial.is_empty() {
        list.perform_filter(partial).await;
    }
    list.change_page(page).await;

    let wait = Duration::from_secs(settings.request_timeout_secs.saturating_add(5));
    let view = tokio::time::timeout(wait, async {
        loop {
            match events.recv().await {
                Ok(ListEvent::PageLoaded { .. }) => {
                    let view = list.view().await;
                    if !view.loading && view.query() == expected {
                        return Ok(view);
                    }
                }
                Ok(ListEvent::FetchFailed { message }) => {
                    let view = list.view().await;
                    if !view.loading && view.query() == expected {
                        bail!("workbasket query failed: {message}");
                    }
                }
                Ok(event) => debug!(?event, "list event"),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "list events lagged"),
                Err(RecvError::Closed) => return Err(anyhow!("list coordinator closed")),
            }
        }
    })
    .await
    .context("timed out waiting for workbaskets")??;

    list.shutdown();
    Ok(view)
}

fn print_workbaskets(view: &ListView) {
    for workbasket in &view.workbaskets {
        println!(
            "{}\t{}\t{:?}\t{}\t{}",
            workbasket.workbasket_id,
            workbasket.key,
            workbasket.kind,
            workbasket.domain,
            workbasket.name
        );
    }
    if let Some(info) = view.page_info {
        println!(
            "page {}/{} ({} workbaskets)",
            info.number, info.total_pages, info.total_elements
        );
    }
}

async fn lookup_access_id(
    api: HttpConsoleApi,
    settings: &Settings,
    options: LookupOptions,
    text: String,
) -> Result<()> {
    let store = InMemoryWorkbasketStore::new();
    let resolver = LookupResolver::start(
        options,
        Arc::new(api),
        Arc::new(FixedCustomisation(settings.lookup_debounce_ms)),
        store.button_actions(),
    );
    let mut events = resolver.subscribe();
    resolver.input(text).await;

    let deadline = tokio::time::Instant::now()
        + resolver.snapshot().await.debounce
        + Duration::from_secs(settings.request_timeout_secs.saturating_add(1));
    let snapshot = loop {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = resolver.snapshot().await;
        let settled = !matches!(snapshot.phase, LookupPhase::Debouncing | LookupPhase::Searching);
        if settled {
            break snapshot;
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out waiting for access id search");
        }
    };

    while let Ok(event) = events.try_recv() {
        match event {
            LookupEvent::FormValidity(valid) => println!("valid: {valid}"),
            LookupEvent::AccessIdSelected(record) if record.is_empty() => {
                println!("selected: <none>")
            }
            LookupEvent::AccessIdSelected(record) => {
                println!("selected: {} ({})", record.access_id, record.name)
            }
            LookupEvent::SearchFailed { query, message } => {
                bail!("access id search for '{query}' failed: {message}")
            }
        }
    }
    if !snapshot.suggestions.is_empty() {
        println!("suggestions:");
        for record in &snapshot.suggestions {
            println!("  {}\t{}", record.access_id, record.name);
        }
    }
    if snapshot.error.is_some() {
        println!("error: no matching access id");
    }

    resolver.shutdown();
    Ok(())
}
