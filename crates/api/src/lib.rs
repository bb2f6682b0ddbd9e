//! Pixelynth engine façade (in-process).
//!
//! One actor task owns the facet state, the index of the current snapshot,
//! the result cache and the page window. Frontends talk to it through a
//! cloneable [`EngineHandle`] and observe [`EngineView`]s.

#![forbid(unsafe_code)]

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pixelynth_core::{CatalogError, CatalogResult, CatalogSnapshot, FacetState, FacetUpdate, Item, QuerySignature};
use pixelynth_search::{DocId, Index, ResultCache};
use pixelynth_store::{ItemProvider, ItemStore, StoreHandle};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub mod dispatch;
pub mod window;

pub use dispatch::{Debouncer, Trigger};
pub use window::PageWindow;

/// Engine tuning. Defaults match the gallery: 300ms debounce, pages of 16.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub debounce: Duration,
    pub page_size: usize,
    pub page_increment: usize,
    /// `None` keeps every signature for the lifetime of a snapshot.
    pub cache_cap: Option<NonZeroUsize>,
    pub queue_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            page_size: 16,
            page_increment: 16,
            cache_cap: None,
            queue_cap: 256,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `PIXELYNTH_*` environment variables.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
        }
        let d = Self::default();
        Self {
            debounce: var::<u64>("PIXELYNTH_DEBOUNCE_MS").map(Duration::from_millis).unwrap_or(d.debounce),
            page_size: var("PIXELYNTH_PAGE_SIZE").unwrap_or(d.page_size),
            page_increment: var("PIXELYNTH_PAGE_INCREMENT").unwrap_or(d.page_increment),
            cache_cap: var::<usize>("PIXELYNTH_CACHE_CAP").and_then(NonZeroUsize::new),
            queue_cap: var::<usize>("PIXELYNTH_QUEUE_CAP").filter(|c| *c > 0).unwrap_or(d.queue_cap),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewStatus {
    /// A bulk fetch is in flight.
    Loading,
    /// The last fetch failed; the result set is empty.
    Error,
    /// Loaded, but nothing matches the current facets.
    Empty,
    Ready,
}

/// What a consumer renders: status, the current result set and the window
/// over it. Results are ids into `snapshot`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineView {
    pub status: ViewStatus,
    pub error: Option<CatalogError>,
    /// Bumped on every dispatched query.
    pub revision: u64,
    pub epoch: u64,
    pub facets: FacetState,
    pub signature: QuerySignature,
    pub total: usize,
    pub window: usize,
    pub has_more: bool,
    #[serde(skip)]
    pub snapshot: Arc<CatalogSnapshot>,
    #[serde(skip)]
    pub results: Arc<[DocId]>,
    #[serde(skip)]
    pager: PageWindow,
}

impl EngineView {
    fn loading() -> Self {
        let facets = FacetState::default();
        Self {
            status: ViewStatus::Loading,
            error: None,
            revision: 0,
            epoch: 0,
            signature: facets.signature(),
            facets,
            total: 0,
            window: 0,
            has_more: false,
            snapshot: Arc::new(CatalogSnapshot::default()),
            results: Arc::from(Vec::new()),
            pager: PageWindow::new(0, 1),
        }
    }

    pub fn page_ids(&self) -> &[DocId] { self.pager.current_page(&self.results) }

    pub fn page(&self) -> impl Iterator<Item = &Item> + '_ {
        self.page_ids().iter().filter_map(|d| self.snapshot.items.get(*d as usize))
    }
}

type Listener = Arc<dyn Fn(&EngineView) + Send + Sync>;
type Listeners = Arc<Mutex<Vec<Listener>>>;

enum Command {
    Schedule(Trigger),
    RequestMore,
    Reload(oneshot::Sender<CatalogResult<()>>),
}

/// Cloneable front door to a running engine. The engine stops once every
/// handle is dropped.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
    views: watch::Receiver<EngineView>,
    listeners: Listeners,
    store: StoreHandle,
}

impl EngineHandle {
    async fn send(&self, cmd: Command) -> CatalogResult<()> {
        self.tx.send(cmd).await.map_err(|_| CatalogError::Closed)
    }

    /// Debounced: the committed search text changes once input goes quiet.
    pub async fn set_search_text(&self, text: impl Into<String>) -> CatalogResult<()> {
        self.send(Command::Schedule(Trigger::Text(text.into()))).await
    }

    /// Validate and apply one facet immediately. A rejected value leaves the
    /// previous one in place.
    pub async fn set_facet(&self, name: &str, value: &str) -> CatalogResult<()> {
        let update = match FacetUpdate::parse(name, value) {
            Ok(u) => u,
            Err(e) => {
                metrics::counter!("facet_rejections_total", 1u64);
                warn!(facet = name, value, error = %e, "engine: facet value rejected");
                return Err(e);
            }
        };
        self.apply(update).await
    }

    pub async fn apply(&self, update: FacetUpdate) -> CatalogResult<()> {
        self.send(Command::Schedule(Trigger::Facet(update))).await
    }

    /// Reset color, people, orientation and sort.
    pub async fn clear_filters(&self) -> CatalogResult<()> {
        self.send(Command::Schedule(Trigger::ClearFilters)).await
    }

    pub async fn request_more(&self) -> CatalogResult<()> { self.send(Command::RequestMore).await }

    /// Fetch the catalog again. Resolves once the new snapshot is live; a
    /// failed fetch leaves the engine in the error state and returns it.
    pub async fn reload(&self) -> CatalogResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Reload(tx)).await?;
        rx.await.map_err(|_| CatalogError::Closed)?
    }

    /// Called from the engine task after every emitted view.
    pub fn on_results_changed<F>(&self, listener: F)
    where
        F: Fn(&EngineView) + Send + Sync + 'static,
    {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).push(Arc::new(listener));
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineView> { self.views.clone() }

    pub fn view(&self) -> EngineView { self.views.borrow().clone() }

    /// Catalog currently held by the store, unfiltered.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> { self.store.current() }
}

pub struct CatalogEngine {
    store: ItemStore,
    facets: FacetState,
    debouncer: Debouncer,
    snapshot: Arc<CatalogSnapshot>,
    index: Index,
    cache: ResultCache,
    window: PageWindow,
    results: Arc<[DocId]>,
    signature: Option<QuerySignature>,
    status: ViewStatus,
    error: Option<CatalogError>,
    revision: u64,
    view_tx: watch::Sender<EngineView>,
    listeners: Listeners,
}

impl CatalogEngine {
    /// Start the engine task and its initial load. Must be called inside a
    /// tokio runtime.
    pub fn spawn(provider: Arc<dyn ItemProvider>, config: EngineConfig) -> EngineHandle {
        let (tx, rx) = mpsc::channel(config.queue_cap.max(1));
        let (view_tx, views) = watch::channel(EngineView::loading());
        let listeners: Listeners = Arc::new(Mutex::new(Vec::new()));
        let store = ItemStore::new(provider);
        let handle = EngineHandle { tx, views, listeners: Arc::clone(&listeners), store: store.handle() };
        let snapshot = store.current();
        let engine = CatalogEngine {
            index: Index::build_from_snapshot(&snapshot),
            snapshot,
            store,
            facets: FacetState::default(),
            debouncer: Debouncer::new(config.debounce),
            cache: ResultCache::with_capacity(config.cache_cap),
            window: PageWindow::new(config.page_size, config.page_increment),
            results: Arc::from(Vec::new()),
            signature: None,
            status: ViewStatus::Loading,
            error: None,
            revision: 0,
            view_tx,
            listeners,
        };
        info!(debounce_ms = %engine.debouncer.quiescence().as_millis(), page_size = config.page_size, "engine: starting");
        tokio::spawn(engine.run(rx));
        handle
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let _ = self.load().await;
        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                maybe = rx.recv() => {
                    match maybe {
                        Some(cmd) => self.handle(cmd).await,
                        None => {
                            if let Some(text) = self.debouncer.cancel() {
                                debug!(text = %text, "dropping unsettled search text");
                            }
                            debug!("command channel closed; stopping engine");
                            break;
                        }
                    }
                }
                _ = wait_until(deadline) => {
                    if let Some(text) = self.debouncer.take_due(Instant::now()) {
                        self.commit_text(text);
                    }
                }
            }
        }
        info!(revision = self.revision, "engine stopped");
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Schedule(trigger) => {
                if let Some(now) = self.debouncer.schedule(trigger, Instant::now()) {
                    self.fire(now);
                }
            }
            Command::RequestMore => self.request_more(),
            Command::Reload(reply) => {
                info!(epoch = self.snapshot.epoch, "engine: reload");
                let res = self.load().await;
                let _ = reply.send(res);
            }
        }
    }

    fn fire(&mut self, trigger: Trigger) {
        let changed = match trigger {
            Trigger::Facet(update) => {
                let facet = update.facet();
                let changed = self.facets.apply(update);
                debug!(%facet, changed, "engine: facet");
                changed
            }
            Trigger::ClearFilters => self.facets.clear_filters(),
            Trigger::Text(text) => self.facets.set_search_text(&text),
        };
        if changed {
            self.dispatch();
        }
    }

    fn commit_text(&mut self, text: String) {
        debug!(text = %text, "engine: search text settled");
        self.fire(Trigger::Text(text));
    }

    fn request_more(&mut self) {
        if self.debouncer.is_pending() {
            metrics::counter!("window_requests_dropped_total", 1u64);
            debug!(pending = ?self.debouncer.pending_text(), "engine: request_more dropped; results about to change");
            return;
        }
        if self.window.request_more() {
            self.emit();
        }
    }

    async fn load(&mut self) -> CatalogResult<()> {
        self.status = ViewStatus::Loading;
        self.emit();
        let res = self.store.load().await;
        let (snapshot, error) = match res {
            Ok(snap) => (snap, None),
            Err(e) => (self.store.current(), Some(e)),
        };
        self.index = Index::build_from_snapshot(&snapshot);
        self.snapshot = snapshot;
        self.error = error.clone();
        // same facets must be re-evaluated against the new snapshot
        self.signature = None;
        self.dispatch();
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Evaluate the facet state through the cache and reset the window.
    /// Nothing happens when the signature is unchanged.
    fn dispatch(&mut self) {
        let sig = self.facets.signature();
        if self.signature.as_ref() == Some(&sig) {
            debug!(signature = %sig, "engine: signature unchanged");
            return;
        }
        let t0 = std::time::Instant::now();
        let index = &self.index;
        let facets = &self.facets;
        self.results = self.cache.get_or_compute(self.snapshot.epoch, &sig, || index.query(facets));
        self.window.reset(self.results.len());
        self.revision += 1;
        self.status = match (&self.error, self.results.is_empty()) {
            (Some(_), _) => ViewStatus::Error,
            (None, true) => ViewStatus::Empty,
            (None, false) => ViewStatus::Ready,
        };
        metrics::counter!("engine_dispatches_total", 1u64);
        metrics::histogram!("engine_dispatch_ms", t0.elapsed().as_secs_f64() * 1_000.0);
        info!(revision = self.revision, total = self.results.len(), signature = %sig, took_ms = %t0.elapsed().as_millis(), "engine: results");
        self.signature = Some(sig);
        self.emit();
    }

    fn emit(&self) {
        let facets = self.facets.clone();
        let view = EngineView {
            status: self.status,
            error: self.error.clone(),
            revision: self.revision,
            epoch: self.snapshot.epoch,
            signature: self.signature.clone().unwrap_or_else(|| facets.signature()),
            facets,
            total: self.results.len(),
            window: self.window.visible(),
            has_more: self.window.has_more(),
            snapshot: Arc::clone(&self.snapshot),
            results: Arc::clone(&self.results),
            pager: self.window.clone(),
        };
        self.view_tx.send_replace(view.clone());
        // listeners may register more listeners; never call them under the lock
        let listeners: Vec<Listener> = self.listeners.lock().unwrap_or_else(|e| e.into_inner()).clone();
        for l in &listeners {
            l(&view);
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.debounce, Duration::from_millis(300));
        assert_eq!((c.page_size, c.page_increment), (16, 16));
        assert!(c.cache_cap.is_none());
    }

    #[test]
    fn loading_view_is_empty() {
        let v = EngineView::loading();
        assert_eq!(v.status, ViewStatus::Loading);
        assert!(v.page_ids().is_empty());
        assert_eq!(v.page().count(), 0);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["status"], "loading");
    }
}
