//! Pixelynth item store: shapes provider records into items and publishes
//! them as an atomically swapped snapshot.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use pixelynth_core::{CatalogError, CatalogResult, CatalogSnapshot, CreatedAt, Item, Orientation, PeopleCount};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub mod provider;

pub use provider::{FetchError, ItemProvider, JsonFileProvider, StaticProvider};

/// Shape one raw provider record. Never fails: unusable fields fall back to
/// their empty value and a missing id leaves the item malformed.
pub fn shape_item(raw: &Value) -> Item {
    let id = match raw.get("id") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let people = PeopleCount {
        people_count: raw.get("peopleCount").and_then(count_u32),
        number_of_people: raw.get("numberOfPeople").and_then(count_u32),
        people: raw.get("people").and_then(count_u32),
    };
    Item {
        id,
        title: str_field(raw, "title").unwrap_or_default(),
        description: str_field(raw, "description").or_else(|| str_field(raw, "desc")).unwrap_or_default(),
        tags: str_list(raw.get("tags")).into_iter().collect(),
        category: str_field(raw, "category").map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        categories: str_list(raw.get("categories")).into_iter().collect(),
        color: str_field(raw, "color").map(|s| s.trim().to_ascii_lowercase()).filter(|s| !s.is_empty()),
        orientation: str_field(raw, "orientation").as_deref().and_then(Orientation::parse),
        people,
        favorite_count: raw.get("favoriteCount").and_then(count_u64).unwrap_or(0),
        created_at: raw.get("createdAt").and_then(created_at).or_else(|| raw.get("timestamp").and_then(created_at)),
    }
}

/// Shape a whole fetch into a snapshot for `epoch`.
pub fn shape_records(epoch: u64, records: &[Value]) -> CatalogSnapshot {
    let items: Vec<Item> = records.iter().map(shape_item).collect();
    let snap = CatalogSnapshot::new(epoch, items);
    let malformed = snap.malformed();
    if malformed > 0 {
        debug!(epoch, malformed, "store: records without id will be skipped");
    }
    metrics::gauge!("catalog_items", snap.items.len() as f64);
    metrics::gauge!("catalog_malformed_items", malformed as f64);
    snap
}

fn str_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

fn str_list(v: Option<&Value>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(Value::Array(vals)) = v {
        for s in vals.iter().filter_map(|v| v.as_str()) {
            let s = s.trim();
            if !s.is_empty() {
                out.push(s.to_string());
            }
        }
    }
    out
}

fn count_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn count_u32(v: &Value) -> Option<u32> { count_u64(v).and_then(|n| u32::try_from(n).ok()) }

fn created_at(v: &Value) -> Option<CreatedAt> {
    match v {
        Value::Object(map) => {
            let seconds = map.get("seconds").or_else(|| map.get("_seconds")).and_then(|s| s.as_i64())?;
            let nanoseconds = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(|n| n.as_u64())
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            Some(CreatedAt::Wrapper { seconds, nanoseconds })
        }
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).map(CreatedAt::Millis),
        Value::String(s) if !s.trim().is_empty() => Some(CreatedAt::Text(s.clone())),
        _ => None,
    }
}

/// Read side of the store; cheap to clone and hand to other tasks.
#[derive(Clone)]
pub struct StoreHandle {
    snap: Arc<ArcSwap<CatalogSnapshot>>,
    epoch_rx: watch::Receiver<u64>,
}

impl StoreHandle {
    pub fn current(&self) -> Arc<CatalogSnapshot> { self.snap.load_full() }
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }
}

/// Holds the full, unfiltered catalog fetched through an [`ItemProvider`].
pub struct ItemStore {
    provider: Arc<dyn ItemProvider>,
    snap: Arc<ArcSwap<CatalogSnapshot>>,
    next_epoch: AtomicU64,
    epoch_tx: watch::Sender<u64>,
    epoch_rx: watch::Receiver<u64>,
}

impl ItemStore {
    pub fn new(provider: Arc<dyn ItemProvider>) -> Self {
        let (epoch_tx, epoch_rx) = watch::channel(0u64);
        Self {
            provider,
            snap: Arc::new(ArcSwap::from_pointee(CatalogSnapshot::default())),
            next_epoch: AtomicU64::new(0),
            epoch_tx,
            epoch_rx,
        }
    }

    /// Current snapshot. Epoch 0 means nothing was loaded yet.
    pub fn current(&self) -> Arc<CatalogSnapshot> { self.snap.load_full() }

    pub fn handle(&self) -> StoreHandle {
        StoreHandle { snap: Arc::clone(&self.snap), epoch_rx: self.epoch_rx.clone() }
    }

    /// One bulk fetch. On failure an empty snapshot replaces the current one
    /// and the error is returned; there is no retry.
    pub async fn load(&self) -> CatalogResult<Arc<CatalogSnapshot>> {
        let t0 = Instant::now();
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        match self.provider.fetch_all_items().await {
            Ok(records) => {
                let next = Arc::new(shape_records(epoch, &records));
                self.publish(Arc::clone(&next));
                info!(epoch, items = next.items.len(), took_ms = %t0.elapsed().as_millis(), "store: load ok");
                Ok(next)
            }
            Err(e) => {
                metrics::counter!("catalog_fetch_failures_total", 1u64);
                warn!(epoch, error = %e, took_ms = %t0.elapsed().as_millis(), "store: load failed; serving empty catalog");
                self.publish(Arc::new(CatalogSnapshot::new(epoch, Vec::new())));
                Err(CatalogError::Fetch(e.to_string()))
            }
        }
    }

    /// Fetch again and swap the snapshot in one step.
    pub async fn reload(&self) -> CatalogResult<Arc<CatalogSnapshot>> {
        info!(epoch = self.current().epoch, "store: reload requested");
        self.load().await
    }

    fn publish(&self, next: Arc<CatalogSnapshot>) {
        let epoch = next.epoch;
        self.snap.store(next);
        let _ = self.epoch_tx.send(epoch);
    }
}
