#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pixelynth_api::{CatalogEngine, EngineConfig, EngineHandle, EngineView, ViewStatus};
use pixelynth_core::{CatalogError, PeopleFacet, SortMode};
use pixelynth_store::StaticProvider;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

fn ms(n: u64) -> Duration { Duration::from_millis(n) }

fn cars() -> Vec<Value> {
    vec![
        json!({"id": 1, "title": "Red car", "tags": ["car"], "category": "Auto", "color": "red",
               "orientation": "horizontal", "peopleCount": 0, "favoriteCount": 5}),
        json!({"id": 2, "title": "Blue car", "tags": ["car"], "category": "Auto", "color": "blue",
               "orientation": "vertical", "peopleCount": 1, "favoriteCount": 9}),
    ]
}

fn photos(n: usize) -> Vec<Value> {
    (0..n).map(|i| json!({"id": format!("p{i}"), "title": format!("Photo {i}")})).collect()
}

async fn settled(handle: &EngineHandle) -> EngineView {
    let mut rx = handle.subscribe();
    loop {
        let v = rx.borrow_and_update().clone();
        if v.status != ViewStatus::Loading {
            return v;
        }
        rx.changed().await.unwrap();
    }
}

async fn next_view(rx: &mut watch::Receiver<EngineView>) -> EngineView {
    rx.changed().await.unwrap();
    rx.borrow_and_update().clone()
}

#[tokio::test(start_paused = true)]
async fn initial_load_is_ready() {
    let handle = CatalogEngine::spawn(Arc::new(StaticProvider::new(cars())), EngineConfig::default());
    let v = settled(&handle).await;
    assert_eq!(v.status, ViewStatus::Ready);
    assert_eq!(v.total, 2);
    assert_eq!(v.epoch, 1);
    let ids: Vec<&str> = v.page().map(|it| it.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test(start_paused = true)]
async fn debounced_text_fires_once_with_last_value() {
    let handle = CatalogEngine::spawn(Arc::new(StaticProvider::new(cars())), EngineConfig::default());
    let before = settled(&handle).await;

    let t0 = Instant::now();
    let fired: Arc<Mutex<Vec<(Duration, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    handle.on_results_changed(move |v| sink.lock().unwrap().push((t0.elapsed(), v.signature.text.clone())));

    handle.set_search_text("r").await.unwrap();
    sleep(ms(50)).await;
    handle.set_search_text("re").await.unwrap();
    sleep(ms(50)).await;
    handle.set_search_text("red").await.unwrap();
    sleep(ms(150)).await;
    handle.set_search_text("Red car").await.unwrap();

    sleep(ms(299)).await;
    assert!(fired.lock().unwrap().is_empty(), "nothing may fire before the quiet period ends");

    sleep(ms(51)).await;
    let fired = fired.lock().unwrap().clone();
    assert_eq!(fired.len(), 1);
    let (at, text) = &fired[0];
    assert!(*at >= ms(550) && *at < ms(552), "fired at {:?}", at);
    assert_eq!(text, "red car");

    let v = handle.view();
    assert_eq!(v.revision, before.revision + 1);
    assert_eq!(v.total, 1);
    assert_eq!(v.facets.search_text, "Red car");
}

#[tokio::test(start_paused = true)]
async fn facet_change_fires_immediately_and_keeps_pending_text() {
    let handle = CatalogEngine::spawn(Arc::new(StaticProvider::new(cars())), EngineConfig::default());
    settled(&handle).await;
    let mut rx = handle.subscribe();
    rx.borrow_and_update();

    let t0 = Instant::now();
    handle.set_search_text("blue").await.unwrap();
    handle.set_facet("selectedColor", "red").await.unwrap();
    let v = next_view(&mut rx).await;
    assert_eq!(Instant::now(), t0);
    assert_eq!(v.signature.color, "red");
    assert_eq!(v.signature.text, "");
    assert_eq!(v.total, 1);

    // pending text still lands and combines with the color
    let v = next_view(&mut rx).await;
    assert_eq!(v.signature.text, "blue");
    assert_eq!(v.status, ViewStatus::Empty);
}

#[tokio::test(start_paused = true)]
async fn popular_sort_through_engine() {
    let handle = CatalogEngine::spawn(Arc::new(StaticProvider::new(cars())), EngineConfig::default());
    settled(&handle).await;
    let mut rx = handle.subscribe();
    rx.borrow_and_update();
    handle.set_facet("sort", "popular").await.unwrap();
    let v = next_view(&mut rx).await;
    assert_eq!(v.facets.sort, SortMode::Popular);
    let ids: Vec<&str> = v.page().map(|it| it.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "1"]);
}

#[tokio::test(start_paused = true)]
async fn invalid_facet_is_rejected_and_prior_value_kept() {
    let handle = CatalogEngine::spawn(Arc::new(StaticProvider::new(cars())), EngineConfig::default());
    settled(&handle).await;
    let mut rx = handle.subscribe();
    rx.borrow_and_update();
    handle.set_facet("people", "1").await.unwrap();
    let v = next_view(&mut rx).await;
    assert_eq!(v.facets.people, PeopleFacet::Exactly(1));

    let err = handle.set_facet("people", "several").await.unwrap_err();
    assert!(matches!(err, CatalogError::InvalidFacet { .. }));
    let err = handle.set_facet("mood", "happy").await.unwrap_err();
    assert!(matches!(err, CatalogError::UnknownFacet(_)));

    sleep(ms(10)).await;
    let v = handle.view();
    assert_eq!(v.facets.people, PeopleFacet::Exactly(1));
    assert_eq!(v.total, 1);
}

#[tokio::test(start_paused = true)]
async fn clear_filters_keeps_category() {
    let handle = CatalogEngine::spawn(Arc::new(StaticProvider::new(cars())), EngineConfig::default());
    settled(&handle).await;
    handle.set_facet("category", "Auto").await.unwrap();
    handle.set_facet("color", "blue").await.unwrap();
    handle.set_facet("sort", "newest").await.unwrap();
    handle.clear_filters().await.unwrap();
    sleep(ms(10)).await;
    let v = handle.view();
    assert_eq!(v.facets.category, "Auto");
    assert_eq!(v.facets.color, "");
    assert_eq!(v.facets.sort, SortMode::Relevance);
    assert_eq!(v.total, 2);
}

#[tokio::test(start_paused = true)]
async fn request_more_grows_window_and_is_dropped_while_text_pending() {
    let handle = CatalogEngine::spawn(Arc::new(StaticProvider::new(photos(40))), EngineConfig::default());
    let v = settled(&handle).await;
    assert_eq!((v.window, v.total, v.has_more), (16, 40, true));
    assert_eq!(v.page_ids().len(), 16);

    // whitespace normalizes to the current signature, so the settle is a no-op
    handle.set_search_text("   ").await.unwrap();
    handle.request_more().await.unwrap();
    sleep(ms(10)).await;
    assert_eq!(handle.view().window, 16);
    sleep(ms(400)).await;
    let v = handle.view();
    assert_eq!(v.window, 16);
    assert_eq!(v.revision, 1);

    let mut rx = handle.subscribe();
    rx.borrow_and_update();
    handle.request_more().await.unwrap();
    assert_eq!(next_view(&mut rx).await.window, 32);
    handle.request_more().await.unwrap();
    let v = next_view(&mut rx).await;
    assert_eq!((v.window, v.has_more), (40, false));
    assert_eq!(v.page().count(), 40);
}

#[tokio::test(start_paused = true)]
async fn request_more_queued_behind_reload_applies_to_fresh_set() {
    let provider = Arc::new(StaticProvider::new(photos(40)));
    let handle = CatalogEngine::spawn(provider.clone(), EngineConfig::default());
    settled(&handle).await;
    handle.request_more().await.unwrap();
    sleep(ms(10)).await;
    assert_eq!(handle.view().window, 32);

    provider.set_records(photos(50));
    let (reloaded, more) = tokio::join!(handle.reload(), handle.request_more());
    reloaded.unwrap();
    more.unwrap();
    sleep(ms(10)).await;
    let v = handle.view();
    assert_eq!(v.epoch, 2);
    assert_eq!(v.total, 50);
    assert_eq!(v.window, 32);
    assert_eq!(v.page_ids().len(), 32);
    assert_eq!(handle.snapshot().items.len(), 50);
}

#[tokio::test(start_paused = true)]
async fn fetch_failure_is_error_not_empty() {
    let provider = Arc::new(StaticProvider::failing("connection refused"));
    let handle = CatalogEngine::spawn(provider.clone(), EngineConfig::default());
    let v = settled(&handle).await;
    assert_eq!(v.status, ViewStatus::Error);
    assert!(matches!(v.error, Some(CatalogError::Fetch(_))));
    assert_eq!(v.total, 0);
    assert_eq!(provider.calls(), 1, "no automatic retry");

    provider.set_records(cars());
    handle.reload().await.unwrap();
    let v = handle.view();
    assert_eq!(v.status, ViewStatus::Ready);
    assert!(v.error.is_none());
    assert_eq!(v.total, 2);

    provider.set_failure("timeout");
    let err = handle.reload().await.unwrap_err();
    assert!(matches!(err, CatalogError::Fetch(_)));
    let v = handle.view();
    assert_eq!(v.status, ViewStatus::Error);
    assert_eq!(v.total, 0);
}

#[tokio::test(start_paused = true)]
async fn no_match_is_empty_status() {
    let handle = CatalogEngine::spawn(Arc::new(StaticProvider::new(cars())), EngineConfig::default());
    settled(&handle).await;
    let mut rx = handle.subscribe();
    rx.borrow_and_update();
    handle.set_search_text("zebra").await.unwrap();
    let v = next_view(&mut rx).await;
    assert_eq!(v.status, ViewStatus::Empty);
    assert!(v.error.is_none());
    assert!(!v.has_more);
}

#[tokio::test(start_paused = true)]
async fn listener_can_register_listeners() {
    let handle = CatalogEngine::spawn(Arc::new(StaticProvider::new(cars())), EngineConfig::default());
    settled(&handle).await;

    let inner_calls = Arc::new(AtomicUsize::new(0));
    let registered = Arc::new(AtomicBool::new(false));
    let nested = handle.clone();
    let calls = Arc::clone(&inner_calls);
    handle.on_results_changed(move |_| {
        if !registered.swap(true, Ordering::SeqCst) {
            let calls = Arc::clone(&calls);
            nested.on_results_changed(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    handle.set_facet("sort", "popular").await.unwrap();
    let reloaded = tokio::time::timeout(Duration::from_secs(2), handle.reload()).await;
    assert!(matches!(reloaded, Ok(Ok(()))), "engine stopped answering: {:?}", reloaded);
    assert!(inner_calls.load(Ordering::SeqCst) > 0);
    assert_eq!(handle.view().facets.sort, SortMode::Popular);
}
