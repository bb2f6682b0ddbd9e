#![forbid(unsafe_code)]

use pixelynth_core::{CatalogSnapshot, FacetState, FacetUpdate, OrientationFacet, PeopleFacet, SortMode};
use pixelynth_search::{run, DocId, Index, ResultCache};
use pixelynth_store::shape_records;

fn cars() -> CatalogSnapshot {
    let records = vec![
        serde_json::json!({
            "id": 1, "title": "Red car", "tags": ["car"], "category": "Auto", "color": "red",
            "orientation": "horizontal", "peopleCount": 0, "favoriteCount": 5
        }),
        serde_json::json!({
            "id": 2, "title": "Blue car", "tags": ["car"], "category": "Auto", "color": "blue",
            "orientation": "vertical", "peopleCount": 1, "favoriteCount": 9
        }),
    ];
    shape_records(1, &records)
}

fn ids(snap: &CatalogSnapshot, docs: &[DocId]) -> Vec<String> {
    docs.iter().map(|d| snap.items[*d as usize].id.clone()).collect()
}

fn with(updates: &[(&str, &str)]) -> FacetState {
    let mut state = FacetState::default();
    for (name, value) in updates {
        state.apply(FacetUpdate::parse(name, value).unwrap());
    }
    state
}

#[test]
fn color_filter_keeps_red_car_only() {
    let snap = cars();
    let out = run(&snap, &with(&[("selectedColor", "red")]));
    assert_eq!(ids(&snap, &out), vec!["1"]);
}

#[test]
fn popular_sort_orders_by_favorites() {
    let snap = cars();
    let out = run(&snap, &with(&[("selectedSort", "popular")]));
    assert_eq!(ids(&snap, &out), vec!["2", "1"]);
}

#[test]
fn facets_combine_with_and() {
    let snap = cars();
    let idx = Index::build_from_snapshot(&snap);
    let mut f = with(&[("category", "Auto"), ("orientation", "vertical")]);
    f.search_text = "car".into();
    assert_eq!(ids(&snap, &idx.query(&f)), vec!["2"]);

    // defined zero matches a zero filter
    let zero = FacetState { people: PeopleFacet::Exactly(0), ..FacetState::default() };
    assert_eq!(ids(&snap, &idx.query(&zero)), vec!["1"]);

    let none = with(&[("category", "Auto"), ("color", "red"), ("orientation", "vertical")]);
    let (hits, dbg) = idx.query_with_debug(&none);
    assert!(hits.is_empty());
    assert_eq!((dbg.after_category, dbg.after_color, dbg.after_orientation), (2, 1, 0));
}

#[test]
fn all_values_are_identity() {
    let snap = cars();
    let f = with(&[("color", "all"), ("people", "all"), ("orientation", "all"), ("selectedCategory", "all")]);
    assert_eq!(f.orientation, OrientationFacet::All);
    assert_eq!(f.category, "");
    assert_eq!(run(&snap, &f).len(), 2);

    // "All Categories" after a specific category widens back out
    let narrowed = with(&[("category", "Travel")]);
    assert!(run(&snap, &narrowed).is_empty());
    let widened = with(&[("category", "Travel"), ("category", "All")]);
    assert_eq!(run(&snap, &widened).len(), 2);

    // a raw state carrying `all` is still no filter
    let raw = FacetState { category: "all".into(), ..FacetState::default() };
    assert_eq!(run(&snap, &raw).len(), 2);
}

#[test]
fn evaluation_is_deterministic() {
    let records: Vec<serde_json::Value> = (0..200)
        .map(|i: i64| {
            let title = if i % 2 == 0 { "Beach sunset" } else { "City street" };
            let color = ["red", "blue", "green"][(i % 3) as usize];
            serde_json::json!({
                "id": format!("p{i}"),
                "title": title,
                "favoriteCount": i % 7,
                "createdAt": 1_600_000_000_000i64 + (i % 13) * 1000,
                "color": color,
            })
        })
        .collect();
    let snap = shape_records(3, &records);
    let idx = Index::build_from_snapshot(&snap);
    for sort in [SortMode::Relevance, SortMode::Popular, SortMode::Newest] {
        let f = FacetState { search_text: "sunset".into(), sort, ..FacetState::default() };
        let a = idx.query(&f);
        let b = Index::build_from_snapshot(&snap).query(&f);
        assert_eq!(a, b);
        assert_eq!(a.len(), 100);
    }
}

#[test]
fn cache_rehits_after_facet_revert() {
    let snap = cars();
    let idx = Index::build_from_snapshot(&snap);
    let mut cache = ResultCache::unbounded();
    let mut computes = 0;

    let mut state = FacetState::default();
    let first = state.signature();
    cache.get_or_compute(snap.epoch, &first, || { computes += 1; idx.query(&state) });

    state.apply(FacetUpdate::parse("color", "blue").unwrap());
    let blue = state.clone();
    cache.get_or_compute(snap.epoch, &blue.signature(), || { computes += 1; idx.query(&blue) });

    state.apply(FacetUpdate::parse("color", "").unwrap());
    assert_eq!(state.signature(), first);
    let back = cache.get_or_compute(snap.epoch, &state.signature(), || { computes += 1; Vec::new() });
    assert_eq!(computes, 2);
    assert_eq!(back.len(), 2);

    // new epoch forces a recompute
    cache.get_or_compute(snap.epoch + 1, &state.signature(), || { computes += 1; Vec::new() });
    assert_eq!(computes, 3);
}
