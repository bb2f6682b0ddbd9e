use pixelynth_core::{CatalogSnapshot, CreatedAt, FacetState, Item, Orientation, OrientationFacet, PeopleCount, PeopleFacet, SortMode};
use pixelynth_search::Index;
use std::time::Instant;

const WORDS: &[&str] = &["sunset", "car", "beach", "city", "forest", "party", "portrait", "mountain", "river", "street"];
const CATEGORIES: &[&str] = &["Nature", "Auto", "People", "Travel", "Food"];
const COLORS: &[&str] = &["red", "blue", "green", "yellow", "blackwhite"];

fn gen_item(i: usize) -> Item {
    let mut it = Item {
        id: format!("item-{i:06}"),
        title: format!("{} {}", WORDS[i % WORDS.len()], WORDS[(i / 7) % WORDS.len()]),
        description: format!("shot {} near the {}", i, WORDS[(i / 3) % WORDS.len()]),
        category: Some(CATEGORIES[i % CATEGORIES.len()].to_string()),
        color: Some(COLORS[i % COLORS.len()].to_string()),
        orientation: Some(Orientation::ALL[i % 3]),
        people: PeopleCount::exact((i % 5) as u32),
        favorite_count: (i * 31 % 997) as u64,
        created_at: Some(CreatedAt::Millis(1_577_836_800_000 + i as i64 * 60_000)),
        ..Item::default()
    };
    it.tags.push(WORDS[(i / 11) % WORDS.len()].to_string());
    it
}

fn percentile_us(xs: &mut [u128], p: f64) -> u128 {
    xs.sort_unstable();
    let idx = ((xs.len() as f64 - 1.0) * p).round() as usize;
    xs[idx]
}

fn main() {
    let n: usize = std::env::var("PIXELYNTH_BENCH_DOCS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(100_000);

    eprintln!("building snapshot: {} items", n);
    let t0 = Instant::now();
    let snap = CatalogSnapshot::new(1, (0..n).map(gen_item).collect());
    let build_snap_ms = t0.elapsed().as_secs_f64() * 1_000.0;

    eprintln!("building index...");
    let t1 = Instant::now();
    let index = Index::build_from_snapshot(&snap);
    let build_idx_ms = t1.elapsed().as_secs_f64() * 1_000.0;

    let text_only: Vec<FacetState> = WORDS
        .iter()
        .map(|w| FacetState { search_text: (*w).to_string(), ..FacetState::default() })
        .collect();
    let faceted: Vec<FacetState> = (0..50)
        .map(|i| FacetState {
            search_text: WORDS[i % WORDS.len()].to_string(),
            category: CATEGORIES[i % CATEGORIES.len()].to_string(),
            color: COLORS[i % COLORS.len()].to_string(),
            people: PeopleFacet::Exactly((i % 5) as u32),
            orientation: OrientationFacet::Only(Orientation::ALL[i % 3]),
            ..FacetState::default()
        })
        .collect();
    let sorted: Vec<FacetState> = [SortMode::Popular, SortMode::Newest]
        .iter()
        .map(|s| FacetState { sort: *s, ..FacetState::default() })
        .collect();

    let run = |label: &str, qs: &[FacetState]| {
        let mut times: Vec<u128> = Vec::with_capacity(qs.len());
        let mut hits = 0usize;
        for q in qs {
            let t = Instant::now();
            hits += index.query(q).len();
            times.push(t.elapsed().as_micros());
        }
        let p50 = percentile_us(&mut times.clone(), 0.50) as f64 / 1000.0;
        let p99 = percentile_us(&mut times, 0.99) as f64 / 1000.0;
        println!("{}: p50={:.3}ms p99={:.3}ms ({} queries, {} hits)", label, p50, p99, qs.len(), hits);
    };

    println!("index_build: snapshot={:.1}ms index={:.1}ms docs={}", build_snap_ms, build_idx_ms, index.len());
    run("text", &text_only);
    run("faceted", &faceted);
    run("sorted_full", &sorted);
}
