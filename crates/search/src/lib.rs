//! Pixelynth search: in-RAM posting-list index and facet query over a
//! catalog snapshot. Survivors keep snapshot order unless a sort is chosen.

#![forbid(unsafe_code)]

use std::time::Instant;

use chrono::{DateTime, Utc};
use pixelynth_core::{search_terms, CatalogSnapshot, FacetState, Orientation, OrientationFacet, PeopleFacet, SortMode};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

pub mod cache;

pub use cache::ResultCache;

/// Position of an item inside the snapshot the index was built from.
pub type DocId = u32;

/// Candidate counts after each filter stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueryDebugInfo {
    pub total: usize,
    pub malformed: usize,
    pub after_text: usize,
    pub after_category: usize,
    pub after_color: usize,
    pub after_orientation: usize,
    pub after_people: usize,
}

/// Distinct facet values present in a snapshot with their item counts.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FacetCounts {
    pub categories: Vec<(String, usize)>,
    pub colors: Vec<(String, usize)>,
    pub orientations: Vec<(Orientation, usize)>,
    pub people: Vec<(u32, usize)>,
    pub malformed: usize,
}

pub struct Index {
    epoch: u64,
    total: usize,
    // Well-formed docs in snapshot order
    docs: Vec<DocId>,
    // Sort keys, indexed by DocId
    favorites: Vec<u64>,
    created: Vec<Option<DateTime<Utc>>>,
    // word or whole tag -> docs
    term_post: FxHashMap<String, Vec<DocId>>,
    // primary or secondary category -> docs
    category_post: FxHashMap<String, Vec<DocId>>,
    color_post: FxHashMap<String, Vec<DocId>>,
    orientation_post: FxHashMap<Orientation, Vec<DocId>>,
    people_post: FxHashMap<u32, Vec<DocId>>,
}

/// Split text into lowercase words: maximal runs of alphanumeric chars.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).map(|w| w.to_lowercase())
}

fn intersect_sorted(a: &[DocId], b: &[DocId]) -> Vec<DocId> {
    let mut i = 0usize;
    let mut j = 0usize;
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => { out.push(a[i]); i += 1; j += 1; }
        }
    }
    out
}

fn narrow(candidates: &mut Vec<DocId>, post: Option<&Vec<DocId>>) {
    match post {
        Some(post) => *candidates = intersect_sorted(candidates, post),
        None => candidates.clear(),
    }
}

impl Index {
    pub fn build_from_snapshot(snap: &CatalogSnapshot) -> Self {
        let started = Instant::now();
        let n = snap.items.len();
        let mut idx = Index {
            epoch: snap.epoch,
            total: n,
            docs: Vec::with_capacity(n),
            favorites: Vec::with_capacity(n),
            created: Vec::with_capacity(n),
            term_post: FxHashMap::default(),
            category_post: FxHashMap::default(),
            color_post: FxHashMap::default(),
            orientation_post: FxHashMap::default(),
            people_post: FxHashMap::default(),
        };

        let mut terms: FxHashSet<String> = FxHashSet::default();
        let mut cats: FxHashSet<&str> = FxHashSet::default();
        for (i, item) in snap.items.iter().enumerate() {
            let doc = i as DocId;
            idx.favorites.push(item.favorite_count);
            idx.created.push(item.created_date());
            if item.is_malformed() {
                continue;
            }
            idx.docs.push(doc);

            // dedup per doc so postings stay strictly increasing
            terms.clear();
            // runs cover "york", trimmed tokens cover "new-york"
            for text in [&item.title, &item.description] {
                terms.extend(words(text));
                terms.extend(search_terms(text));
            }
            terms.extend(item.tags.iter().map(|t| t.to_lowercase()));
            for t in terms.drain() {
                idx.term_post.entry(t).or_default().push(doc);
            }

            cats.clear();
            cats.extend(item.category.as_deref());
            cats.extend(item.categories.iter().map(|c| c.as_str()));
            for c in cats.drain() {
                idx.category_post.entry(c.to_string()).or_default().push(doc);
            }

            if let Some(color) = item.color.as_deref() {
                idx.color_post.entry(color.to_string()).or_default().push(doc);
            }
            if let Some(o) = item.orientation {
                idx.orientation_post.entry(o).or_default().push(doc);
            }
            if let Some(p) = item.people_count() {
                idx.people_post.entry(p).or_default().push(doc);
            }
        }

        let malformed = n - idx.docs.len();
        metrics::gauge!("index_docs", idx.docs.len() as f64);
        metrics::gauge!("index_terms", idx.term_post.len() as f64);
        debug!(epoch = idx.epoch, docs = idx.docs.len(), malformed, terms = idx.term_post.len(), took_ms = %started.elapsed().as_millis(), "index built");
        idx
    }

    /// Epoch of the snapshot this index was built from.
    pub fn epoch(&self) -> u64 { self.epoch }

    /// Number of searchable (well-formed) docs.
    pub fn len(&self) -> usize { self.docs.len() }

    pub fn is_empty(&self) -> bool { self.docs.is_empty() }

    pub fn query(&self, facets: &FacetState) -> Vec<DocId> { self.query_with_debug(facets).0 }

    /// Filter then sort. Every stage is an intersection of sorted postings,
    /// so the filtered order is always snapshot order.
    pub fn query_with_debug(&self, facets: &FacetState) -> (Vec<DocId>, QueryDebugInfo) {
        let started = Instant::now();
        let mut candidates = self.docs.clone();

        for term in facets.terms() {
            if candidates.is_empty() { break; }
            narrow(&mut candidates, self.term_post.get(&term));
        }
        let after_text = candidates.len();

        let category = facets.category.trim();
        if !category.is_empty() && !category.eq_ignore_ascii_case("all") {
            narrow(&mut candidates, self.category_post.get(category));
        }
        let after_category = candidates.len();

        let color = facets.color.trim();
        if !color.is_empty() && !color.eq_ignore_ascii_case("all") {
            narrow(&mut candidates, self.color_post.get(&color.to_ascii_lowercase()));
        }
        let after_color = candidates.len();

        if let OrientationFacet::Only(o) = facets.orientation {
            narrow(&mut candidates, self.orientation_post.get(&o));
        }
        let after_orientation = candidates.len();

        if let PeopleFacet::Exactly(p) = facets.people {
            narrow(&mut candidates, self.people_post.get(&p));
        }
        let after_people = candidates.len();

        // sort_by is stable: ties keep filter order
        match facets.sort {
            SortMode::Relevance => {}
            SortMode::Popular => candidates.sort_by(|a, b| self.favorites[*b as usize].cmp(&self.favorites[*a as usize])),
            SortMode::Newest => candidates.sort_by(|a, b| self.created[*b as usize].cmp(&self.created[*a as usize])),
        }

        let dbg = QueryDebugInfo {
            total: self.total,
            malformed: self.total - self.docs.len(),
            after_text,
            after_category,
            after_color,
            after_orientation,
            after_people,
        };
        metrics::histogram!("query_eval_ms", started.elapsed().as_secs_f64() * 1_000.0);
        metrics::histogram!("query_results", candidates.len() as f64);
        (candidates, dbg)
    }

    pub fn facet_counts(&self) -> FacetCounts {
        fn counted<K: Clone + Ord>(m: &FxHashMap<K, Vec<DocId>>) -> Vec<(K, usize)> {
            let mut out: Vec<(K, usize)> = m.iter().map(|(k, v)| (k.clone(), v.len())).collect();
            out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            out
        }
        FacetCounts {
            categories: counted(&self.category_post),
            colors: counted(&self.color_post),
            orientations: counted(&self.orientation_post),
            people: counted(&self.people_post),
            malformed: self.total - self.docs.len(),
        }
    }
}

/// One-shot evaluation: build an index over `snap` and run `facets` on it.
pub fn run(snap: &CatalogSnapshot, facets: &FacetState) -> Vec<DocId> {
    Index::build_from_snapshot(snap).query(facets)
}
