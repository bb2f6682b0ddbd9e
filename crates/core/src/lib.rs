//! Pixelynth core types: catalog items, snapshots, facets and errors.

#![forbid(unsafe_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod facets;

pub use facets::{
    search_terms, FacetName, FacetState, FacetUpdate, OrientationFacet, PeopleFacet, QuerySignature,
    SortMode, COLOR_PALETTE,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
    Square,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [Orientation::Horizontal, Orientation::Vertical, Orientation::Square];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "horizontal" => Some(Self::Horizontal),
            "vertical" => Some(Self::Vertical),
            "square" => Some(Self::Square),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
            Self::Square => "square",
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

/// People count as found on the record. Older uploads stored the same value
/// under different keys; all of them are kept and resolved at match time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeopleCount {
    pub people_count: Option<u32>,
    pub number_of_people: Option<u32>,
    pub people: Option<u32>,
}

impl PeopleCount {
    pub fn exact(n: u32) -> Self { Self { people_count: Some(n), ..Self::default() } }

    /// First defined synonym, in `peopleCount`, `numberOfPeople`, `people` order.
    pub fn resolve(&self) -> Option<u32> {
        self.people_count.or(self.number_of_people).or(self.people)
    }
}

/// Creation time in whichever shape the provider stored it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CreatedAt {
    /// Provider temporal wrapper.
    Wrapper { seconds: i64, nanoseconds: u32 },
    /// Epoch milliseconds.
    Millis(i64),
    /// RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
    Text(String),
}

impl CreatedAt {
    /// Normalize to a UTC instant; `None` when the value cannot be interpreted.
    pub fn to_date(&self) -> Option<DateTime<Utc>> {
        match self {
            CreatedAt::Wrapper { seconds, nanoseconds } => Utc.timestamp_opt(*seconds, *nanoseconds).single(),
            CreatedAt::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            CreatedAt::Text(s) => {
                let s = s.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.with_timezone(&Utc));
                }
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }
        }
    }
}

/// One media item of the catalog. Never mutated once shaped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: SmallVec<[String; 8]>,
    /// Primary category.
    pub category: Option<String>,
    /// Secondary categories chosen at upload time.
    pub categories: SmallVec<[String; 4]>,
    pub color: Option<String>,
    pub orientation: Option<Orientation>,
    #[serde(flatten)]
    pub people: PeopleCount,
    pub favorite_count: u64,
    pub created_at: Option<CreatedAt>,
}

impl Item {
    /// Items without an identity never reach a result set.
    pub fn is_malformed(&self) -> bool { self.id.trim().is_empty() }

    pub fn people_count(&self) -> Option<u32> { self.people.resolve() }

    pub fn created_date(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_ref().and_then(CreatedAt::to_date)
    }

    pub fn in_category(&self, category: &str) -> bool {
        self.category.as_deref() == Some(category) || self.categories.iter().any(|c| c == category)
    }
}

/// Immutable view of the whole catalog as loaded by one bulk fetch.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogSnapshot {
    /// Bumped on every load, successful or not.
    pub epoch: u64,
    pub items: Vec<Item>,
}

impl CatalogSnapshot {
    pub fn new(epoch: u64, items: Vec<Item>) -> Self { Self { epoch, items } }

    pub fn malformed(&self) -> usize { self.items.iter().filter(|it| it.is_malformed()).count() }
}

/// Errors crossing the engine boundary.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum CatalogError {
    #[error("fetch: {0}")]
    Fetch(String),
    #[error("invalid value {value:?} for facet {facet}")]
    InvalidFacet { facet: FacetName, value: String },
    #[error("unknown facet: {0}")]
    UnknownFacet(String),
    #[error("engine closed")]
    Closed,
}

pub type CatalogResult<T> = Result<T, CatalogError>;

pub mod prelude {
    pub use super::{
        CatalogError, CatalogResult, CatalogSnapshot, CreatedAt, FacetName, FacetState, FacetUpdate, Item,
        Orientation, OrientationFacet, PeopleCount, PeopleFacet, QuerySignature, SortMode,
    };
}
