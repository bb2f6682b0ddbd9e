//! Facet state, facet updates and the canonical query signature.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CatalogError, CatalogResult, Orientation};

/// Colors offered by the upload form. `all` means "no color filter".
pub const COLOR_PALETTE: &[&str] = &[
    "blackwhite", "red", "blue", "green", "yellow", "violet", "orange", "pink", "brown", "all",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacetName {
    Category,
    Color,
    People,
    Orientation,
    Sort,
}

impl FacetName {
    /// Accepts both short names and the gallery's `selectedX` state names.
    pub fn parse(name: &str) -> CatalogResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "category" | "selectedcategory" => Ok(Self::Category),
            "color" | "selectedcolor" => Ok(Self::Color),
            "people" | "selectedpeople" => Ok(Self::People),
            "orientation" | "selectedorientation" => Ok(Self::Orientation),
            "sort" | "selectedsort" => Ok(Self::Sort),
            _ => Err(CatalogError::UnknownFacet(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Color => "color",
            Self::People => "people",
            Self::Orientation => "orientation",
            Self::Sort => "sort",
        }
    }
}

impl fmt::Display for FacetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeopleFacet {
    #[default]
    All,
    Exactly(u32),
}

impl PeopleFacet {
    pub fn parse(value: &str) -> Option<Self> {
        let v = value.trim();
        if v.eq_ignore_ascii_case("all") {
            return Some(Self::All);
        }
        v.parse::<u32>().ok().map(Self::Exactly)
    }
}

impl fmt::Display for PeopleFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Exactly(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrientationFacet {
    #[default]
    All,
    Only(Orientation),
}

impl OrientationFacet {
    pub fn parse(value: &str) -> Option<Self> {
        if value.trim().eq_ignore_ascii_case("all") {
            return Some(Self::All);
        }
        Orientation::parse(value).map(Self::Only)
    }
}

impl fmt::Display for OrientationFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(o) => f.write_str(o.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Keeps snapshot order; no scoring is applied.
    #[default]
    Relevance,
    Popular,
    Newest,
}

impl SortMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "relevance" => Some(Self::Relevance),
            "popular" => Some(Self::Popular),
            "newest" => Some(Self::Newest),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::Popular => "popular",
            Self::Newest => "newest",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A validated change to one non-text facet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetUpdate {
    Category(String),
    Color(String),
    People(PeopleFacet),
    Orientation(OrientationFacet),
    Sort(SortMode),
}

impl FacetUpdate {
    /// Parse a `(name, value)` pair coming from the UI. Values outside a
    /// facet's domain are rejected with `InvalidFacet`.
    pub fn parse(name: &str, value: &str) -> CatalogResult<Self> {
        let facet = FacetName::parse(name)?;
        let invalid = || CatalogError::InvalidFacet { facet, value: value.to_string() };
        match facet {
            FacetName::Category => {
                let v = value.trim();
                if v.eq_ignore_ascii_case("all") {
                    Ok(Self::Category(String::new()))
                } else {
                    Ok(Self::Category(v.to_string()))
                }
            }
            FacetName::Color => {
                let v = value.trim().to_ascii_lowercase();
                if v.is_empty() || v == "all" {
                    Ok(Self::Color(String::new()))
                } else if COLOR_PALETTE.contains(&v.as_str()) {
                    Ok(Self::Color(v))
                } else {
                    Err(invalid())
                }
            }
            FacetName::People => PeopleFacet::parse(value).map(Self::People).ok_or_else(invalid),
            FacetName::Orientation => OrientationFacet::parse(value).map(Self::Orientation).ok_or_else(invalid),
            FacetName::Sort => SortMode::parse(value).map(Self::Sort).ok_or_else(invalid),
        }
    }

    pub fn facet(&self) -> FacetName {
        match self {
            Self::Category(_) => FacetName::Category,
            Self::Color(_) => FacetName::Color,
            Self::People(_) => FacetName::People,
            Self::Orientation(_) => FacetName::Orientation,
            Self::Sort(_) => FacetName::Sort,
        }
    }
}

/// Split free text into lowercase match terms. Punctuation around a term is
/// dropped; terms made only of punctuation vanish.
pub fn search_terms(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Current value of every facet. Empty strings mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetState {
    pub search_text: String,
    pub category: String,
    pub color: String,
    pub people: PeopleFacet,
    pub orientation: OrientationFacet,
    pub sort: SortMode,
}

impl FacetState {
    /// Apply an update; returns whether the state changed.
    pub fn apply(&mut self, update: FacetUpdate) -> bool {
        match update {
            FacetUpdate::Category(v) => replace(&mut self.category, v),
            FacetUpdate::Color(v) => replace(&mut self.color, v),
            FacetUpdate::People(v) => replace(&mut self.people, v),
            FacetUpdate::Orientation(v) => replace(&mut self.orientation, v),
            FacetUpdate::Sort(v) => replace(&mut self.sort, v),
        }
    }

    pub fn set_search_text(&mut self, text: &str) -> bool {
        replace(&mut self.search_text, text.to_string())
    }

    /// Reset color, people, orientation and sort. Category and text stay.
    pub fn clear_filters(&mut self) -> bool {
        let before = self.clone();
        self.color.clear();
        self.people = PeopleFacet::All;
        self.orientation = OrientationFacet::All;
        self.sort = SortMode::Relevance;
        before != *self
    }

    pub fn terms(&self) -> Vec<String> { search_terms(&self.search_text) }

    pub fn signature(&self) -> QuerySignature {
        QuerySignature {
            text: self.terms().join(" "),
            category: no_filter_if_all(self.category.trim()).to_string(),
            color: no_filter_if_all(self.color.trim()).to_ascii_lowercase(),
            people: self.people,
            orientation: self.orientation,
            sort: self.sort,
        }
    }
}

fn no_filter_if_all(v: &str) -> &str {
    if v.eq_ignore_ascii_case("all") { "" } else { v }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Canonical cache key derived from a facet state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuerySignature {
    pub text: String,
    pub category: String,
    pub color: String,
    pub people: PeopleFacet,
    pub orientation: OrientationFacet,
    pub sort: SortMode,
}

impl fmt::Display for QuerySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "q={}|category={}|color={}|people={}|orientation={}|sort={}",
            self.text, self.category, self.color, self.people, self.orientation, self.sort
        )
    }
}
