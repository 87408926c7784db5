//! Query keys and the shareable query-string codec.
//!
//! # Design
//! - [`QueryKey`] is an immutable value; builders return modified copies.
//! - Decoding is total: unknown or malformed parameters are dropped and
//!   missing ones fall back to defaults.
//! - Encoding omits defaults so shared links stay short; list requests use
//!   [`QueryCodec::request_params`] which always carries paging.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Query parameter carrying the free-text search term.
pub const PARAM_SEARCH: &str = "search";
/// Query parameter carrying the one-based page number.
pub const PARAM_PAGE: &str = "page";
/// Query parameter carrying the page size.
pub const PARAM_PAGE_SIZE: &str = "pageSize";
/// Query parameter carrying the sort specification.
pub const PARAM_SORT: &str = "sort";

const RESERVED: [&str; 4] = [PARAM_SEARCH, PARAM_PAGE, PARAM_PAGE_SIZE, PARAM_SORT];

/// Default page size used when neither the location nor configuration sets one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Sort direction for a list column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    Asc,
    /// Largest first.
    Desc,
}

impl SortDirection {
    /// Render the direction as its wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(()),
        }
    }
}

/// Sort specification applied to the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Sort {
    /// Column identifier.
    pub field: String,
    /// Sort direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Construct a sort specification.
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    /// Parse `field`, `field:asc` or `field:desc`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (field, direction) = match raw.split_once(':') {
            Some((field, direction)) => (field, direction.parse().ok()?),
            None => (raw, SortDirection::Asc),
        };
        let field = field.trim();
        if field.is_empty() {
            return None;
        }
        Some(Self::new(field, direction))
    }
}

impl Display for Sort {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.field, self.direction.as_str())
    }
}

/// Single `(field, value)` filter pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Filter {
    /// Filter field identifier.
    pub field: String,
    /// Accepted value for the field.
    pub value: String,
}

impl Filter {
    /// Construct a filter pair.
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Canonical representation of the filter, page, and sort state of a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    /// One-based page number.
    pub page: u32,
    /// Number of items per page.
    pub page_size: u32,
    /// Free-text search term (empty when unset).
    pub search: String,
    /// Ordered set of filter pairs.
    pub filters: BTreeSet<Filter>,
    /// Optional sort specification.
    pub sort: Option<Sort>,
}

impl Default for QueryKey {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl QueryKey {
    /// First page with the given page size and no search, filters, or sort.
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            search: String::new(),
            filters: BTreeSet::new(),
            sort: None,
        }
    }

    /// Copy with a different page (clamped to at least 1).
    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Copy with a different page size; resets to the first page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self.page = 1;
        self
    }

    /// Copy with a different search term.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    /// Copy with every value of `field` replaced by `values`; resets to the first page.
    #[must_use]
    pub fn with_filter_values<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.filters.retain(|filter| filter.field != field);
        for value in values {
            let value = value.into();
            if !value.is_empty() {
                self.filters.insert(Filter::new(field, value));
            }
        }
        self.page = 1;
        self
    }

    /// Copy with the sort replaced; resets to the first page.
    #[must_use]
    pub fn with_sort(mut self, sort: Option<Sort>) -> Self {
        self.sort = sort;
        self.page = 1;
        self
    }

    /// Values currently applied for `field`, in canonical order.
    pub fn filter_values<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.filters
            .iter()
            .filter(move |filter| filter.field == field)
            .map(|filter| filter.value.as_str())
    }
}

/// Per-resource filter and sort vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    filters: BTreeSet<String>,
    sort_fields: BTreeSet<String>,
}

impl Vocabulary {
    /// Build a vocabulary from filter and sortable field names.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ReservedField`] when a filter field collides with a
    /// reserved parameter, or [`CodecError::EmptyField`] for blank entries.
    pub fn new<F, S>(filters: F, sort_fields: S) -> Result<Self, CodecError>
    where
        F: IntoIterator,
        F::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        let filters: BTreeSet<String> = filters.into_iter().map(Into::into).collect();
        let sort_fields: BTreeSet<String> = sort_fields.into_iter().map(Into::into).collect();
        if filters.iter().chain(&sort_fields).any(|f| f.trim().is_empty()) {
            return Err(CodecError::EmptyField);
        }
        if let Some(field) = filters.iter().find(|f| RESERVED.contains(&f.as_str())) {
            return Err(CodecError::ReservedField {
                field: field.clone(),
            });
        }
        Ok(Self {
            filters,
            sort_fields,
        })
    }

    /// Whether `field` is an accepted filter.
    #[must_use]
    pub fn accepts_filter(&self, field: &str) -> bool {
        self.filters.contains(field)
    }

    /// Whether `field` is an accepted sort column.
    #[must_use]
    pub fn accepts_sort(&self, field: &str) -> bool {
        self.sort_fields.contains(field)
    }
}

/// Converts [`QueryKey`] values to and from query strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCodec {
    vocabulary: Vocabulary,
    default_page_size: u32,
    max_page_size: u32,
}

impl QueryCodec {
    /// Construct a codec for a resource vocabulary.
    #[must_use]
    pub fn new(vocabulary: Vocabulary, default_page_size: u32, max_page_size: u32) -> Self {
        let max_page_size = max_page_size.max(1);
        Self {
            vocabulary,
            default_page_size: default_page_size.clamp(1, max_page_size),
            max_page_size,
        }
    }

    /// Vocabulary used to accept filters and sort columns.
    #[must_use]
    pub const fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Page size assumed when the query string omits one.
    #[must_use]
    pub const fn default_page_size(&self) -> u32 {
        self.default_page_size
    }

    /// Largest page size accepted on decode.
    #[must_use]
    pub const fn max_page_size(&self) -> u32 {
        self.max_page_size
    }

    /// Key with every component at its default.
    #[must_use]
    pub fn default_key(&self) -> QueryKey {
        QueryKey::new(self.default_page_size)
    }

    /// Render the shareable form of `key`, omitting defaults.
    #[must_use]
    pub fn encode(&self, key: &QueryKey) -> String {
        let mut params = Vec::new();
        if !key.search.is_empty() {
            params.push((PARAM_SEARCH.to_string(), key.search.clone()));
        }
        params.extend(filter_params(key));
        if let Some(sort) = &key.sort {
            params.push((PARAM_SORT.to_string(), sort.to_string()));
        }
        if key.page != 1 {
            params.push((PARAM_PAGE.to_string(), key.page.to_string()));
        }
        if key.page_size != self.default_page_size {
            params.push((PARAM_PAGE_SIZE.to_string(), key.page_size.to_string()));
        }
        join_params(&params)
    }

    /// Parameters sent to the list endpoint; paging is always present.
    #[must_use]
    pub fn request_params(&self, key: &QueryKey) -> Vec<(String, String)> {
        let mut params = vec![
            (PARAM_PAGE.to_string(), key.page.to_string()),
            (PARAM_PAGE_SIZE.to_string(), key.page_size.to_string()),
        ];
        if !key.search.is_empty() {
            params.push((PARAM_SEARCH.to_string(), key.search.clone()));
        }
        params.extend(filter_params(key));
        if let Some(sort) = &key.sort {
            params.push((PARAM_SORT.to_string(), sort.to_string()));
        }
        params
    }

    /// Full request query string for the list endpoint.
    #[must_use]
    pub fn request_query(&self, key: &QueryKey) -> String {
        join_params(&self.request_params(key))
    }

    /// Parse a query string; never fails.
    #[must_use]
    pub fn decode(&self, raw: &str) -> QueryKey {
        let mut key = self.default_key();
        for (name, value) in query_pairs(raw) {
            match name.as_str() {
                PARAM_SEARCH => key.search = value,
                PARAM_PAGE => {
                    if let Some(page) = value.parse::<u32>().ok().filter(|page| *page >= 1) {
                        key.page = page;
                    }
                }
                PARAM_PAGE_SIZE => {
                    if let Some(size) = self.accept_page_size(&value) {
                        key.page_size = size;
                    }
                }
                PARAM_SORT => {
                    if let Some(sort) =
                        Sort::parse(&value).filter(|sort| self.vocabulary.accepts_sort(&sort.field))
                    {
                        key.sort = Some(sort);
                    }
                }
                field if self.vocabulary.accepts_filter(field) && !value.is_empty() => {
                    key.filters.insert(Filter::new(field, value));
                }
                _ => {}
            }
        }
        key
    }

    /// Valid page size carried explicitly by `raw`, if any.
    #[must_use]
    pub fn explicit_page_size(&self, raw: &str) -> Option<u32> {
        query_pairs(raw)
            .filter(|(name, _)| name == PARAM_PAGE_SIZE)
            .filter_map(|(_, value)| self.accept_page_size(&value))
            .last()
    }

    fn accept_page_size(&self, value: &str) -> Option<u32> {
        value
            .parse::<u32>()
            .ok()
            .filter(|size| (1..=self.max_page_size).contains(size))
    }
}

fn query_pairs(raw: &str) -> impl Iterator<Item = (String, String)> + '_ {
    raw.strip_prefix('?')
        .unwrap_or(raw)
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter_map(|(name, value)| Some((decode_component(name)?, decode_component(value)?)))
}

fn filter_params(key: &QueryKey) -> impl Iterator<Item = (String, String)> + '_ {
    key.filters
        .iter()
        .map(|filter| (filter.field.clone(), filter.value.clone()))
}

fn join_params(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(name, value)| {
            format!(
                "{}={}",
                urlencoding::encode(name),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn decode_component(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|value| value.into_owned())
}
