use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

/// One catalog record. Field names are the on-disk and wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub name: String,
    pub price: f64,
    pub category: Option<String>,
}

impl NewEntry {
    pub fn with_id(self, id: u64) -> Entry {
        Entry {
            id,
            name: self.name,
            price: self.price,
            category: self.category,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Name,
    Price,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "price" => Some(Self::Price),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Price => "price",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// A list query. A zero `page` or `limit` means the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemsQuery {
    pub page: u32,
    pub limit: u32,
    pub search_term: String,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
}

impl Default for ItemsQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            search_term: String::new(),
            sort_key: SortKey::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl ItemsQuery {
    /// Query-string pairs in the order the server documents them.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("page", self.page.to_string()),
            ("limit", self.limit.to_string()),
            ("q", self.search_term.clone()),
            ("sortKey", self.sort_key.as_str().to_string()),
            ("sortOrder", self.sort_order.as_str().to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub total_results: usize,
    pub data: Vec<Entry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub total_results: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            total_pages: 1,
            total_results: 0,
        }
    }
}

impl Pagination {
    pub fn from_page(result: &PageResult) -> Self {
        Self {
            page: result.page,
            limit: result.limit,
            total_pages: result.total_pages,
            total_results: result.total_results,
        }
    }

    /// Page count for display and clamping; an empty result still has one page.
    pub fn page_count(&self) -> u32 {
        self.total_pages.max(1)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: usize,
    pub average_price: f64,
    /// Milliseconds since the Unix epoch when the figures were computed.
    pub timestamp: u64,
}
