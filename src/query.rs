use crate::model::{
    Entry, ItemsQuery, PageResult, SortKey, SortOrder, DEFAULT_LIMIT, DEFAULT_PAGE,
};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Builds a query from raw query-string parameters. Never fails: anything
/// missing or malformed falls back to its default.
pub fn parse_params(params: &HashMap<String, String>) -> ItemsQuery {
    ItemsQuery {
        page: positive_or(params.get("page"), DEFAULT_PAGE),
        limit: positive_or(params.get("limit"), DEFAULT_LIMIT),
        search_term: params.get("q").cloned().unwrap_or_default(),
        sort_key: params
            .get("sortKey")
            .and_then(|v| SortKey::parse(v))
            .unwrap_or_default(),
        sort_order: params
            .get("sortOrder")
            .and_then(|v| SortOrder::parse(v))
            .unwrap_or_default(),
    }
}

fn positive_or(raw: Option<&String>, default: u32) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(default)
}

fn or_default(value: u32, default: u32) -> u32 {
    if value == 0 {
        default
    } else {
        value
    }
}

fn matches_term(term: &str, name: &str) -> bool {
    term.is_empty() || name.to_lowercase().contains(term)
}

/// Case-folded comparison first, raw string as tie-breaker.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn compare_entries(key: SortKey, a: &Entry, b: &Entry) -> Ordering {
    match key {
        SortKey::Name => compare_names(&a.name, &b.name),
        SortKey::Price => a.price.total_cmp(&b.price),
    }
}

/// Filter, then sort, then paginate. Out-of-range pages come back empty with
/// the totals still filled in.
pub fn run_query(entries: &[Entry], query: &ItemsQuery) -> PageResult {
    let page = or_default(query.page, DEFAULT_PAGE);
    let limit = or_default(query.limit, DEFAULT_LIMIT);
    let term = query.search_term.to_lowercase();

    let mut filtered: Vec<&Entry> = entries
        .iter()
        .filter(|e| matches_term(&term, &e.name))
        .collect();

    // sort_by is stable, so equal keys keep store order in both directions.
    filtered.sort_by(|a, b| {
        let ord = compare_entries(query.sort_key, a, b);
        match query.sort_order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });

    let total_results = filtered.len();
    let total_pages = total_results.div_ceil(limit as usize) as u32;
    let start = (page as usize - 1).saturating_mul(limit as usize);
    let data = filtered
        .into_iter()
        .skip(start)
        .take(limit as usize)
        .cloned()
        .collect();

    PageResult {
        page,
        limit,
        total_pages,
        total_results,
        data,
    }
}
