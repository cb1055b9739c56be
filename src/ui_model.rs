use crate::model::{Entry, Pagination, SortKey, SortOrder};
use std::collections::HashSet;
use std::ops::Range;

pub const COMPACT_ROW_HEIGHT: f32 = 44.0;
pub const COMFORTABLE_ROW_HEIGHT: f32 = 60.0;
pub const LIST_HEIGHT: f32 = 440.0;
pub const SKELETON_ROWS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOption {
    #[default]
    NameAsc,
    NameDesc,
    PriceAsc,
    PriceDesc,
}

impl SortOption {
    pub const ALL: [SortOption; 4] = [
        SortOption::NameAsc,
        SortOption::NameDesc,
        SortOption::PriceAsc,
        SortOption::PriceDesc,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SortOption::NameAsc => "Name (A→Z)",
            SortOption::NameDesc => "Name (Z→A)",
            SortOption::PriceAsc => "Price (Low→High)",
            SortOption::PriceDesc => "Price (High→Low)",
        }
    }

    pub fn key(self) -> SortKey {
        match self {
            SortOption::NameAsc | SortOption::NameDesc => SortKey::Name,
            SortOption::PriceAsc | SortOption::PriceDesc => SortKey::Price,
        }
    }

    pub fn order(self) -> SortOrder {
        match self {
            SortOption::NameAsc | SortOption::PriceAsc => SortOrder::Asc,
            SortOption::NameDesc | SortOption::PriceDesc => SortOrder::Desc,
        }
    }

    pub fn from_parts(key: SortKey, order: SortOrder) -> Self {
        match (key, order) {
            (SortKey::Name, SortOrder::Asc) => SortOption::NameAsc,
            (SortKey::Name, SortOrder::Desc) => SortOption::NameDesc,
            (SortKey::Price, SortOrder::Asc) => SortOption::PriceAsc,
            (SortKey::Price, SortOrder::Desc) => SortOption::PriceDesc,
        }
    }
}

/// View-local state. Nothing here is touched by a refetch.
///
/// Selection holds entry ids, which are global, so it is kept across page
/// changes and compact toggles alike.
#[derive(Debug, Clone)]
pub struct ListViewState {
    selected: HashSet<u64>,
    compact: bool,
    pub sort: SortOption,
    pub page_input: String,
}

impl Default for ListViewState {
    fn default() -> Self {
        Self {
            selected: HashSet::new(),
            compact: true,
            sort: SortOption::default(),
            page_input: String::new(),
        }
    }
}

impl ListViewState {
    pub fn toggle_select(&mut self, id: u64) {
        if !self.selected.remove(&id) {
            self.selected.insert(id);
        }
    }

    pub fn is_selected(&self, id: u64) -> bool {
        self.selected.contains(&id)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    pub fn compact(&self) -> bool {
        self.compact
    }

    pub fn set_compact(&mut self, compact: bool) {
        self.compact = compact;
    }

    pub fn row_height(&self) -> f32 {
        if self.compact {
            COMPACT_ROW_HEIGHT
        } else {
            COMFORTABLE_ROW_HEIGHT
        }
    }

    pub fn content_height(&self, rows: usize) -> f32 {
        rows as f32 * self.row_height()
    }

    /// Rows intersecting `[offset, offset + viewport)`.
    pub fn visible_rows(&self, offset: f32, viewport: f32, total: usize) -> Range<usize> {
        visible_range(self.row_height(), offset, viewport, total)
    }

    /// Parses the go-to-page box, clamped into `[1, total_pages]`.
    pub fn parse_page_jump(&self, total_pages: u32) -> Option<u32> {
        let raw = self.page_input.trim().parse::<f64>().ok()?;
        if !raw.is_finite() {
            return None;
        }
        let last = total_pages.max(1) as f64;
        Some(raw.trunc().clamp(1.0, last) as u32)
    }
}

pub fn visible_range(row_height: f32, offset: f32, viewport: f32, total: usize) -> Range<usize> {
    if total == 0 || row_height <= 0.0 || viewport <= 0.0 {
        return 0..0;
    }
    let offset = offset.max(0.0);
    let first = ((offset / row_height).floor() as usize).min(total);
    let last = (((offset + viewport) / row_height).ceil() as usize).min(total);
    first..last
}

/// `$1,234.50` style; negatives keep the sign in front of the symbol.
pub fn format_price(price: f64) -> String {
    if !price.is_finite() {
        return "$0.00".to_string();
    }
    let cents = (price.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, ch) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if price < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

pub fn category_label(entry: &Entry) -> &str {
    entry
        .category
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or("Uncategorized")
}

pub fn page_label(pagination: &Pagination) -> String {
    format!("Page {} of {}", pagination.page, pagination.page_count())
}

pub fn showing_label(count: usize) -> String {
    if count == 1 {
        "Showing 1 item".to_string()
    } else {
        format!("Showing {count} items")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_adds_then_removes() {
        let mut view = ListViewState::default();
        view.toggle_select(3);
        view.toggle_select(5);
        assert!(view.is_selected(3));
        assert_eq!(view.selected_count(), 2);

        view.toggle_select(3);
        assert!(!view.is_selected(3));
        assert_eq!(view.selected_count(), 1);

        view.clear_selection();
        assert_eq!(view.selected_count(), 0);
    }

    #[test]
    fn compact_toggle_changes_row_height_and_keeps_selection() {
        let mut view = ListViewState::default();
        view.toggle_select(1);
        assert!(view.compact());
        assert_eq!(view.row_height(), COMPACT_ROW_HEIGHT);
        assert_eq!(view.content_height(10), 440.0);

        view.set_compact(false);
        assert_eq!(view.row_height(), COMFORTABLE_ROW_HEIGHT);
        assert_eq!(view.content_height(10), 600.0);
        assert!(view.is_selected(1));
    }

    #[test]
    fn visible_rows_cover_only_viewport() {
        let view = ListViewState::default();
        assert_eq!(view.visible_rows(0.0, LIST_HEIGHT, 100), 0..10);
        assert_eq!(view.visible_rows(50.0, 100.0, 100), 1..4);
        assert_eq!(view.visible_rows(4300.0, LIST_HEIGHT, 100), 97..100);
        assert_eq!(view.visible_rows(0.0, LIST_HEIGHT, 3), 0..3);
        assert_eq!(view.visible_rows(0.0, LIST_HEIGHT, 0), 0..0);

        let mut comfortable = ListViewState::default();
        comfortable.set_compact(false);
        assert_eq!(comfortable.visible_rows(0.0, LIST_HEIGHT, 100), 0..8);
    }

    #[test]
    fn page_jump_clamps_into_range() {
        let mut view = ListViewState::default();
        for (raw, expected) in [
            ("3", Some(3)),
            ("0", Some(1)),
            ("-4", Some(1)),
            ("99", Some(5)),
            (" 2 ", Some(2)),
            ("2.7", Some(2)),
            ("abc", None),
            ("", None),
            ("NaN", None),
        ] {
            view.page_input = raw.to_string();
            assert_eq!(view.parse_page_jump(5), expected, "raw {raw:?}");
        }

        view.page_input = "4".to_string();
        assert_eq!(view.parse_page_jump(0), Some(1));
    }

    #[test]
    fn sort_options_round_trip_to_query_parts() {
        for option in SortOption::ALL {
            assert_eq!(SortOption::from_parts(option.key(), option.order()), option);
        }
        assert_eq!(SortOption::PriceDesc.key(), SortKey::Price);
        assert_eq!(SortOption::NameDesc.order(), SortOrder::Desc);
    }

    #[test]
    fn prices_render_as_usd() {
        assert_eq!(format_price(0.0), "$0.00");
        assert_eq!(format_price(12.5), "$12.50");
        assert_eq!(format_price(1234.5), "$1,234.50");
        assert_eq!(format_price(1_000_000.0), "$1,000,000.00");
        assert_eq!(format_price(-3.456), "-$3.46");
    }

    #[test]
    fn missing_category_is_uncategorized() {
        let mut entry = Entry {
            id: 1,
            name: "Lamp".to_string(),
            price: 1.0,
            category: None,
        };
        assert_eq!(category_label(&entry), "Uncategorized");
        entry.category = Some("Home".to_string());
        assert_eq!(category_label(&entry), "Home");
    }

    #[test]
    fn status_labels() {
        let pagination = Pagination {
            page: 1,
            limit: 10,
            total_pages: 0,
            total_results: 0,
        };
        assert_eq!(page_label(&pagination), "Page 1 of 1");
        assert_eq!(showing_label(1), "Showing 1 item");
        assert_eq!(showing_label(7), "Showing 7 items");
    }
}
