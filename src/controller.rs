use crate::client::{CancelToken, DetailRequest, DetailResponse, PageRequest, PageResponse};
use crate::model::{Entry, ItemsQuery, Pagination, SortKey, SortOrder, DEFAULT_LIMIT};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Default)]
struct Generation {
    next: u64,
    pending: Option<u64>,
    latest: Arc<AtomicU64>,
}

impl Generation {
    fn issue(&mut self) -> CancelToken {
        self.next = self.next.saturating_add(1);
        self.pending = Some(self.next);
        self.latest.store(self.next, Ordering::Release);
        CancelToken::new(self.next, Arc::clone(&self.latest))
    }

    /// True once for the pending ticket; superseded ids never match.
    fn settle(&mut self, request_id: u64) -> bool {
        if self.pending == Some(request_id) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Default)]
struct SearchDebounce {
    pending: Option<(String, Instant)>,
}

impl SearchDebounce {
    fn schedule(&mut self, term: &str, now: Instant) {
        self.pending = Some((term.to_string(), now + SEARCH_DEBOUNCE));
    }

    fn take_due(&mut self, now: Instant) -> Option<String> {
        match &self.pending {
            Some((_, deadline)) if now >= *deadline => self.pending.take().map(|(term, _)| term),
            _ => None,
        }
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.pending
            .as_ref()
            .map(|(_, deadline)| deadline.saturating_duration_since(now))
    }
}

#[derive(Debug, Default)]
pub struct DetailState {
    generation: Generation,
    pub requested_id: Option<u64>,
    pub entry: Option<Entry>,
    pub error: Option<String>,
}

impl DetailState {
    pub fn loading(&self) -> bool {
        self.generation.pending.is_some()
    }
}

/// Owns the fetch lifecycle and the last good page.
///
/// At most one page request is live: each new one supersedes the previous,
/// whose response is dropped on arrival. Search terms wait for
/// [`SEARCH_DEBOUNCE`] of quiet; page and sort changes go out immediately.
#[derive(Debug)]
pub struct DataController {
    items: Vec<Entry>,
    pagination: Pagination,
    loading: bool,
    error: Option<String>,
    loaded_once: bool,
    generation: Generation,
    debounce: SearchDebounce,
    applied_term: String,
    sort_key: SortKey,
    sort_order: SortOrder,
    limit: u32,
    detail: DetailState,
}

impl DataController {
    pub fn new(limit: u32) -> Self {
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };
        Self {
            items: Vec::new(),
            pagination: Pagination {
                limit,
                ..Pagination::default()
            },
            loading: false,
            error: None,
            loaded_once: false,
            generation: Generation::default(),
            debounce: SearchDebounce::default(),
            applied_term: String::new(),
            sort_key: SortKey::default(),
            sort_order: SortOrder::default(),
            limit,
            detail: DetailState::default(),
        }
    }

    /// Starts with `term` already applied, skipping the quiet period.
    pub fn with_search_term(mut self, term: &str) -> Self {
        self.applied_term = term.trim().to_string();
        self
    }

    pub fn items(&self) -> &[Entry] {
        &self.items
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn loaded_once(&self) -> bool {
        self.loaded_once
    }

    pub fn applied_term(&self) -> &str {
        &self.applied_term
    }

    pub fn sort(&self) -> (SortKey, SortOrder) {
        (self.sort_key, self.sort_order)
    }

    pub fn detail(&self) -> &DetailState {
        &self.detail
    }

    fn issue(&mut self, page: u32) -> PageRequest {
        let token = self.generation.issue();
        self.loading = true;
        let query = ItemsQuery {
            page: page.max(1),
            limit: self.limit,
            search_term: self.applied_term.clone(),
            sort_key: self.sort_key,
            sort_order: self.sort_order,
        };
        debug!(request_id = token.request_id(), page = query.page, term = %query.search_term, "issuing page fetch");
        PageRequest { token, query }
    }

    /// Records a keystroke; the fetch happens in [`Self::poll_search`] once
    /// the term has been quiet long enough.
    pub fn set_search_term(&mut self, term: &str, now: Instant) {
        self.debounce.schedule(term, now);
    }

    pub fn poll_search(&mut self, now: Instant) -> Option<PageRequest> {
        let term = self.debounce.take_due(now)?;
        let term = term.trim();
        if term == self.applied_term {
            return None;
        }
        self.applied_term = term.to_string();
        Some(self.issue(1))
    }

    pub fn search_due_in(&self, now: Instant) -> Option<Duration> {
        self.debounce.remaining(now)
    }

    pub fn load_initial(&mut self) -> PageRequest {
        self.issue(1)
    }

    pub fn request_page(&mut self, page: u32) -> PageRequest {
        self.issue(page)
    }

    pub fn refresh(&mut self) -> PageRequest {
        self.issue(self.pagination.page)
    }

    /// Sorting happens on the server, so a new sort starts again at page 1.
    pub fn set_sort(&mut self, key: SortKey, order: SortOrder) -> Option<PageRequest> {
        if (key, order) == (self.sort_key, self.sort_order) {
            return None;
        }
        self.sort_key = key;
        self.sort_order = order;
        Some(self.issue(1))
    }

    /// Called when the request could not even be handed to a worker.
    pub fn dispatch_failed(&mut self, request_id: u64, message: impl Into<String>) {
        if self.generation.settle(request_id) {
            self.loading = false;
            self.error = Some(message.into());
        }
    }

    /// Commits a response if it belongs to the live request. Returns whether
    /// state changed.
    pub fn apply(&mut self, response: PageResponse) -> bool {
        if !self.generation.settle(response.request_id) {
            debug!(request_id = response.request_id, "discarding superseded page response");
            return false;
        }
        self.loading = false;
        match response.outcome {
            Ok(page) => {
                self.pagination = Pagination::from_page(&page);
                self.items = page.data;
                self.error = None;
                self.loaded_once = true;
            }
            Err(message) => {
                self.error = Some(message);
            }
        }
        true
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn open_detail(&mut self, id: u64) -> DetailRequest {
        let token = self.detail.generation.issue();
        self.detail.requested_id = Some(id);
        self.detail.error = None;
        DetailRequest { token, id }
    }

    pub fn close_detail(&mut self) {
        self.detail.generation.pending = None;
        self.detail.requested_id = None;
        self.detail.entry = None;
        self.detail.error = None;
    }

    pub fn apply_detail(&mut self, response: DetailResponse) -> bool {
        if !self.detail.generation.settle(response.request_id) {
            return false;
        }
        match response.outcome {
            Ok(entry) => {
                self.detail.entry = Some(entry);
                self.detail.error = None;
            }
            Err(message) => {
                self.detail.entry = None;
                self.detail.error = Some(message);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageResult;

    fn entry(id: u64, name: &str) -> Entry {
        Entry {
            id,
            name: name.to_string(),
            price: id as f64,
            category: None,
        }
    }

    fn page_of(page: u32, names: &[(u64, &str)]) -> PageResult {
        PageResult {
            page,
            limit: 10,
            total_pages: 3,
            total_results: 25,
            data: names.iter().map(|(id, n)| entry(*id, n)).collect(),
        }
    }

    fn ok(request: &PageRequest, result: PageResult) -> PageResponse {
        PageResponse {
            request_id: request.token.request_id(),
            outcome: Ok(result),
        }
    }

    #[test]
    fn loading_spans_fetch_start_to_resolution() {
        let mut controller = DataController::new(10);
        assert!(!controller.loading());

        let request = controller.load_initial();
        assert!(controller.loading());

        assert!(controller.apply(ok(&request, page_of(1, &[(1, "a")]))));
        assert!(!controller.loading());
        assert_eq!(controller.items().len(), 1);
        assert_eq!(controller.pagination().total_pages, 3);
        assert!(controller.loaded_once());
    }

    #[test]
    fn newer_request_wins_even_if_older_resolves_last() {
        let mut controller = DataController::new(10);
        let a = controller.request_page(1);
        let b = controller.request_page(2);
        assert!(a.token.is_cancelled());
        assert!(!b.token.is_cancelled());

        assert!(controller.apply(ok(&b, page_of(2, &[(20, "from b")]))));
        assert!(!controller.apply(ok(&a, page_of(1, &[(10, "from a")]))));

        assert_eq!(controller.items()[0].name, "from b");
        assert_eq!(controller.pagination().page, 2);
        assert!(!controller.loading());
    }

    #[test]
    fn superseded_response_does_not_clear_loading() {
        let mut controller = DataController::new(10);
        let a = controller.request_page(1);
        let _b = controller.request_page(2);

        assert!(!controller.apply(ok(&a, page_of(1, &[(10, "from a")]))));
        assert!(controller.loading());
        assert!(controller.items().is_empty());
    }

    #[test]
    fn failure_keeps_last_good_page_and_reports_error() {
        let mut controller = DataController::new(10);
        let first = controller.load_initial();
        controller.apply(ok(&first, page_of(1, &[(1, "kept")])));

        let second = controller.request_page(2);
        controller.apply(PageResponse {
            request_id: second.token.request_id(),
            outcome: Err("Failed to fetch items (500)".to_string()),
        });

        assert!(!controller.loading());
        assert_eq!(controller.items()[0].name, "kept");
        assert_eq!(controller.pagination().page, 1);
        assert_eq!(controller.error(), Some("Failed to fetch items (500)"));

        let third = controller.refresh();
        assert_eq!(third.query.page, 1);
        controller.apply(ok(&third, page_of(1, &[(1, "kept")])));
        assert_eq!(controller.error(), None);
    }

    #[test]
    fn zero_limit_falls_back_to_default() {
        let mut controller = DataController::new(0);
        assert_eq!(controller.pagination().limit, DEFAULT_LIMIT);
        assert_eq!(controller.load_initial().query.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn search_waits_for_quiet_period() {
        let mut controller = DataController::new(10);
        let t0 = Instant::now();
        controller.set_search_term("la", t0);
        controller.set_search_term("lam", t0 + Duration::from_millis(200));

        assert!(controller.poll_search(t0 + Duration::from_millis(450)).is_none());
        assert!(!controller.loading());

        let request = controller
            .poll_search(t0 + Duration::from_millis(500))
            .expect("debounced fetch");
        assert_eq!(request.query.search_term, "lam");
        assert_eq!(request.query.page, 1);
        assert!(controller.poll_search(t0 + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn unchanged_trimmed_term_does_not_refetch() {
        let mut controller = DataController::new(10);
        let t0 = Instant::now();
        controller.set_search_term("  ", t0);
        assert!(controller.poll_search(t0 + SEARCH_DEBOUNCE).is_none());

        controller.set_search_term(" lamp ", t0);
        let request = controller.poll_search(t0 + SEARCH_DEBOUNCE).expect("fetch");
        assert_eq!(request.query.search_term, "lamp");
        assert_eq!(controller.applied_term(), "lamp");
    }

    #[test]
    fn search_due_in_reports_remaining_quiet_time() {
        let mut controller = DataController::new(10);
        let t0 = Instant::now();
        assert_eq!(controller.search_due_in(t0), None);
        controller.set_search_term("x", t0);
        assert_eq!(
            controller.search_due_in(t0 + Duration::from_millis(100)),
            Some(Duration::from_millis(200))
        );
    }

    #[test]
    fn sort_change_fetches_page_one_immediately() {
        let mut controller = DataController::new(5);
        let first = controller.load_initial();
        controller.apply(ok(&first, page_of(1, &[(1, "a")])));
        let second = controller.request_page(3);
        controller.apply(ok(&second, page_of(3, &[(2, "b")])));

        let request = controller
            .set_sort(SortKey::Price, SortOrder::Desc)
            .expect("sort fetch");
        assert_eq!(request.query.page, 1);
        assert_eq!(request.query.limit, 5);
        assert_eq!(request.query.sort_key, SortKey::Price);
        assert_eq!(request.query.sort_order, SortOrder::Desc);
        assert!(controller.set_sort(SortKey::Price, SortOrder::Desc).is_none());
    }

    #[test]
    fn dispatch_failure_settles_only_live_request() {
        let mut controller = DataController::new(10);
        let a = controller.request_page(1);
        let b = controller.request_page(2);

        controller.dispatch_failed(a.token.request_id(), "worker gone");
        assert!(controller.loading());
        controller.dispatch_failed(b.token.request_id(), "worker gone");
        assert!(!controller.loading());
        assert_eq!(controller.error(), Some("worker gone"));
    }

    #[test]
    fn detail_responses_follow_latest_open() {
        let mut controller = DataController::new(10);
        let first = controller.open_detail(1);
        let second = controller.open_detail(2);
        assert!(controller.detail().loading());

        assert!(!controller.apply_detail(DetailResponse {
            request_id: first.token.request_id(),
            outcome: Ok(entry(1, "one")),
        }));
        assert!(controller.apply_detail(DetailResponse {
            request_id: second.token.request_id(),
            outcome: Ok(entry(2, "two")),
        }));
        assert_eq!(controller.detail().entry.as_ref().map(|e| e.id), Some(2));
        assert!(!controller.detail().loading());

        controller.close_detail();
        assert!(controller.detail().entry.is_none());
        assert!(controller.detail().requested_id.is_none());
    }
}
