use crate::client::{
    spawn_detail_worker, spawn_page_worker, CatalogApi, DetailRequest, DetailResponse,
    PageRequest, PageResponse,
};
use crate::controller::DataController;
use crate::model::Entry;
use crate::ui_model::{
    category_label, format_price, page_label, showing_label, ListViewState, SortOption,
    LIST_HEIGHT, SKELETON_ROWS,
};
use eframe::egui;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

enum RowAction {
    ToggleSelect(u64),
    OpenDetail(u64),
}

#[derive(Debug, PartialEq)]
enum EmptyList {
    FirstLoadFailed(String),
    Skeleton,
    Loading,
    NoItems { can_clear_search: bool },
}

impl EmptyList {
    fn for_controller(controller: &DataController) -> Self {
        match (controller.error(), controller.loading(), controller.loaded_once()) {
            (Some(err), false, false) => Self::FirstLoadFailed(err.to_string()),
            (_, true, false) => Self::Skeleton,
            (_, true, true) => Self::Loading,
            _ => Self::NoItems {
                can_clear_search: !controller.applied_term().is_empty(),
            },
        }
    }
}

pub struct CatalogBrowserApp {
    controller: DataController,
    view: ListViewState,
    search_input: String,
    notice: String,
    status_line: String,
    page_tx: Sender<PageRequest>,
    page_rx: Receiver<PageResponse>,
    detail_tx: Sender<DetailRequest>,
    detail_rx: Receiver<DetailResponse>,
    scroll_to_top: bool,
}

impl CatalogBrowserApp {
    pub fn new(api: Arc<dyn CatalogApi>, limit: u32, query: String) -> Self {
        let (page_tx, page_rx) = spawn_page_worker(Arc::clone(&api));
        let (detail_tx, detail_rx) = spawn_detail_worker(api);
        let mut app = Self {
            controller: DataController::new(limit).with_search_term(&query),
            view: ListViewState::default(),
            search_input: query,
            notice: String::new(),
            status_line: "Initializing...".to_string(),
            page_tx,
            page_rx,
            detail_tx,
            detail_rx,
            scroll_to_top: false,
        };
        let request = app.controller.load_initial();
        app.dispatch_page(request);
        app
    }

    fn refresh_status_line(&mut self) {
        let pagination = self.controller.pagination();
        let selected = match self.view.selected_count() {
            0 => String::new(),
            n => format!(" | {n} selected"),
        };
        let loading = if self.controller.loading() {
            " | Loading..."
        } else {
            ""
        };
        let error = self
            .controller
            .error()
            .map(|err| format!(" | Error: {err}"))
            .unwrap_or_default();
        let notice = if self.notice.is_empty() {
            String::new()
        } else {
            format!(" | {}", self.notice)
        };

        self.status_line = format!(
            "{} | {}{}{}{}{}",
            page_label(&pagination),
            showing_label(self.controller.items().len()),
            selected,
            loading,
            error,
            notice
        );
    }

    fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = notice.into();
        self.refresh_status_line();
    }

    fn dispatch_page(&mut self, request: PageRequest) {
        let request_id = request.token.request_id();
        if self.page_tx.send(request).is_err() {
            warn!(request_id, "page worker is unavailable");
            self.controller
                .dispatch_failed(request_id, "Fetch worker is unavailable");
        }
        self.refresh_status_line();
    }

    fn dispatch_detail(&mut self, request: DetailRequest) {
        let request_id = request.token.request_id();
        if self.detail_tx.send(request).is_err() {
            warn!(request_id, "detail worker is unavailable");
            self.controller.apply_detail(DetailResponse {
                request_id,
                outcome: Err("Detail worker is unavailable".to_string()),
            });
        }
    }

    fn poll_page_responses(&mut self) {
        let mut changed = false;
        while let Ok(response) = self.page_rx.try_recv() {
            changed |= self.controller.apply(response);
        }
        if changed {
            if self.controller.error().is_none() {
                self.scroll_to_top = true;
            }
            self.view.page_input = self.controller.pagination().page.to_string();
            self.refresh_status_line();
        }
    }

    fn poll_detail_responses(&mut self) {
        while let Ok(response) = self.detail_rx.try_recv() {
            self.controller.apply_detail(response);
        }
    }

    fn poll_search(&mut self, now: Instant) {
        if let Some(request) = self.controller.poll_search(now) {
            self.dispatch_page(request);
        }
    }

    fn search_edited(&mut self, now: Instant) {
        self.controller.set_search_term(&self.search_input, now);
    }

    fn clear_search(&mut self) {
        self.search_input.clear();
        self.search_edited(Instant::now());
    }

    fn go_to_page(&mut self, page: u32) {
        let page = page.clamp(1, self.controller.pagination().page_count());
        let request = self.controller.request_page(page);
        self.dispatch_page(request);
    }

    fn jump_to_page(&mut self) {
        match self
            .view
            .parse_page_jump(self.controller.pagination().page_count())
        {
            Some(page) => self.go_to_page(page),
            None => self.set_notice("Enter a page number"),
        }
    }

    fn apply_sort(&mut self, option: SortOption) {
        self.view.sort = option;
        if let Some(request) = self.controller.set_sort(option.key(), option.order()) {
            self.dispatch_page(request);
        }
    }

    fn refresh(&mut self) {
        self.controller.dismiss_error();
        let request = self.controller.refresh();
        self.dispatch_page(request);
    }

    fn toggle_selection(&mut self, id: u64) {
        self.view.toggle_select(id);
        self.refresh_status_line();
    }

    fn clear_selection(&mut self) {
        self.view.clear_selection();
        self.set_notice("Cleared selection");
    }

    fn open_detail(&mut self, id: u64) {
        let request = self.controller.open_detail(id);
        self.dispatch_detail(request);
    }

    fn apply_row_action(&mut self, action: RowAction) {
        match action {
            RowAction::ToggleSelect(id) => self.toggle_selection(id),
            RowAction::OpenDetail(id) => self.open_detail(id),
        }
    }

    fn draw_detail(&mut self, ctx: &egui::Context) {
        if self.controller.detail().requested_id.is_none() {
            return;
        }
        let mut close = false;
        egui::SidePanel::right("detail")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("Item");
                    if ui.button("Close").clicked() {
                        close = true;
                    }
                });
                ui.separator();
                let detail = self.controller.detail();
                if detail.loading() {
                    ui.spinner();
                } else if let Some(err) = &detail.error {
                    ui.colored_label(ui.visuals().error_fg_color, err.as_str());
                } else if let Some(entry) = &detail.entry {
                    egui::Grid::new("detail-grid")
                        .num_columns(2)
                        .striped(true)
                        .show(ui, |ui| {
                            ui.label("Id");
                            ui.label(entry.id.to_string());
                            ui.end_row();
                            ui.label("Name");
                            ui.label(entry.name.as_str());
                            ui.end_row();
                            ui.label("Category");
                            ui.label(category_label(entry));
                            ui.end_row();
                            ui.label("Price");
                            ui.label(format_price(entry.price));
                            ui.end_row();
                        });
                }
            });
        if close {
            self.controller.close_detail();
        }
    }

    fn draw_list(&mut self, ui: &mut egui::Ui) {
        let row_height = self.view.row_height();
        let items = self.controller.items();

        if items.is_empty() {
            match EmptyList::for_controller(&self.controller) {
                EmptyList::FirstLoadFailed(err) => {
                    ui.colored_label(ui.visuals().error_fg_color, err);
                    if ui.button("Retry").clicked() {
                        self.refresh();
                    }
                }
                EmptyList::Skeleton => skeleton_rows(ui, row_height),
                EmptyList::Loading => {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Loading...");
                    });
                }
                EmptyList::NoItems { can_clear_search } => {
                    ui.label("No items found.");
                    if can_clear_search && ui.button("Clear search").clicked() {
                        self.clear_search();
                    }
                }
            }
            return;
        }

        let mut actions = Vec::new();
        let mut scroll = egui::ScrollArea::vertical()
            .id_salt("items")
            .max_height(LIST_HEIGHT)
            .auto_shrink([false, false]);
        if self.scroll_to_top {
            scroll = scroll.vertical_scroll_offset(0.0);
        }
        let view = &self.view;
        scroll.show_viewport(ui, |ui, viewport| {
            let origin = ui.max_rect().min;
            let width = ui.available_width();
            ui.set_height(view.content_height(items.len()));
            for index in view.visible_rows(viewport.min.y, viewport.height(), items.len()) {
                let Some(entry) = items.get(index) else {
                    continue;
                };
                let rect = egui::Rect::from_min_size(
                    origin + egui::vec2(0.0, index as f32 * row_height),
                    egui::vec2(width, row_height),
                );
                ui.allocate_new_ui(egui::UiBuilder::new().max_rect(rect), |ui| {
                    if let Some(action) =
                        entry_row(ui, entry, view.is_selected(entry.id), view.compact())
                    {
                        actions.push(action);
                    }
                });
            }
        });
        self.scroll_to_top = false;
        for action in actions {
            self.apply_row_action(action);
        }
    }
}

fn skeleton_rows(ui: &mut egui::Ui, row_height: f32) {
    let fill = ui.visuals().faint_bg_color;
    for _ in 0..SKELETON_ROWS {
        let width = ui.available_width();
        let (rect, _) =
            ui.allocate_exact_size(egui::vec2(width, row_height - 8.0), egui::Sense::hover());
        ui.painter().rect_filled(rect, 4.0, fill);
    }
}

fn entry_row(
    ui: &mut egui::Ui,
    entry: &Entry,
    selected: bool,
    compact: bool,
) -> Option<RowAction> {
    let mut action = None;
    let mut checked = selected;
    if selected {
        ui.painter()
            .rect_filled(ui.max_rect(), 4.0, ui.visuals().selection.bg_fill.gamma_multiply(0.3));
    }
    ui.horizontal_centered(|ui| {
        if ui.checkbox(&mut checked, "").changed() {
            action = Some(RowAction::ToggleSelect(entry.id));
        }
        ui.vertical(|ui| {
            let name = egui::RichText::new(&entry.name).strong();
            let response = ui
                .add(egui::Label::new(name).sense(egui::Sense::click()))
                .on_hover_text("Show details");
            if response.clicked() {
                action = Some(RowAction::OpenDetail(entry.id));
            }
            if !compact {
                ui.label(egui::RichText::new(category_label(entry)).weak());
            }
        });
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.label(format_price(entry.price));
        });
    });
    action
}

impl eframe::App for CatalogBrowserApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.poll_page_responses();
        self.poll_detail_responses();
        self.poll_search(now);
        if self.controller.loading() || self.controller.detail().loading() {
            ctx.request_repaint_after(Duration::from_millis(16));
        }
        if let Some(wait) = self.controller.search_due_in(now) {
            ctx.request_repaint_after(wait);
        }

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Search:");
                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.search_input)
                        .hint_text("Search items by name...")
                        .desired_width(320.0),
                );
                if response.changed() {
                    self.search_edited(Instant::now());
                }
                if ui
                    .add_enabled(!self.search_input.is_empty(), egui::Button::new("Clear"))
                    .clicked()
                {
                    self.clear_search();
                }
            });

            ui.horizontal(|ui| {
                ui.label("Sort:");
                let mut sort = self.view.sort;
                egui::ComboBox::from_id_salt("sort-selector")
                    .selected_text(sort.label())
                    .show_ui(ui, |ui| {
                        for option in SortOption::ALL {
                            ui.selectable_value(&mut sort, option, option.label());
                        }
                    });
                if sort != self.view.sort {
                    self.apply_sort(sort);
                }
                let mut compact = self.view.compact();
                if ui.checkbox(&mut compact, "Compact rows").changed() {
                    self.view.set_compact(compact);
                }
                if ui.button("Refresh").clicked() {
                    self.refresh();
                }
            });
        });

        egui::TopBottomPanel::bottom("status")
            .resizable(false)
            .exact_height(24.0)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    if self.view.selected_count() > 0 && ui.small_button("Clear selection").clicked()
                    {
                        self.clear_selection();
                    }
                    ui.add(egui::Label::new(self.status_line.as_str()).truncate());
                });
            });

        self.draw_detail(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Items");
            let pagination = self.controller.pagination();
            let loading = self.controller.loading();
            let mut target: Option<u32> = None;
            let mut jump = false;
            ui.horizontal(|ui| {
                if ui
                    .add_enabled(pagination.has_previous() && !loading, egui::Button::new("◀ Prev"))
                    .clicked()
                {
                    target = Some(pagination.page.saturating_sub(1));
                }
                ui.label(page_label(&pagination));
                if ui
                    .add_enabled(pagination.has_next() && !loading, egui::Button::new("Next ▶"))
                    .clicked()
                {
                    target = Some(pagination.page.saturating_add(1));
                }
                ui.separator();
                ui.label("Go to page");
                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.view.page_input).desired_width(48.0),
                );
                let submitted =
                    response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.add_enabled(!loading, egui::Button::new("Go")).clicked() || submitted {
                    jump = true;
                }
                if loading {
                    ui.spinner();
                }
            });
            if let Some(page) = target {
                self.go_to_page(page);
            } else if jump {
                self.jump_to_page();
            }
            ui.separator();
            self.draw_list(ui);
        });
    }
}
