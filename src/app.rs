use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

use crate::api::{ApiClient, DemoMarkResult};
use crate::config::Config;
use crate::debounce::Debouncer;
use crate::error::Result;
use crate::feed::calendar::{self, MonthCursor};
use crate::feed::catalog;
use crate::feed::tags::{self, QUICK_BAR_LIMIT};
use crate::feed::{filter_items, group_by_email, EmailGroup, FilterState, ItemSource};
use crate::models::{
    DemoConfig, DemoStatus, DemoUser, EmailDetail, FeedItem, Health, HistoryPoint, ItemType,
    MetricsResponse, PipelineSettings, ProgressUpdate, SearchRequest, SettingsUpdate,
    UnprocessedEmails,
};
use crate::palette::{CommandPalette, PaletteOutcome};
use crate::prefs::{PreferenceStore, Preferences};
use crate::progress::{ExtractionPanel, PanelState, PollSource, ProgressSource, SourceKind, StreamSource};
use crate::tui::{AppAction, InputMode};

/// Events view asks for a larger page so the calendar can fill a few months.
const CALENDAR_PAGE_SIZE: u32 = 100;
const SEARCH_LIMIT: u32 = 50;
pub const METRICS_DAYS: u32 = 7;
const LIMIT_STEP: i64 = 10;
const STATUS_TIMEOUT: Duration = Duration::from_secs(4);
const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Home,
    Events,
    Courses,
    Blogs,
    Metrics,
    Settings,
}

impl View {
    pub const ALL: [View; 6] = [
        View::Home,
        View::Events,
        View::Courses,
        View::Blogs,
        View::Metrics,
        View::Settings,
    ];

    pub fn title(self) -> &'static str {
        match self {
            View::Home => "Home",
            View::Events => "Events",
            View::Courses => "Courses",
            View::Blogs => "Blogs",
            View::Metrics => "Metrics",
            View::Settings => "Settings",
        }
    }

    /// Key under which the view's filters are persisted.
    pub fn key(self) -> &'static str {
        match self {
            View::Home => "home",
            View::Events => "events",
            View::Courses => "courses",
            View::Blogs => "blogs",
            View::Metrics => "metrics",
            View::Settings => "settings",
        }
    }

    /// Typed views only ever show one item type, whatever the filters say.
    pub fn locked_type(self) -> Option<ItemType> {
        match self {
            View::Events => Some(ItemType::Event),
            View::Courses => Some(ItemType::Course),
            View::Blogs => Some(ItemType::Blog),
            _ => None,
        }
    }

    pub fn is_feed(self) -> bool {
        matches!(self, View::Home | View::Events | View::Courses | View::Blogs)
    }

    pub fn index(self) -> usize {
        View::ALL.iter().position(|v| *v == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<View> {
        View::ALL.get(index).copied()
    }
}

/// One of the four things a fetch-driven view can show.
#[derive(Debug, Clone)]
pub enum Loadable<T> {
    Idle,
    Loading,
    Failed(String),
    Ready(T),
}

impl<T> Default for Loadable<T> {
    fn default() -> Self {
        Loadable::Idle
    }
}

impl<T> Loadable<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Loadable::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Loadable::Idle | Loadable::Loading)
    }

    fn needs_load(&self) -> bool {
        matches!(self, Loadable::Idle | Loadable::Failed(_))
    }

    fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Loadable::Ready(value),
            Err(e) => Loadable::Failed(e.to_string()),
        }
    }
}

#[derive(Debug, Default)]
pub struct SearchState {
    pub query: String,
    pub editing: bool,
    pub results: Loadable<Vec<FeedItem>>,
    generation: u64,
}

impl SearchState {
    pub fn is_active(&self) -> bool {
        !self.query.trim().is_empty()
    }
}

/// State of one feed-backed view.
#[derive(Debug)]
pub struct FeedPane {
    pub view: View,
    pub items: Loadable<Vec<FeedItem>>,
    pub filters: FilterState,
    pub search: SearchState,
    /// What the list shows, in display order. Selection indexes into this.
    pub rows: Vec<FeedItem>,
    /// Home only: `rows` bucketed by source email.
    pub groups: Vec<EmailGroup>,
    pub selected: usize,
    pub level: Option<String>,
    pub levels: Vec<String>,
    pub cursor: MonthCursor,
    pub selected_day: Option<u32>,
    pub day_counts: BTreeMap<u32, usize>,
    fetch_generation: u64,
}

impl FeedPane {
    fn new(view: View, filters: FilterState) -> Self {
        Self {
            view,
            items: Loadable::Idle,
            filters,
            search: SearchState::default(),
            rows: Vec::new(),
            groups: Vec::new(),
            selected: 0,
            level: None,
            levels: Vec::new(),
            cursor: MonthCursor::containing(Utc::now().date_naive()),
            selected_day: None,
            day_counts: BTreeMap::new(),
            fetch_generation: 0,
        }
    }

    pub fn loaded_items(&self) -> &[FeedItem] {
        self.items.ready().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn showing_search(&self) -> bool {
        self.search.is_active() && self.search.results.ready().is_some()
    }

    pub fn selected_item(&self) -> Option<&FeedItem> {
        self.rows.get(self.selected)
    }

    /// Re-run the filter engine over whatever is loaded.
    fn reshape(&mut self) {
        let now = Utc::now();
        if self.view == View::Courses {
            self.levels = catalog::unique_levels(self.loaded_items());
        }

        let visible = {
            let (base, ranked) = match self.search.results.ready() {
                Some(results) if self.search.is_active() => (results.as_slice(), true),
                _ => (self.loaded_items(), false),
            };
            let leveled;
            let base = if self.view == View::Courses && self.level.is_some() {
                leveled = catalog::filter_by_level(base, self.level.as_deref());
                leveled.as_slice()
            } else {
                base
            };
            let source = if ranked {
                ItemSource::Search(base)
            } else {
                ItemSource::Feed(base)
            };
            filter_items(source, &self.filters, self.view.locked_type(), now)
        };

        match self.view {
            View::Home => {
                self.groups = group_by_email(visible);
                self.rows = self
                    .groups
                    .iter()
                    .flat_map(|group| group.items.iter().cloned())
                    .collect();
            }
            View::Events => {
                self.day_counts = calendar::events_by_day(&visible, self.cursor)
                    .into_iter()
                    .map(|(day, events)| (day, events.len()))
                    .collect();
                let day = self.selected_day.and_then(|d| self.cursor.date_with_day(d));
                self.rows = match day {
                    Some(date) => calendar::events_on(&visible, date)
                        .into_iter()
                        .cloned()
                        .collect(),
                    None => visible,
                };
            }
            _ => self.rows = visible,
        }
        self.selected = self.selected.min(self.rows.len().saturating_sub(1));
    }
}

#[derive(Debug, Clone)]
pub struct MetricsBundle {
    pub metrics: MetricsResponse,
    pub history: Vec<HistoryPoint>,
    pub health: Option<Health>,
}

#[derive(Debug, Default)]
pub struct SettingsPane {
    pub settings: Loadable<PipelineSettings>,
    pub draft: String,
    pub editing: bool,
    pub saving: bool,
    pub last_saved: Option<SettingsUpdate>,
    pub error: Option<String>,
}

impl SettingsPane {
    /// The draft as it would be saved.
    pub fn draft_limit(&self) -> Option<u32> {
        self.draft
            .trim()
            .parse::<i64>()
            .ok()
            .map(PipelineSettings::clamp_email_limit)
    }
}

#[derive(Debug, Default)]
pub struct DemoState {
    pub loading: bool,
    pub busy: bool,
    pub config: Option<DemoConfig>,
    pub user: Option<DemoUser>,
}

impl DemoState {
    pub fn is_demo(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.demo_mode)
    }
}

#[derive(Debug)]
pub enum Modal {
    Item(Box<FeedItem>),
    Email {
        email_id: String,
        detail: Loadable<EmailDetail>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickerKind {
    Tags,
    Senders,
}

#[derive(Debug, Clone)]
pub struct PickerEntry {
    pub label: String,
    pub value: String,
    pub count: usize,
}

#[derive(Debug)]
pub struct Picker {
    pub kind: PickerKind,
    pub entries: Vec<PickerEntry>,
    pub selected: usize,
}

/// Quick-bar tags first, then every other tag by frequency.
fn tag_entries(items: &[FeedItem], saved: &[String]) -> Vec<PickerEntry> {
    let quick = tags::quick_bar_tags(items, saved, QUICK_BAR_LIMIT);
    let rest: Vec<_> = tags::tag_counts(items)
        .into_iter()
        .filter(|t| !quick.iter().any(|q| q.tag == t.tag))
        .collect();
    quick
        .into_iter()
        .chain(rest)
        .map(|t| PickerEntry {
            label: t.tag.clone(),
            value: t.tag,
            count: t.count,
        })
        .collect()
}

/// Results of background work, drained on every tick.
enum AppEvent {
    Demo(Result<(DemoConfig, Option<DemoUser>)>),
    Feed {
        view: View,
        generation: u64,
        result: Result<Vec<FeedItem>>,
    },
    Search {
        view: View,
        generation: u64,
        result: Result<Vec<FeedItem>>,
    },
    QuickSearch {
        generation: u64,
        result: Result<Vec<FeedItem>>,
    },
    Unprocessed(Result<UnprocessedEmails>),
    Metrics(Result<MetricsBundle>),
    Settings(Result<PipelineSettings>),
    SettingsSaved(Result<SettingsUpdate>),
    DemoToggled(Result<DemoStatus>),
    DemoReset(Result<()>),
    DemoMarked(Result<DemoMarkResult>),
    Email {
        email_id: String,
        result: Result<EmailDetail>,
    },
    ItemDetail(Result<FeedItem>),
}

pub struct App {
    api: ApiClient,
    config: Config,
    prefs: PreferenceStore,
    prefs_rx: watch::Receiver<Preferences>,
    pub saved_tags: Vec<String>,
    pub prism_expanded: bool,

    pub view: View,
    panes: HashMap<View, FeedPane>,
    pub panel: ExtractionPanel,
    progress: Option<Box<dyn ProgressSource>>,
    extracting_ids: Vec<String>,

    pub palette: CommandPalette,
    palette_debounce: Debouncer,
    search_debounce: Debouncer,
    settings_debounce: Debouncer,

    pub metrics: Loadable<MetricsBundle>,
    pub settings: SettingsPane,
    pub demo: DemoState,
    pub modal: Option<Modal>,
    pub modal_scroll: u16,
    pub picker: Option<Picker>,
    pub show_help: bool,
    pub status_message: Option<(String, Instant)>,
    pub spinner_frame: usize,

    tx: UnboundedSender<AppEvent>,
    rx: UnboundedReceiver<AppEvent>,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let api = ApiClient::new(&config.api_base_url, config.request_timeout())?;
        let prefs = PreferenceStore::load(&config.data_dir())?;
        let prefs_rx = prefs.subscribe();
        let stored = prefs.get();

        let panes = View::ALL
            .into_iter()
            .filter(|view| view.is_feed())
            .map(|view| {
                let filters = prefs.filters_for(view.key()).unwrap_or_default();
                (view, FeedPane::new(view, filters))
            })
            .collect();

        let (tx, rx) = mpsc::unbounded_channel();

        let mut app = Self {
            api,
            config: config.clone(),
            prefs,
            prefs_rx,
            saved_tags: stored.saved_tags,
            prism_expanded: stored.prism_expanded,
            view: View::Home,
            panes,
            panel: ExtractionPanel::new(),
            progress: None,
            extracting_ids: Vec::new(),
            palette: CommandPalette::default(),
            palette_debounce: Debouncer::new(config.search_debounce()),
            search_debounce: Debouncer::new(config.search_debounce()),
            settings_debounce: Debouncer::new(config.settings_debounce()),
            metrics: Loadable::Idle,
            settings: SettingsPane::default(),
            demo: DemoState::default(),
            modal: None,
            modal_scroll: 0,
            picker: None,
            show_help: false,
            status_message: None,
            spinner_frame: 0,
            tx,
            rx,
        };

        // Everything else waits for demo mode to be known
        app.load_demo();
        Ok(app)
    }

    pub fn api_base_url(&self) -> &str {
        self.api.base_url()
    }

    pub fn pane(&self, view: View) -> Option<&FeedPane> {
        self.panes.get(&view)
    }

    pub fn current_pane(&self) -> Option<&FeedPane> {
        self.panes.get(&self.view)
    }

    pub fn demo_extracted(&self) -> bool {
        self.prefs.demo_extracted()
    }

    pub fn progress_kind(&self) -> Option<SourceKind> {
        self.progress.as_ref().map(|source| source.kind())
    }

    pub fn spinner(&self) -> &'static str {
        SPINNER_FRAMES[self.spinner_frame % SPINNER_FRAMES.len()]
    }

    pub fn input_mode(&self) -> InputMode {
        if self.show_help {
            InputMode::Help
        } else if self.palette.is_open() {
            InputMode::Palette
        } else if self.modal.is_some() {
            InputMode::Modal
        } else if self.picker.is_some() {
            InputMode::Picker
        } else if self.current_pane().is_some_and(|p| p.search.editing) {
            InputMode::Search
        } else if self.view == View::Settings && self.settings.editing {
            InputMode::SettingsEdit
        } else {
            InputMode::Normal
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    pub fn tick_spinner(&mut self) {
        self.spinner_frame = self.spinner_frame.wrapping_add(1);
    }

    pub fn check_status_timeout(&mut self) {
        if let Some((_, since)) = &self.status_message {
            if since.elapsed() >= STATUS_TIMEOUT {
                self.status_message = None;
            }
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = AppEvent> + Send + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(task.await);
        });
    }

    // Loading

    fn load_demo(&mut self) {
        self.demo.loading = true;
        let api = self.api.clone();
        self.spawn(async move {
            let (config, user) = tokio::join!(api.get_demo_config(), api.get_demo_user());
            AppEvent::Demo(config.map(|config| (config, user.ok())))
        });
    }

    fn reload_feeds(&mut self) {
        for pane in self.panes.values_mut() {
            pane.items = Loadable::Idle;
            pane.search = SearchState::default();
        }
        self.search_debounce.cancel();
        if self.view.is_feed() {
            self.load_pane(self.view);
        }
    }

    fn load_pane(&mut self, view: View) {
        let demo = self.demo.is_demo();
        let demo_extracted = self.prefs.demo_extracted();
        let page_size = self.config.page_size;

        let Some(pane) = self.panes.get_mut(&view) else {
            return;
        };
        pane.fetch_generation += 1;
        let generation = pane.fetch_generation;

        // The demo feed stays empty until this session has run an extraction
        if demo && !demo_extracted {
            pane.items = Loadable::Ready(Vec::new());
            pane.reshape();
            return;
        }

        pane.items = Loadable::Loading;
        let types: Vec<ItemType> = match view.locked_type() {
            Some(locked) => vec![locked],
            None => pane.filters.types.iter().copied().collect(),
        };
        let senders: Vec<String> = pane.filters.senders.iter().cloned().collect();
        let tags: Vec<String> = pane.filters.tags.iter().cloned().collect();

        let api = self.api.clone();
        self.spawn(async move {
            let result = if demo {
                api.get_demo_feed(1, page_size, &types).await
            } else {
                match view {
                    View::Home => api.get_feed(1, page_size, &types, &senders, &tags).await,
                    View::Events => {
                        api.get_feed_by_type(ItemType::Event, 1, CALENDAR_PAGE_SIZE)
                            .await
                    }
                    _ => api.get_feed(1, page_size, &types, &[], &tags).await,
                }
            };
            AppEvent::Feed {
                view,
                generation,
                result: result.map(|page| page.items),
            }
        });
    }

    fn load_metrics(&mut self) {
        self.metrics = Loadable::Loading;
        let api = self.api.clone();
        self.spawn(async move {
            let (metrics, history, health) = tokio::join!(
                api.get_metrics(METRICS_DAYS),
                api.get_metrics_history(),
                api.get_health()
            );
            let history = history.unwrap_or_else(|e| {
                tracing::warn!("Metrics history unavailable: {}", e);
                Vec::new()
            });
            AppEvent::Metrics(metrics.map(|metrics| MetricsBundle {
                metrics,
                history,
                health: health.ok(),
            }))
        });
    }

    fn load_settings(&mut self) {
        self.settings.settings = Loadable::Loading;
        let api = self.api.clone();
        self.spawn(async move { AppEvent::Settings(api.get_pipeline_settings().await) });
    }

    fn refresh_unprocessed(&mut self) {
        self.stop_progress();
        self.panel.begin_refresh();
        let demo = self.demo.is_demo();
        let api = self.api.clone();
        self.spawn(async move {
            let result = if demo {
                api.get_demo_unprocessed_emails().await
            } else {
                api.get_unprocessed_emails().await
            };
            AppEvent::Unprocessed(result)
        });
    }

    fn load_email(&mut self, email_id: String) {
        if email_id.is_empty() {
            self.set_status("Item has no source email");
            return;
        }
        self.modal = Some(Modal::Email {
            email_id: email_id.clone(),
            detail: Loadable::Loading,
        });
        self.modal_scroll = 0;
        let api = self.api.clone();
        self.spawn(async move {
            let result = api.get_email_detail(&email_id, true).await;
            AppEvent::Email { email_id, result }
        });
    }

    /// Apply finished background work.
    pub fn poll_background(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Demo(result) => {
                self.demo.loading = false;
                match result {
                    Ok((config, user)) => {
                        if config.demo_mode {
                            tracing::info!("Demo mode is on");
                        }
                        self.demo.config = Some(config);
                        self.demo.user = user;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to check demo mode: {}", e);
                        self.demo.config = None;
                        self.demo.user = None;
                    }
                }
                self.reload_feeds();
                if self.progress.is_none() {
                    self.start_polling();
                }
            }
            AppEvent::Feed {
                view,
                generation,
                result,
            } => {
                let Some(pane) = self.panes.get_mut(&view) else {
                    return;
                };
                if pane.fetch_generation != generation {
                    return;
                }
                if let Err(e) = &result {
                    tracing::warn!("Failed to load {} feed: {}", view.key(), e);
                }
                pane.items = Loadable::from_result(result);
                pane.reshape();
            }
            AppEvent::Search {
                view,
                generation,
                result,
            } => {
                let Some(pane) = self.panes.get_mut(&view) else {
                    return;
                };
                if pane.search.generation != generation {
                    return;
                }
                pane.search.results = Loadable::from_result(result);
                pane.selected = 0;
                pane.reshape();
            }
            AppEvent::QuickSearch { generation, result } => match result {
                Ok(results) => {
                    self.palette.set_results(generation, results);
                }
                Err(e) => self.palette.search_failed(generation, &e.to_string()),
            },
            AppEvent::Unprocessed(result) => match result {
                Ok(emails) => self.panel.unprocessed_loaded(emails),
                Err(e) => {
                    tracing::warn!("Failed to fetch unprocessed emails: {}", e);
                    self.panel.unprocessed_failed(e.to_string());
                }
            },
            AppEvent::Metrics(result) => self.metrics = Loadable::from_result(result),
            AppEvent::Settings(result) => {
                if let Ok(settings) = &result {
                    self.settings.draft = settings.email_max_limit.to_string();
                }
                self.settings.settings = Loadable::from_result(result);
            }
            AppEvent::SettingsSaved(result) => {
                self.settings.saving = false;
                match result {
                    Ok(update) => {
                        if let Loadable::Ready(settings) = &mut self.settings.settings {
                            settings.email_max_limit = update.email_max_limit;
                        }
                        if !self.settings.editing {
                            self.settings.draft = update.email_max_limit.to_string();
                        }
                        self.settings.error = None;
                        self.set_status(format!("Email limit saved: {}", update.email_max_limit));
                        self.settings.last_saved = Some(update);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to save settings: {}", e);
                        self.settings.error = Some(e.to_string());
                    }
                }
            }
            AppEvent::DemoToggled(result) => {
                self.demo.busy = false;
                match result {
                    Ok(status) => {
                        self.set_status(if status.message.is_empty() {
                            format!("Demo mode {}", if status.enabled { "on" } else { "off" })
                        } else {
                            status.message
                        });
                        self.load_demo();
                    }
                    Err(e) => self.set_status(format!("Demo toggle failed: {e}")),
                }
            }
            AppEvent::DemoReset(result) => {
                self.demo.busy = false;
                match result {
                    Ok(()) => {
                        self.prefs.set_demo_extracted(false);
                        self.set_status("Demo reset");
                        self.reload_feeds();
                        self.refresh_unprocessed();
                    }
                    Err(e) => self.set_status(format!("Demo reset failed: {e}")),
                }
            }
            AppEvent::DemoMarked(result) => {
                match result {
                    Ok(marked) => tracing::info!(
                        "Marked {} demo emails extracted, {} remaining",
                        marked.marked_count,
                        marked.remaining_unprocessed
                    ),
                    Err(e) => tracing::warn!("Failed to mark demo emails extracted: {}", e),
                }
                self.prefs.set_demo_extracted(true);
                self.reload_feeds();
            }
            AppEvent::Email { email_id, result } => {
                if let Some(Modal::Email {
                    email_id: open_id,
                    detail,
                }) = &mut self.modal
                {
                    if *open_id == email_id {
                        *detail = Loadable::from_result(result);
                    }
                }
            }
            AppEvent::ItemDetail(result) => match result {
                Ok(full) => {
                    if let Some(Modal::Item(item)) = &mut self.modal {
                        if item.id == full.id {
                            **item = full;
                        }
                    }
                }
                Err(e) => tracing::warn!("Failed to load item details: {}", e),
            },
        }
    }

    // Extraction progress

    fn start_polling(&mut self) {
        self.stop_progress();
        let period = self.config.status_poll_interval();
        self.progress = Some(Box::new(PollSource::start(self.api.clone(), period)));
    }

    fn stop_progress(&mut self) {
        if let Some(mut source) = self.progress.take() {
            source.stop();
        }
    }

    pub fn poll_progress(&mut self) {
        let mut updates = Vec::new();
        if let Some(source) = self.progress.as_mut() {
            while let Some(update) = source.try_next() {
                updates.push(update);
            }
        }
        for update in updates {
            self.apply_progress(update);
        }
    }

    fn apply_progress(&mut self, update: ProgressUpdate) {
        let before = self.panel.state();
        self.panel.apply(&update);
        let after = self.panel.state();

        if update == ProgressUpdate::Ended {
            let Some(kind) = self.progress.take().map(|source| source.kind()) else {
                return;
            };
            match kind {
                // Stream closed without a verdict: follow along by polling
                SourceKind::Stream if self.panel.is_extracting() => self.start_polling(),
                SourceKind::Stream => {}
                SourceKind::Poll => self.refresh_unprocessed(),
            }
            return;
        }

        if before == PanelState::Extracting && after == PanelState::Complete {
            self.extraction_completed();
        }
    }

    fn extraction_completed(&mut self) {
        let total = self.panel.summary().map_or(0, |s| s.total_extracted());
        tracing::info!("Extraction complete: {} items", total);
        self.set_status(format!("Extraction complete: {total} items"));

        let ids = std::mem::take(&mut self.extracting_ids);
        if self.demo.is_demo() {
            let api = self.api.clone();
            self.spawn(async move { AppEvent::DemoMarked(api.mark_demo_extracted(&ids).await) });
        } else {
            self.reload_feeds();
        }
    }

    fn start_extraction(&mut self) -> Result<()> {
        if self.panel.is_loading() {
            return Ok(());
        }
        // Retry after a failed email fetch means fetching again
        if self.panel.state() == PanelState::Error && self.panel.unprocessed_count() == 0 {
            self.refresh_unprocessed();
            return Ok(());
        }

        let ids = self.panel.begin_extraction()?;
        self.stop_progress();
        match StreamSource::start(&self.api, ids.clone()) {
            Ok(source) => {
                self.progress = Some(Box::new(source));
                self.extracting_ids = ids;
            }
            Err(e) => self.panel.apply(&ProgressUpdate::Failed(e.to_string())),
        }
        Ok(())
    }

    pub fn poll_preferences(&mut self) {
        if !self.prefs_rx.has_changed().unwrap_or(false) {
            return;
        }
        let prefs = self.prefs_rx.borrow_and_update().clone();
        self.saved_tags = prefs.saved_tags;
        self.prism_expanded = prefs.prism_expanded;
    }

    // Actions

    /// Returns true when the app should quit. A failed action is reported in
    /// the status bar and never ends the session.
    pub fn handle_action(&mut self, action: AppAction) -> Result<bool> {
        match self.dispatch(action) {
            Ok(quit) => Ok(quit),
            Err(e) => {
                tracing::warn!("Action failed: {}", e);
                self.set_status(e.to_string());
                Ok(false)
            }
        }
    }

    fn dispatch(&mut self, action: AppAction) -> Result<bool> {
        match action {
            AppAction::Quit => {
                self.shutdown();
                return Ok(true);
            }
            AppAction::ShowHelp => self.show_help = true,
            AppAction::HideHelp => self.show_help = false,

            AppAction::SwitchView(view) => self.switch_view(view),
            AppAction::NextView => {
                let next = View::from_index((self.view.index() + 1) % View::ALL.len());
                self.switch_view(next.unwrap_or(View::Home));
            }
            AppAction::PrevView => {
                let len = View::ALL.len();
                let prev = View::from_index((self.view.index() + len - 1) % len);
                self.switch_view(prev.unwrap_or(View::Home));
            }

            AppAction::MoveUp => self.move_selection(-1),
            AppAction::MoveDown => self.move_selection(1),
            AppAction::MoveToTop => self.move_selection(isize::MIN),
            AppAction::MoveToBottom => self.move_selection(isize::MAX),
            AppAction::Refresh => self.refresh_view(),
            AppAction::Dismiss => self.dismiss(),

            AppAction::OpenDetail => {
                if let Some(item) = self.current_pane().and_then(FeedPane::selected_item) {
                    self.modal = Some(Modal::Item(Box::new(item.clone())));
                    self.modal_scroll = 0;
                }
            }
            AppAction::OpenEmail => {
                let email_id = match &self.modal {
                    Some(Modal::Item(item)) => Some(item.email_id.clone()),
                    Some(Modal::Email { .. }) => None,
                    None => self
                        .current_pane()
                        .and_then(FeedPane::selected_item)
                        .map(|item| item.email_id.clone()),
                };
                if let Some(email_id) = email_id {
                    self.load_email(email_id);
                }
            }
            AppAction::OpenInBrowser => self.open_in_browser()?,
            AppAction::CloseModal => self.modal = None,
            AppAction::ScrollUp => self.modal_scroll = self.modal_scroll.saturating_sub(1),
            AppAction::ScrollDown => self.modal_scroll = self.modal_scroll.saturating_add(1),

            AppAction::ToggleType(item_type) => {
                if self.view == View::Home {
                    self.update_filters(|f| f.toggle_type(item_type));
                }
            }
            AppAction::CycleStatus => self.update_filters(|f| f.status = f.status.next()),
            AppAction::ToggleSort => self.update_filters(|f| f.sort = f.sort.toggle()),
            AppAction::ClearTags => self.update_filters(|f| f.clear_tags()),

            AppAction::OpenTagPicker => self.open_picker(PickerKind::Tags),
            AppAction::OpenSenderPicker => self.open_picker(PickerKind::Senders),
            AppAction::PickerUp => {
                if let Some(picker) = &mut self.picker {
                    picker.selected = picker.selected.saturating_sub(1);
                }
            }
            AppAction::PickerDown => {
                if let Some(picker) = &mut self.picker {
                    let max = picker.entries.len().saturating_sub(1);
                    picker.selected = (picker.selected + 1).min(max);
                }
            }
            AppAction::PickerToggle => self.picker_toggle(),
            AppAction::PickerSave => self.picker_save()?,
            AppAction::PickerClearSaved => self.prefs.clear_saved_tags()?,
            AppAction::PickerClose => self.picker = None,

            AppAction::StartSearch => {
                if let Some(pane) = self.panes.get_mut(&self.view) {
                    pane.search.editing = true;
                }
            }
            AppAction::SearchChar(c) => {
                if let Some(pane) = self.panes.get_mut(&self.view) {
                    pane.search.query.push(c);
                }
                self.search_changed();
            }
            AppAction::SearchBackspace => {
                if let Some(pane) = self.panes.get_mut(&self.view) {
                    pane.search.query.pop();
                }
                self.search_changed();
            }
            AppAction::SearchSubmit => {
                if let Some(pane) = self.panes.get_mut(&self.view) {
                    pane.search.editing = false;
                }
            }
            AppAction::SearchCancel => self.clear_search(),

            AppAction::OpenPalette => {
                self.palette_debounce.cancel();
                self.palette.open();
            }
            AppAction::PaletteChar(c) => {
                let outcome = self.palette.input_char(c);
                self.apply_palette_outcome(outcome);
            }
            AppAction::PaletteBackspace => {
                let outcome = self.palette.backspace();
                self.apply_palette_outcome(outcome);
            }
            AppAction::PaletteUp => self.palette.move_up(),
            AppAction::PaletteDown => self.palette.move_down(),
            AppAction::PaletteTab => self.palette.switch_section(),
            AppAction::PaletteEnter => {
                let outcome = self.palette.activate();
                self.apply_palette_outcome(outcome);
            }
            AppAction::PaletteClose => {
                let outcome = self.palette.close();
                self.apply_palette_outcome(outcome);
            }

            AppAction::Extract => {
                if self.view == View::Home {
                    self.start_extraction()?;
                }
            }
            AppAction::RefreshUnprocessed => {
                if self.view == View::Home {
                    self.refresh_unprocessed();
                }
            }
            AppAction::TogglePrism => {
                if self.view == View::Home {
                    self.prefs.set_prism_expanded(!self.prism_expanded)?;
                }
            }

            AppAction::PrevMonth => self.move_month(false),
            AppAction::NextMonth => self.move_month(true),
            AppAction::PrevDay => self.move_day(-1),
            AppAction::NextDay => self.move_day(1),
            AppAction::CycleLevel => {
                if let Some(pane) = self.panes.get_mut(&View::Courses) {
                    if self.view == View::Courses {
                        pane.level = catalog::next_level(&pane.levels, pane.level.as_deref());
                        pane.selected = 0;
                        pane.reshape();
                    }
                }
            }

            AppAction::EditSettings => {
                if self.view == View::Settings && self.settings.settings.ready().is_some() {
                    self.settings.editing = true;
                }
            }
            AppAction::SettingsChar(c) => {
                if c.is_ascii_digit() && self.settings.draft.len() < 6 {
                    self.settings.draft.push(c);
                    self.schedule_settings_save();
                }
            }
            AppAction::SettingsBackspace => {
                self.settings.draft.pop();
                self.schedule_settings_save();
            }
            AppAction::SettingsDone => {
                self.settings.editing = false;
                if let Some(limit) = self.settings.draft_limit() {
                    self.settings.draft = limit.to_string();
                }
            }
            AppAction::IncreaseLimit => self.step_limit(LIMIT_STEP),
            AppAction::DecreaseLimit => self.step_limit(-LIMIT_STEP),
            AppAction::ToggleDemo => self.toggle_demo(),
            AppAction::ResetDemo => self.reset_demo(),
        }
        Ok(false)
    }

    fn shutdown(&mut self) {
        self.stop_progress();
        self.palette_debounce.cancel();
        self.search_debounce.cancel();
    }

    fn switch_view(&mut self, view: View) {
        if view == self.view {
            return;
        }
        self.picker = None;
        self.view = view;
        match view {
            View::Metrics if self.metrics.needs_load() => self.load_metrics(),
            View::Settings if self.settings.settings.needs_load() => self.load_settings(),
            _ => {
                let needs_load = self.panes.get(&view).is_some_and(|p| p.items.needs_load());
                if needs_load && !self.demo.loading {
                    self.load_pane(view);
                }
            }
        }
    }

    fn refresh_view(&mut self) {
        match self.view {
            View::Metrics => self.load_metrics(),
            View::Settings => self.load_settings(),
            view => {
                self.load_pane(view);
                if view == View::Home {
                    self.refresh_unprocessed();
                }
            }
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let Some(pane) = self.panes.get_mut(&self.view) else {
            return;
        };
        let max = pane.rows.len().saturating_sub(1);
        pane.selected = match delta {
            isize::MIN => 0,
            isize::MAX => max,
            d if d < 0 => pane.selected.saturating_sub(d.unsigned_abs()),
            d => (pane.selected + d.unsigned_abs()).min(max),
        };
    }

    fn dismiss(&mut self) {
        let Some(pane) = self.panes.get_mut(&self.view) else {
            return;
        };
        if pane.search.is_active() {
            self.clear_search();
        } else if pane.selected_day.is_some() {
            pane.selected_day = None;
            pane.reshape();
        }
    }

    fn open_in_browser(&mut self) -> Result<()> {
        let url = match &self.modal {
            Some(Modal::Item(item)) => item.url.clone(),
            Some(Modal::Email { .. }) => None,
            None => self
                .current_pane()
                .and_then(FeedPane::selected_item)
                .and_then(|item| item.url.clone()),
        };
        match url.filter(|u| !u.trim().is_empty()) {
            Some(url) => {
                open::that(&url)?;
                self.set_status(format!("Opened {url}"));
            }
            None => self.set_status("No link for this item"),
        }
        Ok(())
    }

    // Filters

    fn update_filters(&mut self, change: impl FnOnce(&mut FilterState)) {
        let view = self.view;
        let Some(pane) = self.panes.get_mut(&view) else {
            return;
        };
        let before = pane.filters.clone();
        change(&mut pane.filters);
        if pane.filters == before {
            return;
        }

        // Home sends type/sender/tag filters to the server; course and blog
        // pages are fetched by tag.
        let refetch = match view {
            View::Home => {
                before.types != pane.filters.types
                    || before.senders != pane.filters.senders
                    || before.tags != pane.filters.tags
            }
            View::Courses | View::Blogs => before.tags != pane.filters.tags,
            _ => false,
        };
        pane.selected = 0;
        pane.reshape();

        let filters = pane.filters.clone();
        if let Err(e) = self.prefs.set_filters(view.key(), &filters) {
            tracing::warn!("Failed to persist filters: {}", e);
        }
        if refetch {
            self.load_pane(view);
        }
        if self.panes.get(&view).is_some_and(|p| p.search.is_active()) {
            self.search_changed();
        }
    }

    fn open_picker(&mut self, kind: PickerKind) {
        let Some(pane) = self.current_pane() else {
            return;
        };
        let items = pane.loaded_items();
        let entries: Vec<PickerEntry> = match kind {
            PickerKind::Tags => tag_entries(items, &self.saved_tags),
            PickerKind::Senders => tags::sender_counts(items)
                .into_iter()
                .map(|s| PickerEntry {
                    label: format!("{} <{}>", s.sender, s.sender_email),
                    value: s.sender_email,
                    count: s.count,
                })
                .collect(),
        };
        if entries.is_empty() {
            self.set_status("Nothing to pick from yet");
            return;
        }
        self.picker = Some(Picker {
            kind,
            entries,
            selected: 0,
        });
    }

    fn picker_selection(&self) -> Option<(PickerKind, String)> {
        let picker = self.picker.as_ref()?;
        let entry = picker.entries.get(picker.selected)?;
        Some((picker.kind, entry.value.clone()))
    }

    fn picker_toggle(&mut self) {
        match self.picker_selection() {
            Some((PickerKind::Tags, tag)) => self.update_filters(|f| f.toggle_tag(&tag)),
            Some((PickerKind::Senders, sender)) => {
                self.update_filters(|f| f.toggle_sender(&sender))
            }
            None => {}
        }
    }

    /// Save or unsave the selected tag. Unsaving also drops it from the filter.
    fn picker_save(&mut self) -> Result<()> {
        let Some((PickerKind::Tags, tag)) = self.picker_selection() else {
            return Ok(());
        };
        let saved = self.prefs.toggle_saved_tag(&tag)?;
        if !saved {
            self.update_filters(|f| {
                f.tags.remove(&tag);
            });
        }
        Ok(())
    }

    // Search

    fn search_changed(&mut self) {
        let view = self.view;
        let Some(pane) = self.panes.get_mut(&view) else {
            return;
        };
        pane.search.generation += 1;
        let generation = pane.search.generation;
        let query = pane.search.query.trim().to_string();

        if query.is_empty() {
            pane.search.results = Loadable::Idle;
            pane.reshape();
            self.search_debounce.cancel();
            return;
        }

        pane.search.results = Loadable::Loading;
        let types = match view.locked_type() {
            Some(locked) => vec![locked],
            None if pane.filters.types.is_empty() => ItemType::ALL.to_vec(),
            None => pane.filters.types.iter().copied().collect(),
        };
        let tags: Vec<String> = pane.filters.tags.iter().cloned().collect();
        let request = SearchRequest {
            query,
            types: Some(types),
            tags: (!tags.is_empty()).then_some(tags),
            limit: Some(SEARCH_LIMIT),
            ..Default::default()
        };

        let api = self.api.clone();
        let tx = self.tx.clone();
        self.search_debounce.schedule(async move {
            let result = api.search(&request).await.map(|r| r.results);
            let _ = tx.send(AppEvent::Search {
                view,
                generation,
                result,
            });
        });
    }

    fn clear_search(&mut self) {
        self.search_debounce.cancel();
        if let Some(pane) = self.panes.get_mut(&self.view) {
            pane.search.generation += 1;
            pane.search.query.clear();
            pane.search.editing = false;
            pane.search.results = Loadable::Idle;
            pane.reshape();
        }
    }

    fn apply_palette_outcome(&mut self, outcome: PaletteOutcome) {
        match outcome {
            PaletteOutcome::None => {}
            PaletteOutcome::Search { query, generation } => {
                let api = self.api.clone();
                let tx = self.tx.clone();
                let limit = self.config.quick_search_limit;
                self.palette_debounce.schedule(async move {
                    let result = api.quick_search(&query, limit).await.map(|r| r.results);
                    let _ = tx.send(AppEvent::QuickSearch { generation, result });
                });
            }
            PaletteOutcome::ClearResults | PaletteOutcome::Closed => self.palette_debounce.cancel(),
            PaletteOutcome::Navigate(view) => {
                self.palette_debounce.cancel();
                self.switch_view(view);
            }
            PaletteOutcome::OpenItem(item) => {
                self.palette_debounce.cancel();
                // Quick search hits are abbreviated; fetch the full record
                let api = self.api.clone();
                let (id, item_type) = (item.id.clone(), item.item_type);
                self.spawn(async move { AppEvent::ItemDetail(api.get_feed_item(&id, item_type).await) });
                self.modal = Some(Modal::Item(item));
                self.modal_scroll = 0;
            }
        }
    }

    // Calendar

    fn move_month(&mut self, forward: bool) {
        if self.view != View::Events {
            return;
        }
        if let Some(pane) = self.panes.get_mut(&View::Events) {
            pane.cursor = if forward {
                pane.cursor.next()
            } else {
                pane.cursor.prev()
            };
            pane.selected_day = None;
            pane.selected = 0;
            pane.reshape();
        }
    }

    fn move_day(&mut self, delta: i32) {
        if self.view != View::Events {
            return;
        }
        let today = Utc::now().date_naive();
        if let Some(pane) = self.panes.get_mut(&View::Events) {
            let last = pane.cursor.days_in_month();
            let start = match pane.selected_day {
                Some(day) => day,
                None if MonthCursor::containing(today) == pane.cursor => today.day(),
                None => 1,
            };
            let day = (i64::from(start) + i64::from(delta)).clamp(1, i64::from(last));
            pane.selected_day = u32::try_from(day).ok();
            pane.selected = 0;
            pane.reshape();
        }
    }

    // Settings and demo

    fn schedule_settings_save(&mut self) {
        let Ok(raw) = self.settings.draft.trim().parse::<i64>() else {
            self.settings_debounce.cancel();
            self.settings.saving = false;
            return;
        };
        self.settings.saving = true;
        let api = self.api.clone();
        let tx = self.tx.clone();
        self.settings_debounce.schedule(async move {
            let _ = tx.send(AppEvent::SettingsSaved(api.update_pipeline_settings(raw).await));
        });
    }

    fn step_limit(&mut self, step: i64) {
        if self.view != View::Settings {
            return;
        }
        let Some(current) = self
            .settings
            .draft_limit()
            .or_else(|| self.settings.settings.ready().map(|s| s.email_max_limit))
        else {
            return;
        };
        let next = PipelineSettings::clamp_email_limit(i64::from(current) + step);
        self.settings.draft = next.to_string();
        self.schedule_settings_save();
    }

    fn toggle_demo(&mut self) {
        if self.view != View::Settings || self.demo.busy {
            return;
        }
        self.demo.busy = true;
        let enable = !self.demo.is_demo();
        let api = self.api.clone();
        self.spawn(async move { AppEvent::DemoToggled(api.toggle_demo(enable).await) });
    }

    fn reset_demo(&mut self) {
        if self.view != View::Settings || self.demo.busy || !self.demo.is_demo() {
            return;
        }
        self.demo.busy = true;
        let api = self.api.clone();
        self.spawn(async move { AppEvent::DemoReset(api.reset_demo().await.map(|_| ())) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone};
    use tempfile::TempDir;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::http::header;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use crate::feed::engine::StatusFilter;

    // Items from one email share its timestamp exactly
    fn received_base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn item(id: &str, item_type: ItemType, email_id: &str, hours_ago: i64) -> FeedItem {
        FeedItem {
            id: id.to_string(),
            item_type,
            email_id: email_id.to_string(),
            sender_email: "news@example.com".to_string(),
            received_at: Some(received_base() - ChronoDuration::hours(hours_ago)),
            ..Default::default()
        }
    }

    #[test]
    fn views_round_trip_through_index() {
        for view in View::ALL {
            assert_eq!(View::from_index(view.index()), Some(view));
        }
        assert_eq!(View::from_index(6), None);
        assert_eq!(View::Courses.locked_type(), Some(ItemType::Course));
        assert!(!View::Metrics.is_feed());
    }

    #[test]
    fn tag_picker_lists_quick_bar_then_the_rest_once() {
        let items: Vec<FeedItem> = (0..12)
            .map(|n| {
                let mut tagged = item(&n.to_string(), ItemType::Blog, "E1", 1);
                tagged.tags = vec!["common".to_string(), format!("tag{n}")];
                tagged
            })
            .collect();
        let saved = vec!["missing".to_string()];

        let entries = tag_entries(&items, &saved);
        let values: Vec<&str> = entries.iter().map(|e| e.value.as_str()).collect();

        assert_eq!(values[0], "missing");
        assert_eq!(entries[0].count, 0);
        assert_eq!(values[1], "common");
        assert_eq!(entries[1].count, 12);
        // 1 saved + "common" + 12 singles, each exactly once
        assert_eq!(values.len(), 14);
        let mut unique = values.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), values.len());
    }

    #[test]
    fn home_pane_groups_rows_by_email() {
        let mut pane = FeedPane::new(View::Home, FilterState::default());
        pane.items = Loadable::Ready(vec![
            item("1", ItemType::Event, "E1", 5),
            item("2", ItemType::Blog, "E2", 1),
            item("3", ItemType::Course, "E1", 5),
        ]);
        pane.reshape();

        assert_eq!(pane.groups.len(), 2);
        assert_eq!(pane.groups[0].email_id, "E2");
        let ids: Vec<&str> = pane.rows.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1", "3"]);
    }

    #[test]
    fn search_results_replace_feed_and_keep_rank() {
        let mut pane = FeedPane::new(View::Blogs, FilterState::default());
        pane.items = Loadable::Ready(vec![item("feed", ItemType::Blog, "E1", 1)]);
        pane.search.query = "rust".into();
        pane.search.results = Loadable::Ready(vec![
            item("old", ItemType::Blog, "E2", 48),
            item("course", ItemType::Course, "E3", 1),
            item("new", ItemType::Blog, "E4", 1),
        ]);
        pane.reshape();

        let ids: Vec<&str> = pane.rows.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new"]);

        pane.search.query.clear();
        pane.reshape();
        assert_eq!(pane.rows[0].id, "feed");
    }

    #[test]
    fn course_level_filter_runs_before_the_engine() {
        let mut beginner = item("1", ItemType::Course, "E1", 1);
        beginner.level = Some("Beginner".into());
        let mut advanced = item("2", ItemType::Course, "E2", 2);
        advanced.level = Some("Advanced".into());

        let mut pane = FeedPane::new(View::Courses, FilterState::default());
        pane.items = Loadable::Ready(vec![beginner, advanced]);
        pane.reshape();
        assert_eq!(pane.levels, vec!["Beginner", "Advanced"]);

        pane.level = Some("advanced".into());
        pane.reshape();
        assert_eq!(pane.rows.len(), 1);
        assert_eq!(pane.rows[0].id, "2");
    }

    #[test]
    fn events_pane_narrows_to_the_selected_day() {
        let mut on_day = item("1", ItemType::Event, "E1", 1);
        on_day.start_time = Some(Utc.with_ymd_and_hms(2025, 3, 14, 18, 0, 0).unwrap());
        let mut other_day = item("2", ItemType::Event, "E2", 1);
        other_day.start_time = Some(Utc.with_ymd_and_hms(2025, 3, 20, 18, 0, 0).unwrap());

        let filters = FilterState {
            status: StatusFilter::Any,
            ..Default::default()
        };
        let mut pane = FeedPane::new(View::Events, filters);
        pane.cursor = MonthCursor { year: 2025, month: 3 };
        pane.items = Loadable::Ready(vec![on_day, other_day]);
        pane.reshape();
        assert_eq!(pane.rows.len(), 2);
        assert_eq!(pane.day_counts.get(&14), Some(&1));

        pane.selected_day = Some(14);
        pane.reshape();
        assert_eq!(pane.rows.len(), 1);
        assert_eq!(pane.rows[0].id, "1");
    }

    #[test]
    fn settings_draft_is_clamped() {
        let settings = SettingsPane {
            draft: "600".into(),
            ..Default::default()
        };
        assert_eq!(settings.draft_limit(), Some(500));
        let empty = SettingsPane::default();
        assert_eq!(empty.draft_limit(), None);
    }

    // A POST to the extract endpoint opens a stream that closes without a
    // `complete` event; the status endpoint then reports one running check.
    async fn backend() -> String {
        let busy = Arc::new(AtomicUsize::new(0));
        let extract_busy = busy.clone();
        let app = Router::new()
            .route(
                "/api/demo/config",
                get(|| async { Json(json!({"demo_mode": false})) }),
            )
            .route(
                "/api/demo/user",
                get(|| async { Json(json!({"name": "Demo", "email": "demo@example.com"})) }),
            )
            .route(
                "/api/feed",
                get(|| async {
                    Json(json!({
                        "items": [
                            {"id": "a", "email_id": "E1", "item_type": "event", "title": "Meetup",
                             "received_at": "2025-02-10T08:00:00", "tags": ["rust"]},
                            {"id": "b", "email_id": "E1", "item_type": "blog", "title": "Post",
                             "received_at": "2025-02-10T08:00:00", "tags": ["rust", "async"]}
                        ],
                        "total": 2, "page": 1, "page_size": 50, "has_more": false
                    }))
                }),
            )
            .route(
                "/api/pipeline/extraction-status",
                get(move || async move {
                    let running = busy
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                        .is_ok();
                    if running {
                        Json(json!({
                            "is_extracting": true,
                            "progress": {"current": 1, "total": 1, "events": 0, "courses": 0,
                                         "blogs": 0, "message": "Extracting"}
                        }))
                    } else {
                        Json(json!({"is_extracting": false, "progress": null}))
                    }
                }),
            )
            .route(
                "/api/pipeline/extract",
                post(move || async move {
                    extract_busy.store(1, Ordering::SeqCst);
                    (
                        [(header::CONTENT_TYPE, "text/event-stream")],
                        "event: start\ndata: {\"total_emails\": 1, \"message\": \"Starting\"}\n\n",
                    )
                }),
            )
            .route(
                "/api/pipeline/unprocessed-emails",
                get(|| async {
                    Json(json!({
                        "emails": [{"id": "U1", "subject": "Digest", "sender": "News",
                                    "sender_email": "news@example.com"}],
                        "unprocessed_count": 1,
                        "hours_back": 8
                    }))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn settle(app: &mut App, done: impl Fn(&App) -> bool) {
        for _ in 0..500 {
            app.poll_background();
            app.poll_progress();
            app.poll_preferences();
            if done(app) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("app did not settle");
    }

    #[tokio::test]
    async fn startup_loads_feed_and_unprocessed_emails() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            api_base_url: backend().await,
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let mut app = App::new(&config).await.unwrap();

        settle(&mut app, |app| {
            app.pane(View::Home).is_some_and(|p| p.items.ready().is_some())
                && app.panel.state() == PanelState::Ready
        })
        .await;

        let home = app.pane(View::Home).unwrap();
        assert_eq!(home.groups.len(), 1);
        assert_eq!(home.rows.len(), 2);
        assert_eq!(app.panel.unprocessed_count(), 1);
        assert!(app.progress_kind().is_none());

        // Saving a tag reaches the app through the preference subscription
        app.handle_action(AppAction::OpenTagPicker).unwrap();
        assert_eq!(app.picker.as_ref().unwrap().entries[0].value, "rust");
        app.handle_action(AppAction::PickerSave).unwrap();
        app.poll_preferences();
        assert_eq!(app.saved_tags, vec!["rust"]);
    }

    #[tokio::test]
    async fn dropped_stream_hands_over_to_polling_until_idle() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            api_base_url: backend().await,
            data_dir: Some(dir.path().to_path_buf()),
            status_poll_secs: 1,
            ..Default::default()
        };
        let mut app = App::new(&config).await.unwrap();

        // Startup polling has run and ended with a fresh unprocessed list
        settle(&mut app, |app| {
            app.panel.state() == PanelState::Ready
                && !app.panel.is_loading()
                && app.progress_kind().is_none()
        })
        .await;

        app.handle_action(AppAction::Extract).unwrap();
        assert_eq!(app.progress_kind(), Some(SourceKind::Stream));
        assert!(app.panel.is_extracting());

        // The stream closes with no verdict, so a poller replaces it
        settle(&mut app, |app| app.progress_kind() == Some(SourceKind::Poll)).await;
        assert!(app.panel.is_extracting());

        // Idle status ends the poller, which refreshes the email list
        settle(&mut app, |app| {
            app.progress_kind().is_none()
                && !app.panel.is_loading()
                && app.panel.state() == PanelState::Ready
        })
        .await;
        assert_eq!(app.panel.unprocessed_count(), 1);
    }

    #[tokio::test]
    async fn filters_persist_per_view() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            api_base_url: backend().await,
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        {
            let mut app = App::new(&config).await.unwrap();
            app.handle_action(AppAction::CycleStatus).unwrap();
            app.handle_action(AppAction::Quit).unwrap();
        }

        let app = App::new(&config).await.unwrap();
        assert_eq!(
            app.pane(View::Home).unwrap().filters.status,
            StatusFilter::Upcoming
        );
        assert_eq!(
            app.pane(View::Events).unwrap().filters.status,
            StatusFilter::Any
        );
    }
}
