use chrono::{DateTime, Utc};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Tabs, Wrap};

use crate::app::{App, FeedPane, Loadable, MetricsBundle, Modal, Picker, PickerKind, View};
use crate::feed::calendar::{self, WEEKDAYS};
use crate::feed::tags::{self, QUICK_BAR_LIMIT};
use crate::models::{EmailDetail, FeedItem, ItemType, EMAIL_LIMIT_MAX, EMAIL_LIMIT_MIN};
use crate::palette::{PaletteSection, QUICK_ACTIONS};
use crate::progress::{PanelState, SourceKind};

use super::InputMode;

const MONTH_INITIALS: [char; 12] = ['J', 'F', 'M', 'A', 'M', 'J', 'J', 'A', 'S', 'O', 'N', 'D'];
const SPARK_BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub fn draw(frame: &mut Frame, app: &App) {
    let area = frame.area();
    let banner = app
        .demo
        .config
        .as_ref()
        .and_then(|c| c.banner_text())
        .filter(|_| app.demo.is_demo());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(u16::from(banner.is_some())),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

    render_tabs(frame, chunks[0], app);
    if let Some(text) = banner {
        frame.render_widget(
            Paragraph::new(format!(" {text}"))
                .style(Style::default().fg(Color::Black).bg(Color::Yellow)),
            chunks[1],
        );
    }

    match app.view {
        View::Home => render_home(frame, chunks[2], app),
        View::Events => render_events(frame, chunks[2], app),
        View::Courses => render_courses(frame, chunks[2], app),
        View::Blogs => render_blogs(frame, chunks[2], app),
        View::Metrics => render_metrics(frame, chunks[2], app),
        View::Settings => render_settings(frame, chunks[2], app),
    }

    render_status_bar(frame, chunks[3], app);

    if let Some(picker) = &app.picker {
        render_picker(frame, area, app, picker);
    }
    if let Some(modal) = &app.modal {
        render_modal(frame, area, app, modal);
    }
    if app.palette.is_open() {
        render_palette(frame, area, app);
    }
    if app.show_help {
        render_help(frame, area);
    }
}

fn type_style(item_type: ItemType) -> Style {
    let color = match item_type {
        ItemType::Event => Color::Blue,
        ItemType::Course => Color::Green,
        ItemType::Blog => Color::Magenta,
    };
    Style::default().fg(color)
}

fn type_badge(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Event => "EVT",
        ItemType::Course => "CRS",
        ItemType::Blog => "BLG",
    }
}

fn short_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%b %d").to_string()).unwrap_or_default()
}

fn dim() -> Style {
    Style::default().fg(Color::DarkGray)
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn titled(title: impl Into<String>) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", title.into()))
}

fn render_tabs(frame: &mut Frame, area: Rect, app: &App) {
    let titles: Vec<String> = View::ALL
        .iter()
        .enumerate()
        .map(|(i, view)| format!("{} {}", i + 1, view.title()))
        .collect();
    let mut tabs = Tabs::new(titles)
        .select(app.view.index())
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .divider("│");
    if app.demo.is_demo() {
        tabs = tabs.style(Style::default().fg(Color::Yellow));
    }
    frame.render_widget(tabs, area);
}

/// Draws the loading or error state of a pane. Returns false when the caller
/// should draw content instead.
fn render_fetch_state<T>(frame: &mut Frame, area: Rect, app: &App, state: &Loadable<T>, block: Block) -> bool {
    let (text, style) = match state {
        Loadable::Idle | Loadable::Loading => {
            (format!("{} Loading...", app.spinner()), dim())
        }
        Loadable::Failed(message) => (
            format!("Error: {message}\n\nPress r to retry"),
            Style::default().fg(Color::Red),
        ),
        Loadable::Ready(_) => return false,
    };
    frame.render_widget(
        Paragraph::new(text)
            .style(style)
            .wrap(Wrap { trim: false })
            .block(block),
        area,
    );
    true
}

fn render_empty(frame: &mut Frame, area: Rect, block: Block, text: &str) {
    frame.render_widget(
        Paragraph::new(text).style(dim()).wrap(Wrap { trim: false }).block(block),
        area,
    );
}

// Home

fn render_home(frame: &mut Frame, area: Rect, app: &App) {
    let Some(pane) = app.pane(View::Home) else {
        return;
    };
    let panel_height = if app.prism_expanded { 10 } else { 3 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(panel_height),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(3),
        ])
        .split(area);

    render_prism(frame, chunks[0], app);
    render_filter_bar(frame, chunks[1], app, pane);
    render_tag_bar(frame, chunks[2], app, pane);
    render_feed_list(frame, chunks[3], app, pane, "Feed");
}

fn render_prism(frame: &mut Frame, area: Rect, app: &App) {
    let panel = &app.panel;
    let source = match app.progress_kind() {
        Some(SourceKind::Stream) => " · live",
        Some(SourceKind::Poll) => " · polling",
        None => "",
    };
    let title = format!("Prism · {}{}", panel.state().name(), source);

    if !app.prism_expanded {
        let summary = format!(
            "{} unprocessed emails · p to expand",
            panel.unprocessed_count()
        );
        frame.render_widget(Paragraph::new(summary).style(dim()).block(titled(title)), area);
        return;
    }

    let block = titled(title);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(inner);

    // Left: the emails waiting for extraction
    let hours = panel.unprocessed().and_then(|u| u.hours_back).unwrap_or(8);
    let mut lines = vec![Line::from(Span::styled(
        format!("Unprocessed ({hours}h): {}", panel.unprocessed_count()),
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    if let Some(unprocessed) = panel.unprocessed() {
        for email in unprocessed.emails.iter().take(usize::from(inner.height.saturating_sub(1))) {
            lines.push(Line::from(vec![
                Span::styled(format!("{:<16.16} ", email.sender), dim()),
                Span::raw(email.subject.clone()),
            ]));
        }
    }
    frame.render_widget(Paragraph::new(lines), columns[0]);

    render_extraction_state(frame, columns[1], app);
}

fn render_extraction_state(frame: &mut Frame, area: Rect, app: &App) {
    let panel = &app.panel;
    if panel.is_loading() {
        frame.render_widget(
            Paragraph::new(format!("{} Checking inbox...", app.spinner())).style(dim()),
            area,
        );
        return;
    }

    match panel.state() {
        PanelState::Empty => {
            frame.render_widget(
                Paragraph::new("All caught up.\nR to check again").style(dim()),
                area,
            );
        }
        PanelState::Ready => {
            let text = format!(
                "{} emails ready\n\nX to extract · R to refresh",
                panel.unprocessed_count()
            );
            frame.render_widget(Paragraph::new(text).style(Style::default().fg(Color::Cyan)), area);
        }
        PanelState::Extracting => {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(1), Constraint::Min(1)])
                .split(area);
            let progress = panel.progress().cloned().unwrap_or_default();
            frame.render_widget(
                Gauge::default()
                    .gauge_style(Style::default().fg(Color::Cyan))
                    .percent(progress.percent())
                    .label(format!("{}/{}", progress.current, progress.total)),
                chunks[0],
            );
            let mut lines = vec![
                Line::from(format!("{} {}", app.spinner(), progress.message)),
                Line::from(vec![
                    Span::styled(format!("{} events ", progress.events), type_style(ItemType::Event)),
                    Span::styled(format!("{} courses ", progress.courses), type_style(ItemType::Course)),
                    Span::styled(format!("{} blogs", progress.blogs), type_style(ItemType::Blog)),
                ]),
            ];
            lines.extend(panel.notes().map(|note| Line::from(Span::styled(note.to_string(), dim()))));
            frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), chunks[1]);
        }
        PanelState::Complete => {
            let summary = panel.summary().copied().unwrap_or_default();
            let lines = vec![
                Line::from(Span::styled(
                    format!("Extracted {} items", summary.total_extracted()),
                    Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
                )),
                Line::from(vec![
                    Span::styled(format!("{} events ", summary.events), type_style(ItemType::Event)),
                    Span::styled(format!("{} courses ", summary.courses), type_style(ItemType::Course)),
                    Span::styled(format!("{} blogs", summary.blogs), type_style(ItemType::Blog)),
                ]),
                Line::from(format!(
                    "{} emails processed · {} errors",
                    summary.emails_processed, summary.errors
                )),
                Line::from(""),
                Line::from(Span::styled("R to check for more", dim())),
            ];
            frame.render_widget(Paragraph::new(lines), area);
        }
        PanelState::Error => {
            let text = format!(
                "Extraction failed: {}\n\nX to retry · R to refresh",
                panel.error().unwrap_or("unknown error")
            );
            frame.render_widget(
                Paragraph::new(text)
                    .style(Style::default().fg(Color::Red))
                    .wrap(Wrap { trim: true }),
                area,
            );
        }
    }
}

fn render_filter_bar(frame: &mut Frame, area: Rect, app: &App, pane: &FeedPane) {
    let filters = &pane.filters;
    let mut spans = Vec::new();

    if app.view == View::Home {
        for (key, item_type) in [('e', ItemType::Event), ('c', ItemType::Course), ('b', ItemType::Blog)] {
            let active = filters.types.contains(&item_type);
            let style = if active {
                type_style(item_type).add_modifier(Modifier::BOLD | Modifier::REVERSED)
            } else {
                dim()
            };
            spans.push(Span::styled(format!(" {key}:{} ", item_type.plural_label()), style));
        }
        spans.push(Span::raw(" │ "));
    }

    spans.push(Span::raw(format!("status: {} (f)", filters.status.label())));
    spans.push(Span::raw(" │ "));
    let sort = if pane.showing_search() {
        "ranked".to_string()
    } else {
        filters.sort.label().to_string()
    };
    spans.push(Span::raw(format!("sort: {sort} (s)")));
    if !filters.senders.is_empty() {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(
            format!("senders: {} (F)", filters.senders.len()),
            Style::default().fg(Color::Yellow),
        ));
    }
    if pane.search.is_active() || pane.search.editing {
        spans.push(Span::raw(" │ "));
        let cursor = if pane.search.editing { "█" } else { "" };
        let pending = if pane.search.results.is_loading() && pane.search.is_active() {
            format!(" {}", app.spinner())
        } else {
            String::new()
        };
        spans.push(Span::styled(
            format!("/{}{cursor}{pending}", pane.search.query),
            Style::default().fg(Color::Cyan),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_tag_bar(frame: &mut Frame, area: Rect, app: &App, pane: &FeedPane) {
    let chips = tags::quick_bar_tags(pane.loaded_items(), &app.saved_tags, QUICK_BAR_LIMIT);
    if chips.is_empty() {
        frame.render_widget(Paragraph::new(" no tags yet").style(dim()), area);
        return;
    }
    let mut spans = vec![Span::styled(" tags (t): ", dim())];
    for chip in chips {
        let saved = app.saved_tags.contains(&chip.tag);
        let active = pane.filters.tags.contains(&chip.tag);
        let mut style = if saved {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        if active {
            style = style.add_modifier(Modifier::REVERSED);
        }
        let star = if saved { "★" } else { "" };
        spans.push(Span::styled(format!("{star}{}({}) ", chip.tag, chip.count), style));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn item_lines(item: &FeedItem, indent: &str) -> Vec<Line<'static>> {
    let mut head = vec![
        Span::raw(indent.to_string()),
        Span::styled(format!("{} ", type_badge(item.item_type)), type_style(item.item_type)),
        Span::styled(item.title.clone(), Style::default().add_modifier(Modifier::BOLD)),
    ];
    let when = match item.item_type {
        ItemType::Event => item.start_time.map(|t| t.format(" · %a %b %d %H:%M").to_string()),
        ItemType::Course => item.level.as_ref().map(|l| format!(" · {l}")),
        ItemType::Blog => item.reading_time.as_ref().map(|r| format!(" · {r}")),
    };
    if let Some(when) = when {
        head.push(Span::styled(when, dim()));
    }

    let mut lines = vec![Line::from(head)];
    if let Some(summary) = item.summary() {
        lines.push(Line::from(Span::styled(format!("{indent}    {summary}"), dim())));
    }
    lines
}

fn render_feed_list(frame: &mut Frame, area: Rect, app: &App, pane: &FeedPane, title: &str) {
    let count = pane.rows.len();
    let title = if pane.showing_search() {
        format!("{title} · {count} results for \"{}\"", pane.search.query.trim())
    } else {
        format!("{title} · {count}")
    };
    let block = titled(title);

    // Search results stand in for the feed while they are shown
    if !pane.showing_search() && render_fetch_state(frame, area, app, &pane.items, block.clone()) {
        return;
    }
    if pane.rows.is_empty() {
        let text = if app.demo.is_demo() && !app.demo_extracted() {
            "Demo mode: run an extraction on Home (X) to fill the feed"
        } else if pane.filters.is_unfiltered() && !pane.search.is_active() {
            "Nothing here yet"
        } else {
            "No items match the current filters"
        };
        render_empty(frame, area, block, text);
        return;
    }

    let mut items = Vec::new();
    let mut selected_index = 0;
    if pane.view == View::Home {
        let mut row = 0;
        for group in &pane.groups {
            items.push(ListItem::new(Line::from(vec![
                Span::styled(
                    format!("✉ {} ", group.email_subject),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ),
                Span::styled(format!("· {} · {}", group.sender, short_date(group.received_at)), dim()),
            ])));
            for item in &group.items {
                if row == pane.selected {
                    selected_index = items.len();
                }
                items.push(ListItem::new(item_lines(item, "  ")));
                row += 1;
            }
        }
    } else {
        for item in &pane.rows {
            let mut lines = item_lines(item, "");
            lines.push(Line::from(Span::styled(
                format!("    {} · {}", item.sender, short_date(item.received_at)),
                dim(),
            )));
            items.push(ListItem::new(lines));
        }
        selected_index = pane.selected;
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("▶ ");
    let mut state = ListState::default();
    state.select(Some(selected_index));
    frame.render_stateful_widget(list, area, &mut state);
}

// Typed views

fn render_events(frame: &mut Frame, area: Rect, app: &App) {
    let Some(pane) = app.pane(View::Events) else {
        return;
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(11), Constraint::Length(1), Constraint::Min(3)])
        .split(area);

    render_calendar(frame, chunks[0], pane);
    render_filter_bar(frame, chunks[1], app, pane);
    let title = match pane.selected_day.and_then(|d| pane.cursor.date_with_day(d)) {
        Some(date) => format!("Events on {}", date.format("%a %b %d")),
        None => "Events".to_string(),
    };
    render_feed_list(frame, chunks[2], app, pane, &title);
}

fn render_calendar(frame: &mut Frame, area: Rect, pane: &FeedPane) {
    let cursor = pane.cursor;
    let title = pane
        .cursor
        .first_day()
        .map(|d| d.format("%B %Y").to_string())
        .unwrap_or_default();
    let today = Utc::now().date_naive();

    let mut lines = vec![Line::from(
        WEEKDAYS
            .iter()
            .map(|w| Span::styled(format!("{:<6}", w.to_string()), dim()))
            .collect::<Vec<_>>(),
    )];

    let mut cells: Vec<Span> = (0..cursor.leading_blanks())
        .map(|_| Span::raw("      "))
        .collect();
    for day in 1..=cursor.days_in_month() {
        let count = pane.day_counts.get(&day).copied().unwrap_or(0);
        let text = if count > 0 {
            format!("{day:>2}•{count:<2} ")
        } else {
            format!("{day:>2}    ")
        };
        let mut style = if count > 0 {
            type_style(ItemType::Event)
        } else {
            Style::default()
        };
        if cursor.date_with_day(day) == Some(today) {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
        if pane.selected_day == Some(day) {
            style = style.add_modifier(Modifier::REVERSED);
        }
        cells.push(Span::styled(text, style));
        if cells.len() == 7 {
            lines.push(Line::from(std::mem::take(&mut cells)));
        }
    }
    if !cells.is_empty() {
        lines.push(Line::from(cells));
    }

    // Year at a glance
    let per_month = calendar::events_per_month(pane.loaded_items(), cursor.year);
    let strip: Vec<Span> = per_month
        .iter()
        .zip(MONTH_INITIALS)
        .enumerate()
        .map(|(i, (count, initial))| {
            let style = if i + 1 == cursor.month as usize {
                Style::default().add_modifier(Modifier::REVERSED)
            } else if *count > 0 {
                type_style(ItemType::Event)
            } else {
                dim()
            };
            Span::styled(format!("{initial}{count} "), style)
        })
        .collect();
    lines.push(Line::from(strip));

    frame.render_widget(
        Paragraph::new(lines).block(titled(format!("{title} · H/L month · h/l day"))),
        area,
    );
}

fn render_courses(frame: &mut Frame, area: Rect, app: &App) {
    let Some(pane) = app.pane(View::Courses) else {
        return;
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Min(3)])
        .split(area);

    let level = pane.level.as_deref().unwrap_or("all levels");
    let mut spans = vec![Span::raw(format!(" level: {level} (v)"))];
    if !pane.levels.is_empty() {
        spans.push(Span::styled(format!("  [{}]", pane.levels.join(", ")), dim()));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), chunks[0]);
    render_tag_bar(frame, chunks[1], app, pane);
    render_feed_list(frame, chunks[2], app, pane, "Courses");
}

fn render_blogs(frame: &mut Frame, area: Rect, app: &App) {
    let Some(pane) = app.pane(View::Blogs) else {
        return;
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Min(3)])
        .split(area);
    render_filter_bar(frame, chunks[0], app, pane);
    render_tag_bar(frame, chunks[1], app, pane);
    render_feed_list(frame, chunks[2], app, pane, "Blogs");
}

// Metrics

fn spark(values: &[f64]) -> String {
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    let min = values.iter().copied().fold(f64::MAX, f64::min);
    let range = (max - min).max(f64::EPSILON);
    values
        .iter()
        .map(|v| {
            let idx = (((v - min) / range) * (SPARK_BARS.len() - 1) as f64).round() as usize;
            SPARK_BARS[idx.min(SPARK_BARS.len() - 1)]
        })
        .collect()
}

fn percent(value: Option<f64>) -> String {
    value.map_or("n/a".to_string(), |v| format!("{:.1}%", v * 100.0))
}

fn render_metrics(frame: &mut Frame, area: Rect, app: &App) {
    let block = titled("Metrics · r to refresh");
    if render_fetch_state(frame, area, app, &app.metrics, block.clone()) {
        return;
    }
    let Some(MetricsBundle {
        metrics,
        history,
        health,
    }) = app.metrics.ready()
    else {
        return;
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("Emails processed  ", dim()),
            Span::styled(
                metrics.total_emails_processed.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::styled("    Items extracted  ", dim()),
            Span::styled(
                metrics.total_items_extracted.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(format!(
            "Precision {}   MRR {}   Latency {}   Dedup {}",
            percent(metrics.precision),
            metrics.mrr.map_or("n/a".to_string(), |v| format!("{v:.2}")),
            metrics
                .avg_latency_ms
                .map_or("n/a".to_string(), |v| format!("{v:.0}ms")),
            percent(metrics.dedup_rate),
        )),
        Line::from(format!("Last sync {}", metrics
            .last_sync
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string()))),
        Line::from(""),
    ];

    for category in &metrics.categories {
        let style = category
            .category
            .parse::<ItemType>()
            .map(type_style)
            .unwrap_or_default();
        lines.push(Line::from(Span::styled(
            format!("{:<10} {}", category.category, category.count),
            style,
        )));
    }

    let top = metrics.top_tags_sorted(10);
    if !top.is_empty() {
        lines.push(Line::from(""));
        let tags: Vec<String> = top.iter().map(|(tag, n)| format!("{tag}({n})")).collect();
        lines.push(Line::from(format!("Top tags  {}", tags.join(" "))));
    }

    lines.push(Line::from(""));
    if history.is_empty() {
        lines.push(Line::from(Span::styled("No history yet", dim())));
    } else {
        let precision: Vec<f64> = history.iter().map(|p| p.precision).collect();
        let latency: Vec<f64> = history.iter().map(|p| p.latency).collect();
        lines.push(Line::from(format!("Precision {}", spark(&precision))));
        lines.push(Line::from(format!("Latency   {}", spark(&latency))));
    }

    lines.push(Line::from(""));
    lines.push(match health {
        Some(health) => {
            let style = if health.is_healthy() {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Yellow)
            };
            Line::from(Span::styled(
                format!("Backend {} · vector store {}", health.status, health.qdrant),
                style,
            ))
        }
        None => Line::from(Span::styled("Backend health unknown", Style::default().fg(Color::Red))),
    });

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

// Settings

fn render_settings(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(6)])
        .split(area);

    let block = titled("Pipeline");
    if !render_fetch_state(frame, chunks[0], app, &app.settings.settings, block.clone()) {
        let settings = &app.settings;
        let cursor = if settings.editing { "█" } else { "" };
        let mut lines = vec![
            Line::from(vec![
                Span::raw("Email limit per run: "),
                Span::styled(
                    format!("{}{cursor}", settings.draft),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ),
                Span::styled(format!("  ({EMAIL_LIMIT_MIN}-{EMAIL_LIMIT_MAX})"), dim()),
            ]),
            Line::from(Span::styled("i to edit · +/- to step by 10", dim())),
        ];
        if settings.saving {
            lines.push(Line::from(format!("{} Saving...", app.spinner())));
        } else if let Some(error) = &settings.error {
            lines.push(Line::from(Span::styled(
                format!("Save failed: {error}"),
                Style::default().fg(Color::Red),
            )));
        } else if let Some(saved) = &settings.last_saved {
            let message = if saved.message.is_empty() {
                format!("Saved: {}", saved.email_max_limit)
            } else {
                saved.message.clone()
            };
            lines.push(Line::from(Span::styled(message, Style::default().fg(Color::Green))));
        }
        if let Some(current) = settings.settings.ready() {
            if let Some(hours) = current.email_fetch_hours_back {
                lines.push(Line::from(format!("Fetch window: last {hours}h")));
            }
            if let Some(model) = &current.llm_model {
                lines.push(Line::from(format!("Extraction model: {model}")));
            }
            if let Some(model) = &current.embedding_model {
                lines.push(Line::from(format!("Embedding model: {model}")));
            }
        }
        frame.render_widget(Paragraph::new(lines).block(block), chunks[0]);
    }

    let demo = &app.demo;
    let mut lines = vec![Line::from(vec![
        Span::raw("Demo mode: "),
        if demo.is_demo() {
            Span::styled("on", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        } else {
            Span::styled("off", dim())
        },
        Span::styled(if demo.busy { "  working..." } else { "" }, dim()),
    ])];
    if let Some(user) = &demo.user {
        lines.push(Line::from(format!("User: {} <{}>", user.name, user.email)));
    }
    if demo.is_demo() {
        let state = if app.demo_extracted() {
            "extracted this session"
        } else {
            "not extracted yet"
        };
        lines.push(Line::from(format!("Sample data: {state}")));
        lines.push(Line::from(Span::styled("d to turn off · D to reset", dim())));
    } else {
        lines.push(Line::from(Span::styled("d to turn on", dim())));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(format!("Backend: {}", app.api_base_url()), dim())));
    frame.render_widget(Paragraph::new(lines).block(titled("Demo")), chunks[1]);
}

// Bars and overlays

fn render_status_bar(frame: &mut Frame, area: Rect, app: &App) {
    let hints = match app.input_mode() {
        InputMode::Normal => match app.view {
            View::Home => "^K palette  / search  t tags  F senders  X extract  p prism  ? help  q quit",
            View::Events => "^K palette  / search  H/L month  h/l day  f status  ? help  q quit",
            View::Courses => "^K palette  / search  v level  t tags  ? help  q quit",
            View::Blogs => "^K palette  / search  t tags  s sort  ? help  q quit",
            View::Metrics => "^K palette  r refresh  ? help  q quit",
            View::Settings => "^K palette  i edit  +/- limit  d demo  D reset  ? help  q quit",
        },
        InputMode::Search => "type to search  Enter keep  Esc clear",
        InputMode::Picker => "Space toggle  s save tag  x clear filter  X clear saved  Esc close",
        InputMode::Modal => "j/k scroll  o open link  m source email  Esc close",
        InputMode::SettingsEdit => "digits to edit  Enter/Esc done",
        InputMode::Palette => "↑/↓ move  Tab section  Enter go  Esc close",
        InputMode::Help => "any key to close",
    };

    let mut spans = vec![Span::styled(format!(" {hints}"), dim())];
    if let Some((message, _)) = &app.status_message {
        spans.push(Span::raw("  │ "));
        spans.push(Span::styled(message.clone(), Style::default().fg(Color::Yellow)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_picker(frame: &mut Frame, area: Rect, app: &App, picker: &Picker) {
    let popup = centered_rect(50, 60, area);
    frame.render_widget(Clear, popup);

    let pane = app.current_pane();
    let title = match picker.kind {
        PickerKind::Tags => "Tags · ★ saved",
        PickerKind::Senders => "Senders",
    };
    let items: Vec<ListItem> = picker
        .entries
        .iter()
        .map(|entry| {
            let active = pane.is_some_and(|p| match picker.kind {
                PickerKind::Tags => p.filters.tags.contains(&entry.value),
                PickerKind::Senders => p.filters.senders.contains(&entry.value.to_lowercase()),
            });
            let saved = picker.kind == PickerKind::Tags && app.saved_tags.contains(&entry.value);
            let mark = if active { "[x]" } else { "[ ]" };
            let star = if saved { "★ " } else { "" };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{mark} {star}{}", entry.label)),
                Span::styled(format!("  {}", entry.count), dim()),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(titled(title))
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("▶ ");
    let mut state = ListState::default();
    state.select(Some(picker.selected));
    frame.render_stateful_widget(list, popup, &mut state);
}

fn yes_no(flag: bool) -> String {
    let text = if flag { "yes" } else { "no" };
    text.to_string()
}

fn item_detail_lines(item: &FeedItem) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::from(Span::styled(
            item.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!("{} · {} <{}>", item.item_type, item.sender, item.sender_email),
            type_style(item.item_type),
        )),
        Line::from(""),
    ];

    let mut field = |label: &str, value: Option<String>| {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            lines.push(Line::from(vec![
                Span::styled(format!("{label:<12}"), dim()),
                Span::raw(value),
            ]));
        }
    };
    let stamp = |t: Option<DateTime<Utc>>| t.map(|t| t.format("%a %b %d %Y %H:%M UTC").to_string());
    match item.item_type {
        ItemType::Event => {
            field("Starts", stamp(item.start_time));
            field("Ends", stamp(item.end_time));
            field("Location", item.location.clone());
            field("Organizer", item.organizer.clone());
            field("Format", item.event_type.clone());
            field("Cost", item.cost.clone());
        }
        ItemType::Course => {
            field("Provider", item.provider.clone());
            field("Instructor", item.instructor.clone());
            field("Level", item.level.clone());
            field("Duration", item.duration.clone());
            field("Certificate", item.certificate_offered.map(yes_no));
        }
        ItemType::Blog => {
            field("Author", item.author.clone());
            field("Source", item.source.clone());
            field("Category", item.category.clone());
            field("Reading", item.reading_time.clone());
            field("Published", item.published_date.clone());
        }
    }
    field("Free", item.is_free.map(yes_no));
    field("Received", stamp(item.received_at));
    field("Link", item.url.clone());

    if !item.tags.is_empty() {
        lines.push(Line::from(Span::styled(
            item.tags.iter().map(|t| format!("#{t}")).collect::<Vec<_>>().join(" "),
            Style::default().fg(Color::Yellow),
        )));
    }
    lines.push(Line::from(""));
    if let Some(hook) = item.hook.as_ref().filter(|h| !h.trim().is_empty()) {
        lines.push(Line::from(Span::styled(hook.clone(), Style::default().add_modifier(Modifier::ITALIC))));
    }
    if let Some(description) = &item.description {
        lines.push(Line::from(description.clone()));
    }
    let bullets = if item.item_type == ItemType::Course {
        &item.what_you_learn
    } else {
        &item.key_points
    };
    if !bullets.is_empty() {
        lines.push(Line::from(""));
        lines.extend(bullets.iter().map(|b| Line::from(format!("• {b}"))));
    }
    lines
}

fn email_detail_lines(detail: &EmailDetail, width: usize) -> Vec<Line<'static>> {
    let summary = &detail.summary;
    let mut lines = vec![
        Line::from(Span::styled(
            summary.subject.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!(
                "{} <{}> · {}",
                summary.sender,
                summary.sender_email,
                summary
                    .received_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default()
            ),
            dim(),
        )),
        Line::from(""),
    ];

    if !detail.extracted_items.is_empty() {
        lines.push(Line::from(format!("Extracted {} items:", detail.extracted_items.len())));
        for item in &detail.extracted_items {
            lines.push(Line::from(vec![
                Span::styled(format!("  {} ", type_badge(item.item_type)), type_style(item.item_type)),
                Span::raw(item.title.clone()),
            ]));
        }
        lines.push(Line::from(""));
    }

    match detail.body_text(width) {
        Some(body) => lines.extend(body.lines().map(|l| Line::from(l.to_string()))),
        None => lines.push(Line::from(Span::styled("No preview available", dim()))),
    }
    lines
}

fn render_modal(frame: &mut Frame, area: Rect, app: &App, modal: &Modal) {
    let popup = centered_rect(80, 80, area);
    frame.render_widget(Clear, popup);

    match modal {
        Modal::Item(item) => {
            frame.render_widget(
                Paragraph::new(item_detail_lines(item))
                    .wrap(Wrap { trim: false })
                    .scroll((app.modal_scroll, 0))
                    .block(titled("Item · o open · m email")),
                popup,
            );
        }
        Modal::Email { detail, .. } => {
            let block = titled("Source email");
            if render_fetch_state(frame, popup, app, detail, block.clone()) {
                return;
            }
            if let Some(detail) = detail.ready() {
                let width = usize::from(popup.width.saturating_sub(4));
                frame.render_widget(
                    Paragraph::new(email_detail_lines(detail, width))
                        .wrap(Wrap { trim: false })
                        .scroll((app.modal_scroll, 0))
                        .block(block),
                    popup,
                );
            }
        }
    }
}

fn render_palette(frame: &mut Frame, area: Rect, app: &App) {
    let palette = &app.palette;
    let popup = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup);

    let block = titled("Command palette");
    let inner = block.inner(popup);
    frame.render_widget(block, popup);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(1)])
        .split(inner);

    let status = if palette.is_searching() {
        format!(" {}", app.spinner())
    } else {
        String::new()
    };
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("> ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("{}█", palette.query())),
            Span::styled(status, dim()),
        ]))
        .block(Block::default().borders(Borders::BOTTOM)),
        chunks[0],
    );

    let highlight = Style::default().bg(Color::DarkGray);
    let mut items = Vec::new();
    let mut selected = None;

    items.push(ListItem::new(Span::styled("Quick actions", dim())));
    for (i, action) in QUICK_ACTIONS.iter().enumerate() {
        let is_selected = palette.section() == PaletteSection::Actions && palette.selected() == i;
        if is_selected {
            selected = Some(items.len());
        }
        items.push(ListItem::new(Line::from(vec![
            Span::raw(format!("  {}", action.label)),
            Span::styled(format!("  {}", action.shortcut), dim()),
        ])));
    }

    if !palette.results().is_empty() {
        items.push(ListItem::new(Span::styled("Results (Tab)", dim())));
        for (i, item) in palette.results().iter().enumerate() {
            let is_selected = palette.section() == PaletteSection::Results && palette.selected() == i;
            if is_selected {
                selected = Some(items.len());
            }
            items.push(ListItem::new(Line::from(vec![
                Span::styled(format!("  {} ", type_badge(item.item_type)), type_style(item.item_type)),
                Span::raw(item.title.clone()),
                Span::styled(format!("  {}", item.sender), dim()),
            ])));
        }
    } else if !palette.query().trim().is_empty() && !palette.is_searching() {
        items.push(ListItem::new(Span::styled("No results", dim())));
    }

    let list = List::new(items).highlight_style(highlight);
    let mut state = ListState::default();
    state.select(selected);
    frame.render_stateful_widget(list, chunks[1], &mut state);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let popup = centered_rect(60, 80, area);
    frame.render_widget(Clear, popup);

    let sections: [(&str, &[(&str, &str)]); 5] = [
        (
            "Global",
            &[
                ("Ctrl-K", "command palette"),
                ("1-6, Tab", "switch view"),
                ("j/k, </>", "move selection"),
                ("Enter", "item details"),
                ("m", "source email"),
                ("o", "open link"),
                ("r", "refresh view"),
                ("?", "this help"),
                ("q", "quit"),
            ],
        ),
        (
            "Filters",
            &[
                ("/", "search"),
                ("e/c/b", "toggle type (Home)"),
                ("f", "cycle upcoming/past"),
                ("s", "recent/relevance"),
                ("t, F", "pick tags, senders"),
                ("x", "clear tag filter"),
                ("Esc", "clear search or day"),
            ],
        ),
        (
            "Home",
            &[("X", "extract / retry"), ("R", "refresh unprocessed"), ("p", "collapse prism")],
        ),
        (
            "Events, Courses",
            &[("H/L", "previous/next month"), ("h/l", "previous/next day"), ("v", "cycle level")],
        ),
        (
            "Settings",
            &[("i", "edit email limit"), ("+/-", "step limit"), ("d", "toggle demo"), ("D", "reset demo")],
        ),
    ];

    let mut lines = Vec::new();
    for (title, keys) in sections {
        lines.push(Line::from(Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )));
        for (key, description) in keys {
            lines.push(Line::from(vec![
                Span::styled(format!("  {key:<10}"), Style::default().fg(Color::Yellow)),
                Span::raw(*description),
            ]));
        }
        lines.push(Line::from(""));
    }

    frame.render_widget(
        Paragraph::new(lines).block(titled("Keys · any key to close")),
        popup,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spark_scales_to_range() {
        assert_eq!(spark(&[0.0, 0.5, 1.0]), "▁▅█");
        assert_eq!(spark(&[2.0, 2.0]), "▁▁");
        assert_eq!(spark(&[]), "");
    }

    #[test]
    fn centered_rect_stays_inside() {
        let area = Rect::new(0, 0, 100, 50);
        let popup = centered_rect(60, 40, area);
        assert_eq!(popup.width, 60);
        assert_eq!(popup.height, 20);
        assert_eq!(popup.x, 20);
    }
}
