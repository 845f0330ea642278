use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem as TuiListItem, ListState, Paragraph, Wrap};
use rusqlite::Connection;
use uuid::Uuid;

use crate::config::AppPaths;
use crate::errors::LystError;
use crate::metadata::{self, MicrolinkClient};
use crate::storage::ListStore;
use crate::storage::models::{ItemEdit, ItemPatch, ListItem, ListType, NewItem, PendingItem};
use crate::storage::sqlite::SqliteStore;
use crate::sync::ListClient;

#[derive(PartialEq)]
enum Mode {
    Normal,
    /// Typing a URL for a new item.
    AddUrl,
    /// A metadata draft is up; typing adjusts its title, Enter saves.
    EditDraft,
    /// Inline title edit of the selected item.
    EditTitle,
    Tag,
    RemoveTag,
}

struct App {
    client: ListClient<SqliteStore>,
    source: MicrolinkClient,
    list_type: ListType,
    show_archived: bool,
    items: Vec<ListItem>,
    list_state: ListState,
    mode: Mode,
    input: String,
    pending: Option<PendingItem>,
    status: String,
    status_time: Option<Instant>,
    should_quit: bool,
}

impl App {
    fn new(client: ListClient<SqliteStore>, list_type: ListType) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));
        Self {
            client,
            source: MicrolinkClient::new(),
            list_type,
            show_archived: false,
            items: Vec::new(),
            list_state,
            mode: Mode::Normal,
            input: String::new(),
            pending: None,
            status: String::new(),
            status_time: None,
            should_quit: false,
        }
    }

    fn set_status(&mut self, msg: String) {
        self.status = msg;
        self.status_time = Some(Instant::now());
    }

    fn selected_item(&self) -> Option<&ListItem> {
        self.list_state.selected().and_then(|i| self.items.get(i))
    }

    fn selected_id(&self) -> Option<Uuid> {
        self.selected_item().map(|i| i.id)
    }

    fn select_next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => (i + 1).min(self.items.len() - 1),
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    fn select_prev(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        self.list_state.select(Some(i));
    }

    fn select_first(&mut self) {
        if !self.items.is_empty() {
            self.list_state.select(Some(0));
        }
    }

    fn select_last(&mut self) {
        if !self.items.is_empty() {
            self.list_state.select(Some(self.items.len() - 1));
        }
    }

    /// Re-read the current view from the client (cache hit unless
    /// something invalidated it) and clamp the selection.
    fn reload(&mut self) {
        match self.client.items(self.list_type, self.show_archived) {
            Ok(items) => self.items = items,
            Err(e) => self.set_status(format!("Error: {e}")),
        }

        if self.items.is_empty() {
            self.list_state.select(None);
        } else if let Some(i) = self.list_state.selected() {
            if i >= self.items.len() {
                self.list_state.select(Some(self.items.len() - 1));
            }
        } else {
            self.list_state.select(Some(0));
        }
    }

    fn refetch(&mut self) {
        self.client.refresh(self.list_type);
        self.reload();
    }

    fn toggle_archived_view(&mut self) {
        self.show_archived = !self.show_archived;
        self.pending = None;
        self.reload();
    }

    fn cycle_type(&mut self, forward: bool) {
        let all = ListType::ALL;
        let idx = all.iter().position(|t| *t == self.list_type).unwrap_or(0);
        let next = if forward {
            (idx + 1) % all.len()
        } else {
            (idx + all.len() - 1) % all.len()
        };
        self.list_type = all[next];
        self.pending = None;
        self.reload();
    }

    fn toggle_selected(&mut self) {
        if self.show_archived {
            return;
        }
        let Some(id) = self.selected_id() else {
            return;
        };
        match self.client.toggle_item(id) {
            Ok(completed) => {
                let verb = if completed { "Completed" } else { "Reopened" };
                self.set_status(format!("{verb} item"));
                self.reload();
            }
            Err(e) => self.set_status(format!("Toggle failed: {e}")),
        }
    }

    fn archive_completed(&mut self) {
        if self.show_archived {
            return;
        }
        // Pre-filter on the effective state so the user gets a message
        // instead of a zero-row write.
        let any_completed = self
            .items
            .iter()
            .any(|i| self.client.effective_completed(i));
        if !any_completed {
            self.set_status("No items to archive. Complete some items first".to_string());
            return;
        }
        match self.client.archive_completed(self.list_type) {
            Ok(n) => {
                self.set_status(format!("Archived {n} item(s)"));
                self.reload();
            }
            Err(e) => self.set_status(format!("Archive error: {e}")),
        }
    }

    fn fetch_draft(&mut self) {
        let url = self.input.trim().to_string();
        self.input.clear();
        if url.is_empty() {
            self.mode = Mode::Normal;
            return;
        }
        match metadata::draft_from_url(&url, &self.source) {
            Ok(draft) => {
                self.input = draft.title.clone();
                self.pending = Some(draft);
                self.mode = Mode::EditDraft;
            }
            Err(LystError::InvalidInput(msg)) => {
                self.mode = Mode::Normal;
                self.set_status(msg);
            }
            Err(e) => {
                self.mode = Mode::Normal;
                self.set_status(format!("Metadata error: {e}"));
            }
        }
    }

    fn save_draft(&mut self) {
        let Some(mut draft) = self.pending.take() else {
            return;
        };
        let title = self.input.trim();
        if !title.is_empty() {
            draft.title = title.to_string();
        }
        self.input.clear();
        match self.client.add_item(NewItem::from_draft(self.list_type, draft)) {
            Ok(item) => {
                self.set_status(format!("Added \"{}\"", item.title));
                self.reload();
            }
            Err(e) => self.set_status(format!("Add error: {e}")),
        }
    }

    fn start_edit_title(&mut self) {
        if self.show_archived {
            return;
        }
        let Some(item) = self.selected_item() else {
            return;
        };
        self.input = item.title.clone();
        self.mode = Mode::EditTitle;
    }

    fn save_title(&mut self) {
        let title = self.input.trim().to_string();
        self.input.clear();
        if title.is_empty() {
            self.set_status("Empty title".to_string());
            return;
        }
        let Some(item) = self.selected_item().cloned() else {
            return;
        };
        let mut edit = ItemEdit::from_item(&item);
        edit.title = title;
        let patch = ItemPatch::diff(&item, &edit);
        if patch.is_empty() {
            self.set_status("No changes".to_string());
            return;
        }
        match self.client.update_item(patch) {
            Ok(updated) => {
                self.set_status(format!("Updated \"{}\"", updated.title));
                self.reload();
            }
            Err(e) => self.set_status(format!("Update error: {e}")),
        }
    }

    /// Tag edits go through the update mutation's full-replacement
    /// contract: build the new tag set, diff, send.
    fn add_tag(&mut self) {
        let tag = self.input.trim().to_string();
        self.input.clear();
        if tag.is_empty() {
            self.set_status("Empty tag".to_string());
            return;
        }
        let Some(item) = self.selected_item().cloned() else {
            return;
        };
        if item.tags.contains(&tag) {
            self.set_status(format!("Already tagged \"{tag}\""));
            return;
        }
        let known = match self.client.store().list_tags(self.list_type) {
            Ok(tags) => tags.iter().any(|t| t.name == tag),
            Err(_) => false,
        };
        if !known {
            if let Err(e) = self.client.store().create_tag(self.list_type, &tag, "#8E9196") {
                self.set_status(format!("Tag error: {e}"));
                return;
            }
        }
        let mut edit = ItemEdit::from_item(&item);
        edit.tags.push(tag.clone());
        match self.client.update_item(ItemPatch::diff(&item, &edit)) {
            Ok(_) => {
                self.set_status(format!("Tagged \"{tag}\""));
                self.reload();
            }
            Err(e) => self.set_status(format!("Tag error: {e}")),
        }
    }

    fn remove_tag(&mut self) {
        let tag = self.input.trim().to_string();
        self.input.clear();
        if tag.is_empty() {
            self.set_status("Empty tag".to_string());
            return;
        }
        let Some(item) = self.selected_item().cloned() else {
            return;
        };
        if !item.tags.contains(&tag) {
            self.set_status(format!("Not tagged \"{tag}\""));
            return;
        }
        let mut edit = ItemEdit::from_item(&item);
        edit.tags.retain(|t| *t != tag);
        match self.client.update_item(ItemPatch::diff(&item, &edit)) {
            Ok(_) => {
                self.set_status(format!("Removed tag \"{tag}\""));
                self.reload();
            }
            Err(e) => self.set_status(format!("Remove tag error: {e}")),
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{truncated}…")
    } else {
        truncated
    }
}

// ── UI rendering ───────────────────────────────────────────────────

fn draw(frame: &mut Frame, app: &mut App) {
    let [title_area, body_area, help_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    // Title bar
    let view = if app.show_archived { "archived" } else { "active" };
    let title = format!(
        " LYST — {} — {} items — {view} ",
        app.list_type.as_str(),
        app.items.len()
    );
    frame.render_widget(
        Paragraph::new(title).style(Style::new().fg(Color::Black).bg(Color::Cyan)),
        title_area,
    );

    // Body: two-pane split
    let [list_area, detail_area] =
        Layout::horizontal([Constraint::Percentage(55), Constraint::Percentage(45)])
            .areas(body_area);

    // Left pane: item rows rendering the EFFECTIVE completed state, so a
    // pending toggle shows immediately.
    let rows: Vec<TuiListItem> = app
        .items
        .iter()
        .map(|item| {
            let check = if app.client.effective_completed(item) {
                "[x]"
            } else {
                "[ ]"
            };
            let date = match item.date {
                Some(d) => d.format("%m-%d").to_string(),
                None => "     ".to_string(),
            };
            let tags = if item.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", item.tags.join(","))
            };
            TuiListItem::new(format!(
                "{} {} {}{}",
                check,
                date,
                truncate_chars(&item.title, 34),
                tags
            ))
        })
        .collect();

    let list_title = match app.mode {
        Mode::AddUrl => format!("URL: {}_", app.input),
        _ => format!("{} list", app.list_type.as_str()),
    };

    let list = List::new(rows)
        .block(Block::default().borders(Borders::ALL).title(list_title))
        .highlight_style(
            Style::new()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");

    frame.render_stateful_widget(list, list_area, &mut app.list_state);

    // Right pane: draft editor when a pending item is up, item detail
    // otherwise.
    let detail_content = if let Some(ref draft) = app.pending {
        draft_lines(draft, &app.input)
    } else if let Some(item) = app.selected_item() {
        item_lines(item, app.client.effective_completed(item))
    } else {
        vec![Line::raw("No items")]
    };

    let detail_title = match app.mode {
        Mode::Tag => format!("Tag: {}_", app.input),
        Mode::RemoveTag => format!("Remove tag: {}_", app.input),
        Mode::EditTitle => format!("Title: {}_", app.input),
        Mode::EditDraft => "New item".to_string(),
        _ => "Detail".to_string(),
    };

    let detail = Paragraph::new(detail_content)
        .block(Block::default().borders(Borders::ALL).title(detail_title))
        .wrap(Wrap { trim: false });

    frame.render_widget(detail, detail_area);

    // Auto-clear status after 3 seconds
    if let Some(t) = app.status_time
        && t.elapsed() > Duration::from_secs(3)
    {
        app.status.clear();
        app.status_time = None;
    }

    // Help bar
    let help_text = match app.mode {
        Mode::Normal => {
            if app.status.is_empty() {
                " [q]uit [Space]toggle [n]ew [e]dit [t]ag [T]untag [A]rchive done [a]rchived view [Tab]list [r]efresh"
                    .to_string()
            } else {
                format!(" {} ", app.status)
            }
        }
        Mode::AddUrl => " Paste or type a URL · [Enter] fetch · [Esc] cancel".to_string(),
        Mode::EditDraft => " Adjust the title · [Enter] save to list · [Esc] discard".to_string(),
        Mode::EditTitle => " Edit title · [Enter] save · [Esc] cancel".to_string(),
        Mode::Tag => " Type tag name · [Enter] add · [Esc] cancel".to_string(),
        Mode::RemoveTag => " Type tag name · [Enter] remove · [Esc] cancel".to_string(),
    };

    frame.render_widget(
        Paragraph::new(help_text).style(Style::new().fg(Color::Black).bg(Color::White)),
        help_area,
    );
}

fn item_lines(item: &ListItem, effective_completed: bool) -> Vec<Line<'static>> {
    let label = |s: &'static str| Span::styled(s, Style::new().fg(Color::DarkGray));
    let tags = if item.tags.is_empty() {
        "—".to_string()
    } else {
        item.tags.join(", ")
    };

    let mut lines = vec![
        Line::from(vec![label("Title:     "), Span::raw(item.title.clone())]),
        Line::from(vec![
            label("Done:      "),
            Span::raw(effective_completed.to_string()),
        ]),
        Line::from(vec![label("Tags:      "), Span::raw(tags)]),
        Line::from(vec![
            label("Created:   "),
            Span::raw(item.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]),
    ];
    if let Some(d) = item.date {
        lines.push(Line::from(vec![
            label("Date:      "),
            Span::raw(d.format("%Y-%m-%d").to_string()),
        ]));
    }
    if let Some(ref url) = item.url {
        lines.push(Line::from(vec![label("URL:       "), Span::raw(url.clone())]));
    }
    if let Some(ref image) = item.image {
        lines.push(Line::from(vec![label("Image:     "), Span::raw(image.clone())]));
    }
    if let Some(ref description) = item.description {
        lines.push(Line::raw("─────────────────────────"));
        for l in description.lines() {
            lines.push(Line::raw(l.to_string()));
        }
    }
    if let Some(ref notes) = item.notes {
        lines.push(Line::raw("─────────────────────────"));
        for l in notes.lines() {
            lines.push(Line::raw(l.to_string()));
        }
    }
    lines
}

fn draft_lines(draft: &PendingItem, title_input: &str) -> Vec<Line<'static>> {
    let label = |s: &'static str| Span::styled(s, Style::new().fg(Color::DarkGray));
    let mut lines = vec![Line::from(vec![
        label("Title:     "),
        Span::raw(title_input.to_string()),
    ])];
    if let Some(ref url) = draft.url {
        lines.push(Line::from(vec![label("URL:       "), Span::raw(url.clone())]));
    }
    if let Some(ref description) = draft.description {
        lines.push(Line::from(vec![
            label("Desc:      "),
            Span::raw(description.clone()),
        ]));
    }
    if let Some(ref image) = draft.image {
        lines.push(Line::from(vec![label("Image:     "), Span::raw(image.clone())]));
    }
    lines
}

// ── Event handling ─────────────────────────────────────────────────

fn handle_event(app: &mut App) -> std::io::Result<()> {
    if !event::poll(Duration::from_millis(250))? {
        return Ok(());
    }

    let Event::Key(key) = event::read()? else {
        return Ok(());
    };
    if key.kind != KeyEventKind::Press {
        return Ok(());
    }

    match app.mode {
        Mode::Normal => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => app.select_next(),
            KeyCode::Char('k') | KeyCode::Up => app.select_prev(),
            KeyCode::Char('g') | KeyCode::Home => app.select_first(),
            KeyCode::Char('G') | KeyCode::End => app.select_last(),
            KeyCode::Char(' ') | KeyCode::Enter => app.toggle_selected(),
            KeyCode::Char('n') => {
                if !app.show_archived {
                    app.mode = Mode::AddUrl;
                    app.input.clear();
                    app.status.clear();
                    app.status_time = None;
                }
            }
            KeyCode::Char('e') => app.start_edit_title(),
            KeyCode::Char('t') => {
                if !app.show_archived && app.selected_id().is_some() {
                    app.mode = Mode::Tag;
                    app.input.clear();
                }
            }
            KeyCode::Char('T') => {
                if !app.show_archived && app.selected_id().is_some() {
                    app.mode = Mode::RemoveTag;
                    app.input.clear();
                }
            }
            KeyCode::Char('A') => app.archive_completed(),
            KeyCode::Char('a') => app.toggle_archived_view(),
            KeyCode::Tab => app.cycle_type(true),
            KeyCode::BackTab => app.cycle_type(false),
            KeyCode::Char('r') => {
                app.refetch();
                app.set_status("Refreshed".to_string());
            }
            _ => {}
        },
        Mode::AddUrl => match key.code {
            KeyCode::Esc => {
                app.mode = Mode::Normal;
                app.input.clear();
            }
            KeyCode::Enter => app.fetch_draft(),
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Char(c) => app.input.push(c),
            _ => {}
        },
        Mode::EditDraft => match key.code {
            KeyCode::Esc => {
                app.mode = Mode::Normal;
                app.pending = None;
                app.input.clear();
                app.set_status("Draft discarded".to_string());
            }
            KeyCode::Enter => {
                app.save_draft();
                app.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Char(c) => app.input.push(c),
            _ => {}
        },
        Mode::EditTitle => match key.code {
            KeyCode::Esc => {
                app.mode = Mode::Normal;
                app.input.clear();
            }
            KeyCode::Enter => {
                app.save_title();
                app.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Char(c) => app.input.push(c),
            _ => {}
        },
        Mode::Tag => match key.code {
            KeyCode::Esc => {
                app.mode = Mode::Normal;
                app.input.clear();
            }
            KeyCode::Enter => {
                app.add_tag();
                app.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Char(c) => app.input.push(c),
            _ => {}
        },
        Mode::RemoveTag => match key.code {
            KeyCode::Esc => {
                app.mode = Mode::Normal;
                app.input.clear();
            }
            KeyCode::Enter => {
                app.remove_tag();
                app.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Char(c) => app.input.push(c),
            _ => {}
        },
    }

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────

pub fn run(paths: &AppPaths, list_type: ListType) -> crate::errors::Result<()> {
    std::fs::create_dir_all(&paths.base_dir)
        .map_err(|e| LystError::Config(e.to_string()))?;
    let conn = Connection::open(&paths.db_path)?;
    let store = SqliteStore::new(conn)?;
    let client = ListClient::new(store);

    let mut app = App::new(client, list_type);
    app.reload();

    let mut terminal = ratatui::init();

    let result = (|| {
        loop {
            terminal.draw(|frame| draw(frame, &mut app))?;
            handle_event(&mut app)?;
            if app.should_quit {
                break;
            }
        }
        Ok::<(), std::io::Error>(())
    })();

    ratatui::restore();

    result.map_err(|e| LystError::Config(e.to_string()))
}
