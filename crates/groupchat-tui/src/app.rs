use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{KeyCode, KeyEvent};
use groupchat_core::attachment::OutgoingFile;
use groupchat_core::group::Group;
use groupchat_core::message::Message;
use groupchat_core::session::SessionUser;
use groupchat_feed::{
    files, menu_actions, resume_poller, ConfirmedDelete, FeedController, FeedError, Interaction,
    MenuAction, PollHandle,
};
use groupchat_service::{GroupDirectory, MessageStore};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::components::message_list::MessageList;

/// What the app is currently doing
#[derive(Debug, Clone)]
pub enum Mode {
    /// Reading the feed. Menus, edits and delete prompts are tracked by
    /// the feed's `Interaction`.
    Feed,
    /// Writing a new message
    Compose {
        input: String,
        attachment: Option<OutgoingFile>,
    },
    /// Typing the path of a file to attach; `draft` is the message text so far
    AttachPath { input: String, draft: String },
    /// Group switcher
    GroupList {
        groups: Vec<Group>,
        list_state: ListState,
    },
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Group to open first; defaults to the user's own group.
    pub group: Option<String>,
    pub poll_interval: Duration,
    pub download_dir: PathBuf,
}

pub struct App {
    rt: Runtime,
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn GroupDirectory>,
    user: SessionUser,
    options: AppOptions,
    group: Option<Group>,
    feed: Option<Arc<FeedController>>,
    poller: Option<PollHandle>,
    /// Feed version last copied into `list`.
    seen_version: u64,
    list: MessageList,
    mode: Mode,
    interaction: Interaction,
    status_message: Option<String>,
}

impl App {
    pub fn new(
        rt: Runtime,
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn GroupDirectory>,
        user: SessionUser,
        options: AppOptions,
    ) -> Result<Self> {
        let groups = match rt.block_on(directory.my_groups(&user)) {
            Ok(groups) => groups,
            // An explicit group can still be opened without the directory.
            Err(e) if options.group.is_some() => {
                warn!("group directory unavailable: {e}");
                Vec::new()
            }
            Err(e) => return Err(e).context("failed to list groups"),
        };
        let initial = match &options.group {
            Some(id) => Some(
                groups
                    .iter()
                    .find(|g| g.id == *id)
                    .cloned()
                    .unwrap_or_else(|| placeholder_group(id)),
            ),
            None => default_group(&groups, &user),
        };

        let mut app = Self {
            rt,
            store,
            directory,
            user,
            options,
            group: None,
            feed: None,
            poller: None,
            seen_version: 0,
            list: MessageList::default(),
            mode: Mode::Feed,
            interaction: Interaction::default(),
            status_message: None,
        };
        match initial {
            Some(group) => app.open_group(group),
            None => app.status_message = Some("No group to open (g: pick one)".into()),
        }
        Ok(app)
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        self.list.messages()
    }

    pub fn selected_message(&self) -> Option<&Message> {
        self.list.selected()
    }

    pub fn is_input_mode(&self) -> bool {
        matches!(self.mode, Mode::Compose { .. } | Mode::AttachPath { .. })
            || self.interaction.draft().is_some()
    }

    /// Start a feed for `group`, tearing down the previous one.
    fn open_group(&mut self, group: Group) {
        self.close_feed();

        let feed = Arc::new(FeedController::new(self.store.clone(), group.id.clone()));
        if let Err(e) = self.rt.block_on(feed.load_messages()) {
            self.status_message = Some(format!("Load error: {e}"));
        }
        let poller = {
            let _guard = self.rt.enter();
            resume_poller(feed.clone(), self.options.poll_interval)
        };
        info!(group_id = %group.id, "opened group");

        self.list = MessageList::new(feed.snapshot());
        self.seen_version = feed.version();
        self.interaction = Interaction::default();
        self.feed = Some(feed);
        self.poller = Some(poller);
        self.group = Some(group);
    }

    fn close_feed(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        if let Some(feed) = self.feed.take() {
            feed.close();
        }
    }

    /// Stop polling. Called once on exit.
    pub fn close(&mut self) {
        self.close_feed();
    }

    /// Pull whatever the poller loaded into the view. Called by the event
    /// loop between key presses.
    pub fn tick(&mut self) {
        let Some(feed) = self.feed.clone() else {
            return;
        };
        let version = feed.version();
        if version != self.seen_version {
            self.seen_version = version;
            self.list.replace(feed.snapshot());
            self.interaction.sync(self.list.messages());
            if let Some(err) = feed.last_error() {
                self.status_message = Some(format!("Load error: {err}"));
            }
        }
    }

    fn refresh(&mut self) {
        let Some(feed) = self.feed.clone() else {
            return;
        };
        if let Err(e) = self.rt.block_on(feed.load_messages()) {
            self.status_message = Some(format!("Load error: {e}"));
        }
        self.tick();
    }

    fn feed_message(&self, message_id: &str) -> Option<Message> {
        self.list
            .messages()
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        self.status_message = None;

        match &self.mode.clone() {
            Mode::Feed => self.handle_feed(key),
            Mode::Compose { input, attachment } => {
                self.handle_compose(key, input.clone(), attachment.clone())
            }
            Mode::AttachPath { input, draft } => {
                self.handle_attach_path(key, input.clone(), draft.clone())
            }
            Mode::GroupList { groups, list_state } => {
                self.handle_group_list(key, groups.clone(), list_state.clone())
            }
        }
    }

    fn handle_feed(&mut self, key: KeyEvent) {
        match &self.interaction {
            Interaction::Editing { .. } => return self.handle_editing(key),
            Interaction::ConfirmingDelete(_) => return self.handle_confirm_delete(key),
            Interaction::MenuOpen { message_id } => {
                let id = message_id.clone();
                if self.handle_menu(key, &id) {
                    return;
                }
                // Anything outside the menu closes it, then acts as usual.
                self.interaction.dismiss_menu();
            }
            Interaction::Viewing => {}
        }

        match key.code {
            KeyCode::Char('j')
            | KeyCode::Char('k')
            | KeyCode::Down
            | KeyCode::Up
            | KeyCode::Home
            | KeyCode::End => self.list.handle_key(key),
            KeyCode::Char('i') => {
                if self.feed.is_some() {
                    self.mode = Mode::Compose {
                        input: String::new(),
                        attachment: None,
                    };
                } else {
                    self.status_message = Some("Open a group first (g)".into());
                }
            }
            KeyCode::Char('a') => {
                if self.feed.is_some() {
                    self.mode = Mode::AttachPath {
                        input: String::new(),
                        draft: String::new(),
                    };
                } else {
                    self.status_message = Some("Open a group first (g)".into());
                }
            }
            KeyCode::Char('m') | KeyCode::Enter => self.toggle_menu(),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('g') => self.open_group_list(),
            _ => {}
        }
    }

    fn toggle_menu(&mut self) {
        let Some(message) = self.list.selected().cloned() else {
            return;
        };
        if menu_actions(&message, &self.user.uid).is_empty() {
            self.interaction.dismiss_menu();
            self.status_message = Some("No actions for this message".into());
            return;
        }
        self.interaction.toggle_menu(&message, &self.user.uid);
    }

    /// Returns `false` if the key is not a menu key.
    fn handle_menu(&mut self, key: KeyEvent, message_id: &str) -> bool {
        let Some(message) = self.feed_message(message_id) else {
            self.interaction.cancel();
            return false;
        };
        match key.code {
            KeyCode::Char('e') => {
                if let Err(e) = self.interaction.begin_edit(&message, &self.user.uid) {
                    self.status_message = Some(e.to_string());
                }
            }
            KeyCode::Char('d') => {
                let Some(feed) = self.feed.clone() else {
                    return true;
                };
                if let Err(e) = self
                    .interaction
                    .begin_delete(&feed, &message, &self.user.uid)
                {
                    self.status_message = Some(e.to_string());
                }
            }
            KeyCode::Char('s') => {
                self.interaction.dismiss_menu();
                self.download(&message);
            }
            KeyCode::Char('m') | KeyCode::Enter => {
                self.interaction.toggle_menu(&message, &self.user.uid)
            }
            KeyCode::Esc => self.interaction.dismiss_menu(),
            _ => return false,
        }
        true
    }

    fn handle_editing(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.interaction.cancel(),
            KeyCode::Enter => {
                if let Some((message_id, draft)) = self.interaction.finish_edit() {
                    self.save_edit(message_id, draft);
                }
            }
            KeyCode::Backspace => {
                if let Some(draft) = self.interaction.draft_mut() {
                    draft.pop();
                }
            }
            KeyCode::Char(c) => {
                if let Some(draft) = self.interaction.draft_mut() {
                    draft.push(c);
                }
            }
            _ => {}
        }
    }

    fn save_edit(&mut self, message_id: String, draft: String) {
        let Some(feed) = self.feed.clone() else {
            return;
        };
        match self.rt.block_on(feed.edit_message(&message_id, &draft)) {
            Ok(()) => {
                self.status_message = Some("Message updated".into());
                self.tick();
            }
            Err(FeedError::EmptyEdit) => {
                self.status_message = Some(FeedError::EmptyEdit.to_string());
                self.interaction = Interaction::Editing { message_id, draft };
            }
            Err(e) => self.status_message = Some(format!("Edit failed: {e}")),
        }
    }

    fn handle_confirm_delete(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') => {
                if let Some(confirmed) = self.interaction.confirm_delete() {
                    self.run_delete(confirmed);
                }
            }
            _ => {
                self.interaction.cancel();
                self.status_message = Some("Delete cancelled".into());
            }
        }
    }

    fn run_delete(&mut self, confirmed: ConfirmedDelete) {
        let Some(feed) = self.feed.clone() else {
            return;
        };
        match self.rt.block_on(feed.delete_message(confirmed)) {
            Ok(()) => {
                self.status_message = Some("Message deleted".into());
                self.tick();
            }
            Err(e) => self.status_message = Some(format!("Delete failed: {e}")),
        }
    }

    fn download(&mut self, message: &Message) {
        let Some(feed) = self.feed.clone() else {
            return;
        };
        match self
            .rt
            .block_on(feed.download_attachment(message, &self.options.download_dir))
        {
            Ok(path) => self.status_message = Some(format!("Saved to {}", path.display())),
            Err(e) => self.status_message = Some(format!("Download failed: {e}")),
        }
    }

    fn handle_compose(&mut self, key: KeyEvent, mut input: String, mut attachment: Option<OutgoingFile>) {
        match key.code {
            KeyCode::Esc => self.mode = Mode::Feed,
            KeyCode::Tab => {
                self.mode = Mode::AttachPath {
                    input: String::new(),
                    draft: input,
                };
            }
            KeyCode::Enter => self.send(input, attachment),
            KeyCode::Backspace => {
                if input.pop().is_none() {
                    attachment = None;
                }
                self.mode = Mode::Compose { input, attachment };
            }
            KeyCode::Char(c) => {
                input.push(c);
                self.mode = Mode::Compose { input, attachment };
            }
            _ => {}
        }
    }

    fn send(&mut self, input: String, attachment: Option<OutgoingFile>) {
        let Some(feed) = self.feed.clone() else {
            return;
        };
        match self
            .rt
            .block_on(feed.send_message(Some(&input), attachment.clone()))
        {
            Ok(()) => {
                self.mode = Mode::Feed;
                self.status_message = Some("Message sent".into());
                self.tick();
                self.list.select_last();
            }
            Err(e) => {
                self.status_message = Some(format!("Send failed: {e}"));
                self.mode = Mode::Compose { input, attachment };
            }
        }
    }

    fn handle_attach_path(&mut self, key: KeyEvent, mut input: String, draft: String) {
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Compose {
                    input: draft,
                    attachment: None,
                };
            }
            KeyCode::Enter => {
                let path = Path::new(input.trim());
                match self.rt.block_on(files::read_outgoing_file(path)) {
                    Ok(file) => {
                        self.status_message = Some(format!("Attached {}", file.file_name));
                        self.mode = Mode::Compose {
                            input: draft,
                            attachment: Some(file),
                        };
                    }
                    Err(e) => {
                        self.status_message = Some(format!("Cannot attach: {e}"));
                    }
                }
            }
            KeyCode::Backspace => {
                input.pop();
                self.mode = Mode::AttachPath { input, draft };
            }
            KeyCode::Char(c) => {
                input.push(c);
                self.mode = Mode::AttachPath { input, draft };
            }
            _ => {}
        }
    }

    fn open_group_list(&mut self) {
        match self.rt.block_on(self.directory.my_groups(&self.user)) {
            Ok(groups) if groups.is_empty() => {
                self.status_message = Some("No groups available".into());
            }
            Ok(groups) => {
                let current = self
                    .group
                    .as_ref()
                    .and_then(|cur| groups.iter().position(|g| g.id == cur.id))
                    .unwrap_or(0);
                let mut list_state = ListState::default();
                list_state.select(Some(current));
                self.mode = Mode::GroupList { groups, list_state };
            }
            Err(e) => self.status_message = Some(format!("Error: {e}")),
        }
    }

    fn handle_group_list(&mut self, key: KeyEvent, groups: Vec<Group>, mut list_state: ListState) {
        match key.code {
            KeyCode::Esc => self.mode = Mode::Feed,
            KeyCode::Char('j') | KeyCode::Down => {
                let i = list_state.selected().unwrap_or(0);
                if i + 1 < groups.len() {
                    list_state.select(Some(i + 1));
                }
                self.mode = Mode::GroupList { groups, list_state };
            }
            KeyCode::Char('k') | KeyCode::Up => {
                let i = list_state.selected().unwrap_or(0);
                if i > 0 {
                    list_state.select(Some(i - 1));
                }
                self.mode = Mode::GroupList { groups, list_state };
            }
            KeyCode::Enter => {
                if let Some(group) = list_state.selected().and_then(|i| groups.get(i)) {
                    let name = group.display_name().to_string();
                    self.mode = Mode::Feed;
                    self.open_group(group.clone());
                    self.status_message.get_or_insert(format!("Switched to: {name}"));
                }
            }
            _ => {}
        }
    }

    // ---- Rendering ----

    pub fn render(&self, frame: &mut Frame) {
        let area = frame.area();

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        self.render_title_bar(frame, layout[0]);
        let title = self
            .group
            .as_ref()
            .map(|g| g.display_name())
            .unwrap_or("no group");
        self.list.render(
            frame,
            layout[1],
            title,
            &self.user.uid,
            self.interaction.open_menu(),
        );
        self.render_status_bar(frame, layout[2]);

        match &self.interaction {
            Interaction::Viewing => {}
            Interaction::MenuOpen { message_id } => self.render_menu(frame, message_id, area),
            Interaction::Editing { draft, .. } => {
                self.render_input_bar(frame, " Edit message ", draft, area)
            }
            Interaction::ConfirmingDelete(_) => self.render_confirm_delete_dialog(frame, area),
        }

        match &self.mode {
            Mode::Feed => {}
            Mode::Compose { input, attachment } => {
                let label = match attachment {
                    Some(file) => format!(" Message [+ {}] ", file.file_name),
                    None => " Message ".to_string(),
                };
                self.render_input_bar(frame, &label, input, area)
            }
            Mode::AttachPath { input, .. } => {
                self.render_input_bar(frame, " Attach file (path) ", input, area)
            }
            Mode::GroupList { groups, list_state } => {
                self.render_group_list(frame, groups, list_state, area)
            }
        }
    }

    fn render_title_bar(&self, frame: &mut Frame, area: Rect) {
        let group = self
            .group
            .as_ref()
            .map(|g| g.display_name().to_string())
            .unwrap_or_else(|| "-".into());
        let spans = vec![
            Span::styled(" groupchat ", Style::default().bold().fg(Color::Cyan)),
            Span::raw("| "),
            Span::styled(group, Style::default().fg(Color::Yellow)),
            Span::raw(" | "),
            Span::raw(self.user.label().to_string()),
            Span::styled(
                format!(" ({})", self.user.role.display_name()),
                Style::default().fg(Color::DarkGray),
            ),
        ];
        frame.render_widget(Line::from(spans), area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        if let Some(ref msg) = self.status_message {
            let line = Line::from(Span::styled(
                format!(" {msg}"),
                Style::default().fg(Color::Green),
            ));
            frame.render_widget(line, area);
            return;
        }

        let hints = match (&self.mode, &self.interaction) {
            (Mode::Feed, Interaction::Viewing) => vec![
                ("q", "quit"),
                ("j/k", "messages"),
                ("i", "write"),
                ("a", "attach"),
                ("m", "menu"),
                ("r", "refresh"),
                ("g", "groups"),
            ],
            (Mode::Feed, Interaction::MenuOpen { .. }) => vec![
                ("e", "edit"),
                ("d", "delete"),
                ("s", "download"),
                ("Esc", "close"),
            ],
            (Mode::Feed, Interaction::Editing { .. }) => {
                vec![("Enter", "save"), ("Esc", "cancel")]
            }
            (Mode::Feed, Interaction::ConfirmingDelete(_)) => {
                vec![("y", "confirm"), ("any", "cancel")]
            }
            (Mode::Compose { .. }, _) => {
                vec![("Enter", "send"), ("Tab", "attach"), ("Esc", "cancel")]
            }
            (Mode::AttachPath { .. }, _) => vec![("Enter", "attach"), ("Esc", "back")],
            (Mode::GroupList { .. }, _) => {
                vec![("j/k", "nav"), ("Enter", "open"), ("Esc", "back")]
            }
        };

        let spans: Vec<Span> = hints
            .into_iter()
            .flat_map(|(key, desc)| {
                vec![
                    Span::styled(
                        format!(" {key}"),
                        Style::default().fg(Color::Yellow).bold(),
                    ),
                    Span::raw(format!(" {desc} ")),
                ]
            })
            .collect();

        frame.render_widget(Line::from(spans), area);
    }

    fn render_input_bar(&self, frame: &mut Frame, label: &str, input: &str, area: Rect) {
        let input_area = Rect {
            x: area.x,
            y: area.y + area.height.saturating_sub(3),
            width: area.width,
            height: 3.min(area.height),
        };
        frame.render_widget(Clear, input_area);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(label.to_string());
        let paragraph = Paragraph::new(input.to_string()).block(block);
        frame.render_widget(paragraph, input_area);
    }

    fn render_menu(&self, frame: &mut Frame, message_id: &str, area: Rect) {
        let Some(message) = self.feed_message(message_id) else {
            return;
        };
        let popup = centered_rect(30, 25, area);
        frame.render_widget(Clear, popup);

        let block = Block::default()
            .title(" Actions ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta));

        let lines: Vec<Line> = menu_actions(&message, &self.user.uid)
            .into_iter()
            .map(|action| {
                Line::from(vec![
                    Span::styled(
                        format!("[{}] ", menu_key(action)),
                        Style::default().fg(Color::Yellow).bold(),
                    ),
                    Span::raw(action.label()),
                ])
            })
            .collect();

        frame.render_widget(Paragraph::new(lines).block(block), popup);
    }

    fn render_confirm_delete_dialog(&self, frame: &mut Frame, area: Rect) {
        let popup = centered_rect(50, 20, area);
        frame.render_widget(Clear, popup);

        let block = Block::default()
            .title(" Confirm Delete ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red));

        let text = "Delete this message for everyone?\n\n(y)es / (any key) cancel";
        let paragraph = Paragraph::new(text)
            .block(block)
            .wrap(Wrap { trim: false })
            .alignment(Alignment::Center);
        frame.render_widget(paragraph, popup);
    }

    fn render_group_list(
        &self,
        frame: &mut Frame,
        groups: &[Group],
        list_state: &ListState,
        area: Rect,
    ) {
        let popup = centered_rect(50, 50, area);
        frame.render_widget(Clear, popup);

        let block = Block::default()
            .title(" Groups ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta));

        let current = self.group.as_ref().map(|g| g.id.as_str());
        let items: Vec<ListItem> = groups
            .iter()
            .map(|g| {
                let marker = if Some(g.id.as_str()) == current {
                    "* "
                } else {
                    "  "
                };
                let mut spans = vec![
                    Span::styled(marker, Style::default().fg(Color::Cyan)),
                    Span::styled(g.display_name().to_string(), Style::default().bold()),
                    Span::styled(
                        format!(" {}%", g.progress),
                        Style::default().fg(Color::DarkGray),
                    ),
                ];
                if let Some(title) = g.project_title.as_deref() {
                    spans.push(Span::styled(
                        format!(" {title}"),
                        Style::default().fg(Color::Blue),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Magenta)
                    .bold(),
            )
            .highlight_symbol("> ");

        let mut state = list_state.clone();
        frame.render_stateful_widget(list, popup, &mut state);
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.close_feed();
    }
}

fn menu_key(action: MenuAction) -> char {
    match action {
        MenuAction::Edit => 'e',
        MenuAction::Delete => 'd',
        MenuAction::Download => 's',
    }
}

/// The user's own group if listed, else the first one.
fn default_group(groups: &[Group], user: &SessionUser) -> Option<Group> {
    user.group_id
        .as_deref()
        .and_then(|id| groups.iter().find(|g| g.id == id))
        .or_else(|| groups.first())
        .cloned()
}

fn placeholder_group(id: &str) -> Group {
    Group {
        id: id.to_string(),
        name: String::new(),
        prof_id: None,
        student_ids: Vec::new(),
        project_title: None,
        progress: 0,
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
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
        .split(popup_layout[1])[1]
}
