use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent};
use groupchat_core::message::{Message, MessageKind};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};

pub struct MessageList {
    messages: Vec<Message>,
    list_state: ListState,
}

impl Default for MessageList {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MessageList {
    /// New list with the newest (last) message selected.
    pub fn new(messages: Vec<Message>) -> Self {
        let mut list = Self {
            messages,
            list_state: ListState::default(),
        };
        list.select_last();
        list
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn selected(&self) -> Option<&Message> {
        self.messages.get(self.list_state.selected()?)
    }

    /// Swap in a freshly loaded list. The selection stays on the same
    /// message if it is still there, else on the same position.
    pub fn replace(&mut self, messages: Vec<Message>) {
        let selected_id = self.selected().map(|m| m.id.clone());
        let selected_idx = self.list_state.selected();
        self.messages = messages;
        if let Some(id) = selected_id {
            if self.select_by_id(&id) {
                return;
            }
        }
        match selected_idx {
            Some(_) if self.messages.is_empty() => self.list_state.select(None),
            Some(i) => self.list_state.select(Some(i.min(self.messages.len() - 1))),
            None => self.select_last(),
        }
    }

    /// Returns `false`, leaving the selection alone, if the id is not listed.
    pub fn select_by_id(&mut self, message_id: &str) -> bool {
        match self.messages.iter().position(|m| m.id == message_id) {
            Some(idx) => {
                self.list_state.select(Some(idx));
                true
            }
            None => false,
        }
    }

    pub fn select_last(&mut self) {
        let last = self.messages.len().checked_sub(1);
        self.list_state.select(last);
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.messages.is_empty() {
            return;
        }
        let current = self.list_state.selected().unwrap_or(0);
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if current + 1 < self.messages.len() {
                    self.list_state.select(Some(current + 1));
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                if current > 0 {
                    self.list_state.select(Some(current - 1));
                }
            }
            KeyCode::Home => self.list_state.select(Some(0)),
            KeyCode::End => self.select_last(),
            _ => {}
        }
    }

    pub fn render(
        &self,
        frame: &mut Frame,
        area: Rect,
        title: &str,
        my_uid: &str,
        open_menu: Option<&str>,
    ) {
        let block = Block::default()
            .title(format!(" {title} ({}) ", self.messages.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan));

        let items: Vec<ListItem> = self
            .messages
            .iter()
            .map(|m| message_item(m, my_uid, open_menu == Some(m.id.as_str())))
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol("> ");

        let mut state = self.list_state.clone();
        frame.render_stateful_widget(list, area, &mut state);
    }
}

pub fn author_label<'a>(message: &'a Message, my_uid: &str) -> &'a str {
    if message.is_from(my_uid) {
        "Me"
    } else {
        message
            .sender_email
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(message.sender_id.as_str())
    }
}

/// `dd/mm/yyyy • HH:MM` in local time.
pub fn format_timestamp(message: &Message) -> String {
    match message.created_at {
        Some(ts) => ts
            .with_timezone(&Local)
            .format("%d/%m/%Y • %H:%M")
            .to_string(),
        None => "sending…".to_string(),
    }
}

fn message_item(message: &Message, my_uid: &str, menu_open: bool) -> ListItem<'static> {
    let mine = message.is_from(my_uid);
    let author_style = if mine {
        Style::default().fg(Color::Cyan).bold()
    } else {
        Style::default().fg(Color::Yellow).bold()
    };

    let mut header = vec![
        Span::styled(author_label(message, my_uid).to_string(), author_style),
        Span::styled(
            format!("  {}", format_timestamp(message)),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if message.edited {
        header.push(Span::styled(
            " (edited)",
            Style::default().fg(Color::DarkGray).italic(),
        ));
    }
    if menu_open {
        header.push(Span::styled(" [menu]", Style::default().fg(Color::Magenta)));
    }

    let mut lines = vec![Line::from(header)];
    if let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) {
        lines.extend(text.lines().map(|l| Line::from(format!("  {l}"))));
    }
    if message.kind == MessageKind::Document {
        if let Some(a) = &message.attachment {
            let mut card = vec![
                Span::styled(
                    format!("  [{}] ", a.type_label()),
                    Style::default().fg(Color::Black).bg(Color::Blue),
                ),
                Span::styled(format!(" {}", a.file_name), Style::default().underlined()),
            ];
            if let Some(size) = a.size_bytes {
                card.push(Span::styled(
                    format!(" ({})", human_size(size)),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            if a.upload_error.is_some() {
                card.push(Span::styled(
                    " upload failed",
                    Style::default().fg(Color::Red),
                ));
            }
            lines.push(Line::from(card));
        }
    }
    ListItem::new(lines)
}

fn human_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}
