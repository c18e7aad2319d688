//! State machine tests for the TUI App.
//!
//! Each test builds an App over an in-memory store, signed in as a professor
//! who runs two groups, and drives it with key events. The poll interval is
//! long enough that only the App's own loads matter.

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use groupchat_core::group::Group;
use groupchat_core::role::Role;
use groupchat_core::session::{Session, SessionHandle, SessionUser};
use groupchat_feed::Interaction;
use groupchat_service::MemoryService;
use groupchat_tui::app::{App, AppOptions, Mode};
use tempfile::TempDir;

const ME: &str = "prof1";

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn char_key(c: char) -> KeyEvent {
    key(KeyCode::Char(c))
}

fn type_text(app: &mut App, text: &str) {
    for c in text.chars() {
        app.handle_key(char_key(c));
    }
}

fn me() -> SessionUser {
    SessionUser {
        uid: ME.into(),
        email: "prof1@uni.test".into(),
        display_name: Some("Prof One".into()),
        role: Role::Professor,
        group_id: None,
    }
}

fn group(id: &str, name: &str) -> Group {
    Group {
        id: id.into(),
        name: name.into(),
        prof_id: Some(ME.into()),
        student_ids: vec!["bob".into()],
        project_title: None,
        progress: 0,
    }
}

fn store_with_session() -> (Arc<MemoryService>, SessionHandle) {
    let session = SessionHandle::signed_in(Session::new(me(), "token"));
    let store = Arc::new(
        MemoryService::new(session.clone())
            .with_group(group("g1", "Alpha"))
            .with_group(group("g2", "Beta")),
    );
    (store, session)
}

fn store() -> Arc<MemoryService> {
    store_with_session().0
}

fn build(store: &Arc<MemoryService>, open: Option<&str>) -> (App, TempDir) {
    let downloads = tempfile::tempdir().unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let options = AppOptions {
        group: open.map(String::from),
        poll_interval: Duration::from_secs(3600),
        download_dir: downloads.path().to_path_buf(),
    };
    let app = App::new(rt, store.clone(), store.clone(), me(), options).unwrap();
    (app, downloads)
}

fn make_app() -> (App, Arc<MemoryService>, TempDir) {
    let store = store();
    let (app, downloads) = build(&store, None);
    (app, store, downloads)
}

/// An app whose open group already holds one message of mine.
fn make_app_with_message(text: &str) -> (App, Arc<MemoryService>, String) {
    let store = store();
    let id = store.insert_text("g1", ME, text).id;
    let (app, _downloads) = build(&store, None);
    (app, store, id)
}

fn selected_text(app: &App) -> Option<String> {
    app.selected_message().and_then(|m| m.text.clone())
}

// ---- Startup ----

#[test]
fn app_opens_the_first_group_and_loads_it() {
    let store = store();
    store.insert_text("g1", "bob", "welcome");
    let (app, _dl) = build(&store, None);

    assert!(matches!(app.mode(), Mode::Feed));
    assert!(app.interaction().is_viewing());
    assert_eq!(app.group().unwrap().id, "g1");
    assert_eq!(selected_text(&app).as_deref(), Some("welcome"));
}

#[test]
fn explicit_group_is_opened() {
    let store = store();
    let (app, _dl) = build(&store, Some("g2"));
    assert_eq!(app.group().unwrap().display_name(), "Beta");
}

#[test]
fn unlisted_group_opens_by_id() {
    let store = store();
    let (app, _dl) = build(&store, Some("g9"));
    assert_eq!(app.group().unwrap().display_name(), "g9");
    assert!(app.messages().is_empty());
}

// ---- Compose ----

#[test]
fn compose_and_send() {
    let (mut app, store, _dl) = make_app();

    app.handle_key(char_key('i'));
    assert!(matches!(app.mode(), Mode::Compose { .. }));
    type_text(&mut app, "hello");
    app.handle_key(key(KeyCode::Enter));

    assert!(matches!(app.mode(), Mode::Feed));
    assert_eq!(app.status_message(), Some("Message sent"));
    assert_eq!(selected_text(&app).as_deref(), Some("hello"));
    assert_eq!(store.messages("g1").len(), 1);
}

#[test]
fn empty_send_stays_in_compose() {
    let (mut app, store, _dl) = make_app();

    app.handle_key(char_key('i'));
    type_text(&mut app, "   ");
    app.handle_key(key(KeyCode::Enter));

    assert!(matches!(app.mode(), Mode::Compose { .. }));
    assert!(app.status_message().unwrap().starts_with("Send failed"));
    assert!(store.messages("g1").is_empty());
}

#[test]
fn esc_leaves_compose() {
    let (mut app, _store, _dl) = make_app();
    app.handle_key(char_key('i'));
    app.handle_key(key(KeyCode::Esc));
    assert!(matches!(app.mode(), Mode::Feed));
}

#[test]
fn q_is_text_while_composing() {
    let (mut app, _store, _dl) = make_app();
    assert!(!app.is_input_mode());

    app.handle_key(char_key('i'));
    assert!(app.is_input_mode());
    app.handle_key(char_key('q'));

    match app.mode() {
        Mode::Compose { input, .. } => assert_eq!(input, "q"),
        other => panic!("expected Compose, got {other:?}"),
    }
}

// ---- Attachments ----

#[test]
fn attach_send_and_download() {
    let (mut app, store, downloads) = make_app();
    let source = tempfile::tempdir().unwrap();
    let path = source.path().join("notes.txt");
    std::fs::write(&path, "agenda").unwrap();

    app.handle_key(char_key('i'));
    type_text(&mut app, "see file");
    app.handle_key(key(KeyCode::Tab));
    assert!(matches!(app.mode(), Mode::AttachPath { .. }));
    type_text(&mut app, path.to_str().unwrap());
    app.handle_key(key(KeyCode::Enter));

    match app.mode() {
        Mode::Compose { input, attachment } => {
            assert_eq!(input, "see file");
            assert_eq!(attachment.as_ref().unwrap().file_name, "notes.txt");
        }
        other => panic!("expected Compose, got {other:?}"),
    }
    app.handle_key(key(KeyCode::Enter));
    assert_eq!(store.messages("g1").len(), 1);

    app.handle_key(char_key('m'));
    assert!(app.interaction().open_menu().is_some());
    app.handle_key(char_key('s'));

    assert!(app.interaction().is_viewing());
    assert!(app.status_message().unwrap().starts_with("Saved to"));
    let saved = downloads.path().join("notes.txt");
    assert_eq!(std::fs::read_to_string(saved).unwrap(), "agenda");
}

#[test]
fn missing_file_is_reported() {
    let (mut app, _store, _dl) = make_app();

    app.handle_key(char_key('a'));
    type_text(&mut app, "/no/such/file.pdf");
    app.handle_key(key(KeyCode::Enter));

    assert!(matches!(app.mode(), Mode::AttachPath { .. }));
    assert!(app.status_message().unwrap().starts_with("Cannot attach"));
}

// ---- Menu, edit, delete ----

#[test]
fn edit_via_menu() {
    let (mut app, store, id) = make_app_with_message("typo");

    app.handle_key(char_key('m'));
    assert_eq!(app.interaction().open_menu(), Some(id.as_str()));
    app.handle_key(char_key('e'));
    assert_eq!(app.interaction().draft(), Some("typo"));
    assert!(app.is_input_mode());

    for _ in 0..4 {
        app.handle_key(key(KeyCode::Backspace));
    }
    type_text(&mut app, "fixed");
    app.handle_key(key(KeyCode::Enter));

    assert!(app.interaction().is_viewing());
    assert_eq!(app.status_message(), Some("Message updated"));
    let m = app.selected_message().unwrap();
    assert_eq!(m.text.as_deref(), Some("fixed"));
    assert!(m.edited);
    assert_eq!(store.messages("g1")[0].text.as_deref(), Some("fixed"));
}

#[test]
fn blank_edit_keeps_editing() {
    let (mut app, store, _id) = make_app_with_message("abc");

    app.handle_key(char_key('m'));
    app.handle_key(char_key('e'));
    for _ in 0..3 {
        app.handle_key(key(KeyCode::Backspace));
    }
    app.handle_key(key(KeyCode::Enter));

    assert_eq!(app.interaction().draft(), Some(""));
    assert_eq!(app.status_message(), Some("edited message cannot be empty"));
    assert_eq!(store.messages("g1")[0].text.as_deref(), Some("abc"));

    app.handle_key(key(KeyCode::Esc));
    assert!(app.interaction().is_viewing());
}

#[test]
fn no_menu_for_someone_elses_text() {
    let store = store();
    store.insert_text("g1", "bob", "not yours");
    let (mut app, _dl) = build(&store, None);

    app.handle_key(char_key('m'));

    assert!(app.interaction().is_viewing());
    assert_eq!(app.status_message(), Some("No actions for this message"));
}

#[test]
fn delete_requires_confirmation() {
    let (mut app, store, _id) = make_app_with_message("doomed");

    app.handle_key(char_key('m'));
    app.handle_key(char_key('d'));
    assert!(matches!(app.interaction(), Interaction::ConfirmingDelete(_)));

    app.handle_key(char_key('n'));
    assert!(app.interaction().is_viewing());
    assert_eq!(app.status_message(), Some("Delete cancelled"));
    assert_eq!(store.messages("g1").len(), 1);

    app.handle_key(char_key('m'));
    app.handle_key(char_key('d'));
    app.handle_key(char_key('y'));

    assert_eq!(app.status_message(), Some("Message deleted"));
    assert!(app.messages().is_empty());
    assert!(store.messages("g1").is_empty());
}

#[test]
fn moving_closes_the_menu() {
    let store = store();
    store.insert_text("g1", ME, "first");
    store.insert_text("g1", ME, "second");
    let (mut app, _dl) = build(&store, None);

    app.handle_key(char_key('m'));
    assert!(app.interaction().open_menu().is_some());
    app.handle_key(char_key('k'));

    assert!(app.interaction().is_viewing());
    assert_eq!(selected_text(&app).as_deref(), Some("first"));
}

#[test]
fn reopening_the_menu_closes_it() {
    let (mut app, _store, _id) = make_app_with_message("toggle me");
    app.handle_key(char_key('m'));
    app.handle_key(char_key('m'));
    assert!(app.interaction().is_viewing());
}

// ---- Groups and refresh ----

#[test]
fn switch_group() {
    let store = store();
    store.insert_text("g2", "bob", "over here");
    let (mut app, _dl) = build(&store, None);

    app.handle_key(char_key('g'));
    assert!(matches!(app.mode(), Mode::GroupList { .. }));
    app.handle_key(char_key('j'));
    app.handle_key(key(KeyCode::Enter));

    assert!(matches!(app.mode(), Mode::Feed));
    assert_eq!(app.group().unwrap().id, "g2");
    assert_eq!(app.status_message(), Some("Switched to: Beta"));
    assert_eq!(selected_text(&app).as_deref(), Some("over here"));
}

#[test]
fn q_still_quits_from_group_list() {
    let (mut app, _store, _dl) = make_app();
    app.handle_key(char_key('g'));
    assert!(matches!(app.mode(), Mode::GroupList { .. }));
    assert!(!app.is_input_mode());
}

#[test]
fn esc_leaves_group_list() {
    let (mut app, _store, _dl) = make_app();
    app.handle_key(char_key('g'));
    app.handle_key(key(KeyCode::Esc));
    assert!(matches!(app.mode(), Mode::Feed));
    assert_eq!(app.group().unwrap().id, "g1");
}

#[test]
fn refresh_picks_up_remote_messages_and_keeps_selection() {
    let (mut app, store, id) = make_app_with_message("mine");

    store.insert_text("g1", "bob", "reply");
    app.handle_key(char_key('r'));

    assert_eq!(app.messages().len(), 2);
    assert_eq!(app.selected_message().unwrap().id, id);
}

#[test]
fn offline_refresh_reports_and_empties() {
    let (mut app, store, _id) = make_app_with_message("cached");

    store.set_offline(true);
    app.handle_key(char_key('r'));

    assert!(app.status_message().unwrap().starts_with("Load error"));
    assert!(app.messages().is_empty());
}

#[test]
fn rejected_session_is_reported_and_recovers_after_sign_in() {
    let (store, session) = store_with_session();
    store.insert_text("g1", "bob", "hello");
    let (mut app, _dl) = build(&store, None);

    session.sign_out();
    app.handle_key(char_key('r'));
    assert!(app.status_message().unwrap().starts_with("Load error"));
    assert!(app.messages().is_empty());

    session.sign_in(Session::new(me(), "renewed"));
    app.handle_key(char_key('r'));
    assert_eq!(selected_text(&app).as_deref(), Some("hello"));
}
