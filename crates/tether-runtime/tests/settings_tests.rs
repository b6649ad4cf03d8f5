// Integration tests for options and the settings page handshake

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{BridgeCall, Harness, MAIN_URL};
use serde_json::{json, Value};
use tether_events::{Event, EventData, Handler, HandlerOutcome};
use tether_runtime::config::runtime_config::DEFAULT_SETTINGS_URL;
use tether_runtime::settings::page_url;
use tether_runtime::storage::keys;
use tether_runtime::{KeyValueStore, SettingsOutcome};

fn encode(options: &Value) -> String {
    urlencoding::encode(&options.to_string()).into_owned()
}

fn record_settings(h: &Harness, kind: &str) -> Rc<RefCell<Vec<Value>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    h.runtime
        .session()
        .on(
            kind,
            None,
            Handler::new(move |event: &Event| {
                if let EventData::Settings { options, .. } = &event.data {
                    log.borrow_mut().push(options.clone());
                }
                HandlerOutcome::Continue
            }),
        )
        .unwrap();
    seen
}

#[tokio::test]
async fn test_options_persist_per_script() {
    let mut h = Harness::new();
    let outcome = h
        .run_main("option count = 3\noption name = \"pebble\"\noption gone = 1\noption gone")
        .await;
    assert!(outcome.is_loaded(), "unexpected outcome: {:?}", outcome);

    let session = h.runtime.session();
    assert_eq!(session.option("count"), Some(json!(3)));
    assert_eq!(session.option("name"), Some(json!("pebble")));
    assert_eq!(session.option("gone"), None);
    assert!(h.store.get(&keys::options("main.js")).is_some());

    // A new runtime over the same store sees them again
    let mut again = Harness::with_store(Rc::clone(&h.store));
    assert!(again.run_main("log back").await.is_loaded());
    assert_eq!(again.runtime.session().option("count"), Some(json!(3)));
}

#[tokio::test]
async fn test_malformed_options_start_empty() {
    let store = Rc::new(tether_runtime::MemoryStore::new());
    store.set(&keys::options("main.js"), "{not json").unwrap();

    let mut h = Harness::with_store(store);
    assert!(h.run_main("log hi").await.is_loaded());
    assert!(h.runtime.session().options().is_empty());
}

#[tokio::test]
async fn test_open_without_listener_uses_default_page() {
    let mut h = Harness::new();
    assert!(h.run_main("log hi").await.is_loaded());
    let opened = record_settings(&h, "settingsOpen");

    let page = h.runtime.open_settings();
    let expected = format!("{}#{}", DEFAULT_SETTINGS_URL, encode(&json!({"scriptUrl": MAIN_URL})));
    assert_eq!(page, expected);
    assert_eq!(h.bridge.calls().last(), Some(&BridgeCall::OpenUrl(expected)));
    assert_eq!(*opened.borrow(), vec![json!({"scriptUrl": MAIN_URL})]);
}

#[tokio::test]
async fn test_close_without_listener_reloads_script() {
    let mut h = Harness::new();
    assert!(h.run_main("log first").await.is_loaded());
    let other = "http://example.com/other/app.js";
    h.transport.serve(other, "option reloaded = true");

    let response = encode(&json!({"scriptUrl": other}));
    let outcome = h.runtime.close_settings(Some(&response)).await;
    assert_eq!(outcome, SettingsOutcome::Reload(other.to_string()));

    let session = h.runtime.session();
    assert_eq!(session.main_url(), other);
    assert_eq!(session.option("reloaded"), Some(json!(true)));
    assert_eq!(h.store.get(keys::MAIN_SCRIPT_URL).as_deref(), Some(other));
}

#[tokio::test]
async fn test_close_without_listener_or_url_is_ignored() {
    let mut h = Harness::new();
    assert!(h.run_main("log first").await.is_loaded());
    let before = h.runtime.session();

    assert_eq!(h.runtime.close_settings(None).await, SettingsOutcome::Ignored);
    assert_eq!(
        h.runtime.close_settings(Some("%7Bbroken")).await,
        SettingsOutcome::Ignored
    );
    assert!(Rc::ptr_eq(&before, &h.runtime.session()));
}

#[tokio::test]
async fn test_script_listener_owns_settings() {
    let mut h = Harness::new();
    let outcome = h
        .run_main("option color = \"red\"\nsettings http://example.com/config.html")
        .await;
    assert!(outcome.is_loaded(), "unexpected outcome: {:?}", outcome);
    let closed = record_settings(&h, "settingsClose");

    let page = h.runtime.open_settings();
    assert_eq!(
        page,
        page_url("http://example.com/config.html", &json!({"color": "red"}))
    );

    let response = encode(&json!({"color": "blue", "size": 2}));
    let outcome = h.runtime.close_settings(Some(&response)).await;
    assert_eq!(outcome, SettingsOutcome::Handled);

    let session = h.runtime.session();
    assert_eq!(session.option("color"), Some(json!("blue")));
    assert_eq!(session.option("size"), Some(json!(2)));
    assert_eq!(*closed.borrow(), vec![json!({"color": "blue", "size": 2})]);
}

#[tokio::test]
async fn test_latest_listener_wins() {
    let mut h = Harness::new();
    let outcome = h
        .run_main("settings http://example.com/first.html\nsettings http://example.com/second.html")
        .await;
    assert!(outcome.is_loaded());

    let page = h.runtime.open_settings();
    assert!(page.starts_with("http://example.com/second.html#"));
}
