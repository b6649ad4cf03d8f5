// Shared fixtures for runtime integration tests

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tether_runtime::surface::menu::{MenuItem, ResolvedSection};
use tether_runtime::{
    AccelConfig, ClearScope, DecodedImage, FetchError, ImageDescriptor, ImageLoader, KeyValueStore,
    MemoryStore, RenderBridge, Runtime, Transport, VibeKind,
};

pub const MAIN_URL: &str = "http://example.com/app/main.js";

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeCall {
    Window { props: Map<String, Value>, clear: ClearScope },
    Card { props: Map<String, Value>, clear: ClearScope },
    Menu(Map<String, Value>),
    MenuSection { section: usize, content: ResolvedSection },
    MenuItem { section: usize, item: usize, content: MenuItem },
    Image { id: u32, bytes: usize },
    AccelConfig(AccelConfig),
    AccelPeek,
    Vibe(VibeKind),
    OpenUrl(String),
}

/// Render bridge that records every call
#[derive(Default)]
pub struct RecordingBridge {
    calls: RefCell<Vec<BridgeCall>>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BridgeCall> {
        self.calls.borrow().clone()
    }

    pub fn take(&self) -> Vec<BridgeCall> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    pub fn cards(&self) -> Vec<(Map<String, Value>, ClearScope)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                BridgeCall::Card { props, clear } => Some((props.clone(), *clear)),
                _ => None,
            })
            .collect()
    }

    pub fn last_card(&self) -> Option<(Map<String, Value>, ClearScope)> {
        self.cards().pop()
    }

    pub fn accel_configs(&self) -> Vec<AccelConfig> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                BridgeCall::AccelConfig(config) => Some(config.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn images(&self) -> Vec<u32> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                BridgeCall::Image { id, .. } => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BridgeCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl RenderBridge for RecordingBridge {
    fn window(&self, props: &Map<String, Value>, clear: ClearScope) {
        self.record(BridgeCall::Window {
            props: props.clone(),
            clear,
        });
    }

    fn card(&self, props: &Map<String, Value>, clear: ClearScope) {
        self.record(BridgeCall::Card {
            props: props.clone(),
            clear,
        });
    }

    fn menu(&self, state: &Map<String, Value>) {
        self.record(BridgeCall::Menu(state.clone()));
    }

    fn menu_section(&self, section: usize, content: &ResolvedSection) {
        self.record(BridgeCall::MenuSection {
            section,
            content: content.clone(),
        });
    }

    fn menu_item(&self, section: usize, item: usize, content: &MenuItem) {
        self.record(BridgeCall::MenuItem {
            section,
            item,
            content: content.clone(),
        });
    }

    fn image(&self, id: u32, image: &DecodedImage) {
        self.record(BridgeCall::Image {
            id,
            bytes: image.bytes.len(),
        });
    }

    fn accel_config(&self, config: &AccelConfig) {
        self.record(BridgeCall::AccelConfig(config.clone()));
    }

    fn accel_peek(&self) {
        self.record(BridgeCall::AccelPeek);
    }

    fn vibe(&self, kind: VibeKind) {
        self.record(BridgeCall::Vibe(kind));
    }

    fn open_url(&self, url: &str) {
        self.record(BridgeCall::OpenUrl(url.to_string()));
    }
}

/// Serves scripted bodies by URL and counts every fetch
#[derive(Default)]
pub struct MockTransport {
    bodies: RefCell<HashMap<String, String>>,
    failing: RefCell<HashSet<String>>,
    fetches: RefCell<HashMap<String, usize>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: &str) {
        self.failing.borrow_mut().remove(url);
        self.bodies
            .borrow_mut()
            .insert(url.to_string(), body.to_string());
    }

    /// Make `url` unreachable from now on
    pub fn fail(&self, url: &str) {
        self.failing.borrow_mut().insert(url.to_string());
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.borrow().get(url).copied().unwrap_or(0)
    }
}

#[async_trait(?Send)]
impl Transport for MockTransport {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        *self.fetches.borrow_mut().entry(url.to_string()).or_insert(0) += 1;

        if self.failing.borrow().contains(url) {
            return Err(FetchError::Unreachable(url.to_string()));
        }
        match self.bodies.borrow().get(url) {
            Some(body) => Ok(body.as_bytes().to_vec()),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Image loader that counts loads; URLs containing "broken" never decode
#[derive(Default)]
pub struct CountingImageLoader {
    loads: Cell<usize>,
    urls: RefCell<Vec<String>>,
}

impl CountingImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loads(&self) -> usize {
        self.loads.get()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.borrow().clone()
    }
}

#[async_trait(?Send)]
impl ImageLoader for CountingImageLoader {
    async fn load(&self, descriptor: &ImageDescriptor) -> Option<DecodedImage> {
        self.loads.set(self.loads.get() + 1);
        self.urls.borrow_mut().push(descriptor.url.clone());
        if descriptor.url.contains("broken") {
            return None;
        }
        Some(DecodedImage {
            bytes: vec![0u8; 4],
            width: descriptor.width,
            height: descriptor.height,
            dither: descriptor.dither.clone(),
        })
    }
}

pub struct Harness {
    pub bridge: Rc<RecordingBridge>,
    pub transport: Rc<MockTransport>,
    pub store: Rc<MemoryStore>,
    pub images: Rc<CountingImageLoader>,
    pub runtime: Runtime,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Rc::new(MemoryStore::new()))
    }

    /// Runtime over a store that may already hold persisted state
    pub fn with_store(store: Rc<MemoryStore>) -> Self {
        let bridge = Rc::new(RecordingBridge::new());
        let transport = Rc::new(MockTransport::new());
        let images = Rc::new(CountingImageLoader::new());

        let runtime = Runtime::builder()
            .with_bridge(Rc::clone(&bridge) as Rc<dyn RenderBridge>)
            .with_store(Rc::clone(&store) as Rc<dyn KeyValueStore>)
            .with_transport(Rc::clone(&transport) as Rc<dyn Transport>)
            .with_image_loader(Rc::clone(&images) as Rc<dyn ImageLoader>)
            .build()
            .expect("bridge is set");

        Self {
            bridge,
            transport,
            store,
            images,
            runtime,
        }
    }

    /// Serve `source` as the main script and load it
    pub async fn run_main(&mut self, source: &str) -> tether_runtime::LoadOutcome {
        self.transport.serve(MAIN_URL, source);
        self.runtime.load_main_script(Some(MAIN_URL)).await
    }

    pub fn serve(&self, path: &str, source: &str) {
        self.transport.serve(&format!("http://example.com/app/{}", path), source);
    }
}

pub fn props(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}
