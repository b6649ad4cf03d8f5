//! Host entry point
//!
//! A `Runtime` owns the collaborators and exactly one live [`Session`].
//! Every main script (re)load tears the current session down and starts a
//! fresh one.

use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::bridge::{ClearScope, RenderBridge};
use crate::config::TetherConfig;
use crate::engine::{DirectiveEngine, ScriptEngine};
use crate::error::RuntimeError;
use crate::image::{ImageLoader, TransportImageLoader};
use crate::loader::{path, ModuleLoader};
use crate::session::{Services, Session, SessionConfig};
use crate::settings::SettingsOutcome;
use crate::storage::{keys, store_quietly, KeyValueStore, MemoryStore};
use crate::surface::Slot;
use crate::transport::{DefaultTransport, Transport};

/// Result of loading a main script
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded { url: String },
    /// No URL given and none persisted
    NoScript,
    /// The session shows a "Failed to load" card
    Failed { url: String, error: RuntimeError },
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }
}

/// Error during builder configuration
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Render bridge not specified - use .with_bridge()")]
    MissingBridge,
}

pub struct Runtime {
    services: Services,
    config: SessionConfig,
    session: Rc<Session>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn new(services: Services, config: SessionConfig) -> Self {
        let session = Session::new(services.clone(), config.clone());
        Self {
            services,
            config,
            session,
        }
    }

    pub fn session(&self) -> Rc<Session> {
        Rc::clone(&self.session)
    }

    pub fn store(&self) -> Rc<dyn KeyValueStore> {
        Rc::clone(&self.services.store)
    }

    /// Tear the current session down and start a fresh one for `main_url`
    pub fn reset(&mut self, main_url: Option<String>) -> Rc<Session> {
        self.session.teardown();
        let config = SessionConfig {
            main_url,
            ..self.config.clone()
        };
        self.session = Session::new(self.services.clone(), config);
        self.session()
    }

    /// Load the main script from `url`, or from the last persisted URL.
    ///
    /// A given URL is normalized and persisted first. A failed load leaves
    /// the fresh session showing a "Failed to load" card.
    pub async fn load_main_script(&mut self, url: Option<&str>) -> LoadOutcome {
        let url = match url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => {
                let url = path::normalize_main_url(url);
                store_quietly(self.services.store.as_ref(), keys::MAIN_SCRIPT_URL, &url);
                url
            }
            None => match self
                .services
                .store
                .get(keys::MAIN_SCRIPT_URL)
                .filter(|url| !url.is_empty())
            {
                Some(url) => url,
                None => {
                    info!(target: "session", "No main script configured");
                    self.reset(None);
                    return LoadOutcome::NoScript;
                }
            },
        };

        let session = self.reset(Some(url.clone()));
        info!(target: "session", "Loading main script {}", url);

        match session.load_main().await {
            Ok(_) => LoadOutcome::Loaded { url },
            Err(error) => {
                error!(target: "session", "Failed to load {}: {}", url, error);
                let mut props = Map::new();
                props.insert("title".to_string(), Value::from("Failed to load"));
                props.insert("body".to_string(), Value::from(url.as_str()));
                if let Err(e) = session.apply_properties(Slot::Card, None, props, ClearScope::All) {
                    warn!(target: "session", "Could not show load failure: {}", e);
                }
                LoadOutcome::Failed { url, error }
            }
        }
    }

    pub fn open_settings(&self) -> String {
        self.session.open_settings()
    }

    /// Hand the settings response to the session; reloads when asked to
    pub async fn close_settings(&mut self, response: Option<&str>) -> SettingsOutcome {
        let outcome = self.session.close_settings(response);
        if let SettingsOutcome::Reload(url) = &outcome {
            let url = url.clone();
            if let LoadOutcome::Failed { error, .. } = self.load_main_script(Some(&url)).await {
                warn!(target: "settings", "Reload from settings failed: {}", error);
            }
        }
        outcome
    }

    /// Deliver every queued image decode
    pub async fn settle(&self) {
        let session = self.session();
        session.settle().await;
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.session.teardown();
    }
}

/// Builder for [`Runtime`]
///
/// Only the render bridge is required. The rest default to an in-memory
/// store, the network/file transport, the directive engine and an image
/// loader over the transport.
pub struct RuntimeBuilder {
    bridge: Option<Rc<dyn RenderBridge>>,
    store: Option<Rc<dyn KeyValueStore>>,
    transport: Option<Rc<dyn Transport>>,
    engine: Option<Rc<dyn ScriptEngine>>,
    images: Option<Rc<dyn ImageLoader>>,
    config: SessionConfig,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            bridge: None,
            store: None,
            transport: None,
            engine: None,
            images: None,
            config: SessionConfig::default(),
        }
    }

    pub fn with_bridge(mut self, bridge: Rc<dyn RenderBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn with_store(mut self, store: Rc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_engine(mut self, engine: Rc<dyn ScriptEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_image_loader(mut self, images: Rc<dyn ImageLoader>) -> Self {
        self.images = Some(images);
        self
    }

    /// Take the settings page and accelerometer defaults from `config`
    pub fn with_config(mut self, config: &TetherConfig) -> Self {
        self.config.settings_url = config.runtime.settings_url.clone();
        self.config.accel = config.accel.clone();
        self
    }

    pub fn build(self) -> Result<Runtime, BuildError> {
        let bridge = self.bridge.ok_or(BuildError::MissingBridge)?;
        let store = self
            .store
            .unwrap_or_else(|| Rc::new(MemoryStore::new()) as Rc<dyn KeyValueStore>);
        let transport = self
            .transport
            .unwrap_or_else(|| Rc::new(DefaultTransport::new()) as Rc<dyn Transport>);
        let engine = self
            .engine
            .unwrap_or_else(|| Rc::new(DirectiveEngine::new()) as Rc<dyn ScriptEngine>);
        let images = self.images.unwrap_or_else(|| {
            Rc::new(TransportImageLoader::new(Rc::clone(&transport))) as Rc<dyn ImageLoader>
        });

        let services = Services {
            bridge,
            loader: Rc::new(ModuleLoader::new(transport, engine, Rc::clone(&store))),
            store,
            images,
        };
        Ok(Runtime::new(services, self.config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
