//! Per-run session state
//!
//! A session owns the global bus, the active surfaces, the package registry,
//! options, the accelerometer controller and the image cache for one run of
//! a main script. The host builds a new session for every (re)load and tears
//! the old one down first.
//!
//! The session observes the global bus and the bus of every active surface.
//! Each add or remove of an `accelData` handler re-runs the accelerometer
//! policy, as does every swap of the active card. Teardown releases any
//! accelerometer subscription, manual ones included.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::{Map, Value};
use tether_events::{
    AccelPoint, Axis, BusObserver, Button, EmitOutcome, Event, EventBus, EventKind, Handler,
    Subtype,
};
use tracing::{debug, info};

use crate::accel::{AccelConfig, AccelController, AccelInput};
use crate::bridge::{ClearScope, RenderBridge, VibeKind};
use crate::config::AccelDefaults;
use crate::error::RuntimeError;
use crate::image::{DecodeCompletion, ImageLoader, ImageReady, ImageSpec, ReadyCallback, ResourceCache};
use crate::loader::{path, LoadFuture, ModuleLoader, Package};
use crate::options::OptionStore;
use crate::settings::{self, SettingsEvent, SettingsListener, SettingsOutcome};
use crate::storage::KeyValueStore;
use crate::surface::{Slot, Surface, SurfaceManager};

/// Receives the next accelerometer sample batch after a peek
pub type PeekCallback = Box<dyn FnOnce(&Event)>;

/// Collaborators shared by every session of a runtime
#[derive(Clone)]
pub struct Services {
    pub bridge: Rc<dyn RenderBridge>,
    pub store: Rc<dyn KeyValueStore>,
    pub loader: Rc<ModuleLoader>,
    pub images: Rc<dyn ImageLoader>,
}

/// Per-session settings taken from the host configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub main_url: Option<String>,
    pub settings_url: String,
    pub accel: AccelDefaults,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            main_url: None,
            settings_url: crate::config::runtime_config::DEFAULT_SETTINGS_URL.to_string(),
            accel: AccelDefaults::default(),
        }
    }
}

pub struct Session {
    run: Cell<bool>,
    started_at: DateTime<Utc>,
    main_url: String,
    settings_url: String,
    emitter: EventBus,
    packages: RefCell<HashMap<String, Rc<Package>>>,
    options: RefCell<OptionStore>,
    surfaces: SurfaceManager,
    accel: RefCell<AccelController>,
    images: RefCell<ResourceCache>,
    settings: RefCell<Vec<Rc<SettingsListener>>>,
    pending_peeks: RefCell<Vec<PeekCallback>>,
    services: Services,
}

impl Session {
    pub fn new(services: Services, config: SessionConfig) -> Rc<Self> {
        let main_url = config.main_url.unwrap_or_default();
        let options = OptionStore::load(Rc::clone(&services.store), path::base_name(&main_url));

        let session = Rc::new_cyclic(|weak: &Weak<Session>| {
            let observer: Weak<dyn BusObserver> = weak.clone();
            Session {
                run: Cell::new(true),
                started_at: Utc::now(),
                settings_url: config.settings_url,
                emitter: EventBus::with_observer("global", observer.clone()),
                packages: RefCell::new(HashMap::new()),
                options: RefCell::new(options),
                surfaces: SurfaceManager::new(Rc::clone(&services.bridge), observer),
                accel: RefCell::new(AccelController::new(config.accel.rate, config.accel.samples)),
                images: RefCell::new(ResourceCache::new(Rc::clone(&services.images))),
                settings: RefCell::new(Vec::new()),
                pending_peeks: RefCell::new(Vec::new()),
                services,
                main_url,
            }
        });

        session
            .surfaces
            .set_active(Slot::Card, Some(Rc::new(Surface::card(Map::new()))));
        info!(target: "session", "Session started for {}", session.describe_main());
        session
    }

    fn describe_main(&self) -> &str {
        if self.main_url.is_empty() {
            "<no script>"
        } else {
            &self.main_url
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.get()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn main_url(&self) -> &str {
        &self.main_url
    }

    pub fn bridge(&self) -> Rc<dyn RenderBridge> {
        Rc::clone(&self.services.bridge)
    }

    pub fn emitter(&self) -> &EventBus {
        &self.emitter
    }

    // ========================================================================
    // Packages
    // ========================================================================

    pub fn package(&self, name: &str) -> Option<Rc<Package>> {
        self.packages.borrow().get(name).cloned()
    }

    pub(crate) fn register_package(&self, package: Rc<Package>) {
        self.packages
            .borrow_mut()
            .insert(package.name().to_string(), package);
    }

    pub fn packages(&self) -> Vec<Rc<Package>> {
        self.packages.borrow().values().cloned().collect()
    }

    /// Load `path` relative to the main script's directory
    pub fn load(self: &Rc<Self>, path: &str) -> LoadFuture {
        let base = path::base_path(&self.main_url).to_string();
        self.services.loader.load(self, &base, path)
    }

    /// Load the main script itself
    pub fn load_main(self: &Rc<Self>) -> LoadFuture {
        let url = self.main_url.clone();
        self.services.loader.load(self, "", &url)
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    /// Register on the global bus. `kind` must be a known event type.
    pub fn on(&self, kind: &str, subtype: Option<&str>, handler: Handler) -> Result<(), RuntimeError> {
        let kind: EventKind = kind.parse()?;
        self.on_kind(kind, Subtype::parse(subtype), handler);
        Ok(())
    }

    pub fn on_kind(&self, kind: EventKind, subtype: Subtype, handler: Handler) {
        self.emitter.on(kind, subtype, handler);
    }

    /// Remove global handlers; see `EventBus::off` for how omitted arguments widen the match
    pub fn off(
        &self,
        kind: Option<&str>,
        subtype: Option<&str>,
        handler: Option<&Handler>,
    ) -> Result<usize, RuntimeError> {
        let (kind, subtype) = parse_filter(kind, subtype)?;
        Ok(self.emitter.off(kind, subtype.as_ref(), handler))
    }

    pub fn surface_on(
        &self,
        slot: Slot,
        kind: &str,
        subtype: Option<&str>,
        handler: Handler,
    ) -> Result<(), RuntimeError> {
        let kind: EventKind = kind.parse()?;
        let surface = self.require_active(slot)?;
        surface.on(kind, Subtype::parse(subtype), handler);
        Ok(())
    }

    pub fn surface_off(
        &self,
        slot: Slot,
        kind: Option<&str>,
        subtype: Option<&str>,
        handler: Option<&Handler>,
    ) -> Result<usize, RuntimeError> {
        let (kind, subtype) = parse_filter(kind, subtype)?;
        let surface = self.require_active(slot)?;
        Ok(surface.emitter().off(kind, subtype.as_ref(), handler))
    }

    /// Handlers on the global bus plus the active card's bus
    pub fn listener_count(&self, kind: EventKind, subtype: Option<&Subtype>) -> usize {
        let card = self
            .surfaces
            .active(Slot::Card)
            .map_or(0, |card| card.emitter().listener_count(kind, subtype));
        self.emitter.listener_count(kind, subtype) + card
    }

    // ========================================================================
    // Surfaces
    // ========================================================================

    pub fn active(&self, slot: Slot) -> Option<Rc<Surface>> {
        self.surfaces.active(slot)
    }

    fn require_active(&self, slot: Slot) -> Result<Rc<Surface>, RuntimeError> {
        self.surfaces
            .active(slot)
            .ok_or_else(|| RuntimeError::IllegalState(format!("no active {}", slot)))
    }

    pub fn set_active(&self, slot: Slot, surface: Option<Rc<Surface>>) -> bool {
        let changed = self.surfaces.set_active(slot, surface);
        if changed {
            self.reconcile_accel();
        }
        changed
    }

    pub fn apply_properties(
        &self,
        slot: Slot,
        target: Option<Rc<Surface>>,
        props: Map<String, Value>,
        clear: ClearScope,
    ) -> Result<Rc<Surface>, RuntimeError> {
        let surface = self.surfaces.apply_properties(slot, target, props, clear)?;
        self.reconcile_accel();
        Ok(surface)
    }

    pub fn update_properties(&self, surface: &Rc<Surface>, props: &Map<String, Value>) {
        self.surfaces.update_properties(surface, props);
    }

    /// Build a new surface from `props` and make it the active one of `slot`
    pub fn show(&self, slot: Slot, props: Map<String, Value>) -> Result<Rc<Surface>, RuntimeError> {
        let surface = Rc::new(Surface::from_props(slot, props)?);
        self.apply_properties(slot, Some(surface), Map::new(), ClearScope::All)
    }

    pub fn action(&self, action: Value) -> Result<(), RuntimeError> {
        self.surfaces
            .set_action(None, action)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::IllegalState("no active card".to_string()))
    }

    // ========================================================================
    // Emission
    // ========================================================================

    /// Deliver to the active card first; unless it cancels, deliver again on
    /// the global bus
    pub fn emit_to_card(&self, event: Event) -> EmitOutcome {
        self.emit_to_surface(Slot::Card, event)
    }

    /// Same as `emit_to_card` for the active menu. Section and item requests
    /// stay on the menu's bus.
    pub fn emit_to_menu(&self, event: Event) -> EmitOutcome {
        self.emit_to_surface(Slot::Menu, event)
    }

    fn emit_to_surface(&self, slot: Slot, event: Event) -> EmitOutcome {
        let kind = event.kind;
        let subtype = event.subtype.clone();

        let mut event = event;
        let mut local = EmitOutcome::Delivered(None);
        if let Some(surface) = self.surfaces.active(slot) {
            event = event.with_surface(surface.id());
            local = surface.emitter().emit(kind, subtype.as_deref(), &event);
            if local.is_cancelled() {
                return local;
            }
        }

        match kind.global_kind() {
            Some(global) => self
                .emitter
                .emit(global, subtype.as_deref(), &event.retyped(global)),
            None => local,
        }
    }

    pub fn emit_click(&self, kind: EventKind, button: Button) -> EmitOutcome {
        self.emit_to_card(Event::click(kind, button))
    }

    pub fn emit_accel_tap(&self, axis: Axis, direction: i8) -> EmitOutcome {
        self.emit_to_card(Event::accel_tap(axis, direction))
    }

    /// A sample batch answers pending peeks if there are any; otherwise it
    /// is an `accelData` event
    pub fn emit_accel_data(&self, accels: Vec<AccelPoint>) -> EmitOutcome {
        let peeks = std::mem::take(&mut *self.pending_peeks.borrow_mut());
        let event = Event::accel_data(accels);
        if peeks.is_empty() {
            return self.emit_to_card(event);
        }

        debug!(target: "accel", "Answering {} peek(s)", peeks.len());
        for peek in peeks {
            peek(&event);
        }
        EmitOutcome::Delivered(None)
    }

    /// Renderer asks for a section of the active menu
    pub fn emit_menu_section(&self, section: usize) -> EmitOutcome {
        let Some(menu) = self.surfaces.active(Slot::Menu) else {
            return EmitOutcome::Delivered(None);
        };
        let outcome = self.emit_to_menu(Event::menu_section(section));
        if !outcome.is_cancelled() {
            if let Some(content) = menu.menu_section(section) {
                self.services.bridge.menu_section(section, &content);
            }
        }
        outcome
    }

    /// Renderer asks for an item of the active menu
    pub fn emit_menu_item(&self, section: usize, item: usize) -> EmitOutcome {
        let Some(menu) = self.surfaces.active(Slot::Menu) else {
            return EmitOutcome::Delivered(None);
        };
        let outcome = self.emit_to_menu(Event::menu_item(EventKind::Item, section, item));
        if !outcome.is_cancelled() {
            if let Some(content) = menu.menu_item(section, item) {
                self.services.bridge.menu_item(section, item, &content);
            }
        }
        outcome
    }

    pub fn emit_menu_select(&self, long: bool, section: usize, item: usize) -> EmitOutcome {
        let kind = if long {
            EventKind::LongSelect
        } else {
            EventKind::Select
        };
        self.emit_to_menu(Event::menu_item(kind, section, item))
    }

    // ========================================================================
    // Accelerometer
    // ========================================================================

    pub fn accel_config(&self) -> AccelConfig {
        self.accel.borrow().config().clone()
    }

    pub fn set_accel_config(
        &self,
        input: AccelInput,
        automatic: bool,
    ) -> Result<AccelConfig, RuntimeError> {
        let config = self.accel.borrow_mut().set_config(input, automatic)?;
        self.services.bridge.accel_config(&config);
        Ok(config)
    }

    /// Re-run the auto-subscribe policy against the current listener count
    pub fn reconcile_accel(&self) {
        if !self.is_running() {
            return;
        }
        let listeners = self.listener_count(EventKind::AccelData, None);
        let changed = self.accel.borrow_mut().reconcile(listeners);
        if let Some(config) = changed {
            self.services.bridge.accel_config(&config);
        }
    }

    pub fn accel_peek(&self, callback: PeekCallback) -> Result<(), RuntimeError> {
        self.accel.borrow().check_peek()?;
        self.pending_peeks.borrow_mut().push(callback);
        self.services.bridge.accel_peek();
        Ok(())
    }

    // ========================================================================
    // Images
    // ========================================================================

    /// Id for the image described by `spec`; relative URLs resolve against
    /// the main script's directory
    pub fn image(&self, spec: ImageSpec, force_reset: bool, on_ready: Option<ReadyCallback>) -> u32 {
        let mut descriptor = spec.into_descriptor();
        descriptor.url = path::resolve(path::base_path(&self.main_url), &descriptor.url);
        self.images
            .borrow_mut()
            .resolve(descriptor, force_reset, on_ready)
    }

    pub fn image_count(&self) -> usize {
        self.images.borrow().len()
    }

    /// Drive queued image decodes until none are left. Callbacks may queue
    /// more, which are driven in the same call.
    pub async fn settle(&self) {
        loop {
            let mut pending = self.images.borrow_mut().take_pending();
            if pending.is_empty() {
                break;
            }
            while let Some(completion) = pending.next().await {
                self.finish_decode(completion);
            }
        }
    }

    fn finish_decode(&self, completion: DecodeCompletion) {
        if !self.is_running() {
            return;
        }

        let Some(decoded) = completion.decoded.as_ref() else {
            debug!(target: "images", "No image for id {} ({})", completion.id, completion.url);
            return;
        };

        if !self.images.borrow_mut().complete(&completion) {
            debug!(target: "images", "Id {} was replaced before its decode finished", completion.id);
        }
        self.services.bridge.image(completion.id, decoded);

        if let Some(on_ready) = completion.on_ready {
            on_ready(ImageReady {
                id: completion.id,
                url: completion.url,
            });
        }
    }

    // ========================================================================
    // Options and settings
    // ========================================================================

    pub fn option(&self, key: &str) -> Option<Value> {
        self.options.borrow().get(key)
    }

    pub fn set_option(&self, key: &str, value: Option<Value>) {
        self.options.borrow_mut().set(key, value);
    }

    pub fn options(&self) -> Map<String, Value> {
        self.options.borrow().to_map()
    }

    pub fn vibe(&self, kind: VibeKind) {
        self.services.bridge.vibe(kind);
    }

    pub fn add_settings_listener(&self, listener: SettingsListener) {
        debug!(target: "settings", "Settings listener registered for {}", listener.url);
        self.settings.borrow_mut().push(Rc::new(listener));
    }

    fn settings_listener(&self) -> Option<Rc<SettingsListener>> {
        self.settings.borrow().last().cloned()
    }

    /// Hand the settings page URL to the renderer and return it
    pub fn open_settings(&self) -> String {
        let (url, options) = match self.settings_listener() {
            Some(listener) => {
                let options = Value::Object(self.options());
                if let Some(open) = &listener.open {
                    open(&SettingsEvent {
                        url: listener.url.clone(),
                        options: options.clone(),
                    });
                }
                (listener.url.clone(), options)
            }
            None => {
                let mut base = Map::new();
                base.insert("scriptUrl".to_string(), Value::String(self.main_url.clone()));
                (self.settings_url.clone(), Value::Object(base))
            }
        };

        let page = settings::page_url(&url, &options);
        info!(target: "settings", "Opening settings: {}", url);
        self.services.bridge.open_url(&page);
        self.emitter.emit(
            EventKind::SettingsOpen,
            None,
            &Event::settings(EventKind::SettingsOpen, Some(url), options),
        );
        page
    }

    /// Handle the settings page response
    pub fn close_settings(&self, response: Option<&str>) -> SettingsOutcome {
        let options = settings::decode_response(response);
        let listener = self.settings_listener();

        self.emitter.emit(
            EventKind::SettingsClose,
            None,
            &Event::settings(
                EventKind::SettingsClose,
                listener.as_ref().map(|l| l.url.clone()),
                options.clone(),
            ),
        );

        if let Some(listener) = listener {
            (listener.close)(&SettingsEvent {
                url: listener.url.clone(),
                options,
            });
            return SettingsOutcome::Handled;
        }

        match options.get("scriptUrl").and_then(Value::as_str) {
            Some(url) if !url.is_empty() => {
                info!(target: "settings", "Settings requested reload from {}", url);
                SettingsOutcome::Reload(url.to_string())
            }
            _ => SettingsOutcome::Ignored,
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Drop every handler and stop reacting to hooks. Bindings held by
    /// scripts fail with `SessionEnded` from here on.
    pub fn teardown(&self) {
        if !self.run.replace(false) {
            return;
        }
        self.surfaces.clear();
        self.emitter.detach_observer();
        let removed = self.emitter.off_all();
        self.pending_peeks.borrow_mut().clear();
        let released = self.accel.borrow_mut().release();
        if let Some(config) = released {
            self.services.bridge.accel_config(&config);
        }
        info!(
            target: "session",
            "Session for {} torn down ({} global handler(s), up {}s)",
            self.describe_main(),
            removed,
            (Utc::now() - self.started_at).num_seconds()
        );
    }
}

impl BusObserver for Session {
    fn on_add_handler(&self, kind: EventKind, _subtype: &Subtype) {
        if kind == EventKind::AccelData {
            self.reconcile_accel();
        }
    }

    fn on_remove_handler(&self, kind: EventKind, _subtype: &Subtype) {
        if kind == EventKind::AccelData {
            self.reconcile_accel();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("main_url", &self.main_url)
            .field("run", &self.run.get())
            .field("started_at", &self.started_at)
            .field("packages", &self.packages.borrow().len())
            .field("emitter", &self.emitter)
            .finish()
    }
}

fn parse_filter(
    kind: Option<&str>,
    subtype: Option<&str>,
) -> Result<(Option<EventKind>, Option<Subtype>), RuntimeError> {
    let kind = kind.map(str::parse::<EventKind>).transpose()?;
    Ok((kind, subtype.map(|s| Subtype::parse(Some(s)))))
}
