use std::rc::{Rc, Weak};

use serde_json::{Map, Value};
use tether_events::{EventKind, Handler};

use crate::accel::{AccelConfig, AccelInput};
use crate::bridge::{ClearScope, RenderBridge, VibeKind};
use crate::error::RuntimeError;
use crate::image::{ImageSpec, ReadyCallback};
use crate::loader::{Console, Exports, LoadFuture, ModuleLoader, Package};
use crate::session::{PeekCallback, Session};
use crate::settings::SettingsListener;
use crate::surface::Slot;

/// Everything a running script can reach
#[derive(Clone)]
pub struct Bindings {
    pub module: ModuleBinding,
    pub require: Require,
    pub console: Console,
    pub bridge: Rc<dyn RenderBridge>,
    pub runtime: RuntimeApi,
}

/// `module`: the package being executed
#[derive(Debug, Clone)]
pub struct ModuleBinding {
    package: Rc<Package>,
}

impl ModuleBinding {
    pub fn new(package: Rc<Package>) -> Self {
        Self { package }
    }

    pub fn name(&self) -> &str {
        self.package.name()
    }

    pub fn path(&self) -> &str {
        self.package.source_path()
    }

    pub fn exports(&self) -> Exports {
        self.package.exports()
    }

    /// `module.exports.<key> = value`
    pub fn set_export(&self, key: &str, value: Value) {
        self.package.set_export(key, value);
    }

    /// `module.exports = value`
    pub fn set_exports(&self, value: Value) {
        self.package.reassign(value);
    }
}

/// `require`, resolving relative to the calling package
#[derive(Clone)]
pub struct Require {
    loader: Rc<ModuleLoader>,
    session: Weak<Session>,
    base: String,
}

impl Require {
    pub fn new(loader: Rc<ModuleLoader>, session: Weak<Session>, base: String) -> Self {
        Self {
            loader,
            session,
            base,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn call(&self, path: &str) -> LoadFuture {
        match self.session.upgrade() {
            Some(session) => self.loader.load(&session, &self.base, path),
            None => Box::pin(async { Err(RuntimeError::SessionEnded) }),
        }
    }
}

/// The slice of the session a script may use.
///
/// Holds the session weakly; once the session is torn down every call
/// fails with `SessionEnded`.
#[derive(Clone)]
pub struct RuntimeApi {
    session: Weak<Session>,
}

impl RuntimeApi {
    pub fn new(session: Weak<Session>) -> Self {
        Self { session }
    }

    fn session(&self) -> Result<Rc<Session>, RuntimeError> {
        self.session
            .upgrade()
            .filter(|session| session.is_running())
            .ok_or(RuntimeError::SessionEnded)
    }

    pub fn on(&self, kind: &str, subtype: Option<&str>, handler: Handler) -> Result<(), RuntimeError> {
        self.session()?.on(kind, subtype, handler)
    }

    pub fn off(
        &self,
        kind: Option<&str>,
        subtype: Option<&str>,
        handler: Option<&Handler>,
    ) -> Result<usize, RuntimeError> {
        self.session()?.off(kind, subtype, handler)
    }

    /// Register on the private bus of the active surface in `slot`
    pub fn surface_on(
        &self,
        slot: Slot,
        kind: &str,
        subtype: Option<&str>,
        handler: Handler,
    ) -> Result<(), RuntimeError> {
        self.session()?.surface_on(slot, kind, subtype, handler)
    }

    pub fn surface_off(
        &self,
        slot: Slot,
        kind: Option<&str>,
        subtype: Option<&str>,
        handler: Option<&Handler>,
    ) -> Result<usize, RuntimeError> {
        self.session()?.surface_off(slot, kind, subtype, handler)
    }

    pub fn listener_count(&self, kind: &str) -> Result<usize, RuntimeError> {
        let kind: EventKind = kind.parse()?;
        Ok(self.session()?.listener_count(kind, None))
    }

    /// Update the active surface of `slot`
    pub fn apply(
        &self,
        slot: Slot,
        props: Map<String, Value>,
        clear: ClearScope,
    ) -> Result<u64, RuntimeError> {
        let surface = self.session()?.apply_properties(slot, None, props, clear)?;
        Ok(surface.id())
    }

    /// Create a new surface for `slot` and make it active
    pub fn show(&self, slot: Slot, props: Map<String, Value>) -> Result<u64, RuntimeError> {
        Ok(self.session()?.show(slot, props)?.id())
    }

    pub fn action(&self, action: Value) -> Result<(), RuntimeError> {
        self.session()?.action(action)
    }

    pub fn image(
        &self,
        spec: ImageSpec,
        force_reset: bool,
        on_ready: Option<ReadyCallback>,
    ) -> Result<u32, RuntimeError> {
        Ok(self.session()?.image(spec, force_reset, on_ready))
    }

    /// Explicit, non-automatic configuration change
    pub fn accel_config(&self, input: AccelInput) -> Result<AccelConfig, RuntimeError> {
        self.session()?.set_accel_config(input, false)
    }

    pub fn accel_peek(&self, callback: PeekCallback) -> Result<(), RuntimeError> {
        self.session()?.accel_peek(callback)
    }

    pub fn option(&self, key: &str) -> Result<Option<Value>, RuntimeError> {
        Ok(self.session()?.option(key))
    }

    /// `None` deletes the option
    pub fn set_option(&self, key: &str, value: Option<Value>) -> Result<(), RuntimeError> {
        self.session()?.set_option(key, value);
        Ok(())
    }

    pub fn vibe(&self, kind: VibeKind) -> Result<(), RuntimeError> {
        self.session()?.vibe(kind);
        Ok(())
    }

    pub fn settings(&self, listener: SettingsListener) -> Result<(), RuntimeError> {
        self.session()?.add_settings_listener(listener);
        Ok(())
    }
}
