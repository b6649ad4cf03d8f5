//! Script package loading
//!
//! `load` resolves a path, and if no package of that name exists in the
//! session yet, registers one synchronously before any fetch is started.
//! Later loads of the same name, including cyclic ones issued while the
//! first is still running, get the registered package's exports and never
//! fetch again.
//!
//! Fetched source is saved under `script:<url>`. When a fetch fails or
//! returns nothing, the saved copy is executed instead.

pub mod console;
pub mod package;
pub mod path;

use std::rc::Rc;

use futures::future::LocalBoxFuture;
use tracing::{debug, error, info, warn};

use crate::engine::{Bindings, ModuleBinding, Require, RuntimeApi, ScriptEngine};
use crate::error::RuntimeError;
use crate::session::Session;
use crate::storage::{store_quietly, KeyValueStore};
use crate::transport::{FetchError, Transport};

pub use console::Console;
pub use package::{Exports, Package, PackageState};

pub type LoadFuture = LocalBoxFuture<'static, Result<Exports, RuntimeError>>;

pub struct ModuleLoader {
    transport: Rc<dyn Transport>,
    engine: Rc<dyn ScriptEngine>,
    store: Rc<dyn KeyValueStore>,
}

impl ModuleLoader {
    pub fn new(
        transport: Rc<dyn Transport>,
        engine: Rc<dyn ScriptEngine>,
        store: Rc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            transport,
            engine,
            store,
        }
    }

    /// Load `path` relative to `base` into `session`.
    ///
    /// The package is registered before this returns, so the memo check of
    /// a nested load always sees it.
    pub fn load(self: &Rc<Self>, session: &Rc<Session>, base: &str, path: &str) -> LoadFuture {
        let url = path::resolve(base, &path::with_js_extension(path));
        let name = path::package_name(&path::base_path(session.main_url()), &url);

        if let Some(existing) = session.package(&name) {
            debug!(target: "loader", "{} already loaded ({})", name, existing.state());
            let result = match existing.state() {
                PackageState::Fatal => Err(RuntimeError::IllegalState(format!(
                    "{} failed to load earlier in this session",
                    name
                ))),
                _ => Ok(existing.exports()),
            };
            return Box::pin(async move { result });
        }

        let package = Rc::new(Package::new(name, url));
        session.register_package(Rc::clone(&package));
        debug!(target: "loader", "Registered package {} ({})", package.name(), package.source_path());

        let bindings = Bindings {
            module: ModuleBinding::new(Rc::clone(&package)),
            require: Require::new(
                Rc::clone(self),
                Rc::downgrade(session),
                path::base_path(package.source_path()).to_string(),
            ),
            console: Console::new(package.name()),
            bridge: session.bridge(),
            runtime: RuntimeApi::new(Rc::downgrade(session)),
        };

        let loader = Rc::clone(self);
        Box::pin(async move {
            let source = loader.fetch_source(&package).await?;
            loader.execute(&package, &source, bindings).await?;
            Ok(package.exports())
        })
    }

    async fn fetch_source(&self, package: &Package) -> Result<String, RuntimeError> {
        package.set_state(PackageState::Fetching);

        let failure = match self.transport.fetch(package.source_path()).await {
            Ok(bytes) if !bytes.is_empty() => {
                let source = String::from_utf8_lossy(&bytes).into_owned();
                store_quietly(self.store.as_ref(), package.persist_key(), &source);
                debug!(target: "loader", "Fetched {} ({} bytes)", package.source_path(), bytes.len());
                return Ok(source);
            }
            Ok(_) => FetchError::Empty(package.source_path().to_string()),
            Err(e) => e,
        };

        package.set_state(PackageState::FetchFailed);
        warn!(target: "loader", "Fetch of {} failed: {}", package.source_path(), failure);

        match self.store.get(package.persist_key()) {
            Some(source) => {
                package.set_state(PackageState::CacheFallback);
                info!(target: "loader", "Running saved copy of {}", package.name());
                Ok(source)
            }
            None => {
                package.set_state(PackageState::Fatal);
                error!(target: "loader", "No saved copy of {}", package.name());
                Err(RuntimeError::PackageUnavailable {
                    name: package.name().to_string(),
                    url: package.source_path().to_string(),
                    source: failure,
                })
            }
        }
    }

    async fn execute(
        &self,
        package: &Package,
        source: &str,
        bindings: Bindings,
    ) -> Result<(), RuntimeError> {
        let result = match self.engine.compile(package.execution_name(), source) {
            Ok(unit) => unit.invoke(bindings).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(returned) => {
                if let Some(value) = returned {
                    if package.adopt_return(value) {
                        debug!(target: "loader", "{} exports its return value", package.name());
                    }
                }
                package.set_state(PackageState::Executed);
                info!(target: "loader", "Loaded {}", package.name());
                Ok(())
            }
            Err(e) => {
                package.set_state(PackageState::Errored);
                error!(target: "loader", "Error in {}: {}", package.name(), e);
                Err(e)
            }
        }
    }
}
