/// Session orchestration for tether scripts
///
/// Owns everything between a loaded script and the render bridge: surfaces,
/// the module loader and script engine, the image cache, accelerometer
/// policy, options and the settings handshake.
pub mod accel;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod image;
pub mod loader;
pub mod options;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod storage;
pub mod surface;
pub mod transport;

pub use accel::{AccelConfig, AccelController, AccelInput, SubscribeMode};
pub use bridge::{ClearScope, RenderBridge, VibeKind};
pub use config::TetherConfig;
pub use engine::{Bindings, CompiledScript, DirectiveEngine, RuntimeApi, ScriptEngine};
pub use error::RuntimeError;
pub use image::{DecodedImage, ImageDescriptor, ImageLoader, ImageReady, ImageSpec, ResourceCache};
pub use loader::{ModuleLoader, Package, PackageState};
pub use runtime::{BuildError, LoadOutcome, Runtime, RuntimeBuilder};
pub use session::{PeekCallback, Services, Session, SessionConfig};
pub use settings::{SettingsEvent, SettingsListener, SettingsOutcome};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use surface::{Slot, Surface, SurfaceManager};
pub use transport::{DefaultTransport, FetchError, Transport};
