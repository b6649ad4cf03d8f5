/// Core event types and the listener bus for tether
///
/// This crate provides the foundational event machinery shared by the runtime:
/// the event taxonomy, typed payloads, handlers and the type/subtype bus with
/// lifecycle hooks. It has no knowledge of sessions or surfaces.
pub mod bus;
pub mod error;
pub mod event;
pub mod kind;

pub use bus::{BusObserver, EmitOutcome, EventBus, Handler, HandlerOutcome};
pub use error::EventError;
pub use event::{AccelPoint, Axis, Button, Event, EventData, Subtype};
pub use kind::EventKind;
