//! Type/subtype listener bus with lifecycle hooks
//!
//! Handlers are registered per `(EventKind, Subtype)` and invoked in
//! registration order. A handler returning `HandlerOutcome::Cancel`, or the
//! value `false`, stops the emission; the remaining handlers are skipped.
//!
//! The bus is single-threaded and uses interior mutability so that handlers
//! and observers can call back into it. No borrow is held while user code
//! runs: emission works on a snapshot of the matching handlers, and observer
//! hooks fire after the mutation is committed.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::debug;

use crate::event::{Event, Subtype};
use crate::kind::EventKind;

/// What a handler returned
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Nothing returned, continue delivery
    Continue,
    /// A value returned, continue delivery (`false` cancels)
    Value(Value),
    /// Veto: stop delivery here
    Cancel,
}

/// Result of an emission
#[derive(Debug, Clone, PartialEq)]
pub enum EmitOutcome {
    /// A handler cancelled the event
    Cancelled,
    /// Every matching handler ran; carries the last value returned, if any
    Delivered(Option<Value>),
}

impl EmitOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EmitOutcome::Cancelled)
    }
}

/// Event handler callback.
///
/// Identity is the identity of the callback: clones of one `Handler` are the
/// same handler as far as `EventBus::off` is concerned.
#[derive(Clone)]
pub struct Handler(Rc<dyn Fn(&Event) -> HandlerOutcome>);

impl Handler {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Event) -> HandlerOutcome + 'static,
    {
        Self(Rc::new(callback))
    }

    /// Run the callback. A returned `false` is a veto, the same as `Cancel`.
    pub fn call(&self, event: &Event) -> HandlerOutcome {
        match (self.0)(event) {
            HandlerOutcome::Value(Value::Bool(false)) => HandlerOutcome::Cancel,
            outcome => outcome,
        }
    }

    pub fn same(&self, other: &Handler) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Lifecycle hooks fired by a bus after each handler is added or removed
pub trait BusObserver {
    fn on_add_handler(&self, kind: EventKind, subtype: &Subtype);

    fn on_remove_handler(&self, kind: EventKind, subtype: &Subtype);
}

#[derive(Debug, Clone)]
struct Listener {
    kind: EventKind,
    subtype: Subtype,
    handler: Handler,
}

/// Listener registry for one scope (the session, or one surface)
pub struct EventBus {
    /// Label used in logs ("global", "card#2", ...)
    label: String,
    /// Listeners in registration order
    listeners: RefCell<Vec<Listener>>,
    /// Lifecycle observer, if attached
    observer: RefCell<Option<Weak<dyn BusObserver>>>,
}

impl EventBus {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            listeners: RefCell::new(Vec::new()),
            observer: RefCell::new(None),
        }
    }

    pub fn with_observer(label: impl Into<String>, observer: Weak<dyn BusObserver>) -> Self {
        let bus = Self::new(label);
        bus.attach_observer(observer);
        bus
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Route lifecycle hooks to `observer`, replacing any previous one
    pub fn attach_observer(&self, observer: Weak<dyn BusObserver>) {
        *self.observer.borrow_mut() = Some(observer);
    }

    /// Stop routing lifecycle hooks; returns the observer that was attached
    pub fn detach_observer(&self) -> Option<Weak<dyn BusObserver>> {
        self.observer.borrow_mut().take()
    }

    pub fn has_observer(&self) -> bool {
        self.observer.borrow().is_some()
    }

    fn observer(&self) -> Option<Rc<dyn BusObserver>> {
        self.observer.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Register `handler` for `(kind, subtype)`
    pub fn on(&self, kind: EventKind, subtype: Subtype, handler: Handler) {
        debug!(target: "events", "[{}] on {} ({})", self.label, kind, subtype);
        self.listeners.borrow_mut().push(Listener {
            kind,
            subtype: subtype.clone(),
            handler,
        });

        if let Some(observer) = self.observer() {
            observer.on_add_handler(kind, &subtype);
        }
    }

    /// Remove handlers.
    ///
    /// - `kind`, `subtype` and `handler` given: remove that handler under that pair
    /// - `handler` omitted: remove every handler under the pair
    /// - `subtype` omitted: match every subtype of `kind`
    /// - everything omitted: remove every handler
    ///
    /// Returns the number of handlers removed. One remove hook fires per handler.
    pub fn off(
        &self,
        kind: Option<EventKind>,
        subtype: Option<&Subtype>,
        handler: Option<&Handler>,
    ) -> usize {
        let removed: Vec<Listener> = {
            let mut listeners = self.listeners.borrow_mut();
            let (removed, kept): (Vec<Listener>, Vec<Listener>) =
                listeners.drain(..).partition(|listener| {
                    kind.map_or(true, |k| listener.kind == k)
                        && subtype.map_or(true, |s| &listener.subtype == s)
                        && handler.map_or(true, |h| listener.handler.same(h))
                });
            *listeners = kept;
            removed
        };

        if !removed.is_empty() {
            debug!(
                target: "events",
                "[{}] off {} handler(s) (type: {:?}, subtype: {:?})",
                self.label,
                removed.len(),
                kind,
                subtype
            );
        }

        if let Some(observer) = self.observer() {
            for listener in &removed {
                observer.on_remove_handler(listener.kind, &listener.subtype);
            }
        }

        removed.len()
    }

    /// Remove every handler
    pub fn off_all(&self) -> usize {
        self.off(None, None, None)
    }

    /// Deliver `event` to every handler registered for `kind` whose subtype
    /// filter matches `subtype`, in registration order.
    pub fn emit(&self, kind: EventKind, subtype: Option<&str>, event: &Event) -> EmitOutcome {
        let handlers: Vec<Handler> = self
            .listeners
            .borrow()
            .iter()
            .filter(|listener| listener.kind == kind && listener.subtype.matches(subtype))
            .map(|listener| listener.handler.clone())
            .collect();

        debug!(
            target: "events",
            "[{}] emit {} ({:?}) to {} handler(s)",
            self.label,
            kind,
            subtype,
            handlers.len()
        );

        let mut last = None;
        for handler in handlers {
            match handler.call(event) {
                HandlerOutcome::Cancel => {
                    debug!(target: "events", "[{}] {} cancelled by handler", self.label, kind);
                    return EmitOutcome::Cancelled;
                }
                HandlerOutcome::Value(value) => last = Some(value),
                HandlerOutcome::Continue => last = None,
            }
        }

        EmitOutcome::Delivered(last)
    }

    /// Count handlers of `kind`; `None` subtype counts across all subtypes
    pub fn listener_count(&self, kind: EventKind, subtype: Option<&Subtype>) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|listener| {
                listener.kind == kind && subtype.map_or(true, |s| &listener.subtype == s)
            })
            .count()
    }

    /// Snapshot of registered `(kind, subtype)` pairs in registration order
    pub fn registrations(&self) -> Vec<(EventKind, Subtype)> {
        self.listeners
            .borrow()
            .iter()
            .map(|listener| (listener.kind, listener.subtype.clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("label", &self.label)
            .field("listeners", &self.len())
            .field("observed", &self.has_observer())
            .finish()
    }
}
