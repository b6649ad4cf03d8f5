use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::{Map, Value};
use tether_events::{BusObserver, EventBus};
use tracing::debug;

use super::{MenuContent, Slot, Surface};
use crate::bridge::{ClearScope, RenderBridge};
use crate::error::RuntimeError;

/// Tracks the active window, card and menu and decides what the renderer
/// receives.
///
/// The observer of an active surface's bus is the session observer, so that
/// handler changes on active surfaces feed the same accounting as the global
/// bus. Inactive surfaces have no observer.
pub struct SurfaceManager {
    bridge: Rc<dyn RenderBridge>,
    observer: Weak<dyn BusObserver>,
    window: RefCell<Option<Rc<Surface>>>,
    card: RefCell<Option<Rc<Surface>>>,
    menu: RefCell<Option<Rc<Surface>>>,
}

impl SurfaceManager {
    pub fn new(bridge: Rc<dyn RenderBridge>, observer: Weak<dyn BusObserver>) -> Self {
        Self {
            bridge,
            observer,
            window: RefCell::new(None),
            card: RefCell::new(None),
            menu: RefCell::new(None),
        }
    }

    fn slot(&self, slot: Slot) -> &RefCell<Option<Rc<Surface>>> {
        match slot {
            Slot::Window => &self.window,
            Slot::Card => &self.card,
            Slot::Menu => &self.menu,
        }
    }

    pub fn active(&self, slot: Slot) -> Option<Rc<Surface>> {
        self.slot(slot).borrow().clone()
    }

    pub fn is_active(&self, surface: &Rc<Surface>) -> bool {
        self.slot(surface.slot())
            .borrow()
            .as_ref()
            .is_some_and(|active| Rc::ptr_eq(active, surface))
    }

    /// Put `surface` in `slot`. Returns `false` if it was already there.
    ///
    /// The outgoing surface's handlers are withdrawn from the accounting
    /// (one remove hook each) and the incoming surface's handlers are added
    /// (one add hook each). Hooks run after the slot is updated.
    pub fn set_active(&self, slot: Slot, surface: Option<Rc<Surface>>) -> bool {
        let outgoing = {
            let mut current = self.slot(slot).borrow_mut();
            let unchanged = match (current.as_ref(), surface.as_ref()) {
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return false;
            }
            std::mem::replace(&mut *current, surface.clone())
        };

        debug!(
            target: "session",
            "Active {}: {:?} -> {:?}",
            slot,
            outgoing.as_ref().map(|s| s.id()),
            surface.as_ref().map(|s| s.id())
        );

        if let Some(outgoing) = outgoing {
            outgoing.emitter().detach_observer();
            self.replay(outgoing.emitter(), false);
        }

        if let Some(incoming) = surface {
            incoming.emitter().attach_observer(self.observer.clone());
            self.replay(incoming.emitter(), true);
        }

        true
    }

    /// Fire one hook per registered handler of `bus`
    fn replay(&self, bus: &EventBus, added: bool) {
        let Some(observer) = self.observer.upgrade() else {
            return;
        };
        for (kind, subtype) in bus.registrations() {
            if added {
                observer.on_add_handler(kind, &subtype);
            } else {
                observer.on_remove_handler(kind, &subtype);
            }
        }
    }

    /// Merge `props` into `target` (or the active surface of `slot`), make
    /// it active and send the result.
    ///
    /// A swap forces a full resend. Otherwise `clear` decides between a patch
    /// and a full replace. A `sections` property on a menu replaces its content.
    pub fn apply_properties(
        &self,
        slot: Slot,
        target: Option<Rc<Surface>>,
        mut props: Map<String, Value>,
        clear: ClearScope,
    ) -> Result<Rc<Surface>, RuntimeError> {
        let menu_content = match (slot, props.remove("sections")) {
            (Slot::Menu, Some(sections)) => Some(MenuContent::from_json(&sections)?),
            (_, Some(sections)) => {
                props.insert("sections".to_string(), sections);
                None
            }
            (_, None) => None,
        };

        let target = match target.or_else(|| self.active(slot)) {
            Some(surface) => surface,
            None => Rc::new(Surface::from_props(slot, Map::new())?),
        };
        if target.slot() != slot {
            return Err(RuntimeError::InvalidArgument(format!(
                "surface {} is a {}, not a {}",
                target.id(),
                target.slot(),
                slot
            )));
        }

        let swapped = self.set_active(slot, Some(Rc::clone(&target)));
        if let Some(content) = menu_content {
            target.set_menu_content(content);
        }
        target.merge(&props);

        let clear = if swapped { ClearScope::All } else { clear };
        self.send(&target, &props, clear);
        Ok(target)
    }

    /// Merge `props` into `surface`; the renderer only hears about it when
    /// the surface is active
    pub fn update_properties(&self, surface: &Rc<Surface>, props: &Map<String, Value>) {
        surface.merge(props);
        if self.is_active(surface) {
            self.send(surface, props, ClearScope::None);
        }
    }

    /// Merge into the card's `action` property and resend the action bar
    pub fn set_action(&self, card: Option<Rc<Surface>>, action: Value) -> Option<Rc<Surface>> {
        let card = card.or_else(|| self.active(Slot::Card))?;

        let merged = match (card.prop("action"), action) {
            (Some(Value::Object(mut current)), Value::Object(update)) => {
                current.extend(update);
                Value::Object(current)
            }
            (_, action) => action,
        };

        let mut patch = Map::new();
        patch.insert("action".to_string(), merged);
        card.merge(&patch);

        if self.is_active(&card) {
            self.bridge.card(&patch, ClearScope::Action);
        }
        Some(card)
    }

    /// Resolve the menu content and send the full menu state
    pub fn show_menu(&self, menu: &Surface) {
        if let Some(sections) = menu.resolve_menu() {
            debug!(target: "session", "Menu #{} resolved to {} section(s)", menu.id(), sections.len());
            self.bridge.menu(&menu.state());
        }
    }

    fn send(&self, surface: &Surface, patch: &Map<String, Value>, clear: ClearScope) {
        let full;
        let props = if clear == ClearScope::All {
            full = surface.state();
            &full
        } else {
            patch
        };

        match surface.slot() {
            Slot::Window => self.bridge.window(props, clear),
            Slot::Card => self.bridge.card(props, clear),
            Slot::Menu => self.show_menu(surface),
        }
    }

    /// Empty every slot and drop every handler of the surfaces that were active
    pub fn clear(&self) {
        for slot in [Slot::Window, Slot::Card, Slot::Menu] {
            if let Some(surface) = self.slot(slot).borrow_mut().take() {
                surface.emitter().detach_observer();
                surface.emitter().off_all();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::AccelConfig;
    use crate::bridge::VibeKind;
    use crate::image::DecodedImage;
    use crate::surface::{MenuItem, ResolvedSection};
    use serde_json::json;
    use std::cell::Cell;
    use tether_events::{EventKind, Handler, HandlerOutcome, Subtype};

    #[derive(Default)]
    struct CardLog {
        cards: RefCell<Vec<(Value, ClearScope)>>,
        menus: Cell<usize>,
    }

    impl RenderBridge for CardLog {
        fn window(&self, _props: &Map<String, Value>, _clear: ClearScope) {}
        fn card(&self, props: &Map<String, Value>, clear: ClearScope) {
            self.cards
                .borrow_mut()
                .push((Value::Object(props.clone()), clear));
        }
        fn menu(&self, _state: &Map<String, Value>) {
            self.menus.set(self.menus.get() + 1);
        }
        fn menu_section(&self, _section: usize, _content: &ResolvedSection) {}
        fn menu_item(&self, _section: usize, _item: usize, _content: &MenuItem) {}
        fn image(&self, _id: u32, _image: &DecodedImage) {}
        fn accel_config(&self, _config: &AccelConfig) {}
        fn accel_peek(&self) {}
        fn vibe(&self, _kind: VibeKind) {}
        fn open_url(&self, _url: &str) {}
    }

    #[derive(Default)]
    struct Hooks {
        added: Cell<usize>,
        removed: Cell<usize>,
    }

    impl BusObserver for Hooks {
        fn on_add_handler(&self, _kind: EventKind, _subtype: &Subtype) {
            self.added.set(self.added.get() + 1);
        }
        fn on_remove_handler(&self, _kind: EventKind, _subtype: &Subtype) {
            self.removed.set(self.removed.get() + 1);
        }
    }

    fn setup() -> (Rc<CardLog>, Rc<Hooks>, SurfaceManager) {
        let bridge = Rc::new(CardLog::default());
        let hooks = Rc::new(Hooks::default());
        let observer: Weak<dyn BusObserver> = Rc::downgrade(&hooks) as Weak<dyn BusObserver>;
        let manager = SurfaceManager::new(Rc::clone(&bridge) as Rc<dyn RenderBridge>, observer);
        (bridge, hooks, manager)
    }

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn noop() -> Handler {
        Handler::new(|_| HandlerOutcome::Continue)
    }

    #[test]
    fn test_swap_replays_hooks() {
        let (_, hooks, manager) = setup();
        let first = Rc::new(Surface::card(Map::new()));
        first.on(EventKind::SingleClick, Subtype::All, noop());
        first.on(EventKind::AccelData, Subtype::All, noop());

        assert!(manager.set_active(Slot::Card, Some(Rc::clone(&first))));
        assert_eq!(hooks.added.get(), 2);
        assert!(!manager.set_active(Slot::Card, Some(Rc::clone(&first))));
        assert_eq!(hooks.added.get(), 2);

        // Handlers added while active are observed directly
        first.on(EventKind::LongClick, Subtype::All, noop());
        assert_eq!(hooks.added.get(), 3);

        let second = Rc::new(Surface::card(Map::new()));
        manager.set_active(Slot::Card, Some(second));
        assert_eq!(hooks.removed.get(), 3);
        assert!(!first.emitter().has_observer());

        // Inactive surfaces are not observed
        first.on(EventKind::LongClick, Subtype::All, noop());
        assert_eq!(hooks.added.get(), 3);
    }

    #[test]
    fn test_swap_forces_full_resend() {
        let (bridge, _, manager) = setup();
        manager
            .apply_properties(Slot::Card, None, props(json!({"title": "a", "body": "b"})), ClearScope::None)
            .unwrap();
        manager
            .apply_properties(Slot::Card, None, props(json!({"title": "c"})), ClearScope::None)
            .unwrap();

        let replacement = Rc::new(Surface::card(props(json!({"subtitle": "s"}))));
        manager
            .apply_properties(Slot::Card, Some(replacement), props(json!({"title": "x"})), ClearScope::None)
            .unwrap();

        let cards = bridge.cards.borrow();
        assert_eq!(cards[0].1, ClearScope::All);
        assert_eq!(cards[1], (json!({"title": "c"}), ClearScope::None));
        assert_eq!(cards[2], (json!({"subtitle": "s", "title": "x"}), ClearScope::All));
    }

    #[test]
    fn test_update_inactive_surface_sends_nothing() {
        let (bridge, _, manager) = setup();
        let inactive = Rc::new(Surface::card(Map::new()));
        manager.update_properties(&inactive, &props(json!({"title": "t"})));
        assert!(bridge.cards.borrow().is_empty());
        assert_eq!(inactive.prop("title"), Some(json!("t")));
    }

    #[test]
    fn test_action_merges_and_uses_action_scope() {
        let (bridge, _, manager) = setup();
        manager
            .apply_properties(Slot::Card, None, Map::new(), ClearScope::None)
            .unwrap();
        manager.set_action(None, json!({"up": "up.png"}));
        manager.set_action(None, json!({"down": "down.png"}));

        let cards = bridge.cards.borrow();
        assert_eq!(
            cards.last().unwrap(),
            &(json!({"action": {"up": "up.png", "down": "down.png"}}), ClearScope::Action)
        );
    }

    #[test]
    fn test_menu_sections_become_content() {
        let (bridge, _, manager) = setup();
        let menu = manager
            .apply_properties(
                Slot::Menu,
                None,
                props(json!({"sections": [{"items": [{"title": "a"}]}]})),
                ClearScope::None,
            )
            .unwrap();
        assert_eq!(bridge.menus.get(), 1);
        assert_eq!(menu.prop("sections"), Some(json!([{"items": 1}])));
    }

    #[test]
    fn test_slot_mismatch() {
        let (_, _, manager) = setup();
        let window = Rc::new(Surface::window(Map::new()));
        let result = manager.apply_properties(Slot::Card, Some(window), Map::new(), ClearScope::None);
        assert!(matches!(result, Err(RuntimeError::InvalidArgument(_))));
    }

    #[test]
    fn test_clear_drops_handlers() {
        let (_, hooks, manager) = setup();
        let card = Rc::new(Surface::card(Map::new()));
        card.on(EventKind::AccelData, Subtype::All, noop());
        manager.set_active(Slot::Card, Some(Rc::clone(&card)));

        manager.clear();
        assert!(manager.active(Slot::Card).is_none());
        assert!(card.emitter().is_empty());
        assert_eq!(hooks.removed.get(), 0);
    }
}
