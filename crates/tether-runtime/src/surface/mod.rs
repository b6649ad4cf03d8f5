//! Declarative UI surfaces
//!
//! A surface is a window, a card or a menu. Each owns a property map that is
//! mirrored to the renderer and a private event bus. Which surfaces are
//! active is tracked by the `SurfaceManager`.

pub mod manager;
pub mod menu;

use std::cell::{Cell, RefCell};
use std::fmt;

use serde_json::{Map, Value};
use strum_macros::Display;
use tether_events::{EventBus, EventKind, Handler, Subtype};

pub use manager::SurfaceManager;
pub use menu::{Items, MenuContent, MenuItem, MenuSection, ResolvedSection, Sections};

thread_local! {
    /// Surfaces never leave the thread that built them
    static NEXT_SURFACE_ID: Cell<u64> = const { Cell::new(1) };
}

fn next_surface_id() -> u64 {
    NEXT_SURFACE_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    })
}

/// Active-surface slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Slot {
    Window,
    Card,
    Menu,
}

/// Variant-specific data
#[derive(Debug)]
pub enum SurfaceBody {
    Window,
    Card,
    Menu(MenuBody),
}

#[derive(Debug, Default)]
pub struct MenuBody {
    pub content: MenuContent,
    /// Content as of the last resolve
    pub resolved: Vec<ResolvedSection>,
}

pub struct Surface {
    id: u64,
    body: RefCell<SurfaceBody>,
    state: RefCell<Map<String, Value>>,
    emitter: EventBus,
}

impl Surface {
    fn new(body: SurfaceBody, props: Map<String, Value>) -> Self {
        let id = next_surface_id();
        let slot = match body {
            SurfaceBody::Window => Slot::Window,
            SurfaceBody::Card => Slot::Card,
            SurfaceBody::Menu(_) => Slot::Menu,
        };
        Self {
            id,
            body: RefCell::new(body),
            state: RefCell::new(props),
            emitter: EventBus::new(format!("{}#{}", slot, id)),
        }
    }

    pub fn window(props: Map<String, Value>) -> Self {
        Self::new(SurfaceBody::Window, props)
    }

    pub fn card(props: Map<String, Value>) -> Self {
        Self::new(SurfaceBody::Card, props)
    }

    pub fn menu(content: MenuContent, props: Map<String, Value>) -> Self {
        Self::new(
            SurfaceBody::Menu(MenuBody {
                content,
                resolved: Vec::new(),
            }),
            props,
        )
    }

    /// Build a surface for `slot` from script properties. A menu takes its
    /// content from the `sections` property.
    pub fn from_props(
        slot: Slot,
        mut props: Map<String, Value>,
    ) -> Result<Self, crate::error::RuntimeError> {
        Ok(match slot {
            Slot::Window => Self::window(props),
            Slot::Card => Self::card(props),
            Slot::Menu => {
                let content = match props.remove("sections") {
                    Some(sections) => MenuContent::from_json(&sections)?,
                    None => MenuContent::default(),
                };
                Self::menu(content, props)
            }
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn slot(&self) -> Slot {
        match &*self.body.borrow() {
            SurfaceBody::Window => Slot::Window,
            SurfaceBody::Card => Slot::Card,
            SurfaceBody::Menu(_) => Slot::Menu,
        }
    }

    pub fn emitter(&self) -> &EventBus {
        &self.emitter
    }

    /// Register a handler on this surface's private bus
    pub fn on(&self, kind: EventKind, subtype: Subtype, handler: Handler) {
        self.emitter.on(kind, subtype, handler);
    }

    pub fn state(&self) -> Map<String, Value> {
        self.state.borrow().clone()
    }

    pub fn prop(&self, key: &str) -> Option<Value> {
        self.state.borrow().get(key).cloned()
    }

    /// Shallow merge of `props` into the state
    pub fn merge(&self, props: &Map<String, Value>) {
        let mut state = self.state.borrow_mut();
        for (key, value) in props {
            state.insert(key.clone(), value.clone());
        }
    }

    /// Replace the menu content. No-op on other variants.
    pub fn set_menu_content(&self, content: MenuContent) {
        if let SurfaceBody::Menu(menu) = &mut *self.body.borrow_mut() {
            menu.content = content;
            menu.resolved.clear();
        }
    }

    /// Materialize lazy menu content and record the section summary in the
    /// state. Returns `None` for windows and cards.
    pub fn resolve_menu(&self) -> Option<Vec<ResolvedSection>> {
        // Producers may call back into the surface, so resolve outside the borrow
        let content = match &*self.body.borrow() {
            SurfaceBody::Menu(menu) => menu.content.clone(),
            _ => return None,
        };
        let resolved = content.resolve();

        if let SurfaceBody::Menu(menu) = &mut *self.body.borrow_mut() {
            menu.resolved = resolved.clone();
        }

        let summary: Vec<Value> = resolved.iter().map(ResolvedSection::summary).collect();
        self.state
            .borrow_mut()
            .insert("sections".to_string(), Value::Array(summary));
        Some(resolved)
    }

    pub fn menu_section(&self, section: usize) -> Option<ResolvedSection> {
        match &*self.body.borrow() {
            SurfaceBody::Menu(menu) => menu.resolved.get(section).cloned(),
            _ => None,
        }
    }

    pub fn menu_item(&self, section: usize, item: usize) -> Option<MenuItem> {
        match &*self.body.borrow() {
            SurfaceBody::Menu(menu) => menu
                .resolved
                .get(section)
                .and_then(|s| s.items.get(item))
                .cloned(),
            _ => None,
        }
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("slot", &self.slot())
            .field("state", &self.state.borrow())
            .field("listeners", &self.emitter.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Surface::card(Map::new());
        let b = Surface::card(Map::new());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.slot(), Slot::Card);
        assert_eq!(a.emitter().label(), format!("card#{}", a.id()));
    }

    #[test]
    fn test_merge_is_shallow() {
        let card = Surface::card(props(json!({"title": "a", "body": "b"})));
        card.merge(&props(json!({"title": "c", "style": {"x": 1}})));
        assert_eq!(
            Value::Object(card.state()),
            json!({"title": "c", "body": "b", "style": {"x": 1}})
        );
    }

    #[test]
    fn test_menu_from_props_and_resolve() {
        let menu = Surface::from_props(
            Slot::Menu,
            props(json!({
                "fullscreen": true,
                "sections": [{"title": "One", "items": [{"title": "a"}, {"title": "b"}]}]
            })),
        )
        .unwrap();
        assert_eq!(menu.slot(), Slot::Menu);
        assert!(menu.menu_section(0).is_none());

        let resolved = menu.resolve_menu().unwrap();
        assert_eq!(resolved[0].items.len(), 2);
        assert_eq!(menu.prop("sections"), Some(json!([{"title": "One", "items": 2}])));
        assert_eq!(menu.prop("fullscreen"), Some(json!(true)));
        assert_eq!(
            menu.menu_item(0, 1).and_then(|i| i.title),
            Some("b".to_string())
        );
    }

    #[test]
    fn test_resolve_on_card_is_none() {
        let card = Surface::card(Map::new());
        assert!(card.resolve_menu().is_none());
        assert!(card.prop("sections").is_none());
    }
}
