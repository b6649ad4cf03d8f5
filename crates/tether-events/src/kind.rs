use std::str::FromStr;

use serde::Serialize;
use strum_macros::Display;

use crate::error::EventError;

/// Every event type a handler can be registered for.
///
/// The string form (`Display` / `FromStr`) is the name scripts use. Parsing is
/// the allow-list check: a name outside this set is an `InvalidEventType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    // Hardware input
    /// Tap detected by the accelerometer
    AccelTap,
    /// Batch of accelerometer samples
    AccelData,

    // Buttons
    /// Short button press
    SingleClick,
    /// Long button press
    LongClick,

    // Menu-local
    /// Renderer asks for the content of a section
    Section,
    /// Renderer asks for the content of an item
    Item,
    /// Item selected, delivered on the menu's own bus
    Select,
    /// Item long-selected, delivered on the menu's own bus
    LongSelect,

    // Menu, global
    /// Item selected, global name
    MenuSelect,
    /// Item long-selected, global name
    MenuLongSelect,

    // Settings web view
    /// Settings page was opened
    SettingsOpen,
    /// Settings page was closed
    SettingsClose,
}

/// Where an event type originates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    Hardware,
    Ui,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::AccelTap,
        EventKind::AccelData,
        EventKind::SingleClick,
        EventKind::LongClick,
        EventKind::Section,
        EventKind::Item,
        EventKind::Select,
        EventKind::LongSelect,
        EventKind::MenuSelect,
        EventKind::MenuLongSelect,
        EventKind::SettingsOpen,
        EventKind::SettingsClose,
    ];

    pub fn origin(&self) -> EventOrigin {
        match self {
            EventKind::AccelTap | EventKind::AccelData => EventOrigin::Hardware,
            _ => EventOrigin::Ui,
        }
    }

    pub fn is_hardware(&self) -> bool {
        self.origin() == EventOrigin::Hardware
    }

    /// Name under which a surface-local event is re-emitted on the global bus.
    ///
    /// `None` means the event never leaves the surface.
    pub fn global_kind(&self) -> Option<EventKind> {
        match self {
            EventKind::AccelTap => Some(EventKind::AccelTap),
            EventKind::AccelData => Some(EventKind::AccelData),
            EventKind::SingleClick => Some(EventKind::SingleClick),
            EventKind::LongClick => Some(EventKind::LongClick),
            EventKind::Select | EventKind::MenuSelect => Some(EventKind::MenuSelect),
            EventKind::LongSelect | EventKind::MenuLongSelect => Some(EventKind::MenuLongSelect),
            EventKind::Section | EventKind::Item => None,
            EventKind::SettingsOpen => Some(EventKind::SettingsOpen),
            EventKind::SettingsClose => Some(EventKind::SettingsClose),
        }
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.to_string() == s)
            .ok_or_else(|| EventError::InvalidEventType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for kind in EventKind::ALL {
            assert_eq!(kind.to_string().parse::<EventKind>(), Ok(kind));
        }
        assert_eq!(EventKind::AccelData.to_string(), "accelData");
        assert_eq!(EventKind::MenuLongSelect.to_string(), "menuLongSelect");
    }

    #[test]
    fn test_unknown_name_is_rejected() {
        assert_eq!(
            "shake".parse::<EventKind>(),
            Err(EventError::InvalidEventType("shake".to_string()))
        );
        // Names are case sensitive
        assert!("AccelData".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_global_names() {
        assert_eq!(EventKind::Select.global_kind(), Some(EventKind::MenuSelect));
        assert_eq!(EventKind::Section.global_kind(), None);
        assert_eq!(EventKind::SingleClick.global_kind(), Some(EventKind::SingleClick));
        assert!(EventKind::AccelTap.is_hardware());
        assert!(!EventKind::LongClick.is_hardware());
    }
}
