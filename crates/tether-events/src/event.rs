use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use strum_macros::Display;

use crate::error::EventError;
use crate::kind::EventKind;

/// Subtype filter a handler is registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Subtype {
    /// Wildcard: matches every emission of the type
    #[default]
    All,
    /// Matches only emissions carrying exactly this subtype
    Named(String),
}

impl Subtype {
    pub fn named(name: impl Into<String>) -> Self {
        Subtype::Named(name.into())
    }

    /// Normalize an optional script-supplied subtype; omitted or `"all"` is the wildcard
    pub fn parse(name: Option<&str>) -> Self {
        match name {
            None | Some("all") | Some("") => Subtype::All,
            Some(name) => Subtype::Named(name.to_string()),
        }
    }

    /// Whether a handler under this filter receives an emission with `emitted` subtype
    pub fn matches(&self, emitted: Option<&str>) -> bool {
        match self {
            Subtype::All => true,
            Subtype::Named(name) => emitted == Some(name.as_str()),
        }
    }
}

impl fmt::Display for Subtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subtype::All => write!(f, "all"),
            Subtype::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Hardware button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Back,
    Up,
    Select,
    Down,
}

impl FromStr for Button {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "back" => Ok(Button::Back),
            "up" => Ok(Button::Up),
            "select" => Ok(Button::Select),
            "down" => Ok(Button::Down),
            other => Err(EventError::InvalidButton(other.to_string())),
        }
    }
}

/// Accelerometer axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl FromStr for Axis {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(EventError::InvalidAxis(other.to_string())),
        }
    }
}

/// One accelerometer sample. Gravity reads around -1000 on z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AccelPoint {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// Whether the device was vibrating while sampling
    pub vibe: bool,
    /// Sample time in milliseconds
    pub time: u64,
}

/// Typed payload carried by an event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventData {
    Click {
        button: Button,
    },
    AccelTap {
        axis: Axis,
        direction: i8,
    },
    AccelData {
        samples: usize,
        accels: Vec<AccelPoint>,
    },
    MenuSection {
        section: usize,
    },
    MenuItem {
        section: usize,
        item: usize,
    },
    Settings {
        url: Option<String>,
        options: serde_json::Value,
    },
    Empty {},
}

/// An event as seen by handlers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Type under which the event was first emitted
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub subtype: Option<String>,
    #[serde(flatten)]
    pub data: EventData,
    /// Id of the surface that received the event first, if any
    pub surface: Option<u64>,
}

impl Event {
    pub fn new(kind: EventKind, subtype: Option<String>, data: EventData) -> Self {
        Self {
            kind,
            subtype,
            data,
            surface: None,
        }
    }

    /// Button event; the button is also the subtype
    pub fn click(kind: EventKind, button: Button) -> Self {
        Self::new(kind, Some(button.to_string()), EventData::Click { button })
    }

    /// Accelerometer tap; the axis is also the subtype
    pub fn accel_tap(axis: Axis, direction: i8) -> Self {
        Self::new(
            EventKind::AccelTap,
            Some(axis.to_string()),
            EventData::AccelTap { axis, direction },
        )
    }

    pub fn accel_data(accels: Vec<AccelPoint>) -> Self {
        Self::new(
            EventKind::AccelData,
            None,
            EventData::AccelData {
                samples: accels.len(),
                accels,
            },
        )
    }

    pub fn menu_section(section: usize) -> Self {
        Self::new(EventKind::Section, None, EventData::MenuSection { section })
    }

    pub fn menu_item(kind: EventKind, section: usize, item: usize) -> Self {
        Self::new(kind, None, EventData::MenuItem { section, item })
    }

    pub fn settings(kind: EventKind, url: Option<String>, options: serde_json::Value) -> Self {
        Self::new(kind, None, EventData::Settings { url, options })
    }

    pub fn with_surface(mut self, surface: u64) -> Self {
        self.surface = Some(surface);
        self
    }

    /// First sample of an accelerometer batch
    pub fn accel(&self) -> Option<&AccelPoint> {
        match &self.data {
            EventData::AccelData { accels, .. } => accels.first(),
            _ => None,
        }
    }

    /// Copy of this event under the name it carries on the global bus
    pub fn retyped(&self, kind: EventKind) -> Self {
        let mut event = self.clone();
        event.kind = kind;
        event
    }
}
