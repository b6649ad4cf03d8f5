//! Simulated device events for `tether run --emit`

use std::fmt;
use std::str::FromStr;

use tether_events::{AccelPoint, Axis, Button, EmitOutcome, EventKind};
use tether_runtime::Session;

#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedEvent {
    /// `click:<button>` / `longclick:<button>`
    Click { kind: EventKind, button: Button },
    /// `tap:<axis>:<direction>`
    Tap { axis: Axis, direction: i8 },
    /// `accel:<x>,<y>,<z>`
    Accel(AccelPoint),
    /// `select:<section>:<item>` / `longselect:<section>:<item>`
    Select { long: bool, section: usize, item: usize },
}

impl SimulatedEvent {
    pub fn apply(&self, session: &Session) -> EmitOutcome {
        match self {
            SimulatedEvent::Click { kind, button } => session.emit_click(*kind, *button),
            SimulatedEvent::Tap { axis, direction } => session.emit_accel_tap(*axis, *direction),
            SimulatedEvent::Accel(point) => session.emit_accel_data(vec![*point]),
            SimulatedEvent::Select { long, section, item } => {
                session.emit_menu_select(*long, *section, *item)
            }
        }
    }
}

fn number<T: FromStr>(raw: &str, what: &str) -> Result<T, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("invalid {}: {}", what, raw))
}

fn section_item(rest: &str) -> Result<(usize, usize), String> {
    let (section, item) = rest
        .split_once(':')
        .ok_or_else(|| format!("expected <section>:<item>, got {}", rest))?;
    Ok((number(section, "section")?, number(item, "item")?))
}

impl FromStr for SimulatedEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <event>:<args>, got {}", s))?;

        match name {
            "click" | "longclick" => Ok(SimulatedEvent::Click {
                kind: if name == "click" {
                    EventKind::SingleClick
                } else {
                    EventKind::LongClick
                },
                button: rest.parse().map_err(|e| format!("{}", e))?,
            }),
            "tap" => {
                let (axis, direction) = rest.split_once(':').unwrap_or((rest, "1"));
                let direction: i8 = number(direction, "direction")?;
                if direction != 1 && direction != -1 {
                    return Err(format!("tap direction must be 1 or -1, got {}", direction));
                }
                Ok(SimulatedEvent::Tap {
                    axis: axis.parse().map_err(|e| format!("{}", e))?,
                    direction,
                })
            }
            "accel" => {
                let parts: Vec<&str> = rest.split(',').collect();
                let [x, y, z] = parts.as_slice() else {
                    return Err(format!("expected accel:<x>,<y>,<z>, got {}", s));
                };
                Ok(SimulatedEvent::Accel(AccelPoint {
                    x: number(x, "x")?,
                    y: number(y, "y")?,
                    z: number(z, "z")?,
                    ..Default::default()
                }))
            }
            "select" | "longselect" => {
                let (section, item) = section_item(rest)?;
                Ok(SimulatedEvent::Select {
                    long: name == "longselect",
                    section,
                    item,
                })
            }
            other => Err(format!("unknown event: {}", other)),
        }
    }
}

impl fmt::Display for SimulatedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulatedEvent::Click { kind, button } => write!(f, "{} {}", kind, button),
            SimulatedEvent::Tap { axis, direction } => write!(f, "accelTap {} {}", axis, direction),
            SimulatedEvent::Accel(point) => {
                write!(f, "accelData ({}, {}, {})", point.x, point.y, point.z)
            }
            SimulatedEvent::Select { long, section, item } => write!(
                f,
                "{} {}:{}",
                if *long { "longSelect" } else { "select" },
                section,
                item
            ),
        }
    }
}
