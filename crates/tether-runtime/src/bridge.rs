use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::Display;

use crate::accel::AccelConfig;
use crate::error::RuntimeError;
use crate::image::DecodedImage;
use crate::surface::menu::{MenuItem, ResolvedSection};

/// How much of a surface the renderer must replace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ClearScope {
    /// Incremental patch
    #[default]
    None,
    /// Replace the action bar only
    Action,
    /// Full replace
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VibeKind {
    #[default]
    Short,
    Long,
    Double,
}

impl FromStr for VibeKind {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(VibeKind::Short),
            "long" => Ok(VibeKind::Long),
            "double" => Ok(VibeKind::Double),
            other => Err(RuntimeError::InvalidArgument(format!(
                "unknown vibe type: {}",
                other
            ))),
        }
    }
}

/// The native side that renders surfaces and drives the sensors.
///
/// Calls are fire-and-forget; the runtime never waits on the renderer.
pub trait RenderBridge {
    fn window(&self, props: &Map<String, Value>, clear: ClearScope);

    fn card(&self, props: &Map<String, Value>, clear: ClearScope);

    /// Full menu state, always a complete replace
    fn menu(&self, state: &Map<String, Value>);

    fn menu_section(&self, section: usize, content: &ResolvedSection);

    fn menu_item(&self, section: usize, item: usize, content: &MenuItem);

    /// Decoded image ready for use under `id`
    fn image(&self, id: u32, image: &DecodedImage);

    fn accel_config(&self, config: &AccelConfig);

    /// Request one accelerometer sample outside of a subscription
    fn accel_peek(&self);

    fn vibe(&self, kind: VibeKind);

    fn open_url(&self, url: &str);
}
