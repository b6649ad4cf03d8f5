//! Accelerometer subscription policy
//!
//! In `auto` mode the subscription follows the number of `accelData`
//! listeners. An explicit, non-automatic change of `subscribed` switches the
//! controller to `manual`, and from then on listener changes leave the
//! subscription alone until an automatic change switches it back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::Display;
use tracing::debug;

use crate::error::RuntimeError;

pub const DEFAULT_RATE: u32 = 100;
pub const DEFAULT_SAMPLES: u32 = 25;

/// Rates the sensor supports, in Hz
pub const VALID_RATES: [u32; 4] = [10, 25, 50, 100];
pub const MAX_SAMPLES: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscribeMode {
    #[default]
    Auto,
    Manual,
}

/// Sensor configuration mirrored to the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccelConfig {
    pub rate: u32,
    pub sample_batch_size: u32,
    pub subscribed: bool,
    pub subscribe_mode: SubscribeMode,
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            sample_batch_size: DEFAULT_SAMPLES,
            subscribed: false,
            subscribe_mode: SubscribeMode::Auto,
        }
    }
}

/// Script-supplied configuration change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccelInput {
    /// Shorthand for a change of `subscribed` alone
    Subscribe(bool),
    /// Partial change; absent fields keep their value
    Config {
        rate: Option<u32>,
        samples: Option<u32>,
        subscribed: Option<bool>,
    },
}

impl AccelInput {
    /// Accepts a boolean or an object with `rate`, `samples` and
    /// `subscribe`/`subscribed`
    pub fn from_json(value: &Value) -> Result<Self, RuntimeError> {
        match value {
            Value::Bool(subscribed) => Ok(AccelInput::Subscribe(*subscribed)),
            Value::Object(fields) => {
                let number = |key: &str| -> Result<Option<u32>, RuntimeError> {
                    match fields.get(key) {
                        None | Some(Value::Null) => Ok(None),
                        Some(v) => v
                            .as_u64()
                            .and_then(|n| u32::try_from(n).ok())
                            .map(Some)
                            .ok_or_else(|| {
                                RuntimeError::InvalidArgument(format!(
                                    "accel {} must be a positive integer, got {}",
                                    key, v
                                ))
                            }),
                    }
                };
                let subscribed = fields
                    .get("subscribed")
                    .or_else(|| fields.get("subscribe"))
                    .and_then(Value::as_bool);

                Ok(AccelInput::Config {
                    rate: number("rate")?,
                    samples: number("samples")?,
                    subscribed,
                })
            }
            other => Err(RuntimeError::InvalidArgument(format!(
                "accel config must be a boolean or an object, got {}",
                other
            ))),
        }
    }

    fn subscribed(&self) -> Option<bool> {
        match self {
            AccelInput::Subscribe(subscribed) => Some(*subscribed),
            AccelInput::Config { subscribed, .. } => *subscribed,
        }
    }
}

#[derive(Debug, Default)]
pub struct AccelController {
    config: AccelConfig,
}

impl AccelController {
    pub fn new(rate: u32, samples: u32) -> Self {
        Self {
            config: AccelConfig {
                rate,
                sample_batch_size: samples,
                ..Default::default()
            },
        }
    }

    pub fn config(&self) -> &AccelConfig {
        &self.config
    }

    pub fn is_subscribed(&self) -> bool {
        self.config.subscribed
    }

    pub fn mode(&self) -> SubscribeMode {
        self.config.subscribe_mode
    }

    /// Apply `input` and return the configuration to send to the bridge.
    ///
    /// Invalid values leave the configuration untouched.
    pub fn set_config(
        &mut self,
        input: AccelInput,
        automatic: bool,
    ) -> Result<AccelConfig, RuntimeError> {
        if let AccelInput::Config { rate, samples, .. } = &input {
            if let Some(rate) = rate {
                if !VALID_RATES.contains(rate) {
                    return Err(RuntimeError::InvalidArgument(format!(
                        "accel rate must be one of {:?}, got {}",
                        VALID_RATES, rate
                    )));
                }
            }
            if let Some(samples) = samples {
                if *samples == 0 || *samples > MAX_SAMPLES {
                    return Err(RuntimeError::InvalidArgument(format!(
                        "accel samples must be between 1 and {}, got {}",
                        MAX_SAMPLES, samples
                    )));
                }
            }
        }

        if let Some(subscribed) = input.subscribed() {
            self.config.subscribed = subscribed;
            self.config.subscribe_mode = if automatic {
                SubscribeMode::Auto
            } else {
                SubscribeMode::Manual
            };
        }

        if let AccelInput::Config { rate, samples, .. } = input {
            if let Some(rate) = rate {
                self.config.rate = rate;
            }
            if let Some(samples) = samples {
                self.config.sample_batch_size = samples;
            }
        }

        debug!(
            target: "accel",
            "Config: rate {} samples {} subscribed {} ({})",
            self.config.rate,
            self.config.sample_batch_size,
            self.config.subscribed,
            self.config.subscribe_mode
        );

        Ok(self.config.clone())
    }

    /// Bring `subscribed` in line with the current `accelData` listener count.
    ///
    /// Returns the new configuration when the subscription changed.
    pub fn reconcile(&mut self, listeners: usize) -> Option<AccelConfig> {
        if self.config.subscribe_mode != SubscribeMode::Auto {
            return None;
        }

        let desired = listeners > 0;
        if desired == self.config.subscribed {
            return None;
        }

        debug!(target: "accel", "Auto {} ({} listener(s))", if desired { "subscribe" } else { "unsubscribe" }, listeners);
        self.set_config(AccelInput::Subscribe(desired), true).ok()
    }

    /// Drop the subscription whatever the mode, for a session that is ending.
    ///
    /// Returns the configuration to send when the sensor was subscribed.
    pub fn release(&mut self) -> Option<AccelConfig> {
        if !self.config.subscribed {
            return None;
        }
        debug!(target: "accel", "Releasing subscription ({})", self.config.subscribe_mode);
        self.set_config(AccelInput::Subscribe(false), true).ok()
    }

    /// Peeking and subscribing are mutually exclusive sensor modes
    pub fn check_peek(&self) -> Result<(), RuntimeError> {
        if self.config.subscribed {
            return Err(RuntimeError::IllegalState(
                "cannot peek at the accelerometer while subscribed to accelData".to_string(),
            ));
        }
        Ok(())
    }
}
