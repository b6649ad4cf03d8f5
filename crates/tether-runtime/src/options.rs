use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::storage::{keys, store_quietly, KeyValueStore};

/// Per-script options, persisted under `options:<main script name>`.
///
/// Values are kept as their JSON text, the way they are persisted.
pub struct OptionStore {
    key: String,
    values: BTreeMap<String, String>,
    store: Rc<dyn KeyValueStore>,
}

impl OptionStore {
    /// Read the options saved for `main_basename`. Malformed data starts empty.
    pub fn load(store: Rc<dyn KeyValueStore>, main_basename: &str) -> Self {
        let key = keys::options(main_basename);
        let values = match store.get(&key) {
            None => BTreeMap::new(),
            Some(raw) => serde_json::from_str::<BTreeMap<String, String>>(&raw).unwrap_or_else(|e| {
                warn!(target: "storage", "Options under {} are malformed, resetting: {}", key, e);
                BTreeMap::new()
            }),
        };
        debug!(target: "storage", "Loaded {} option(s) from {}", values.len(), key);

        Self { key, values, store }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stored value, read back as a number, then as JSON, then as raw text
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|raw| decode(raw))
    }

    /// Set or, with `None`, delete an option; saves either way
    pub fn set(&mut self, key: &str, value: Option<Value>) {
        match value {
            Some(value) => {
                self.values.insert(key.to_string(), value.to_string());
            }
            None => {
                self.values.remove(key);
            }
        }
        self.save();
    }

    /// Every option, decoded
    pub fn to_map(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(key, raw)| (key.clone(), decode(raw)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn save(&self) {
        match serde_json::to_string(&self.values) {
            Ok(serialized) => store_quietly(self.store.as_ref(), &self.key, &serialized),
            Err(e) => warn!(target: "storage", "Failed to serialize options: {}", e),
        }
    }
}

fn decode(raw: &str) -> Value {
    if let Ok(n) = raw.trim().parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = raw.trim().parse::<f64>() {
        if n.is_finite() {
            return Value::from(n);
        }
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
