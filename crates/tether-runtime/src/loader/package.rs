use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};
use strum_macros::Display;

use super::path;
use crate::storage::keys;

/// Shared exports value. Every `require` of a package hands out the same `Rc`.
pub type Exports = Rc<RefCell<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PackageState {
    Unloaded,
    Fetching,
    /// Fetch failed, looking for a saved copy
    FetchFailed,
    /// Running from the saved copy
    CacheFallback,
    Executed,
    /// Ran, but compile or execution raised
    Errored,
    /// No source available
    Fatal,
}

/// One script loaded into a session
pub struct Package {
    name: String,
    source_path: String,
    persist_key: String,
    execution_name: String,
    exports: Exports,
    reassigned: Cell<bool>,
    state: Cell<PackageState>,
}

impl Package {
    pub fn new(name: impl Into<String>, source_path: impl Into<String>) -> Self {
        let name = name.into();
        let source_path = source_path.into();
        Self {
            persist_key: keys::script(&source_path),
            execution_name: path::execution_name(&name),
            name,
            source_path,
            exports: Rc::new(RefCell::new(Value::Object(Map::new()))),
            reassigned: Cell::new(false),
            state: Cell::new(PackageState::Unloaded),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn persist_key(&self) -> &str {
        &self.persist_key
    }

    pub fn execution_name(&self) -> &str {
        &self.execution_name
    }

    pub fn exports(&self) -> Exports {
        Rc::clone(&self.exports)
    }

    pub fn state(&self) -> PackageState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: PackageState) {
        self.state.set(state);
    }

    /// Whether the script replaced its exports wholesale
    pub fn was_reassigned(&self) -> bool {
        self.reassigned.get()
    }

    /// Set one field of the exports. Non-object exports are replaced by an object.
    pub fn set_export(&self, key: &str, value: Value) {
        let mut exports = self.exports.borrow_mut();
        if !exports.is_object() {
            *exports = Value::Object(Map::new());
        }
        if let Value::Object(fields) = &mut *exports {
            fields.insert(key.to_string(), value);
        }
    }

    /// `module.exports = value`
    pub fn reassign(&self, value: Value) {
        *self.exports.borrow_mut() = value;
        self.reassigned.set(true);
    }

    /// Adopt the script's return value as exports when it never assigned
    /// them itself and the value is truthy
    pub(crate) fn adopt_return(&self, value: Value) -> bool {
        if self.reassigned.get() || !is_truthy(&value) {
            return false;
        }
        *self.exports.borrow_mut() = value;
        true
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("source_path", &self.source_path)
            .field("state", &self.state.get())
            .finish()
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_derived_fields() {
        let package = Package::new("lib/util.js", "http://a.com/x/lib/util.js");
        assert_eq!(package.persist_key(), "script:http://a.com/x/lib/util.js");
        assert_eq!(package.execution_name(), "lib_util_js");
        assert_eq!(package.state(), PackageState::Unloaded);
        assert_eq!(*package.exports().borrow(), json!({}));
    }

    #[test]
    fn test_return_value_adopted_only_without_reassignment() {
        let package = Package::new("a.js", "http://a.com/a.js");
        assert!(!package.adopt_return(json!(0)));
        assert!(!package.adopt_return(json!("")));
        assert!(package.adopt_return(json!({"v": 1})));
        assert_eq!(*package.exports().borrow(), json!({"v": 1}));

        let package = Package::new("b.js", "http://a.com/b.js");
        package.reassign(json!([1, 2]));
        assert!(!package.adopt_return(json!("ignored")));
        assert_eq!(*package.exports().borrow(), json!([1, 2]));
    }

    #[test]
    fn test_exports_identity_survives_mutation() {
        let package = Package::new("a.js", "http://a.com/a.js");
        let before = package.exports();
        package.set_export("answer", json!(42));
        package.reassign(json!("replaced"));
        assert!(Rc::ptr_eq(&before, &package.exports()));
        assert_eq!(*before.borrow(), json!("replaced"));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(PackageState::CacheFallback.to_string(), "cache_fallback");
        assert_eq!(PackageState::FetchFailed.to_string(), "fetch_failed");
    }
}
