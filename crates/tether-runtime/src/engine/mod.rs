//! Script execution
//!
//! An engine compiles source text into a unit that runs once against a
//! binding table. The binding table is everything a script can reach:
//! its module, `require`, a console, the render bridge and a narrow runtime
//! API. Engines must not hand scripts anything else.

pub mod bindings;
pub mod directive;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RuntimeError;

pub use bindings::{Bindings, ModuleBinding, Require, RuntimeApi};
pub use directive::DirectiveEngine;

pub trait ScriptEngine {
    /// Compile `source`. `execution_name` identifies the unit in diagnostics.
    fn compile(
        &self,
        execution_name: &str,
        source: &str,
    ) -> Result<Box<dyn CompiledScript>, RuntimeError>;
}

#[async_trait(?Send)]
pub trait CompiledScript {
    /// Run once. The returned value may become the package exports.
    async fn invoke(&self, bindings: Bindings) -> Result<Option<Value>, RuntimeError>;
}
