use serde_json::Value;
use tracing::info;

/// Width of the status line the console overwrites
const STATUS_WIDTH: usize = 45;

/// `console` binding handed to one package
#[derive(Debug, Clone)]
pub struct Console {
    package: String,
}

impl Console {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// `<package>: <args...>`; strings are printed raw, anything else as JSON
    pub fn message(&self, args: &[Value]) -> String {
        let parts: Vec<String> = args
            .iter()
            .map(|arg| match arg {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        format!("{}: {}", self.package, parts.join(" "))
    }

    /// Erase the previous status line and write `message` padded to its width
    pub fn status_line(message: &str) -> String {
        let erase = "\u{8}".repeat(STATUS_WIDTH);
        format!("{}{:<width$}", erase, message, width = STATUS_WIDTH)
    }

    pub fn log(&self, args: &[Value]) {
        let message = self.message(args);
        info!(target: "console", "{}", Self::status_line(&message));
    }

    pub fn log_str(&self, text: &str) {
        self.log(&[Value::String(text.to_string())]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_is_prefixed() {
        let console = Console::new("lib/util.js");
        assert_eq!(
            console.message(&[json!("count"), json!(3), json!({"a": true})]),
            r#"lib/util.js: count 3 {"a":true}"#
        );
    }

    #[test]
    fn test_status_line_erases_and_pads() {
        let line = Console::status_line("app.js: hi");
        assert!(line.starts_with(&"\u{8}".repeat(45)));
        assert_eq!(line.chars().count(), 90);
        assert!(line.ends_with(&format!("app.js: hi{}", " ".repeat(35))));
    }

    #[test]
    fn test_long_messages_are_not_truncated() {
        let message = "x".repeat(60);
        assert!(Console::status_line(&message).ends_with(&message));
    }
}
