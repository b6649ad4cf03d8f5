//! Line-oriented script engine
//!
//! One directive per line; blank lines and `#` comments are skipped.
//!
//! ```text
//! require <path> [as <alias>]
//! export <key> = <expr>
//! exports = <expr>
//! log <text | $alias[.field]>
//! on <type>[:<subtype>] [=> <action>]          global bus
//! card.on | window.on | menu.on ...           active surface's bus
//! off <type>[:<subtype>]
//! card | window | menu <json> [!]             update the active surface, `!` resends all
//! show card | window | menu <json>            new active surface
//! action <json>
//! image <url#hints | json> [!]                `!` forces a reload
//! accel <bool | json> | accel peek
//! option <key> [= <json>]                     no value deletes
//! vibe short | long | double
//! settings <url>
//! return <expr>
//! throw <message>
//! ```
//!
//! An `<expr>` is JSON or `$alias[.field]`, where the alias names the
//! exports of an earlier `require`. A handler `<action>` is `cancel`,
//! `log <text>`, `card <json>`, `vibe <kind>` or a JSON value to return.
//! Without an action the handler logs the event.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tether_events::{Event, Handler, HandlerOutcome};

use super::{Bindings, CompiledScript, ScriptEngine};
use crate::accel::AccelInput;
use crate::bridge::{ClearScope, VibeKind};
use crate::error::RuntimeError;
use crate::image::{ImageReady, ImageSpec};
use crate::loader::{Console, Exports};
use crate::settings::{SettingsEvent, SettingsListener};
use crate::surface::Slot;

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectiveEngine;

impl DirectiveEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ScriptEngine for DirectiveEngine {
    fn compile(
        &self,
        execution_name: &str,
        source: &str,
    ) -> Result<Box<dyn CompiledScript>, RuntimeError> {
        let directives = source
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }
                Some(
                    parse_directive(line)
                        .map(|directive| (index + 1, directive))
                        .map_err(|message| {
                            RuntimeError::script(execution_name, format!("line {}: {}", index + 1, message))
                        }),
                )
            })
            .collect::<Result<Vec<_>, RuntimeError>>()?;

        Ok(Box::new(DirectiveScript {
            name: execution_name.to_string(),
            directives,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Json(Value),
    Alias { name: String, field: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
enum LogArg {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum HandlerAction {
    Cancel,
    Log(String),
    Card(Map<String, Value>),
    Vibe(VibeKind),
    Return(Value),
}

#[derive(Debug, Clone, PartialEq)]
enum Directive {
    Require { path: String, alias: Option<String> },
    Export { key: String, value: Expr },
    Exports(Expr),
    Log(LogArg),
    On {
        slot: Option<Slot>,
        kind: String,
        subtype: Option<String>,
        action: Option<HandlerAction>,
    },
    Off {
        slot: Option<Slot>,
        kind: String,
        subtype: Option<String>,
    },
    Apply { slot: Slot, props: Map<String, Value>, clear: bool },
    Show { slot: Slot, props: Map<String, Value> },
    Action(Value),
    Image { spec: ImageSpec, force_reset: bool },
    Accel(AccelInput),
    Peek,
    Option { key: String, value: Option<Value> },
    Vibe(VibeKind),
    Settings(String),
    Return(Expr),
    Throw(String),
}

fn split_word(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    }
}

/// Strip a trailing ` !` flag
fn split_bang(rest: &str) -> (&str, bool) {
    match rest.strip_suffix('!') {
        Some(body) if body.is_empty() || body.ends_with(char::is_whitespace) => (body.trim_end(), true),
        _ => (rest, false),
    }
}

fn parse_json(text: &str) -> Result<Value, String> {
    serde_json::from_str(text).map_err(|e| format!("invalid JSON `{}`: {}", text, e))
}

fn parse_object(text: &str) -> Result<Map<String, Value>, String> {
    match parse_json(text)? {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected an object, got {}", other)),
    }
}

fn parse_expr(text: &str) -> Result<Expr, String> {
    match text.strip_prefix('$') {
        Some(reference) => {
            let (name, field) = match reference.split_once('.') {
                Some((name, field)) => (name, Some(field.to_string())),
                None => (reference, None),
            };
            if name.is_empty() {
                return Err("empty alias".to_string());
            }
            Ok(Expr::Alias {
                name: name.to_string(),
                field,
            })
        }
        None => parse_json(text).map(Expr::Json),
    }
}

fn parse_slot(word: &str) -> Result<Slot, String> {
    match word {
        "window" => Ok(Slot::Window),
        "card" => Ok(Slot::Card),
        "menu" => Ok(Slot::Menu),
        other => Err(format!("unknown surface `{}`", other)),
    }
}

fn parse_vibe(word: &str) -> Result<VibeKind, String> {
    word.parse::<VibeKind>().map_err(|e| e.to_string())
}

/// `<type>[:<subtype>]`
fn parse_event(text: &str) -> Result<(String, Option<String>), String> {
    if text.is_empty() {
        return Err("missing event type".to_string());
    }
    Ok(match text.split_once(':') {
        Some((kind, subtype)) => (kind.to_string(), Some(subtype.to_string())),
        None => (text.to_string(), None),
    })
}

fn parse_action(text: &str) -> Result<HandlerAction, String> {
    let (word, rest) = split_word(text);
    match word {
        "cancel" => Ok(HandlerAction::Cancel),
        "log" => Ok(HandlerAction::Log(rest.to_string())),
        "card" => parse_object(rest).map(HandlerAction::Card),
        "vibe" => parse_vibe(rest).map(HandlerAction::Vibe),
        _ => parse_json(text).map(HandlerAction::Return),
    }
}

fn parse_on(slot: Option<Slot>, rest: &str) -> Result<Directive, String> {
    let (event, action) = match rest.split_once("=>") {
        Some((event, action)) => (event.trim(), Some(parse_action(action.trim())?)),
        None => (rest, None),
    };
    let (kind, subtype) = parse_event(event)?;
    Ok(Directive::On {
        slot,
        kind,
        subtype,
        action,
    })
}

fn parse_directive(line: &str) -> Result<Directive, String> {
    let (word, rest) = split_word(line);

    if let Some((scope, verb)) = word.split_once('.') {
        let slot = Some(parse_slot(scope)?);
        return match verb {
            "on" => parse_on(slot, rest),
            "off" => {
                let (kind, subtype) = parse_event(rest)?;
                Ok(Directive::Off { slot, kind, subtype })
            }
            other => Err(format!("unknown surface directive `{}`", other)),
        };
    }

    match word {
        "require" => {
            let (path, alias) = match rest.split_once(" as ") {
                Some((path, alias)) => (path.trim(), Some(alias.trim().to_string())),
                None => (rest, None),
            };
            if path.is_empty() {
                return Err("require needs a path".to_string());
            }
            Ok(Directive::Require {
                path: path.to_string(),
                alias,
            })
        }
        "export" => {
            let (key, value) = rest
                .split_once('=')
                .ok_or_else(|| "expected `export <key> = <expr>`".to_string())?;
            Ok(Directive::Export {
                key: key.trim().to_string(),
                value: parse_expr(value.trim())?,
            })
        }
        "exports" => {
            let value = rest
                .strip_prefix('=')
                .ok_or_else(|| "expected `exports = <expr>`".to_string())?;
            parse_expr(value.trim()).map(Directive::Exports)
        }
        "log" => Ok(Directive::Log(match rest.starts_with('$') {
            true => LogArg::Expr(parse_expr(rest)?),
            false => LogArg::Text(rest.to_string()),
        })),
        "on" => parse_on(None, rest),
        "off" => {
            let (kind, subtype) = parse_event(rest)?;
            Ok(Directive::Off {
                slot: None,
                kind,
                subtype,
            })
        }
        "window" | "card" | "menu" => {
            let (body, clear) = split_bang(rest);
            Ok(Directive::Apply {
                slot: parse_slot(word)?,
                props: parse_object(body)?,
                clear,
            })
        }
        "show" => {
            let (surface, body) = split_word(rest);
            let props = if body.is_empty() {
                Map::new()
            } else {
                parse_object(body)?
            };
            Ok(Directive::Show {
                slot: parse_slot(surface)?,
                props,
            })
        }
        "action" => parse_json(rest).map(Directive::Action),
        "image" => {
            let (body, force_reset) = split_bang(rest);
            let spec = if body.starts_with('{') {
                ImageSpec::from_json(&parse_json(body)?).map_err(|e| e.to_string())?
            } else if body.is_empty() {
                return Err("image needs a url".to_string());
            } else {
                ImageSpec::Encoded(body.to_string())
            };
            Ok(Directive::Image { spec, force_reset })
        }
        "accel" if rest == "peek" => Ok(Directive::Peek),
        "accel" => AccelInput::from_json(&parse_json(rest)?)
            .map(Directive::Accel)
            .map_err(|e| e.to_string()),
        "option" => match rest.split_once('=') {
            Some((key, value)) => Ok(Directive::Option {
                key: key.trim().to_string(),
                value: Some(parse_json(value.trim())?),
            }),
            None if !rest.is_empty() => Ok(Directive::Option {
                key: rest.to_string(),
                value: None,
            }),
            None => Err("option needs a key".to_string()),
        },
        "vibe" => parse_vibe(if rest.is_empty() { "short" } else { rest }).map(Directive::Vibe),
        "settings" if !rest.is_empty() => Ok(Directive::Settings(rest.to_string())),
        "return" => parse_expr(rest).map(Directive::Return),
        "throw" => Ok(Directive::Throw(rest.to_string())),
        other => Err(format!("unknown directive `{}`", other)),
    }
}

struct DirectiveScript {
    name: String,
    directives: Vec<(usize, Directive)>,
}

/// Aliases bound by `require ... as` during one invocation
#[derive(Default)]
struct Scope {
    aliases: HashMap<String, Exports>,
}

impl Scope {
    fn eval(&self, expr: &Expr) -> Result<Value, String> {
        match expr {
            Expr::Json(value) => Ok(value.clone()),
            Expr::Alias { name, field } => {
                let exports = self
                    .aliases
                    .get(name)
                    .ok_or_else(|| format!("unknown alias `${}`", name))?;
                let exports = exports.borrow();
                Ok(match field {
                    Some(field) => exports.get(field.as_str()).cloned().unwrap_or(Value::Null),
                    None => exports.clone(),
                })
            }
        }
    }
}

fn make_handler(action: Option<HandlerAction>, bindings: &Bindings) -> Handler {
    let console = bindings.console.clone();
    let runtime = bindings.runtime.clone();

    Handler::new(move |event| match &action {
        None => {
            let payload = serde_json::to_value(event).unwrap_or(Value::Null);
            console.log(&[Value::String(event.kind.to_string()), payload]);
            HandlerOutcome::Continue
        }
        Some(HandlerAction::Cancel) => HandlerOutcome::Cancel,
        Some(HandlerAction::Log(text)) => {
            console.log_str(text);
            HandlerOutcome::Continue
        }
        Some(HandlerAction::Card(props)) => {
            if let Err(e) = runtime.apply(Slot::Card, props.clone(), ClearScope::None) {
                report(&console, &e);
            }
            HandlerOutcome::Continue
        }
        Some(HandlerAction::Vibe(kind)) => {
            if let Err(e) = runtime.vibe(*kind) {
                report(&console, &e);
            }
            HandlerOutcome::Continue
        }
        Some(HandlerAction::Return(value)) => HandlerOutcome::Value(value.clone()),
    })
}

fn report(console: &Console, error: &RuntimeError) {
    console.log_str(&format!("error: {}", error));
}

#[async_trait(?Send)]
impl CompiledScript for DirectiveScript {
    async fn invoke(&self, bindings: Bindings) -> Result<Option<Value>, RuntimeError> {
        let mut scope = Scope::default();
        let runtime = &bindings.runtime;
        let fail = |line: usize, message: String| {
            RuntimeError::script(self.name.as_str(), format!("line {}: {}", line, message))
        };

        for (line, directive) in &self.directives {
            match directive {
                Directive::Require { path, alias } => {
                    let exports = bindings.require.call(path).await?;
                    if let Some(alias) = alias {
                        scope.aliases.insert(alias.clone(), exports);
                    }
                }
                Directive::Export { key, value } => {
                    let value = scope.eval(value).map_err(|m| fail(*line, m))?;
                    bindings.module.set_export(key, value);
                }
                Directive::Exports(value) => {
                    let value = scope.eval(value).map_err(|m| fail(*line, m))?;
                    bindings.module.set_exports(value);
                }
                Directive::Log(LogArg::Text(text)) => bindings.console.log_str(text),
                Directive::Log(LogArg::Expr(expr)) => {
                    let value = scope.eval(expr).map_err(|m| fail(*line, m))?;
                    bindings.console.log(&[value]);
                }
                Directive::On {
                    slot,
                    kind,
                    subtype,
                    action,
                } => {
                    let handler = make_handler(action.clone(), &bindings);
                    match slot {
                        Some(slot) => runtime.surface_on(*slot, kind, subtype.as_deref(), handler)?,
                        None => runtime.on(kind, subtype.as_deref(), handler)?,
                    }
                }
                Directive::Off {
                    slot,
                    kind,
                    subtype,
                } => {
                    match slot {
                        Some(slot) => runtime.surface_off(*slot, Some(kind), subtype.as_deref(), None)?,
                        None => runtime.off(Some(kind), subtype.as_deref(), None)?,
                    };
                }
                Directive::Apply { slot, props, clear } => {
                    let clear = if *clear { ClearScope::All } else { ClearScope::None };
                    runtime.apply(*slot, props.clone(), clear)?;
                }
                Directive::Show { slot, props } => {
                    runtime.show(*slot, props.clone())?;
                }
                Directive::Action(action) => runtime.action(action.clone())?,
                Directive::Image { spec, force_reset } => {
                    let console = bindings.console.clone();
                    let id = runtime.image(
                        spec.clone(),
                        *force_reset,
                        Some(Box::new(move |ready: ImageReady| {
                            console.log_str(&format!("image {} ready ({})", ready.id, ready.url));
                        })),
                    )?;
                    bindings.console.log_str(&format!("image {}", id));
                }
                Directive::Accel(input) => {
                    runtime.accel_config(input.clone())?;
                }
                Directive::Peek => {
                    let console = bindings.console.clone();
                    runtime.accel_peek(Box::new(move |event: &Event| {
                        let sample = event
                            .accel()
                            .and_then(|point| serde_json::to_value(point).ok())
                            .unwrap_or(Value::Null);
                        console.log(&[Value::String("peek".to_string()), sample]);
                    }))?;
                }
                Directive::Option { key, value } => runtime.set_option(key, value.clone())?,
                Directive::Vibe(kind) => runtime.vibe(*kind)?,
                Directive::Settings(url) => {
                    let console = bindings.console.clone();
                    let on_close = runtime.clone();
                    let listener = SettingsListener::new(
                        url.clone(),
                        Box::new(move |event: &SettingsEvent| {
                            if let Value::Object(options) = &event.options {
                                for (key, value) in options {
                                    if let Err(e) = on_close.set_option(key, Some(value.clone())) {
                                        report(&console, &e);
                                    }
                                }
                            }
                        }),
                    );
                    let console = bindings.console.clone();
                    runtime.settings(listener.with_open(Box::new(move |event: &SettingsEvent| {
                        console.log_str(&format!("settings opened ({})", event.url));
                    })))?;
                }
                Directive::Return(value) => {
                    return scope.eval(value).map(Some).map_err(|m| fail(*line, m));
                }
                Directive::Throw(message) => return Err(fail(*line, message.clone())),
            }
        }

        Ok(None)
    }
}
