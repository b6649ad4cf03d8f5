use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RuntimeError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MenuItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MenuItem {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

pub type ItemProducer = Rc<dyn Fn() -> Vec<MenuItem>>;
pub type SectionProducer = Rc<dyn Fn() -> Vec<MenuSection>>;

/// Items of one section, given up front or produced on demand
#[derive(Clone)]
pub enum Items {
    Static(Vec<MenuItem>),
    Lazy(ItemProducer),
}

impl Items {
    pub fn resolve(&self) -> Vec<MenuItem> {
        match self {
            Items::Static(items) => items.clone(),
            Items::Lazy(produce) => produce(),
        }
    }
}

impl Default for Items {
    fn default() -> Self {
        Items::Static(Vec::new())
    }
}

impl fmt::Debug for Items {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Items::Static(items) => f.debug_tuple("Static").field(&items.len()).finish(),
            Items::Lazy(_) => write!(f, "Lazy"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MenuSection {
    pub title: Option<String>,
    pub items: Items,
}

impl MenuSection {
    pub fn new(title: Option<String>, items: Items) -> Self {
        Self { title, items }
    }
}

#[derive(Clone)]
pub enum Sections {
    Static(Vec<MenuSection>),
    Lazy(SectionProducer),
}

impl Default for Sections {
    fn default() -> Self {
        Sections::Static(Vec::new())
    }
}

impl fmt::Debug for Sections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sections::Static(sections) => f.debug_tuple("Static").field(sections).finish(),
            Sections::Lazy(_) => write!(f, "Lazy"),
        }
    }
}

/// A section with its items materialized
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResolvedSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub items: Vec<MenuItem>,
}

impl ResolvedSection {
    /// `{title, items: <count>}` as carried in the menu state
    pub fn summary(&self) -> Value {
        let mut summary = Map::new();
        if let Some(title) = &self.title {
            summary.insert("title".to_string(), Value::String(title.clone()));
        }
        summary.insert("items".to_string(), Value::from(self.items.len()));
        Value::Object(summary)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MenuContent {
    pub sections: Sections,
}

impl MenuContent {
    pub fn new(sections: Sections) -> Self {
        Self { sections }
    }

    /// Static content from `[{title?, items: [{title?, subtitle?, ...}]}]`
    pub fn from_json(sections: &Value) -> Result<Self, RuntimeError> {
        let list = sections.as_array().ok_or_else(|| {
            RuntimeError::InvalidArgument(format!("menu sections must be an array, got {}", sections))
        })?;

        let sections = list
            .iter()
            .map(|section| {
                let title = section
                    .get("title")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let items = match section.get("items") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(items) => serde_json::from_value(items.clone()).map_err(|e| {
                        RuntimeError::InvalidArgument(format!("invalid menu items: {}", e))
                    })?,
                };
                Ok(MenuSection::new(title, Items::Static(items)))
            })
            .collect::<Result<Vec<_>, RuntimeError>>()?;

        Ok(Self::new(Sections::Static(sections)))
    }

    /// Run every producer and return the current content
    pub fn resolve(&self) -> Vec<ResolvedSection> {
        let sections = match &self.sections {
            Sections::Static(sections) => sections.clone(),
            Sections::Lazy(produce) => produce(),
        };

        sections
            .iter()
            .map(|section| ResolvedSection {
                title: section.title.clone(),
                items: section.items.resolve(),
            })
            .collect()
    }
}
