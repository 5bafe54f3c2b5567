//! Collaborators the category feed receives from its host instead of
//! reaching into global state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const PRODUCTS_ROUTE: &str = "products";

/// Values selected from the host application's store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreContext {
    pub currency: String,
    pub default_currency: String,
    pub language: String,
    /// Products created within this many days are badged as new.
    pub days_before_new_product: u32,
}

impl Default for StoreContext {
    fn default() -> Self {
        Self {
            currency: "USD".into(),
            default_currency: "USD".into(),
            language: "en".into(),
            days_before_new_product: 30,
        }
    }
}

pub trait Translator: Send + Sync {
    fn translate(&self, key: &str) -> String;
}

/// Falls back to the key itself, which is what most i18n providers show
/// for a missing entry.
#[derive(Debug, Default, Clone)]
pub struct StaticTranslator {
    entries: HashMap<String, String>,
}

impl StaticTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

impl Translator for StaticTranslator {
    fn translate(&self, key: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationRequest {
    pub route: String,
    pub params: serde_json::Value,
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, request: &NavigationRequest);
}
