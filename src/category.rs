use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::catalog::{ProductQuery, ProductSource};
use crate::context::{NavigationRequest, Navigator, StoreContext, Translator, PRODUCTS_ROUTE};
use crate::errors::{AppError, AppResult};
use crate::product::{normalize, DisplayProduct, RawProduct};
use crate::telemetry::ErrorReporter;

pub const DEFAULT_PER_PAGE: u32 = 4;
const HEADING_FALLBACK_KEY: &str = "common:text_product";
const SHOW_ALL_KEY: &str = "common:text_show_all";

/// Widget configuration describing which category to show and how.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetFields {
    #[serde(default, deserialize_with = "lenient_id")]
    pub category_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_limit")]
    pub limit: Option<u32>,
    #[serde(default)]
    pub text_heading: Option<TextHeading>,
    #[serde(default, deserialize_with = "truthy")]
    pub disable_heading: bool,
    #[serde(default, deserialize_with = "truthy")]
    pub boxed: bool,
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Set for anything decoded from a JSON object, even one whose keys all
    /// hold falsy values.
    #[serde(skip, default = "decoded")]
    keyed: bool,
}

fn decoded() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextHeading {
    /// Heading text keyed by language code.
    #[serde(default)]
    pub text: BTreeMap<String, String>,
    #[serde(default)]
    pub style: Value,
}

impl WidgetFields {
    /// Parses widget fields from JSON. Absent values, non-objects and empty
    /// objects all mean "no fields".
    pub fn from_value(value: Option<&Value>) -> AppResult<Option<Self>> {
        match value {
            Some(Value::Object(map)) if !map.is_empty() => {
                Ok(Some(serde_json::from_value(Value::Object(map.clone()))?))
            }
            _ => Ok(None),
        }
    }

    /// Fields decoded from a non-empty object are never empty.
    pub fn is_empty(&self) -> bool {
        !self.keyed && *self == Self::default()
    }

    fn heading_text(&self, language: &str) -> Option<&str> {
        self.text_heading
            .as_ref()
            .and_then(|heading| heading.text.get(language))
            .map(String::as_str)
    }
}

fn present(fields: Option<&WidgetFields>) -> Option<&WidgetFields> {
    fields.filter(|fields| !fields.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchParams {
    pub category_id: String,
    pub per_page: u32,
    pub language: String,
}

impl FetchParams {
    pub fn derive(fields: Option<&WidgetFields>, language: &str, default_per_page: u32) -> Self {
        let category_id = fields
            .and_then(|f| f.category_id.as_deref())
            .filter(|id| !id.is_empty())
            .unwrap_or_default()
            .to_string();
        let per_page = fields
            .and_then(|f| f.limit)
            .filter(|limit| *limit > 0)
            .unwrap_or(default_per_page);
        Self {
            category_id,
            per_page,
            language: language.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchState {
    pub data: Vec<RawProduct>,
    pub loading: bool,
    pub category_id: String,
    pub per_page: u32,
}

impl Default for FetchState {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            loading: false,
            category_id: String::new(),
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// How a single fetch settled.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Superseded, torn down, or refused after teardown. Never reported.
    Cancelled,
    /// Reported to the error sink; state is left not loading.
    Failed(AppError),
    /// Carries the number of products stored.
    Succeeded(usize),
}

#[derive(Default)]
struct Inner {
    state: FetchState,
    fields: Option<WidgetFields>,
    generation: u64,
    cancel: Option<CancellationToken>,
    torn_down: bool,
}

/// Fetch controller for one product-category widget instance.
///
/// At most one request is in flight: starting a fetch cancels the previous
/// request's token first, and a response is applied only while its
/// generation is still current and the controller has not been torn down.
pub struct ProductCategory {
    source: Arc<dyn ProductSource>,
    reporter: Arc<dyn ErrorReporter>,
    store: StoreContext,
    default_per_page: u32,
    inner: Mutex<Inner>,
}

/// Clears `loading` and cancels the token when a fetch future is dropped
/// before it settles.
struct InflightGuard<'a> {
    inner: &'a Mutex<Inner>,
    generation: u64,
    armed: bool,
}

impl<'a> InflightGuard<'a> {
    fn new(inner: &'a Mutex<Inner>, generation: u64) -> Self {
        Self {
            inner,
            generation,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.torn_down || inner.generation != self.generation {
            return;
        }
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        inner.state.loading = false;
        trace!(generation = self.generation, "fetch abandoned before settling");
    }
}

impl ProductCategory {
    pub fn new(
        source: Arc<dyn ProductSource>,
        reporter: Arc<dyn ErrorReporter>,
        store: StoreContext,
    ) -> Self {
        Self {
            source,
            reporter,
            store,
            default_per_page: DEFAULT_PER_PAGE,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Page size used when the fields carry no positive `limit`.
    pub fn with_default_per_page(mut self, per_page: u32) -> Self {
        let per_page = per_page.max(1);
        self.default_per_page = per_page;
        self.inner.get_mut().state.per_page = per_page;
        self
    }

    /// Adopts the initial fields and runs the first fetch when they are
    /// present. Returns `None` when no fetch was issued.
    pub async fn initialize(&self, fields: Option<WidgetFields>) -> Option<FetchOutcome> {
        let params = self.adopt_fields(fields)?;
        Some(self.fetch(&params.category_id, params.per_page).await)
    }

    /// Re-fetches when `new` differs structurally from `old`, replacing any
    /// in-flight request. Missing or empty new fields cancel the in-flight
    /// request without issuing another.
    pub async fn on_config_change(
        &self,
        old: Option<&WidgetFields>,
        new: Option<WidgetFields>,
    ) -> Option<FetchOutcome> {
        if old == new.as_ref() {
            return None;
        }

        match self.adopt_fields(new) {
            Some(params) => Some(self.fetch(&params.category_id, params.per_page).await),
            None => {
                self.cancel_inflight();
                None
            }
        }
    }

    /// Fetches with the category and page size currently held in state.
    pub async fn refresh(&self) -> FetchOutcome {
        let (category_id, per_page) = {
            let inner = self.inner.lock();
            (inner.state.category_id.clone(), inner.state.per_page)
        };
        self.fetch(&category_id, per_page).await
    }

    pub async fn fetch(&self, category_id: &str, per_page: u32) -> FetchOutcome {
        let Some((generation, cancel)) = self.begin() else {
            trace!("controller torn down; refusing fetch");
            return FetchOutcome::Cancelled;
        };

        let query = ProductQuery::published(&self.store.language, category_id, per_page);
        debug!(generation, category = category_id, per_page, "fetching category products");
        let guard = InflightGuard::new(&self.inner, generation);
        let result = self.source.get_products(&query, &cancel).await;
        guard.disarm();
        self.settle(generation, result)
    }

    /// Cancels any in-flight request. No response mutates state afterwards
    /// and later fetches are refused.
    pub fn teardown(&self) {
        let mut inner = self.inner.lock();
        inner.torn_down = true;
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
    }

    pub fn state(&self) -> FetchState {
        self.inner.lock().state.clone()
    }

    pub fn fields(&self) -> Option<WidgetFields> {
        self.inner.lock().fields.clone()
    }

    /// Builds what the list renderer needs. `None` when there are no fields
    /// to render.
    pub fn view(&self, translator: &dyn Translator, now: DateTime<Utc>) -> Option<CategoryView> {
        let (fields, state) = {
            let inner = self.inner.lock();
            let fields = present(inner.fields.as_ref())?.clone();
            (fields, inner.state.clone())
        };

        let language = self.store.language.as_str();
        let heading = fields.disable_heading.then(|| {
            let name = fields.heading_text(language);
            CategoryHeading {
                title: name
                    .map(str::to_string)
                    .unwrap_or_else(|| translator.translate(HEADING_FALLBACK_KEY)),
                subtitle: translator.translate(SHOW_ALL_KEY),
                style: fields
                    .text_heading
                    .as_ref()
                    .map(|heading| heading.style.clone())
                    .unwrap_or_else(|| json!({})),
                interactive: !fields.boxed,
                show_all: NavigationRequest {
                    route: PRODUCTS_ROUTE.to_string(),
                    params: json!({ "name": name, "id": state.category_id }),
                },
            }
        });

        let items = state
            .data
            .iter()
            .map(|raw| {
                normalize(
                    raw,
                    &self.store.currency,
                    &self.store.default_currency,
                    self.store.days_before_new_product,
                    now,
                )
            })
            .collect();

        Some(CategoryView {
            heading,
            list: ProductListProps {
                items,
                layout: fields.layout.clone(),
                loading: state.loading,
                limit: state.per_page,
            },
        })
    }

    fn adopt_fields(&self, fields: Option<WidgetFields>) -> Option<FetchParams> {
        let mut inner = self.inner.lock();
        let fields = fields.filter(|fields| !fields.is_empty());
        let params =
            FetchParams::derive(fields.as_ref(), &self.store.language, self.default_per_page);
        inner.state.category_id = params.category_id.clone();
        inner.state.per_page = params.per_page;
        let present = fields.is_some();
        inner.fields = fields;
        present.then_some(params)
    }

    fn begin(&self) -> Option<(u64, CancellationToken)> {
        let mut inner = self.inner.lock();
        if inner.torn_down {
            return None;
        }
        if let Some(previous) = inner.cancel.take() {
            previous.cancel();
        }
        inner.generation += 1;
        let token = CancellationToken::new();
        inner.cancel = Some(token.clone());
        inner.state.loading = true;
        Some((inner.generation, token))
    }

    fn cancel_inflight(&self) {
        let mut inner = self.inner.lock();
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
            inner.generation += 1;
            inner.state.loading = false;
        }
    }

    fn settle(&self, generation: u64, result: AppResult<Vec<RawProduct>>) -> FetchOutcome {
        let mut inner = self.inner.lock();
        if inner.torn_down || inner.generation != generation {
            trace!(generation, "discarding response from a cancelled fetch");
            return FetchOutcome::Cancelled;
        }
        inner.cancel = None;
        inner.state.loading = false;

        match result {
            Ok(data) => {
                let count = data.len();
                inner.state.data = data;
                FetchOutcome::Succeeded(count)
            }
            Err(err) if err.is_cancelled() => FetchOutcome::Cancelled,
            Err(err) => {
                drop(inner);
                warn!(error = %err, "category products fetch failed");
                self.reporter.report(&err);
                FetchOutcome::Failed(err)
            }
        }
    }
}

impl Drop for ProductCategory {
    fn drop(&mut self) {
        if let Some(cancel) = self.inner.get_mut().cancel.take() {
            cancel.cancel();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryView {
    pub heading: Option<CategoryHeading>,
    pub list: ProductListProps,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryHeading {
    pub title: String,
    pub subtitle: String,
    pub style: Value,
    /// Unboxed widgets let the heading receive touches.
    pub interactive: bool,
    pub show_all: NavigationRequest,
}

impl CategoryHeading {
    pub fn open_all(&self, navigator: &dyn Navigator) {
        navigator.navigate(&self.show_all);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductListProps {
    pub items: Vec<DisplayProduct>,
    pub layout: Option<String>,
    pub loading: bool,
    pub limit: u32,
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text.trim().to_string()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_limit<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(text)) => text.trim().parse::<u32>().ok(),
        _ => None,
    })
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => flag,
        Some(Value::Number(number)) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Some(Value::String(text)) => !text.is_empty() && text != "0" && text != "false",
        Some(_) => true,
    })
}
