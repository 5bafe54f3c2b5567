mod catalog;
mod category;
mod config;
mod context;
mod errors;
mod geo;
mod product;
mod telemetry;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use catalog::{HttpProductSource, ProductQuery, ProductSource, PUBLISH_STATUS};
pub use category::{
    CategoryHeading, CategoryView, FetchOutcome, FetchParams, FetchState, ProductCategory,
    ProductListProps, TextHeading, WidgetFields, DEFAULT_PER_PAGE,
};
pub use config::{AppConfig, PublicAppConfig, DEFAULT_GEOCODE_ENDPOINT};
pub use context::{
    NavigationRequest, Navigator, StaticTranslator, StoreContext, Translator, PRODUCTS_ROUTE,
};
pub use errors::{AppError, AppResult};
pub use geo::{GeoResult, GeocodingClient};
pub use product::{
    normalize, CurrencyPrices, DisplayProduct, ProductCategoryRef, ProductImage, RawProduct,
};
pub use telemetry::{ErrorReporter, LogReporter, TelemetryClient, TelemetryEvent};

const REDACTED_PARAMS: &[&str] = &["key=", "consumer_key=", "consumer_secret="];

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,category_feed=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}

/// Strips credential query values from error text before it leaves the
/// process.
pub fn sanitize_error_copy(message: &str) -> String {
    let mut sanitized = message.to_string();
    for param in REDACTED_PARAMS {
        let mut search_from = 0;
        while let Some(found) = sanitized[search_from..].find(param) {
            let start = search_from + found;
            let boundary = start == 0
                || matches!(sanitized.as_bytes()[start - 1], b'?' | b'&' | b' ' | b'(');
            let value_start = start + param.len();
            if !boundary {
                search_from = value_start;
                continue;
            }
            let value_end = sanitized[value_start..]
                .find(|c: char| c == '&' || c == ')' || c.is_whitespace())
                .map(|offset| value_start + offset)
                .unwrap_or(sanitized.len());
            sanitized.replace_range(value_start..value_end, "[redacted]");
            search_from = value_start + "[redacted]".len();
        }
    }
    sanitized
}
