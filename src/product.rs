use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

const OUT_OF_STOCK: &str = "outofstock";

/// A product record as returned by the store API. Everything except the id
/// may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProduct {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(rename = "type", default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub regular_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sale_price: Option<f64>,
    #[serde(default)]
    pub on_sale: Option<bool>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub images: Vec<ProductImage>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub average_rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub rating_count: Option<u32>,
    #[serde(default)]
    pub stock_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub categories: Vec<ProductCategoryRef>,
    #[serde(
        rename = "multi-currency-prices",
        default,
        deserialize_with = "lenient_map"
    )]
    pub multi_currency_prices: Option<HashMap<String, CurrencyPrices>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductCategoryRef {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyPrices {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub regular_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sale_price: Option<f64>,
}

/// Display-ready projection of a [`RawProduct`] for the list renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayProduct {
    pub id: u64,
    pub name: String,
    pub permalink: Option<String>,
    pub image: Option<String>,
    pub product_type: String,
    pub currency: String,
    pub price: Option<f64>,
    pub regular_price: Option<f64>,
    pub sale_price: Option<f64>,
    pub on_sale: bool,
    pub discount_percent: Option<u8>,
    pub is_new: bool,
    pub rating: f64,
    pub rating_count: u32,
    pub in_stock: bool,
}

/// Maps a raw product into its display shape.
///
/// Prices come from the record's `multi-currency-prices` entry for
/// `currency` when it differs from `default_currency` and such an entry
/// exists; otherwise the base prices are labelled with `default_currency`.
/// `now` is taken as an argument so the result depends only on the inputs.
pub fn normalize(
    raw: &RawProduct,
    currency: &str,
    default_currency: &str,
    day_window: u32,
    now: DateTime<Utc>,
) -> DisplayProduct {
    let converted = (currency != default_currency)
        .then(|| {
            raw.multi_currency_prices
                .as_ref()
                .and_then(|prices| prices.get(currency))
        })
        .flatten();

    let (label, price, regular_price, sale_price) = match converted {
        Some(prices) => (
            currency,
            prices.price,
            prices.regular_price,
            prices.sale_price,
        ),
        None => (
            default_currency,
            raw.price,
            raw.regular_price,
            raw.sale_price,
        ),
    };

    let sale_below_regular = matches!(
        (sale_price, regular_price),
        (Some(sale), Some(regular)) if sale < regular
    );
    let on_sale = raw.on_sale.unwrap_or(sale_below_regular);
    let discount_percent = if on_sale {
        discount(regular_price, sale_price.or(price))
    } else {
        None
    };

    DisplayProduct {
        id: raw.id,
        name: raw.name.clone().unwrap_or_default(),
        permalink: raw.permalink.clone(),
        image: raw.images.iter().find_map(|image| image.src.clone()),
        product_type: raw
            .product_type
            .clone()
            .unwrap_or_else(|| "simple".to_string()),
        currency: label.to_string(),
        price,
        regular_price,
        sale_price,
        on_sale,
        discount_percent,
        is_new: is_new(raw.date_created.as_deref(), day_window, now),
        rating: raw.average_rating.unwrap_or(0.0),
        rating_count: raw.rating_count.unwrap_or(0),
        in_stock: raw.stock_status.as_deref() != Some(OUT_OF_STOCK),
    }
}

fn discount(regular: Option<f64>, sale: Option<f64>) -> Option<u8> {
    let (regular, sale) = (regular?, sale?);
    if regular <= 0.0 || sale >= regular || sale < 0.0 {
        return None;
    }
    Some(((regular - sale) / regular * 100.0).round() as u8)
}

fn is_new(date_created: Option<&str>, day_window: u32, now: DateTime<Utc>) -> bool {
    if day_window == 0 {
        return false;
    }
    let Some(created) = date_created.and_then(parse_created) else {
        return false;
    };
    // A window reaching past the representable range covers every date.
    let cutoff = Duration::try_days(i64::from(day_window))
        .and_then(|window| now.checked_sub_signed(window));
    match cutoff {
        Some(cutoff) => created >= cutoff,
        None => true,
    }
}

fn parse_created(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Accepts decimal strings, numbers, blanks and nulls; anything that does
/// not parse becomes `None`.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(number)) => number.as_f64(),
        Some(serde_json::Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(number)) => {
            number.as_u64().and_then(|n| u32::try_from(n).ok())
        }
        Some(serde_json::Value::String(text)) => text.trim().parse::<u32>().ok(),
        _ => None,
    })
}

/// Null or non-array values become an empty list; entries that do not
/// decode are skipped.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// PHP encodes an empty map as `[]`; that, null, and other non-objects
/// become `None`. Entries that do not decode are skipped.
fn lenient_map<'de, D, T>(deserializer: D) -> Result<Option<HashMap<String, T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Object(entries)) => Some(
            entries
                .into_iter()
                .filter_map(|(code, prices)| {
                    serde_json::from_value(prices).ok().map(|prices| (code, prices))
                })
                .collect(),
        ),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn sample() -> RawProduct {
        serde_json::from_value(json!({
            "id": 7,
            "name": "Linen Shirt",
            "permalink": "https://shop.example.com/linen-shirt",
            "type": "variable",
            "price": "18.00",
            "regular_price": "24",
            "sale_price": "18",
            "on_sale": true,
            "date_created": "2024-05-28T09:30:00",
            "images": [{"src": "https://cdn.example.com/a.jpg", "alt": ""}],
            "average_rating": "4.50",
            "rating_count": 12,
            "stock_status": "instock",
            "multi-currency-prices": {
                "EUR": {"price": "16.5", "regular_price": "22", "sale_price": "16.5"}
            }
        }))
        .unwrap()
    }

    #[test]
    fn normalizes_base_prices_in_default_currency() {
        let display = normalize(&sample(), "USD", "USD", 7, now());
        assert_eq!(display.name, "Linen Shirt");
        assert_eq!(display.currency, "USD");
        assert_eq!(display.price, Some(18.0));
        assert_eq!(display.regular_price, Some(24.0));
        assert!(display.on_sale);
        assert_eq!(display.discount_percent, Some(25));
        assert_eq!(display.image.as_deref(), Some("https://cdn.example.com/a.jpg"));
        assert_eq!(display.product_type, "variable");
        assert_eq!(display.rating, 4.5);
        assert_eq!(display.rating_count, 12);
        assert!(display.in_stock);
        assert!(display.is_new);
    }

    #[test]
    fn uses_converted_prices_for_selected_currency() {
        let display = normalize(&sample(), "EUR", "USD", 7, now());
        assert_eq!(display.currency, "EUR");
        assert_eq!(display.price, Some(16.5));
        assert_eq!(display.regular_price, Some(22.0));
        assert_eq!(display.discount_percent, Some(25));
    }

    #[test]
    fn falls_back_to_default_currency_without_conversion() {
        let display = normalize(&sample(), "GBP", "USD", 7, now());
        assert_eq!(display.currency, "USD");
        assert_eq!(display.price, Some(18.0));
    }

    #[test]
    fn tolerates_missing_fields() {
        let raw: RawProduct = serde_json::from_value(json!({"id": 3})).unwrap();
        let display = normalize(&raw, "EUR", "USD", 30, now());
        assert_eq!(display.id, 3);
        assert_eq!(display.name, "");
        assert_eq!(display.currency, "USD");
        assert_eq!(display.price, None);
        assert!(!display.on_sale);
        assert_eq!(display.discount_percent, None);
        assert!(!display.is_new);
        assert_eq!(display.rating, 0.0);
        assert!(display.in_stock);
        assert!(display.image.is_none());
    }

    #[test]
    fn blank_and_malformed_prices_become_none() {
        let raw: RawProduct = serde_json::from_value(json!({
            "id": 4,
            "price": "",
            "regular_price": null,
            "sale_price": "n/a",
            "average_rating": 3
        }))
        .unwrap();
        let display = normalize(&raw, "USD", "USD", 30, now());
        assert_eq!(display.price, None);
        assert_eq!(display.regular_price, None);
        assert_eq!(display.sale_price, None);
        assert_eq!(display.rating, 3.0);
    }

    #[test]
    fn infers_sale_when_flag_missing() {
        let raw: RawProduct = serde_json::from_value(json!({
            "id": 5,
            "regular_price": 40,
            "sale_price": 30
        }))
        .unwrap();
        let display = normalize(&raw, "USD", "USD", 30, now());
        assert!(display.on_sale);
        assert_eq!(display.discount_percent, Some(25));
    }

    #[test]
    fn new_badge_respects_day_window() {
        let mut raw = sample();
        raw.date_created = Some("2024-05-01T00:00:00Z".into());
        assert!(!normalize(&raw, "USD", "USD", 7, now()).is_new);
        assert!(normalize(&raw, "USD", "USD", 45, now()).is_new);
        assert!(!normalize(&raw, "USD", "USD", 0, now()).is_new);

        raw.date_created = Some("2024-05-30 08:15:00".into());
        assert!(normalize(&raw, "USD", "USD", 7, now()).is_new);
        raw.date_created = Some("2024-04-30 08:15:00".into());
        assert!(!normalize(&raw, "USD", "USD", 7, now()).is_new);

        raw.date_created = Some("2024-07-15T00:00:00".into());
        assert!(normalize(&raw, "USD", "USD", 1, now()).is_new);

        raw.date_created = Some("not a date".into());
        assert!(!normalize(&raw, "USD", "USD", 45, now()).is_new);
    }

    #[test]
    fn huge_day_window_badges_every_date() {
        let mut raw = sample();
        raw.date_created = Some("1970-01-01T00:00:00Z".into());
        assert!(normalize(&raw, "USD", "USD", u32::MAX, now()).is_new);
    }

    #[test]
    fn null_and_php_shaped_collections_are_tolerated() {
        let raw: RawProduct = serde_json::from_value(json!({
            "id": 1,
            "images": null,
            "categories": null,
            "multi-currency-prices": [],
            "rating_count": "12"
        }))
        .unwrap();
        assert!(raw.images.is_empty());
        assert!(raw.categories.is_empty());
        assert!(raw.multi_currency_prices.is_none());
        assert_eq!(raw.rating_count, Some(12));

        let display = normalize(&raw, "EUR", "USD", 7, now());
        assert_eq!(display.currency, "USD");
        assert_eq!(display.rating_count, 12);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let raw: RawProduct = serde_json::from_value(json!({
            "id": 2,
            "images": ["oops", {"src": "https://cdn.example.com/b.jpg"}],
            "categories": [{"name": "missing id"}, {"id": 5, "name": "Shirts"}],
            "multi-currency-prices": {"EUR": {"price": "9"}, "GBP": "broken"},
            "rating_count": -3
        }))
        .unwrap();
        assert_eq!(raw.images.len(), 1);
        assert_eq!(raw.categories.len(), 1);
        assert_eq!(raw.categories[0].id, 5);
        let prices = raw.multi_currency_prices.as_ref().unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices["EUR"].price, Some(9.0));
        assert_eq!(raw.rating_count, None);

        let display = normalize(&raw, "EUR", "USD", 7, now());
        assert_eq!(display.image.as_deref(), Some("https://cdn.example.com/b.jpg"));
        assert_eq!(display.price, Some(9.0));
    }

    #[test]
    fn out_of_stock_is_flagged() {
        let mut raw = sample();
        raw.stock_status = Some(OUT_OF_STOCK.into());
        assert!(!normalize(&raw, "USD", "USD", 7, now()).in_stock);
    }

    #[test]
    fn identical_inputs_yield_identical_output() {
        let raw = sample();
        let first = normalize(&raw, "EUR", "USD", 7, now());
        let second = normalize(&raw, "EUR", "USD", 7, now());
        assert_eq!(first, second);
    }
}
