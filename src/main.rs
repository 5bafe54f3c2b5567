//! Command-line access to the category feed and geocoding client.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use category_feed::{
    init_tracing, AppConfig, FetchOutcome, GeocodingClient, HttpProductSource, LogReporter,
    ProductCategory, StaticTranslator, StoreContext, WidgetFields,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;

/// Storefront category feed tool
#[derive(Parser)]
#[command(name = "category-feed")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and normalize one page of a product category
    Products {
        /// Category id to list
        category: String,

        /// Products per page (defaults to DEFAULT_PER_PAGE)
        #[arg(long)]
        per_page: Option<u32>,

        /// Storefront language
        #[arg(long, default_value = "en")]
        lang: String,

        /// Currency to display prices in
        #[arg(long, default_value = "USD")]
        currency: String,

        /// Store default currency
        #[arg(long, default_value = "USD")]
        default_currency: String,

        /// Products newer than this many days are badged as new
        #[arg(long, default_value_t = 30)]
        new_days: u32,
    },
    /// Resolve coordinates to a postal address
    Geocode {
        #[arg(allow_hyphen_values = true)]
        lat: f64,
        #[arg(allow_hyphen_values = true)]
        lng: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match cli.command {
        Commands::Products {
            category,
            per_page,
            lang,
            currency,
            default_currency,
            new_days,
        } => {
            let source = HttpProductSource::maybe_new(&config)?
                .context("STORE_API_BASE must be set to list products")?;
            let store = StoreContext {
                currency,
                default_currency,
                language: lang,
                days_before_new_product: new_days,
            };
            let controller = ProductCategory::new(Arc::new(source), Arc::new(LogReporter), store)
                .with_default_per_page(config.default_per_page);
            let fields = WidgetFields::from_value(Some(&json!({
                "category_id": category,
                "limit": per_page,
            })))?;

            match controller.initialize(fields).await {
                Some(FetchOutcome::Succeeded(_)) => {}
                Some(FetchOutcome::Failed(err)) => return Err(err.into()),
                Some(FetchOutcome::Cancelled) | None => bail!("product fetch did not complete"),
            }

            let view = controller
                .view(&StaticTranslator::new(), Utc::now())
                .context("no widget fields to render")?;
            println!("{}", serde_json::to_string_pretty(&view.list.items)?);
        }
        Commands::Geocode { lat, lng } => {
            let client = GeocodingClient::maybe_new(&config)?
                .context("GOOGLE_API_KEY must be set to geocode")?;
            match client.reverse_geocode(lat, lng).await? {
                Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                None => println!("no result"),
            }
        }
    }

    Ok(())
}
