use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::product::RawProduct;

pub const PUBLISH_STATUS: &str = "publish";

/// Query parameters sent to the product listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductQuery {
    pub lang: String,
    pub status: String,
    pub category: String,
    pub per_page: u32,
}

impl ProductQuery {
    pub fn published(language: &str, category: &str, per_page: u32) -> Self {
        Self {
            lang: language.to_string(),
            status: PUBLISH_STATUS.to_string(),
            category: category.to_string(),
            per_page,
        }
    }
}

#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Resolves to [`AppError::Cancelled`] once `cancel` fires.
    async fn get_products(
        &self,
        query: &ProductQuery,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<RawProduct>>;
}

#[derive(Clone)]
pub struct HttpProductSource {
    http: Client,
    products_url: Url,
    credentials: Option<(SecretString, SecretString)>,
}

impl HttpProductSource {
    pub fn maybe_new(config: &AppConfig) -> AppResult<Option<Self>> {
        let Some(base) = config.store_api_base.as_deref() else {
            return Ok(None);
        };

        let mut products_url = Url::parse(base.trim_end_matches('/'))
            .map_err(|err| AppError::Config(format!("invalid store API base URL: {err}")))?;
        products_url
            .path_segments_mut()
            .map_err(|_| AppError::Config("store API base cannot carry a path".into()))?
            .pop_if_empty()
            .push("products");

        let http = Client::builder()
            .user_agent("category-feed/0.1.0")
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        let credentials = match (
            config.store_consumer_key.clone(),
            config.store_consumer_secret.clone(),
        ) {
            (Some(key), Some(secret)) => Some((key, secret)),
            _ => None,
        };

        Ok(Some(Self {
            http,
            products_url,
            credentials,
        }))
    }

    async fn request(&self, query: &ProductQuery) -> AppResult<Vec<RawProduct>> {
        let mut request = self.http.get(self.products_url.clone()).query(query);
        if let Some((key, secret)) = &self.credentials {
            request = request.basic_auth(key.expose_secret(), Some(secret.expose_secret()));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProductSource for HttpProductSource {
    async fn get_products(
        &self,
        query: &ProductQuery,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<RawProduct>> {
        debug!(category = %query.category, per_page = query.per_page, "requesting products");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            result = self.request(query) => result,
        }
    }
}
