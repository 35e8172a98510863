//! PostgREST Usage Store
//!
//! Stores usage records in a table served by a PostgREST-compatible API,
//! such as a Supabase project.
//!
//! # Table Layout
//!
//! One row per (owner, model) with a unique constraint on `(owner, name)`.
//! Column names follow the record's JSON form: `id`, `owner`, `name`, `rpm`,
//! `rpd`, `tpm`, `tpd`, `ash`, `asd`, `lastMinute`, `lastDay`.
//!
//! # Requests
//!
//! - `get_one` / `get_all`: `GET /rest/v1/{table}?owner=eq.X[&name=eq.Y]`
//! - `save`: `POST /rest/v1/{table}?on_conflict=owner,name` with
//!   `Prefer: resolution=merge-duplicates`
//! - deletes: `DELETE` with the same filters, `name=in.("a","b")` for many
//!
//! Every request carries the key both as `apikey` and as a bearer token.
//! Transient failures (timeouts, 408, 429, most 5xx) are retried with
//! exponential backoff.

use async_trait::async_trait;
use reqwest::{Response, Url};
use std::time::Duration;

use super::retry::{retry_with_backoff, should_retry_status, RetryConfig};
use super::UsageStore;
use crate::config::StoreConfig;
use crate::error::{QuotaError, Result};
use crate::quota::usage::UsageRecord;

/// Usage store backed by a PostgREST table
#[derive(Debug, Clone)]
pub struct RestStore {
    /// Shared HTTP client with the request timeout applied
    client: reqwest::Client,

    /// `{url}/rest/v1/{table}`
    endpoint: Url,

    /// Service key, sent as `apikey` and bearer token
    api_key: String,

    /// Per-request timeout
    timeout: Duration,

    retry: RetryConfig,
}

impl RestStore {
    /// Create a store for `table` under the API at `base_url`
    ///
    /// # Errors
    ///
    /// Returns `PersistenceUnavailable` if the URL is malformed or the HTTP
    /// client cannot be built.
    pub fn new(
        base_url: &str,
        table: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), table);
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            QuotaError::PersistenceUnavailable(format!("invalid store url '{}': {}", endpoint, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                QuotaError::PersistenceUnavailable(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            timeout,
            retry: RetryConfig::default(),
        })
    }

    /// Create a store from the `[store]` configuration section
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            QuotaError::PersistenceUnavailable("rest store requires a url".to_string())
        })?;
        let api_key = config.api_key.clone().ok_or_else(|| {
            QuotaError::PersistenceUnavailable("rest store requires an api key".to_string())
        })?;

        let store = Self::new(
            url,
            &config.table,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )?
        .with_retry(RetryConfig::default().max_attempts(config.max_attempts));

        Ok(store)
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Table endpoint URL
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url_with(&self, params: &[(&str, String)]) -> Url {
        let mut url = self.endpoint.clone();
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    fn transport_error(&self, err: reqwest::Error) -> QuotaError {
        if err.is_timeout() {
            QuotaError::Timeout(self.timeout.as_millis() as u64)
        } else {
            QuotaError::PersistenceUnavailable(err.to_string())
        }
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        if should_retry_status(status.as_u16()) {
            Err(QuotaError::PersistenceUnavailable(format!(
                "store responded with {}: {}",
                status, message
            )))
        } else {
            Err(QuotaError::StoreRejected {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Send the request built by `build`, retrying transient failures
    async fn execute<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let build = &build;
        let this = self;

        retry_with_backoff(&self.retry, move || async move {
            let response = build(&this.client)
                .header("apikey", &this.api_key)
                .bearer_auth(&this.api_key)
                .send()
                .await
                .map_err(|e| this.transport_error(e))?;
            Self::check_status(response).await
        })
        .await
    }

    async fn fetch(&self, params: &[(&str, String)]) -> Result<Vec<UsageRecord>> {
        let url = self.url_with(params);
        let response = self.execute(|client| client.get(url.clone())).await?;

        response.json::<Vec<UsageRecord>>().await.map_err(|e| {
            QuotaError::PersistenceUnavailable(format!("malformed store payload: {}", e))
        })
    }

    async fn remove(&self, params: &[(&str, String)]) -> Result<()> {
        let url = self.url_with(params);
        self.execute(|client| client.delete(url.clone())).await?;
        Ok(())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

/// PostgREST `in.(...)` filter with every value double-quoted
fn in_list(values: &[String]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|value| format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[async_trait]
impl UsageStore for RestStore {
    async fn save(&self, record: &UsageRecord) -> Result<()> {
        let url = self.url_with(&[("on_conflict", "owner,name".to_string())]);
        self.execute(|client| {
            client
                .post(url.clone())
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(record)
        })
        .await?;
        Ok(())
    }

    async fn get_one(&self, owner: &str, name: &str) -> Result<Option<UsageRecord>> {
        let rows = self
            .fetch(&[("owner", eq(owner)), ("name", eq(name)), ("limit", "1".to_string())])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn get_all(&self, owner: &str) -> Result<Vec<UsageRecord>> {
        self.fetch(&[("owner", eq(owner))]).await
    }

    async fn delete_one(&self, owner: &str, name: &str) -> Result<()> {
        self.remove(&[("owner", eq(owner)), ("name", eq(name))]).await
    }

    async fn delete_many(&self, owner: &str, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        self.remove(&[("owner", eq(owner)), ("name", in_list(names))])
            .await
    }

    async fn delete_all(&self, owner: &str) -> Result<()> {
        self.remove(&[("owner", eq(owner))]).await
    }
}
