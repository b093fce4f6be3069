use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use models::{DayState, GetDayResponse, OfficeState, PutDayRequest};
use presence::OfficeStatusService;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::time::Duration;

/// Connection settings for the office tracker API.
#[derive(Debug, Clone)]
pub struct OfficeTrackerConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Client for `/api/v1/state/{year}/{month}/{day}`.
#[derive(Debug, Clone)]
pub struct OfficeTrackerClient {
    http: Client,
    base_url: Url,
}

impl OfficeTrackerClient {
    pub fn new(config: OfficeTrackerConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid office tracker URL: {}", config.base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !config.api_key.is_empty() {
            let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .context("Office tracker API key is not a valid header value")?;
            bearer.set_sensitive(true);
            headers.insert(AUTHORIZATION, bearer);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, base_url })
    }

    fn day_url(&self, date: NaiveDate) -> Result<Url> {
        self.base_url
            .join(&format!(
                "api/v1/state/{}/{}/{}",
                date.year(),
                date.month(),
                date.day()
            ))
            .context("Failed to build office tracker state URL")
    }

    pub async fn get_state(&self, date: NaiveDate) -> Result<OfficeState> {
        let endpoint = self.day_url(date)?;

        let response: GetDayResponse = self
            .http
            .get(endpoint.clone())
            .send()
            .await
            .with_context(|| format!("GET {endpoint} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {endpoint} returned non-success status"))?
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {endpoint}"))?;

        Ok(response.data.state)
    }

    pub async fn put_state(&self, date: NaiveDate, state: OfficeState) -> Result<()> {
        let endpoint = self.day_url(date)?;
        let request = PutDayRequest {
            data: DayState { state },
        };

        let status = self
            .http
            .put(endpoint.clone())
            .json(&request)
            .send()
            .await
            .with_context(|| format!("PUT {endpoint} failed"))?
            .status();

        if !status.is_success() {
            return Err(anyhow!("PUT {endpoint} returned {status}"));
        }
        Ok(())
    }
}

#[async_trait]
impl OfficeStatusService for OfficeTrackerClient {
    async fn fetch_state(&self, date: NaiveDate) -> Result<OfficeState> {
        self.get_state(date).await
    }

    async fn assert_work_from_office(&self, date: NaiveDate) -> Result<()> {
        self.put_state(date, OfficeState::WorkFromOffice).await
    }
}
