use std::time::Duration;

use oauth2::AccessToken;
use tracing::{debug, error};

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod report;
pub mod storage;

pub use error::{ApiException, FluviusError, Result};

const PRODUCTION_BASE_URL: &str = "https://mijn.fluvius.be";

/// The portal filters out requests that don't look like they come from a browser.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub trait ApiClient {
    fn http_get(&self, path: &str, query_string: &[(String, String)]) -> Result<String>;
}

#[derive(Debug)]
pub struct FluviusApi {
    base_url: String,
    token: AccessToken,
    http_client: reqwest::blocking::Client,
}

impl FluviusApi {
    pub fn new(token: AccessToken) -> Result<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(FluviusApi {
            base_url: PRODUCTION_BASE_URL.to_string(),
            token,
            http_client,
        })
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

impl ApiClient for FluviusApi {
    fn http_get(&self, path: &str, query_string: &[(String, String)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);

        debug!(url = %url, "GET");
        let response = self
            .http_client
            .get(&url)
            .query(&query_string)
            .bearer_auth(self.token.secret())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .inspect_err(|e| error!(error = %e, "API call failed"))?;

        let status_code = response.status();
        let body = response.text()?;

        if !status_code.is_success() {
            let reason = ApiException::from_status(status_code.as_u16());
            error!(
                status = status_code.as_u16(),
                reason = ?reason,
                body = %body,
                "API call failed"
            );
            return Err(FluviusError::HttpStatus {
                status: status_code.as_u16(),
                reason,
                body,
            });
        }

        Ok(body)
    }
}
