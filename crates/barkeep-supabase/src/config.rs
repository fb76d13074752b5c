use serde::{Deserialize, Serialize};
use std::time::Duration;

use barkeep_api::ApiError;
use url::Url;

fn default_images_bucket() -> String {
    "images".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Connection settings for a Supabase project
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abcd.supabase.co`
    pub url: String,
    /// Public anon key, sent as `apikey` and bearer token
    pub anon_key: String,
    #[serde(default = "default_images_bucket")]
    pub images_bucket: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            images_bucket: default_images_bucket(),
            schema: default_schema(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Project URL with a trailing slash, so relative joins keep its path.
    pub fn base_url(&self) -> Result<Url, ApiError> {
        let mut base = self.url.trim_end_matches('/').to_string();
        base.push('/');
        Url::parse(&base).map_err(|e| ApiError::InternalError {
            message: format!("invalid Supabase url `{}`: {}", self.url, e),
        })
    }

    /// Websocket endpoint of the Realtime service
    pub fn realtime_url(&self) -> Result<Url, ApiError> {
        let mut url = self
            .base_url()?
            .join("realtime/v1/websocket")
            .map_err(|e| ApiError::InternalError {
                message: e.to_string(),
            })?;
        let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
        url.set_scheme(scheme).map_err(|_| ApiError::InternalError {
            message: format!("cannot use `{}` for a websocket", self.url),
        })?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }
}
