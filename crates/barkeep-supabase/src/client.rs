use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, error, info};
use url::Url;

use barkeep_api::{
    ApiError, ChangeKind, ChangeNotifications, ObjectRef, Query, Row, RowId, Subscription,
};
use barkeep_core::{ObjectStorage, Result, TableGateway};

use crate::config::SupabaseConfig;
use crate::realtime;

/// Client for one Supabase project.
pub struct SupabaseClient {
    config: SupabaseConfig,
    base_url: Url,
    default_headers: HeaderMap,
    client: reqwest::Client,
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        let base_url = config.base_url()?;

        let invalid_key = |_| ApiError::InternalError {
            message: "anon key is not a valid header value".to_string(),
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&config.anon_key).map_err(invalid_key)?,
        );
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", config.anon_key)).map_err(invalid_key)?,
        );

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::InternalError {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            base_url,
            default_headers: headers,
            client,
        })
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| ApiError::InternalError {
            message: format!("cannot build url for `{}`: {}", path, e),
        })
    }

    /// PostgREST url selecting the rows of `query`.
    pub fn query_url(&self, table: &str, query: &Query) -> Result<Url> {
        let mut url = self.join(&format!("rest/v1/{}", table))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            for filter in &query.filters {
                pairs.append_pair(&filter.column, &filter_expression(&filter.value));
            }
            if let Some(order) = &query.order {
                let direction = if order.ascending { "asc" } else { "desc" };
                pairs.append_pair("order", &format!("{}.{}", order.column, direction));
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    /// PostgREST url addressing a single row
    pub fn row_url(&self, table: &str, id: RowId) -> Result<Url> {
        let mut url = self.join(&format!("rest/v1/{}", table))?;
        url.query_pairs_mut()
            .append_pair(barkeep_api::ID_COLUMN, &format!("eq.{}", id));
        Ok(url)
    }

    /// Base url extended by `segments`, each percent-encoded as a single path segment.
    fn segments_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InternalError {
                message: format!("`{}` cannot be a base url", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn object_url(&self, bucket: &str, name: &str) -> Result<Url> {
        self.segments_url(&["storage", "v1", "object", bucket, name])
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .headers(self.default_headers.clone())
            .header("Accept-Profile", &self.config.schema)
            .header("Content-Profile", &self.config.schema)
    }

    /// Helper to create better error messages from reqwest errors
    fn format_reqwest_error(e: reqwest::Error, url: &str, operation: &str) -> ApiError {
        let message = if e.is_timeout() {
            format!(
                "Failed to {} for {}: timeout - request took too long (check network or increase request_timeout_secs)",
                operation, url
            )
        } else if e.is_connect() {
            format!(
                "Failed to {} for {}: connection error - check network connectivity and the project url. Error: {}",
                operation, url, e
            )
        } else if e.is_decode() {
            format!(
                "Failed to {} for {}: decode error - unexpected response format from server. Error: {}",
                operation, url, e
            )
        } else {
            format!("Failed to {} for {}: {}", operation, url, e)
        };
        ApiError::NetworkError { message }
    }

    /// Helper to handle HTTP responses with better error messages
    async fn handle_response(response: reqwest::Response, url: &str) -> Result<String> {
        let status = response.status();
        let response_text = response.text().await.map_err(|e| ApiError::NetworkError {
            message: format!("Failed to read response body from {}: {}", url, e),
        })?;

        if !status.is_success() {
            let body = if response_text.len() > 500 {
                let cut = (0..=500)
                    .rev()
                    .find(|i| response_text.is_char_boundary(*i))
                    .unwrap_or(0);
                format!("{}... (truncated)", &response_text[..cut])
            } else {
                response_text
            };
            error!("HTTP {} from {}: {}", status.as_u16(), url, body);
            return Err(ApiError::HttpError {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }

        Ok(response_text)
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &Url, operation: &str) -> Result<String> {
        let response = request
            .send()
            .await
            .map_err(|e| Self::format_reqwest_error(e, url.as_str(), operation))?;
        Self::handle_response(response, url.as_str()).await
    }
}

/// PostgREST operator for an equality filter.
fn filter_expression(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{}", s),
        other => format!("eq.{}", other),
    }
}

fn parse_rows(table: &str, body: &str) -> Result<Vec<Row>> {
    serde_json::from_str(body).map_err(|e| ApiError::MalformedRow {
        table: table.to_string(),
        message: format!("response is not a list of rows: {}", e),
    })
}

#[async_trait]
impl TableGateway for SupabaseClient {
    #[tracing::instrument(name = "supabase.query", skip(self, query))]
    async fn query(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let url = self.query_url(table, query)?;
        debug!("GET {}", url);
        let body = self
            .send(self.request(reqwest::Method::GET, url.clone()), &url, "fetch rows")
            .await?;
        let rows = parse_rows(table, &body)?;
        info!("Fetched {} rows from {}", rows.len(), table);
        Ok(rows)
    }

    #[tracing::instrument(name = "supabase.insert", skip(self, row))]
    async fn insert(&self, table: &str, row: Row) -> Result<Row> {
        let url = self.join(&format!("rest/v1/{}", table))?;
        let request = self
            .request(reqwest::Method::POST, url.clone())
            .header("Prefer", "return=representation")
            .json(&vec![row]);
        let body = self.send(request, &url, "insert row").await?;

        parse_rows(table, &body)?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::MalformedRow {
                table: table.to_string(),
                message: "insert returned no row".to_string(),
            })
    }

    #[tracing::instrument(name = "supabase.update", skip(self, patch))]
    async fn update(&self, table: &str, id: RowId, patch: Row) -> Result<()> {
        let url = self.row_url(table, id)?;
        let request = self.request(reqwest::Method::PATCH, url.clone()).json(&patch);
        self.send(request, &url, "update row").await?;
        Ok(())
    }

    #[tracing::instrument(name = "supabase.delete", skip(self))]
    async fn delete(&self, table: &str, id: RowId) -> Result<()> {
        let url = self.row_url(table, id)?;
        self.send(self.request(reqwest::Method::DELETE, url.clone()), &url, "delete row")
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for SupabaseClient {
    #[tracing::instrument(name = "supabase.upload", skip(self, bytes), fields(size = bytes.len()))]
    async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<ObjectRef> {
        let url = self.object_url(bucket, name)?;
        let request = self
            .client
            .post(url.clone())
            .headers(self.default_headers.clone())
            .header(
                CONTENT_TYPE,
                content_type.unwrap_or("application/octet-stream"),
            )
            .body(bytes);
        self.send(request, &url, "upload object")
            .await
            .map_err(|e| ApiError::StorageError {
                message: e.to_string(),
            })?;

        Ok(ObjectRef {
            bucket: bucket.to_string(),
            name: name.to_string(),
        })
    }

    fn public_url(&self, bucket: &str, name: &str) -> Result<String> {
        Ok(self
            .segments_url(&["storage", "v1", "object", "public", bucket, name])?
            .to_string())
    }
}

#[async_trait]
impl ChangeNotifications for SupabaseClient {
    async fn subscribe(
        &self,
        table: &str,
        kinds: &[ChangeKind],
    ) -> std::result::Result<Subscription, ApiError> {
        realtime::subscribe(&self.config, table, kinds).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> SupabaseClient {
        SupabaseClient::new(SupabaseConfig::new("https://abcd.supabase.co", "anon")).unwrap()
    }

    #[test]
    fn query_url_carries_filters_order_and_limit() {
        let url = client()
            .query_url(
                "premixes",
                &Query::new().eq("status", false).order_by("id", false).limit(10),
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://abcd.supabase.co/rest/v1/premixes?select=*&status=eq.false&order=id.desc&limit=10"
        );
    }

    #[test]
    fn string_filters_are_not_quoted() {
        let url = client()
            .query_url("orders", &Query::new().eq("status", "pending"))
            .unwrap();
        assert_eq!(url.query(), Some("select=*&status=eq.pending"));
        assert_eq!(filter_expression(&json!(null)), "is.null");
    }

    #[test]
    fn row_url_selects_by_id() {
        let url = client().row_url("drinks", RowId(12)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://abcd.supabase.co/rest/v1/drinks?id=eq.12"
        );
    }

    #[test]
    fn storage_urls() {
        let client = client();
        assert_eq!(
            client.object_url("images", "1700000000000-lime.png").unwrap().as_str(),
            "https://abcd.supabase.co/storage/v1/object/images/1700000000000-lime.png"
        );
        assert_eq!(
            client.public_url("images", "1700000000000-lime.png").unwrap(),
            "https://abcd.supabase.co/storage/v1/object/public/images/1700000000000-lime.png"
        );
    }

    #[test]
    fn object_names_stay_one_path_segment() {
        let client = client();
        assert_eq!(
            client.object_url("images", "1-what?#1.png").unwrap().as_str(),
            "https://abcd.supabase.co/storage/v1/object/images/1-what%3F%231.png"
        );
        assert_eq!(
            client.public_url("images", "1-a b.png").unwrap(),
            "https://abcd.supabase.co/storage/v1/object/public/images/1-a%20b.png"
        );

        let proxied =
            SupabaseClient::new(SupabaseConfig::new("https://example.com/supabase", "anon")).unwrap();
        assert_eq!(
            proxied.object_url("images", "x.png").unwrap().as_str(),
            "https://example.com/supabase/storage/v1/object/images/x.png"
        );
    }

    #[test]
    fn key_with_newline_is_rejected() {
        let result = SupabaseClient::new(SupabaseConfig::new("https://abcd.supabase.co", "a\nb"));
        assert!(matches!(result, Err(ApiError::InternalError { .. })));
    }

    #[test]
    fn non_array_body_is_malformed() {
        let err = parse_rows("drinks", r#"{"message": "nope"}"#).unwrap_err();
        assert!(matches!(err, ApiError::MalformedRow { .. }));
    }
}
