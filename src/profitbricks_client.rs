//! ProfitBricks Cloud API REST client.
//!
//! Unique responsibility: translate `CloudApi` calls into HTTP requests against
//! the Cloud API and decode the responses.
//!
//! API endpoint:
//! - <https://api.ionos.com/cloudapi/v5> (overridable)
//! - Header: Authorization: Basic <username:password>
//!
//! This module encapsulates:
//! - Credentials and HTTP settings (parameters first, environment as fallback)
//! - Listing with `_links.next` pagination
//! - Request id extraction from the `Location` header of mutating calls
//! - Retry with exponential backoff for reads (mutations are sent once)

use std::{env, fmt, time::Duration};

use async_trait::async_trait;
use reqwest::{Method, StatusCode, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

use crate::profitbricks_api::{Accepted, ApiResult, CloudApi};
use crate::profitbricks_types::{
    Datacenter, DatacenterProperties, Lan, LanProperties, NewResource, Nic, NicProperties,
    RequestStatus, Resource, ResourceRef, Server, ServerCreate, ServerProperties, Volume,
    VolumeProperties,
};

/// Default Cloud API base URL.
pub const DEFAULT_API_URL: &str = "https://api.ionos.com/cloudapi/v5";

/// Configuration for the Cloud API client.
#[derive(Clone)]
pub struct ClientConfig {
    /// Account username.
    /// Param: `username` / `subscription_user`, Env: `PROFITBRICKS_USERNAME`
    pub username: String,

    /// Account password.
    /// Param: `password` / `subscription_password`, Env: `PROFITBRICKS_PASSWORD`
    pub password: String,

    /// Cloud API base URL.
    /// Param: `api_url`, Env: `PROFITBRICKS_API_URL` (default: "<https://api.ionos.com/cloudapi/v5>")
    pub api_url: String,

    /// HTTP request timeout in milliseconds.
    /// Env: `PROFITBRICKS_HTTP_TIMEOUT_MS` (default: 30000)
    pub timeout_ms: u64,

    /// Maximum number of retry attempts for reads.
    /// Env: `PROFITBRICKS_HTTP_RETRY_MAX` (default: 3)
    pub retry_max: u32,

    /// Initial backoff between read retries in milliseconds.
    /// Env: `PROFITBRICKS_HTTP_RETRY_BACKOFF_MS` (default: 500)
    pub retry_backoff_ms: u64,

    /// User agent for HTTP requests.
    /// Env: `PROFITBRICKS_USER_AGENT` (default: "profitbricks-modules/<version>")
    pub user_agent: String,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("retry_max", &self.retry_max)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ClientConfig {
    /// Build configuration from module parameters, falling back to the environment
    /// for anything the parameters leave out.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or a numeric variable is invalid.
    pub fn from_credentials(
        username: Option<String>,
        password: Option<String>,
        api_url: Option<String>,
    ) -> Result<Self, ApiError> {
        let _ = dotenvy::dotenv();

        let username = non_empty(username)
            .or_else(|| env_opt("PROFITBRICKS_USERNAME"))
            .ok_or(ApiError::MissingCredential {
                param: "username",
                env: "PROFITBRICKS_USERNAME",
            })?;
        let password = non_empty(password)
            .or_else(|| env_opt("PROFITBRICKS_PASSWORD"))
            .ok_or(ApiError::MissingCredential {
                param: "password",
                env: "PROFITBRICKS_PASSWORD",
            })?;
        let api_url = non_empty(api_url)
            .or_else(|| env_opt("PROFITBRICKS_API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            username,
            password,
            api_url,
            timeout_ms: parse_u64_env("PROFITBRICKS_HTTP_TIMEOUT_MS", 30_000)?,
            retry_max: parse_u32_env("PROFITBRICKS_HTTP_RETRY_MAX", 3)?,
            retry_backoff_ms: parse_u64_env("PROFITBRICKS_HTTP_RETRY_BACKOFF_MS", 500)?,
            user_agent: env_opt("PROFITBRICKS_USER_AGENT").unwrap_or_else(|| {
                format!("profitbricks-modules/{}", env!("CARGO_PKG_VERSION"))
            }),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }
}

/// HTTP implementation of `CloudApi`.
pub struct ProfitbricksClient {
    cfg: ClientConfig,
    http: reqwest::Client,
}

impl ProfitbricksClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(cfg: ClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(ApiError::Http)?;

        Ok(Self { cfg, http })
    }

    /// Get a reference to the current configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    /// GET a single resource; `None` on 404.
    async fn get_one<T: DeserializeOwned>(&self, path: &str) -> ApiResult<Option<T>> {
        let url = self.cfg.url(path);
        match self.get_with_retry(&url).await? {
            Some(body) => decode(body).map(Some),
            None => Ok(None),
        }
    }

    /// GET a collection, following `_links.next` until exhausted.
    async fn list_all<P: DeserializeOwned>(&self, path: &str) -> ApiResult<Vec<Resource<P>>> {
        let client = self;
        collect_pages(self.cfg.url(path), move |url| async move {
            client.get_with_retry(&url).await
        })
        .await
    }

    /// Send a mutating call and decode the returned resource.
    async fn mutate<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<Accepted<T>> {
        let (text, request_id) = self.send_once(method, path, body).await?;
        Ok(Accepted::new(decode(text)?, request_id))
    }

    /// Send a mutating call whose response body is irrelevant.
    async fn mutate_empty(&self, method: Method, path: &str) -> ApiResult<Option<String>> {
        let (_, request_id) = self.send_once(method, path, None).await?;
        Ok(request_id)
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<(String, Option<String>)> {
        let url = self.cfg.url(path);
        debug!(%method, %url, "cloud api call");

        let mut req = self
            .http
            .request(method, &url)
            .basic_auth(&self.cfg.username, Some(&self.cfg.password));
        if let Some(body) = &body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(ApiError::Http)?;
        let status = resp.status();
        let request_id = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(request_id_from_location);
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(ApiError::Api { status, body: text });
        }

        Ok((text, request_id))
    }

    /// GET with retry logic; `Ok(None)` on 404.
    async fn get_with_retry(&self, url: &str) -> ApiResult<Option<String>> {
        let http = &self.http;
        let cfg = &self.cfg;
        read_with_retry(
            url,
            cfg.retry_max,
            Duration::from_millis(cfg.retry_backoff_ms),
            move || async move {
                let resp = http
                    .get(url)
                    .basic_auth(&cfg.username, Some(&cfg.password))
                    .send()
                    .await?;
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                Ok::<_, reqwest::Error>((status, body))
            },
        )
        .await
    }
}

/// Concatenate the items of every page, starting at `first_url` and following
/// `_links.next`. A missing page is an `EmptyResponse`.
async fn collect_pages<P, F, Fut>(first_url: String, mut fetch: F) -> ApiResult<Vec<Resource<P>>>
where
    P: DeserializeOwned,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ApiResult<Option<String>>>,
{
    let mut items = Vec::new();
    let mut next = Some(first_url);

    while let Some(url) = next {
        let body = fetch(url).await?.ok_or(ApiError::EmptyResponse)?;
        let page: ListResponse<P> = decode(body)?;
        items.extend(page.items);
        next = page.links.and_then(|l| l.next);
    }

    Ok(items)
}

/// Run one GET attempt at a time until it succeeds, returns 404, or fails in a
/// way that is not retryable. At most `retry_max` retries.
async fn read_with_retry<F, Fut>(
    url: &str,
    retry_max: u32,
    first_backoff: Duration,
    mut send: F,
) -> ApiResult<Option<String>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(StatusCode, String), reqwest::Error>>,
{
    let mut attempt: u32 = 0;
    let mut backoff = first_backoff;

    loop {
        attempt = attempt.saturating_add(1);

        match send().await {
            Ok((status, body)) => {
                if status == StatusCode::NOT_FOUND {
                    return Ok(None);
                }

                if status.is_success() {
                    return Ok(Some(body));
                }

                if attempt <= retry_max && is_retryable_status(status) {
                    warn!(%url, %status, attempt, "retrying cloud api read");
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    continue;
                }

                return Err(ApiError::Api { status, body });
            }
            Err(e) => {
                if attempt <= retry_max && is_retryable_reqwest(&e) {
                    warn!(%url, error = %e, attempt, "retrying cloud api read");
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    continue;
                }

                return Err(ApiError::Http(e));
            }
        }
    }
}

#[async_trait]
impl CloudApi for ProfitbricksClient {
    async fn list_datacenters(&self) -> ApiResult<Vec<Datacenter>> {
        self.list_all("/datacenters?depth=1").await
    }

    async fn get_datacenter(&self, datacenter_id: &str) -> ApiResult<Option<Datacenter>> {
        self.get_one(&format!("/datacenters/{datacenter_id}?depth=1"))
            .await
    }

    async fn create_datacenter(
        &self,
        properties: &DatacenterProperties,
    ) -> ApiResult<Accepted<Datacenter>> {
        self.mutate(Method::POST, "/datacenters", Some(wrap(properties)?))
            .await
    }

    async fn update_datacenter(
        &self,
        datacenter_id: &str,
        properties: &DatacenterProperties,
    ) -> ApiResult<Accepted<Datacenter>> {
        self.mutate(
            Method::PATCH,
            &format!("/datacenters/{datacenter_id}"),
            Some(encode(properties)?),
        )
        .await
    }

    async fn delete_datacenter(&self, datacenter_id: &str) -> ApiResult<Option<String>> {
        self.mutate_empty(Method::DELETE, &format!("/datacenters/{datacenter_id}"))
            .await
    }

    async fn list_lans(&self, datacenter_id: &str) -> ApiResult<Vec<Lan>> {
        self.list_all(&format!("/datacenters/{datacenter_id}/lans?depth=1"))
            .await
    }

    async fn get_lan(&self, datacenter_id: &str, lan_id: &str) -> ApiResult<Option<Lan>> {
        self.get_one(&format!("/datacenters/{datacenter_id}/lans/{lan_id}?depth=1"))
            .await
    }

    async fn create_lan(
        &self,
        datacenter_id: &str,
        properties: &LanProperties,
    ) -> ApiResult<Accepted<Lan>> {
        self.mutate(
            Method::POST,
            &format!("/datacenters/{datacenter_id}/lans"),
            Some(wrap(properties)?),
        )
        .await
    }

    async fn update_lan(
        &self,
        datacenter_id: &str,
        lan_id: &str,
        properties: &LanProperties,
    ) -> ApiResult<Accepted<Lan>> {
        self.mutate(
            Method::PATCH,
            &format!("/datacenters/{datacenter_id}/lans/{lan_id}"),
            Some(encode(properties)?),
        )
        .await
    }

    async fn delete_lan(&self, datacenter_id: &str, lan_id: &str) -> ApiResult<Option<String>> {
        self.mutate_empty(
            Method::DELETE,
            &format!("/datacenters/{datacenter_id}/lans/{lan_id}"),
        )
        .await
    }

    async fn list_servers(&self, datacenter_id: &str) -> ApiResult<Vec<Server>> {
        self.list_all(&format!("/datacenters/{datacenter_id}/servers?depth=1"))
            .await
    }

    async fn get_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Option<Server>> {
        self.get_one(&format!(
            "/datacenters/{datacenter_id}/servers/{server_id}?depth=3"
        ))
        .await
    }

    async fn create_server(
        &self,
        datacenter_id: &str,
        server: &ServerCreate,
    ) -> ApiResult<Accepted<Server>> {
        self.mutate(
            Method::POST,
            &format!("/datacenters/{datacenter_id}/servers"),
            Some(encode(server)?),
        )
        .await
    }

    async fn update_server(
        &self,
        datacenter_id: &str,
        server_id: &str,
        properties: &ServerProperties,
    ) -> ApiResult<Accepted<Server>> {
        self.mutate(
            Method::PATCH,
            &format!("/datacenters/{datacenter_id}/servers/{server_id}"),
            Some(encode(properties)?),
        )
        .await
    }

    async fn delete_server(
        &self,
        datacenter_id: &str,
        server_id: &str,
    ) -> ApiResult<Option<String>> {
        self.mutate_empty(
            Method::DELETE,
            &format!("/datacenters/{datacenter_id}/servers/{server_id}"),
        )
        .await
    }

    async fn start_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Option<String>> {
        self.mutate_empty(
            Method::POST,
            &format!("/datacenters/{datacenter_id}/servers/{server_id}/start"),
        )
        .await
    }

    async fn stop_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Option<String>> {
        self.mutate_empty(
            Method::POST,
            &format!("/datacenters/{datacenter_id}/servers/{server_id}/stop"),
        )
        .await
    }

    async fn list_volumes(&self, datacenter_id: &str) -> ApiResult<Vec<Volume>> {
        self.list_all(&format!("/datacenters/{datacenter_id}/volumes?depth=1"))
            .await
    }

    async fn get_volume(&self, datacenter_id: &str, volume_id: &str) -> ApiResult<Option<Volume>> {
        self.get_one(&format!(
            "/datacenters/{datacenter_id}/volumes/{volume_id}?depth=1"
        ))
        .await
    }

    async fn create_volume(
        &self,
        datacenter_id: &str,
        properties: &VolumeProperties,
    ) -> ApiResult<Accepted<Volume>> {
        self.mutate(
            Method::POST,
            &format!("/datacenters/{datacenter_id}/volumes"),
            Some(wrap(properties)?),
        )
        .await
    }

    async fn update_volume(
        &self,
        datacenter_id: &str,
        volume_id: &str,
        properties: &VolumeProperties,
    ) -> ApiResult<Accepted<Volume>> {
        self.mutate(
            Method::PATCH,
            &format!("/datacenters/{datacenter_id}/volumes/{volume_id}"),
            Some(encode(properties)?),
        )
        .await
    }

    async fn delete_volume(
        &self,
        datacenter_id: &str,
        volume_id: &str,
    ) -> ApiResult<Option<String>> {
        self.mutate_empty(
            Method::DELETE,
            &format!("/datacenters/{datacenter_id}/volumes/{volume_id}"),
        )
        .await
    }

    async fn attach_volume(
        &self,
        datacenter_id: &str,
        server_id: &str,
        volume_id: &str,
    ) -> ApiResult<Accepted<Volume>> {
        let reference = ResourceRef {
            id: volume_id.to_string(),
        };
        self.mutate(
            Method::POST,
            &format!("/datacenters/{datacenter_id}/servers/{server_id}/volumes"),
            Some(encode(&reference)?),
        )
        .await
    }

    async fn list_nics(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Vec<Nic>> {
        self.list_all(&format!(
            "/datacenters/{datacenter_id}/servers/{server_id}/nics?depth=1"
        ))
        .await
    }

    async fn get_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        nic_id: &str,
    ) -> ApiResult<Option<Nic>> {
        self.get_one(&format!(
            "/datacenters/{datacenter_id}/servers/{server_id}/nics/{nic_id}?depth=1"
        ))
        .await
    }

    async fn create_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        properties: &NicProperties,
    ) -> ApiResult<Accepted<Nic>> {
        self.mutate(
            Method::POST,
            &format!("/datacenters/{datacenter_id}/servers/{server_id}/nics"),
            Some(wrap(properties)?),
        )
        .await
    }

    async fn update_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        nic_id: &str,
        properties: &NicProperties,
    ) -> ApiResult<Accepted<Nic>> {
        self.mutate(
            Method::PATCH,
            &format!("/datacenters/{datacenter_id}/servers/{server_id}/nics/{nic_id}"),
            Some(encode(properties)?),
        )
        .await
    }

    async fn delete_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        nic_id: &str,
    ) -> ApiResult<Option<String>> {
        self.mutate_empty(
            Method::DELETE,
            &format!("/datacenters/{datacenter_id}/servers/{server_id}/nics/{nic_id}"),
        )
        .await
    }

    async fn request_status(&self, request_id: &str) -> ApiResult<RequestStatus> {
        self.get_one(&format!("/requests/{request_id}/status"))
            .await?
            .ok_or(ApiError::EmptyResponse)
    }
}

// ============================================================================
// Wire helpers (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListResponse<P> {
    #[serde(default = "Vec::new")]
    items: Vec<Resource<P>>,
    #[serde(rename = "_links", default)]
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    #[serde(default)]
    next: Option<String>,
}

fn encode<T: Serialize + ?Sized>(value: &T) -> ApiResult<serde_json::Value> {
    serde_json::to_value(value).map_err(ApiError::Encode)
}

fn wrap<P: Serialize>(properties: &P) -> ApiResult<serde_json::Value> {
    encode(&NewResource { properties })
}

fn decode<T: DeserializeOwned>(body: String) -> ApiResult<T> {
    serde_json::from_str(&body).map_err(|source| ApiError::Json { source, body })
}

/// Extract the request id from a `Location` header such as
/// `https://api.ionos.com/cloudapi/v5/requests/<id>/status`.
#[must_use]
pub fn request_id_from_location(location: &str) -> Option<String> {
    let mut segments = location.trim_end_matches('/').rsplit('/');
    let last = segments.next()?;
    let candidate = if last == "status" {
        segments.next()?
    } else {
        last
    };
    let parent = segments.next()?;
    (parent == "requests" && !candidate.is_empty()).then(|| candidate.to_string())
}

// ============================================================================
// Error type
// ============================================================================

/// Error type for Cloud API client operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credential missing from both parameters and environment.
    #[error("missing credential: set the `{param}` parameter or the {env} env var")]
    MissingCredential {
        /// Module parameter name.
        param: &'static str,
        /// Environment variable name.
        env: &'static str,
    },
    /// Invalid environment variable value.
    #[error("invalid env var {key}: {reason}")]
    InvalidEnv {
        /// The environment variable key.
        key: &'static str,
        /// The reason for invalidity.
        reason: &'static str,
    },
    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[source] reqwest::Error),
    /// Request body could not be encoded.
    #[error("json encode error: {0}")]
    Encode(#[source] serde_json::Error),
    /// Response body could not be decoded.
    #[error("json decode error: {source}")]
    Json {
        /// The JSON parsing error.
        #[source]
        source: serde_json::Error,
        /// The response body.
        body: String,
    },
    /// API error response.
    #[error("api error: status={status}, body={body}")]
    Api {
        /// HTTP status code.
        status: StatusCode,
        /// Response body.
        body: String,
    },
    /// Empty response from server.
    #[error("empty response from server")]
    EmptyResponse,
}

// ============================================================================
// Helper functions
// ============================================================================

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn env_opt(key: &'static str) -> Option<String> {
    non_empty(env::var(key).ok())
}

fn parse_u32_env(key: &'static str, default: u32) -> Result<u32, ApiError> {
    env::var(key).map_or_else(
        |_| Ok(default),
        |v| {
            v.parse::<u32>().map_err(|_| ApiError::InvalidEnv {
                key,
                reason: "expected an unsigned integer",
            })
        },
    )
}

fn parse_u64_env(key: &'static str, default: u64) -> Result<u64, ApiError> {
    env::var(key).map_or_else(
        |_| Ok(default),
        |v| {
            v.parse::<u64>().map_err(|_| ApiError::InvalidEnv {
                key,
                reason: "expected an unsigned integer",
            })
        },
    )
}

#[inline]
const fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

#[inline]
fn is_retryable_reqwest(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request()
}

#[inline]
fn next_backoff(current: Duration) -> Duration {
    let next = current.saturating_mul(2);
    next.min(Duration::from_secs(10))
}
