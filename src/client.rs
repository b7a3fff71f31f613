//! Main Kawaii client implementation.

use crate::error::{Error, Result, UNKNOWN_ERROR, UNKNOWN_URL};
use crate::types::*;
use crate::version::build_user_agent;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://kawaii.red/api/";
const DEFAULT_TOKEN: &str = "anonymous";
const DEFAULT_TIMEOUT_SECS: u64 = 3;

const TOKEN_HEADER: HeaderName = HeaderName::from_static("token");
const TYPE_HEADER: HeaderName = HeaderName::from_static("type");
const FILTER_HEADER: HeaderName = HeaderName::from_static("filter");

/// Builder for constructing a [`Client`].
pub struct ClientBuilder {
    token: String,
    base_url: String,
    response_type: ResponseType,
    filter: Vec<u32>,
    timeout: Duration,
    user_agent_suffix: Option<String>,
}

impl ClientBuilder {
    /// Create a builder with the anonymous token and default settings.
    pub fn new() -> Self {
        Self {
            token: DEFAULT_TOKEN.to_string(),
            base_url: DEFAULT_BASE_URL.trim_end_matches('/').to_string(),
            response_type: ResponseType::default(),
            filter: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent_suffix: None,
        }
    }

    /// Set the access token sent in the `token` header.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the default response format.
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Set the default filter, appended after any per-call filter.
    ///
    /// The upstream currently ignores this header.
    pub fn filter(mut self, filter: impl IntoIterator<Item = u32>) -> Self {
        self.filter = filter.into_iter().collect();
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the request timeout in whole seconds.
    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout(Duration::from_secs(secs))
    }

    /// Set a custom User-Agent suffix.
    pub fn user_agent_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.user_agent_suffix = Some(suffix.into());
        self
    }

    /// Build the client.
    ///
    /// No network session is opened here; see [`Client::ensure_ready`].
    pub fn build(self) -> Result<Client> {
        if self.token.is_empty() {
            return Err(Error::Config("token is required".into()));
        }
        if self.base_url.is_empty() {
            return Err(Error::Config("base URL is required".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".into()));
        }

        let base_url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL {}: {}", self.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "base URL cannot carry a path: {}",
                self.base_url
            )));
        }

        let mut token = HeaderValue::from_str(&self.token)
            .map_err(|_| Error::Config("token is not a valid header value".into()))?;
        token.set_sensitive(true);

        if !self.base_url.starts_with("https://") {
            warn!(
                base_url = %self.base_url,
                "API base URL is not using HTTPS. The token is sent in clear text."
            );
        }

        Ok(Client {
            token,
            base_url,
            response_type: self.response_type,
            filter: self.filter,
            timeout: self.timeout,
            user_agent: build_user_agent(self.user_agent_suffix.as_deref()),
            session: OnceCell::new(),
            sessions_created: AtomicUsize::new(0),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Client for the Kawaii API.
///
/// The underlying HTTP session is created on first use and shared by every
/// call made through this client, including concurrent ones.
///
/// # Example
///
/// ```rust,no_run
/// use kawaii::{Category, Client, GetOptions, ResponseType};
///
/// #[tokio::main]
/// async fn main() -> Result<(), kawaii::Error> {
///     let client = Client::builder().token("my-token").build()?;
///
///     let url = client.gif("hug").await?;
///     println!("{}", url);
///
///     let raw = client
///         .get(
///             Category::Image,
///             "smile",
///             GetOptions::default().response_type(ResponseType::Txt),
///         )
///         .await?;
///     println!("{}", raw);
///     Ok(())
/// }
/// ```
pub struct Client {
    token: HeaderValue,
    base_url: Url,
    response_type: ResponseType,
    filter: Vec<u32>,
    timeout: Duration,
    user_agent: String,
    session: OnceCell<reqwest::Client>,
    sessions_created: AtomicUsize,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create an anonymous client with default settings.
    pub fn new() -> Result<Self> {
        ClientBuilder::new().build()
    }

    /// Fetch `<base>/<category>/<sub>` and return the URL or response field.
    ///
    /// `sub` is sent as a single path segment; reserved characters such as
    /// `?`, `#` and `/` are percent-encoded.
    ///
    /// In json mode the `response` field of the body is returned. In txt
    /// mode the raw body is returned unchanged once it passes the `https`
    /// check. Both modes fail with [`Error::Api`] when the API rejects the
    /// request.
    pub async fn get(&self, category: Category, sub: &str, options: GetOptions) -> Result<String> {
        let response_type = options.response_type.unwrap_or(self.response_type);
        let filter = format_filter(&merge_filters(&options.filter, &self.filter));
        let url = endpoint_url(&self.base_url, category, sub)?;

        let session = self.session().await?;

        debug!(
            %category,
            sub,
            %response_type,
            filter = %filter,
            "Sending Kawaii API request"
        );

        let response = session
            .get(url.clone())
            .header(TOKEN_HEADER, self.token.clone())
            .header(TYPE_HEADER, HeaderValue::from_static(response_type.as_str()))
            .header(FILTER_HEADER, filter)
            .send()
            .await
            .map_err(Error::from_transport)?;

        match response_type {
            ResponseType::Json => {
                if !is_json_content_type(response.headers()) {
                    warn!(
                        status = %response.status(),
                        url = %url,
                        "Expected a JSON response"
                    );
                    return Err(Error::Api(UNKNOWN_URL.into()));
                }

                let body = response.bytes().await.map_err(Error::from_transport)?;
                let parsed: JsonResponse = serde_json::from_slice(&body)?;

                match parsed.response {
                    Some(value) => Ok(value_to_string(value)),
                    None => {
                        let message = parsed
                            .error
                            .map(value_to_string)
                            .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                        warn!(error = %message, url = %url, "Kawaii API returned an error");
                        Err(Error::Api(message))
                    }
                }
            }
            ResponseType::Txt => {
                let body = response.bytes().await.map_err(Error::from_transport)?;
                let text = String::from_utf8(body.to_vec())?;

                if !has_https_marker(&text) {
                    warn!(body = %text, url = %url, "Kawaii API returned a non-URL body");
                    return Err(Error::Api(text));
                }
                Ok(text)
            }
        }
    }

    /// Fetch from the `text` category with default options.
    pub async fn text(&self, sub: &str) -> Result<String> {
        self.get(Category::Text, sub, GetOptions::default()).await
    }

    /// Fetch from the `image` category with default options.
    pub async fn image(&self, sub: &str) -> Result<String> {
        self.get(Category::Image, sub, GetOptions::default()).await
    }

    /// Fetch from the `gif` category with default options.
    pub async fn gif(&self, sub: &str) -> Result<String> {
        self.get(Category::Gif, sub, GetOptions::default()).await
    }

    /// Fetch from the `stats` category with default options.
    pub async fn stats(&self, sub: &str) -> Result<String> {
        self.get(Category::Stats, sub, GetOptions::default()).await
    }

    /// Create the HTTP session if it does not exist yet.
    ///
    /// Idempotent and safe to call from several tasks at once: exactly one
    /// session is created.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.session().await.map(|_| ())
    }

    /// Whether the HTTP session has been created.
    pub fn is_ready(&self) -> bool {
        self.session.initialized()
    }

    /// Release the HTTP session and its pooled connections.
    ///
    /// A later request creates a fresh session.
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            debug!("Kawaii HTTP session released");
        }
    }

    /// The default response format.
    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    /// The default filter.
    pub fn filter(&self) -> &[u32] {
        &self.filter
    }

    /// The request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The API base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    // === Internal methods ===

    async fn session(&self) -> Result<&reqwest::Client> {
        self.session
            .get_or_try_init(|| async {
                let session = reqwest::Client::builder()
                    .timeout(self.timeout)
                    .user_agent(self.user_agent.as_str())
                    .build()
                    .map_err(Error::Http)?;
                let generation = self.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    generation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Kawaii HTTP session created"
                );
                Ok::<_, Error>(session)
            })
            .await
    }
}

/// Append the category and sub-category to the base URL as two path segments.
pub(crate) fn endpoint_url(base_url: &Url, category: Category, sub: &str) -> Result<Url> {
    // Dot segments would be dropped by the URL serializer.
    if matches!(sub, "." | "..") {
        return Err(Error::InvalidRequest(format!(
            "sub-category cannot be a dot segment: {:?}",
            sub
        )));
    }

    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("base URL cannot carry a path: {}", base_url)))?
        .pop_if_empty()
        .push(category.as_str())
        .push(sub);
    Ok(url)
}

/// Whether the response declares `application/json` or an `application/*+json` body.
fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json"
                || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_endpoint_url() {
        let base = Url::parse(DEFAULT_BASE_URL).unwrap();
        assert_eq!(
            endpoint_url(&base, Category::Gif, "hug").unwrap().as_str(),
            "https://kawaii.red/api/gif/hug"
        );
        assert_eq!(
            endpoint_url(&base, Category::Stats, "endpoints")
                .unwrap()
                .as_str(),
            "https://kawaii.red/api/stats/endpoints"
        );

        let trimmed = Url::parse("https://kawaii.red/api").unwrap();
        assert_eq!(
            endpoint_url(&trimmed, Category::Image, "smile")
                .unwrap()
                .as_str(),
            "https://kawaii.red/api/image/smile"
        );
    }

    #[test]
    fn test_endpoint_url_encodes_sub_as_one_segment() {
        let base = Url::parse(DEFAULT_BASE_URL).unwrap();

        let url = endpoint_url(&base, Category::Gif, "a?b").unwrap();
        assert_eq!(url.path(), "/api/gif/a%3Fb");
        assert_eq!(url.query(), None);

        let url = endpoint_url(&base, Category::Gif, "a#b").unwrap();
        assert_eq!(url.path(), "/api/gif/a%23b");
        assert_eq!(url.fragment(), None);

        let url = endpoint_url(&base, Category::Gif, "../stats/x").unwrap();
        assert_eq!(url.path(), "/api/gif/..%2Fstats%2Fx");

        for dots in [".", ".."] {
            assert!(matches!(
                endpoint_url(&base, Category::Gif, dots),
                Err(Error::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_builder_defaults() {
        let client = Client::new().unwrap();
        assert_eq!(client.base_url(), "https://kawaii.red/api");
        assert_eq!(client.response_type(), ResponseType::Json);
        assert!(client.filter().is_empty());
        assert_eq!(client.timeout(), Duration::from_secs(3));
        assert_eq!(client.token.to_str().unwrap(), "anonymous");
        assert!(!client.is_ready());
    }

    #[test]
    fn test_builder_trims_base_url() {
        let client = Client::builder()
            .base_url("http://localhost:8080/api///")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/api");
    }

    #[test]
    fn test_builder_validation() {
        assert!(matches!(
            Client::builder().token("").build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Client::builder().token("bad\ntoken").build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Client::builder().base_url("/").build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Client::builder().timeout(Duration::ZERO).build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Client::builder().base_url("not a url").build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Client::builder().base_url("mailto:api@kawaii.red").build(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_builder_timeout_secs() {
        let client = Client::builder().timeout_secs(10).build().unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_is_json_content_type() {
        let mut headers = HeaderMap::new();
        assert!(!is_json_content_type(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(is_json_content_type(&headers));

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        assert!(is_json_content_type(&headers));

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        assert!(is_json_content_type(&headers));

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/vnd.kawaii.v1+json; charset=utf-8"),
        );
        assert!(is_json_content_type(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        assert!(!is_json_content_type(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/x+json"));
        assert!(!is_json_content_type(&headers));
    }

    #[tokio::test]
    async fn test_ensure_ready_is_idempotent() {
        let mut client = Client::new().unwrap();
        client.ensure_ready().await.unwrap();
        client.ensure_ready().await.unwrap();
        assert!(client.is_ready());
        assert_eq!(client.sessions_created.load(Ordering::SeqCst), 1);

        client.close();
        assert!(!client.is_ready());

        client.ensure_ready().await.unwrap();
        assert_eq!(client.sessions_created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_share_one_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gif/hug"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "https://kawaii.red/hug.gif"}))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(8)
            .mount(&server)
            .await;

        let client = Arc::new(Client::builder().base_url(server.uri()).build().unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.gif("hug").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "https://kawaii.red/hug.gif");
        }
        assert_eq!(client.sessions_created.load(Ordering::SeqCst), 1);
    }
}
