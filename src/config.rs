//! Client configuration and declarative stub definitions.
//!
//! [`ClientConfig`] is the snapshot of builder settings a client reports back
//! through its configuration getters. [`StubberConfig`] describes stubs in YAML
//! so whole fixtures can live next to the tests that use them.

use crate::body::DEFAULT_BODY_TIMEOUT;
use crate::error::{Error, Result};
use crate::matcher::{AndMatcher, BodyMatcher, HeaderMatcher, RequestMatcher, UriMatcher};
use crate::response::{Reply, StubResponse};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// HTTP protocol version reported by clients and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Version {
    #[serde(rename = "http1.1")]
    Http11,
    #[default]
    #[serde(rename = "http2")]
    Http2,
}

impl From<Version> for http::Version {
    fn from(version: Version) -> Self {
        match version {
            Version::Http11 => http::Version::HTTP_11,
            Version::Http2 => http::Version::HTTP_2,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Http11 => f.write_str("HTTP/1.1"),
            Version::Http2 => f.write_str("HTTP/2"),
        }
    }
}

/// Redirect policy, kept for introspection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Redirect {
    Never,
    Always,
    Normal,
}

/// A collaborator the stub only stores and hands back, such as a cookie store
/// or a TLS context. Compare with [`Arc::ptr_eq`].
pub type OpaqueValue = Arc<dyn Any + Send + Sync>;

/// Settings a built client reports through its configuration getters.
///
/// Nothing here changes how requests are answered, except
/// `body_read_timeout`, which bounds body capture for request dumps.
#[derive(Clone)]
pub struct ClientConfig {
    pub cookie_handler: Option<OpaqueValue>,
    pub connect_timeout: Option<Duration>,
    pub follow_redirects: Option<Redirect>,
    pub proxy: Option<Url>,
    pub ssl_context: Option<OpaqueValue>,
    pub ssl_parameters: Option<OpaqueValue>,
    pub authenticator: Option<OpaqueValue>,
    pub version: Option<Version>,
    pub priority: i32,
    pub executor: Option<tokio::runtime::Handle>,
    pub body_read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cookie_handler: None,
            connect_timeout: None,
            follow_redirects: None,
            proxy: None,
            ssl_context: None,
            ssl_parameters: None,
            authenticator: None,
            version: None,
            priority: 0,
            executor: None,
            body_read_timeout: DEFAULT_BODY_TIMEOUT,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("cookie_handler", &self.cookie_handler.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("follow_redirects", &self.follow_redirects)
            .field("proxy", &self.proxy.as_ref().map(Url::as_str))
            .field("ssl_context", &self.ssl_context.is_some())
            .field("ssl_parameters", &self.ssl_parameters.is_some())
            .field("authenticator", &self.authenticator.is_some())
            .field("version", &self.version)
            .field("priority", &self.priority)
            .field("executor", &self.executor.is_some())
            .field("body_read_timeout", &self.body_read_timeout)
            .finish()
    }
}

/// Root of a YAML stub file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StubberConfig {
    /// Client settings
    #[serde(default)]
    pub client: ClientSettings,

    /// Stubs, in matching order
    #[serde(default)]
    pub stubs: Vec<StubDefinition>,
}

impl StubberConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        debug!(path = %path.display(), stubs = config.stubs.len(), "Loaded stub configuration");
        Ok(config)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.client.validate()?;
        let mut seen = std::collections::HashSet::new();
        for (i, stub) in self.stubs.iter().enumerate() {
            stub.validate()
                .map_err(|e| anyhow::anyhow!("Stub {}: {}", i, e))?;
            if !seen.insert(stub.id.as_str()) {
                anyhow::bail!("Stub {}: duplicate id '{}'", i, stub.id);
            }
        }
        Ok(())
    }
}

/// Client settings that can be expressed in YAML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ClientSettings {
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,

    #[serde(default)]
    pub follow_redirects: Option<Redirect>,

    #[serde(default)]
    pub version: Option<Version>,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub proxy: Option<String>,

    /// Bound on request body capture for request dumps
    #[serde(default)]
    pub body_read_timeout_ms: Option<u64>,
}

impl ClientSettings {
    /// Validate the client settings.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.client_config()
            .map_err(|e| anyhow::anyhow!("Client settings: {}", e))?;
        Ok(())
    }

    pub fn body_read_timeout(&self) -> Duration {
        body_timeout(self.body_read_timeout_ms)
    }

    /// The client configuration these settings describe.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let proxy = self
            .proxy
            .as_deref()
            .map(|p| Url::parse(p).map_err(|e| Error::invalid_uri(p, e)))
            .transpose()?;
        Ok(ClientConfig {
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            follow_redirects: self.follow_redirects,
            proxy,
            version: self.version,
            priority: self.priority,
            body_read_timeout: self.body_read_timeout(),
            ..ClientConfig::default()
        })
    }
}

/// A single stub definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StubDefinition {
    /// Unique identifier for this stub
    pub id: String,

    /// Optional name/description
    #[serde(default)]
    pub name: Option<String>,

    /// Request matcher
    pub request: MatcherDefinition,

    /// Response to return
    #[serde(default)]
    pub response: ResponseDefinition,

    /// Failure simulation, replacing the response
    #[serde(default)]
    pub fault: Option<FaultConfig>,

    /// Whether this stub is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl StubDefinition {
    /// Validate the stub definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.is_empty() {
            anyhow::bail!("Stub id cannot be empty");
        }
        self.request.compile()?;
        if self.fault.is_none() {
            self.response.validate()?;
        }
        Ok(())
    }

    /// What the stub answers with.
    pub fn reply(&self) -> Result<Reply> {
        match self.fault {
            Some(FaultConfig::NetworkError) => Ok(Reply::NetworkError),
            None => Ok(Reply::Respond(self.response.to_response()?)),
        }
    }
}

/// Request matcher tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatcherDefinition {
    /// Exact URI
    Uri { uri: String },
    /// Header value, or header absence when `value` is omitted
    Header {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
    /// Exact body
    Body {
        value: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    /// Whole-body regex
    BodyRegex {
        pattern: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    /// All children must match
    And { matchers: Vec<MatcherDefinition> },
}

impl MatcherDefinition {
    /// Build the matcher. Body matchers wait `timeout_ms` for the request body,
    /// or the default body timeout when it is omitted.
    pub fn compile(&self) -> Result<Box<dyn RequestMatcher>> {
        let matcher: Box<dyn RequestMatcher> = match self {
            MatcherDefinition::Uri { uri } => Box::new(UriMatcher::new(uri)?),
            MatcherDefinition::Header { name, value } => {
                Box::new(HeaderMatcher::new(name, value.as_deref())?)
            }
            MatcherDefinition::Body { value, timeout_ms } => {
                Box::new(BodyMatcher::new(value.as_str()).with_timeout(body_timeout(*timeout_ms)))
            }
            MatcherDefinition::BodyRegex { pattern, timeout_ms } => {
                Box::new(BodyMatcher::regex(pattern)?.with_timeout(body_timeout(*timeout_ms)))
            }
            MatcherDefinition::And { matchers } => {
                let children = matchers
                    .iter()
                    .map(MatcherDefinition::compile)
                    .collect::<Result<Vec<_>>>()?;
                Box::new(AndMatcher::new(children)?)
            }
        };
        Ok(matcher)
    }
}

fn body_timeout(timeout_ms: Option<u64>) -> Duration {
    timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_BODY_TIMEOUT)
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers, applied after the body so they can override its content type
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Protocol version
    #[serde(default)]
    pub version: Option<Version>,
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        Self {
            status: default_status(),
            headers: HashMap::new(),
            body: None,
            version: None,
        }
    }
}

fn default_status() -> u16 {
    200
}

impl ResponseDefinition {
    /// Validate the response definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.status < 100 || self.status > 599 {
            anyhow::bail!("Invalid status code: {}", self.status);
        }
        if let Some(ResponseBody::Base64 { content }) = &self.body {
            decode_base64(content)?;
        }
        Ok(())
    }

    /// Build the stubbed response. File bodies are read here.
    pub fn to_response(&self) -> Result<StubResponse> {
        let mut response = StubResponse::new().status(self.status);
        response = match &self.body {
            None => response,
            Some(ResponseBody::Text { content }) => response.text(content.as_str()),
            Some(ResponseBody::Html { content }) => response.html(content.as_str()),
            Some(ResponseBody::Json { content }) => response.json(content.to_string()),
            Some(ResponseBody::Base64 { content }) => response.content(decode_base64(content)?),
            Some(ResponseBody::File { path }) => response.file(path)?,
        };
        for (name, value) in &self.headers {
            response = response.header(name, Some(value.as_str()))?;
        }
        if let Some(version) = self.version {
            response = response.set_version(version);
        }
        Ok(response)
    }
}

fn decode_base64(content: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(content)
        .map_err(|e| Error::invalid(format!("Invalid base64: {}", e)))
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// HTML body
    Html { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
    /// Load from file
    File { path: String },
}

/// Fault injection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultConfig {
    /// Fail the call as a transport error
    NetworkError,
}
