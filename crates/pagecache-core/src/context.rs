//! Render context supplied by the host framework.

use std::collections::HashMap;

/// Header carrying the raw cookie string.
pub const COOKIE_HEADER: &str = "cookie";

/// Header carrying the raw user agent.
pub const USER_AGENT_HEADER: &str = "user-agent";

/// HTTP headers, keyed by lowercase name.
pub type Headers = HashMap<String, String>;

/// Per-request signals handed to the cache by the rendering framework.
///
/// The context is built once per request and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    /// Raw request headers.
    pub headers: Headers,
    /// Whether the page is rendered by the app router, which produces a
    /// separate component payload next to the HTML.
    pub app_router: bool,
}

impl RenderContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request header.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Mark the request as rendered by the app router.
    pub fn with_app_router(mut self, enabled: bool) -> Self {
        self.app_router = enabled;
        self
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.headers.get(name) {
            return Some(value.as_str());
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Raw `Cookie` header.
    pub fn cookie_header(&self) -> Option<&str> {
        self.header(COOKIE_HEADER)
    }

    /// Raw `User-Agent` header.
    pub fn user_agent(&self) -> Option<&str> {
        self.header(USER_AGENT_HEADER)
    }
}
