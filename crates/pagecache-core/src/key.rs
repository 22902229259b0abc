//! Composite cache key derivation.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::KeyConfig;
use crate::context::RenderContext;

/// Separator between key components and between segment entries.
pub const KEY_SEPARATOR: &str = "-";

/// A composite cache key, derived once per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// The computed key string.
    key: String,
    /// Detected device class, when device splitting is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<DeviceType>,
    /// Components that make up the key (for debugging).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<String>,
}

impl CacheKey {
    /// Create a cache key from a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            device: None,
            components: Vec::new(),
        }
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Get the detected device class.
    pub fn device(&self) -> Option<DeviceType> {
        self.device
    }

    /// Get the key components (for debugging).
    pub fn components(&self) -> &[String] {
        &self.components
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Coarse device class used to split cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    SmartTv,
    Console,
    Wearable,
    Bot,
    Unknown,
}

impl DeviceType {
    /// Detect device type from User-Agent header.
    pub fn from_user_agent(ua: &str) -> Self {
        let ua_lower = ua.trim().to_lowercase();

        if ua_lower.is_empty() {
            return Self::Unknown;
        }

        if ua_lower.contains("bot")
            || ua_lower.contains("crawler")
            || ua_lower.contains("spider")
            || ua_lower.contains("slurp")
        {
            return Self::Bot;
        }

        if ["playstation", "xbox", "nintendo"]
            .iter()
            .any(|p| ua_lower.contains(p))
        {
            return Self::Console;
        }

        if ["smart-tv", "smarttv", "googletv", "appletv", "hbbtv", "roku", "crkey"]
            .iter()
            .any(|p| ua_lower.contains(p))
        {
            return Self::SmartTv;
        }

        if ua_lower.contains("watch") || ua_lower.contains("wear os") {
            return Self::Wearable;
        }

        if ["ipad", "tablet", "kindle", "silk/", "playbook"]
            .iter()
            .any(|p| ua_lower.contains(p))
        {
            return Self::Tablet;
        }

        // Android tablets omit the "Mobile" token.
        if ua_lower.contains("android") && !ua_lower.contains("mobile") {
            return Self::Tablet;
        }

        if ["mobi", "iphone", "ipod", "android", "windows phone", "blackberry", "opera mini"]
            .iter()
            .any(|p| ua_lower.contains(p))
        {
            return Self::Mobile;
        }

        Self::Desktop
    }

    /// Label contributed to the cache key. Desktop, bots and unknown
    /// agents share the unsplit entry.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::SmartTv => "smarttv",
            Self::Console => "console",
            Self::Wearable => "wearable",
            Self::Desktop | Self::Bot | Self::Unknown => "",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Desktop => write!(f, "desktop"),
            Self::Mobile => write!(f, "mobile"),
            Self::Tablet => write!(f, "tablet"),
            Self::SmartTv => write!(f, "smarttv"),
            Self::Console => write!(f, "console"),
            Self::Wearable => write!(f, "wearable"),
            Self::Bot => write!(f, "bot"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Builder for composite cache keys.
///
/// Reads the allow-lists from a shared [`KeyConfig`]; the builder itself
/// holds no state of its own.
#[derive(Debug, Clone, Copy)]
pub struct KeyBuilder<'a> {
    keys: &'a KeyConfig,
}

impl<'a> KeyBuilder<'a> {
    /// Create a builder over the configured allow-lists.
    pub fn new(keys: &'a KeyConfig) -> Self {
        Self { keys }
    }

    /// Classify the user agent, when device splitting is enabled.
    pub fn device(&self, user_agent: Option<&str>) -> Option<DeviceType> {
        if !self.keys.device_split {
            return None;
        }
        Some(DeviceType::from_user_agent(user_agent.unwrap_or_default()))
    }

    /// Cookie segment for a raw `Cookie` header.
    pub fn cookie_segment(&self, raw_cookie_header: Option<&str>) -> String {
        build_cookie_segment(raw_cookie_header.unwrap_or_default(), &self.keys.cookies)
    }

    /// Query segment for the raw query signal.
    pub fn query_segment(&self, raw_query: Option<&str>) -> String {
        build_query_segment(raw_query, &self.keys.query)
    }

    /// Build the composite key for a request.
    pub fn build(&self, ctx: &RenderContext) -> CacheKey {
        let device = self.device(ctx.user_agent());
        let device_label = device.map(|d| d.label()).unwrap_or_default();
        let cookie = self.cookie_segment(ctx.cookie_header());
        let query = self.query_segment(ctx.header(&self.keys.query_header));

        let mut components = vec![format!("base:{}", self.keys.base_name)];
        if let Some(device) = device {
            components.push(format!("device:{}", device));
        }
        if !cookie.is_empty() {
            components.push(cookie.clone());
        }
        if !query.is_empty() {
            components.push(query.clone());
        }

        CacheKey {
            key: composite(&self.keys.base_name, device_label, &cookie, &query),
            device,
            components,
        }
    }
}

/// Join the non-empty key components with `-`.
pub fn composite(base_key: &str, device_label: &str, cookie_segment: &str, query_segment: &str) -> String {
    [base_key, device_label, cookie_segment, query_segment]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

/// Build the `cookie(...)` segment from a raw cookie header.
///
/// Allowed names are visited in configured order; names that are absent or
/// carry an empty value contribute nothing.
pub fn build_cookie_segment(raw_cookie_header: &str, allowed: &[String]) -> String {
    if allowed.is_empty() || raw_cookie_header.trim().is_empty() {
        return String::new();
    }

    let cookies = parse_cookie_header(raw_cookie_header);
    let pairs: Vec<String> = allowed
        .iter()
        .filter_map(|name| {
            cookies
                .get(name)
                .filter(|value| !value.is_empty())
                .map(|value| format!("{}={}", name, escape_segment_value(value)))
        })
        .collect();

    wrap_segment("cookie", &pairs)
}

/// Build the `query(...)` segment from the URL-encoded JSON query signal.
///
/// A missing or unparsable signal yields an empty segment and a warning;
/// it never fails the request.
pub fn build_query_segment(raw_query: Option<&str>, allowed: &[String]) -> String {
    if allowed.is_empty() {
        return String::new();
    }

    let Some(raw) = raw_query.filter(|raw| !raw.trim().is_empty()) else {
        tracing::warn!("query signal missing, query segment left empty");
        return String::new();
    };

    let params = match parse_query_signal(raw) {
        Ok(params) => params,
        Err(reason) => {
            tracing::warn!(%reason, "unparsable query signal, query segment left empty");
            return String::new();
        }
    };

    let pairs: Vec<String> = allowed
        .iter()
        .filter_map(|name| {
            params
                .get(name)
                .and_then(query_value)
                .map(|value| format!("{}={}", name, escape_segment_value(&value)))
        })
        .collect();

    wrap_segment("query", &pairs)
}

/// Parse a raw `Cookie` header into a name → value map.
///
/// The first occurrence of a name wins. Values are unquoted and
/// percent-decoded; pairs without `=` are ignored.
pub fn parse_cookie_header(raw: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();

    for pair in raw.split(';') {
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || cookies.contains_key(name) {
            continue;
        }

        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        let decoded = percent_decode_str(value).decode_utf8_lossy().into_owned();

        cookies.insert(name.to_string(), decoded);
    }

    cookies
}

fn parse_query_signal(raw: &str) -> Result<serde_json::Map<String, Value>, String> {
    let decoded = percent_decode_str(raw.trim())
        .decode_utf8()
        .map_err(|e| e.to_string())?;

    match serde_json::from_str::<Value>(&decoded).map_err(|e| e.to_string())? {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, got {}", json_type(&other))),
    }
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(query_value).collect();
            (!parts.is_empty()).then(|| parts.join(","))
        }
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// A `/` inside a segment would add a storage path level.
fn escape_segment_value(value: &str) -> String {
    value.replace('/', "%2F")
}

fn wrap_segment(name: &str, pairs: &[String]) -> String {
    if pairs.is_empty() {
        String::new()
    } else {
        format!("{}({})", name, pairs.join(KEY_SEPARATOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cookie_segment_allowed_cookie() {
        let segment = build_cookie_segment("locale=fr; session=abc", &names(&["locale"]));
        assert_eq!(segment, "cookie(locale=fr)");
    }

    #[test]
    fn test_cookie_segment_no_allowed_cookie_present() {
        let segment = build_cookie_segment("session=abc", &names(&["locale"]));
        assert_eq!(segment, "");
    }

    #[test]
    fn test_cookie_segment_follows_allow_list_order() {
        let allowed = names(&["locale", "currency"]);
        let a = build_cookie_segment("currency=eur; session=1; locale=fr", &allowed);
        let b = build_cookie_segment("session=2; locale=fr; theme=dark; currency=eur", &allowed);

        assert_eq!(a, "cookie(locale=fr-currency=eur)");
        assert_eq!(a, b);
    }

    #[test]
    fn test_cookie_segment_skips_empty_values() {
        let segment = build_cookie_segment("locale=; currency=usd", &names(&["locale", "currency"]));
        assert_eq!(segment, "cookie(currency=usd)");
    }

    #[test]
    fn test_cookie_segment_escapes_slashes() {
        let segment = build_cookie_segment("region=eu%2Fwest", &names(&["region"]));
        assert_eq!(segment, "cookie(region=eu%2Fwest)");
    }

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header(r#"a=1; b="quoted"; c=hello%20world; a=2; junk"#);

        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
        assert_eq!(cookies.get("b").map(String::as_str), Some("quoted"));
        assert_eq!(cookies.get("c").map(String::as_str), Some("hello world"));
        assert!(!cookies.contains_key("junk"));
    }

    #[test]
    fn test_query_segment() {
        let raw = "%7B%22page%22%3A%222%22%2C%22sort%22%3A%22price%22%2C%22utm%22%3A%22x%22%7D";
        let segment = build_query_segment(Some(raw), &names(&["sort", "page"]));
        assert_eq!(segment, "query(sort=price-page=2)");
    }

    #[test]
    fn test_query_segment_value_kinds() {
        let raw = r#"{"n":3,"flag":true,"tags":["a","b"],"empty":"","none":null}"#;
        let segment = build_query_segment(Some(raw), &names(&["n", "flag", "tags", "empty", "none"]));
        assert_eq!(segment, "query(n=3-flag=true-tags=a,b)");
    }

    #[test]
    fn test_query_segment_unparsable_is_empty() {
        assert_eq!(build_query_segment(Some("%7Bnot-json"), &names(&["page"])), "");
        assert_eq!(build_query_segment(Some("[1,2]"), &names(&["page"])), "");
        assert_eq!(build_query_segment(None, &names(&["page"])), "");
    }

    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` and return what it logged at WARN and above.
    fn captured_warnings(f: impl FnOnce()) -> String {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || SharedBuffer(writer.clone()))
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, f);

        let bytes = buffer.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_query_segment_warns_on_bad_signal() {
        let logs = captured_warnings(|| {
            assert_eq!(build_query_segment(Some("%7Bnot-json"), &names(&["page"])), "");
        });
        assert!(logs.contains("WARN"));
        assert!(logs.contains("unparsable query signal"));
        assert!(logs.contains("reason="));

        let logs = captured_warnings(|| {
            assert_eq!(build_query_segment(None, &names(&["page"])), "");
        });
        assert!(logs.contains("query signal missing"));
    }

    #[test]
    fn test_query_segment_quiet_when_nothing_is_allowed() {
        let logs = captured_warnings(|| {
            assert_eq!(build_query_segment(None, &[]), "");
        });
        assert_eq!(logs, "");
    }

    #[test]
    fn test_query_segment_without_allow_list() {
        assert_eq!(build_query_segment(Some(r#"{"page":"2"}"#), &[]), "");
    }

    #[test]
    fn test_composite_all_empty_equals_base() {
        assert_eq!(composite("index", "", "", ""), "index");
    }

    #[test]
    fn test_composite_skips_empty_parts() {
        assert_eq!(
            composite("index", "", "cookie(locale=fr)", "query(page=2)"),
            "index-cookie(locale=fr)-query(page=2)"
        );
        assert_eq!(composite("index", "mobile", "", ""), "index-mobile");
    }

    #[test]
    fn test_device_type_detection() {
        assert_eq!(
            DeviceType::from_user_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148"),
            DeviceType::Mobile
        );
        assert_eq!(
            DeviceType::from_user_agent("Mozilla/5.0 (Linux; Android 14; Pixel 8) Mobile Safari/537.36"),
            DeviceType::Mobile
        );
        assert_eq!(
            DeviceType::from_user_agent("Mozilla/5.0 (Linux; Android 13; SM-X700) Safari/537.36"),
            DeviceType::Tablet
        );
        assert_eq!(
            DeviceType::from_user_agent("Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X)"),
            DeviceType::Tablet
        );
        assert_eq!(
            DeviceType::from_user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0"),
            DeviceType::Desktop
        );
        assert_eq!(
            DeviceType::from_user_agent("Googlebot/2.1 (+http://www.google.com/bot.html)"),
            DeviceType::Bot
        );
        assert_eq!(DeviceType::from_user_agent(""), DeviceType::Unknown);
    }

    #[test]
    fn test_device_labels() {
        assert_eq!(DeviceType::Mobile.label(), "mobile");
        assert_eq!(DeviceType::Tablet.label(), "tablet");
        assert_eq!(DeviceType::Desktop.label(), "");
        assert_eq!(DeviceType::Unknown.label(), "");
    }

    #[test]
    fn test_build_from_context() {
        let keys = KeyConfig {
            cookies: names(&["locale"]),
            query: names(&["page"]),
            device_split: true,
            ..KeyConfig::default()
        };
        let ctx = RenderContext::new()
            .with_header("cookie", "locale=fr; session=abc")
            .with_header("user-agent", "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Mobile")
            .with_header("x-cache-query", "%7B%22page%22%3A%222%22%7D");

        let key = KeyBuilder::new(&keys).build(&ctx);

        assert_eq!(key.as_str(), "index-mobile-cookie(locale=fr)-query(page=2)");
        assert_eq!(key.device(), Some(DeviceType::Mobile));
        assert_eq!(key.components().len(), 4);
    }

    #[test]
    fn test_build_without_device_split() {
        let keys = KeyConfig::default();
        let ctx = RenderContext::new()
            .with_header("user-agent", "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Mobile");

        let key = KeyBuilder::new(&keys).build(&ctx);

        assert_eq!(key.as_str(), "index");
        assert_eq!(key.device(), None);
    }

    #[test]
    fn test_build_desktop_with_device_split() {
        let keys = KeyConfig {
            device_split: true,
            ..KeyConfig::default()
        };
        let ctx = RenderContext::new()
            .with_header("user-agent", "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) Safari/605.1.15");

        let key = KeyBuilder::new(&keys).build(&ctx);

        assert_eq!(key.as_str(), "index");
        assert_eq!(key.device(), Some(DeviceType::Desktop));
    }
}
