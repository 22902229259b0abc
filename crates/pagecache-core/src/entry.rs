//! Cache entry model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Response header listing the tags of a rendered page or route.
pub const CACHE_TAGS_HEADER: &str = "x-next-cache-tags";

/// The stored artifact, one variant per entry kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheValue {
    /// A rendered page.
    Page {
        /// Rendered HTML.
        html: String,
        /// Props payload of pages-router rendering.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page_data: Option<serde_json::Value>,
        /// Serialized component payload of app-router rendering.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rsc_payload: Option<String>,
        /// Response status.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
    /// A route handler response.
    Route {
        /// Response body.
        body: String,
        /// Response status.
        status: u16,
    },
    /// A cached data fetch.
    Fetch {
        /// Opaque fetch result.
        data: serde_json::Value,
    },
}

impl CacheValue {
    /// Kind name as written in the serialized entry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Page { .. } => "PAGE",
            Self::Route { .. } => "ROUTE",
            Self::Fetch { .. } => "FETCH",
        }
    }
}

/// The unit of storage.
///
/// Every `set` writes a full entry; entries are never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// The stored artifact.
    pub value: CacheValue,
    /// Response headers. Source of tags for pages and routes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Explicit tags. Only consulted for fetch results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Revalidation window in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revalidate: Option<u64>,
    /// Write time in epoch milliseconds.
    #[serde(default)]
    pub last_modified: i64,
}

impl CacheEntry {
    /// Create an entry around a value.
    pub fn new(value: CacheValue) -> Self {
        Self {
            value,
            headers: BTreeMap::new(),
            tags: Vec::new(),
            revalidate: None,
            last_modified: 0,
        }
    }

    /// Create a page entry.
    pub fn page(html: impl Into<String>) -> Self {
        Self::new(CacheValue::Page {
            html: html.into(),
            page_data: None,
            rsc_payload: None,
            status: None,
        })
    }

    /// Create a route entry.
    pub fn route(body: impl Into<String>, status: u16) -> Self {
        Self::new(CacheValue::Route {
            body: body.into(),
            status,
        })
    }

    /// Create a fetch-result entry.
    pub fn fetch(data: serde_json::Value) -> Self {
        Self::new(CacheValue::Fetch { data })
    }

    /// Attach the app-router component payload. No effect on non-page entries.
    pub fn with_rsc_payload(mut self, payload: impl Into<String>) -> Self {
        if let CacheValue::Page { rsc_payload, .. } = &mut self.value {
            *rsc_payload = Some(payload.into());
        }
        self
    }

    /// Attach pages-router props. No effect on non-page entries.
    pub fn with_page_data(mut self, data: serde_json::Value) -> Self {
        if let CacheValue::Page { page_data, .. } = &mut self.value {
            *page_data = Some(data);
        }
        self
    }

    /// Add a response header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the explicit tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the revalidation window.
    pub fn with_revalidate(mut self, seconds: u64) -> Self {
        self.revalidate = Some(seconds);
        self
    }

    /// Set the write time.
    pub fn with_last_modified(mut self, epoch_millis: i64) -> Self {
        self.last_modified = epoch_millis;
        self
    }

    /// Rendered HTML of a page entry.
    pub fn html(&self) -> Option<&str> {
        match &self.value {
            CacheValue::Page { html, .. } => Some(html),
            _ => None,
        }
    }

    /// Component payload of an app-router page entry.
    pub fn rsc_payload(&self) -> Option<&str> {
        match &self.value {
            CacheValue::Page { rsc_payload, .. } => rsc_payload.as_deref(),
            _ => None,
        }
    }

    /// Tags used for invalidation.
    ///
    /// Pages and routes take their tags from the tags response header; fetch
    /// results use the explicit field. The two sources are never mixed.
    pub fn derived_tags(&self) -> Vec<String> {
        match self.value {
            CacheValue::Page { .. } | CacheValue::Route { .. } => self
                .headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(CACHE_TAGS_HEADER))
                .map(|(_, value)| parse_tags_header(value))
                .unwrap_or_default(),
            CacheValue::Fetch { .. } => self.tags.clone(),
        }
    }
}

/// Split a comma-separated tags header.
pub fn parse_tags_header(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_tags_come_from_header() {
        let entry = CacheEntry::page("<html/>")
            .with_header("X-Next-Cache-Tags", "products, _N_T_/shop ,")
            .with_tags(["ignored"]);

        assert_eq!(entry.derived_tags(), vec!["products", "_N_T_/shop"]);
    }

    #[test]
    fn test_route_without_header_has_no_tags() {
        let entry = CacheEntry::route("{}", 200).with_tags(["ignored"]);
        assert!(entry.derived_tags().is_empty());
    }

    #[test]
    fn test_fetch_tags_come_from_field() {
        let entry = CacheEntry::fetch(json!({"id": 1}))
            .with_header(CACHE_TAGS_HEADER, "ignored")
            .with_tags(["product:1", "catalog"]);

        assert_eq!(entry.derived_tags(), vec!["product:1", "catalog"]);
    }

    #[test]
    fn test_serialized_shape() {
        let entry = CacheEntry::page("<p>hi</p>")
            .with_rsc_payload("0:[\"$\"]")
            .with_revalidate(60)
            .with_last_modified(1_700_000_000_000);

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["value"]["kind"], "PAGE");
        assert_eq!(value["value"]["html"], "<p>hi</p>");
        assert_eq!(value["value"]["rsc_payload"], "0:[\"$\"]");
        assert_eq!(value["revalidate"], 60);
        assert_eq!(value["lastModified"], 1_700_000_000_000i64);

        let back: CacheEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_accessors() {
        let page = CacheEntry::page("<p/>").with_rsc_payload("rsc");
        assert_eq!(page.html(), Some("<p/>"));
        assert_eq!(page.rsc_payload(), Some("rsc"));
        assert_eq!(page.value.kind(), "PAGE");

        let fetch = CacheEntry::fetch(json!(null)).with_rsc_payload("rsc");
        assert_eq!(fetch.html(), None);
        assert_eq!(fetch.rsc_payload(), None);
        assert_eq!(fetch.value.kind(), "FETCH");
    }
}
