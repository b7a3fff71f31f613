//! Request and response types for the Kawaii API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Top-level content category requested from the API.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Text content.
    Text,
    /// Still images.
    Image,
    /// Animated GIFs.
    Gif,
    /// Endpoint statistics.
    Stats,
}

impl Category {
    /// Path segment used for this category.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Text => "text",
            Category::Image => "image",
            Category::Gif => "gif",
            Category::Stats => "stats",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Category::Text),
            "image" => Ok(Category::Image),
            "gif" => Ok(Category::Gif),
            "stats" => Ok(Category::Stats),
            other => Err(Error::Config(format!("unknown category: {}", other))),
        }
    }
}

/// Format the API should answer in.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// A JSON object with a `response` or `error` field.
    #[default]
    Json,
    /// The raw URL as text.
    Txt,
}

impl ResponseType {
    /// Value sent in the `type` header.
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseType::Json => "json",
            ResponseType::Txt => "txt",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ResponseType::Json),
            "txt" => Ok(ResponseType::Txt),
            other => Err(Error::Config(format!("unknown response type: {}", other))),
        }
    }
}

/// Per-call overrides for [`Client::get`](crate::Client::get).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Response format for this call. Falls back to the client default.
    pub response_type: Option<ResponseType>,
    /// Filter entries placed before the client's default filter.
    pub filter: Vec<u32>,
}

impl GetOptions {
    /// Override the response format for this call.
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    /// Set the per-call filter entries.
    pub fn filter(mut self, filter: impl IntoIterator<Item = u32>) -> Self {
        self.filter = filter.into_iter().collect();
        self
    }
}

/// Body of a json-mode answer.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JsonResponse {
    pub response: Option<Value>,
    pub error: Option<Value>,
}

/// Concatenate per-call and client filters, per-call entries first.
pub(crate) fn merge_filters(request: &[u32], instance: &[u32]) -> Vec<u32> {
    request.iter().chain(instance).copied().collect()
}

/// Serialize a filter for the `filter` header: comma-joined decimals.
pub(crate) fn format_filter(filter: &[u32]) -> String {
    filter
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether characters 1 through 5 of a txt-mode body spell `https`.
///
/// The upstream wraps the URL in a single leading character.
pub(crate) fn has_https_marker(text: &str) -> bool {
    text.chars().skip(1).take(5).eq("https".chars())
}

/// Render a JSON field as a plain string; strings are not re-quoted.
pub(crate) fn value_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
