//! Source reference resolution.
//!
//! Turns an opaque reference string (a video page URL) into a canonical
//! source id and a start offset. Three URL shapes are recognised, tried in
//! this order: the watch page (`/watch?v=ID`), the short link (`/ID` on a
//! short-link host) and the embed page (`/embed/ID`, `/v/ID`, `/shorts/ID`).
//! The first shape that matches wins.
//!
//! Offsets come from the `t` (or `start`) query parameter, or a `t=` URL
//! fragment, and may be written as `90`, `90s`, `1m30s` or `1h2m3s`.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::OffsetPolicy;

/// Hosts serving watch and embed pages by default.
pub const DEFAULT_WATCH_HOSTS: &[&str] = &["youtube.com", "m.youtube.com", "music.youtube.com"];

/// Hosts serving short links by default.
pub const DEFAULT_SHORT_HOSTS: &[&str] = &["youtu.be"];

/// The URL form a reference was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReferenceShape {
    Watch,
    Short,
    Embed,
}

impl fmt::Display for ReferenceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReferenceShape::Watch => "watch",
            ReferenceShape::Short => "short",
            ReferenceShape::Embed => "embed",
        };
        f.write_str(name)
    }
}

/// A fully resolved reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReference {
    pub raw: String,
    pub source_id: String,
    pub start_offset: Duration,
    pub shape: ReferenceShape,
}

/// A reference that could not be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid reference '{raw}': {reason}")]
pub struct InvalidReference {
    pub raw: String,
    pub reason: String,
}

impl InvalidReference {
    fn new(raw: &str, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parses references against a configurable set of hosts.
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    watch_hosts: Vec<String>,
    short_hosts: Vec<String>,
    offset_policy: OffsetPolicy,
}

impl Default for ReferenceResolver {
    fn default() -> Self {
        Self::new(OffsetPolicy::default())
    }
}

impl ReferenceResolver {
    /// Resolver for the default host family.
    pub fn new(offset_policy: OffsetPolicy) -> Self {
        Self::with_hosts(DEFAULT_WATCH_HOSTS, DEFAULT_SHORT_HOSTS, offset_policy)
    }

    /// Resolver for origins other than the default family that use the same URL shapes.
    pub fn with_hosts(watch_hosts: &[&str], short_hosts: &[&str], offset_policy: OffsetPolicy) -> Self {
        let normalize = |hosts: &[&str]| -> Vec<String> {
            hosts.iter().map(|h| strip_www(&h.to_ascii_lowercase()).to_string()).collect()
        };
        Self {
            watch_hosts: normalize(watch_hosts),
            short_hosts: normalize(short_hosts),
            offset_policy,
        }
    }

    pub fn offset_policy(&self) -> OffsetPolicy {
        self.offset_policy
    }

    /// Resolves a raw reference. Never panics on malformed input.
    pub fn resolve(&self, raw: &str) -> Result<SourceReference, InvalidReference> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidReference::new(raw, "reference is empty"));
        }

        let url = parse_with_default_scheme(trimmed)
            .map_err(|e| InvalidReference::new(raw, format!("not a URL ({e})")))?;

        let host = url
            .host_str()
            .map(|h| strip_www(&h.to_ascii_lowercase()).to_string())
            .ok_or_else(|| InvalidReference::new(raw, "URL has no host"))?;

        let (source_id, shape) = self
            .match_shape(&url, &host)
            .ok_or_else(|| InvalidReference::new(raw, format!("unrecognised URL form for host '{host}'")))?;

        if !is_valid_source_id(&source_id) {
            return Err(InvalidReference::new(
                raw,
                format!("source id '{source_id}' contains invalid characters"),
            ));
        }

        let start_offset = match find_offset(&url) {
            Some(value) => parse_offset(&value).ok_or_else(|| {
                InvalidReference::new(raw, format!("malformed start offset '{value}'"))
            })?,
            None => match self.offset_policy {
                OffsetPolicy::DefaultZero => Duration::ZERO,
                OffsetPolicy::Require => {
                    return Err(InvalidReference::new(raw, "reference has no start offset"));
                }
            },
        };

        log::debug!(
            "Resolved '{}' as {} reference: id={}, offset={}s",
            trimmed,
            shape,
            source_id,
            start_offset.as_secs()
        );

        Ok(SourceReference {
            raw: raw.to_string(),
            source_id,
            start_offset,
            shape,
        })
    }

    fn match_shape(&self, url: &Url, host: &str) -> Option<(String, ReferenceShape)> {
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let is_watch_host = self.watch_hosts.iter().any(|h| h == host);
        let is_short_host = self.short_hosts.iter().any(|h| h == host);

        if is_watch_host && segments.first() == Some(&"watch") {
            if let Some(id) = query_value(url, "v") {
                return Some((id, ReferenceShape::Watch));
            }
        }

        if is_short_host && segments.len() == 1 {
            return Some((segments[0].to_string(), ReferenceShape::Short));
        }

        if is_watch_host && segments.len() >= 2 && matches!(segments[0], "embed" | "v" | "shorts") {
            return Some((segments[1].to_string(), ReferenceShape::Embed));
        }

        None
    }
}

fn parse_with_default_scheme(raw: &str) -> Result<Url, url::ParseError> {
    if raw.contains("://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("https://{raw}"))
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn find_offset(url: &Url) -> Option<String> {
    query_value(url, "t")
        .or_else(|| query_value(url, "start"))
        .or_else(|| {
            url.fragment().and_then(|fragment| {
                fragment
                    .split('&')
                    .find_map(|part| part.strip_prefix("t=").map(str::to_string))
            })
        })
}

/// Source ids are non-empty and use only `[A-Za-z0-9_-]`.
pub fn is_valid_source_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parses `90`, `90s`, `1m30s` or `1h2m3s` into a duration.
pub fn parse_offset(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut last_unit_rank = 0u8;
    for c in value.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let (multiplier, rank) = match c.to_ascii_lowercase() {
            'h' => (3600, 1),
            'm' => (60, 2),
            's' => (1, 3),
            _ => return None,
        };
        // Units must be present in h, m, s order, each at most once
        if digits.is_empty() || rank <= last_unit_rank {
            return None;
        }
        let amount: u64 = digits.parse().ok()?;
        total = total.checked_add(amount.checked_mul(multiplier)?)?;
        digits.clear();
        last_unit_rank = rank;
    }

    if !digits.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total))
}
