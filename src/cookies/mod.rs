//! Cookie storage shared across hops and exchanges.
//!
//! # Responsibilities
//! - Parse `Set-Cookie` response header values (best effort, browser lenient)
//! - Upsert entries keyed by domain, path and name
//! - Serialize a `Cookie` header value for a target URI
//!
//! # Design Decisions
//! - Malformed values are skipped silently; well-formed siblings still land
//! - `Max-Age` takes precedence over `Expires`; a non-positive `Max-Age`
//!   removes the entry
//! - Concurrent store/read stays consistent per read-modify-write cycle

use axum::http::Uri;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use dashmap::DashMap;

/// A single stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie applies to, lowercased, without a leading dot.
    pub domain: String,
    /// Path the cookie applies to.
    pub path: String,
    /// Expiry instant; `None` for session cookies.
    pub expires: Option<DateTime<Utc>>,
    /// Only sent over https.
    pub secure: bool,
    /// Set when no `Domain` attribute widened the match to subdomains.
    pub host_only: bool,
}

impl Cookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    fn matches(&self, scheme: Option<&str>, host: &str, path: &str, now: DateTime<Utc>) -> bool {
        if self.is_expired(now) {
            return false;
        }
        if self.secure && scheme != Some("https") {
            return false;
        }
        domain_matches(host, self) && path_matches(path, &self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CookieKey {
    domain: String,
    path: String,
    name: String,
}

impl CookieKey {
    fn of(cookie: &Cookie) -> Self {
        Self {
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            name: cookie.name.clone(),
        }
    }
}

/// Thread-safe cookie jar keyed by domain, path and name.
#[derive(Debug, Default)]
pub struct CookieJar {
    entries: DashMap<CookieKey, Cookie>,
}

impl CookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `Set-Cookie` values against the request URI and upsert the
    /// results. Expired entries are removed; malformed values are skipped.
    pub fn store<I, S>(&self, uri: &Uri, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let now = Utc::now();
        for value in values {
            let value = value.as_ref();
            match parse_set_cookie(value, uri, now) {
                Some(cookie) if cookie.is_expired(now) => {
                    self.entries.remove(&CookieKey::of(&cookie));
                }
                Some(cookie) => {
                    self.entries.insert(CookieKey::of(&cookie), cookie);
                }
                None => {
                    tracing::debug!(value, "skipping malformed Set-Cookie value");
                }
            }
        }
    }

    /// Serialized `Cookie` header value for all entries matching the URI,
    /// most specific path first. `None` when nothing matches.
    pub fn cookie_header_for(&self, uri: &Uri) -> Option<String> {
        let cookies = self.cookies_for(uri);
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|cookie| format!("{}={}", cookie.name, cookie.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// The non-expired entries matching the URI, most specific path first.
    pub fn cookies_for(&self, uri: &Uri) -> Vec<Cookie> {
        let Some(host) = uri.host() else {
            return Vec::new();
        };
        let host = host.to_ascii_lowercase();
        let now = Utc::now();
        let mut cookies: Vec<Cookie> = self
            .entries
            .iter()
            .filter(|entry| entry.value().matches(uri.scheme_str(), &host, uri.path(), now))
            .map(|entry| entry.value().clone())
            .collect();
        cookies.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.name.cmp(&b.name)));
        cookies
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the jar holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn domain_matches(host: &str, cookie: &Cookie) -> bool {
    host == cookie.domain
        || (!cookie.host_only && host.ends_with(&format!(".{}", cookie.domain)))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path[cookie_path.len()..].starts_with('/')))
}

/// RFC 6265 default path: the request path up to, but not including, its
/// last `/`.
fn default_path(uri: &Uri) -> String {
    let path = uri.path();
    if !path.starts_with('/') {
        return "/".to_string();
    }
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

fn parse_set_cookie(value: &str, uri: &Uri, now: DateTime<Utc>) -> Option<Cookie> {
    let mut segments = value.split(';');

    let pair = segments.next()?;
    let (name, cookie_value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let cookie_value = cookie_value.trim().trim_matches('"');

    let mut cookie = Cookie {
        name: name.to_string(),
        value: cookie_value.to_string(),
        domain: uri.host()?.to_ascii_lowercase(),
        path: default_path(uri),
        expires: None,
        secure: false,
        host_only: true,
    };

    let mut max_age_seen = false;
    for segment in segments {
        let (attribute, attribute_value) = match segment.split_once('=') {
            Some((attribute, attribute_value)) => (attribute.trim(), attribute_value.trim()),
            None => (segment.trim(), ""),
        };
        match attribute.to_ascii_lowercase().as_str() {
            "domain" if !attribute_value.is_empty() => {
                cookie.domain = attribute_value
                    .trim_start_matches('.')
                    .to_ascii_lowercase();
                cookie.host_only = false;
            }
            "path" if attribute_value.starts_with('/') => {
                cookie.path = attribute_value.to_string();
            }
            "max-age" => {
                if let Ok(seconds) = attribute_value.parse::<i64>() {
                    cookie.expires = Some(now + Duration::seconds(seconds));
                    max_age_seen = true;
                }
            }
            "expires" if !max_age_seen => {
                if let Some(expires) = parse_http_date(attribute_value) {
                    cookie.expires = Some(expires);
                }
            }
            "secure" => cookie.secure = true,
            // HttpOnly, SameSite and unknown attributes are irrelevant to a
            // non-script jar.
            _ => {}
        }
    }

    Some(cookie)
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|date| date.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
                .map(|naive| naive.and_utc())
                .ok()
        })
}
