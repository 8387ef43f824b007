//! REST routes and their rate-limit keys

use chat_core::Snowflake;
use reqwest::Method;
use std::fmt;

/// Path segments whose following id is a major parameter
const MAJOR_RESOURCES: &[&str] = &["channels", "guilds", "webhooks"];

/// One REST call target: method plus path relative to the API base
///
/// Two keys are derived from it:
/// - the *bucket key*, shared by every route the server rate limits together
///   before it tells us otherwise (minor ids collapsed, major ids kept)
/// - the *resource key*, unique per concrete resource (used for 404 tracking)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    method: Method,
    path: String,
    bucket_key: String,
    major: String,
}

impl Route {
    pub fn new(method: Method, path: impl AsRef<str>) -> Self {
        let path = normalize(path.as_ref());
        let (bucket_key, major) = bucket_key(&method, &path);
        Self {
            method,
            path,
            bucket_key,
            major,
        }
    }

    pub fn get(path: impl AsRef<str>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl AsRef<str>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl AsRef<str>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl AsRef<str>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl AsRef<str>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path with a leading `/`, query included
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Key shared by routes limited together before discovery
    #[inline]
    pub fn bucket_key(&self) -> &str {
        &self.bucket_key
    }

    /// Major parameters, `:`-joined; combined with a server bucket hash
    #[inline]
    pub fn major_parameters(&self) -> &str {
        &self.major
    }

    /// Key of the concrete resource this route addresses
    pub fn resource_key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Collapse minor ids to `{id}` while keeping major ones
fn bucket_key(method: &Method, path: &str) -> (String, String) {
    let without_query = path.split('?').next().unwrap_or(path);
    let segments: Vec<&str> = without_query.split('/').filter(|s| !s.is_empty()).collect();

    let mut key = Vec::with_capacity(segments.len());
    let mut major = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        let previous = i.checked_sub(1).map(|p| segments[p]);

        if previous == Some("reactions") {
            // Everything below a message's reactions shares one bucket
            key.push("{reaction}");
            break;
        }

        if Snowflake::is_snowflake_segment(segment) {
            if previous.is_some_and(|p| MAJOR_RESOURCES.contains(&p)) {
                key.push(segment);
                major.push(*segment);
            } else {
                key.push("{id}");
            }
        } else if i >= 2 && segments[i - 2] == "webhooks" {
            // Webhook token; kept out of keys
            key.push("{token}");
        } else {
            key.push(segment);
        }
    }

    (format!("{method} /{}", key.join("/")), major.join(":"))
}
