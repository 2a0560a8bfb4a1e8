use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::NavigationError;

pub type Params = IndexMap<String, String>;

/// One entry of the back stack.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub route_params: Params,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub query_params: Params,
    /// Whatever the link that led here carried (title, origin, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_info: Option<serde_json::Value>,
}

impl Location {
    /// Splits `"/users/42?tab=info&x"` into path and query parameters. A
    /// query key without `=` maps to the empty string.
    pub fn parse(url: &str) -> Self {
        let (path, query) = match url.split_once('?') {
            Some((p, q)) => (p, q),
            None => (url, ""),
        };
        let query_params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Location {
            path: normalize(path),
            query_params,
            ..Location::default()
        }
    }

    pub fn with_link_info(mut self, info: serde_json::Value) -> Self {
        self.link_info = Some(info);
        self
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".into()
    } else if trimmed.starts_with('/') {
        trimmed.into()
    } else {
        format!("/{trimmed}")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Rest(String),
}

/// `/users/:id/*rest`-style route. `:name` matches one segment, `*name`
/// (last only) the remainder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutePattern {
    source: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn new(pattern: &str) -> Result<Self, NavigationError> {
        let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(':') {
                Segment::Param(name.to_string())
            } else if let Some(name) = part.strip_prefix('*') {
                if i + 1 != parts.len() {
                    return Err(NavigationError::InvalidPattern(pattern.to_string()));
                }
                Segment::Rest(name.to_string())
            } else {
                Segment::Literal(part.to_string())
            };
            if matches!(&segment, Segment::Param(n) | Segment::Rest(n) if n.is_empty()) {
                return Err(NavigationError::InvalidPattern(pattern.to_string()));
            }
            segments.push(segment);
        }
        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Route parameters if `path` matches.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Params::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(l) => {
                    if parts.get(i) != Some(&l.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), (*parts.get(i)?).to_string());
                }
                Segment::Rest(name) => {
                    params.insert(name.clone(), parts[i.min(parts.len())..].join("/"));
                    return Some(params);
                }
            }
        }
        (parts.len() == self.segments.len()).then_some(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_query() {
        let l = Location::parse("users/42/?tab=info&flag");
        assert_eq!(l.path, "/users/42");
        assert_eq!(l.query_params["tab"], "info");
        assert_eq!(l.query_params["flag"], "");
        assert_eq!(Location::parse("").path, "/");
    }

    #[test]
    fn patterns_bind_params() {
        let p = RoutePattern::new("/users/:id").unwrap();
        assert_eq!(p.matches("/users/42").unwrap()["id"], "42");
        assert!(p.matches("/users").is_none());
        assert!(p.matches("/users/42/edit").is_none());
        assert!(p.matches("/teams/42").is_none());

        let rest = RoutePattern::new("/docs/*page").unwrap();
        assert_eq!(rest.matches("/docs/a/b").unwrap()["page"], "a/b");
        assert_eq!(rest.matches("/docs").unwrap()["page"], "");
    }

    #[test]
    fn rest_must_come_last() {
        assert!(RoutePattern::new("/*all/more").is_err());
        assert!(RoutePattern::new("/users/:").is_err());
    }
}
