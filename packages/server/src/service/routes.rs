//! Route table: registers endpoint descriptors and matches request paths
//! against their templates.
//!
//! Templates are relative to `<prefix>/:version`. Matching is segment-wise:
//! literal segments must be equal, `:name` segments capture one segment.
//! A trailing `.json`/`.txt` format suffix is ignored.

use std::sync::Arc;

use apigate_core::RouteDescriptor;
use axum::http::Method;

use super::config::ServerConfig;
use super::request::RouteParams;

const FORMAT_SUFFIXES: [&str; 2] = [".json", ".txt"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(&'static str),
    Param(&'static str),
}

fn parse_template(path: &'static str) -> Vec<Segment> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix(':') {
            Some(name) => Segment::Param(name),
            None => Segment::Literal(s),
        })
        .collect()
}

/// A descriptor together with its expanded template and caller id.
#[derive(Debug, Clone)]
pub struct RegisteredRoute {
    descriptor: RouteDescriptor,
    template: String,
    caller_id: Arc<str>,
    segments: Vec<Segment>,
}

impl RegisteredRoute {
    #[must_use]
    pub fn descriptor(&self) -> &RouteDescriptor {
        &self.descriptor
    }

    /// Full template, e.g. `/api/:version/projects/:id/issues`.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// `"<METHOD> <template>"`, e.g. `GET /api/:version/projects/:id/issues`.
    #[must_use]
    pub fn caller_id(&self) -> &Arc<str> {
        &self.caller_id
    }

    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    fn capture(&self, segments: &[&str]) -> Option<RouteParams> {
        if segments.len() != self.segments.len() {
            return None;
        }
        let mut params = RouteParams::new();
        for (pattern, actual) in self.segments.iter().zip(segments) {
            match pattern {
                Segment::Literal(literal) if literal == actual => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.insert(*name, *actual),
            }
        }
        Some(params)
    }
}

/// Outcome of matching a method and path.
#[derive(Debug)]
pub enum RouteLookup<'a> {
    Matched {
        route: &'a RegisteredRoute,
        params: RouteParams,
    },
    /// The path matched a template but no route is registered for the method.
    MethodNotAllowed {
        template: String,
        allowed: Vec<Method>,
    },
    NotFound,
}

/// Static registry of endpoint descriptors, built once at startup.
#[derive(Debug, Clone)]
pub struct RouteTable {
    prefix: String,
    versions: Vec<String>,
    routes: Vec<RegisteredRoute>,
}

impl RouteTable {
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            prefix: config.api_prefix.clone(),
            versions: config.api_versions.clone(),
            routes: Vec::new(),
        }
    }

    /// Registers a descriptor and returns its caller id, which doubles as
    /// the handler key.
    pub fn register(&mut self, descriptor: RouteDescriptor) -> Arc<str> {
        let template = format!("{}/:version{}", self.prefix, descriptor.path());
        let caller_id: Arc<str> = Arc::from(format!("{} {template}", descriptor.method()));
        let segments = parse_template(descriptor.path());
        self.routes.push(RegisteredRoute {
            descriptor,
            template,
            caller_id: Arc::clone(&caller_id),
            segments,
        });
        caller_id
    }

    /// Template logged for requests that match no route.
    #[must_use]
    pub fn catch_all_template(&self) -> String {
        format!("{}/:version/*path", self.prefix)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredRoute> {
        self.routes.iter()
    }

    /// Matches `method` and `path` against the registered routes.
    ///
    /// HEAD is served by GET routes. Among the templates registered for the
    /// method, the one with the most literal segments wins; a more literal
    /// template for another method does not shadow it.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> RouteLookup<'_> {
        let Some(rest) = path
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            return RouteLookup::NotFound;
        };

        let mut segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return RouteLookup::NotFound;
        }
        let version = segments.remove(0);
        if !self.versions.iter().any(|v| v == version) {
            return RouteLookup::NotFound;
        }
        if let Some(last) = segments.last_mut() {
            if let Some(stripped) = FORMAT_SUFFIXES.iter().find_map(|s| last.strip_suffix(s)) {
                *last = stripped;
            }
        }

        let mut candidates: Vec<(&RegisteredRoute, RouteParams)> = self
            .routes
            .iter()
            .filter_map(|route| route.capture(&segments).map(|params| (route, params)))
            .collect();
        if candidates.is_empty() {
            return RouteLookup::NotFound;
        }
        candidates.sort_by_key(|(route, _)| std::cmp::Reverse(route.literal_count()));

        let wanted = if *method == Method::HEAD {
            Method::GET
        } else {
            method.clone()
        };
        if let Some(index) = candidates
            .iter()
            .position(|(route, _)| *route.descriptor.method() == wanted)
        {
            let (route, params) = candidates.swap_remove(index);
            return RouteLookup::Matched { route, params };
        }

        let best_template = candidates[0].0.template.clone();
        let mut allowed: Vec<Method> = Vec::new();
        for (route, _) in &candidates {
            let method = route.descriptor.method();
            if !allowed.contains(method) {
                allowed.push(method.clone());
            }
        }
        if allowed.contains(&Method::GET) {
            allowed.push(Method::HEAD);
        }
        allowed.push(Method::OPTIONS);
        RouteLookup::MethodNotAllowed {
            template: best_template,
            allowed,
        }
    }
}
