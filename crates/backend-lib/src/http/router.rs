// crates/backend-lib/src/http/router.rs

//! Method + path route table.
//!
//! Patterns are split on `/`. A segment written `:name` captures the request
//! segment under `name`; every other segment must match literally and the
//! segment counts must be equal. Param-free patterns resolve through a hash
//! lookup, patterns with params are tried in registration order.
use axum::http::Method;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Handler, Middleware};

/// A registered route
pub struct Route {
    pub method: Method,
    pub pattern: String,
    segments: Vec<Segment>,
    pub handler: Arc<dyn Handler>,
    /// Route-specific middleware, run after the global chain
    pub middlewares: Vec<Arc<dyn Middleware>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A route matched against a concrete path
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

#[derive(Default)]
struct MethodTable {
    exact: HashMap<String, Route>,
    dynamic: Vec<Route>,
}

/// Route table plus the global middleware chain
#[derive(Default)]
pub struct Router {
    tables: HashMap<Method, MethodTable>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn normalize(path: &str) -> String {
    let joined = split(path).collect::<Vec<_>>().join("/");
    format!("/{joined}")
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    split(pattern)
        .map(|s| match s.strip_prefix(':') {
            Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
            _ => Segment::Literal(s.to_string()),
        })
        .collect()
}

impl Route {
    fn capture(&self, path: &[&str]) -> Option<HashMap<String, String>> {
        if path.len() != self.segments.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (segment, value) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(lit) if lit == value => {},
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*value).to_string());
                },
            }
        }
        Some(params)
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware that runs for every request
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }

    /// Register a route. Registering the same method and pattern again replaces it.
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Arc<dyn Handler>,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> &mut Self {
        let segments = parse_pattern(pattern);
        let is_dynamic = segments.iter().any(|s| matches!(s, Segment::Param(_)));
        let route = Route {
            method: method.clone(),
            pattern: normalize(pattern),
            segments,
            handler,
            middlewares,
        };

        let table = self.tables.entry(method).or_default();
        if is_dynamic {
            match table.dynamic.iter_mut().find(|r| r.segments == route.segments) {
                Some(existing) => *existing = route,
                None => table.dynamic.push(route),
            }
        } else {
            table.exact.insert(route.pattern.clone(), route);
        }
        self
    }

    pub fn get(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> &mut Self {
        self.route(Method::GET, pattern, handler, middlewares)
    }

    pub fn post(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> &mut Self {
        self.route(Method::POST, pattern, handler, middlewares)
    }

    pub fn put(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> &mut Self {
        self.route(Method::PUT, pattern, handler, middlewares)
    }

    pub fn delete(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> &mut Self {
        self.route(Method::DELETE, pattern, handler, middlewares)
    }

    pub fn head(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> &mut Self {
        self.route(Method::HEAD, pattern, handler, middlewares)
    }

    /// Find the route for `method` and `path`, with captured params
    pub fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let table = self.tables.get(method)?;

        if let Some(route) = table.exact.get(&normalize(path)) {
            return Some(RouteMatch {
                route,
                params: HashMap::new(),
            });
        }

        let segments: Vec<&str> = split(path).collect();
        table.dynamic.iter().find_map(|route| {
            route
                .capture(&segments)
                .map(|params| RouteMatch { route, params })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{handler_fn, middleware_fn, ResponseContext};
    use axum::http::StatusCode;
    use lms_common::MessageResponse;

    fn reply(message: &'static str) -> Arc<dyn Handler> {
        handler_fn(move |_req, res: &mut ResponseContext| {
            res.json(StatusCode::OK, &MessageResponse::new(message))
        })
    }

    #[test]
    fn test_exact_match() {
        let mut router = Router::new();
        router.post("/auth/login", reply("login"), vec![]);

        let found = router.resolve(&Method::POST, "/auth/login").unwrap();
        assert_eq!(found.route.pattern, "/auth/login");
        assert!(found.params.is_empty());

        // Empty segments are ignored
        assert!(router.resolve(&Method::POST, "/auth/login/").is_some());
        assert!(router.resolve(&Method::POST, "//auth//login").is_some());

        assert!(router.resolve(&Method::GET, "/auth/login").is_none());
        assert!(router.resolve(&Method::POST, "/auth").is_none());
        assert!(router.resolve(&Method::POST, "/auth/login/extra").is_none());
    }

    #[test]
    fn test_param_capture() {
        let mut router = Router::new();
        router.get("/lms/lesson/:courseSlug/:lessonSlug", reply("lesson"), vec![]);

        let found = router
            .resolve(&Method::GET, "/lms/lesson/javascript-completo/variaveis")
            .unwrap();
        assert_eq!(found.params.get("courseSlug").unwrap(), "javascript-completo");
        assert_eq!(found.params.get("lessonSlug").unwrap(), "variaveis");

        assert!(router.resolve(&Method::GET, "/lms/lesson/javascript-completo").is_none());
        assert!(router.resolve(&Method::GET, "/lms/lesson/a/b/c").is_none());
        assert!(router.resolve(&Method::GET, "/lms/course/a/b").is_none());
    }

    #[test]
    fn test_first_registered_dynamic_route_wins() {
        let mut router = Router::new();
        router.get("/courses/:slug", reply("first"), vec![]);
        router.get("/courses/:id", reply("second"), vec![]);
        router.get("/:section/:slug", reply("third"), vec![]);

        let found = router.resolve(&Method::GET, "/courses/rust").unwrap();
        assert_eq!(found.route.pattern, "/courses/:slug");
        assert_eq!(found.params.get("slug").unwrap(), "rust");

        let found = router.resolve(&Method::GET, "/lessons/rust").unwrap();
        assert_eq!(found.route.pattern, "/:section/:slug");
    }

    #[test]
    fn test_exact_route_beats_dynamic() {
        let mut router = Router::new();
        router.get("/courses/:slug", reply("dynamic"), vec![]);
        router.get("/courses/new", reply("exact"), vec![]);

        let found = router.resolve(&Method::GET, "/courses/new").unwrap();
        assert_eq!(found.route.pattern, "/courses/new");
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut router = Router::new();
        router.get("/a/:x", reply("one"), vec![]);
        router.get("/a/:x", reply("two"), vec![middleware_fn(|_, _| Ok(()))]);

        let found = router.resolve(&Method::GET, "/a/1").unwrap();
        assert_eq!(found.route.middlewares.len(), 1);
    }

    #[test]
    fn test_methods_are_separate() {
        let mut router = Router::new();
        router.get("/item", reply("get"), vec![]);
        router.put("/item", reply("put"), vec![]);
        router.delete("/item", reply("delete"), vec![]);
        router.head("/item", reply("head"), vec![]);

        for method in [Method::GET, Method::PUT, Method::DELETE, Method::HEAD] {
            let found = router.resolve(&method, "/item").unwrap();
            assert_eq!(found.route.method, method);
        }
        assert!(router.resolve(&Method::PATCH, "/item").is_none());
    }
}
