//! Back stack navigation and the routing state layer.
//!
//! A [`Navigator`] keeps a stack of [`Location`]s. The top entry becomes the
//! routing layer every container sees: `$pathname`, `$routeParams`,
//! `$queryParams` and `$linkInfo`. The stack survives restarts through
//! [`Navigator::to_json`] / [`Navigator::from_json`].

mod location;

pub use location::{Location, Params, RoutePattern};

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use strata_core::{Object, StateKey, StateMap, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("invalid route pattern '{0}'")]
    InvalidPattern(String),

    #[error("back stack JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("a back stack cannot be empty")]
    EmptyStack,
}

#[derive(Clone, Debug)]
struct Entry {
    id: u64,
    location: Location,
}

struct BackState {
    entries: Vec<Entry>,
    next_id: u64,
    version: u64,
}

impl BackState {
    fn entry(&mut self, location: Location) -> Entry {
        let id = self.next_id;
        self.next_id += 1;
        Entry { id, location }
    }

    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

#[derive(Serialize, Deserialize)]
struct Persisted {
    entries: Vec<Location>,
}

/// Shared handle to one back stack. Clones navigate the same stack.
#[derive(Clone)]
pub struct Navigator {
    inner: Rc<RefCell<BackState>>,
    routes: Rc<Vec<RoutePattern>>,
}

impl Navigator {
    pub fn new(start: Location) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BackState {
                entries: vec![Entry {
                    id: 1,
                    location: start,
                }],
                next_id: 2,
                version: 0,
            })),
            routes: Rc::default(),
        }
    }

    /// Route patterns used by the `*_url` methods to fill in route params,
    /// first match wins.
    pub fn with_routes(mut self, patterns: &[&str]) -> Result<Self, NavigationError> {
        let routes = patterns
            .iter()
            .map(|p| RoutePattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        self.routes = Rc::new(routes);
        self.refresh_top_params();
        Ok(self)
    }

    pub fn top(&self) -> Location {
        let s = self.inner.borrow();
        s.entries
            .last()
            .map(|e| e.location.clone())
            .unwrap_or_default()
    }

    pub fn top_id(&self) -> u64 {
        self.inner.borrow().entries.last().map_or(0, |e| e.id)
    }

    pub fn size(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Bumped by every change to the stack.
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    pub fn push(&self, location: Location) {
        log::debug!("navigate to {}", location.path);
        let mut s = self.inner.borrow_mut();
        let e = s.entry(location);
        s.entries.push(e);
        s.bump();
    }

    pub fn push_url(&self, url: &str) {
        self.push(self.resolve(url));
    }

    /// Replaces the top entry in place, keeping its id.
    pub fn replace(&self, location: Location) {
        let mut s = self.inner.borrow_mut();
        match s.entries.last_mut() {
            Some(last) => last.location = location,
            None => {
                let e = s.entry(location);
                s.entries.push(e);
            }
        }
        s.bump();
    }

    pub fn replace_url(&self, url: &str) {
        self.replace(self.resolve(url));
    }

    /// Pops the top entry. The last entry is never popped.
    pub fn pop(&self) -> bool {
        let mut s = self.inner.borrow_mut();
        if s.entries.len() <= 1 {
            return false;
        }
        s.entries.pop();
        s.bump();
        true
    }

    pub fn clear_and_push(&self, location: Location) {
        let mut s = self.inner.borrow_mut();
        s.entries.clear();
        let e = s.entry(location);
        s.entries.push(e);
        s.bump();
    }

    /// Pops down to the topmost entry matching `pred`, which is kept unless
    /// `inclusive`. Never pops the last entry.
    pub fn pop_to(&self, pred: impl Fn(&Location) -> bool, inclusive: bool) -> usize {
        let mut s = self.inner.borrow_mut();
        let Some(idx) = s.entries.iter().rposition(|e| pred(&e.location)) else {
            return 0;
        };
        let keep = if inclusive { idx } else { idx + 1 }.max(1);
        let popped = s.entries.len().saturating_sub(keep);
        if popped > 0 {
            s.entries.truncate(keep);
            s.bump();
        }
        popped
    }

    fn resolve(&self, url: &str) -> Location {
        let mut location = Location::parse(url);
        if let Some(params) = self.routes.iter().find_map(|r| r.matches(&location.path)) {
            location.route_params = params;
        }
        location
    }

    fn refresh_top_params(&self) {
        let mut s = self.inner.borrow_mut();
        let routes = self.routes.clone();
        if let Some(last) = s.entries.last_mut()
            && last.location.route_params.is_empty()
            && let Some(params) = routes.iter().find_map(|r| r.matches(&last.location.path))
        {
            last.location.route_params = params;
        }
    }

    /// The state layer for the top entry.
    pub fn routing_layer(&self) -> StateMap {
        let top = self.top();
        let params = |p: &Params| {
            Value::object(p.iter().map(|(k, v)| (k.clone(), Value::from(v.as_str()))))
        };
        let mut layer = StateMap::new();
        layer.insert(StateKey::named("$pathname"), Value::from(top.path.as_str()));
        layer.insert(StateKey::named("$routeParams"), params(&top.route_params));
        layer.insert(StateKey::named("$queryParams"), params(&top.query_params));
        layer.insert(
            StateKey::named("$linkInfo"),
            top.link_info.map(Value::from).unwrap_or(Value::Null),
        );
        layer
    }

    /// `navigate(url)`, `replace(url)` and `back()` as native functions, for
    /// hosts that hand navigation to handlers as context variables.
    pub fn actions(&self) -> Object {
        let mut out = Object::new();
        let nav = self.clone();
        out.insert(
            "navigate".into(),
            Value::native("navigate", move |args| {
                nav.push_url(&url_arg(args));
                Ok(Value::Undefined)
            }),
        );
        let nav = self.clone();
        out.insert(
            "replace".into(),
            Value::native("replace", move |args| {
                nav.replace_url(&url_arg(args));
                Ok(Value::Undefined)
            }),
        );
        let nav = self.clone();
        out.insert(
            "back".into(),
            Value::native("back", move |_| Ok(Value::Bool(nav.pop()))),
        );
        out
    }

    pub fn to_json(&self) -> Result<String, NavigationError> {
        let s = self.inner.borrow();
        let persisted = Persisted {
            entries: s.entries.iter().map(|e| e.location.clone()).collect(),
        };
        Ok(serde_json::to_string(&persisted)?)
    }

    /// Replaces the whole stack. On error the stack is left as it was.
    pub fn from_json(&self, json: &str) -> Result<(), NavigationError> {
        let persisted: Persisted = serde_json::from_str(json)?;
        if persisted.entries.is_empty() {
            return Err(NavigationError::EmptyStack);
        }
        let mut s = self.inner.borrow_mut();
        s.entries.clear();
        for location in persisted.entries {
            let e = s.entry(location);
            s.entries.push(e);
        }
        s.bump();
        Ok(())
    }
}

fn url_arg(args: &[Value]) -> String {
    args.first().map(Value::to_display_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nav() -> Navigator {
        Navigator::new(Location::parse("/"))
            .with_routes(&["/users/:id", "/"])
            .unwrap()
    }

    #[test]
    fn pop_never_empties_the_stack() {
        let n = nav();
        assert!(!n.pop());
        n.push_url("/users/1");
        assert!(n.pop());
        assert!(!n.pop());
        assert_eq!(n.size(), 1);
    }

    #[test]
    fn every_change_bumps_the_version() {
        let n = nav();
        let v0 = n.version();
        n.push_url("/a");
        n.replace_url("/b");
        assert_eq!(n.version(), v0 + 2);
        assert_eq!(n.size(), 2);
        assert_eq!(n.top().path, "/b");
        n.pop();
        n.pop();
        assert_eq!(n.version(), v0 + 3);
    }

    #[test]
    fn replace_keeps_the_entry_id() {
        let n = nav();
        n.push_url("/a");
        let id = n.top_id();
        n.replace_url("/b");
        assert_eq!(n.top_id(), id);
    }

    #[test]
    fn pop_to_stops_at_the_match() {
        let n = nav();
        for p in ["/a", "/b", "/c", "/d"] {
            n.push_url(p);
        }
        assert_eq!(n.pop_to(|l| l.path == "/b", false), 2);
        assert_eq!(n.top().path, "/b");
        assert_eq!(n.pop_to(|l| l.path == "/b", true), 1);
        assert_eq!(n.top().path, "/a");
        assert_eq!(n.pop_to(|l| l.path == "/", true), 1);
        assert_eq!(n.size(), 1);
    }

    #[test]
    fn routing_layer_reflects_the_top_entry() {
        let n = nav();
        n.push(Location::parse("/users/7?tab=posts").with_link_info(json!({ "from": "list" })));
        n.replace_url("/users/9?tab=likes");
        let layer = n.routing_layer();
        let get = |k: &str| layer[&StateKey::named(k)].to_json();
        assert_eq!(get("$pathname"), json!("/users/9"));
        assert_eq!(get("$routeParams"), json!({ "id": "9" }));
        assert_eq!(get("$queryParams"), json!({ "tab": "likes" }));
        assert_eq!(get("$linkInfo"), json!(null));
    }

    #[test]
    fn json_round_trip() {
        let n = nav();
        n.push(Location::parse("/users/1?x=1").with_link_info(json!({ "title": "One" })));
        let saved = n.to_json().unwrap();

        let restored = Navigator::new(Location::parse("/elsewhere"));
        restored.from_json(&saved).unwrap();
        assert_eq!(restored.size(), 2);
        assert_eq!(restored.top(), n.top());
        assert_eq!(restored.version(), 1);
    }

    #[test]
    fn bad_json_leaves_the_stack_alone() {
        let n = nav();
        n.push_url("/a");
        assert!(matches!(n.from_json("{"), Err(NavigationError::Json(_))));
        assert!(matches!(
            n.from_json(r#"{"entries": []}"#),
            Err(NavigationError::EmptyStack)
        ));
        assert_eq!(n.size(), 2);
    }

    #[test]
    fn native_actions_drive_the_stack() {
        let n = nav();
        let actions = n.actions();
        let call = |name: &str, args: &[Value]| match actions[name].as_function() {
            Some(strata_core::Function::Native(f)) => f.call(args).unwrap(),
            _ => panic!("{name} is not a native function"),
        };
        call("navigate", &[Value::from("/users/3")]);
        assert_eq!(n.top().route_params["id"], "3");
        assert_eq!(call("back", &[]), Value::Bool(true));
        assert_eq!(call("back", &[]), Value::Bool(false));
    }
}
