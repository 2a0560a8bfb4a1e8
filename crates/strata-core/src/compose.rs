//! Layered state composition.
//!
//! Precedence, lowest first: the parent's state (filtered by `uses`), the
//! container's own reducer state together with registered component APIs,
//! context variables, resolved locals, routing parameters. A key present in
//! more than one layer is [`deep_merge`]d with the higher layer winning.

use indexmap::IndexMap;

use crate::key::{ComponentUid, StateKey};
use crate::value::{Object, Value, deep_merge};

pub type StateMap = IndexMap<StateKey, Value>;

/// Registered component APIs: `uid -> { method -> function }`.
pub type ApiRegistry = IndexMap<ComponentUid, Object>;

/// Inputs of one composition, borrowed from the container.
pub struct Layers<'a> {
    pub parent: &'a StateMap,
    pub uses: Option<&'a [String]>,
    pub reducer: &'a StateMap,
    pub apis: &'a ApiRegistry,
    pub context: &'a Object,
    pub locals: &'a Object,
    pub routing: &'a StateMap,
}

/// What a container inherits from its parent. `None` passes everything,
/// `Some([])` nothing; a listed name the parent lacks reads as `Undefined`.
pub fn filter_parent(parent: &StateMap, uses: Option<&[String]>) -> StateMap {
    match uses {
        None => parent.clone(),
        Some(names) => names
            .iter()
            .map(|name| {
                let key = StateKey::named(name.as_str());
                let value = parent.get(&key).cloned().unwrap_or_default();
                (key, value)
            })
            .collect(),
    }
}

pub fn merge_into(target: &mut StateMap, key: StateKey, value: Value) {
    match target.get_mut(&key) {
        Some(existing) => {
            let merged = deep_merge(existing, &value);
            *existing = merged;
        }
        None => {
            target.insert(key, value);
        }
    }
}

/// Reducer entries and APIs keyed by identity are also reachable by the
/// uid's description, which is how scripts address them (`users.value`).
fn own_layer(reducer: &StateMap, apis: &ApiRegistry) -> StateMap {
    let mut out = StateMap::new();
    for (key, value) in reducer {
        merge_into(&mut out, key.clone(), value.clone());
        if let StateKey::Identity(uid) = key
            && let Some(name) = uid.description()
        {
            merge_into(&mut out, StateKey::named(name), value.clone());
        }
    }
    for (uid, api) in apis {
        let api = Value::from(api.clone());
        merge_into(&mut out, StateKey::Identity(uid.clone()), api.clone());
        if let Some(name) = uid.description() {
            merge_into(&mut out, StateKey::named(name), api);
        }
    }
    out
}

fn merge_object(target: &mut StateMap, layer: &Object) {
    for (k, v) in layer {
        merge_into(target, StateKey::named(k.as_str()), v.clone());
    }
}

/// The scope local variables are resolved against: everything except the
/// locals themselves.
pub fn resolution_scope(layers: &Layers<'_>) -> StateMap {
    let mut out = filter_parent(layers.parent, layers.uses);
    for (k, v) in own_layer(layers.reducer, layers.apis) {
        merge_into(&mut out, k, v);
    }
    merge_object(&mut out, layers.context);
    for (k, v) in layers.routing {
        merge_into(&mut out, k.clone(), v.clone());
    }
    out
}

pub fn compose(layers: &Layers<'_>) -> StateMap {
    let mut out = filter_parent(layers.parent, layers.uses);
    for (k, v) in own_layer(layers.reducer, layers.apis) {
        merge_into(&mut out, k, v);
    }
    merge_object(&mut out, layers.context);
    merge_object(&mut out, layers.locals);
    for (k, v) in layers.routing {
        merge_into(&mut out, k.clone(), v.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: serde_json::Value) -> StateMap {
        let Value::Object(o) = Value::from(v) else {
            panic!("fixture must be an object")
        };
        o.iter()
            .map(|(k, v)| (StateKey::named(k.as_str()), v.clone()))
            .collect()
    }

    fn obj(v: serde_json::Value) -> Object {
        match Value::from(v) {
            Value::Object(o) => (*o).clone(),
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn precedence_and_deep_merge() {
        let parent = map(json!({ "x": 1, "cfg": { "a": 1, "b": 1 } }));
        let reducer = map(json!({ "cfg": { "b": 2 } }));
        let locals = obj(json!({ "x": 10 }));
        let routing = map(json!({ "$pathname": "/home" }));
        let out = compose(&Layers {
            parent: &parent,
            uses: None,
            reducer: &reducer,
            apis: &ApiRegistry::new(),
            context: &Object::new(),
            locals: &locals,
            routing: &routing,
        });
        assert_eq!(out[&StateKey::named("x")], Value::from(10));
        assert_eq!(out[&StateKey::named("cfg")].to_json(), json!({ "a": 1, "b": 2 }));
        assert_eq!(out[&StateKey::named("$pathname")], Value::from("/home"));
    }

    #[test]
    fn uses_filters_parent_but_not_routing() {
        let parent = map(json!({ "a": 1, "b": 2 }));
        let routing = map(json!({ "$routeParams": { "id": "7" } }));
        let empty = Object::new();
        let reducer = StateMap::new();
        let apis = ApiRegistry::new();
        let layers = |uses| Layers {
            parent: &parent,
            uses,
            reducer: &reducer,
            apis: &apis,
            context: &empty,
            locals: &empty,
            routing: &routing,
        };
        let none: &[String] = &[];
        let out = compose(&layers(Some(none)));
        assert_eq!(out.len(), 1);
        assert!(out.contains_key(&StateKey::named("$routeParams")));

        let only_b = ["b".to_string(), "missing".to_string()];
        let out = compose(&layers(Some(&only_b[..])));
        assert!(!out.contains_key(&StateKey::named("a")));
        assert_eq!(out[&StateKey::named("b")], Value::from(2));
        assert!(out[&StateKey::named("missing")].is_undefined());
    }

    #[test]
    fn apis_reachable_by_identity_and_description() {
        let uid = ComponentUid::named("dialog");
        let mut apis = ApiRegistry::new();
        apis.insert(uid.clone(), obj(json!({ "isOpen": false })));
        let empty = Object::new();
        let out = compose(&Layers {
            parent: &StateMap::new(),
            uses: None,
            reducer: &StateMap::new(),
            apis: &apis,
            context: &empty,
            locals: &empty,
            routing: &StateMap::new(),
        });
        assert_eq!(out[&StateKey::Identity(uid)].get("isOpen"), Value::from(false));
        assert_eq!(out[&StateKey::named("dialog")].get("isOpen"), Value::from(false));
    }
}
