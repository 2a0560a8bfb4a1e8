use std::rc::Rc;

use crate::compose::StateMap;
use crate::config::{ID_FIELD, is_read_only_name};
use crate::error::StateError;
use crate::interp::ChangeKind;
use crate::key::{ComponentUid, StateKey};
use crate::path::{Path, set_path, unset_path};
use crate::value::{Object, Value};

// State holder pattern
pub trait StateHolder: 'static {
    type State: Clone;
    type Event;

    fn initial_state() -> Self::State;
    fn reduce(state: &Self::State, event: Self::Event) -> Result<Self::State, StateError>;
}

/// Copy-on-write store of one container. Cloning is cheap; a reduction
/// copies the key map once and leaves untouched values shared.
#[derive(Clone, Default, Debug)]
pub struct ContainerState {
    map: Rc<StateMap>,
}

impl ContainerState {
    pub fn get(&self, key: &StateKey) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.map.get(&StateKey::named(name))
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn map(&self) -> &StateMap {
        &self.map
    }

    pub fn same_allocation(&self, other: &ContainerState) -> bool {
        Rc::ptr_eq(&self.map, &other.map)
    }

    fn entry_object(&self, uid: &ComponentUid) -> Object {
        match self.map.get(&StateKey::Identity(uid.clone())) {
            Some(Value::Object(o)) => (**o).clone(),
            _ => Object::new(),
        }
    }

    fn with_entry(&self, key: StateKey, value: Value) -> ContainerState {
        let mut map = self.map.clone();
        Rc::make_mut(&mut map).insert(key, value);
        ContainerState { map }
    }

    /// Rewrites the per-uid object through `f`.
    fn update_uid(&self, uid: &ComponentUid, f: impl FnOnce(&mut Object)) -> ContainerState {
        let mut entry = self.entry_object(uid);
        f(&mut entry);
        self.with_entry(StateKey::Identity(uid.clone()), Value::from(entry))
    }
}

#[derive(Clone, Debug)]
pub enum ContainerAction {
    LoaderInProgressChanged {
        uid: ComponentUid,
        in_progress: bool,
    },
    LoaderIsRefetchingChanged {
        uid: ComponentUid,
        is_refetching: bool,
    },
    LoaderLoaded {
        uid: ComponentUid,
        data: Value,
        page_info: Option<Value>,
    },
    LoaderError {
        uid: ComponentUid,
        error: Value,
    },
    EventHandlerStarted {
        uid: ComponentUid,
        event: String,
    },
    EventHandlerCompleted {
        uid: ComponentUid,
        event: String,
    },
    EventHandlerError {
        uid: ComponentUid,
        event: String,
        error: Value,
    },
    ComponentStateChanged {
        uid: ComponentUid,
        state: Object,
    },
    StatePartChanged {
        root: String,
        path: Path,
        value: Value,
        kind: ChangeKind,
        /// Declared default of `root`, used to shape missing intermediates.
        declared_shape: Option<Value>,
    },
}

pub struct ContainerReducer;

impl StateHolder for ContainerReducer {
    type State = ContainerState;
    type Event = ContainerAction;

    fn initial_state() -> ContainerState {
        ContainerState::default()
    }

    fn reduce(state: &ContainerState, action: ContainerAction) -> Result<ContainerState, StateError> {
        log::trace!("reduce {action:?}");
        Ok(match action {
            ContainerAction::LoaderInProgressChanged { uid, in_progress } => {
                state.update_uid(&uid, |e| {
                    e.insert("inProgress".into(), Value::Bool(in_progress));
                })
            }
            ContainerAction::LoaderIsRefetchingChanged { uid, is_refetching } => {
                state.update_uid(&uid, |e| {
                    e.insert("isRefetching".into(), Value::Bool(is_refetching));
                })
            }
            ContainerAction::LoaderLoaded {
                uid,
                data,
                page_info,
            } => state.update_uid(&uid, |e| {
                if let Some(index) = index_by_id(&data) {
                    e.insert("byId".into(), index);
                } else {
                    e.shift_remove("byId");
                }
                e.insert("value".into(), data);
                e.insert("loaded".into(), Value::Bool(true));
                e.insert("inProgress".into(), Value::Bool(false));
                e.shift_remove("error");
                if let Some(info) = page_info {
                    e.insert("pageInfo".into(), info);
                }
            }),
            ContainerAction::LoaderError { uid, error } => state.update_uid(&uid, |e| {
                e.insert("error".into(), error);
                e.insert("inProgress".into(), Value::Bool(false));
                e.insert("loaded".into(), Value::Bool(true));
            }),
            ContainerAction::EventHandlerStarted { uid, event } => state.update_uid(&uid, |e| {
                e.insert(format!("{event}InProgress"), Value::Bool(true));
                e.shift_remove(&format!("{event}Error"));
            }),
            ContainerAction::EventHandlerCompleted { uid, event } => {
                state.update_uid(&uid, |e| {
                    e.insert(format!("{event}InProgress"), Value::Bool(false));
                })
            }
            ContainerAction::EventHandlerError { uid, event, error } => {
                state.update_uid(&uid, |e| {
                    e.insert(format!("{event}InProgress"), Value::Bool(false));
                    e.insert(format!("{event}Error"), error);
                })
            }
            ContainerAction::ComponentStateChanged { uid, state: part } => {
                state.update_uid(&uid, |e| {
                    for (k, v) in part {
                        e.insert(k, v);
                    }
                })
            }
            ContainerAction::StatePartChanged {
                root,
                path,
                value,
                kind,
                declared_shape,
            } => {
                if is_read_only_name(&root) {
                    return Err(StateError::ReadOnly(root));
                }
                let key = StateKey::named(root.as_str());
                let mut current = state.get(&key).cloned().unwrap_or_default();
                match kind {
                    ChangeKind::Set => set_path(&mut current, &path, value, declared_shape.as_ref())?,
                    ChangeKind::Unset if path.is_empty() => {
                        let mut map = state.map.clone();
                        Rc::make_mut(&mut map).shift_remove(&key);
                        return Ok(ContainerState { map });
                    }
                    ChangeKind::Unset => unset_path(&mut current, &path),
                }
                state.with_entry(key, current)
            }
        })
    }
}

/// `{ id -> item }` when every element is an object carrying an identity
/// field.
fn index_by_id(data: &Value) -> Option<Value> {
    let items = data.as_array()?;
    let mut index = Object::new();
    for item in items {
        let id = item.as_object()?.get(ID_FIELD)?;
        index.insert(id.to_js_string(), item.clone());
    }
    Some(Value::from(index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathSegment;
    use serde_json::json;

    fn reduce(state: &ContainerState, action: ContainerAction) -> ContainerState {
        ContainerReducer::reduce(state, action).unwrap()
    }

    #[test]
    fn loader_lifecycle() {
        let uid = ComponentUid::named("users");
        let s = ContainerReducer::initial_state();
        let s = reduce(
            &s,
            ContainerAction::LoaderInProgressChanged {
                uid: uid.clone(),
                in_progress: true,
            },
        );
        let s = reduce(
            &s,
            ContainerAction::LoaderLoaded {
                uid: uid.clone(),
                data: Value::from(json!([{ "$id": 1, "n": "a" }, { "$id": 2, "n": "b" }])),
                page_info: None,
            },
        );
        let entry = s.get(&StateKey::Identity(uid.clone())).unwrap();
        assert_eq!(entry.get("loaded"), Value::Bool(true));
        assert_eq!(entry.get("inProgress"), Value::Bool(false));
        assert_eq!(entry.get("byId").get("2").get("n"), Value::from("b"));

        let s = reduce(
            &s,
            ContainerAction::LoaderError {
                uid: uid.clone(),
                error: Value::from("offline"),
            },
        );
        let entry = s.get(&StateKey::Identity(uid)).unwrap();
        assert_eq!(entry.get("error"), Value::from("offline"));
        // the previous value stays available
        assert_eq!(entry.get("value").get("length"), Value::from(2));
    }

    #[test]
    fn by_id_needs_ids_on_every_item() {
        assert!(index_by_id(&Value::from(json!([{ "$id": 1 }, { "x": 2 }]))).is_none());
        assert!(index_by_id(&Value::from(json!({ "$id": 1 }))).is_none());
    }

    #[test]
    fn handler_lifecycle_flags() {
        let uid = ComponentUid::named("save");
        let s = reduce(
            &ContainerState::default(),
            ContainerAction::EventHandlerStarted {
                uid: uid.clone(),
                event: "click".into(),
            },
        );
        assert_eq!(
            s.get(&StateKey::Identity(uid.clone())).unwrap().get("clickInProgress"),
            Value::Bool(true)
        );
        let s = reduce(
            &s,
            ContainerAction::EventHandlerError {
                uid: uid.clone(),
                event: "click".into(),
                error: Value::from("nope"),
            },
        );
        let entry = s.get(&StateKey::Identity(uid)).unwrap();
        assert_eq!(entry.get("clickInProgress"), Value::Bool(false));
        assert_eq!(entry.get("clickError"), Value::from("nope"));
    }

    #[test]
    fn state_part_changes_share_untouched_entries() {
        let s = reduce(
            &ContainerState::default(),
            ContainerAction::StatePartChanged {
                root: "big".into(),
                path: Path::new(),
                value: Value::from(json!({ "rows": [1, 2, 3] })),
                kind: ChangeKind::Set,
                declared_shape: None,
            },
        );
        let before = s.get_named("big").cloned().unwrap();
        let s2 = reduce(
            &s,
            ContainerAction::StatePartChanged {
                root: "other".into(),
                path: Path::from_iter([PathSegment::Key("x".into())]),
                value: Value::from(1),
                kind: ChangeKind::Set,
                declared_shape: None,
            },
        );
        assert!(crate::value::same_value(&before, s2.get_named("big").unwrap()));
        assert_eq!(s2.get_named("other").unwrap().to_json(), json!({ "x": 1 }));
        assert!(!s.same_allocation(&s2));
    }

    #[test]
    fn read_only_roots_are_rejected() {
        let err = ContainerReducer::reduce(
            &ContainerState::default(),
            ContainerAction::StatePartChanged {
                root: "$item".into(),
                path: Path::new(),
                value: Value::from(1),
                kind: ChangeKind::Set,
                declared_shape: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, StateError::ReadOnly(_)));
    }

    #[test]
    fn unset_removes_root() {
        let s = reduce(
            &ContainerState::default(),
            ContainerAction::StatePartChanged {
                root: "tmp".into(),
                path: Path::new(),
                value: Value::from(1),
                kind: ChangeKind::Set,
                declared_shape: None,
            },
        );
        let s = reduce(
            &s,
            ContainerAction::StatePartChanged {
                root: "tmp".into(),
                path: Path::new(),
                value: Value::Undefined,
                kind: ChangeKind::Unset,
                declared_shape: None,
            },
        );
        assert!(s.is_empty());
    }
}
