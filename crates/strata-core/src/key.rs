use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a component instance.
///
/// Two uids are equal only if they came from the same `ComponentUid::new`
/// call; the description is informational and never takes part in equality.
#[derive(Clone)]
pub struct ComponentUid {
    id: u64,
    description: Option<Rc<str>>,
}

impl ComponentUid {
    pub fn new(description: Option<&str>) -> Self {
        Self {
            id: NEXT_UID.fetch_add(1, Ordering::Relaxed),
            description: description.map(Rc::from),
        }
    }

    pub fn named(description: &str) -> Self {
        Self::new(Some(description))
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl PartialEq for ComponentUid {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentUid {}

impl Hash for ComponentUid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ComponentUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(d) => write!(f, "Uid({d}#{})", self.id),
            None => write!(f, "Uid(#{})", self.id),
        }
    }
}

/// Key of a state entry: a declared variable name or a component identity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum StateKey {
    Named(String),
    Identity(ComponentUid),
}

impl StateKey {
    pub fn named(name: impl Into<String>) -> Self {
        StateKey::Named(name.into())
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            StateKey::Named(n) => Some(n),
            StateKey::Identity(_) => None,
        }
    }
}

impl From<&str> for StateKey {
    fn from(s: &str) -> Self {
        StateKey::Named(s.to_string())
    }
}

impl From<String> for StateKey {
    fn from(s: String) -> Self {
        StateKey::Named(s)
    }
}

impl From<ComponentUid> for StateKey {
    fn from(uid: ComponentUid) -> Self {
        StateKey::Identity(uid)
    }
}

impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKey::Named(n) => write!(f, "{n:?}"),
            StateKey::Identity(uid) => write!(f, "{uid:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_identity_ignores_description() {
        let a = ComponentUid::named("btn");
        let b = ComponentUid::named("btn");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_ne!(StateKey::from(a.clone()), StateKey::named("btn"));
    }
}
