//! The rendered tree a pass produces.

use std::fmt;

use indexmap::IndexMap;
use strata_core::{AsyncHandler, Object, Value};

/// Position of a node in the rendered tree: `/`-joined slot segments below
/// the root. Containers are keyed by it across passes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(String);

impl NodeRef {
    pub fn root() -> Self {
        NodeRef("root".into())
    }

    pub fn join(&self, segment: &str) -> Self {
        NodeRef(format!("{}/{segment}", self.0))
    }

    /// Segment of the `index`-th child of a multi-child slot.
    pub fn indexed(&self, index: usize, uid: Option<&str>) -> Self {
        self.join(&format!("{index}:{}", uid.unwrap_or_default()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeRef {
    fn from(s: &str) -> Self {
        NodeRef(s.to_string())
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({})", self.0)
    }
}

#[derive(Clone)]
pub struct Node {
    pub at: NodeRef,
    pub kind: String,
    pub uid: Option<String>,
    pub props: Object,
    pub handlers: IndexMap<String, AsyncHandler>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(at: NodeRef, kind: &str) -> Self {
        Self {
            at,
            kind: kind.to_string(),
            uid: None,
            props: Object::new(),
            handlers: IndexMap::new(),
            children: Vec::new(),
        }
    }

    /// What an error boundary renders in place of a failed subtree.
    pub fn fallback(at: NodeRef, message: &str) -> Self {
        Node::new(at, "ErrorFallback").prop("message", message)
    }

    pub fn prop(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.props.insert(name.to_string(), value.into());
        self
    }

    pub fn children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn is_fallback(&self) -> bool {
        self.kind == "ErrorFallback"
    }

    /// Depth-first search by uid.
    pub fn find(&self, uid: &str) -> Option<&Node> {
        if self.uid.as_deref() == Some(uid) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(uid))
    }

    pub fn find_at(&self, at: &str) -> Option<&Node> {
        if self.at.as_str() == at {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_at(at))
    }

    /// Concatenated `text` props of this subtree, in tree order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(t) = self.props.get("text") {
            out.push_str(&t.to_display_string());
        }
        for c in &self.children {
            c.collect_text(out);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Node");
        s.field("at", &self.at).field("kind", &self.kind);
        if let Some(uid) = &self.uid {
            s.field("uid", uid);
        }
        if !self.props.is_empty() {
            s.field("props", &self.props);
        }
        if !self.handlers.is_empty() {
            s.field("handlers", &self.handlers.keys().collect::<Vec<_>>());
        }
        if !self.children.is_empty() {
            s.field("children", &self.children);
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_compose_from_slots() {
        let root = NodeRef::root();
        assert_eq!(root.indexed(0, Some("btn")).as_str(), "root/0:btn");
        assert_eq!(root.indexed(2, None).join("body").as_str(), "root/2:/body");
    }

    #[test]
    fn text_concatenates_in_order() {
        let root = NodeRef::root();
        let tree = Node::new(root.clone(), "Stack").children(vec![
            Node::new(root.indexed(0, None), "Text").prop("text", "a"),
            Node::new(root.indexed(1, None), "Text").prop("text", 1),
        ]);
        assert_eq!(tree.text(), "a1");
    }
}
