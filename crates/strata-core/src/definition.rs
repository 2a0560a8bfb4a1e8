//! Component definition trees, as produced by the markup layer.
//!
//! A definition is immutable for the duration of a render pass. Everything a
//! node carries is already parsed: bindings hold their expression trees and
//! event handlers hold their statement lists.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::action::ActionSource;
use crate::ast::Binding;
use crate::resolver::Declaration;
use crate::value::{Object, Value};

/// Code-behind collected for a component: extra variables and functions,
/// or the error the script failed to parse with.
#[derive(Clone, Debug, Default)]
pub struct Script {
    pub vars: IndexMap<String, Binding>,
    pub functions: IndexMap<String, Binding>,
    pub parse_error: Option<String>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            parse_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn var(mut self, name: &str, binding: Binding) -> Self {
        self.vars.insert(name.to_string(), binding);
        self
    }

    pub fn function(mut self, name: &str, binding: Binding) -> Self {
        self.functions.insert(name.to_string(), binding);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct ComponentDef {
    pub uid: Option<Binding>,
    pub kind: String,
    pub props: IndexMap<String, Binding>,
    pub children: Vec<Rc<ComponentDef>>,
    pub loaders: Vec<Rc<ComponentDef>>,
    pub vars: IndexMap<String, Binding>,
    pub functions: IndexMap<String, Binding>,
    pub uses: Option<Vec<String>>,
    pub api: IndexMap<String, Binding>,
    pub when: Option<Binding>,
    pub events: IndexMap<String, ActionSource>,
    pub context_vars: Object,
    pub script: Option<Script>,
    /// Explicit container type, regardless of what else the node declares.
    pub container: bool,
}

impl ComponentDef {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Self::default()
        }
    }

    pub fn uid(mut self, name: &str) -> Self {
        self.uid = Some(Binding::literal(name));
        self
    }

    pub fn uid_binding(mut self, binding: Binding) -> Self {
        self.uid = Some(binding);
        self
    }

    pub fn prop(mut self, name: &str, binding: Binding) -> Self {
        self.props.insert(name.to_string(), binding);
        self
    }

    pub fn prop_value(self, name: &str, value: impl Into<Value>) -> Self {
        self.prop(name, Binding::literal(value))
    }

    pub fn child(mut self, child: ComponentDef) -> Self {
        self.children.push(Rc::new(child));
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ComponentDef>) -> Self {
        self.children.extend(children.into_iter().map(Rc::new));
        self
    }

    pub fn loader(mut self, loader: ComponentDef) -> Self {
        self.loaders.push(Rc::new(loader));
        self
    }

    pub fn var(mut self, name: &str, binding: Binding) -> Self {
        self.vars.insert(name.to_string(), binding);
        self
    }

    pub fn function(mut self, name: &str, binding: Binding) -> Self {
        self.functions.insert(name.to_string(), binding);
        self
    }

    pub fn uses(mut self, names: &[&str]) -> Self {
        self.uses = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn api(mut self, name: &str, binding: Binding) -> Self {
        self.api.insert(name.to_string(), binding);
        self
    }

    pub fn when(mut self, binding: Binding) -> Self {
        self.when = Some(binding);
        self
    }

    pub fn on(mut self, event: &str, source: ActionSource) -> Self {
        self.events.insert(event.to_string(), source);
        self
    }

    pub fn context_var(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.context_vars.insert(name.to_string(), value.into());
        self
    }

    pub fn script(mut self, script: Script) -> Self {
        self.script = Some(script);
        self
    }

    pub fn as_container(mut self) -> Self {
        self.container = true;
        self
    }

    /// Locals in resolution order: functions first, then variables; the
    /// script's entries follow the inline ones.
    pub fn declarations(&self) -> Vec<Declaration> {
        let script = self.script.as_ref();
        let functions = self
            .functions
            .iter()
            .chain(script.into_iter().flat_map(|s| s.functions.iter()))
            .map(|(name, binding)| Declaration {
                name: name.clone(),
                binding: binding.clone(),
                function: true,
            });
        let vars = self
            .vars
            .iter()
            .chain(script.into_iter().flat_map(|s| s.vars.iter()))
            .map(|(name, binding)| Declaration {
                name: name.clone(),
                binding: binding.clone(),
                function: false,
            });
        functions.chain(vars).collect()
    }

    pub fn declares(&self, name: &str) -> bool {
        self.vars.contains_key(name)
            || self.functions.contains_key(name)
            || self
                .script
                .as_ref()
                .is_some_and(|s| s.vars.contains_key(name) || s.functions.contains_key(name))
    }
}
