//! Variables and lexical scoping
//!
//! Scopes live in an arena and point at their parent by index, so pushing a
//! scope never needs shared mutable references to the enclosing one.

use crate::error::{FlowError, FlowResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A named program variable and its roles
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: String,
    pub is_input: bool,
    pub is_output: bool,
    /// The value is a growing history, typically an output channel
    pub is_append_only: bool,
    /// Assigned values are coerced to append-only form before storage
    pub has_append_value: bool,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: "int".to_string(),
            is_input: false,
            is_output: false,
            is_append_only: false,
            has_append_value: false,
        }
    }

    pub fn input(mut self) -> Self {
        self.is_input = true;
        self
    }

    pub fn output(mut self) -> Self {
        self.is_output = true;
        self
    }

    pub fn append_only(mut self) -> Self {
        self.is_append_only = true;
        self
    }

    pub fn with_append_value(mut self) -> Self {
        self.has_append_value = true;
        self
    }

    /// Inputs named `input*` or `*_input` model unbounded interactive
    /// streams: every read yields fresh secret bits.
    pub fn is_appendable_input(&self) -> bool {
        self.is_input && (self.name.starts_with("input") || self.name.ends_with("_input"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Clone)]
struct Scope {
    parent: Option<ScopeId>,
    vars: IndexMap<String, Variable>,
}

/// Arena of scopes; `open` tracks the chain of scopes currently entered
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    open: Vec<ScopeId>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                parent: None,
                vars: IndexMap::new(),
            }],
            open: vec![ScopeId(0)],
        }
    }

    pub fn current(&self) -> ScopeId {
        self.open.last().copied().unwrap_or(ScopeId(0))
    }

    /// Enter a scope nested in the current one
    pub fn push(&mut self) -> ScopeId {
        let parent = self.current();
        self.enter(Some(parent))
    }

    /// Enter a scope that sees none of the enclosing names (callee frames)
    pub fn push_detached(&mut self) -> ScopeId {
        self.enter(None)
    }

    fn enter(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            parent,
            vars: IndexMap::new(),
        });
        self.open.push(id);
        id
    }

    /// Leave the current scope; the global scope is never left
    pub fn pop(&mut self) -> Option<ScopeId> {
        if self.open.len() > 1 {
            self.open.pop()
        } else {
            None
        }
    }

    pub fn insert(&mut self, var: Variable) -> FlowResult<()> {
        let current = self.current();
        let scope = &mut self.scopes[current.0];
        if scope.vars.contains_key(&var.name) {
            return Err(FlowError::DuplicateScopeDefinition(var.name));
        }
        scope.vars.insert(var.name.clone(), var);
        Ok(())
    }

    /// Resolve `name`, walking outwards through parent scopes
    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        let mut scope = Some(self.current());
        while let Some(id) = scope {
            let record = &self.scopes[id.0];
            if let Some(var) = record.vars.get(name) {
                return Some(var);
            }
            scope = record.parent;
        }
        None
    }

    pub fn in_current_scope(&self, name: &str) -> bool {
        self.scopes[self.current().0].vars.contains_key(name)
    }
}
