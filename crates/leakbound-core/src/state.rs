//! Variable bindings and output histories
//!
//! [`State`] maps names to values and defaults to bottom for names it has
//! never seen. Append-only variables are routed into the nested
//! [`OutputState`], which is strict: names must be declared with
//! [`OutputState::add`] before they can be read or written.

use crate::error::{FlowError, FlowResult};
use crate::lattice::{BitArena, BitId, Sec, Value};
use crate::mods::Mods;
use crate::symbols::Variable;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Declared output channels grouped by security level
#[derive(Debug, Clone)]
pub struct OutputState<S: Sec> {
    values: IndexMap<String, Value>,
    levels: BTreeMap<S, Vec<String>>,
}

impl<S: Sec> Default for OutputState<S> {
    fn default() -> Self {
        Self {
            values: IndexMap::new(),
            levels: BTreeMap::new(),
        }
    }
}

impl<S: Sec> OutputState<S> {
    /// Declare `name` as an output at `sec`, bound to an empty history
    pub fn add(&mut self, sec: S, name: &str) {
        self.values.insert(name.to_string(), Value::append_only());
        for names in self.levels.values_mut() {
            names.retain(|n| n != name);
        }
        self.levels.entry(sec).or_default().push(name.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> FlowResult<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| FlowError::UndeclaredOutputAccess(name.to_string()))
    }

    pub fn set(&mut self, name: &str, value: Value) -> FlowResult<()> {
        let slot = self
            .values
            .get_mut(name)
            .ok_or_else(|| FlowError::UndeclaredOutputAccess(name.to_string()))?;
        *slot = value;
        Ok(())
    }

    /// All bits of the outputs declared at exactly `sec`, concatenated
    pub fn get_bits(&self, sec: S) -> Value {
        let mut flat = Value::new(Vec::new());
        for name in self.levels.get(&sec).into_iter().flatten() {
            if let Some(value) = self.values.get(name) {
                flat.append(value);
            }
        }
        flat
    }

    pub fn level_of(&self, name: &str) -> Option<S> {
        self.levels
            .iter()
            .find(|(_, names)| names.iter().any(|n| n == name))
            .map(|(&sec, _)| sec)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// Base bindings of a callee saved while it runs
#[derive(Debug)]
pub struct Frame {
    vars: IndexMap<String, Value>,
    ret: Value,
    returned: BitId,
}

/// Abstract program state
#[derive(Debug, Clone)]
pub struct State<S: Sec> {
    vars: IndexMap<String, Value>,
    ret: Value,
    /// Whether a `return` was taken on the current path; bottom when not
    returned: BitId,
    output: OutputState<S>,
    width: usize,
}

impl<S: Sec> State<S> {
    pub fn new(width: usize) -> Self {
        Self {
            vars: IndexMap::new(),
            ret: Value::bot(width),
            returned: BitId::BOT,
            output: OutputState::default(),
            width,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Value of `name`; output channels take precedence, unknown names are
    /// bottom
    pub fn get(&self, name: &str) -> Value {
        if let Ok(value) = self.output.get(name) {
            return value.clone();
        }
        self.vars
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::bot(self.width))
    }

    /// Bind `var`. Append-only variables extend their history in the output
    /// state instead of being overwritten.
    pub fn set(&mut self, var: &Variable, value: Value) -> FlowResult<()> {
        let value = if var.has_append_value {
            value.into_append_only()
        } else {
            value
        };
        if var.is_append_only {
            let mut history = self.output.get(&var.name)?.clone();
            history.append(&value);
            return self.output.set(&var.name, history);
        }
        self.vars.insert(var.name.clone(), value);
        Ok(())
    }

    /// Raw write into the base bindings
    pub fn set_name(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name) || self.output.contains(name)
    }

    pub fn return_value(&self) -> &Value {
        &self.ret
    }

    pub fn set_return_value(&mut self, value: Value) {
        self.ret = value;
    }

    pub fn return_taken(&self) -> BitId {
        self.returned
    }

    pub fn set_return_taken(&mut self, bit: BitId) {
        self.returned = bit;
    }

    pub fn output(&self) -> &OutputState<S> {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut OutputState<S> {
        &mut self.output
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Substitute bits of every binding, including histories and the return
    /// slot
    pub fn apply(&mut self, mods: &Mods) {
        if mods.is_empty() {
            return;
        }
        let subst = |v: &Value| v.map_bits(|b| mods.try_replace(b).unwrap_or(b));
        for value in self.vars.values_mut() {
            *value = subst(value);
        }
        for value in self.output.values.values_mut() {
            *value = subst(value);
        }
        self.ret = subst(&self.ret);
        self.returned = mods.try_replace(self.returned).unwrap_or(self.returned);
    }

    /// Clear the base bindings for a callee, keeping the output channels
    pub fn enter_frame(&mut self) -> Frame {
        Frame {
            vars: std::mem::take(&mut self.vars),
            ret: std::mem::replace(&mut self.ret, Value::bot(self.width)),
            returned: std::mem::replace(&mut self.returned, BitId::BOT),
        }
    }

    /// Restore the caller's bindings and hand back the callee's return value
    pub fn leave_frame(&mut self, frame: Frame) -> Value {
        self.vars = frame.vars;
        self.returned = frame.returned;
        std::mem::replace(&mut self.ret, frame.ret)
    }

    /// One `name => repr` line per binding, base bindings first
    pub fn dump(&self, arena: &BitArena) -> String {
        self.vars
            .iter()
            .chain(self.output.values.iter())
            .map(|(name, value)| format!("{name} => {}", value.repr(arena)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
