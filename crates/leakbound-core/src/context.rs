//! Analysis context
//!
//! [`Context`] owns everything one analysis run accumulates: the bit arena,
//! the variable state, the input and output classifications and the stack of
//! path-local [`Mods`]. An interpreter drives it statement by statement and
//! asks for the leakage once the program has been walked.
//!
//! # Branches
//!
//! Both arms of a conditional with an unknown condition are evaluated from
//! the same starting state. Each arm runs under [`Context::push_branch`],
//! which puts the condition on the control stack and assumes its outcome.
//! [`Context::merge_branches`] joins the two resulting states bit by bit and
//! keeps the substitutions both arms agree on.
//!
//! # Loops
//!
//! [`Context::enter_loop`] replaces every binding by loop-head bits. After
//! each evaluation of the body, [`Context::merge_loop`] joins the body's
//! bindings into the heads in place and reports whether anything changed.

use crate::config::AnalysisConfig;
use crate::error::{FlowError, FlowResult};
use crate::input_bits::InputBits;
use crate::io_values::IoValues;
use crate::lattice::{BitArena, BitId, Origin, Sec, Value, B};
use crate::leakage::{self, DependencyGraph, LeakageResult};
use crate::mods::Mods;
use crate::ops;
use crate::registry::{GraphRegistry, NoopRegistry};
use crate::state::{Frame, State};
use crate::symbols::{SymbolTable, Variable};
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeMap;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Bindings captured at loop entry
#[derive(Debug, Clone, Default)]
pub struct LoopHeads {
    vars: IndexMap<String, Value>,
    histories: IndexMap<String, usize>,
    appended: IndexMap<String, Value>,
}

impl LoopHeads {
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Caller bindings saved while a callee body is analyzed
#[derive(Debug)]
pub struct CallFrame {
    frame: Frame,
}

pub struct Context<S: Sec> {
    config: AnalysisConfig,
    arena: BitArena,
    state: State<S>,
    symbols: SymbolTable,
    inputs: IoValues<S>,
    outputs: IoValues<S>,
    input_bits: InputBits<S>,
    /// Templates of inputs that yield fresh bits on every read
    streams: IndexMap<String, (S, String)>,
    /// Scalar outputs, classified from their final value
    pending: Vec<(String, S)>,
    /// History length of each channel already classified
    classified: IndexMap<String, usize>,
    mods: Vec<Mods>,
    registry: Box<dyn GraphRegistry>,
}

impl<S: Sec> Context<S> {
    pub fn new(config: AnalysisConfig) -> Self {
        let width = config.bit_width.max(1);
        Self {
            config,
            arena: BitArena::new(),
            state: State::new(width),
            symbols: SymbolTable::new(),
            inputs: IoValues::default(),
            outputs: IoValues::default(),
            input_bits: InputBits::default(),
            streams: IndexMap::new(),
            pending: Vec::new(),
            classified: IndexMap::new(),
            mods: vec![Mods::empty()],
            registry: Box::new(NoopRegistry),
        }
    }

    pub fn with_registry(mut self, registry: Box<dyn GraphRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn bit_width(&self) -> usize {
        self.state.width()
    }

    pub fn arena(&self) -> &BitArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut BitArena {
        &mut self.arena
    }

    pub fn state(&self) -> &State<S> {
        &self.state
    }

    pub fn inputs(&self) -> &IoValues<S> {
        &self.inputs
    }

    pub fn outputs(&self) -> &IoValues<S> {
        &self.outputs
    }

    pub fn input_bits(&self) -> &InputBits<S> {
        &self.input_bits
    }

    pub fn registry(&self) -> &dyn GraphRegistry {
        self.registry.as_ref()
    }

    fn pattern(&self, template: Option<&str>) -> String {
        template
            .map(str::to_string)
            .unwrap_or_else(|| format!("0b{}", "u".repeat(self.bit_width())))
    }

    pub fn push_scope(&mut self) {
        self.symbols.push();
    }

    pub fn pop_scope(&mut self) {
        self.symbols.pop();
    }

    /// Declare a secret or public input. `template` fixes some bits, e.g.
    /// `0b0uu`; without it every bit is unknown.
    pub fn declare_input(&mut self, sec: S, name: &str, template: Option<&str>) -> FlowResult<Value> {
        let var = Variable::new(name).input();
        let pattern = self.pattern(template);
        let value = Value::from_pattern(&mut self.arena, &pattern, Origin::Input)?;
        self.symbols.insert(var.clone())?;
        if var.is_appendable_input() {
            self.streams.insert(name.to_string(), (sec, pattern));
        }
        self.inputs.add_variable(name, sec);
        self.declare_io(Direction::Input, sec, value.clone())?;
        self.state.set(&var, value.clone())?;
        debug!(name, %sec, bits = value.len(), "declared input");
        Ok(value)
    }

    /// Declare a scalar output; it is classified from its final value
    pub fn declare_output(&mut self, sec: S, name: &str, value: Value) -> FlowResult<()> {
        let var = Variable::new(name).output();
        self.symbols.insert(var.clone())?;
        self.outputs.add_variable(name, sec);
        self.pending.push((name.to_string(), sec));
        self.state.set(&var, value)
    }

    /// Declare an append-only output channel with an empty history
    pub fn declare_channel(&mut self, sec: S, name: &str) -> FlowResult<()> {
        let var = Variable::new(name).output().append_only();
        self.symbols.insert(var)?;
        self.outputs.add_variable(name, sec);
        self.state.output_mut().add(sec, name);
        Ok(())
    }

    pub fn declare_local(&mut self, name: &str, value: Value, append: bool) -> FlowResult<()> {
        let var = if append {
            Variable::new(name).with_append_value()
        } else {
            Variable::new(name)
        };
        self.symbols.insert(var.clone())?;
        self.state.set(&var, value)
    }

    /// Classify `value` directly
    pub fn declare_io(&mut self, direction: Direction, sec: S, value: Value) -> FlowResult<()> {
        match direction {
            Direction::Input => {
                self.input_bits.put_value(&self.arena, sec, &value);
                self.inputs.add(&self.arena, sec, value)
            }
            Direction::Output => self.outputs.add(&self.arena, sec, value),
        }
    }

    pub fn declare_io_bit(&mut self, direction: Direction, sec: S, bit: BitId) -> FlowResult<()> {
        self.declare_io(direction, sec, Value::from(bit))
    }

    /// Whether `name` was declared as an input or output
    pub fn has(&self, name: &str) -> bool {
        self.inputs.has(name) || self.outputs.has(name)
    }

    /// Declared input and output names, inputs first
    pub fn variable_names(&self) -> Vec<&str> {
        self.inputs
            .variable_names()
            .chain(self.outputs.variable_names())
            .collect()
    }

    fn resolve(&self, name: &str) -> FlowResult<Variable> {
        if let Some(var) = self.symbols.lookup(name) {
            return Ok(var.clone());
        }
        // channels stay visible inside callee frames
        if self.state.output().contains(name) {
            return Ok(Variable::new(name).output().append_only());
        }
        Err(FlowError::UnknownVariable(name.to_string()))
    }

    pub fn assign(&mut self, name: &str, value: Value) -> FlowResult<()> {
        let var = self.resolve(name)?;
        trace!(name, value = %value.repr(&self.arena), "assign");
        self.state.set(&var, value)
    }

    /// Extend the history of an append-only variable. Under an unknown
    /// condition every appended bit is unknown and depends on the condition.
    pub fn append(&mut self, name: &str, value: Value) -> FlowResult<()> {
        let var = self.resolve(name)?;
        if !var.is_append_only {
            return Err(FlowError::UndeclaredOutputAccess(name.to_string()));
        }
        let guarded = self.arena.control().iter().any(|&c| self.arena.is_unknown(c));
        let value = if guarded {
            value.map_bits(|b| self.arena.derive(B::U, Origin::Phi, &[b]))
        } else {
            value
        };
        self.state.set(&var, value)
    }

    /// Current value of `name` as seen on the active path
    pub fn read(&mut self, name: &str) -> FlowResult<Value> {
        let var = self.resolve(name)?;
        if var.is_appendable_input() {
            if let Some((sec, pattern)) = self.streams.get(name).cloned() {
                let value = Value::from_pattern(&mut self.arena, &pattern, Origin::Input)?;
                self.declare_io(Direction::Input, sec, value.clone())?;
                return Ok(value);
            }
        }
        let value = self.state.get(name);
        Ok(match self.mods.last() {
            Some(mods) if !mods.is_empty() => value.map_bits(|b| mods.try_replace(b).unwrap_or(b)),
            _ => value,
        })
    }

    pub fn return_value(&self) -> &Value {
        self.state.return_value()
    }

    pub fn set_return_value(&mut self, value: Value) {
        self.state.set_return_value(value);
    }

    /// Bit telling whether a `return` was taken on the current path
    pub fn return_taken(&self) -> BitId {
        self.state.return_taken()
    }

    pub fn set_return_taken(&mut self, bit: BitId) {
        self.state.set_return_taken(bit);
    }

    /// Forget earlier returns on a path known not to have taken them
    pub fn clear_return(&mut self) {
        let width = self.bit_width();
        self.state.set_return_taken(BitId::BOT);
        self.state.set_return_value(Value::bot(width));
    }

    pub fn mods(&self) -> &Mods {
        self.mods.last().unwrap_or(&self.mods[0])
    }

    /// Fold handler or callee substitutions into the active path
    pub fn add_mods(&mut self, mods: &Mods) {
        if let Some(top) = self.mods.last_mut() {
            top.add_mods(mods);
        }
    }

    /// Apply substitutions to every binding
    pub fn apply_mods(&mut self, mods: &Mods) {
        self.state.apply(mods);
    }

    /// Enter one arm of a conditional on `cond`
    pub fn push_branch(&mut self, cond: BitId, taken: bool) {
        self.arena.push_control(cond);
        let assumed = Mods::assume(&mut self.arena, cond, taken);
        let top = self.mods().clone().overwrite(&assumed);
        trace!(%cond, taken, mods = %top, "push branch");
        self.mods.push(top);
    }

    /// Leave the arm entered last, returning its substitutions
    pub fn pop_branch(&mut self) -> Mods {
        self.arena.pop_control();
        if self.mods.len() > 1 {
            self.mods.pop().unwrap_or_default()
        } else {
            Mods::empty()
        }
    }

    /// Swap in another state, returning the current one
    pub fn replace_state(&mut self, state: State<S>) -> State<S> {
        std::mem::replace(&mut self.state, state)
    }

    pub fn snapshot(&self) -> State<S> {
        self.state.clone()
    }

    /// Join the state left by the then-arm with the current (else-arm)
    /// state under `cond`
    pub fn merge_branches(&mut self, cond: BitId, then_state: State<S>, then_mods: &Mods, else_mods: &Mods) -> FlowResult<()> {
        let names: IndexSet<String> = then_state
            .variable_names()
            .chain(self.state.variable_names())
            .map(str::to_string)
            .collect();
        for name in &names {
            let joined = ops::phi_value(&mut self.arena, &then_state.get(name), &self.state.get(name), cond);
            self.state.set_name(name, joined);
        }

        let channels: Vec<String> = then_state
            .output()
            .iter()
            .filter(|(n, _)| self.state.output().contains(n))
            .map(|(n, _)| n.to_string())
            .collect();
        for name in &channels {
            let ours = self.state.output().get(name)?.clone();
            let joined = ops::phi_value(&mut self.arena, then_state.output().get(name)?, &ours, cond);
            self.state.output_mut().set(name, joined)?;
        }

        let ret = ops::phi_value(&mut self.arena, then_state.return_value(), self.state.return_value(), cond);
        self.state.set_return_value(ret);
        let returned = ops::phi(&mut self.arena, then_state.return_taken(), self.state.return_taken(), cond);
        self.state.set_return_taken(returned);

        let arena = &self.arena;
        let mut agreed = then_mods.intersection(else_mods);
        agreed.retain(|orig, other| {
            then_mods.try_replace(orig).is_some_and(|mine| {
                mine == other || (arena.is_constant(mine) && arena.val(mine) == arena.val(other))
            })
        });
        trace!(%cond, agreed = %agreed, "merge branches");
        self.add_mods(&agreed);
        Ok(())
    }

    pub fn enter_loop(&mut self) -> LoopHeads {
        let mut heads = LoopHeads::default();
        let bindings: Vec<(String, Value)> = self
            .state
            .bindings()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect();
        for (name, value) in bindings {
            let head = value.map_bits(|b| self.arena.loop_phi(b));
            self.state.set_name(&name, head.clone());
            heads.vars.insert(name, head);
        }
        for (name, history) in self.state.output().iter() {
            heads.histories.insert(name.to_string(), history.len());
        }
        heads
    }

    /// Join the bindings left by one pass of the loop body into the heads
    /// and reset the state to them. Returns whether any head changed.
    pub fn merge_loop(&mut self, heads: &mut LoopHeads, cond: BitId) -> FlowResult<bool> {
        let mut changed = false;
        for (name, head) in heads.vars.iter_mut() {
            let body = self.state.get(name);
            if body.len() > head.len() {
                let mut bits = head.bits().to_vec();
                for i in head.len()..body.len() {
                    bits.push(self.arena.loop_phi(head.get(i)));
                }
                *head = if head.is_append_only() {
                    Value::new(bits).into_append_only()
                } else {
                    Value::new(bits)
                };
                changed = true;
            }
            for i in 0..head.len() {
                changed |= self.arena.merge_phi(head.get(i), body.get(i), Some(cond));
            }
            self.state.set_name(name, head.clone());
        }

        for (name, &entry_len) in &heads.histories {
            let history = self.state.output().get(name)?.clone();
            let appended: Value = history.iter().skip(entry_len).collect();
            let restored: Value = history.iter().take(entry_len).collect();
            self.state.output_mut().set(name, restored.into_append_only())?;
            heads.appended.insert(name.clone(), appended);
        }
        Ok(changed)
    }

    /// Force every head to unknown
    pub fn widen_loop(&mut self, heads: &LoopHeads) {
        for head in heads.vars.values() {
            for bit in head.iter() {
                self.arena.widen(bit);
            }
        }
    }

    /// Re-attach what the last pass of the body appended to each channel
    pub fn leave_loop(&mut self, heads: LoopHeads) -> FlowResult<()> {
        for (name, appended) in heads.appended {
            if !appended.is_empty() {
                let mut history = self.state.output().get(&name)?.clone();
                history.append(&appended);
                self.state.output_mut().set(&name, history)?;
            }
        }
        Ok(())
    }

    /// Bind `params` to `args` in a fresh frame that sees only the channels
    pub fn enter_frame(&mut self, params: &[String], args: &[Value]) -> FlowResult<CallFrame> {
        let frame = CallFrame {
            frame: self.state.enter_frame(),
        };
        self.symbols.push_detached();
        self.mods.push(Mods::empty());
        let width = self.bit_width();
        for (i, param) in params.iter().enumerate() {
            let value = args.get(i).cloned().unwrap_or_else(|| Value::bot(width));
            self.declare_local(param, value, false)?;
        }
        Ok(frame)
    }

    /// Restore the caller and hand back the callee's return value
    pub fn leave_frame(&mut self, frame: CallFrame) -> Value {
        self.symbols.pop();
        if self.mods.len() > 1 {
            self.mods.pop();
        }
        self.state.leave_frame(frame.frame)
    }

    /// Classify the outputs declared since the last call and whatever the
    /// channels appended since then. Calling it again without new outputs
    /// changes nothing.
    pub fn finish(&mut self) -> FlowResult<()> {
        for (name, sec) in std::mem::take(&mut self.pending) {
            let value = self.state.get(&name);
            let observed = ops::wrap_value(&mut self.arena, &value);
            self.outputs.add(&self.arena, sec, observed)?;
        }
        let channels: Vec<(String, S, Value)> = self
            .state
            .output()
            .iter()
            .filter_map(|(name, history)| {
                let sec = self.state.output().level_of(name)?;
                Some((name.to_string(), sec, history.clone()))
            })
            .collect();
        for (name, sec, history) in channels {
            let done = self.classified.get(&name).copied().unwrap_or(0);
            if history.len() <= done {
                continue;
            }
            let fresh: Value = history.iter().skip(done).collect();
            let observed = ops::wrap_value(&mut self.arena, &fresh).into_append_only();
            trace!(name, %sec, bits = observed.len(), "classified channel");
            self.outputs.add(&self.arena, sec, observed)?;
            self.classified.insert(name, history.len());
        }
        Ok(())
    }

    /// Secret input bits for an observer at `observer`
    pub fn sources(&self, observer: S) -> IndexSet<BitId> {
        self.input_bits.above(observer)
    }

    /// Output bits visible to an observer at `observer`
    pub fn sinks(&self, observer: S) -> IndexSet<BitId> {
        self.outputs
            .get_bits()
            .into_iter()
            .filter(|(sec, _)| sec.leq(observer))
            .map(|(_, bit)| bit)
            .collect()
    }

    pub fn dependency_graph(&mut self, observer: S) -> FlowResult<DependencyGraph> {
        self.finish()?;
        Ok(DependencyGraph::build(
            &self.arena,
            &self.sources(observer),
            &self.sinks(observer),
        ))
    }

    /// Leakage bound for a single observer level
    pub fn leakage_at(&mut self, observer: S, algo: leakage::Algo) -> FlowResult<LeakageResult> {
        let graph = self.dependency_graph(observer)?;
        if self.registry.enabled() {
            self.registry.store(&observer.to_string(), graph.snapshot(&self.arena));
        }
        let result = leakage::compute_on(&graph, algo, self.config.leakage_options());
        info!(%observer, %algo, leakage = result.max_flow, "leakage computed");
        Ok(result)
    }

    /// Leakage bound for every level of the lattice
    pub fn compute_leakage(&mut self, algo: leakage::Algo) -> FlowResult<BTreeMap<S, LeakageResult>> {
        S::elements()
            .iter()
            .map(|&observer| Ok((observer, self.leakage_at(observer, algo)?)))
            .collect()
    }

    /// `name => value` lines for every binding
    pub fn dump(&self) -> String {
        self.state.dump(&self.arena)
    }
}
