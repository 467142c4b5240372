//! Abstract interpreter over the serde program representation
//!
//! Walks a [`Program`] once, evaluating every expression on bit values and
//! recording all bit dependencies in the [`Context`]. Calls go through the
//! configured [`MethodInvocationHandler`], which may inline callee bodies
//! through the [`CallEnv`] implementation of [`Interpreter`].

mod ast;

pub use ast::{Effects, Expr, Function, Program, Stmt};

use crate::config::AnalysisConfig;
use crate::context::Context;
use crate::error::{FlowError, FlowResult};
use crate::handler::{parse_handler_config, CallEnv, MethodInvocationHandler};
use crate::lattice::{BitArena, BitId, Sec, Value, B};
use crate::ops;
use indexmap::{IndexMap, IndexSet};
use std::rc::Rc;
use tracing::{debug, trace};

/// How control leaves a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Return,
}

pub struct Interpreter<'p, S: Sec> {
    program: &'p Program,
    functions: IndexMap<&'p str, &'p Function>,
    /// Channels each function may append to
    writes: IndexMap<&'p str, IndexSet<&'p str>>,
    ctx: Context<S>,
    handler: Rc<dyn MethodInvocationHandler>,
    calls: Vec<String>,
}

impl<'p, S: Sec> Interpreter<'p, S> {
    pub fn new(program: &'p Program, config: AnalysisConfig) -> FlowResult<Self> {
        let handler: Rc<dyn MethodInvocationHandler> = Rc::from(parse_handler_config(&config.handler)?);
        Ok(Self::with_context(program, Context::new(config), handler))
    }

    pub fn with_context(program: &'p Program, ctx: Context<S>, handler: Rc<dyn MethodInvocationHandler>) -> Self {
        let functions = program.functions.iter().map(|f| (f.name.as_str(), f)).collect();
        Self {
            program,
            functions,
            writes: channel_writes(program),
            ctx,
            handler,
            calls: Vec::new(),
        }
    }

    pub fn context(&self) -> &Context<S> {
        &self.ctx
    }

    /// Interpret the program body and classify its outputs
    pub fn run(mut self) -> FlowResult<Context<S>> {
        debug!(
            statements = self.program.body.len(),
            functions = self.functions.len(),
            handler = self.handler.name(),
            "interpreting program"
        );
        let program = self.program;
        self.exec_block(&program.body)?;
        self.ctx.finish()?;
        Ok(self.ctx)
    }

    fn level(&self, name: &str) -> FlowResult<S> {
        S::parse(name).ok_or_else(|| FlowError::UnknownSecurityLevel(name.to_string()))
    }

    fn exec_block(&mut self, stmts: &'p [Stmt]) -> FlowResult<Flow> {
        for (i, stmt) in stmts.iter().enumerate() {
            if self.exec(stmt)? == Flow::Return {
                return Ok(Flow::Return);
            }
            let returned = self.ctx.return_taken();
            match self.ctx.arena().val(returned) {
                B::One => return Ok(Flow::Return),
                B::U => return self.exec_unless_returned(returned, &stmts[i + 1..]),
                _ => {}
            }
        }
        Ok(Flow::Continue)
    }

    /// Run the rest of a block after a `return` that only some paths took.
    /// The rest runs as the arm where `returned` is false and is joined with
    /// the paths that already returned.
    fn exec_unless_returned(&mut self, returned: BitId, rest: &'p [Stmt]) -> FlowResult<Flow> {
        if rest.is_empty() {
            return Ok(Flow::Continue);
        }
        trace!(%returned, statements = rest.len(), "guarding statements after return");
        let returned_state = self.ctx.snapshot();
        self.ctx.push_branch(returned, true);
        let returned_mods = self.ctx.pop_branch();

        self.ctx.push_branch(returned, false);
        self.ctx.clear_return();
        let flow = self.exec_block(rest);
        let rest_mods = self.ctx.pop_branch();
        flow?;
        self.ctx.merge_branches(returned, returned_state, &returned_mods, &rest_mods)?;
        Ok(Flow::Continue)
    }

    fn exec_scoped(&mut self, stmts: &'p [Stmt]) -> FlowResult<Flow> {
        self.ctx.push_scope();
        let flow = self.exec_block(stmts);
        self.ctx.pop_scope();
        flow
    }

    fn exec(&mut self, stmt: &'p Stmt) -> FlowResult<Flow> {
        match stmt {
            Stmt::Input { sec, name, bits } => {
                let sec = self.level(sec)?;
                self.ctx.declare_input(sec, name, bits.as_deref())?;
            }
            Stmt::Output { sec, name, value } => {
                let sec = self.level(sec)?;
                let value = self.eval(value)?;
                self.ctx.declare_output(sec, name, value)?;
            }
            Stmt::Channel { sec, name } => {
                let sec = self.level(sec)?;
                self.ctx.declare_channel(sec, name)?;
            }
            Stmt::Append { name, value } => {
                let value = self.eval(value)?;
                self.ctx.append(name, value)?;
            }
            Stmt::Local { name, value, append } => {
                let value = self.eval(value)?;
                self.ctx.declare_local(name, value, *append)?;
            }
            Stmt::Assign { name, value } => {
                let value = self.eval(value)?;
                self.ctx.assign(name, value)?;
            }
            Stmt::If { cond, then, otherwise } => return self.exec_if(cond, then, otherwise),
            Stmt::While { cond, body } => self.exec_while(cond, body)?,
            Stmt::Return { value } => {
                let value = self.eval(value)?;
                let returned = self.ctx.return_taken();
                let joined = if returned == BitId::BOT {
                    value
                } else {
                    let previous = self.ctx.return_value().clone();
                    ops::phi_value(self.ctx.arena_mut(), &previous, &value, returned)
                };
                self.ctx.set_return_value(joined);
                let taken = self.ctx.arena_mut().constant(true);
                self.ctx.set_return_taken(taken);
                return Ok(Flow::Return);
            }
            Stmt::Expr { value } => {
                self.eval(value)?;
            }
        }
        Ok(Flow::Continue)
    }

    fn condition(&mut self, cond: &'p Expr) -> FlowResult<BitId> {
        let value = self.eval(cond)?;
        Ok(ops::truth_bit(self.ctx.arena_mut(), &value))
    }

    fn exec_if(&mut self, cond: &'p Expr, then: &'p [Stmt], otherwise: &'p [Stmt]) -> FlowResult<Flow> {
        let c = self.condition(cond)?;
        match self.ctx.arena().val(c).as_bool() {
            Some(true) => return self.exec_scoped(then),
            Some(false) => return self.exec_scoped(otherwise),
            None => {}
        }

        let entry = self.ctx.snapshot();
        self.ctx.push_branch(c, true);
        let then_flow = self.exec_scoped(then)?;
        let then_mods = self.ctx.pop_branch();
        let then_state = self.ctx.replace_state(entry);

        self.ctx.push_branch(c, false);
        let else_flow = self.exec_scoped(otherwise)?;
        let else_mods = self.ctx.pop_branch();

        self.ctx.merge_branches(c, then_state, &then_mods, &else_mods)?;
        if then_flow == Flow::Return && else_flow == Flow::Return {
            Ok(Flow::Return)
        } else {
            Ok(Flow::Continue)
        }
    }

    /// Fixpoint over the loop heads. Once the iteration cap is hit the heads
    /// are widened to unknown and the body is evaluated one final time so
    /// that its dependencies are recorded against the widened heads.
    ///
    /// A `return` in the body is joined under the loop condition into the
    /// return state before the pass.
    fn exec_while(&mut self, cond: &'p Expr, body: &'p [Stmt]) -> FlowResult<()> {
        let cap = self.ctx.config().max_loop_iterations.max(1);
        let mut heads = self.ctx.enter_loop();
        let mut exit = (self.ctx.return_taken(), self.ctx.return_value().clone());
        let mut iteration = 0;
        let mut widened = false;
        loop {
            iteration += 1;
            let c = self.condition(cond)?;
            if self.ctx.arena().val(c) == B::Zero {
                break;
            }
            self.ctx.push_branch(c, true);
            let flow = self.exec_scoped(body);
            self.ctx.pop_branch();
            flow?;
            if self.ctx.return_taken() != exit.0 {
                exit = self.join_return(exit, c);
                if self.ctx.arena().val(exit.0) == B::One {
                    break;
                }
            }
            let changed = self.ctx.merge_loop(&mut heads, c)?;
            trace!(iteration, changed, "loop iteration");
            if widened || !changed {
                break;
            }
            if iteration >= cap {
                debug!(iteration, heads = heads.len(), "widening loop heads");
                self.ctx.widen_loop(&heads);
                widened = true;
            }
        }
        self.ctx.leave_loop(heads)
    }

    /// Join the return state left by a loop pass with `before` under `cond`
    fn join_return(&mut self, before: (BitId, Value), cond: BitId) -> (BitId, Value) {
        let (returned, ret) = before;
        let body_ret = self.ctx.return_value().clone();
        let body_returned = self.ctx.return_taken();
        let joined = ops::phi(self.ctx.arena_mut(), returned, body_returned, cond);
        let value = ops::phi_value(self.ctx.arena_mut(), &ret, &body_ret, cond);
        self.ctx.set_return_taken(joined);
        self.ctx.set_return_value(value.clone());
        (joined, value)
    }

    fn eval(&mut self, expr: &'p Expr) -> FlowResult<Value> {
        let width = self.ctx.bit_width();
        match expr {
            Expr::Lit(n) => Ok(Value::constant(self.ctx.arena_mut(), *n, width)),
            Expr::Var(name) => self.ctx.read(name),
            Expr::Unary { op, arg } => {
                let x = self.eval(arg)?;
                Ok(ops::unary(self.ctx.arena_mut(), *op, &x, width))
            }
            Expr::Binary { op, lhs, rhs } => {
                let x = self.eval(lhs)?;
                let y = self.eval(rhs)?;
                Ok(ops::binary(self.ctx.arena_mut(), *op, &x, &y, width))
            }
            Expr::Select { arg, index } => {
                let x = self.eval(arg)?;
                Ok(ops::select(self.ctx.arena_mut(), &x, *index))
            }
            Expr::Call { function, args } => {
                if !self.functions.contains_key(function.as_str()) {
                    return Err(FlowError::UnknownFunction(function.clone()));
                }
                let args = args.iter().map(|a| self.eval(a)).collect::<FlowResult<Vec<_>>>()?;
                let handler = Rc::clone(&self.handler);
                let ret = handler.handle(self, function, &args)?;
                if !ret.mods.is_empty() {
                    self.ctx.apply_mods(&ret.mods);
                }
                for (channel, bits) in ret.appends {
                    self.ctx.append(&channel, bits)?;
                }
                Ok(ret.value)
            }
        }
    }
}

impl<S: Sec> CallEnv for Interpreter<'_, S> {
    fn arena(&self) -> &BitArena {
        self.ctx.arena()
    }

    fn arena_mut(&mut self) -> &mut BitArena {
        self.ctx.arena_mut()
    }

    fn bit_width(&self) -> usize {
        self.ctx.bit_width()
    }

    fn call_depth(&self, function: &str) -> usize {
        self.calls.iter().filter(|f| *f == function).count()
    }

    fn channels_written(&self, function: &str) -> Vec<String> {
        self.writes
            .get(function)
            .into_iter()
            .flatten()
            .filter(|name| self.ctx.state().output().contains(name))
            .map(|name| name.to_string())
            .collect()
    }

    fn inline(&mut self, function: &str, args: &[Value]) -> FlowResult<Value> {
        let callee = *self
            .functions
            .get(function)
            .ok_or_else(|| FlowError::UnknownFunction(function.to_string()))?;
        trace!(function, depth = self.calls.len(), "inlining call");
        self.calls.push(function.to_string());
        let frame = self.ctx.enter_frame(&callee.params, args)?;
        let flow = self.exec_block(&callee.body);
        let ret = self.ctx.leave_frame(frame);
        self.calls.pop();
        flow?;
        Ok(ret)
    }
}

/// Channels each function appends to, directly or through its callees
fn channel_writes(program: &Program) -> IndexMap<&str, IndexSet<&str>> {
    let effects: Vec<(&str, Effects<'_>)> = program
        .functions
        .iter()
        .map(|f| (f.name.as_str(), f.effects()))
        .collect();
    let mut writes: IndexMap<&str, IndexSet<&str>> = effects
        .iter()
        .map(|(name, effects)| (*name, effects.appends.clone()))
        .collect();
    let mut changed = true;
    while changed {
        changed = false;
        for (name, effects) in &effects {
            let inherited: Vec<&str> = effects
                .calls
                .iter()
                .filter_map(|callee| writes.get(callee))
                .flatten()
                .copied()
                .collect();
            if let Some(own) = writes.get_mut(name) {
                for channel in inherited {
                    changed |= own.insert(channel);
                }
            }
        }
    }
    writes
}

/// Interpret `program` and return the context ready for leakage queries
pub fn analyze<S: Sec>(program: &Program, config: AnalysisConfig) -> FlowResult<Context<S>> {
    Interpreter::new(program, config)?.run()
}
