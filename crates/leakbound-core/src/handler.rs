//! Method invocation handlers
//!
//! A handler decides what a call contributes to the caller: a return value,
//! a [`Mods`] describing the callee's effect and the bits the callee appends
//! to output channels. Handlers never touch the
//! caller's state; they only create bits and may ask the environment to
//! analyze the callee body in a fresh frame.
//!
//! Handlers are selected with a configuration string of `key=value` pairs
//! separated by `;`, for example `handler=call_string;maxrec=2;bot=basic`.
//! A string without `=` names a handler with all properties defaulted.
//!
//! | handler       | properties                 | behavior |
//! |---------------|----------------------------|----------|
//! | `basic`       |                            | every return and appended bit depends on every argument bit |
//! | `call_string` | `maxrec` (1), `bot` (basic)| inline up to `maxrec` active frames, then `bot` |
//! | `summary`     | `bot` (basic)              | inline once, collapse the return bits onto the argument bits |

use crate::error::{FlowError, FlowResult};
use crate::lattice::{BitArena, BitId, Origin, Value, B};
use crate::mods::Mods;
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

pub const DEFAULT_HANDLER: &str = "handler=call_string;maxrec=2;bot=basic";

/// What a handler may ask of the analysis driving it
pub trait CallEnv {
    fn arena(&self) -> &BitArena;
    fn arena_mut(&mut self) -> &mut BitArena;
    fn bit_width(&self) -> usize;
    /// Number of active frames of `function`
    fn call_depth(&self, function: &str) -> usize;
    /// Declared channels `function` may append to, directly or through
    /// its callees
    fn channels_written(&self, function: &str) -> Vec<String>;
    /// Analyze the body of `function` with `args` bound to its parameters
    /// and return its return value
    fn inline(&mut self, function: &str, args: &[Value]) -> FlowResult<Value>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodReturn {
    pub value: Value,
    /// Substitutions the caller applies to its state after the call
    pub mods: Mods,
    /// Channel appends the caller performs after the call
    pub appends: Vec<(String, Value)>,
}

impl MethodReturn {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            mods: Mods::empty(),
            appends: Vec::new(),
        }
    }
}

pub trait MethodInvocationHandler {
    fn name(&self) -> &'static str;

    fn handle(&self, env: &mut dyn CallEnv, function: &str, args: &[Value]) -> FlowResult<MethodReturn>;
}

/// Fully conservative: no look at the callee body at all. Each channel the
/// callee can write gets one appended bit per unknown argument bit.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicHandler;

impl MethodInvocationHandler for BasicHandler {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn handle(&self, env: &mut dyn CallEnv, function: &str, args: &[Value]) -> FlowResult<MethodReturn> {
        let width = env.bit_width();
        let channels = env.channels_written(function);
        let arena = env.arena_mut();
        let deps: Vec<BitId> = args
            .iter()
            .flat_map(|a| a.iter())
            .filter(|&b| arena.is_unknown(b))
            .collect();
        trace!(function, deps = deps.len(), channels = channels.len(), "basic call approximation");
        let value = match args.iter().map(Value::len).max() {
            Some(len) => (0..len.max(1)).map(|_| arena.derive(B::U, Origin::Call, &deps)).collect(),
            None => Value::bot(width),
        };
        let appends = channels
            .into_iter()
            .map(|name| {
                let bits: Value = (0..deps.len().max(1))
                    .map(|_| arena.derive(B::U, Origin::Call, &deps))
                    .collect();
                (name, bits)
            })
            .collect();
        Ok(MethodReturn {
            value,
            mods: Mods::empty(),
            appends,
        })
    }
}

/// Inlining bounded by the number of active frames per function
pub struct CallStringHandler {
    max_rec: usize,
    bot: Box<dyn MethodInvocationHandler>,
}

impl CallStringHandler {
    pub fn new(max_rec: usize, bot: Box<dyn MethodInvocationHandler>) -> Self {
        Self { max_rec, bot }
    }
}

impl MethodInvocationHandler for CallStringHandler {
    fn name(&self) -> &'static str {
        "call_string"
    }

    fn handle(&self, env: &mut dyn CallEnv, function: &str, args: &[Value]) -> FlowResult<MethodReturn> {
        let depth = env.call_depth(function);
        if depth >= self.max_rec {
            debug!(function, depth, fallback = self.bot.name(), "recursion bound reached");
            return self.bot.handle(env, function, args);
        }
        let value = env.inline(function, args)?;
        Ok(MethodReturn::value(value))
    }
}

/// Inlines the callee once and replaces its return bits by bits that depend
/// directly on the argument bits (and on anything else the callee read)
pub struct SummaryHandler {
    bot: Box<dyn MethodInvocationHandler>,
}

impl SummaryHandler {
    pub fn new(bot: Box<dyn MethodInvocationHandler>) -> Self {
        Self { bot }
    }
}

impl MethodInvocationHandler for SummaryHandler {
    fn name(&self) -> &'static str {
        "summary"
    }

    fn handle(&self, env: &mut dyn CallEnv, function: &str, args: &[Value]) -> FlowResult<MethodReturn> {
        if env.call_depth(function) > 0 {
            return self.bot.handle(env, function, args);
        }

        let arena = env.arena_mut();
        let start = arena.len();
        let mut mods = Mods::empty();
        let mut bound: IndexMap<BitId, BitId> = IndexMap::new();
        let params: Vec<Value> = args
            .iter()
            .map(|arg| {
                arg.map_bits(|a| {
                    let param = arena.derive(arena.val(a), Origin::Param, &[a]);
                    if arena.is_unknown(param) {
                        bound.insert(param, a);
                        mods.add(arena, param, a);
                    }
                    param
                })
            })
            .collect();

        let ret = env.inline(function, &params)?;
        let arena = env.arena_mut();
        let value = ret.map_bits(|bit| {
            if !arena.is_unknown(bit) || bit.index() < start {
                return bit;
            }
            let deps = summary_deps(arena, bit, start, &bound);
            arena.derive(B::U, Origin::Call, &deps)
        });
        debug!(function, bits = value.len(), "summarized call");
        Ok(MethodReturn {
            value,
            mods,
            appends: Vec::new(),
        })
    }
}

/// Leaves of the callee graph below `bit`: argument bits in place of
/// parameters, bits older than the call, and fresh bits created inside
fn summary_deps(arena: &BitArena, bit: BitId, start: usize, bound: &IndexMap<BitId, BitId>) -> Vec<BitId> {
    let mut leaves = IndexSet::new();
    let mut seen = IndexSet::new();
    let mut stack = vec![bit];
    while let Some(b) = stack.pop() {
        if !seen.insert(b) {
            continue;
        }
        if let Some(&arg) = bound.get(&b) {
            leaves.insert(arg);
        } else if b.index() < start || arena.deps(b).is_empty() {
            leaves.insert(b);
        } else {
            stack.extend(arena.deps(b).iter().copied());
        }
    }
    leaves.into_iter().collect()
}

type Properties = IndexMap<String, String>;
type Factory = fn(&Properties, &HandlerRegistry) -> FlowResult<Box<dyn MethodInvocationHandler>>;

struct HandlerEntry {
    defaults: &'static [(&'static str, &'static str)],
    build: Factory,
}

/// Named handler constructors with their property defaults
pub struct HandlerRegistry {
    entries: IndexMap<&'static str, HandlerEntry>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            entries: IndexMap::new(),
        };
        registry.register("basic", &[], |_, _| Ok(Box::new(BasicHandler)));
        registry.register("call_string", &[("maxrec", "1"), ("bot", "basic")], |props, registry| {
            let max_rec = property(props, "maxrec")?
                .parse::<usize>()
                .map_err(|e| FlowError::invalid_handler(&props_line(props), format!("maxrec: {e}")))?;
            let bot = registry.parse(property(props, "bot")?)?;
            Ok(Box::new(CallStringHandler::new(max_rec, bot)))
        });
        registry.register("summary", &[("bot", "basic")], |props, registry| {
            let bot = registry.parse(property(props, "bot")?)?;
            Ok(Box::new(SummaryHandler::new(bot)))
        });
        registry
    }

    pub fn register(&mut self, name: &'static str, defaults: &'static [(&'static str, &'static str)], build: Factory) {
        self.entries.insert(name, HandlerEntry { defaults, build });
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Build a handler from a configuration string
    pub fn parse(&self, config: &str) -> FlowResult<Box<dyn MethodInvocationHandler>> {
        let config = config.trim();
        let line = if config.contains('=') {
            config.to_string()
        } else {
            format!("handler={config}")
        };

        let mut props = Properties::new();
        for part in line.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| FlowError::invalid_handler(config, format!("expected `key=value`, found `{part}`")))?;
            props.insert(key.trim().to_string(), value.trim().to_string());
        }

        let name = props
            .get("handler")
            .ok_or_else(|| FlowError::invalid_handler(config, "missing `handler` property"))?
            .clone();
        let entry = self
            .entries
            .get(name.as_str())
            .ok_or_else(|| FlowError::UnknownHandler(name.clone()))?;
        if let Some(unknown) = props
            .keys()
            .find(|k| k.as_str() != "handler" && !entry.defaults.iter().any(|(d, _)| *d == k.as_str()))
        {
            return Err(FlowError::invalid_handler(
                config,
                format!("unknown property `{unknown}` for handler `{name}`"),
            ));
        }
        for (key, default) in entry.defaults {
            props.entry(key.to_string()).or_insert_with(|| default.to_string());
        }
        (entry.build)(&props, self)
    }
}

fn property<'a>(props: &'a Properties, key: &str) -> FlowResult<&'a str> {
    props
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| FlowError::invalid_handler(&props_line(props), format!("missing `{key}` property")))
}

fn props_line(props: &Properties) -> String {
    props
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Parse a handler configuration with the built-in handlers
pub fn parse_handler_config(config: &str) -> FlowResult<Box<dyn MethodInvocationHandler>> {
    HandlerRegistry::new().parse(config)
}
