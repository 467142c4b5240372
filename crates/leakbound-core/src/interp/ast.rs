//! Program representation consumed by the interpreter
//!
//! Programs are plain serde data. In JSON every statement and expression is
//! an object with a single snake_case key naming the variant:
//!
//! ```json
//! {"body": [
//!   {"input": {"sec": "h", "name": "h"}},
//!   {"output": {"sec": "l", "name": "o", "value": {"var": "h"}}}
//! ]}
//! ```

use crate::ops::{BinOp, UnOp};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Lit(i64),
    Var(String),
    Unary {
        op: UnOp,
        arg: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Single bit of `arg`, least significant is index 0
    Select {
        arg: Box<Expr>,
        index: usize,
    },
    Call {
        function: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn lit(n: i64) -> Self {
        Expr::Lit(n)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn unary(op: UnOp, arg: Expr) -> Self {
        Expr::Unary { op, arg: Box::new(arg) }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn select(arg: Expr, index: usize) -> Self {
        Expr::Select {
            arg: Box::new(arg),
            index,
        }
    }

    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            function: function.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stmt {
    /// Input at level `sec`; `bits` is a template such as `0b0uu`
    Input {
        sec: String,
        name: String,
        #[serde(default)]
        bits: Option<String>,
    },
    /// Scalar output, observed with its final value
    Output {
        sec: String,
        name: String,
        value: Expr,
    },
    /// Append-only output channel
    Channel {
        sec: String,
        name: String,
    },
    Append {
        name: String,
        value: Expr,
    },
    Local {
        name: String,
        value: Expr,
        #[serde(default)]
        append: bool,
    },
    Assign {
        name: String,
        value: Expr,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        #[serde(default)]
        otherwise: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return {
        value: Expr,
    },
    Expr {
        value: Expr,
    },
}

impl Stmt {
    pub fn input(sec: &str, name: &str) -> Self {
        Stmt::Input {
            sec: sec.to_string(),
            name: name.to_string(),
            bits: None,
        }
    }

    pub fn input_bits(sec: &str, name: &str, bits: &str) -> Self {
        Stmt::Input {
            sec: sec.to_string(),
            name: name.to_string(),
            bits: Some(bits.to_string()),
        }
    }

    pub fn output(sec: &str, name: &str, value: Expr) -> Self {
        Stmt::Output {
            sec: sec.to_string(),
            name: name.to_string(),
            value,
        }
    }

    pub fn channel(sec: &str, name: &str) -> Self {
        Stmt::Channel {
            sec: sec.to_string(),
            name: name.to_string(),
        }
    }

    pub fn append(name: &str, value: Expr) -> Self {
        Stmt::Append {
            name: name.to_string(),
            value,
        }
    }

    pub fn local(name: &str, value: Expr) -> Self {
        Stmt::Local {
            name: name.to_string(),
            value,
            append: false,
        }
    }

    pub fn assign(name: &str, value: Expr) -> Self {
        Stmt::Assign {
            name: name.to_string(),
            value,
        }
    }

    pub fn if_else(cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt>) -> Self {
        Stmt::If { cond, then, otherwise }
    }

    pub fn while_loop(cond: Expr, body: Vec<Stmt>) -> Self {
        Stmt::While { cond, body }
    }

    pub fn ret(value: Expr) -> Self {
        Stmt::Return { value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

impl Function {
    pub fn new(name: &str, params: &[&str], body: Vec<Stmt>) -> Self {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        }
    }

    /// Names appended to and functions called anywhere in the body
    pub fn effects(&self) -> Effects<'_> {
        let mut effects = Effects::default();
        effects.block(&self.body);
        effects
    }
}

/// Syntactic effects of a function body
#[derive(Debug, Default)]
pub struct Effects<'a> {
    pub appends: IndexSet<&'a str>,
    pub calls: IndexSet<&'a str>,
}

impl<'a> Effects<'a> {
    fn block(&mut self, stmts: &'a [Stmt]) {
        for stmt in stmts {
            match stmt {
                Stmt::Input { .. } | Stmt::Channel { .. } => {}
                Stmt::Append { name, value } => {
                    self.appends.insert(name.as_str());
                    self.expr(value);
                }
                Stmt::Output { value, .. }
                | Stmt::Local { value, .. }
                | Stmt::Assign { value, .. }
                | Stmt::Return { value }
                | Stmt::Expr { value } => self.expr(value),
                Stmt::If { cond, then, otherwise } => {
                    self.expr(cond);
                    self.block(then);
                    self.block(otherwise);
                }
                Stmt::While { cond, body } => {
                    self.expr(cond);
                    self.block(body);
                }
            }
        }
    }

    fn expr(&mut self, expr: &'a Expr) {
        match expr {
            Expr::Lit(_) | Expr::Var(_) => {}
            Expr::Unary { arg, .. } | Expr::Select { arg, .. } => self.expr(arg),
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            Expr::Call { function, args } => {
                self.calls.insert(function.as_str());
                for arg in args {
                    self.expr(arg);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub functions: Vec<Function>,
    pub body: Vec<Stmt>,
}

impl Program {
    pub fn new(body: Vec<Stmt>) -> Self {
        Self {
            functions: Vec::new(),
            body,
        }
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let program = Program::from_json(
            r#"{"body": [
                {"input": {"sec": "h", "name": "h", "bits": "0bu"}},
                {"output": {"sec": "l", "name": "o",
                    "value": {"binary": {"op": "and", "lhs": {"var": "h"}, "rhs": {"lit": 1}}}}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            program,
            Program::new(vec![
                Stmt::input_bits("h", "h", "0bu"),
                Stmt::output("l", "o", Expr::binary(BinOp::And, Expr::var("h"), Expr::lit(1))),
            ])
        );
    }

    #[test]
    fn test_roundtrip_with_functions() {
        let program = Program::new(vec![Stmt::local("x", Expr::call("id", vec![Expr::lit(3)]))])
            .with_function(Function::new("id", &["a"], vec![Stmt::ret(Expr::var("a"))]));
        let json = serde_json::to_string(&program).unwrap();
        assert_eq!(Program::from_json(&json).unwrap(), program);
    }

    #[test]
    fn test_effects_of_nested_body() {
        let f = Function::new(
            "f",
            &["a"],
            vec![
                Stmt::if_else(
                    Expr::call("g", vec![Expr::var("a")]),
                    vec![Stmt::append("out", Expr::var("a"))],
                    vec![Stmt::while_loop(Expr::var("a"), vec![Stmt::append("log", Expr::lit(1))])],
                ),
                Stmt::ret(Expr::unary(UnOp::Not, Expr::call("h", vec![]))),
            ],
        );
        let effects = f.effects();
        assert_eq!(effects.appends.iter().copied().collect::<Vec<_>>(), vec!["out", "log"]);
        assert_eq!(effects.calls.iter().copied().collect::<Vec<_>>(), vec!["g", "h"]);
    }
}
