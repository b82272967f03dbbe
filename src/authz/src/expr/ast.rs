//! Compiled matcher expression tree

use serde_json::Value;
use std::fmt;

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
        };
        f.write_str(symbol)
    }
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// String, number or boolean literal
    Literal(Value),

    /// `scope.field[.attr...]`, e.g. `r.sub` or `r.sub.age`
    Ref {
        scope: String,
        field: String,
        path: Vec<String>,
    },

    /// Parenthesized, comma-separated tuple: `('a', 'b')`
    List(Vec<Expr>),

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// Call to a registered function or role graph
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Dotted name of a reference node, used in error messages
    pub fn reference_name(scope: &str, field: &str, path: &[String]) -> String {
        let mut name = format!("{}.{}", scope, field);
        for segment in path {
            name.push('.');
            name.push_str(segment);
        }
        name
    }

    /// Visit every function name called anywhere in the tree
    pub fn called_functions(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_calls(&mut names);
        names
    }

    fn collect_calls<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) | Expr::Ref { .. } => {}
            Expr::List(items) => items.iter().for_each(|item| item.collect_calls(names)),
            Expr::Unary { operand, .. } => operand.collect_calls(names),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_calls(names);
                rhs.collect_calls(names);
            }
            Expr::Call { name, args } => {
                names.push(name.as_str());
                args.iter().for_each(|arg| arg.collect_calls(names));
            }
        }
    }
}
