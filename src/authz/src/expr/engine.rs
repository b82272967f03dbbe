//! Matcher compilation with program caching and the tree-walking evaluator

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::{Number, Value};
use std::borrow::Cow;
use std::num::NonZeroUsize;
use std::sync::Arc;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::context::EvalContext;
use super::error::{ExprError, Result};
use super::functions::string_args;
use super::parser;

/// Maximum nesting of `eval()` calls
const MAX_EVAL_DEPTH: usize = 8;

/// Default bound on cached ad-hoc and `eval()` programs
pub const DEFAULT_TRANSIENT_CAPACITY: usize = 1024;

/// A compiled matcher expression
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    source: String,
    expr: Expr,
}

impl Program {
    /// Source text this program was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Root of the expression tree
    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

/// Engine for compiling and evaluating matcher expressions
///
/// Model matchers are pinned for the engine's lifetime. Everything else
/// (ad-hoc matchers, `eval()` sources taken from policy fields) goes through
/// a bounded LRU.
pub struct Engine {
    /// Pinned programs (thread-safe)
    program_cache: Arc<DashMap<String, Arc<Program>>>,

    /// Least recently used programs beyond the pinned set
    transient: Mutex<LruCache<String, Arc<Program>>>,
}

impl Engine {
    /// Create a new engine
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TRANSIENT_CAPACITY)
    }

    /// Create an engine caching at most `capacity` unpinned programs
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            program_cache: Arc::new(DashMap::new()),
            transient: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Compile an expression, reusing a cached program when available
    ///
    /// # Errors
    /// Returns a compile error if the source is not a valid expression
    pub fn compile(&self, source: &str) -> Result<Arc<Program>> {
        if let Some(program) = self.program_cache.get(source) {
            return Ok(program.clone());
        }
        if let Some(program) = self.transient.lock().get(source) {
            return Ok(program.clone());
        }

        let program = parse_program(source)?;
        self.transient.lock().put(source.to_string(), program.clone());
        Ok(program)
    }

    /// Compile an expression and keep it until [`Engine::clear_cache`]
    pub fn compile_pinned(&self, source: &str) -> Result<Arc<Program>> {
        if let Some(program) = self.program_cache.get(source) {
            return Ok(program.clone());
        }

        let program = parse_program(source)?;
        self.transient.lock().pop(source);
        self.program_cache.insert(source.to_string(), program.clone());
        Ok(program)
    }

    /// Evaluate a compiled program to a boolean
    ///
    /// # Errors
    /// Returns an evaluation error for unbound references, unknown functions,
    /// incompatible operand types, or a non-boolean result
    pub fn evaluate(&self, program: &Program, ctx: &EvalContext<'_>) -> Result<bool> {
        match self.eval(&program.expr, ctx, 0)?.as_ref() {
            Value::Bool(b) => Ok(*b),
            _ => Err(ExprError::NonBooleanResult),
        }
    }

    /// Compile and evaluate an expression in one call
    pub fn evaluate_expression(&self, source: &str, ctx: &EvalContext<'_>) -> Result<bool> {
        let program = self.compile(source)?;
        self.evaluate(&program, ctx)
    }

    /// Clear the compiled program cache
    pub fn clear_cache(&self) {
        self.program_cache.clear();
        self.transient.lock().clear();
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        let pinned = self.program_cache.len();
        let transient = self.transient.lock().len();
        CacheStats {
            size: pinned + transient,
            pinned,
        }
    }

    fn eval<'v>(&self, expr: &'v Expr, ctx: &EvalContext<'v>, depth: usize) -> Result<Cow<'v, Value>> {
        match expr {
            Expr::Literal(value) => Ok(Cow::Borrowed(value)),
            Expr::Ref { scope, field, path } => resolve(ctx, scope, field, path),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item, ctx, depth).map(Cow::into_owned))
                .collect::<Result<Vec<_>>>()
                .map(|values| Cow::Owned(Value::Array(values))),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, ctx, depth)?;
                match (op, value.as_ref()) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Cow::Owned(Value::Bool(!b))),
                    (UnaryOp::Neg, Value::Number(n)) => number(-as_f64(n)),
                    (UnaryOp::Not, other) => Err(mismatch(format!("'!' needs a boolean, got {}", other))),
                    (UnaryOp::Neg, other) => Err(mismatch(format!("'-' needs a number, got {}", other))),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, ctx, depth),
            Expr::Call { name, args } => self.eval_call(name, args, ctx, depth).map(Cow::Owned),
        }
    }

    fn eval_binary<'v>(
        &self,
        op: BinaryOp,
        lhs: &'v Expr,
        rhs: &'v Expr,
        ctx: &EvalContext<'v>,
        depth: usize,
    ) -> Result<Cow<'v, Value>> {
        // Logical operators short-circuit
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let left = expect_bool(op, self.eval(lhs, ctx, depth)?.as_ref())?;
            if (op == BinaryOp::And && !left) || (op == BinaryOp::Or && left) {
                return Ok(Cow::Owned(Value::Bool(left)));
            }
            let right = expect_bool(op, self.eval(rhs, ctx, depth)?.as_ref())?;
            return Ok(Cow::Owned(Value::Bool(right)));
        }

        let left = self.eval(lhs, ctx, depth)?;
        let right = self.eval(rhs, ctx, depth)?;
        let (left, right) = (left.as_ref(), right.as_ref());

        let result = match op {
            BinaryOp::Eq => Value::Bool(equals(op, left, right)?),
            BinaryOp::Ne => Value::Bool(!equals(op, left, right)?),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = compare(op, left, right)?;
                Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
            BinaryOp::In => match right {
                Value::Array(items) => Value::Bool(items.iter().any(|item| loose_equals(left, item))),
                other => return Err(mismatch(format!("'in' needs a list on the right, got {}", other))),
            },
            BinaryOp::Add => match (left, right) {
                (Value::Number(a), Value::Number(b)) => return number(as_f64(a) + as_f64(b)),
                (Value::String(a), Value::String(b)) => Value::String(format!("{}{}", a, b)),
                _ => return Err(mismatch(format!("cannot apply '+' to {} and {}", left, right))),
            },
            BinaryOp::Sub => match (left, right) {
                (Value::Number(a), Value::Number(b)) => return number(as_f64(a) - as_f64(b)),
                _ => return Err(mismatch(format!("cannot apply '-' to {} and {}", left, right))),
            },
            BinaryOp::And | BinaryOp::Or => unreachable!("logical operators handled above"),
        };

        Ok(Cow::Owned(result))
    }

    fn eval_call<'v>(
        &self,
        name: &str,
        args: &'v [Expr],
        ctx: &EvalContext<'v>,
        depth: usize,
    ) -> Result<Value> {
        let values = args
            .iter()
            .map(|arg| self.eval(arg, ctx, depth).map(Cow::into_owned))
            .collect::<Result<Vec<_>>>()?;

        if name == "eval" {
            let [source] = string_args::<1>(name, &values)?;
            if depth >= MAX_EVAL_DEPTH {
                return Err(ExprError::EvalDepthExceeded(MAX_EVAL_DEPTH));
            }
            let program = self.compile(source)?;
            return self.eval(&program.expr, ctx, depth + 1).map(Cow::into_owned);
        }

        if let Some(function) = ctx.functions().get(name) {
            return function(&values);
        }

        if let Some(graphs) = ctx.role_graphs() {
            if name == "hasLink" {
                let Some((graph, rest)) = values.split_first() else {
                    return Err(link_arity(name, 0));
                };
                let graph = graph
                    .as_str()
                    .ok_or_else(|| mismatch(format!("hasLink expects a graph name, got {}", graph)))?;
                let role_graph = graphs
                    .get(graph)
                    .ok_or_else(|| ExprError::UnknownFunction(format!("hasLink: no role graph '{}'", graph)))?;
                return has_link(role_graph, name, rest);
            }

            if let Some(role_graph) = graphs.get(name) {
                return has_link(role_graph, name, &values);
            }
        }

        Err(ExprError::UnknownFunction(name.to_string()))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cached programs
    pub size: usize,

    /// How many of them are pinned
    pub pinned: usize,
}

fn parse_program(source: &str) -> Result<Arc<Program>> {
    Ok(Arc::new(Program {
        source: source.to_string(),
        expr: parser::parse(source)?,
    }))
}

fn has_link(graph: &crate::rbac::RoleGraph, name: &str, args: &[Value]) -> Result<Value> {
    let linked = match args.len() {
        2 => {
            let [a, b] = string_args::<2>(name, args)?;
            graph.has_link(a, b, None)
        }
        3 => {
            let [a, b, domain] = string_args::<3>(name, args)?;
            graph.has_link(a, b, Some(domain))
        }
        got => return Err(link_arity(name, got)),
    };
    Ok(Value::Bool(linked))
}

fn link_arity(name: &str, got: usize) -> ExprError {
    ExprError::Arity {
        name: name.to_string(),
        expected: "2 or 3",
        got,
    }
}

fn resolve<'v>(ctx: &EvalContext<'v>, scope: &str, field: &str, path: &[String]) -> Result<Cow<'v, Value>> {
    let unbound = || ExprError::UnboundReference(Expr::reference_name(scope, field, path));

    let mut value = ctx.lookup(scope, field).ok_or_else(unbound)?;
    for segment in path {
        value = match value {
            Cow::Borrowed(v) => Cow::Borrowed(v.get(segment).ok_or_else(unbound)?),
            Cow::Owned(v) => Cow::Owned(v.get(segment).cloned().ok_or_else(unbound)?),
        };
    }
    Ok(value)
}

fn mismatch(message: String) -> ExprError {
    ExprError::TypeMismatch(message)
}

fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

fn number<'v>(n: f64) -> Result<Cow<'v, Value>> {
    Number::from_f64(n)
        .map(|num| Cow::Owned(Value::Number(num)))
        .ok_or_else(|| mismatch(format!("arithmetic produced a non-finite number ({})", n)))
}

fn expect_bool(op: BinaryOp, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| mismatch(format!("'{}' needs boolean operands, got {}", op, value)))
}

fn equals(op: BinaryOp, left: &Value, right: &Value) -> Result<bool> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(as_f64(a) == as_f64(b)),
        (Value::String(_), Value::String(_))
        | (Value::Bool(_), Value::Bool(_))
        | (Value::Null, Value::Null)
        | (Value::Array(_), Value::Array(_))
        | (Value::Object(_), Value::Object(_)) => Ok(left == right),
        _ => Err(mismatch(format!("cannot apply '{}' to {} and {}", op, left, right))),
    }
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => as_f64(a) == as_f64(b),
        _ => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => as_f64(a)
            .partial_cmp(&as_f64(b))
            .ok_or_else(|| mismatch(format!("cannot order {} and {}", left, right))),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(mismatch(format!("cannot apply '{}' to {} and {}", op, left, right))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::FunctionMap;
    use crate::rbac::{RoleGraph, RoleGraphs};
    use serde_json::json;

    fn tokens(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    struct Fixture {
        functions: FunctionMap,
        graphs: RoleGraphs,
        r_tokens: Vec<String>,
        r_values: Vec<Value>,
        p_tokens: Vec<String>,
        p_fields: Vec<String>,
    }

    impl Fixture {
        fn new(request: Vec<Value>, policy: &[&str]) -> Self {
            let mut graph = RoleGraph::new("g");
            graph.add_link("alice", "admin", None);
            graph.add_link("admin", "staff", None);
            graph.add_link("bob", "admin", Some("tenant1"));

            let mut graphs = RoleGraphs::new();
            graphs.insert("g".to_string(), graph);

            Self {
                functions: FunctionMap::default(),
                graphs,
                r_tokens: tokens(&["sub", "obj", "act"]),
                r_values: request,
                p_tokens: tokens(&["sub", "obj", "act", "rule"]),
                p_fields: tokens(policy),
            }
        }

        fn ctx(&self) -> EvalContext<'_> {
            EvalContext::new(&self.functions)
                .with_request("r", &self.r_tokens, &self.r_values)
                .with_policy("p", &self.p_tokens, &self.p_fields)
                .with_role_graphs(&self.graphs)
        }
    }

    fn alice_reads_data1() -> Fixture {
        Fixture::new(
            vec![json!("alice"), json!("data1"), json!("read")],
            &["staff", "data1", "read", "r.act == 'read'"],
        )
    }

    #[test]
    fn test_engine_creation() {
        let engine = Engine::new();
        assert_eq!(engine.cache_stats().size, 0);
    }

    #[test]
    fn test_transient_programs_are_bounded() {
        let engine = Engine::with_capacity(2);
        engine.compile_pinned("r.sub == p.sub").unwrap();

        for i in 0..5 {
            engine.compile(&format!("r.act == 'act{}'", i)).unwrap();
        }

        let stats = engine.cache_stats();
        assert_eq!(stats.pinned, 1);
        assert_eq!(stats.size, 3);

        // Pinned programs survive any amount of ad-hoc traffic
        assert!(Arc::ptr_eq(
            &engine.compile("r.sub == p.sub").unwrap(),
            &engine.compile_pinned("r.sub == p.sub").unwrap()
        ));

        engine.clear_cache();
        assert_eq!(engine.cache_stats().size, 0);
    }

    #[test]
    fn test_simple_expression() {
        let engine = Engine::new();
        let fixture = alice_reads_data1();

        assert!(engine.evaluate_expression("true", &fixture.ctx()).unwrap());
        assert!(!engine.evaluate_expression("false", &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_request_policy_comparison() {
        let engine = Engine::new();
        let fixture = alice_reads_data1();
        let ctx = fixture.ctx();

        assert!(engine.evaluate_expression("r.obj == p.obj && r.act == p.act", &ctx).unwrap());
        assert!(!engine.evaluate_expression("r.sub == p.sub", &ctx).unwrap());
        assert!(engine.evaluate_expression("r.sub != p.sub", &ctx).unwrap());
    }

    #[test]
    fn test_role_graph_call_is_transitive() {
        let engine = Engine::new();
        let fixture = alice_reads_data1();
        let ctx = fixture.ctx();

        assert!(engine.evaluate_expression("g(r.sub, p.sub)", &ctx).unwrap());
        assert!(engine.evaluate_expression("hasLink('g', r.sub, 'admin')", &ctx).unwrap());
        assert!(!engine.evaluate_expression("g('bob', 'admin')", &ctx).unwrap());
        assert!(engine.evaluate_expression("g('bob', 'admin', 'tenant1')", &ctx).unwrap());
        assert!(matches!(
            engine.evaluate_expression("g(r.sub)", &ctx).unwrap_err(),
            ExprError::Arity { .. }
        ));
    }

    #[test]
    fn test_builtin_functions() {
        let engine = Engine::new();
        let fixture = Fixture::new(
            vec![json!("alice"), json!("/data/1"), json!("GET")],
            &["alice", "/data/*", "(GET)|(HEAD)", ""],
        );
        let ctx = fixture.ctx();

        assert!(engine
            .evaluate_expression("keyMatch(r.obj, p.obj) && regexMatch(r.act, p.act)", &ctx)
            .unwrap());
    }

    #[test]
    fn test_attribute_access_and_numbers() {
        let engine = Engine::new();
        let fixture = Fixture::new(
            vec![json!({"name": "alice", "age": 30}), json!({"owner": "alice"}), json!("read")],
            &["", "", "", ""],
        );
        let ctx = fixture.ctx();

        assert!(engine.evaluate_expression("r.sub.age >= 18 && r.sub.age < 65", &ctx).unwrap());
        assert!(engine.evaluate_expression("r.sub.name == r.obj.owner", &ctx).unwrap());
        assert!(engine.evaluate_expression("r.sub.age + 1 == 31", &ctx).unwrap());
        assert!(matches!(
            engine.evaluate_expression("r.sub.height > 1", &ctx).unwrap_err(),
            ExprError::UnboundReference(name) if name == "r.sub.height"
        ));
    }

    #[test]
    fn test_membership() {
        let engine = Engine::new();
        let fixture = alice_reads_data1();
        let ctx = fixture.ctx();

        assert!(engine.evaluate_expression("r.act in ('read', 'write')", &ctx).unwrap());
        assert!(!engine.evaluate_expression("r.act in ('delete', 'write')", &ctx).unwrap());
        assert!(engine.evaluate_expression("r.sub in ('alice')", &ctx).is_err());
    }

    #[test]
    fn test_eval_policy_rule() {
        let engine = Engine::new();
        let fixture = alice_reads_data1();
        let ctx = fixture.ctx();

        assert!(engine.evaluate_expression("eval(p.rule)", &ctx).unwrap());
        assert_eq!(engine.cache_stats().size, 2);
    }

    #[test]
    fn test_eval_recursion_is_bounded() {
        let engine = Engine::new();
        let fixture = Fixture::new(
            vec![json!("alice"), json!("data1"), json!("read")],
            &["", "", "", "eval(p.rule)"],
        );

        assert!(matches!(
            engine.evaluate_expression("eval(p.rule)", &fixture.ctx()).unwrap_err(),
            ExprError::EvalDepthExceeded(_)
        ));
    }

    #[test]
    fn test_short_circuit_skips_failing_operand() {
        let engine = Engine::new();
        let fixture = alice_reads_data1();
        let ctx = fixture.ctx();

        assert!(!engine.evaluate_expression("false && r.missing == 'x'", &ctx).unwrap());
        assert!(engine.evaluate_expression("true || undefinedFn()", &ctx).unwrap());
    }

    #[test]
    fn test_evaluation_errors() {
        let engine = Engine::new();
        let fixture = alice_reads_data1();
        let ctx = fixture.ctx();

        assert!(matches!(
            engine.evaluate_expression("r.missing == 'x'", &ctx).unwrap_err(),
            ExprError::UnboundReference(_)
        ));
        assert!(matches!(
            engine.evaluate_expression("undefinedFn(r.sub)", &ctx).unwrap_err(),
            ExprError::UnknownFunction(_)
        ));
        assert!(matches!(
            engine.evaluate_expression("r.sub == 1", &ctx).unwrap_err(),
            ExprError::TypeMismatch(_)
        ));
        assert!(matches!(
            engine.evaluate_expression("r.sub < 1", &ctx).unwrap_err(),
            ExprError::TypeMismatch(_)
        ));
        assert!(matches!(
            engine.evaluate_expression("r.sub && true", &ctx).unwrap_err(),
            ExprError::TypeMismatch(_)
        ));
        assert!(matches!(
            engine.evaluate_expression("r.sub", &ctx).unwrap_err(),
            ExprError::NonBooleanResult
        ));
    }

    #[test]
    fn test_program_caching() {
        let engine = Engine::new();
        let fixture = alice_reads_data1();
        let ctx = fixture.ctx();

        let _ = engine.evaluate_expression("true", &ctx).unwrap();
        assert_eq!(engine.cache_stats().size, 1);

        let _ = engine.evaluate_expression("true", &ctx).unwrap();
        assert_eq!(engine.cache_stats().size, 1);

        let _ = engine.evaluate_expression("false", &ctx).unwrap();
        assert_eq!(engine.cache_stats().size, 2);

        engine.clear_cache();
        assert_eq!(engine.cache_stats().size, 0);
    }

    #[test]
    fn test_compilation_error() {
        let engine = Engine::new();
        let result = engine.compile("invalid syntax @#$");
        assert!(result.unwrap_err().is_compile_error());
    }
}
