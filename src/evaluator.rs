//! Expression evaluation.
//!
//! The compiler only needs a narrow capability from a scripting engine:
//! evaluate one expression against bindings, and run a fence's declarations
//! to collect their values. `Evaluator` is that seam.
//!
//! `ScriptEvaluator` is the built-in implementation. It parses with oxc and
//! interprets a side-effect-free subset of JavaScript:
//!
//! - literals, template literals, array and object literals (with spreads)
//! - identifiers, member access (`.length`, map keys, list indexes)
//! - unary, binary, logical, conditional and sequence expressions
//! - assignments and `++`/`--` on plain identifiers
//! - a handful of pure string/list methods (`toUpperCase`, `includes`, `join`, ...)
//! - `let`/`const`/`var` declarations (including simple destructuring),
//!   expression statements, `if` and blocks
//!
//! Everything else is an `EvalError::Unsupported`. There are no loops or
//! calls into user functions, so every evaluation terminates.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrayExpressionElement, AssignmentTarget, BindingPattern, Expression, ObjectPropertyKind,
    PropertyKey, SimpleAssignmentTarget, Statement,
};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use oxc_syntax::operator::{
    AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator, UpdateOperator,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

use crate::value::{Bindings, Value};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("syntax error: {message}")]
    Syntax { message: String },

    #[error("'{name}' is not defined")]
    Unbound { name: String },

    #[error("unsupported construct: {construct}")]
    Unsupported { construct: String },

    #[error("type error: {message}")]
    Type { message: String },
}

pub type EvalResult<T> = Result<T, EvalError>;

pub trait Evaluator {
    /// Evaluates one expression against `bindings`.
    fn evaluate(&self, code: &str, bindings: &Bindings) -> EvalResult<Value>;

    /// Runs `code` and returns the final value of each name in
    /// `declarations`. Names the code never assigned come back as `Null`.
    fn run_and_collect(&self, declarations: &[String], code: &str) -> EvalResult<Bindings>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptEvaluator;

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self
    }
}

fn source_type() -> SourceType {
    SourceType::default().with_module(true)
}

impl Evaluator for ScriptEvaluator {
    fn evaluate(&self, code: &str, bindings: &Bindings) -> EvalResult<Value> {
        let mut trimmed = code.trim();
        while let Some(rest) = trimmed.strip_suffix(';') {
            trimmed = rest.trim_end();
        }
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }

        let allocator = Allocator::default();
        let expr = Parser::new(&allocator, trimmed, source_type())
            .parse_expression()
            .map_err(|errors| EvalError::Syntax {
                message: format!("{:?}", errors),
            })?;

        let mut interp = Interp::new(trimmed, bindings);
        interp.eval(&expr)
    }

    fn run_and_collect(&self, declarations: &[String], code: &str) -> EvalResult<Bindings> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, source_type()).parse();
        if !ret.errors.is_empty() {
            return Err(EvalError::Syntax {
                message: format!("{:?}", ret.errors),
            });
        }

        let empty = Bindings::new();
        let mut interp = Interp::new(code, &empty);
        for stmt in &ret.program.body {
            if let Err(e) = interp.exec(stmt) {
                warn!(error = %e, "fence statement failed; continuing");
            }
        }

        Ok(declarations
            .iter()
            .map(|name| {
                let value = interp.locals.get(name).cloned().unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERPRETER
// ═══════════════════════════════════════════════════════════════════════════════

struct Interp<'b> {
    source: &'b str,
    base: &'b Bindings,
    locals: Bindings,
}

impl<'b> Interp<'b> {
    fn new(source: &'b str, base: &'b Bindings) -> Self {
        Self {
            source,
            base,
            locals: Bindings::new(),
        }
    }

    fn unsupported(&self, node: &impl GetSpan) -> EvalError {
        let span = node.span();
        let construct = self
            .source
            .get(span.start as usize..span.end as usize)
            .unwrap_or("<unknown>")
            .to_string();
        EvalError::Unsupported { construct }
    }

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        if let Some(v) = self.locals.get(name).or_else(|| self.base.get(name)) {
            return Ok(v.clone());
        }
        match name {
            "undefined" => Ok(Value::Null),
            "NaN" => Ok(Value::Float(f64::NAN)),
            "Infinity" => Ok(Value::Float(f64::INFINITY)),
            _ => Err(EvalError::Unbound {
                name: name.to_string(),
            }),
        }
    }

    fn assign(&mut self, name: String, value: Value) {
        self.locals.insert(name, value);
    }

    fn exec(&mut self, stmt: &Statement<'_>) -> EvalResult<()> {
        match stmt {
            Statement::VariableDeclaration(decl) => {
                for declarator in &decl.declarations {
                    let value = match &declarator.init {
                        Some(init) => match self.eval(init) {
                            Ok(v) => v,
                            Err(e) => {
                                self.bind_pattern(&declarator.id, Value::Null)?;
                                return Err(e);
                            }
                        },
                        None => Value::Null,
                    };
                    self.bind_pattern(&declarator.id, value)?;
                }
                Ok(())
            }
            Statement::ExpressionStatement(expr_stmt) => {
                self.eval(&expr_stmt.expression)?;
                Ok(())
            }
            Statement::BlockStatement(block) => {
                for s in &block.body {
                    self.exec(s)?;
                }
                Ok(())
            }
            Statement::IfStatement(if_stmt) => {
                if truthy(&self.eval(&if_stmt.test)?) {
                    self.exec(&if_stmt.consequent)
                } else if let Some(alt) = &if_stmt.alternate {
                    self.exec(alt)
                } else {
                    Ok(())
                }
            }
            Statement::EmptyStatement(_) => Ok(()),
            Statement::FunctionDeclaration(_) | Statement::ClassDeclaration(_) => {
                debug!("skipping declaration the evaluator cannot run");
                Ok(())
            }
            other => Err(self.unsupported(other)),
        }
    }

    fn bind_pattern(&mut self, pattern: &BindingPattern<'_>, value: Value) -> EvalResult<()> {
        match pattern {
            BindingPattern::BindingIdentifier(id) => {
                self.assign(id.name.to_string(), value);
                Ok(())
            }
            BindingPattern::ObjectPattern(obj) => {
                for prop in &obj.properties {
                    let key = self.property_key(&prop.key, prop.computed)?;
                    let field = member(&value, &key)?;
                    self.bind_pattern(&prop.value, field)?;
                }
                Ok(())
            }
            BindingPattern::ArrayPattern(arr) => {
                for (i, elem) in arr.elements.iter().enumerate() {
                    if let Some(p) = elem {
                        let item = index(&value, &Value::Int(i as i64))?;
                        self.bind_pattern(p, item)?;
                    }
                }
                Ok(())
            }
            other => Err(self.unsupported(other)),
        }
    }

    fn property_key(&mut self, key: &PropertyKey<'_>, computed: bool) -> EvalResult<String> {
        match key {
            PropertyKey::StaticIdentifier(id) => Ok(id.name.to_string()),
            PropertyKey::StringLiteral(s) => Ok(s.value.to_string()),
            PropertyKey::NumericLiteral(n) => Ok(Value::number(n.value).to_display()),
            other => match other.as_expression() {
                Some(expr) if computed => Ok(self.eval(expr)?.to_display()),
                _ => Err(self.unsupported(other)),
            },
        }
    }

    fn eval(&mut self, expr: &Expression<'_>) -> EvalResult<Value> {
        match expr {
            Expression::BooleanLiteral(b) => Ok(Value::Bool(b.value)),
            Expression::NullLiteral(_) => Ok(Value::Null),
            Expression::NumericLiteral(n) => Ok(Value::number(n.value)),
            Expression::StringLiteral(s) => Ok(Value::String(s.value.to_string())),
            Expression::TemplateLiteral(tpl) => {
                let mut out = String::new();
                for (i, quasi) in tpl.quasis.iter().enumerate() {
                    match &quasi.value.cooked {
                        Some(cooked) => out.push_str(&cooked.to_string()),
                        None => out.push_str(&quasi.value.raw.to_string()),
                    }
                    if let Some(e) = tpl.expressions.get(i) {
                        out.push_str(&self.eval(e)?.to_display());
                    }
                }
                Ok(Value::String(out))
            }
            Expression::Identifier(id) => self.lookup(&id.name.to_string()),
            Expression::ArrayExpression(arr) => {
                let mut items = Vec::with_capacity(arr.elements.len());
                for elem in &arr.elements {
                    match elem {
                        ArrayExpressionElement::SpreadElement(spread) => {
                            match self.eval(&spread.argument)? {
                                Value::List(inner) => items.extend(inner),
                                other => {
                                    return Err(EvalError::Type {
                                        message: format!("cannot spread {}", other.to_literal()),
                                    })
                                }
                            }
                        }
                        ArrayExpressionElement::Elision(_) => items.push(Value::Null),
                        other => match other.as_expression() {
                            Some(e) => items.push(self.eval(e)?),
                            None => return Err(self.unsupported(other)),
                        },
                    }
                }
                Ok(Value::List(items))
            }
            Expression::ObjectExpression(obj) => {
                let mut map = BTreeMap::new();
                for prop in &obj.properties {
                    match prop {
                        ObjectPropertyKind::ObjectProperty(p) => {
                            let key = self.property_key(&p.key, p.computed)?;
                            let value = self.eval(&p.value)?;
                            map.insert(key, value);
                        }
                        ObjectPropertyKind::SpreadProperty(s) => {
                            if let Value::Map(inner) = self.eval(&s.argument)? {
                                map.extend(inner);
                            }
                        }
                    }
                }
                Ok(Value::Map(map))
            }
            Expression::ParenthesizedExpression(paren) => self.eval(&paren.expression),
            Expression::SequenceExpression(seq) => {
                let mut last = Value::Null;
                for e in &seq.expressions {
                    last = self.eval(e)?;
                }
                Ok(last)
            }
            Expression::UnaryExpression(unary) => {
                if unary.operator == UnaryOperator::Typeof {
                    return match self.eval(&unary.argument) {
                        Ok(v) => Ok(Value::from(type_of(&v))),
                        Err(EvalError::Unbound { .. }) => Ok(Value::from("undefined")),
                        Err(e) => Err(e),
                    };
                }
                let v = self.eval(&unary.argument)?;
                match unary.operator {
                    UnaryOperator::LogicalNot => Ok(Value::Bool(!truthy(&v))),
                    UnaryOperator::UnaryNegation => Ok(Value::number(-to_number(&v))),
                    UnaryOperator::UnaryPlus => Ok(Value::number(to_number(&v))),
                    UnaryOperator::Void => Ok(Value::Null),
                    _ => Err(self.unsupported(expr)),
                }
            }
            Expression::BinaryExpression(bin) => {
                let left = self.eval(&bin.left)?;
                let right = self.eval(&bin.right)?;
                match binary(bin.operator, &left, &right) {
                    Some(v) => Ok(v),
                    None => Err(self.unsupported(expr)),
                }
            }
            Expression::LogicalExpression(logical) => {
                let left = self.eval(&logical.left)?;
                match logical.operator {
                    LogicalOperator::And if !truthy(&left) => Ok(left),
                    LogicalOperator::Or if truthy(&left) => Ok(left),
                    LogicalOperator::Coalesce if left != Value::Null => Ok(left),
                    _ => self.eval(&logical.right),
                }
            }
            Expression::ConditionalExpression(cond) => {
                if truthy(&self.eval(&cond.test)?) {
                    self.eval(&cond.consequent)
                } else {
                    self.eval(&cond.alternate)
                }
            }
            Expression::StaticMemberExpression(st) => {
                let object = self.eval(&st.object)?;
                member(&object, &st.property.name.to_string())
            }
            Expression::ComputedMemberExpression(comp) => {
                let object = self.eval(&comp.object)?;
                let key = self.eval(&comp.expression)?;
                index(&object, &key)
            }
            Expression::CallExpression(call) => {
                let mut args = Vec::with_capacity(call.arguments.len());
                for arg in &call.arguments {
                    match arg.as_expression() {
                        Some(e) => args.push(self.eval(e)?),
                        None => return Err(self.unsupported(arg)),
                    }
                }
                let result = match &call.callee {
                    Expression::StaticMemberExpression(st) => {
                        let receiver = self.eval(&st.object)?;
                        call_method(&receiver, &st.property.name.to_string(), &args)
                    }
                    Expression::Identifier(id) => call_global(&id.name.to_string(), &args),
                    _ => None,
                };
                result.ok_or_else(|| self.unsupported(expr))
            }
            Expression::AssignmentExpression(assign) => {
                let AssignmentTarget::AssignmentTargetIdentifier(id) = &assign.left else {
                    return Err(self.unsupported(expr));
                };
                let name = id.name.to_string();
                let rhs = self.eval(&assign.right)?;
                let op = match assign.operator {
                    AssignmentOperator::Assign => None,
                    AssignmentOperator::Addition => Some(BinaryOperator::Addition),
                    AssignmentOperator::Subtraction => Some(BinaryOperator::Subtraction),
                    AssignmentOperator::Multiplication => Some(BinaryOperator::Multiplication),
                    AssignmentOperator::Division => Some(BinaryOperator::Division),
                    AssignmentOperator::Remainder => Some(BinaryOperator::Remainder),
                    _ => return Err(self.unsupported(expr)),
                };
                let value = match op {
                    None => rhs,
                    Some(op) => {
                        let current = self.lookup(&name)?;
                        binary(op, &current, &rhs).ok_or_else(|| self.unsupported(expr))?
                    }
                };
                self.assign(name, value.clone());
                Ok(value)
            }
            Expression::UpdateExpression(update) => {
                let SimpleAssignmentTarget::AssignmentTargetIdentifier(id) = &update.argument
                else {
                    return Err(self.unsupported(expr));
                };
                let name = id.name.to_string();
                let old = to_number(&self.lookup(&name)?);
                let new = match update.operator {
                    UpdateOperator::Increment => old + 1.0,
                    UpdateOperator::Decrement => old - 1.0,
                };
                self.assign(name, Value::number(new));
                Ok(Value::number(if update.prefix { new } else { old }))
            }
            _ => Err(self.unsupported(expr)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE SEMANTICS
// ═══════════════════════════════════════════════════════════════════════════════

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0 && !f.is_nan(),
        Value::String(s) => !s.is_empty(),
        Value::List(_) | Value::Map(_) => true,
    }
}

fn to_number(v: &Value) -> f64 {
    match v {
        Value::Null => 0.0,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::List(_) | Value::Map(_) => f64::NAN,
    }
}

fn type_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "undefined",
        Value::Bool(_) => "boolean",
        Value::Int(_) | Value::Float(_) => "number",
        Value::String(_) => "string",
        Value::List(_) | Value::Map(_) => "object",
    }
}

fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(_), Value::Int(_) | Value::Float(_))
        | (Value::Int(_) | Value::Float(_), Value::String(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => to_number(a) == to_number(b),
        _ => strict_equals(a, b),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => to_number(a).partial_cmp(&to_number(b)),
    }
}

fn binary(op: BinaryOperator, l: &Value, r: &Value) -> Option<Value> {
    let value = match op {
        BinaryOperator::Addition => match (l, r) {
            (Value::Int(x), Value::Int(y)) => match x.checked_add(*y) {
                Some(sum) => Value::Int(sum),
                None => Value::Float(*x as f64 + *y as f64),
            },
            (Value::String(_), _)
            | (_, Value::String(_))
            | (Value::List(_) | Value::Map(_), _)
            | (_, Value::List(_) | Value::Map(_)) => {
                Value::String(format!("{}{}", l.to_display(), r.to_display()))
            }
            _ => Value::number(to_number(l) + to_number(r)),
        },
        BinaryOperator::Subtraction => Value::number(to_number(l) - to_number(r)),
        BinaryOperator::Multiplication => Value::number(to_number(l) * to_number(r)),
        BinaryOperator::Division => Value::number(to_number(l) / to_number(r)),
        BinaryOperator::Remainder => Value::number(to_number(l) % to_number(r)),
        BinaryOperator::Exponential => Value::number(to_number(l).powf(to_number(r))),
        BinaryOperator::StrictEquality => Value::Bool(strict_equals(l, r)),
        BinaryOperator::StrictInequality => Value::Bool(!strict_equals(l, r)),
        BinaryOperator::Equality => Value::Bool(loose_equals(l, r)),
        BinaryOperator::Inequality => Value::Bool(!loose_equals(l, r)),
        BinaryOperator::LessThan => Value::Bool(compare(l, r) == Some(Ordering::Less)),
        BinaryOperator::LessEqualThan => Value::Bool(matches!(
            compare(l, r),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOperator::GreaterThan => Value::Bool(compare(l, r) == Some(Ordering::Greater)),
        BinaryOperator::GreaterEqualThan => Value::Bool(matches!(
            compare(l, r),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOperator::In => match r {
            Value::Map(map) => Value::Bool(map.contains_key(&l.to_display())),
            _ => return None,
        },
        _ => return None,
    };
    Some(value)
}

fn member(object: &Value, name: &str) -> EvalResult<Value> {
    match (object, name) {
        (Value::Null, _) => Err(EvalError::Type {
            message: format!("cannot read '{}' of undefined", name),
        }),
        (Value::List(items), "length") => Ok(Value::Int(items.len() as i64)),
        (Value::String(s), "length") => Ok(Value::Int(s.chars().count() as i64)),
        (Value::Map(map), key) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    }
}

fn index(object: &Value, key: &Value) -> EvalResult<Value> {
    match (object, key) {
        (Value::List(items), Value::Int(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::String(s), Value::Int(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        _ => member(object, &key.to_display()),
    }
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Option<Value> {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);
    match (receiver, method) {
        (Value::String(s), "toUpperCase") => Some(Value::String(s.to_uppercase())),
        (Value::String(s), "toLowerCase") => Some(Value::String(s.to_lowercase())),
        (Value::String(s), "trim") => Some(Value::String(s.trim().to_string())),
        (Value::String(s), "includes") => Some(Value::Bool(s.contains(&arg(0).to_display()))),
        (Value::String(s), "startsWith") => {
            Some(Value::Bool(s.starts_with(&arg(0).to_display())))
        }
        (Value::String(s), "endsWith") => Some(Value::Bool(s.ends_with(&arg(0).to_display()))),
        (Value::String(s), "split") => {
            let sep = arg(0).to_display();
            Some(Value::List(
                s.split(sep.as_str()).map(Value::from).collect(),
            ))
        }
        (Value::List(items), "includes") => {
            let needle = arg(0);
            Some(Value::Bool(items.iter().any(|v| strict_equals(v, &needle))))
        }
        (Value::List(items), "indexOf") => {
            let needle = arg(0);
            let pos = items.iter().position(|v| strict_equals(v, &needle));
            Some(Value::Int(pos.map_or(-1, |p| p as i64)))
        }
        (Value::List(items), "join") => {
            let sep = match arg(0) {
                Value::Null => ",".to_string(),
                other => other.to_display(),
            };
            let parts: Vec<String> = items.iter().map(Value::to_display).collect();
            Some(Value::String(parts.join(&sep)))
        }
        (_, "toString") => Some(Value::String(receiver.to_display())),
        _ => None,
    }
}

fn call_global(name: &str, args: &[Value]) -> Option<Value> {
    let first = args.first().cloned().unwrap_or(Value::Null);
    match name {
        "String" => Some(Value::String(first.to_display())),
        "Number" => Some(Value::number(to_number(&first))),
        "Boolean" => Some(Value::Bool(truthy(&first))),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIER ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════════

/// Free identifiers referenced by an expression (names bound inside it, e.g.
/// arrow parameters, are excluded). `None` if the code does not parse.
pub fn referenced_names(code: &str) -> Option<HashSet<String>> {
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, code.trim(), source_type())
        .parse_expression()
        .ok()?;

    let mut collector = ReferenceCollector::default();
    collector.visit_expression(&expr);
    Some(
        collector
            .references
            .into_iter()
            .filter(|name| !collector.bindings.contains(name))
            .collect(),
    )
}

#[derive(Default)]
struct ReferenceCollector {
    references: Vec<String>,
    bindings: HashSet<String>,
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_identifier_reference(&mut self, ident: &oxc_ast::ast::IdentifierReference<'a>) {
        self.references.push(ident.name.to_string());
    }

    fn visit_binding_identifier(&mut self, ident: &oxc_ast::ast::BindingIdentifier<'a>) {
        self.bindings.insert(ident.name.to_string());
    }
}
