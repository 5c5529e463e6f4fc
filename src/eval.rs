//! Expression Evaluation
//!
//! Interprets a compiled [`Expr`] against a context value. Reads through a
//! component reference go to a [`PropertyHost`], which is how `props` and
//! `key` of the owning component resolve while the runtime stays in charge
//! of caching and overrides.
//!
//! ## Key Invariants
//!
//! 1. [`evaluate`] never fails. Syntax errors, scope violations and
//!    runtime type errors all produce the fallback value for the text.
//! 2. Evaluation has no side effects on the context or the host.
//! 3. Evaluating identical text against an unchanged context twice yields
//!    structurally equal values.

use thiserror::Error;
use tracing::debug;

use oxc_syntax::operator::{BinaryOperator, LogicalOperator, UnaryOperator};

use crate::component::ComponentId;
use crate::expr::{compile, ArrayItem, Expr, MemberKey, ObjectItem, PropertyName};
use crate::options::{FallbackMode, RuntimeOptions};
use crate::value::{parse_index, Array, Object, Value};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("SyntaxError: {message}")]
    Syntax { message: String },

    #[error("ReferenceError: {name} is not defined")]
    Reference { name: String },

    #[error("TypeError: {message}")]
    Type { message: String },

    #[error("unsupported construct in expression: {construct}")]
    Unsupported { construct: String },

    #[error("re-entrant evaluation of '{attribute}' on component {component}")]
    Reentrant {
        component: ComponentId,
        attribute: String,
    },
}

/// Resolves property reads on component references.
pub trait PropertyHost {
    fn component_property(&self, component: ComponentId, name: &str) -> Result<Value, EvalError>;
}

/// Host with no live components; every component property is `undefined`.
pub struct NoHost;

impl PropertyHost for NoHost {
    fn component_property(&self, _component: ComponentId, _name: &str) -> Result<Value, EvalError> {
        Ok(Value::Undefined)
    }
}

/// Evaluate expression text. See the module invariants.
pub fn evaluate(
    text: &str,
    context: &Value,
    host: &dyn PropertyHost,
    options: &RuntimeOptions,
) -> Value {
    let compiled = compile(text.trim(), &options.context_parameter);
    evaluate_compiled(&compiled, text, context, host, options.fallback)
}

/// Evaluate an already compiled expression, falling back on `text`.
pub fn evaluate_compiled(
    compiled: &Result<Expr, EvalError>,
    text: &str,
    context: &Value,
    host: &dyn PropertyHost,
    mode: FallbackMode,
) -> Value {
    let result = match compiled {
        Ok(expr) => Interpreter::new(context.clone(), host).eval(expr),
        Err(err) => Err(err.clone()),
    };
    match result {
        Ok(value) => value,
        Err(error) => {
            debug!(text = %text, error = %error, "expression fell back to its text");
            fallback_value(text, mode)
        }
    }
}

pub fn fallback_value(text: &str, mode: FallbackMode) -> Value {
    let text = text.trim();
    match mode {
        FallbackMode::Literal => Value::String(text.to_string()),
        FallbackMode::Escaped => {
            let quoted = serde_json::Value::String(text.to_string()).to_string();
            Value::String(quoted[1..quoted.len() - 1].to_string())
        }
    }
}

pub struct Interpreter<'h> {
    context: Value,
    host: &'h dyn PropertyHost,
}

impl<'h> Interpreter<'h> {
    pub fn new(context: Value, host: &'h dyn PropertyHost) -> Self {
        Self { context, host }
    }

    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(literal) => Ok(literal.to_value()),
            Expr::Parameter => Ok(self.context.clone()),

            Expr::Template {
                quasis,
                expressions,
            } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(e) = expressions.get(i) {
                        out.push_str(&self.eval(e)?.to_js_string());
                    }
                }
                Ok(Value::String(out))
            }

            Expr::Array(items) => {
                let array = Array::new();
                for item in items {
                    match item {
                        ArrayItem::Item(e) => array.push(self.eval(e)?),
                        ArrayItem::Hole => array.push(Value::Undefined),
                        ArrayItem::Spread(e) => self.spread_into_array(&array, self.eval(e)?)?,
                    }
                }
                Ok(Value::Array(array))
            }

            Expr::Object(items) => {
                let object = Object::new();
                for item in items {
                    match item {
                        ObjectItem::Property { key, value } => {
                            let name = match key {
                                PropertyName::Static(name) => name.clone(),
                                PropertyName::Computed(e) => self.eval(e)?.to_js_string(),
                            };
                            object.set(name, self.eval(value)?);
                        }
                        ObjectItem::Spread(e) => spread_into_object(&object, self.eval(e)?),
                    }
                }
                Ok(Value::Object(object))
            }

            Expr::Member { .. } | Expr::Chain(_) => {
                Ok(self.eval_chain(expr)?.unwrap_or(Value::Undefined))
            }

            Expr::Unary { operator, argument } => {
                let value = self.eval(argument)?;
                Ok(match operator {
                    UnaryOperator::LogicalNot => Value::Bool(!value.is_truthy()),
                    UnaryOperator::UnaryNegation => Value::Number(-value.to_number()),
                    UnaryOperator::UnaryPlus => Value::Number(value.to_number()),
                    UnaryOperator::Typeof => Value::String(value.type_of().to_string()),
                    UnaryOperator::Void => Value::Undefined,
                    UnaryOperator::BitwiseNot => Value::Number(!to_int32(value.to_number()) as f64),
                    UnaryOperator::Delete => {
                        return Err(EvalError::Unsupported {
                            construct: "delete".to_string(),
                        })
                    }
                })
            }

            Expr::Binary {
                operator,
                left,
                right,
            } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*operator, &left, &right)
            }

            Expr::Logical {
                operator,
                left,
                right,
            } => {
                let left = self.eval(left)?;
                let short_circuit = match operator {
                    LogicalOperator::And => !left.is_truthy(),
                    LogicalOperator::Or => left.is_truthy(),
                    LogicalOperator::Coalesce => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }

            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }

            Expr::Sequence(expressions) => {
                let mut last = Value::Undefined;
                for e in expressions {
                    last = self.eval(e)?;
                }
                Ok(last)
            }
        }
    }

    /// `None` means an optional link short-circuited the chain.
    fn eval_chain(&self, expr: &Expr) -> Result<Option<Value>, EvalError> {
        match expr {
            Expr::Chain(inner) => Ok(Some(self.eval_chain(inner)?.unwrap_or(Value::Undefined))),
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.eval_chain(object)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let name = match property {
                    MemberKey::Static(name) => name.clone(),
                    MemberKey::Computed(e) => self.eval(e)?.to_js_string(),
                };
                self.read_property(&target, &name).map(Some)
            }
            other => self.eval(other).map(Some),
        }
    }

    fn read_property(&self, target: &Value, name: &str) -> Result<Value, EvalError> {
        match target {
            Value::Undefined | Value::Null => Err(EvalError::Type {
                message: format!(
                    "Cannot read properties of {} (reading '{}')",
                    target.to_js_string(),
                    name
                ),
            }),
            Value::Component(id) => self.host.component_property(*id, name),
            Value::String(s) => Ok(if name == "length" {
                Value::Number(s.chars().count() as f64)
            } else {
                parse_index(name)
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or(Value::Undefined)
            }),
            other => Ok(other.property(name)),
        }
    }

    fn spread_into_array(&self, array: &Array, value: Value) -> Result<(), EvalError> {
        match value {
            Value::Array(items) => {
                for item in items.items() {
                    array.push(item);
                }
                Ok(())
            }
            Value::String(s) => {
                for c in s.chars() {
                    array.push(Value::String(c.to_string()));
                }
                Ok(())
            }
            other => Err(EvalError::Type {
                message: format!("{} is not iterable", other.to_js_string()),
            }),
        }
    }
}

fn spread_into_object(object: &Object, value: Value) {
    match value {
        Value::Object(source) => {
            for (key, entry) in source.entries() {
                object.set(key, entry);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.items().into_iter().enumerate() {
                object.set(i.to_string(), item);
            }
        }
        Value::String(s) => {
            for (i, c) in s.chars().enumerate() {
                object.set(i.to_string(), Value::String(c.to_string()));
            }
        }
        _ => {}
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATORS
// ═══════════════════════════════════════════════════════════════════════════════

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc().rem_euclid(4294967296.0) as u32) as i32
}

fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

/// Operand after primitive conversion: composites become their string form.
fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Component(_) => {
            Value::String(value.to_js_string())
        }
        other => other.clone(),
    }
}

fn binary(operator: BinaryOperator, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let number = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
    let int = |f: fn(i32, i32) -> i32| {
        Value::Number(f(to_int32(left.to_number()), to_int32(right.to_number())) as f64)
    };

    Ok(match operator {
        BinaryOperator::Addition => {
            let (l, r) = (to_primitive(left), to_primitive(right));
            if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
                Value::String(format!("{}{}", l.to_js_string(), r.to_js_string()))
            } else {
                Value::Number(l.to_number() + r.to_number())
            }
        }
        BinaryOperator::Subtraction => number(|a, b| a - b),
        BinaryOperator::Multiplication => number(|a, b| a * b),
        BinaryOperator::Division => number(|a, b| a / b),
        BinaryOperator::Remainder => number(|a, b| a % b),
        BinaryOperator::Exponential => number(f64::powf),
        BinaryOperator::BitwiseAnd => int(|a, b| a & b),
        BinaryOperator::BitwiseOR => int(|a, b| a | b),
        BinaryOperator::BitwiseXOR => int(|a, b| a ^ b),
        BinaryOperator::ShiftLeft => int(|a, b| a.wrapping_shl((b as u32) & 31)),
        BinaryOperator::ShiftRight => int(|a, b| a.wrapping_shr((b as u32) & 31)),
        BinaryOperator::ShiftRightZeroFill => {
            let shift = to_uint32(right.to_number()) & 31;
            Value::Number((to_uint32(left.to_number()) >> shift) as f64)
        }
        BinaryOperator::StrictEquality => Value::Bool(strict_equals(left, right)),
        BinaryOperator::StrictInequality => Value::Bool(!strict_equals(left, right)),
        BinaryOperator::Equality => Value::Bool(loose_equals(left, right)),
        BinaryOperator::Inequality => Value::Bool(!loose_equals(left, right)),
        BinaryOperator::LessThan => Value::Bool(compare(left, right, |o| o.is_lt())),
        BinaryOperator::LessEqualThan => Value::Bool(compare(left, right, |o| o.is_le())),
        BinaryOperator::GreaterThan => Value::Bool(compare(left, right, |o| o.is_gt())),
        BinaryOperator::GreaterEqualThan => Value::Bool(compare(left, right, |o| o.is_ge())),
        BinaryOperator::In => {
            let name = left.to_js_string();
            match right {
                Value::Object(object) => Value::Bool(object.contains(&name)),
                Value::Array(array) => Value::Bool(
                    name == "length" || parse_index(&name).map_or(false, |i| i < array.len()),
                ),
                other => {
                    return Err(EvalError::Type {
                        message: format!(
                            "Cannot use 'in' operator to search for '{}' in {}",
                            name,
                            other.to_js_string()
                        ),
                    })
                }
            }
        }
        _ => {
            return Err(EvalError::Unsupported {
                construct: format!("{:?}", operator),
            })
        }
    })
}

fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
        (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
        (Value::Component(a), Value::Component(b)) => a == b,
        _ => false,
    }
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    if std::mem::discriminant(left) == std::mem::discriminant(right) {
        return strict_equals(left, right);
    }
    match (left, right) {
        (a, b) if a.is_nullish() && b.is_nullish() => true,
        (a, b) if a.is_nullish() || b.is_nullish() => false,
        (Value::Number(n), Value::String(_)) | (Value::String(_), Value::Number(n)) => {
            let other = if matches!(left, Value::Number(_)) { right } else { left };
            *n == other.to_number()
        }
        (Value::Bool(_), other) => loose_equals(&Value::Number(left.to_number()), other),
        (other, Value::Bool(_)) => loose_equals(other, &Value::Number(right.to_number())),
        (a, b) if a.is_composite() || matches!(a, Value::Component(_)) => {
            loose_equals(&to_primitive(a), b)
        }
        (a, b) if b.is_composite() || matches!(b, Value::Component(_)) => {
            loose_equals(a, &to_primitive(b))
        }
        _ => false,
    }
}

fn compare(left: &Value, right: &Value, accept: fn(std::cmp::Ordering) -> bool) -> bool {
    let (l, r) = (to_primitive(left), to_primitive(right));
    if let (Value::String(a), Value::String(b)) = (&l, &r) {
        return accept(a.cmp(b));
    }
    match l.to_number().partial_cmp(&r.to_number()) {
        Some(ordering) => accept(ordering),
        None => false,
    }
}

