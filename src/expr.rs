//! Expression Compilation
//!
//! Expression text is parsed with oxc and lowered into an owned [`Expr`]
//! tree that outlives the parser arena and can be cached per attribute.
//!
//! ## Accepted Language
//!
//! A closed subset of JavaScript expressions: literals, template strings,
//! array and object literals (with spreads and computed keys), member
//! access including optional chains, unary/binary/logical/conditional
//! operators and comma sequences. The only free identifiers are the
//! context parameter, `undefined`, `NaN` and `Infinity`.
//!
//! Anything else (calls, functions, assignment, `this`, `new`) is rejected
//! at compile time with [`EvalError::Unsupported`].

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrayExpressionElement, ChainElement, ComputedMemberExpression, Expression, ObjectPropertyKind,
    PropertyKind, StaticMemberExpression,
};
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::operator::{BinaryOperator, LogicalOperator, UnaryOperator};

use crate::eval::EvalError;
use crate::scope::ScopeValidator;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::Undefined => Value::Undefined,
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Number(n) => Value::Number(*n),
            Literal::String(s) => Value::String(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// The context parameter.
    Parameter,
    Template {
        quasis: Vec<String>,
        expressions: Vec<Expr>,
    },
    Array(Vec<ArrayItem>),
    Object(Vec<ObjectItem>),
    Member {
        object: Box<Expr>,
        property: MemberKey,
        optional: bool,
    },
    /// Boundary of an optional chain; short-circuits to `undefined`.
    Chain(Box<Expr>),
    Unary {
        operator: UnaryOperator,
        argument: Box<Expr>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Sequence(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayItem {
    Item(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectItem {
    Property { key: PropertyName, value: Expr },
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyName {
    Static(String),
    Computed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberKey {
    Static(String),
    Computed(Box<Expr>),
}

/// Parse, scope-check and lower expression text.
pub fn compile(source: &str, parameter: &str) -> Result<Expr, EvalError> {
    let allocator = Allocator::default();
    let expression = Parser::new(&allocator, source, SourceType::default())
        .parse_expression()
        .map_err(|errors| EvalError::Syntax {
            message: errors
                .first()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "invalid expression".to_string()),
        })?;

    ScopeValidator::new(parameter).verify_scope(&expression)?;
    Lowerer { parameter }.lower(&expression)
}

struct Lowerer<'p> {
    parameter: &'p str,
}

impl<'p> Lowerer<'p> {
    fn lower(&self, expr: &Expression) -> Result<Expr, EvalError> {
        match expr {
            Expression::NumericLiteral(n) => Ok(Expr::Literal(Literal::Number(n.value))),
            Expression::StringLiteral(s) => Ok(Expr::Literal(Literal::String(s.value.to_string()))),
            Expression::BooleanLiteral(b) => Ok(Expr::Literal(Literal::Bool(b.value))),
            Expression::NullLiteral(_) => Ok(Expr::Literal(Literal::Null)),

            Expression::Identifier(ident) => match ident.name.as_str() {
                "undefined" => Ok(Expr::Literal(Literal::Undefined)),
                "NaN" => Ok(Expr::Literal(Literal::Number(f64::NAN))),
                "Infinity" => Ok(Expr::Literal(Literal::Number(f64::INFINITY))),
                name if name == self.parameter => Ok(Expr::Parameter),
                name => Err(EvalError::Reference {
                    name: name.to_string(),
                }),
            },

            Expression::TemplateLiteral(template) => {
                let quasis = template
                    .quasis
                    .iter()
                    .map(|q| {
                        q.value
                            .cooked
                            .as_ref()
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| q.value.raw.to_string())
                    })
                    .collect();
                let expressions = template
                    .expressions
                    .iter()
                    .map(|e| self.lower(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::Template {
                    quasis,
                    expressions,
                })
            }

            Expression::ArrayExpression(array) => {
                let mut items = Vec::with_capacity(array.elements.len());
                for element in &array.elements {
                    let item = match element {
                        ArrayExpressionElement::SpreadElement(spread) => {
                            ArrayItem::Spread(self.lower(&spread.argument)?)
                        }
                        ArrayExpressionElement::Elision(_) => ArrayItem::Hole,
                        other => match other.as_expression() {
                            Some(e) => ArrayItem::Item(self.lower(e)?),
                            None => return Err(unsupported("array element")),
                        },
                    };
                    items.push(item);
                }
                Ok(Expr::Array(items))
            }

            Expression::ObjectExpression(object) => {
                let mut items = Vec::with_capacity(object.properties.len());
                for property in &object.properties {
                    match property {
                        ObjectPropertyKind::ObjectProperty(p) => {
                            if p.kind != PropertyKind::Init || p.method {
                                return Err(unsupported("method or accessor"));
                            }
                            let key = if p.computed {
                                match p.key.as_expression() {
                                    Some(e) => PropertyName::Computed(self.lower(e)?),
                                    None => return Err(unsupported("computed key")),
                                }
                            } else {
                                match p.key.static_name() {
                                    Some(name) => PropertyName::Static(name.to_string()),
                                    None => return Err(unsupported("property key")),
                                }
                            };
                            items.push(ObjectItem::Property {
                                key,
                                value: self.lower(&p.value)?,
                            });
                        }
                        ObjectPropertyKind::SpreadProperty(spread) => {
                            items.push(ObjectItem::Spread(self.lower(&spread.argument)?));
                        }
                    }
                }
                Ok(Expr::Object(items))
            }

            Expression::StaticMemberExpression(member) => self.lower_static_member(member),
            Expression::ComputedMemberExpression(member) => self.lower_computed_member(member),
            Expression::PrivateFieldExpression(_) => Err(unsupported("private field")),

            Expression::ChainExpression(chain) => {
                let inner = match &chain.expression {
                    ChainElement::StaticMemberExpression(member) => {
                        self.lower_static_member(member)?
                    }
                    ChainElement::ComputedMemberExpression(member) => {
                        self.lower_computed_member(member)?
                    }
                    _ => return Err(unsupported("call")),
                };
                Ok(Expr::Chain(Box::new(inner)))
            }

            Expression::UnaryExpression(unary) => {
                if unary.operator == UnaryOperator::Delete {
                    return Err(unsupported("delete"));
                }
                Ok(Expr::Unary {
                    operator: unary.operator,
                    argument: Box::new(self.lower(&unary.argument)?),
                })
            }

            Expression::BinaryExpression(binary) => {
                if binary.operator == BinaryOperator::Instanceof {
                    return Err(unsupported("instanceof"));
                }
                Ok(Expr::Binary {
                    operator: binary.operator,
                    left: Box::new(self.lower(&binary.left)?),
                    right: Box::new(self.lower(&binary.right)?),
                })
            }

            Expression::LogicalExpression(logical) => Ok(Expr::Logical {
                operator: logical.operator,
                left: Box::new(self.lower(&logical.left)?),
                right: Box::new(self.lower(&logical.right)?),
            }),

            Expression::ConditionalExpression(cond) => Ok(Expr::Conditional {
                test: Box::new(self.lower(&cond.test)?),
                consequent: Box::new(self.lower(&cond.consequent)?),
                alternate: Box::new(self.lower(&cond.alternate)?),
            }),

            Expression::ParenthesizedExpression(paren) => self.lower(&paren.expression),

            Expression::SequenceExpression(seq) => Ok(Expr::Sequence(
                seq.expressions
                    .iter()
                    .map(|e| self.lower(e))
                    .collect::<Result<Vec<_>, _>>()?,
            )),

            Expression::CallExpression(_) | Expression::NewExpression(_) => {
                Err(unsupported("call"))
            }
            Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_) => {
                Err(unsupported("function"))
            }
            Expression::AssignmentExpression(_) | Expression::UpdateExpression(_) => {
                Err(unsupported("assignment"))
            }
            Expression::ThisExpression(_) => Err(unsupported("this")),
            _ => Err(unsupported("expression")),
        }
    }

    fn lower_static_member(&self, member: &StaticMemberExpression) -> Result<Expr, EvalError> {
        Ok(Expr::Member {
            object: Box::new(self.lower(&member.object)?),
            property: MemberKey::Static(member.property.name.to_string()),
            optional: member.optional,
        })
    }

    fn lower_computed_member(&self, member: &ComputedMemberExpression) -> Result<Expr, EvalError> {
        Ok(Expr::Member {
            object: Box::new(self.lower(&member.object)?),
            property: MemberKey::Computed(Box::new(self.lower(&member.expression)?)),
            optional: member.optional,
        })
    }
}

fn unsupported(construct: &str) -> EvalError {
    EvalError::Unsupported {
        construct: construct.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_access_lowers_to_parameter_chain() {
        let expr = compile("component.props.x", "component").unwrap();
        assert_eq!(
            expr,
            Expr::Member {
                object: Box::new(Expr::Member {
                    object: Box::new(Expr::Parameter),
                    property: MemberKey::Static("props".to_string()),
                    optional: false,
                }),
                property: MemberKey::Static("x".to_string()),
                optional: false,
            }
        );
    }

    #[test]
    fn test_optional_chain_is_wrapped() {
        let expr = compile("component?.props", "component").unwrap();
        assert!(matches!(expr, Expr::Chain(_)));
    }

    #[test]
    fn test_object_keys() {
        let expr = compile("{a: 1, 'b c': 2, 3: 4, [component.k]: 5, ...component}", "component")
            .unwrap();
        let Expr::Object(items) = expr else {
            panic!("expected object literal");
        };
        assert_eq!(items.len(), 5);
        assert!(matches!(
            &items[1],
            ObjectItem::Property { key: PropertyName::Static(k), .. } if k == "b c"
        ));
        assert!(matches!(&items[2], ObjectItem::Property { key: PropertyName::Static(k), .. } if k == "3"));
        assert!(matches!(&items[3], ObjectItem::Property { key: PropertyName::Computed(_), .. }));
        assert!(matches!(&items[4], ObjectItem::Spread(Expr::Parameter)));
    }

    #[test]
    fn test_rejected_constructs() {
        for code in ["alert(1)", "() => 1", "component.x = 1", "this", "new Thing()"] {
            let result = compile(code, "component");
            assert!(result.is_err(), "{} should not compile", code);
        }
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            compile("{a: ", "component"),
            Err(EvalError::Syntax { .. })
        ));
    }

    #[test]
    fn test_custom_parameter_name() {
        assert_eq!(compile("self", "self").unwrap(), Expr::Parameter);
        assert!(matches!(
            compile("component", "self"),
            Err(EvalError::Reference { .. })
        ));
    }
}
