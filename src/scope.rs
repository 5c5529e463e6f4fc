use crate::eval::EvalError;
use oxc_ast::ast::Expression;
use oxc_ast_visit::Visit;
use std::collections::HashSet;

lazy_static::lazy_static! {
    /// Identifiers an expression may use besides the context parameter.
    pub static ref EXPRESSION_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("undefined");
        s.insert("NaN");
        s.insert("Infinity");
        s
    };
}

/// Rejects expressions that reference anything outside the closed scope:
/// the context parameter plus [`EXPRESSION_GLOBALS`].
pub struct ScopeValidator {
    pub parameter: String,
}

impl ScopeValidator {
    pub fn new(parameter: &str) -> Self {
        Self {
            parameter: parameter.to_string(),
        }
    }

    pub fn verify_scope(&self, expr: &Expression) -> Result<(), EvalError> {
        let mut collector = ReferenceCollector { references: vec![] };
        collector.visit_expression(expr);

        for (ident, _span) in collector.references {
            if ident != self.parameter && !EXPRESSION_GLOBALS.contains(ident.as_str()) {
                return Err(EvalError::Reference { name: ident });
            }
        }

        Ok(())
    }
}

struct ReferenceCollector {
    references: Vec<(String, oxc_span::Span)>,
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_identifier_reference(&mut self, ident: &oxc_ast::ast::IdentifierReference<'a>) {
        self.references.push((ident.name.to_string(), ident.span));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    fn check(code: &str) -> Result<(), EvalError> {
        let allocator = Allocator::default();
        let expr = Parser::new(&allocator, code, SourceType::default())
            .parse_expression()
            .unwrap();
        ScopeValidator::new("component").verify_scope(&expr)
    }

    #[test]
    fn test_context_parameter_and_globals_allowed() {
        assert!(check("component.props.x + 1").is_ok());
        assert!(check("[undefined, NaN, Infinity]").is_ok());
    }

    #[test]
    fn test_property_names_are_not_references() {
        assert!(check("{ window: 1, document: component.key }").is_ok());
        assert!(check("component.window").is_ok());
    }

    #[test]
    fn test_foreign_identifier_rejected() {
        assert_eq!(
            check("window.location"),
            Err(EvalError::Reference {
                name: "window".to_string()
            })
        );
        assert!(check("{ component, other }").is_err());
    }
}
