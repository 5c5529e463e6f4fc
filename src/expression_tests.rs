#[cfg(test)]
mod tests {
    use crate::component::ComponentId;
    use crate::dom::Document;
    use crate::eval::{evaluate, EvalError, NoHost, PropertyHost};
    use crate::options::{FallbackMode, RuntimeOptions};
    use crate::value::Value;

    /// A single fake component whose props are fixed.
    struct FixedHost {
        id: ComponentId,
        props: Value,
    }

    impl PropertyHost for FixedHost {
        fn component_property(&self, component: ComponentId, name: &str) -> Result<Value, EvalError> {
            if component != self.id {
                return Ok(Value::Undefined);
            }
            Ok(match name {
                "props" => self.props.clone(),
                "ready" => Value::Bool(true),
                _ => Value::Undefined,
            })
        }
    }

    fn fixed_host() -> FixedHost {
        let doc = Document::parse("<data-consumer></data-consumer>");
        let element = doc.children(doc.root())[0];
        FixedHost {
            id: ComponentId::from(element),
            props: Value::object([
                ("x", Value::from(1)),
                ("name", Value::from("Ada")),
                ("items", Value::array([Value::from(10), Value::from(20)])),
                ("nested", Value::object([("deep", Value::Null)])),
            ]),
        }
    }

    fn eval(code: &str) -> Value {
        evaluate(code, &Value::Undefined, &NoHost, &RuntimeOptions::default())
    }

    fn eval_with(host: &FixedHost, code: &str) -> Value {
        evaluate(
            code,
            &Value::Component(host.id),
            host,
            &RuntimeOptions::default(),
        )
    }

    #[test]
    fn test_object_literal_evaluation() {
        let value = eval("{a: 1, b: 'two', c: [true, null], 'd e': undefined}");
        assert_eq!(value.property("a"), Value::from(1));
        assert_eq!(value.property("b"), Value::from("two"));
        assert_eq!(
            value.property("c"),
            Value::array([Value::Bool(true), Value::Null])
        );
        assert_eq!(value.property("d e"), Value::Undefined);
        assert_eq!(value.as_object().map(|o| o.len()), Some(4));
    }

    #[test]
    fn test_arithmetic_and_string_concatenation() {
        assert_eq!(eval("1 + 2 * 3"), Value::from(7));
        assert_eq!(eval("'a' + 1"), Value::from("a1"));
        assert_eq!(eval("10 % 4 - 2 ** 3"), Value::from(-6));
        assert_eq!(eval("7 >>> 1 | 8"), Value::from(11));
        assert!(eval("undefined + 1").as_number().map_or(false, f64::is_nan));
    }

    #[test]
    fn test_logical_and_conditional() {
        assert_eq!(eval("0 || 'fallback'"), Value::from("fallback"));
        assert_eq!(eval("0 ?? 'unused'"), Value::from(0));
        assert_eq!(eval("null ?? 'used'"), Value::from("used"));
        assert_eq!(eval("'' && 'never'"), Value::from(""));
        assert_eq!(eval("1 < 2 ? 'yes' : 'no'"), Value::from("yes"));
        assert_eq!(eval("!'' === true"), Value::Bool(true));
        assert_eq!(eval("typeof null"), Value::from("object"));
    }

    #[test]
    fn test_equality_rules() {
        assert_eq!(eval("1 == '1'"), Value::Bool(true));
        assert_eq!(eval("1 === '1'"), Value::Bool(false));
        assert_eq!(eval("null == undefined"), Value::Bool(true));
        assert_eq!(eval("null === undefined"), Value::Bool(false));
        assert_eq!(eval("NaN == NaN"), Value::Bool(false));
        assert_eq!(eval("[1] == 1"), Value::Bool(true));
    }

    #[test]
    fn test_template_and_spread() {
        assert_eq!(eval("`sum: ${1 + 1}!`"), Value::from("sum: 2!"));
        assert_eq!(
            eval("[...[1, 2], ...'ab']"),
            Value::array([
                Value::from(1),
                Value::from(2),
                Value::from("a"),
                Value::from("b")
            ])
        );
        let merged = eval("{...{a: 1, b: 2}, b: 3}");
        assert_eq!(merged.property("a"), Value::from(1));
        assert_eq!(merged.property("b"), Value::from(3));
    }

    #[test]
    fn test_component_property_reads() {
        let host = fixed_host();
        assert_eq!(eval_with(&host, "component.props.x + 1"), Value::from(2));
        assert_eq!(eval_with(&host, "component.props.items[1]"), Value::from(20));
        assert_eq!(eval_with(&host, "component.props.items.length"), Value::from(2));
        assert_eq!(eval_with(&host, "component.props['name'].length"), Value::from(3));
        assert_eq!(eval_with(&host, "component.ready"), Value::Bool(true));
        assert_eq!(
            eval_with(&host, "{greeting: `hi ${component.props.name}`}").property("greeting"),
            Value::from("hi Ada")
        );
    }

    #[test]
    fn test_optional_chaining_short_circuits() {
        let host = fixed_host();
        assert_eq!(
            eval_with(&host, "component.props.nested.deep?.missing.value"),
            Value::Undefined
        );
        assert_eq!(
            eval_with(&host, "component.props.nope?.[0] ?? 'none'"),
            Value::from("none")
        );
    }

    #[test]
    fn test_type_error_falls_back_to_text() {
        let host = fixed_host();
        let code = "component.props.nested.deep.missing";
        assert_eq!(eval_with(&host, code), Value::from(code));
    }

    #[test]
    fn test_unparseable_text_is_returned_verbatim() {
        assert_eq!(eval("Hello, world"), Value::from("Hello, world"));
        assert_eq!(eval("  not valid code !!  "), Value::from("not valid code !!"));
    }

    #[test]
    fn test_foreign_identifiers_fall_back() {
        assert_eq!(eval("window.location"), Value::from("window.location"));
        assert_eq!(eval("alert('x')"), Value::from("alert('x')"));
    }

    #[test]
    fn test_escaped_fallback_mode() {
        let options = RuntimeOptions {
            fallback: FallbackMode::Escaped,
            ..RuntimeOptions::default()
        };
        let value = evaluate("say \"hi\"\n", &Value::Undefined, &NoHost, &options);
        assert_eq!(value, Value::from("say \\\"hi\\\""));
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let host = fixed_host();
        let code = "{x: component.props.x, list: [component.props.name, {deep: 1}]}";
        let first = eval_with(&host, code);
        let second = eval_with(&host, code);
        assert_eq!(first, second);
        // Each evaluation yields fresh containers.
        if let (Value::Object(a), Value::Object(b)) = (&first, &second) {
            assert!(!a.ptr_eq(b));
        }
    }

    #[test]
    fn test_context_parameter_is_undefined_without_owner() {
        let code = "component.props";
        assert_eq!(eval(code), Value::from(code));
        assert_eq!(eval("component === undefined"), Value::Bool(true));
    }
}
