#[cfg(test)]
mod tests {
    use crate::component::{ComponentId, ComponentSetup, PropsAttribute};
    use crate::dom::Document;
    use crate::error::RuntimeError;
    use crate::lens::{AccessPath, Entry, Lens};
    use crate::options::RuntimeOptions;
    use crate::runtime::Runtime;
    use crate::value::{Object, Value};

    fn runtime_with(markup: &str) -> (Runtime, ComponentId) {
        runtime_with_options(markup, RuntimeOptions::default())
    }

    fn runtime_with_options(markup: &str, options: RuntimeOptions) -> (Runtime, ComponentId) {
        let rt = Runtime::builder(Document::parse(markup))
            .options(options)
            .build();
        let element = rt.document().element_by_id("c").unwrap();
        let id = ComponentId::from(element);
        rt.setup(id, ComponentSetup::new());
        (rt, id)
    }

    fn props_attr(rt: &Runtime, id: ComponentId, name: &str) -> Option<String> {
        rt.document()
            .attribute(id.element(), name)
            .map(|s| s.to_string())
    }

    #[test]
    fn test_nested_write_records_top_level_override() {
        let (rt, id) =
            runtime_with(r#"<data-consumer id="c" props="{a: {b: {c: 1}}, n: 5}"></data-consumer>"#);

        let props = rt.props(id).unwrap();
        let inner = props.resolve(&["a", "b"]).unwrap().into_lens().unwrap();
        assert_eq!(inner.path().display(), "props.a.b");
        inner.set("c", Value::from(42)).unwrap();

        let current = rt.props_value(id).unwrap();
        assert_eq!(
            current.property("a").property("b").property("c"),
            Value::from(42)
        );
        assert_eq!(current.property("n"), Value::from(5));

        let overrides = rt.props_overrides(id).unwrap();
        assert_eq!(
            overrides.get("a"),
            Some(&Value::object([(
                "b",
                Value::object([("c", Value::from(42))])
            )]))
        );
        assert!(!overrides.contains("n"));
        assert_eq!(
            props_attr(&rt, id, "props-data").as_deref(),
            Some(r#"{"a":{"b":{"c":42}}}"#)
        );
    }

    #[test]
    fn test_override_survives_expression_rewrite() {
        let (rt, id) = runtime_with(r#"<data-consumer id="c" props="{a: 1, n: 5}"></data-consumer>"#);

        rt.props(id).unwrap().set("a", Value::from(7)).unwrap();

        rt.set_props_text(id, "{a: 1, n: 5}").unwrap();
        assert_eq!(rt.props_value(id).unwrap().property("a"), Value::from(7));

        rt.set_props_text(id, "{a: 2, n: 6}").unwrap();
        let current = rt.props_value(id).unwrap();
        assert_eq!(current.property("a"), Value::from(7));
        assert_eq!(current.property("n"), Value::from(6));
    }

    #[test]
    fn test_cyclic_value_is_rejected() {
        let (rt, id) = runtime_with(r#"<data-consumer id="c"></data-consumer>"#);

        let object = Object::new();
        object.set("me", Value::Object(object.clone()));
        let cyclic = Value::Object(object);

        let wrapped = Lens::wrap(
            &rt,
            cyclic.clone(),
            AccessPath::root(id, PropsAttribute::Props),
        );
        assert!(matches!(wrapped, Err(RuntimeError::CycleDetected { .. })));

        assert!(matches!(
            rt.set_props(id, cyclic),
            Err(RuntimeError::CycleDetected { .. })
        ));
        assert!(rt.props_overrides(id).unwrap().is_empty());
    }

    #[test]
    fn test_scalars_are_plain_values() {
        let (rt, id) = runtime_with(r#"<data-consumer id="c" props="{n: 5, s: 'x'}"></data-consumer>"#);
        let props = rt.props(id).unwrap();
        assert!(matches!(props.get("n").unwrap(), Entry::Scalar(Value::Number(n)) if n == 5.0));
        assert!(matches!(props.get("missing").unwrap(), Entry::Scalar(Value::Undefined)));
        assert!(matches!(
            props.resolve(&["s", "deeper"]).unwrap(),
            Entry::Scalar(Value::Undefined)
        ));
    }

    #[test]
    fn test_array_element_write() {
        let (rt, id) = runtime_with(r#"<data-consumer id="c" props="{list: [1, 2, 3]}"></data-consumer>"#);
        let list = rt.props(id).unwrap().get("list").unwrap().into_lens().unwrap();
        list.set("1", Value::from(9)).unwrap();
        assert_eq!(
            rt.props_value(id).unwrap().property("list"),
            Value::array([Value::from(1), Value::from(9), Value::from(3)])
        );

        let list = rt.props(id).unwrap().get("list").unwrap().into_lens().unwrap();
        assert!(matches!(
            list.set("first", Value::from(0)),
            Err(RuntimeError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_write_on_scalar_root_fails() {
        let (rt, id) = runtime_with(r#"<data-consumer id="c" props="'text'"></data-consumer>"#);
        let props = rt.props(id).unwrap();
        assert_eq!(props.value(), &Value::from("text"));
        assert!(matches!(
            props.set("a", Value::from(1)),
            Err(RuntimeError::NotComposite { .. })
        ));
    }

    #[test]
    fn test_key_lens_write() {
        let (rt, id) = runtime_with(r#"<data-consumer id="c" key="{id: 1, tag: 'a'}"></data-consumer>"#);
        rt.key(id).unwrap().set("id", Value::from(2)).unwrap();

        let key = rt.key_value(id).unwrap();
        assert_eq!(key.property("id"), Value::from(2));
        assert_eq!(key.property("tag"), Value::from("a"));
        assert_eq!(
            props_attr(&rt, id, "key-data").as_deref(),
            Some(r#"{"id":2,"tag":"a"}"#)
        );
    }

    #[test]
    fn test_depth_limit_is_enforced() {
        let options = RuntimeOptions {
            max_path_depth: 2,
            ..RuntimeOptions::default()
        };
        let (rt, id) = runtime_with_options(
            r#"<data-consumer id="c" props="{a: {b: {c: 1}}}"></data-consumer>"#,
            options,
        );
        let props = rt.props(id).unwrap();
        assert!(props.get("a").is_ok());
        assert!(matches!(
            props.resolve(&["a", "b"]),
            Err(RuntimeError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_scalar_assignment_rewrites_text() {
        let (rt, id) = runtime_with(r#"<data-consumer id="c" props="'hello'"></data-consumer>"#);

        rt.set_props(id, Value::from("hello")).unwrap();
        assert_eq!(props_attr(&rt, id, "props").as_deref(), Some("'hello'"));

        rt.set_props(id, Value::from(3)).unwrap();
        assert_eq!(props_attr(&rt, id, "props").as_deref(), Some("3"));
        assert_eq!(rt.props_value(id).unwrap(), Value::from(3));

        rt.set_props(id, Value::array([Value::from("a")])).unwrap();
        assert_eq!(props_attr(&rt, id, "props").as_deref(), Some(r#"["a"]"#));
    }

    #[test]
    fn test_literal_mode_returns_raw_text() {
        let (rt, id) =
            runtime_with(r#"<data-consumer id="c" literal props="{a: 1}"></data-consumer>"#);
        assert_eq!(rt.props_value(id).unwrap(), Value::from("{a: 1}"));
        assert_eq!(rt.key_value(id).unwrap(), Value::from("null"));
    }

    #[test]
    fn test_absent_attributes_use_defaults() {
        let (rt, id) = runtime_with(r#"<data-consumer id="c"></data-consumer>"#);
        assert_eq!(rt.props_value(id).unwrap(), Value::object::<_, &str>([]));
        assert_eq!(rt.key_value(id).unwrap(), Value::Null);
    }

    #[test]
    fn test_unregistered_component_is_an_error() {
        let rt = Runtime::new(Document::parse(r#"<data-consumer id="c"></data-consumer>"#));
        let element = rt.document().element_by_id("c").unwrap();
        assert!(matches!(
            rt.props(ComponentId::from(element)),
            Err(RuntimeError::UnknownComponent(_))
        ));
    }

    #[test]
    fn test_remove_drops_a_top_level_override() {
        let (rt, id) = runtime_with(r#"<data-consumer id="c" props="{a: 1}"></data-consumer>"#);

        rt.props(id).unwrap().set("b", Value::from(2)).unwrap();
        assert_eq!(rt.props_value(id).unwrap().property("b"), Value::from(2));

        rt.props(id).unwrap().remove("b").unwrap();
        let current = rt.props_value(id).unwrap();
        assert_eq!(current.property("b"), Value::Undefined);
        assert_eq!(current.property("a"), Value::from(1));
        assert!(!rt.props_overrides(id).unwrap().contains("b"));
        assert_eq!(props_attr(&rt, id, "props-data").as_deref(), Some("{}"));
    }

    #[test]
    fn test_remove_hides_a_key_the_expression_produces() {
        let (rt, id) = runtime_with(r#"<data-consumer id="c" props="{a: 1, b: 2}"></data-consumer>"#);

        rt.props(id).unwrap().remove("b").unwrap();
        assert_eq!(rt.props_value(id).unwrap().property("b"), Value::Undefined);

        rt.set_props_text(id, "{a: 1, b: 2}").unwrap();
        assert_eq!(rt.props_value(id).unwrap().property("b"), Value::Undefined);

        rt.props(id).unwrap().set("b", Value::from(2)).unwrap();
        assert_eq!(rt.props_value(id).unwrap().property("b"), Value::from(2));
    }

    #[test]
    fn test_remove_nested_key_from_expression() {
        let (rt, id) =
            runtime_with(r#"<data-consumer id="c" props="{a: {b: 1, c: 2}}"></data-consumer>"#);

        let a = rt.props(id).unwrap().get("a").unwrap().into_lens().unwrap();
        a.remove("c").unwrap();

        assert_eq!(
            rt.props_value(id).unwrap().property("a"),
            Value::object([("b", Value::from(1))])
        );
        assert_eq!(
            props_attr(&rt, id, "props-data").as_deref(),
            Some(r#"{"a":{"b":1}}"#)
        );

        rt.set_props_text(id, "{a: {b: 3, c: 4}}").unwrap();
        assert_eq!(rt.props_value(id).unwrap().property("a").property("c"), Value::Undefined);

        let a = rt.props(id).unwrap().get("a").unwrap().into_lens().unwrap();
        a.set("c", Value::from(7)).unwrap();
        assert_eq!(rt.props_value(id).unwrap().property("a").property("c"), Value::from(7));
    }

    #[test]
    fn test_remove_from_key() {
        let (rt, id) = runtime_with(r#"<data-consumer id="c" key="{id: 1, tag: 'a'}"></data-consumer>"#);
        rt.key(id).unwrap().remove("tag").unwrap();

        let key = rt.key_value(id).unwrap();
        assert_eq!(key.property("tag"), Value::Undefined);
        assert_eq!(key.property("id"), Value::from(1));
        assert_eq!(props_attr(&rt, id, "key-data").as_deref(), Some(r#"{"id":1}"#));
    }

    #[test]
    fn test_array_writes_are_bounded() {
        let (rt, id) = runtime_with(r#"<data-consumer id="c" props="{list: [1, 2, 3]}"></data-consumer>"#);
        let list = || rt.props(id).unwrap().get("list").unwrap().into_lens().unwrap();

        list().set("3", Value::from(4)).unwrap();
        assert_eq!(rt.props_value(id).unwrap().property("list").property("length"), Value::from(4));

        for index in ["18446744073709551615", "4000000000", "9"] {
            assert!(matches!(
                list().set(index, Value::from(0)),
                Err(RuntimeError::InvalidIndex { .. })
            ));
        }
        assert_eq!(
            rt.props_value(id).unwrap().property("list"),
            Value::array([Value::from(1), Value::from(2), Value::from(3), Value::from(4)])
        );

        list().remove("1").unwrap();
        assert_eq!(
            rt.props_value(id).unwrap().property("list").property("1"),
            Value::Undefined
        );
    }
}
