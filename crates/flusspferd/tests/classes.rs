//! Class registration, construction and method dispatch

mod common;

use common::*;
use flusspferd::{
    class_prototype, create, create_named, create_with_args, get_native, is_native, load_class,
    ErrorKind, Native, NamedParams, Object, Value,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[test]
fn test_registration_is_idempotent() {
    let (ctx, _scope) = setup();
    let first = load_class::<StringSet>(ctx.global()).unwrap();
    let second = load_class::<StringSet>(ctx.global()).unwrap();
    assert_eq!(first, second);

    let container = Object::create().unwrap();
    ctx.global().set_property("ns", container).unwrap();
    let third = load_class::<StringSet>(container).unwrap();
    assert_eq!(third, first);
    assert_eq!(container.get_property_object("StringSet").unwrap(), first);

    let proto = class_prototype::<StringSet>().unwrap();
    assert_eq!(first.get_property_object("prototype").unwrap(), proto);
}

#[test]
fn test_registry_is_per_context() {
    let (ctx_a, scope_a) = setup();
    load_class::<StringSet>(ctx_a.global()).unwrap();
    assert!(ctx_a.global().has_own_property("StringSet").unwrap());
    drop(scope_a);

    let (ctx_b, _scope_b) = setup();
    assert!(!ctx_b.global().has_own_property("StringSet").unwrap());
    let err = flusspferd::evaluate("new StringSet()", "test", 1).unwrap_err();
    assert!(err.is(ErrorKind::Reference));

    load_class::<StringSet>(ctx_b.global()).unwrap();
    assert_eq!(eval("new StringSet().add('a', 'b').size()"), Value::Int(2));
}

#[test]
fn test_default_to_string_and_to_source() {
    let (_ctx, _scope) = setup();
    let set = create::<StringSet>(()).unwrap();
    let _root = flusspferd::Root::new(set.object()).unwrap();
    let text = set.object().call("toString", &[]).unwrap();
    assert_eq!(text.to_std_string().unwrap(), "[object StringSet]");
    let source = set.object().call("toSource", &[]).unwrap();
    assert_eq!(source.to_std_string().unwrap(), "(new StringSet())");
}

#[test]
fn test_dispatch_through_instance_table() {
    let (ctx, _scope) = setup();
    let greeter = create::<Greeter>(GreeterParams {
        greeting: "hi".into(),
        with_method: true,
    })
    .unwrap();
    ctx.global().set_property("g", greeter.object()).unwrap();

    let text = eval("g.greet('there')");
    assert_eq!(text.to_std_string().unwrap(), "hi, there");
    assert_eq!(greeter.borrow().unwrap().fallback_calls, 0);
}

#[test]
fn test_missing_method_falls_back_to_invalid_method() {
    let (ctx, _scope) = setup();
    let with = create::<Greeter>(GreeterParams {
        greeting: "hi".into(),
        with_method: true,
    })
    .unwrap();
    ctx.global().set_property("with", with.object()).unwrap();
    let without = create::<Greeter>(GreeterParams {
        greeting: "yo".into(),
        with_method: false,
    })
    .unwrap();
    ctx.global().set_property("without", without.object()).unwrap();

    assert!(!without.object().has_property("greet").unwrap());
    let trampoline = with.object().get_property_object("greet").unwrap();
    let result = trampoline
        .call_with(without.object(), &[Value::Int(1)])
        .unwrap();
    assert_eq!(result.to_std_string().unwrap(), "no method greet");
    assert_eq!(without.borrow().unwrap().fallback_calls, 1);

    let direct = without.call_method("wave", &[]).unwrap();
    assert_eq!(direct.to_std_string().unwrap(), "no method wave");
}

#[test]
fn test_default_invalid_method_is_binding_error() {
    let (_ctx, _scope) = setup();
    let set = create::<StringSet>(()).unwrap();
    let _root = flusspferd::Root::new(set.object()).unwrap();
    let err = set.call_method("frobnicate", &[]).unwrap_err();
    assert!(err.is(ErrorKind::Binding));
    assert_eq!(err.message(), "Invalid method 'frobnicate'");
}

#[test]
fn test_method_on_plain_object_is_not_native() {
    let (ctx, _scope) = setup();
    load_class::<StringSet>(ctx.global()).unwrap();
    let err = flusspferd::evaluate(
        "var add = StringSet.prototype.add; var o = {f: add}; o.f('x')",
        "test",
        1,
    )
    .unwrap_err();
    assert!(err.is(ErrorKind::Binding));
    assert_eq!(err.message(), "object is not native");
}

#[test]
fn test_reentrant_call_is_binding_error() {
    let (ctx, _scope) = setup();
    let set = create::<StringSet>(()).unwrap();
    ctx.global().set_property("s", set.object()).unwrap();

    let guard = set.borrow_mut().unwrap();
    let err = eval_err("s.add('x')");
    assert!(err.is(ErrorKind::Binding));
    assert!(err.message().contains("already in use"), "{}", err);
    drop(guard);

    assert_eq!(eval("s.add('x').size()"), Value::Int(1));
}

#[test]
fn test_non_constructible_class() {
    let (ctx, _scope) = setup();
    load_class::<Environment>(ctx.global()).unwrap();
    assert!(eval("typeof Environment").to_std_string().unwrap() == "function");

    let err = eval_err("new Environment()");
    assert!(err.is(ErrorKind::Binding));
    assert_eq!(err.message(), "Environment is not constructible");

    let native = create::<Environment>(()).unwrap();
    assert!(is_native::<Environment>(native.object()));
}

#[test]
fn test_constructor_requires_new() {
    let (ctx, _scope) = setup();
    load_class::<StringSet>(ctx.global()).unwrap();
    let err = eval_err("StringSet()");
    assert!(err.is(ErrorKind::Type));
}

#[rstest]
#[case::positional("new Counted(5)", 5)]
#[case::named("new Counted({id: 6})", 6)]
#[case::default("new Counted()", 0)]
fn test_script_construction_binds_params(#[case] source: &str, #[case] expected: i32) {
    let (ctx, _scope) = setup();
    load_class::<Counted>(ctx.global()).unwrap();
    let object = eval(source).get_object().unwrap();
    let counted = get_native::<Counted>(object).unwrap();
    assert_eq!(counted.borrow().unwrap().id, expected);
}

#[rstest]
#[case::unknown("new Counted({size: 1})", "unknown parameter 'size'")]
#[case::twice("new Counted(1, {id: 2})", "given twice")]
#[case::surplus("new Counted(1, 2)", "too many arguments")]
fn test_argument_errors(#[case] source: &str, #[case] fragment: &str) {
    let (ctx, _scope) = setup();
    load_class::<Counted>(ctx.global()).unwrap();
    let err = eval_err(source);
    assert!(err.is(ErrorKind::Range));
    assert!(err.message().starts_with("argument error:"), "{}", err);
    assert!(err.message().contains(fragment), "{}", err);
}

#[test]
fn test_native_side_builders() {
    let (_ctx, _scope) = setup();
    let by_args = create_with_args::<Counted>(&[Value::Int(3)]).unwrap();
    let _root = flusspferd::Root::new(by_args.object()).unwrap();
    assert_eq!(by_args.borrow().unwrap().id, 3);

    let by_name = create_named::<Counted>(&NamedParams::new().with("id", 9)).unwrap();
    let _root2 = flusspferd::Root::new(by_name.object()).unwrap();
    assert_eq!(by_name.borrow().unwrap().id, 9);

    let err = create_named::<Counted>(&NamedParams::new().with("nope", 1)).unwrap_err();
    assert!(err.is(ErrorKind::Range));
}

#[test]
fn test_get_native_identity() {
    let (_ctx, _scope) = setup();
    let set = create::<StringSet>(()).unwrap();
    let _root = flusspferd::Root::new(set.object()).unwrap();
    let again = get_native::<StringSet>(set.object()).unwrap();
    assert!(Native::ptr_eq(&set, &again));
    assert!(get_native::<Counted>(set.object()).is_err());
    assert!(get_native::<StringSet>(Object::create().unwrap()).is_err());
}

fn eval_err(source: &str) -> flusspferd::Error {
    match flusspferd::evaluate(source, "test", 1) {
        Ok(value) => panic!("{:?} succeeded with {:?}", source, value),
        Err(err) => err,
    }
}
