//! Loading extensions through the `flusspferd_load` entry point

mod common;

use common::*;
use flusspferd::extension::{invoke_extension, run_extension, RawObject, RawValue};
use flusspferd::{create_native_function, flusspferd_extension, load_class, Error, Object, Value};
use pretty_assertions::assert_eq;

fn load(container: Object) -> flusspferd::Result<Value> {
    load_class::<StringSet>(container)?;
    create_native_function(container, "answer", 0, |call| {
        call.set_result(42);
        Ok(())
    })?;
    Ok(Value::Bool(true))
}

flusspferd_extension!(load);

#[test]
fn test_entry_point_installs_into_container() {
    let (ctx, _scope) = setup();
    let container = Object::create().unwrap();
    ctx.global().set_property("ext", container).unwrap();

    let result = unsafe { invoke_extension(flusspferd_load, container) }.unwrap();
    assert_eq!(result, Value::Bool(true));
    assert!(container.has_own_property("StringSet").unwrap());
    assert_eq!(eval("ext.answer()"), Value::Int(42));
    assert_eq!(eval("new ext.StringSet().add('a', 'a').size()"), Value::Int(1));
}

#[test]
fn test_failing_load_returns_undefined() {
    let (_ctx, _scope) = setup();
    let container = Object::create().unwrap();
    let _root = flusspferd::Root::new(container).unwrap();

    let raw = run_extension(RawObject::from(container), |_| {
        Err(Error::type_error("cannot load"))
    });
    assert_eq!(raw.tag, RawValue::UNDEFINED.tag);
}

#[test]
fn test_panicking_load_is_contained() {
    let (_ctx, _scope) = setup();
    let container = Object::create().unwrap();
    let _root = flusspferd::Root::new(container).unwrap();

    let raw = run_extension(RawObject::from(container), |_| panic!("extension bug"));
    assert_eq!(raw.tag, RawValue::UNDEFINED.tag);
}
