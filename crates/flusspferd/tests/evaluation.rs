//! Script evaluation, file execution and value rendering

mod common;

use common::*;
use flusspferd::{
    create, create_native_function, execute, Context, ContextOptions, ErrorKind, Error,
    PropertyIterator, SecurityContext, Value,
};
use pretty_assertions::assert_eq;
use std::io::Write;

#[test]
fn test_native_function_called_from_script() {
    let (ctx, _scope) = setup();
    create_native_function(ctx.global(), "sum", 2, |call| {
        let total = call.arg(0).to_number()? + call.arg(1).to_number()?;
        call.set_result(total);
        Ok(())
    })
    .unwrap();

    assert_eq!(eval("sum(2, 3)"), Value::Int(5));
    let err = flusspferd::evaluate("sum(1)", "test", 1).unwrap_err();
    assert!(err.is(ErrorKind::Range));
    assert_eq!(err.message(), "function 'sum' expects 2 arguments, got 1");
}

#[test]
fn test_native_error_is_catchable_and_quit_is_not() {
    let (ctx, _scope) = setup();
    create_native_function(ctx.global(), "fail", 0, |_| Err(Error::type_error("nope"))).unwrap();
    create_native_function(ctx.global(), "leave", 0, |_| Err(Error::Quit(3))).unwrap();

    let caught = eval("var m; try { fail() } catch (e) { m = e.message } m");
    assert_eq!(caught.to_std_string().unwrap(), "nope");

    let err = flusspferd::evaluate("try { leave() } catch (e) { 1 }", "test", 1).unwrap_err();
    assert!(matches!(err, Error::Quit(3)));
}

#[test]
fn test_thrown_value_round_trip() {
    let (ctx, _scope) = setup();
    let err = flusspferd::evaluate("throw {code: 7}", "test", 1).unwrap_err();
    let thrown = err.to_value().unwrap();
    ctx.gc();
    let object = thrown.get_object().unwrap();
    assert!(object.is_alive(), "the error keeps the thrown value rooted");
    assert_eq!(object.get_property("code").unwrap(), Value::Int(7));

    let again = Error::from_value(thrown);
    assert_eq!(again.to_value().unwrap(), thrown);
}

#[test]
fn test_execute_requires_read_capability() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "#!/usr/bin/env flusspferd").unwrap();
    writeln!(file, "var fromFile = 6 * 7").unwrap();
    writeln!(file, "fromFile").unwrap();

    let denied = Context::create().unwrap();
    {
        let _scope = flusspferd::current_context_scope(&denied);
        let err = execute(file.path()).unwrap_err();
        assert!(err.is(ErrorKind::Security), "{}", err);
    }

    let allowed =
        Context::with_options(ContextOptions::default().with_security(SecurityContext::allow_all()))
            .unwrap();
    let _scope = flusspferd::current_context_scope(&allowed);
    assert_eq!(execute(file.path()).unwrap(), Value::Int(42));
}

#[test]
fn test_execute_missing_file_is_resource_error() {
    let dir = tempfile::tempdir().unwrap();
    let ctx =
        Context::with_options(ContextOptions::default().with_security(SecurityContext::allow_all()))
            .unwrap();
    let _scope = flusspferd::current_context_scope(&ctx);
    let err = execute(dir.path().join("missing.js")).unwrap_err();
    assert!(err.is(ErrorKind::Resource), "{}", err);
    assert!(err.message().contains("missing.js"));
}

#[test]
fn test_syntax_error_in_file_reports_line() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "var ok = 1").unwrap();
    writeln!(file, "var = 2").unwrap();
    let ctx =
        Context::with_options(ContextOptions::default().with_security(SecurityContext::allow_all()))
            .unwrap();
    let _scope = flusspferd::current_context_scope(&ctx);
    let err = execute(file.path()).unwrap_err();
    assert!(err.is(ErrorKind::Syntax));
    assert!(err.message().contains(":2:"), "{}", err);
}

#[test]
fn test_syntax_error_after_block_comment_reports_line() {
    let (_ctx, _scope) = setup();
    let source = "/* header\n   spans\n   lines */\nvar ok = 1\nvar = 2\n";
    let err = flusspferd::evaluate(source, "commented.js", 1).unwrap_err();
    assert!(err.is(ErrorKind::Syntax));
    assert!(err.message().contains("commented.js:5:"), "{}", err);
}

#[test]
fn test_property_iterator_flushes_lazy_properties() {
    let (ctx, _scope) = setup();
    let env = create::<Environment>(()).unwrap();
    ctx.global().set_property("environment", env.object()).unwrap();
    assert!(!env.object().has_own_property("PATH").unwrap());

    let names: Vec<String> = PropertyIterator::new(env.object())
        .unwrap()
        .collect::<flusspferd::Result<_>>()
        .unwrap();
    assert!(names.iter().any(|n| n == "PATH"));
    assert!(env.object().has_own_property("PATH").unwrap());

    let mut unique = names.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), names.len(), "no key is yielded twice");
}

#[test]
fn test_to_source_rendering() {
    let (_ctx, _scope) = setup();
    let value = eval(
        r#"
        var o = {name: "flusspferd", list: [1, 2.5, "x"], nested: {ok: true, none: null}};
        o
        "#,
    );
    insta::assert_snapshot!(
        value.to_source().unwrap(),
        @r#"({name:"flusspferd", list:[1, 2.5, "x"], nested:{ok:true, none:null}})"#
    );

    let error = eval("new TypeError('bad \"input\"')");
    insta::assert_snapshot!(error.to_source().unwrap(), @r#"(new TypeError("bad \"input\""))"#);

    let function = eval("Object");
    insta::assert_snapshot!(function.to_source().unwrap(), @r###"
    function Object() {
        [native code]
    }
    "###);

    assert_eq!(Value::Undefined.to_source().unwrap(), "(void 0)");
}
