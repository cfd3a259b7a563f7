//! Script evaluation in the current context
//!
//! ```no_run
//! # fn main() -> flusspferd::Result<()> {
//! let ctx = flusspferd::context::create()?;
//! let _scope = flusspferd::current_context_scope(&ctx);
//! let value = flusspferd::evaluate("var a = 20; a + 22", "<example>", 1)?;
//! assert_eq!(value.get_int()?, 42);
//! # Ok(())
//! # }
//! ```

use crate::context::Context;
use crate::error::{Error, Result};
use crate::interpreter;
use crate::parser::{self, ParseError};
use crate::security::Capability;
use crate::value::Value;
use std::path::Path;
use tracing::debug;

/// Evaluate `source` and return its completion value
///
/// `file` and `line` name the origin of the first source line in error
/// messages.
pub fn evaluate(source: &str, file: &str, line: u32) -> Result<Value> {
    let ctx = Context::current_or_err()?;
    let program = parser::parse(source, line).map_err(|err| syntax_error(file, &err))?;
    interpreter::run(&ctx, &program)
}

/// Read and evaluate the file at `filename`
///
/// Reading is subject to the context's capability check. A leading `#!`
/// line is ignored.
pub fn execute(filename: impl AsRef<Path>) -> Result<Value> {
    let path = filename.as_ref();
    let ctx = Context::current_or_err()?;
    ctx.security()
        .check(&Capability::FileRead(path.to_path_buf()))?;
    let source = std::fs::read_to_string(path)
        .map_err(|err| Error::resource_error(format!("reading '{}'", path.display()), err))?;
    debug!(path = %path.display(), bytes = source.len(), "executing file");
    evaluate(strip_shebang(&source), &path.display().to_string(), 1)
}

/// `false` if `source` ends before its last construct is complete
///
/// Any other syntax error counts as compilable: evaluating it reports the
/// error instead of waiting for more input.
pub fn is_compilable(source: &str) -> bool {
    match parser::parse(source, 1) {
        Ok(_) => true,
        Err(err) => !err.at_eof,
    }
}

fn syntax_error(file: &str, err: &ParseError) -> Error {
    Error::syntax_error(format!("{}:{}: {}", file, err.line, err.message))
}

// The shebang line is blanked rather than removed so line numbers stay exact.
fn strip_shebang(source: &str) -> &str {
    if source.starts_with("#!") {
        match source.find('\n') {
            Some(end) => &source[end..],
            None => "",
        }
    } else {
        source
    }
}
