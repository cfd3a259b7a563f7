//! Error taxonomy shared by every bridge operation
//!
//! All native-side failures are a single [`Error`] type. A native error carries a
//! [`ErrorKind`] tag and a message and becomes a script-visible error object when
//! it crosses into the engine ([`Error::to_value`]). A value thrown by script and
//! propagating through native code is kept as-is (and rooted) in
//! [`Error::Thrown`], so rethrowing it hands script the very same value.

use crate::object::Object;
use crate::root::PersistentRoot;
use crate::security::SecurityError;
use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// Result type used throughout the bridge
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of native errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong value kind for the requested operation
    Type,
    /// Index or numeric value outside the valid domain, or malformed arguments
    Range,
    /// Unresolvable identifier
    Reference,
    /// Native instance missing, finalized, busy, or not constructible
    Binding,
    /// Source text could not be parsed
    Syntax,
    /// Evaluation failure inside the engine
    Engine,
    /// Native I/O or system failure
    Resource,
    /// Capability check refused the operation
    Security,
}

impl ErrorKind {
    /// Script-visible error name (`TypeError`, `RangeError`, ...)
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Type => "TypeError",
            ErrorKind::Range => "RangeError",
            ErrorKind::Reference => "ReferenceError",
            ErrorKind::Binding => "BindingError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Engine => "InternalError",
            ErrorKind::Resource => "ResourceError",
            ErrorKind::Security => "SecurityError",
        }
    }

    /// Inverse of [`ErrorKind::name`]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "TypeError" => ErrorKind::Type,
            "RangeError" => ErrorKind::Range,
            "ReferenceError" => ErrorKind::Reference,
            "BindingError" => ErrorKind::Binding,
            "SyntaxError" => ErrorKind::Syntax,
            "InternalError" => ErrorKind::Engine,
            "ResourceError" => ErrorKind::Resource,
            "SecurityError" => ErrorKind::Security,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bridge error
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Error raised by native code
    #[error("{kind}: {message}")]
    Native { kind: ErrorKind, message: String },

    /// Value thrown by script, preserved while it travels through native frames
    #[error("{0}")]
    Thrown(ThrownValue),

    /// Request to leave the embedding (the shell's `quit()`)
    #[error("quit({0})")]
    Quit(i32),
}

impl Error {
    /// Create a native error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error::Native {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Range, message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Reference, message)
    }

    pub fn binding_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Binding, message)
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn engine_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Engine, message)
    }

    /// Wrap an I/O failure with a description of the failing operation
    pub fn resource_error(operation: impl fmt::Display, cause: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Resource, format!("{}: {}", operation, cause))
    }

    /// Kind of a native error; thrown values report the kind their `name` maps to
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Native { kind, .. } => Some(*kind),
            Error::Thrown(thrown) => thrown.kind,
            Error::Quit(_) => None,
        }
    }

    /// Message without the kind prefix
    pub fn message(&self) -> String {
        match self {
            Error::Native { message, .. } => message.clone(),
            Error::Thrown(thrown) => thrown.message.clone(),
            Error::Quit(code) => format!("quit({})", code),
        }
    }

    /// Wrap a value thrown by script
    pub fn from_value(value: Value) -> Self {
        Error::Thrown(ThrownValue::new(value))
    }

    /// Script-visible form of this error
    ///
    /// Native errors become fresh error objects with `name` and `message`;
    /// thrown values come back unchanged.
    pub fn to_value(&self) -> Result<Value> {
        match self {
            Error::Native { kind, message } => {
                Ok(Value::Object(crate::stdlib::create_error(*kind, message)?))
            }
            Error::Thrown(thrown) => Ok(thrown.value()),
            Error::Quit(code) => Ok(Value::Int(*code)),
        }
    }

    /// `true` if this is a native error of kind `kind`
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == Some(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::resource_error("I/O operation failed", err)
    }
}

impl From<SecurityError> for Error {
    fn from(err: SecurityError) -> Self {
        Error::new(ErrorKind::Security, err.to_string())
    }
}

/// A script value in flight through native code
///
/// The value stays persistently rooted for as long as any clone of the error exists.
#[derive(Clone)]
pub struct ThrownValue {
    root: PersistentRoot,
    kind: Option<ErrorKind>,
    message: String,
}

impl ThrownValue {
    /// Root `value` and capture a printable description of it
    pub fn new(value: Value) -> Self {
        let (kind, message) = describe(value);
        let root = PersistentRoot::new(value);
        Self {
            root,
            kind,
            message,
        }
    }

    /// The thrown value itself
    pub fn value(&self) -> Value {
        self.root.get()
    }
}

impl fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{}: {}", kind, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl fmt::Debug for ThrownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrownValue")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

// Error objects are described by their `name`/`message` data properties so that
// describing a thrown value never runs script.
fn describe(value: Value) -> (Option<ErrorKind>, String) {
    if let Value::Object(object) = value {
        if let Some((name, message)) = error_fields(&object) {
            return match ErrorKind::from_name(&name) {
                Some(kind) => (Some(kind), message),
                None if message.is_empty() => (None, name),
                None => (None, format!("{}: {}", name, message)),
            };
        }
    }
    let text = value
        .to_std_string()
        .unwrap_or_else(|_| "<unprintable value>".to_string());
    (None, text)
}

fn error_fields(object: &Object) -> Option<(String, String)> {
    if !object.is_error() {
        return None;
    }
    let name = object.get_data_property("name")?.to_std_string().ok()?;
    let message = match object.get_data_property("message") {
        Some(v) if !v.is_undefined() => v.to_std_string().ok()?,
        _ => String::new(),
    };
    Some((name, message))
}
