//! Interactive read-eval-print loop

use anyhow::Result;
use flusspferd::{Error, Value};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing::debug;

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = "? ";
const TYPEIN: &str = "[typein]";

enum Input {
    Line(String),
    Interrupted,
    Eof,
}

/// Line-editor loop evaluating entries in the current context
pub struct Shell {
    editor: DefaultEditor,
    history: Option<PathBuf>,
    line: u32,
}

impl Shell {
    pub fn new(history: Option<PathBuf>) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;
        if let Some(path) = &history {
            // A missing history file is not an error
            let _ = editor.load_history(path);
        }
        Ok(Self {
            editor,
            history,
            line: 0,
        })
    }

    /// Run until end of input or `quit()`, returning the exit code
    pub fn run(mut self) -> Result<i32> {
        let code = loop {
            let start = self.line + 1;
            let Some(source) = self.read_entry()? else {
                break 0;
            };
            if source.trim().is_empty() {
                continue;
            }
            let _ = self.editor.add_history_entry(source.as_str());

            match evaluate_entry(&source, start) {
                Ok(Some(text)) => println!("{}", text),
                Ok(None) => {}
                Err(Error::Quit(code)) => break code,
                Err(err) => eprintln!("ERROR: {}", err),
            }
            flusspferd::gc();
        };

        self.save_history();
        Ok(code)
    }

    /// Read lines until they form a complete entry; `None` at end of input
    fn read_entry(&mut self) -> Result<Option<String>> {
        let mut source = match self.read(PROMPT)? {
            Input::Line(line) => line,
            Input::Interrupted => String::new(),
            Input::Eof => return Ok(None),
        };
        while !flusspferd::is_compilable(&source) {
            match self.read(CONTINUATION_PROMPT)? {
                Input::Line(more) => {
                    source.push('\n');
                    source.push_str(&more);
                }
                Input::Interrupted => return Ok(Some(String::new())),
                // Evaluate what we have so the syntax error gets reported
                Input::Eof => break,
            }
        }
        Ok(Some(source))
    }

    fn read(&mut self, prompt: &str) -> Result<Input> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                self.line += 1;
                Ok(Input::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
            Err(ReadlineError::Eof) => Ok(Input::Eof),
            Err(err) => Err(err.into()),
        }
    }

    fn save_history(&mut self) {
        let Some(path) = &self.history else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(err) = self.editor.save_history(path) {
            debug!(path = %path.display(), error = %err, "could not save history");
        }
    }
}

/// Source rendering of the entry's value; `None` for `undefined`
fn evaluate_entry(source: &str, line: u32) -> flusspferd::Result<Option<String>> {
    let value: Value = flusspferd::evaluate(source, TYPEIN, line)?;
    if value.is_undefined() {
        return Ok(None);
    }
    value.to_source().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flusspferd::{current_context_scope, Context};

    #[test]
    fn test_entry_rendering() {
        let ctx = Context::create().unwrap();
        let _scope = current_context_scope(&ctx);
        assert_eq!(evaluate_entry("1 + 2", 1).unwrap(), Some("3".to_string()));
        assert_eq!(evaluate_entry("var x = 1", 1).unwrap(), None);
        assert_eq!(
            evaluate_entry("'a' + x", 1).unwrap(),
            Some("\"a1\"".to_string())
        );
    }

    #[test]
    fn test_entry_error_names_typein() {
        let ctx = Context::create().unwrap();
        let _scope = current_context_scope(&ctx);
        let err = evaluate_entry("var = 1", 3).unwrap_err();
        assert!(err.to_string().contains("[typein]:3"), "{}", err);
    }
}
