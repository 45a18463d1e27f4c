//! template
//!
//! String templates for credential names.
//!
//! # Design
//!
//! Templates use a small Go-template-like language so existing username
//! templates keep working:
//!
//! ```text
//! {{ printf "v-%s-%s" (.DisplayName | truncate 8) (random 20 | lowercase) }}
//! ```
//!
//! Parsing happens once in [`StringTemplate::parse`]; unknown functions and
//! syntax errors surface there. Field lookups and argument checks happen at
//! render time, so callers that want fail-fast behavior render once with
//! empty data right after parsing.
//!
//! Supported functions: `printf`, `truncate`, `truncate_sha256`, `sha256`,
//! `uppercase`, `lowercase`, `replace`, `random`, `unix_time`,
//! `unix_time_millis`, `timestamp`, `uuid`.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use planetscale_dbplugin::template::StringTemplate;
//!
//! let tmpl = StringTemplate::parse("{{ .RoleName | uppercase | truncate 3 }}").unwrap();
//! let fields = HashMap::from([("RoleName", "reader".to_string())]);
//! assert_eq!(tmpl.render(&fields).unwrap(), "REA");
//! ```

mod funcs;
mod parse;

use std::collections::HashMap;

use thiserror::Error;

use parse::{Command, Node, Operand, Pipeline};

pub(crate) use funcs::truncate;

/// Errors from parsing or rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// Syntax error.
    #[error("parse error at offset {offset}: {message}")]
    Parse {
        /// Byte offset of the failing action
        offset: usize,
        /// What went wrong
        message: String,
    },

    /// A function name that is not built in.
    #[error("function \"{0}\" not defined")]
    UnknownFunction(String),

    /// A field name that the render data does not provide.
    #[error("can't evaluate field {0}")]
    UnknownField(String),

    /// Wrong argument count or type, or a function failure.
    #[error("render error: {0}")]
    Render(String),
}

/// A value flowing through a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Value {
    Str(String),
    Int(i64),
}

impl Value {
    fn as_str(&self, func: &str) -> Result<&str, TemplateError> {
        match self {
            Value::Str(s) => Ok(s),
            Value::Int(n) => Err(TemplateError::Render(format!(
                "{}: expected string, got integer {}",
                func, n
            ))),
        }
    }

    fn as_int(&self, func: &str) -> Result<i64, TemplateError> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Str(s) => Err(TemplateError::Render(format!(
                "{}: expected integer, got string {:?}",
                func, s
            ))),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{}", n),
        }
    }
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct StringTemplate {
    nodes: Vec<Node>,
}

impl StringTemplate {
    /// Parse template source.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            nodes: parse::parse(source)?,
        })
    }

    /// Render with the given field values.
    ///
    /// `.Name` in the template looks up `"Name"` in `fields`.
    pub fn render(&self, fields: &HashMap<&str, String>) -> Result<String, TemplateError> {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => {
                    out.push_str(&eval_pipeline(pipeline, fields)?.to_string())
                }
            }
        }
        Ok(out)
    }
}

fn eval_pipeline(
    pipeline: &Pipeline,
    fields: &HashMap<&str, String>,
) -> Result<Value, TemplateError> {
    let mut previous: Option<Value> = None;
    for command in &pipeline.commands {
        previous = Some(eval_command(command, fields, previous)?);
    }
    // The parser never produces an empty pipeline.
    previous.ok_or_else(|| TemplateError::Render("empty pipeline".into()))
}

fn eval_command(
    command: &Command,
    fields: &HashMap<&str, String>,
    piped: Option<Value>,
) -> Result<Value, TemplateError> {
    match command.operands.split_first() {
        Some((Operand::Func(name), rest)) => {
            let mut args = rest
                .iter()
                .map(|op| eval_operand(op, fields))
                .collect::<Result<Vec<_>, _>>()?;
            args.extend(piped);
            funcs::call(name, args)
        }
        Some((operand, [])) => eval_operand(operand, fields),
        _ => Err(TemplateError::Render("malformed command".into())),
    }
}

fn eval_operand(operand: &Operand, fields: &HashMap<&str, String>) -> Result<Value, TemplateError> {
    match operand {
        Operand::Field(name) => fields
            .get(name.as_str())
            .cloned()
            .map(Value::Str)
            .ok_or_else(|| TemplateError::UnknownField(name.clone())),
        Operand::Str(s) => Ok(Value::Str(s.clone())),
        Operand::Int(n) => Ok(Value::Int(*n)),
        // A bare function name in argument position is called without arguments.
        Operand::Func(name) => funcs::call(name, Vec::new()),
        Operand::Pipe(inner) => eval_pipeline(inner, fields),
    }
}
