//! Rendering of console arguments.
//!
//! The JavaScript side never formats values itself: each argument is turned
//! into an [`ArgDescriptor`] inside a try/catch, and all formatting happens
//! here where it cannot throw.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Script name the job harness assigns to user code via `//# sourceURL`
pub const JOB_SOURCE_URL: &str = "jsplay-job.js";

/// Lines the `AsyncFunction` constructor puts before the user's body
pub const FUNCTION_HEADER_LINES: u32 = 2;

static JOB_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}:(\d+):\d+", regex::escape(JOB_SOURCE_URL)))
        .expect("invalid job frame pattern")
});

static ANONYMOUS_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<anonymous>:(\d+):\d+").expect("invalid anonymous frame pattern"));

/// Rendered output of a console call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum RenderedContent {
    Text(String),
    /// A lone object/array argument, kept intact for expandable display
    Structured(serde_json::Value),
}

impl RenderedContent {
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Structured(v) => pretty_json(v),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }
}

impl std::fmt::Display for RenderedContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// A JavaScript value as described by the sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArgDescriptor {
    String {
        value: String,
    },
    Number {
        value: String,
    },
    Bigint {
        value: String,
    },
    Boolean {
        value: bool,
    },
    Undefined,
    Null,
    Symbol {
        description: String,
    },
    Function {
        #[serde(default)]
        name: String,
    },
    Error {
        name: String,
        message: String,
    },
    /// Object or array that survived a JSON round trip
    Json {
        value: serde_json::Value,
        is_array: bool,
        size: usize,
    },
    /// Object or array that could not be serialised (cycles, getters that throw)
    Opaque {
        is_array: bool,
        size: usize,
        #[serde(default)]
        text: String,
    },
}

impl ArgDescriptor {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Plain text form used when several arguments are joined
    pub fn to_text(&self) -> String {
        match self {
            Self::String { value } | Self::Number { value } | Self::Bigint { value } => {
                value.clone()
            }
            Self::Boolean { value } => value.to_string(),
            Self::Undefined => "undefined".into(),
            Self::Null => "null".into(),
            Self::Symbol { description } => description.clone(),
            Self::Function { name } => function_label(name),
            Self::Error { name, message } => format!("{name}: {message}"),
            Self::Json { value, .. } => pretty_json(value),
            Self::Opaque { is_array, size, .. } => type_summary(*is_array, *size),
        }
    }

    /// JSON value kept in the persistent scope
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Json { value, .. } => value.clone(),
            Self::Boolean { value } => serde_json::Value::Bool(*value),
            Self::Null => serde_json::Value::Null,
            Self::Number { value } => value
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map_or_else(|| serde_json::Value::String(value.clone()), Into::into),
            Self::String { value } => serde_json::Value::String(value.clone()),
            other => serde_json::Value::String(other.to_text()),
        }
    }
}

/// Renders the arguments of a single console call
pub fn render_args(args: &[ArgDescriptor]) -> RenderedContent {
    if let [ArgDescriptor::Json { value, .. }] = args
        && (value.is_object() || value.is_array())
    {
        return RenderedContent::Structured(value.clone());
    }

    RenderedContent::Text(
        args.iter()
            .map(ArgDescriptor::to_text)
            .collect::<Vec<_>>()
            .join(" "),
    )
}

/// Renders a top-level `return` value, REPL style (`← "text"`)
pub fn render_return(value: &ArgDescriptor) -> RenderedContent {
    let shown = match value {
        ArgDescriptor::String { value } => {
            serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
        }
        ArgDescriptor::Json { value, .. } => serde_json::to_string(value)
            .unwrap_or_else(|_| value.to_string()),
        other => other.to_text(),
    };
    RenderedContent::Text(format!("← {shown}"))
}

/// Recovers the user source line from a V8 stack trace
///
/// The innermost frame that belongs to the job script wins.
pub fn line_hint_from_stack(stack: &str) -> Option<u32> {
    let captures = JOB_FRAME
        .captures(stack)
        .or_else(|| ANONYMOUS_FRAME.captures(stack))?;
    let line = captures.get(1)?.as_str().parse::<u32>().ok()?;
    line.checked_sub(FUNCTION_HEADER_LINES).filter(|l| *l > 0)
}

pub fn type_summary(is_array: bool, size: usize) -> String {
    if is_array {
        format!("Array({size})[...]")
    } else {
        format!("Object{{{size} props}}")
    }
}

fn function_label(name: &str) -> String {
    if name.is_empty() {
        "[Function: anonymous]".into()
    } else {
        format!("[Function: {name}]")
    }
}

fn pretty_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn s(v: &str) -> ArgDescriptor {
        ArgDescriptor::String { value: v.into() }
    }

    fn obj(value: serde_json::Value) -> ArgDescriptor {
        let size = value.as_object().map_or(0, serde_json::Map::len);
        ArgDescriptor::Json {
            value,
            is_array: false,
            size,
        }
    }

    #[test]
    fn test_primitives_join_with_spaces() {
        let rendered = render_args(&[
            s("count:"),
            ArgDescriptor::Number { value: "3".into() },
            ArgDescriptor::Boolean { value: true },
            ArgDescriptor::Null,
            ArgDescriptor::Undefined,
        ]);
        assert_eq!(rendered, RenderedContent::Text("count: 3 true null undefined".into()));
    }

    #[test]
    fn test_single_object_is_structured() {
        let rendered = render_args(&[obj(json!({ "x": 1 }))]);
        assert_eq!(rendered, RenderedContent::Structured(json!({ "x": 1 })));
    }

    #[test]
    fn test_object_among_other_args_is_pretty_json() {
        let rendered = render_args(&[s("obj"), obj(json!({ "x": 1 }))]);
        assert_eq!(rendered.to_text(), "obj {\n  \"x\": 1\n}");
        assert!(!rendered.is_structured());
    }

    #[test]
    fn test_unserialisable_values_get_summaries() {
        let rendered = render_args(&[
            ArgDescriptor::Opaque {
                is_array: false,
                size: 2,
                text: "[object Object]".into(),
            },
            ArgDescriptor::Opaque {
                is_array: true,
                size: 4,
                text: String::new(),
            },
        ]);
        assert_eq!(rendered.to_text(), "Object{2 props} Array(4)[...]");
    }

    #[test]
    fn test_functions_and_errors() {
        let rendered = render_args(&[
            ArgDescriptor::Function { name: String::new() },
            ArgDescriptor::Function { name: "add".into() },
            ArgDescriptor::Error {
                name: "TypeError".into(),
                message: "nope".into(),
            },
        ]);
        assert_eq!(
            rendered.to_text(),
            "[Function: anonymous] [Function: add] TypeError: nope"
        );
    }

    #[test]
    fn test_descriptor_deserialises_from_sandbox_shape() {
        let raw = json!([
            { "type": "string", "value": "a" },
            { "type": "json", "value": [1, 2], "is_array": true, "size": 2 },
            { "type": "undefined" },
            { "type": "function" }
        ]);
        let parsed: Vec<ArgDescriptor> = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed[0], s("a"));
        assert!(parsed[2].is_undefined());
        assert_eq!(parsed[3], ArgDescriptor::Function { name: String::new() });
    }

    #[test]
    fn test_return_value_rendering() {
        assert_eq!(render_return(&s("hi")).to_text(), "← \"hi\"");
        assert_eq!(
            render_return(&ArgDescriptor::Number { value: "42".into() }).to_text(),
            "← 42"
        );
        assert_eq!(render_return(&obj(json!({ "a": [1] }))).to_text(), "← {\"a\":[1]}");
    }

    #[test]
    fn test_line_hint_from_job_frame() {
        let stack = "Error\n    at Object.log (ext:jsplay_runtime/runtime.js:40:19)\n    at eval (jsplay-job.js:5:9)\n    at run (ext:jsplay_runtime/runtime.js:200:7)";
        assert_eq!(line_hint_from_stack(stack), Some(3));
    }

    #[test]
    fn test_line_hint_falls_back_to_anonymous_frame() {
        let stack = "Error\n    at eval (eval at run (ext:jsplay_runtime/runtime.js:1:1), <anonymous>:4:3)";
        assert_eq!(line_hint_from_stack(stack), Some(2));
    }

    #[test]
    fn test_line_hint_missing() {
        assert_eq!(line_hint_from_stack("Error\n    at native"), None);
        assert_eq!(line_hint_from_stack("at eval (jsplay-job.js:1:1)"), None);
    }

    #[test]
    fn test_scope_json_values() {
        assert_eq!(
            ArgDescriptor::Number { value: "1.5".into() }.to_json(),
            json!(1.5)
        );
        assert_eq!(
            ArgDescriptor::Number { value: "NaN".into() }.to_json(),
            json!("NaN")
        );
        assert_eq!(ArgDescriptor::Undefined.to_json(), json!("undefined"));
    }
}
