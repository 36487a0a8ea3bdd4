//! Contract between the executor and the job harness installed by
//! `runtime.js`.
//!
//! The executor calls the harness exactly once per runtime with the user's
//! source and a [`HarnessOptions`]; the returned promise resolves to a
//! [`HarnessOutcome`]. The harness never rejects.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::render::{ArgDescriptor, RenderedContent};

/// Global the bootstrap installs; it deletes itself on first call
pub const HARNESS_GLOBAL: &str = "__jsplayRun";

/// Hidden parameter receiving the persistent-scope snapshot
pub const SCOPE_CAPTURE_PARAM: &str = "__jsplay_capture__";

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("invalid identifier pattern"));

const RESERVED: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "import", "in", "instanceof", "let", "new", "null", "return",
    "static", "super", "switch", "this", "throw", "true", "try", "typeof", "var", "void", "while",
    "with", "yield",
];

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessOptions {
    /// Inject `setTimeout`/`setInterval`/`clearTimeout`/`clearInterval`
    pub timers: bool,
    /// Inject `fetch`
    pub fetch: bool,
    /// Compile the body without running it
    pub compile_only: bool,
    /// Code appended to the body that reports declared variables
    pub epilogue: String,
}

/// A thrown JavaScript value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsFailure {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

impl JsFailure {
    pub fn to_content(&self) -> RenderedContent {
        RenderedContent::Text(format!("{}: {}", self.name, self.message))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScopeEntry {
    pub name: String,
    pub value: ArgDescriptor,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HarnessOutcome {
    /// The body settled normally
    Completed {
        #[serde(default)]
        returned: Option<ArgDescriptor>,
        /// `None` when the body returned before the epilogue ran
        #[serde(default)]
        scope: Option<Vec<ScopeEntry>>,
    },
    /// `compile_only` run whose source compiled
    Compiled,
    /// The source could not be turned into a function
    Syntax { error: JsFailure },
    /// The body threw or its promise rejected
    Thrown { error: JsFailure },
}

/// Builds the script that hands `source` to the harness
///
/// # Errors
///
/// Fails only if the arguments cannot be serialised as JSON
pub fn harness_script(source: &str, options: &HarnessOptions) -> Result<String, serde_json::Error> {
    Ok(format!(
        "globalThis.{HARNESS_GLOBAL}({}, {});",
        serde_json::to_string(source)?,
        serde_json::to_string(options)?
    ))
}

pub fn is_capturable_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !RESERVED.contains(&name) && !name.starts_with("__jsplay")
}

/// Epilogue that reads each named variable (guarded, so undeclared or
/// not-yet-initialised names are skipped) and passes them to the capture hook
pub fn scope_epilogue<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let reads = names
        .into_iter()
        .filter(|n| is_capturable_identifier(n))
        .map(|n| format!("try {{ __jsplay_vars__.push([\"{n}\", {n}]); }} catch (_) {{}}"))
        .collect::<Vec<_>>();

    if reads.is_empty() {
        return String::new();
    }

    format!(
        "\n;{{ const __jsplay_vars__ = []; {} {SCOPE_CAPTURE_PARAM}(__jsplay_vars__); }}",
        reads.join(" ")
    )
}
