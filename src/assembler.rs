//! Program assembly.
//!
//! Turns a snapshot of fragments plus an [`InvocationRequest`] into one Python
//! source text:
//!
//! ```text
//! <fragment 1>
//!
//! <fragment 2>
//!
//! __pydsl_result__ = entry(*[<args>], **{<kwargs>})
//! ```
//!
//! Arguments are rendered as Python literals, never interpolated as raw text,
//! and the entry point must be a plain identifier. Anything that cannot be
//! rendered faithfully fails here, before a worker is involved.
//!
//! # Result binding
//!
//! The call result is bound to [`RESULT_BINDING`]. Dunder names belong to the
//! interpreter by convention, and the synthesized statement is always the last
//! one in the program, so a fragment that binds the same name is overwritten
//! before the worker reads it.

use std::fmt::Write;

use crate::error::AssemblyError;
use crate::models::CodeFragment;
use crate::types::InvocationRequest;
use crate::value::TransportValue;

/// Name the synthesized call statement assigns its result to
pub const RESULT_BINDING: &str = "__pydsl_result__";

/// Default limit on literal nesting
pub const DEFAULT_MAX_LITERAL_DEPTH: usize = 64;

/// CPython's tokenizer rejects a program with more open brackets than this
const PARSER_NESTING_LIMIT: usize = 200;

/// Highest usable nesting limit. Depth already counts the `*[`/`**{`
/// containers of the call statement; its own parenthesis takes the last
/// level.
pub const MAX_LITERAL_DEPTH: usize = PARSER_NESTING_LIMIT - 1;

/// Separator placed between fragment bodies
const FRAGMENT_SEPARATOR: &str = "\n\n";

/// Hard keywords; none of these may be called as an entry point
const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Builds executable programs from fragments and invocation requests.
#[derive(Debug, Clone, Copy)]
pub struct ProgramAssembler {
    max_depth: usize,
}

impl Default for ProgramAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LITERAL_DEPTH)
    }
}

impl ProgramAssembler {
    /// `max_depth` is capped at [`MAX_LITERAL_DEPTH`]
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.min(MAX_LITERAL_DEPTH),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Assemble `fragments` (in ascending id order) and the call statement.
    ///
    /// The input slice may be in any order; it is not modified.
    pub fn assemble(
        &self,
        fragments: &[CodeFragment],
        request: &InvocationRequest,
    ) -> Result<String, AssemblyError> {
        validate_entry_point(&request.entry_point)?;
        let call = self.render_call(request)?;

        let mut ordered: Vec<&CodeFragment> = fragments.iter().collect();
        ordered.sort_by_key(|fragment| fragment.id);

        let body_len: usize = ordered.iter().map(|f| f.source.len()).sum();
        let mut program =
            String::with_capacity(body_len + ordered.len() * FRAGMENT_SEPARATOR.len() + call.len());
        for fragment in ordered {
            program.push_str(&fragment.source);
            program.push_str(FRAGMENT_SEPARATOR);
        }
        program.push_str(&call);
        Ok(program)
    }

    /// Render only the synthesized call statement
    pub fn render_call(&self, request: &InvocationRequest) -> Result<String, AssemblyError> {
        validate_entry_point(&request.entry_point)?;

        let mut writer = LiteralWriter::new(self.max_depth);
        writer.out.push_str(RESULT_BINDING);
        writer.out.push_str(" = ");
        writer.out.push_str(&request.entry_point);
        writer.out.push_str("(*");

        writer.path.push(Segment::Root("args"));
        writer.write_list(&request.args)?;
        writer.path.pop();

        writer.out.push_str(", **");

        writer.path.push(Segment::Root("kwargs"));
        writer.write_map(&request.kwargs)?;
        writer.path.pop();

        writer.out.push_str(")\n");
        Ok(writer.out)
    }

    /// Render a single value as a literal, mostly useful for diagnostics
    pub fn render_literal(&self, value: &TransportValue) -> Result<String, AssemblyError> {
        let mut writer = LiteralWriter::new(self.max_depth);
        writer.path.push(Segment::Root("value"));
        writer.write_value(value)?;
        Ok(writer.out)
    }
}

/// Check that `name` is an ASCII identifier and not a keyword
pub fn validate_entry_point(name: &str) -> Result<(), AssemblyError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AssemblyError::InvalidEntryPoint(name.to_string()));
    }
    if KEYWORDS.contains(&name) {
        return Err(AssemblyError::ReservedEntryPoint(name.to_string()));
    }
    Ok(())
}

enum Segment<'a> {
    Root(&'static str),
    Index(usize),
    Key(&'a str),
}

struct LiteralWriter<'a> {
    out: String,
    path: Vec<Segment<'a>>,
    max_depth: usize,
}

impl<'a> LiteralWriter<'a> {
    fn new(max_depth: usize) -> Self {
        Self {
            out: String::new(),
            path: Vec::new(),
            max_depth,
        }
    }

    /// Containers entered so far, not counting the root segment
    fn depth(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    fn path_string(&self) -> String {
        let mut rendered = String::new();
        for segment in &self.path {
            match segment {
                Segment::Root(name) => rendered.push_str(name),
                Segment::Index(i) => {
                    let _ = write!(rendered, "[{}]", i);
                }
                Segment::Key(key) => {
                    let _ = write!(rendered, "[{:?}]", key);
                }
            }
        }
        rendered
    }

    fn enter_container(&self) -> Result<(), AssemblyError> {
        if self.depth() >= self.max_depth {
            return Err(AssemblyError::NestingTooDeep {
                path: self.path_string(),
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn write_value(&mut self, value: &'a TransportValue) -> Result<(), AssemblyError> {
        match value {
            TransportValue::Null => self.out.push_str("None"),
            TransportValue::Bool(true) => self.out.push_str("True"),
            TransportValue::Bool(false) => self.out.push_str("False"),
            TransportValue::Integer(n) => {
                let _ = write!(self.out, "{}", n);
            }
            TransportValue::Float(x) => self.write_float(*x)?,
            TransportValue::String(s) => write_string_literal(&mut self.out, s),
            TransportValue::List(items) => self.write_list(items)?,
            TransportValue::Map(entries) => self.write_map(entries)?,
        }
        Ok(())
    }

    fn write_float(&mut self, x: f64) -> Result<(), AssemblyError> {
        if x.is_nan() {
            return Err(AssemblyError::UnrepresentableValue {
                path: self.path_string(),
                reason: "NaN has no exact literal form",
            });
        }
        if x.is_infinite() {
            return Err(AssemblyError::UnrepresentableValue {
                path: self.path_string(),
                reason: "infinite floats have no exact literal form",
            });
        }
        // Debug gives the shortest repr that parses back to the same bits
        let repr = format!("{:?}", x);
        self.out.push_str(&repr);
        if !repr.contains(['.', 'e', 'E']) {
            self.out.push_str(".0");
        }
        Ok(())
    }

    fn write_list(&mut self, items: &'a [TransportValue]) -> Result<(), AssemblyError> {
        self.enter_container()?;
        self.out.push('[');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            self.path.push(Segment::Index(i));
            self.write_value(item)?;
            self.path.pop();
        }
        self.out.push(']');
        Ok(())
    }

    fn write_map(
        &mut self,
        entries: &'a std::collections::BTreeMap<String, TransportValue>,
    ) -> Result<(), AssemblyError> {
        self.enter_container()?;
        self.out.push('{');
        for (i, (key, item)) in entries.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            write_string_literal(&mut self.out, key);
            self.out.push_str(": ");
            self.path.push(Segment::Key(key));
            self.write_value(item)?;
            self.path.pop();
        }
        self.out.push('}');
        Ok(())
    }
}

/// Double-quoted literal; every control character is escaped so the literal
/// never spans lines
fn write_string_literal(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
