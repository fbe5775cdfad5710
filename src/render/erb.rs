//! `<%= expr %>` / `<% code %>` content templates.
//!
//! A template is split into literal text, interpolations and code blocks, then
//! compiled into a Rhai program that appends each piece to an output buffer.
//! Literal text never passes through the script source: it is handed to the
//! program as an array of strings and referenced by index, so no escaping is
//! involved and arbitrary bytes survive untouched.

use std::sync::Arc;

use rhai::{Array, Dynamic, Engine, AST};

use crate::context::DataContext;
use crate::script::build_scope;

const OPEN: &str = "<%";
const CLOSE: &str = "%>";
const BUFFER: &str = "_stamp_buf";
const TEXTS: &str = "_stamp_text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Interpolate(String),
    Evaluate(String),
}

/// Split `source` into segments. An opening `<%` without a matching `%>` and
/// an empty `<%%>` are both literal text.
pub fn parse(source: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut rest = source;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        let inner = &after_open[..end];
        if inner.is_empty() {
            text.push_str(&rest[..start + OPEN.len() + CLOSE.len()]);
            rest = &after_open[CLOSE.len()..];
            continue;
        }

        text.push_str(&rest[..start]);
        if !text.is_empty() {
            segments.push(Segment::Text(std::mem::take(&mut text)));
        }

        match inner.strip_prefix('=') {
            Some(expr) if !expr.trim().is_empty() => {
                segments.push(Segment::Interpolate(expr.trim().to_string()))
            }
            _ => segments.push(Segment::Evaluate(inner.to_string())),
        }
        rest = &after_open[end + CLOSE.len()..];
    }

    text.push_str(rest);
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    segments
}

/// A parsed and compiled content template.
pub struct Template {
    texts: Vec<String>,
    ast: Option<AST>,
}

impl Template {
    /// Compile `source`. Returns a template that renders to `source` itself
    /// when no tags are present, without invoking the script engine.
    pub fn compile(engine: &Engine, source: &str) -> Result<Self, String> {
        let segments = parse(source);
        let has_tags = segments.iter().any(|s| !matches!(s, Segment::Text(_)));
        if !has_tags {
            return Ok(Self {
                texts: vec![source.to_string()],
                ast: None,
            });
        }

        let mut texts = Vec::new();
        let mut program = format!("let {BUFFER} = \"\";\n");
        let mut segments = segments.into_iter().peekable();
        while let Some(segment) = segments.next() {
            match segment {
                Segment::Text(text) => {
                    program.push_str(&format!("{BUFFER} += {TEXTS}[{}];\n", texts.len()));
                    texts.push(text);
                }
                Segment::Interpolate(expr) => {
                    program.push_str(&format!("{BUFFER} += `${{{expr}}}`;\n"));
                }
                Segment::Evaluate(code) => {
                    let code = code.trim();
                    let continues = matches!(
                        segments.peek(),
                        Some(Segment::Evaluate(next)) if next.trim_start().starts_with("else")
                    );
                    program.push_str(code);
                    if !(code.ends_with('{') || code.ends_with(';') || continues) {
                        program.push(';');
                    }
                    program.push('\n');
                }
            }
        }
        program.push_str(BUFFER);

        let ast = engine.compile(&program).map_err(|e| e.to_string())?;
        Ok(Self {
            texts,
            ast: Some(ast),
        })
    }

    pub fn has_tags(&self) -> bool {
        self.ast.is_some()
    }

    pub fn render(&self, engine: &Engine, context: &DataContext) -> Result<String, String> {
        let Some(ast) = &self.ast else {
            return Ok(self.texts.concat());
        };

        let mut scope = build_scope(context);
        let texts: Array = self.texts.iter().cloned().map(Dynamic::from).collect();
        scope.push_constant(TEXTS, texts);

        engine
            .eval_ast_with_scope::<String>(&mut scope, ast)
            .map_err(|e| e.to_string())
    }
}

/// Renders content templates against a data context with a shared engine.
#[derive(Clone)]
pub struct ContentRenderer {
    engine: Arc<Engine>,
}

impl ContentRenderer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    pub fn render(&self, source: &str, context: &DataContext) -> Result<String, String> {
        Template::compile(&self.engine, source)?.render(&self.engine, context)
    }

    /// Compile without rendering; used to report syntax errors.
    pub fn check(&self, source: &str) -> Result<(), String> {
        Template::compile(&self.engine, source).map(|_| ())
    }
}

impl Default for ContentRenderer {
    fn default() -> Self {
        Self::new(Arc::new(crate::script::create_engine()))
    }
}
