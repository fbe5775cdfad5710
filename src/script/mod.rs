//! Sandboxed Rhai evaluation shared by content templates, package-derived
//! fields and package path filters.

use std::sync::Arc;

use rhai::{Dynamic, Engine, Scope, AST};
use serde_json::Value;

use crate::context::DataContext;

/// Create a sandboxed Rhai engine.
pub fn create_engine() -> Engine {
    let mut engine = Engine::new();

    // Limit recursion and operations for safety
    engine.set_max_call_levels(32);
    engine.set_max_operations(1_000_000);
    engine.set_max_string_size(10 * 1024 * 1024); // 10MB
    engine.set_max_expr_depths(64, 32);

    engine
}

/// Build a Rhai scope holding every context field as a variable.
///
/// Objects become Rhai maps and arrays become Rhai arrays, so nested access
/// like `pkg.name` or `items[0]` works inside scripts.
pub fn build_scope<'a>(context: &DataContext) -> Scope<'a> {
    let mut scope = Scope::new();

    for (key, value) in context.iter() {
        scope.push_dynamic(key.clone(), to_dynamic(value));
    }

    scope
}

pub fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::from(n.to_string())
            }
        }
        other => rhai::serde::to_dynamic(other).unwrap_or_else(|_| Dynamic::from(other.to_string())),
    }
}

pub fn from_dynamic(value: &Dynamic) -> Result<Value, String> {
    if value.is_unit() {
        return Ok(Value::Null);
    }
    rhai::serde::from_dynamic::<Value>(value).map_err(|e| e.to_string())
}

/// A compiled, named Rhai expression.
#[derive(Clone)]
pub struct Script {
    name: String,
    source: String,
    engine: Arc<Engine>,
    ast: Arc<AST>,
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish()
    }
}

impl Script {
    /// Compile `source`; syntax errors are returned as messages.
    pub fn compile(
        engine: Arc<Engine>,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, String> {
        let source = source.into();
        let ast = engine.compile(&source).map_err(|e| e.to_string())?;
        Ok(Self {
            name: name.into(),
            source,
            engine,
            ast: Arc::new(ast),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `context`, with `extra` variables pushed on top of it.
    pub fn eval(&self, context: &DataContext, extra: &[(&str, Dynamic)]) -> Result<Dynamic, String> {
        let mut scope = build_scope(context);
        for (name, value) in extra {
            scope.push_dynamic(*name, value.clone());
        }
        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .map_err(|e| e.to_string())
    }

    /// Evaluate and convert the result to a JSON value.
    pub fn eval_value(&self, context: &DataContext) -> Result<Value, String> {
        let result = self.eval(context, &[])?;
        from_dynamic(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> Arc<Engine> {
        Arc::new(create_engine())
    }

    #[test]
    fn test_create_engine() {
        let engine = create_engine();
        let result: i64 = engine.eval("1 + 2").unwrap();
        assert_eq!(result, 3);
    }

    #[test]
    fn test_build_scope_with_fields() {
        let context: DataContext = [
            ("name", json!("test")),
            ("count", json!(42)),
            ("flag", json!(true)),
            ("pkg", json!({"name": "nested"})),
        ]
        .into_iter()
        .collect();

        let scope = build_scope(&context);
        assert!(scope.contains("name"));
        assert!(scope.contains("count"));
        assert!(scope.contains("flag"));
        assert!(scope.contains("pkg"));
    }

    #[test]
    fn test_script_reads_nested_fields() {
        let context: DataContext = [("pkg", json!({"name": "whiz-bang"}))].into_iter().collect();
        let script = Script::compile(engine(), "upper", "pkg.name.to_upper()").unwrap();
        assert_eq!(script.eval_value(&context).unwrap(), json!("WHIZ-BANG"));
    }

    #[test]
    fn test_script_extra_variables() {
        let script = Script::compile(engine(), "filter", "included && path != \"skip.txt\"").unwrap();
        let context = DataContext::new();
        let keep = script
            .eval(
                &context,
                &[("path", Dynamic::from("keep.txt".to_string())), ("included", Dynamic::from(true))],
            )
            .unwrap();
        assert!(keep.as_bool().unwrap());
    }

    #[test]
    fn test_compile_error_is_reported() {
        let result = Script::compile(engine(), "broken", "let = ;");
        assert!(result.is_err());
    }

    #[test]
    fn test_unit_converts_to_null() {
        assert_eq!(from_dynamic(&Dynamic::UNIT).unwrap(), Value::Null);
    }

    #[test]
    fn test_engine_max_operations() {
        let engine = create_engine();
        let result = engine.run("let x = 0; while true { x += 1; }");
        assert!(result.is_err());
    }
}
