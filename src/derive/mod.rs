//! Staged data derivation.
//!
//! Answers come first (from the prompter or an override payload), then three
//! groups of derived fields run in order: built-in, caller and package. All
//! functions within a group see the same snapshot of the context and run
//! concurrently; a group's results are merged before the next group starts.
//! A derived field never replaces an answered one.

pub mod builtin;
pub mod overrides;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::prompt::PromptSpec;
use crate::config::Settings;
use crate::context::DataContext;
use crate::error::{BoxError, Result, StampError};
use crate::prompt::Prompter;
use crate::script::Script;

pub use overrides::parse_overrides;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivationStage {
    Builtin,
    Caller,
    Package,
}

impl fmt::Display for DerivationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivationStage::Builtin => f.write_str("built-in"),
            DerivationStage::Caller => f.write_str("caller"),
            DerivationStage::Package => f.write_str("package"),
        }
    }
}

pub type DeriveFuture = BoxFuture<'static, std::result::Result<Value, BoxError>>;

/// A derivation function: reads a context snapshot, produces one field value.
pub type DeriveFn = Arc<dyn Fn(Arc<DataContext>) -> DeriveFuture + Send + Sync>;

/// Named derivation functions that run together as one stage.
#[derive(Clone)]
pub struct DerivationGroup {
    stage: DerivationStage,
    fields: IndexMap<String, DeriveFn>,
}

impl fmt::Debug for DerivationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivationGroup")
            .field("stage", &self.stage)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DerivationGroup {
    pub fn new(stage: DerivationStage) -> Self {
        Self {
            stage,
            fields: IndexMap::new(),
        }
    }

    pub fn builtin() -> Self {
        builtin::group()
    }

    pub fn caller() -> Self {
        Self::new(DerivationStage::Caller)
    }

    pub fn package() -> Self {
        Self::new(DerivationStage::Package)
    }

    pub fn stage(&self) -> DerivationStage {
        self.stage
    }

    /// Register an async function for `name`, replacing any previous one.
    pub fn insert<F, Fut>(&mut self, name: impl Into<String>, derive: F)
    where
        F: Fn(Arc<DataContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, BoxError>> + Send + 'static,
    {
        let derive_fn: DeriveFn = Arc::new(move |context| derive(context).boxed());
        self.fields.insert(name.into(), derive_fn);
    }

    pub fn with<F, Fut>(mut self, name: impl Into<String>, derive: F) -> Self
    where
        F: Fn(Arc<DataContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, BoxError>> + Send + 'static,
    {
        self.insert(name, derive);
        self
    }

    pub fn constant(self, name: impl Into<String>, value: Value) -> Self {
        self.with(name, move |_| futures::future::ready(Ok(value.clone())))
    }

    /// Register a compiled Rhai expression; its field name is the script name.
    pub fn script(mut self, script: Script) -> Self {
        let name = script.name().to_string();
        let script = Arc::new(script);
        self.insert(name, move |context: Arc<DataContext>| {
            let script = Arc::clone(&script);
            async move { script.eval_value(&context).map_err(BoxError::from) }
        });
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &DeriveFn)> {
        self.fields.iter()
    }
}

/// The three derivation stages, in precedence order.
#[derive(Debug, Clone)]
pub struct Derivations {
    pub builtin: DerivationGroup,
    pub caller: DerivationGroup,
    pub package: DerivationGroup,
}

impl Default for Derivations {
    fn default() -> Self {
        Self {
            builtin: DerivationGroup::builtin(),
            caller: DerivationGroup::caller(),
            package: DerivationGroup::package(),
        }
    }
}

impl Derivations {
    pub fn groups(&self) -> [&DerivationGroup; 3] {
        [&self.builtin, &self.caller, &self.package]
    }

    /// Whether a reserved-prefix prompt may override `name`.
    fn overridable(&self, name: &str) -> bool {
        self.builtin.contains(name) || self.caller.contains(name)
    }
}

/// Everything `derive` needs besides the prompter.
pub struct DeriveRequest<'a> {
    pub settings: &'a Settings,
    pub prompts: &'a [PromptSpec],
    pub derivations: &'a Derivations,
    /// Raw JSON answer payload; replaces interactive prompting when present.
    pub overrides: Option<&'a str>,
    /// Fields set before answers are merged, such as `_packageDir`.
    pub injected: Map<String, Value>,
}

pub fn validate_prompt_names(
    settings: &Settings,
    prompts: &[PromptSpec],
    derivations: &Derivations,
) -> Result<()> {
    let invalid = prompts.iter().find(|prompt| {
        prompt.name.starts_with(settings.reserved_prefix.as_str())
            && !derivations.overridable(&prompt.name)
    });

    match invalid {
        Some(prompt) => Err(StampError::ReservedPrompt {
            name: prompt.name.clone(),
            prompts: prompts
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }),
        None => Ok(()),
    }
}

/// Collect answers and run every derivation group.
pub async fn derive(request: DeriveRequest<'_>, prompter: &dyn Prompter) -> Result<DataContext> {
    validate_prompt_names(request.settings, request.prompts, request.derivations)?;

    let answers = match request.overrides {
        Some(raw) => {
            debug!("using prompt overrides");
            parse_overrides(raw)?
        }
        None => prompter.ask(request.prompts)?,
    };
    debug!(answers = answers.len(), "collected answers");

    let mut context = DataContext::from(request.injected);
    context.merge(answers.clone());

    for group in request.derivations.groups() {
        let pending: Vec<_> = group
            .iter()
            .filter(|(name, _)| !answers.contains_key(name.as_str()))
            .collect();
        if pending.is_empty() {
            continue;
        }

        debug!(stage = %group.stage(), fields = pending.len(), "deriving fields");
        let snapshot = Arc::new(context.clone());
        let stage = group.stage();
        let running = pending.into_iter().map(|(name, derive_fn)| {
            let field = name.clone();
            let future = derive_fn(Arc::clone(&snapshot));
            async move {
                match future.await {
                    Ok(value) => Ok((field, value)),
                    Err(source) => Err(StampError::Derivation {
                        field,
                        stage,
                        source,
                    }),
                }
            }
        });

        for (field, value) in try_join_all(running).await? {
            context.insert(field, value);
        }
    }

    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedAnswers(Map<String, Value>);

    impl Prompter for FixedAnswers {
        fn ask(&self, _prompts: &[PromptSpec]) -> Result<Map<String, Value>> {
            Ok(self.0.clone())
        }
    }

    struct NeverAsked;

    impl Prompter for NeverAsked {
        fn ask(&self, _prompts: &[PromptSpec]) -> Result<Map<String, Value>> {
            panic!("prompter should not be used when overrides are given");
        }
    }

    fn answers(value: Value) -> FixedAnswers {
        match value {
            Value::Object(map) => FixedAnswers(map),
            _ => FixedAnswers(Map::new()),
        }
    }

    async fn run(
        prompts: &[PromptSpec],
        derivations: &Derivations,
        overrides: Option<&str>,
        prompter: &dyn Prompter,
    ) -> Result<DataContext> {
        let settings = Settings::default();
        let request = DeriveRequest {
            settings: &settings,
            prompts,
            derivations,
            overrides,
            injected: Map::new(),
        };
        derive(request, prompter).await
    }

    #[tokio::test]
    async fn test_builtins_are_present() {
        let context = run(&[], &Derivations::default(), None, &answers(json!({})))
            .await
            .unwrap();
        assert_eq!(context.get("_templatesDir"), Some(&json!("templates")));
        assert_eq!(context.get("_gitignore"), Some(&json!(".gitignore")));
        assert_eq!(context.get("_npmrc"), Some(&json!(".npmrc")));
    }

    #[tokio::test]
    async fn test_answers_win_over_every_stage() {
        let mut derivations = Derivations::default();
        derivations.caller = DerivationGroup::caller().constant("x", json!("caller"));
        derivations.package = DerivationGroup::package().constant("x", json!("package"));

        let context = run(&[], &derivations, None, &answers(json!({"x": "answer"})))
            .await
            .unwrap();
        assert_eq!(context.get("x"), Some(&json!("answer")));
    }

    #[tokio::test]
    async fn test_later_stage_replaces_derived_field() {
        let mut derivations = Derivations::default();
        derivations.package =
            DerivationGroup::package().constant("_templatesDir", json!("skeleton"));

        let context = run(&[], &derivations, None, &answers(json!({})))
            .await
            .unwrap();
        assert_eq!(context.get("_templatesDir"), Some(&json!("skeleton")));
    }

    #[tokio::test]
    async fn test_package_stage_sees_earlier_stages() {
        let mut derivations = Derivations::default();
        derivations.caller = DerivationGroup::caller().constant("org", json!("acme"));
        derivations.package = DerivationGroup::package().with("full", |context| async move {
            let org = context.text("org").unwrap_or_default();
            let dir = context.text("_templatesDir").unwrap_or_default();
            Ok::<_, BoxError>(json!(format!("{org}/{dir}")))
        });

        let context = run(&[], &derivations, None, &answers(json!({})))
            .await
            .unwrap();
        assert_eq!(context.get("full"), Some(&json!("acme/templates")));
    }

    #[tokio::test]
    async fn test_group_members_share_a_snapshot() {
        let mut derivations = Derivations::default();
        derivations.package = DerivationGroup::package()
            .constant("first", json!("one"))
            .with("second", |context| async move {
                Ok::<_, BoxError>(json!(context.contains("first")))
            });

        let context = run(&[], &derivations, None, &answers(json!({})))
            .await
            .unwrap();
        assert_eq!(context.get("second"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_builtin_stage_never_sees_package_output() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let mut derivations = Derivations::default();
        derivations.builtin = DerivationGroup::builtin().with("probe", move |context| {
            if context.contains("late") {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            async { Ok::<_, BoxError>(Value::Null) }
        });
        derivations.package = DerivationGroup::package().constant("late", json!(true));

        run(&[], &derivations, None, &answers(json!({})))
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_names_field_and_stage() {
        let mut derivations = Derivations::default();
        derivations.caller = DerivationGroup::caller()
            .with("broken", |_| async { Err::<Value, _>(BoxError::from("boom")) });

        let err = run(&[], &derivations, None, &answers(json!({})))
            .await
            .unwrap_err();
        match err {
            StampError::Derivation { field, stage, .. } => {
                assert_eq!(field, "broken");
                assert_eq!(stage, DerivationStage::Caller);
            }
            other => panic!("expected Derivation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_overrides_replace_prompting() {
        let context = run(
            &[PromptSpec::new("name", "Name")],
            &Derivations::default(),
            Some(r#"'{"name": "demo"}'"#),
            &NeverAsked,
        )
        .await
        .unwrap();
        assert_eq!(context.get("name"), Some(&json!("demo")));
    }

    #[tokio::test]
    async fn test_reserved_prompt_rejected() {
        let prompts = [PromptSpec::new("name", "Name"), PromptSpec::new("_secret", "?")];
        let err = run(&prompts, &Derivations::default(), None, &answers(json!({})))
            .await
            .unwrap_err();
        match err {
            StampError::ReservedPrompt { name, prompts } => {
                assert_eq!(name, "_secret");
                assert_eq!(prompts, "name, _secret");
            }
            other => panic!("expected ReservedPrompt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reserved_prompt_may_override_builtin_or_caller() {
        let mut derivations = Derivations::default();
        derivations.caller = DerivationGroup::caller().constant("_org", json!("acme"));
        let prompts = [
            PromptSpec::new("_templatesDir", "Templates"),
            PromptSpec::new("_org", "Org"),
        ];

        let context = run(
            &prompts,
            &derivations,
            None,
            &answers(json!({"_templatesDir": "alt", "_org": "mine"})),
        )
        .await
        .unwrap();
        assert_eq!(context.get("_templatesDir"), Some(&json!("alt")));
        assert_eq!(context.get("_org"), Some(&json!("mine")));
    }

    #[tokio::test]
    async fn test_reserved_prompt_cannot_target_package_field() {
        let mut derivations = Derivations::default();
        derivations.package = DerivationGroup::package().constant("_pkg", json!("x"));
        let prompts = [PromptSpec::new("_pkg", "Pkg")];

        let result = run(&prompts, &derivations, None, &answers(json!({}))).await;
        assert!(matches!(result, Err(StampError::ReservedPrompt { .. })));
    }

    #[tokio::test]
    async fn test_injected_fields_are_visible() {
        let settings = Settings::default();
        let derivations = Derivations::default();
        let mut injected = Map::new();
        injected.insert("_packageDir".into(), json!("/pkg"));
        let request = DeriveRequest {
            settings: &settings,
            prompts: &[],
            derivations: &derivations,
            overrides: None,
            injected,
        };
        let context = derive(request, &answers(json!({}))).await.unwrap();
        assert_eq!(context.get("_packageDir"), Some(&json!("/pkg")));
    }
}
