use serde_json::Value;

use super::{DerivationGroup, DerivationStage};

/// Fields every run starts with. The dot-file names let packages ship files
/// like `{{_gitignore}}` that package managers would otherwise strip.
pub const BUILTIN_FIELDS: [(&str, &str); 5] = [
    ("_templatesDir", "templates"),
    ("_gitignore", ".gitignore"),
    ("_npmignore", ".npmignore"),
    ("_eslintrc", ".eslintrc"),
    ("_npmrc", ".npmrc"),
];

pub fn group() -> DerivationGroup {
    BUILTIN_FIELDS.iter().fold(
        DerivationGroup::new(DerivationStage::Builtin),
        |group, (name, value)| group.constant(*name, Value::from(*value)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_group() {
        let group = group();
        assert_eq!(group.stage(), DerivationStage::Builtin);
        assert_eq!(
            group.names().collect::<Vec<_>>(),
            vec!["_templatesDir", "_gitignore", "_npmignore", "_eslintrc", "_npmrc"]
        );
    }
}
