use serde_json::{Map, Value};

use crate::error::{Result, StampError};

/// Parse a raw override payload into an answer map.
///
/// Surrounding whitespace is ignored, and one layer of matching single or
/// double quotes wrapping a `{...}` literal is removed before parsing, so a
/// payload that went through an extra round of shell quoting still works.
pub fn parse_overrides(raw: &str) -> Result<Map<String, Value>> {
    let payload = strip_quotes(raw.trim());

    let value: Value =
        serde_json::from_str(payload).map_err(|source| StampError::OverridesParse { source })?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(StampError::OverridesNotObject {
            found: other.to_string(),
        }),
    }
}

fn strip_quotes(payload: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = payload
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            if inner.starts_with('{') && inner.ends_with('}') {
                return inner;
            }
        }
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("{}")]
    #[case(" {}")]
    #[case(" {}   ")]
    fn test_empty_payloads(#[case] raw: &str) {
        assert!(parse_overrides(raw).unwrap().is_empty());
    }

    #[rstest]
    #[case(r#"{"foo":42}"#)]
    #[case(r#"'{"foo":42}'"#)]
    #[case(r#"  '{"foo":42}'"#)]
    #[case(r#"'{"foo":42}'  "#)]
    #[case(r#""{"foo":42}""#)]
    #[case(r#"  "{"foo":42}""#)]
    #[case(r#""{"foo":42}"  "#)]
    fn test_quoted_payloads(#[case] raw: &str) {
        let parsed = parse_overrides(raw).unwrap();
        assert_eq!(parsed.get("foo"), Some(&json!(42)));
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_only_one_layer_is_stripped() {
        let result = parse_overrides(r#"''{"foo":42}''"#);
        assert!(matches!(result, Err(StampError::OverridesParse { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let result = parse_overrides("{foo: 42}");
        assert!(matches!(result, Err(StampError::OverridesParse { .. })));
    }

    #[rstest]
    #[case("[1, 2]")]
    #[case("42")]
    #[case(r#""{}x""#)]
    fn test_non_object_payloads(#[case] raw: &str) {
        assert!(matches!(
            parse_overrides(raw),
            Err(StampError::OverridesNotObject { .. })
        ));
    }
}
