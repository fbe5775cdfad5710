use std::sync::OnceLock;

use regex_lite::Regex;

use crate::context::DataContext;
use crate::error::{Result, StampError};

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^}]+?)\}\}").expect("token pattern is valid"))
}

/// Substitute `{{name}}` placeholders in a path template.
///
/// ```text
/// "{{fruit}}/{{vegetable}}.txt" + {fruit: "apple", vegetable: "tomato"} -> "apple/tomato.txt"
/// ```
///
/// Every token must name a present, truthy field. A token whose text contains
/// another brace pair (`{{a{{b}}}}`) is rejected rather than resolved.
pub fn resolve_tokens(template: &str, context: &DataContext) -> Result<String> {
    let mut resolved = String::with_capacity(template.len());
    let mut last = 0;

    for caps in token_re().captures_iter(template) {
        let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let token = token.as_str();

        if token.contains("{{") || token.contains("}}") {
            return Err(StampError::MalformedToken {
                token: token.to_string(),
                template: template.to_string(),
            });
        }

        let value = context
            .text(token)
            .ok_or_else(|| StampError::UnknownToken {
                token: token.to_string(),
                template: template.to_string(),
            })?;

        resolved.push_str(&template[last..whole.start()]);
        resolved.push_str(&value);
        last = whole.end();
    }

    resolved.push_str(&template[last..]);
    Ok(resolved)
}
