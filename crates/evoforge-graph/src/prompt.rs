//! Prompt assembly for model-backed nodes.

use std::sync::OnceLock;

use regex::Regex;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"))
}

/// Substitute `{key}` placeholders with fields of `input`.
///
/// Returns `None` when the template has no placeholder that `input` can fill,
/// so callers can fall back to appending the raw input.
pub fn render_template(template: &str, input: &serde_json::Value) -> Option<String> {
    let obj = input.as_object()?;
    let mut filled = false;
    let rendered = placeholder_re().replace_all(template, |caps: &regex::Captures<'_>| {
        match obj.get(&caps[1]) {
            Some(serde_json::Value::String(s)) => {
                filled = true;
                s.clone()
            }
            Some(other) => {
                filled = true;
                other.to_string()
            }
            None => caps[0].to_string(),
        }
    });
    filled.then(|| rendered.into_owned())
}

/// System prompt for a model node: the graph's shared context plus the
/// node's role.
pub fn system_prompt(shared_context: &str, input: &serde_json::Value, node_name: &str) -> String {
    let context = match render_template(shared_context, input) {
        Some(rendered) => rendered,
        None if input.is_null() => shared_context.to_string(),
        None => format!("{}\nInput: {}", shared_context, input),
    };
    format!("{}\nYou are the {} node.", context.trim_start(), node_name)
}

/// Human message for a model node.
///
/// A pending `error_message` replaces the node prompt with a fix-it
/// instruction. Legal branch conditions are listed when the node routes.
pub fn user_prompt(
    node_prompt: &str,
    input: &serde_json::Value,
    error_message: Option<&str>,
    conditions: &[&str],
) -> String {
    let mut prompt = match error_message {
        Some(err) => format!(
            "Your last response triggered the following error:\n{}\nFix it.",
            err
        ),
        None => render_template(node_prompt, input).unwrap_or_else(|| node_prompt.to_string()),
    };
    if !conditions.is_empty() {
        prompt.push_str(&format!(
            "\n\nEnd your answer with exactly one of the following conditions: {}",
            conditions.join(", ")
        ));
    }
    prompt
}

/// Prompt used by the model-backed routing fallback.
pub fn routing_prompt(last_message: &str, conditions: &[String]) -> String {
    format!(
        "Given the following message, decide which condition applies.\n\
         Message:\n{}\n\n\
         Possible conditions: {}\n\
         Answer with the condition only.",
        last_message,
        conditions.join(", ")
    )
}

/// Extract a JSON payload from model output (code fence, or the outermost
/// braces).
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return &trimmed[start..=end];
            }
        }
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_known_placeholders() {
        let out = render_template("Solve {problem} in {lang}", &json!({"problem": "2+2", "lang": "en"}));
        assert_eq!(out.as_deref(), Some("Solve 2+2 in en"));
    }

    #[test]
    fn no_placeholder_yields_none() {
        assert!(render_template("Plain text", &json!({"problem": "x"})).is_none());
        assert!(render_template("Need {missing}", &json!({"problem": "x"})).is_none());
    }

    #[test]
    fn system_prompt_appends_input_without_placeholders() {
        let out = system_prompt("You solve math problems.", &json!({"q": 1}), "solver");
        assert!(out.contains("Input: {\"q\":1}"));
        assert!(out.ends_with("You are the solver node."));
    }

    #[test]
    fn user_prompt_uses_error_and_conditions() {
        let out = user_prompt("Answer {q}", &json!({"q": "why"}), Some("bad json"), &["yes", "no"]);
        assert!(out.starts_with("Your last response triggered the following error:\nbad json\nFix it."));
        assert!(out.contains("yes, no"));

        let out = user_prompt("Answer {q}", &json!({"q": "why"}), None, &[]);
        assert_eq!(out, "Answer why");
    }

    #[test]
    fn test_extract_json_code_fence() {
        let input = "Here you go:\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(input), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_embedded() {
        let input = "The result is {\"a\": {\"b\": 2}} as requested.";
        let value: serde_json::Value = serde_json::from_str(extract_json(input)).unwrap();
        assert_eq!(value["a"]["b"], 2);
    }
}
