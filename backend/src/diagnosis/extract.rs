/// Pulls the JSON object out of free-form model output.
///
/// Markdown fences are dropped first, then the slice from the first `{` to
/// the last `}` is taken so that stray prose around the object is ignored.
/// When no braces are present the fence-stripped text is returned as-is and
/// the caller's parse reports the failure.
pub fn extract_json_object(text: &str) -> &str {
    let stripped = strip_fences(text);
    match (stripped.find('{'), stripped.rfind('}')) {
        (Some(start), Some(end)) if start < end => &stripped[start..=end],
        _ => stripped,
    }
}

fn strip_fences(text: &str) -> &str {
    let mut inner = text.trim();
    if let Some(rest) = inner.strip_prefix("```") {
        // Skip the info string (`json`, `JSON`, ...) that follows the opening fence.
        inner = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        };
    }
    if let Some(rest) = inner.trim_end().strip_suffix("```") {
        inner = rest;
    }
    inner.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJECT: &str = r#"{"disease": "Healthy", "confidence": 95}"#;

    #[test]
    fn plain_object_is_returned_untouched() {
        assert_eq!(extract_json_object(OBJECT), OBJECT);
    }

    #[test]
    fn multi_line_json_fence_is_stripped() {
        let fenced = format!("```json\n{}\n```\n", OBJECT);
        assert_eq!(extract_json_object(&fenced), OBJECT);
    }

    #[test]
    fn single_line_fence_is_stripped() {
        let fenced = format!("```json {} ```", OBJECT);
        assert_eq!(extract_json_object(&fenced), OBJECT);

        let bare = format!("```{}```", OBJECT);
        assert_eq!(extract_json_object(&bare), OBJECT);
    }

    #[test]
    fn surrounding_prose_is_ignored() {
        let chatty = format!("Here is the analysis you asked for:\n{}\nLet me know!", OBJECT);
        assert_eq!(extract_json_object(&chatty), OBJECT);
    }

    #[test]
    fn nested_objects_extend_to_the_last_brace() {
        let nested = r#"```JSON
{"disease": "Blight", "meta": {"source": "leaf"}}
```"#;
        assert_eq!(
            extract_json_object(nested),
            r#"{"disease": "Blight", "meta": {"source": "leaf"}}"#
        );
    }

    #[test]
    fn text_without_braces_is_left_for_the_parser() {
        assert_eq!(
            extract_json_object("```\nI cannot analyse this image.\n```"),
            "I cannot analyse this image."
        );
        assert_eq!(extract_json_object("} backwards {"), "} backwards {");
    }
}
