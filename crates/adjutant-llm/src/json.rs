//! Extraction of the first JSON object from free-form model output.
//!
//! Models wrap JSON in markdown fences or prose; both the judge verdict and
//! the completion-check verdict are pulled out with the same brace scan.

/// Return the first balanced `{…}` region of `raw`, honouring strings.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract and parse in one step.
pub fn parse_json_object(raw: &str) -> Option<serde_json::Value> {
    serde_json::from_str(extract_json_object(raw)?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_object() {
        assert_eq!(extract_json_object(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn extracts_from_markdown_fence() {
        let raw = "Вот ответ:\n```json\n{\"type\": \"task\", \"confidence\": 85}\n```\nГотово.";
        let obj = parse_json_object(raw).unwrap();
        assert_eq!(obj["confidence"], 85);
    }

    #[test]
    fn handles_nested_objects() {
        let raw = r#"prefix {"a": {"b": 2}} suffix"#;
        assert_eq!(extract_json_object(raw), Some(r#"{"a": {"b": 2}}"#));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scan() {
        let raw = r#"{"text": "скобка } внутри", "n": 1}"#;
        let obj = parse_json_object(raw).unwrap();
        assert_eq!(obj["n"], 1);
    }

    #[test]
    fn no_object_yields_none() {
        assert_eq!(extract_json_object("никакого JSON тут нет"), None);
        assert_eq!(extract_json_object("{unterminated"), None);
    }
}
