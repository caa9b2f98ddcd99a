use std::collections::BTreeMap;

/// Wildcard references in `text`, written as `__name__`, in order of first
/// appearance and without duplicates.
pub fn wildcard_refs(text: &str) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for (start, end) in scan(text) {
        let name = &text[start..end];
        if !refs.iter().any(|r| r == name) {
            refs.push(name.to_string());
        }
    }
    refs
}

/// Replaces every `__name__` that has a binding. Unknown references are
/// left untouched.
pub fn render(text: &str, bindings: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in scan(text) {
        if let Some(value) = bindings.get(&text[start..end]) {
            out.push_str(&text[cursor..start - 2]);
            out.push_str(value);
            cursor = end + 2;
        }
    }
    out.push_str(&text[cursor..]);
    out
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '/' | '.')
}

/// Byte ranges of the names between `__` delimiters.
fn scan(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(open) = text[from..].find("__") {
        let start = from + open + 2;
        let Some(close) = text[start..].find("__") else {
            break;
        };
        let end = start + close;
        let name = &text[start..end];
        if !name.is_empty() && name.chars().all(is_name_char) {
            spans.push((start, end));
            from = end + 2;
        } else {
            from = start;
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_in_order() {
        assert_eq!(
            wildcard_refs("a __color__ __animal__ with __color__ eyes"),
            vec!["color", "animal"]
        );
        assert!(wildcard_refs("no refs, just __ underscores").is_empty());
        assert_eq!(wildcard_refs("__hair_color__"), vec!["hair_color"]);
    }

    #[test]
    fn test_render_leaves_unknown() {
        let bindings = BTreeMap::from([("color".to_string(), "red".to_string())]);
        assert_eq!(
            render("a __color__ __animal__", &bindings),
            "a red __animal__"
        );
    }
}
