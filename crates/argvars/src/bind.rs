//! Single pass template substitution

fn is_var_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Substitute `{Name}` references in `template` using `lookup`.
///
/// Names that `lookup` does not know are replaced with the empty string. A
/// backslash directly before `{` is dropped and the braced section is copied
/// through untouched. A `{` without a closing `}`, or braces which do not
/// enclose a plain identifier, are copied through as well. Substituted values
/// are never scanned again.
pub fn bind_with<'a, F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['\\', '{']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(escaped) = tail.strip_prefix('\\') {
            if !escaped.starts_with('{') {
                out.push('\\');
                rest = escaped;
                continue;
            }
            match escaped.find('}') {
                Some(end) => {
                    out.push_str(&escaped[..=end]);
                    rest = &escaped[end + 1..];
                }
                None => {
                    out.push_str(escaped);
                    rest = "";
                }
            }
            continue;
        }

        // tail starts with '{'
        match tail.find('}') {
            Some(end) if is_var_name(&tail[1..end]) => {
                if let Some(value) = lookup(&tail[1..end]) {
                    out.push_str(value);
                }
                rest = &tail[end + 1..];
            }
            Some(_) => {
                out.push('{');
                rest = &tail[1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

/// Names of every variable `template` would substitute, in order of appearance
pub fn template_vars(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(pos) = rest.find(['\\', '{']) {
        let tail = &rest[pos..];
        if let Some(escaped) = tail.strip_prefix('\\') {
            rest = match (escaped.starts_with('{'), escaped.find('}')) {
                (true, Some(end)) => &escaped[end + 1..],
                (true, None) => "",
                (false, _) => escaped,
            };
            continue;
        }
        match tail.find('}') {
            Some(end) if is_var_name(&tail[1..end]) => {
                names.push(tail[1..end].to_string());
                rest = &tail[end + 1..];
            }
            Some(_) => rest = &tail[1..],
            None => rest = "",
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn values() -> HashMap<&'static str, &'static str> {
        HashMap::from([("X", "{Y}"), ("Y", "Z"), ("Name", "value")])
    }

    fn bind(template: &str) -> String {
        let values = values();
        bind_with(template, |name| values.get(name).copied())
    }

    #[test]
    fn plain_identifiers_are_untouched() {
        assert_eq!(bind("Name"), "Name");
        assert_eq!(bind("X Y Name"), "X Y Name");
    }

    #[test]
    fn braced_names_are_substituted() {
        assert_eq!(bind("{Name}"), "value");
        assert_eq!(bind("a{Name}b{Y}c"), "avaluebZc");
    }

    #[test]
    fn undefined_names_are_empty() {
        assert_eq!(bind("[{Missing}]"), "[]");
    }

    #[test]
    fn escaped_braces_are_kept() {
        assert_eq!(bind("\\{Name}"), "{Name}");
        assert_eq!(bind("x \\{Name} {Name}"), "x {Name} value");
        assert_eq!(bind("\\{unterminated"), "{unterminated");
    }

    #[test]
    fn lone_backslash_is_kept() {
        assert_eq!(bind("C:\\dir\\{Name}"), "C:\\dir{Name}");
        assert_eq!(bind("trailing\\"), "trailing\\");
    }

    #[test]
    fn substitution_is_not_recursive() {
        assert_eq!(bind("{X}"), "{Y}");
    }

    #[test]
    fn unterminated_brace_passes_through() {
        assert_eq!(bind("open { brace"), "open { brace");
        assert_eq!(bind("{Name} and {"), "value and {");
    }

    #[test]
    fn non_identifier_braces_pass_through() {
        assert_eq!(bind(r#"{"key": 1}"#), r#"{"key": 1}"#);
        assert_eq!(bind("{}"), "{}");
        assert_eq!(bind("{{Name}}"), "{value}");
    }

    #[test]
    fn lists_template_vars() {
        assert_eq!(
            template_vars("{FilePath} \\{Skipped} {PromptString1} {not a var}"),
            vec!["FilePath".to_string(), "PromptString1".to_string()]
        );
        assert!(template_vars("no vars here").is_empty());
    }
}
