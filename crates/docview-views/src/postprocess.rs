//! Result cleanups applied after the model round-trips.

use once_cell::sync::Lazy;
use regex::Regex;

// Trailing parenthetical, ASCII or full-width parens.
static TRAILING_PARENTHETICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[(（][^()（）]*[)）]\s*$").unwrap());

/// Strip a trailing parenthetical translation from a technology name.
///
/// When the parenthetical is all the name has, the original span is kept
/// unchanged rather than returning an empty name.
pub fn strip_parenthetical_translation(name: &str) -> String {
    let stripped = TRAILING_PARENTHETICAL.replace(name, "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        name.trim().to_string()
    } else {
        stripped.to_string()
    }
}

/// Clean a technology-name list: strip parentheticals, drop empties and
/// case-insensitive duplicates, keep document order, cap the length.
pub fn clean_technology_names(names: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .map(|n| strip_parenthetical_translation(&n))
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(n.to_lowercase()))
        .take(cap)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_ascii_parenthetical() {
        assert_eq!(strip_parenthetical_translation("Kubernetes (container orchestration)"), "Kubernetes");
    }

    #[test]
    fn test_strips_fullwidth_parenthetical() {
        assert_eq!(
            strip_parenthetical_translation("Docker\u{FF08}container runtime\u{FF09}"),
            "Docker"
        );
    }

    #[test]
    fn test_keeps_name_without_parenthetical() {
        assert_eq!(strip_parenthetical_translation("PostgreSQL"), "PostgreSQL");
    }

    #[test]
    fn test_parenthetical_only_span_is_preserved() {
        assert_eq!(strip_parenthetical_translation("(orchestration)"), "(orchestration)");
    }

    #[test]
    fn test_interior_parenthetical_untouched() {
        assert_eq!(
            strip_parenthetical_translation("C (the language) compiler"),
            "C (the language) compiler"
        );
    }

    #[test]
    fn test_clean_list_dedups_and_caps() {
        let names = vec![
            "Docker (runtime)".to_string(),
            "docker".to_string(),
            "Kubernetes".to_string(),
            "  ".to_string(),
            "Helm".to_string(),
        ];
        let cleaned = clean_technology_names(names, 2);
        assert_eq!(cleaned, vec!["Docker".to_string(), "Kubernetes".to_string()]);
    }
}
