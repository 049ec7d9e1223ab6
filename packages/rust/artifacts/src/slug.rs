use std::sync::LazyLock;

use regex::Regex;

static NON_ALNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

/// Derive a URL-safe slug: lowercase ASCII alphanumerics separated by single
/// hyphens, with no leading or trailing hyphen.
///
/// Pure function of its input, so the same name always maps to the same path.
pub fn slugify(name: &str) -> String {
    let lower = name.to_lowercase();
    NON_ALNUM_RE
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ampersand_and_spaces_collapse() {
        assert_eq!(slugify("Multiple Sclerosis & MS"), "multiple-sclerosis-ms");
    }

    #[test]
    fn edges_are_trimmed() {
        assert_eq!(slugify("  (Vitamin D)  "), "vitamin-d");
        assert_eq!(slugify("B-cell -- depletion!"), "b-cell-depletion");
    }

    #[test]
    fn non_ascii_becomes_separator() {
        assert_eq!(slugify("Sjögren syndrome"), "sj-gren-syndrome");
    }

    #[test]
    fn punctuation_only_is_empty() {
        assert_eq!(slugify("&&&"), "");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn stable_across_calls() {
        assert_eq!(slugify("Stem Cells"), slugify("Stem Cells"));
    }
}
