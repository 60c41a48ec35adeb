/// Trimmed keyword, None when there is nothing to search for
pub fn normalize_keyword(keyword: Option<&str>) -> Option<&str> {
    keyword.map(str::trim).filter(|keyword| !keyword.is_empty())
}

/// Title contains the keyword ignoring case, or one of the tags is exactly the keyword
pub fn matches_keyword(title: &str, tags: &[String], keyword: &str) -> bool {
    title.to_lowercase().contains(&keyword.to_lowercase()) || tags.iter().any(|tag| tag == keyword)
}

/// ILIKE pattern matching the keyword literally anywhere in the text
pub fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod search_tests {
    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn title_match_is_case_insensitive_substring() {
        assert!(matches_keyword("Galactic sfx", &[], "SF"));
        assert!(matches_keyword("The SF Anthology", &[], "sf"));
        assert!(!matches_keyword("Romance", &[], "SF"));
    }

    #[test]
    fn tag_match_is_exact() {
        assert!(matches_keyword("Romance", &tags(&["SF", "original"]), "SF"));
        assert!(!matches_keyword("Romance", &tags(&["SF-short"]), "SF"));
        assert!(!matches_keyword("Romance", &tags(&["sf"]), "SF"));
    }

    #[test]
    fn blank_keyword_means_no_filter() {
        assert_eq!(normalize_keyword(None), None);
        assert_eq!(normalize_keyword(Some("   ")), None);
        assert_eq!(normalize_keyword(Some(" SF ")), Some("SF"));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("SF"), "%SF%");
        assert_eq!(like_pattern("100%_a\\b"), "%100\\%\\_a\\\\b%");
    }
}
