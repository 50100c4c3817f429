use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::normalize::normalize_family;

const ALIASES: &[(&str, &str)] = &[
    ("times new roman", "times"),
    ("times-roman", "times"),
    ("timesnewroman", "times"),
    ("arialmt", "arial"),
    ("arial unicode ms", "arial"),
    ("helvetica neue", "helvetica"),
    ("helveticaneue", "helvetica"),
    ("segoe ui variable", "segoe ui"),
    ("trebuchetms", "trebuchet ms"),
    ("couriernew", "courier new"),
    ("bookantiqua", "book antiqua"),
    ("centuryschoolbook", "century schoolbook"),
];

const STANDARD_FAMILIES: &[&str] = &[
    "Arial",
    "Helvetica",
    "Times New Roman",
    "Times",
    "Courier New",
    "Courier",
    "Calibri",
    "Verdana",
    "Tahoma",
    "Georgia",
    "Palatino",
    "Garamond",
    "Book Antiqua",
    "Century Schoolbook",
    "Lucida Console",
    "Monaco",
    "Trebuchet MS",
    "Arial Black",
    "Impact",
    "Comic Sans MS",
    "Cambria",
    "Segoe UI",
];

const BLACKLIST: &[&str] = &["wingdings", "webdings", "symbol", "marlett", "mt extra"];

static ALIAS_TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
static WHITELIST: OnceLock<HashSet<String>> = OnceLock::new();
static SUSPICIOUS_RE: OnceLock<Option<Regex>> = OnceLock::new();

pub fn alias_of(name: &str) -> Option<&'static str> {
    ALIAS_TABLE
        .get_or_init(|| ALIASES.iter().copied().collect())
        .get(name)
        .copied()
}

/// Whether a normalized family matches a common system font.
pub fn is_standard(family: &str) -> bool {
    WHITELIST
        .get_or_init(|| STANDARD_FAMILIES.iter().map(|f| normalize_family(f)).collect())
        .contains(family)
}

pub fn is_blacklisted(family: &str) -> bool {
    BLACKLIST.contains(&family)
}

pub fn has_suspicious_keyword(family: &str) -> bool {
    SUSPICIOUS_RE
        .get_or_init(|| {
            Regex::new(
                r"(?i)(crack|hack|pirat|illegal|stolen|fake|clone|copy|mod|cracked|hacked|proprietary|generated|auto)",
            )
            .ok()
        })
        .as_ref()
        .map(|re| re.is_match(family))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_families_survive_normalization() {
        assert!(is_standard("arial"));
        assert!(is_standard("times"));
        assert!(is_standard("trebuchet ms"));
        assert!(is_standard("segoe ui"));
        assert!(!is_standard("papyrus"));
    }

    #[test]
    fn blacklist_is_exact() {
        assert!(is_blacklisted("wingdings"));
        assert!(!is_blacklisted("wingdings 2"));
    }

    #[test]
    fn keyword_match_is_substring() {
        assert!(has_suspicious_keyword("fakesans"));
        assert!(has_suspicious_keyword("modern"));
        assert!(!has_suspicious_keyword("arial"));
    }
}
