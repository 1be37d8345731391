//! Condition table. Refurbished rows are tested before used rows so
//! that "certified pre-owned" does not read as plain used, and both
//! come before the new rows because "renewed" contains "new".

use {model::Condition, regex::Regex, std::sync::LazyLock};

static CONDITION_TABLE: LazyLock<Vec<(Regex, Condition)>> = LazyLock::new(|| {
    let entry = |pattern: &str, condition| {
        (Regex::new(&format!("(?i){pattern}")).unwrap(), condition)
    };
    vec![
        entry(
            r"refurbished|refurb\b|renewed|reconditioned|certified[\s\-]*pre[\s\-]*owned|\bcpo\b|generalüberholt|reconditionn[ée]|整備済|リファービッシュ|리퍼|翻新|مجدد",
            Condition::Refurbished,
        ),
        entry(
            r"\bused\b|pre[\s\-]*owned|second[\s\-]*hand|secondhand|gebraucht|occasion|中古|중고|二手|مستعمل",
            Condition::Used,
        ),
        entry(
            r"brand[\s\-]*new|\bbnib\b|\bnew\b|\bneu\b|\bneuf\b|新品|새제품|全新|جديد",
            Condition::New,
        ),
    ]
});

/// Extracts the condition from a title; defaults to new when nothing
/// matches.
pub fn extract_condition(title: &str) -> Condition {
    CONDITION_TABLE
        .iter()
        .find(|(pattern, _)| pattern.is_match(title))
        .map(|(_, condition)| *condition)
        .unwrap_or(Condition::New)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_conditions() {
        assert_eq!(extract_condition("iPhone 16 Pro New"), Condition::New);
        assert_eq!(
            extract_condition("iPhone 16 Pro Brand New Sealed"),
            Condition::New
        );
        assert_eq!(extract_condition("iPhone 16 Pro BNIB"), Condition::New);
    }

    #[test]
    fn refurbished_conditions() {
        assert_eq!(
            extract_condition("iPhone 16 Pro Refurbished"),
            Condition::Refurbished
        );
        assert_eq!(
            extract_condition("iPhone 16 Pro Renewed"),
            Condition::Refurbished
        );
        assert_eq!(
            extract_condition("iPhone 16 Pro Certified Pre-Owned"),
            Condition::Refurbished
        );
        assert_eq!(
            extract_condition("iPhone 15 整備済み品"),
            Condition::Refurbished
        );
    }

    #[test]
    fn used_conditions() {
        assert_eq!(extract_condition("iPhone 16 Pro Used"), Condition::Used);
        assert_eq!(extract_condition("iPhone 16 Pro Pre-Owned"), Condition::Used);
        assert_eq!(
            extract_condition("iPhone 16 Pro Second Hand"),
            Condition::Used
        );
        assert_eq!(extract_condition("iPhone 14 中古"), Condition::Used);
    }

    #[test]
    fn defaults_to_new() {
        assert_eq!(
            extract_condition("iPhone 16 Pro 256GB Black"),
            Condition::New
        );
    }
}
