//! Ordered model table. Most specific first: within a generation the
//! order is `pro max` > `pro` > `air` > `plus` > `mini` > `e` > base,
//! and year-suffixed SE strings come before the numbered and generic
//! SE rows.

use {regex::Regex, std::sync::LazyLock};

static MODEL_TABLE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    // Separators are optional so that compacted titles like
    // "IPHONE16PROMAX" still match.
    const SEP: &str = r"[\s\-]*";
    let entry = |pattern: &str, tag| {
        let pattern = format!("(?i){}", pattern.replace(' ', SEP));
        (Regex::new(&pattern).unwrap(), tag)
    };
    vec![
        entry(r"iphone 17 pro max", "iphone-17-pro-max"),
        entry(r"iphone 17 pro", "iphone-17-pro"),
        entry(r"iphone 17 air", "iphone-17-air"),
        entry(r"iphone 17", "iphone-17"),
        entry(r"iphone 16 pro max", "iphone-16-pro-max"),
        entry(r"iphone 16 pro", "iphone-16-pro"),
        entry(r"iphone 16 plus", "iphone-16-plus"),
        entry(r"iphone 16 e\b", "iphone-16e"),
        entry(r"iphone 16", "iphone-16"),
        entry(r"iphone 15 pro max", "iphone-15-pro-max"),
        entry(r"iphone 15 pro", "iphone-15-pro"),
        entry(r"iphone 15 plus", "iphone-15-plus"),
        entry(r"iphone 15", "iphone-15"),
        entry(r"iphone 14 pro max", "iphone-14-pro-max"),
        entry(r"iphone 14 pro", "iphone-14-pro"),
        entry(r"iphone 14 plus", "iphone-14-plus"),
        entry(r"iphone 14", "iphone-14"),
        entry(r"iphone 13 pro max", "iphone-13-pro-max"),
        entry(r"iphone 13 pro", "iphone-13-pro"),
        entry(r"iphone 13 mini", "iphone-13-mini"),
        entry(r"iphone 13", "iphone-13"),
        // SE: release years before generation numbers before generic,
        // otherwise "SE 2022" would be eaten by the "SE 2" row.
        entry(r"iphone se 2022", "iphone-se-3"),
        entry(r"iphone se 2020", "iphone-se-2"),
        entry(r"iphone se (?:3|3rd|third)(?: gen(?:eration)?)?\b", "iphone-se-3"),
        entry(r"iphone se (?:2|2nd|second)(?: gen(?:eration)?)?\b", "iphone-se-2"),
        entry(r"iphone se\b", "iphone-se"),
    ]
});

/// Extracts the phone model slug from a title; first table match wins.
pub fn extract_model(title: &str) -> Option<&'static str> {
    MODEL_TABLE
        .iter()
        .find(|(pattern, _)| pattern.is_match(title))
        .map(|(_, tag)| *tag)
}
