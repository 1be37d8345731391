use {regex::Regex, std::sync::LazyLock};

static STORAGE_TOKENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(gb|tb)").unwrap());

/// Storage sizes that exist in the catalog generation range. Anything
/// else (32GB, 4TB, ...) is some other device or a typo and is ignored.
const VALID_STORAGES: &[&str] = &["64gb", "128gb", "256gb", "512gb", "1tb", "2tb"];

/// All whitelisted storage tokens in the title, in order of appearance.
/// More than one distinct token is a strong multi-variant signal.
pub fn storage_tokens(title: &str) -> Vec<String> {
    STORAGE_TOKENS
        .captures_iter(title)
        .map(|caps| format!("{}{}", &caps[1], caps[2].to_lowercase()))
        .filter(|token| VALID_STORAGES.contains(&token.as_str()))
        .collect()
}

/// Extracts the storage attribute; the first whitelisted token wins.
pub fn extract_storage(title: &str) -> Option<String> {
    storage_tokens(title).into_iter().next()
}
