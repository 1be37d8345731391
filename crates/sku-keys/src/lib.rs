//! Stable key and fingerprint construction.
//!
//! Everything in this crate is deterministic: the same inputs always
//! produce byte-identical output, independent of locale. These keys end
//! up in unique database indices (`sku_key`, `dedup_key`) and cache
//! keys, so changing any of them is a data migration.

use {
    regex::Regex,
    sha2::{Digest, Sha256},
    std::sync::LazyLock,
};

static WHITESPACE_OR_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_]+").unwrap());
static NON_KEY_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9-]").unwrap());
static REPEATED_HYPHENS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").unwrap());
static STORAGE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)\s*(gb|tb)").unwrap());

/// Normalized attributes identifying one Golden SKU.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SkuAttributes {
    pub model: String,
    pub storage: String,
    pub color: String,
    pub condition: String,
    pub sim_variant: Option<String>,
    pub lock_state: Option<String>,
    pub region_variant: Option<String>,
}

/// Normalizes a string for key construction: lowercase, spaces and
/// underscores to hyphens, every other non-alphanumeric dropped,
/// repeated hyphens collapsed, leading/trailing hyphens trimmed.
pub fn normalize(value: &str) -> String {
    let lowered = value.to_lowercase();
    let hyphenated = WHITESPACE_OR_UNDERSCORE.replace_all(lowered.trim(), "-");
    let cleaned = NON_KEY_CHARS.replace_all(&hyphenated, "");
    let collapsed = REPEATED_HYPHENS.replace_all(&cleaned, "-");
    collapsed.trim_matches('-').to_string()
}

/// Computes the stable `sku_key`:
/// `{model}-{storage}-{color}-{condition}[-{sim}][-{lock}][-{region}]`,
/// empty parts dropped.
pub fn compose_sku_key(attrs: &SkuAttributes) -> String {
    let mut parts = vec![
        normalize(&attrs.model),
        normalize(&attrs.storage),
        normalize(&attrs.color),
        normalize(&attrs.condition),
    ];
    for optional in [&attrs.sim_variant, &attrs.lock_state, &attrs.region_variant] {
        if let Some(value) = optional {
            parts.push(normalize(value));
        }
    }
    parts.retain(|part| !part.is_empty());
    parts.join("-")
}

/// Computes the offer dedup key:
/// `{merchant_normalized}:{price:.2}:{CURRENCY}[:{url_hash8}]`.
pub fn compose_dedup_key(merchant: &str, price: f64, currency: &str, url: Option<&str>) -> String {
    let mut parts = vec![
        normalize(merchant),
        format!("{price:.2}"),
        currency.to_uppercase(),
    ];
    if let Some(url) = url.filter(|url| !url.is_empty()) {
        parts.push(sha256_hex(url)[..8].to_string());
    }
    parts.join(":")
}

/// Normalizes storage values, e.g. `256 GB` → `256gb`.
pub fn normalize_storage(raw: &str) -> String {
    let compact = raw.to_lowercase().replace(' ', "");
    match STORAGE_TOKEN.captures(&compact) {
        Some(caps) => format!("{}{}", &caps[1], &caps[2]),
        None => compact,
    }
}

/// Normalizes color values, mapping marketing names to their canonical
/// short form (`natural titanium` → `natural`).
pub fn normalize_color(raw: &str) -> String {
    match raw.to_lowercase().trim() {
        "space black" => "black",
        "space gray" | "space grey" => "gray",
        "natural titanium" => "natural",
        "white titanium" => "white",
        "black titanium" => "black",
        "desert titanium" => "desert",
        "blue titanium" => "blue",
        other => return normalize(other),
    }
    .to_string()
}

/// Fingerprint of the provider request that produced a raw row:
/// first 64 hex chars of `sha256("{query}|{gl}|{hl}|{location}")`.
pub fn request_key(query: &str, gl: &str, hl: &str, location: Option<&str>) -> String {
    let input = format!("{query}|{gl}|{hl}|{}", location.unwrap_or(""));
    sha256_hex(&input)[..64].to_string()
}

/// Stable identity for rows without a provider product id: first 32 hex
/// chars of the link's sha256.
pub fn link_hash(url: &str) -> String {
    sha256_hex(url)[..32].to_string()
}

/// Order-sensitive fingerprint of an LLM candidate list (first 40 hex
/// chars). `None` for an empty list.
pub fn candidates_fingerprint(candidates: &[String]) -> Option<String> {
    if candidates.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    for candidate in candidates {
        hasher.update(candidate.as_bytes());
        hasher.update([0u8]);
    }
    Some(hex::encode(hasher.finalize())[..40].to_string())
}

/// NUL-separated hash of arbitrary key parts, truncated to 40 hex
/// chars. Used for cache and lock key construction.
pub fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())[..40].to_string()
}

/// Full hex sha256 of a string.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_basics() {
        assert_eq!(normalize("  iPhone 16 Pro  "), "iphone-16-pro");
        assert_eq!(normalize("Space_Gray"), "space-gray");
        assert_eq!(normalize("Noir (PRODUCT)RED!"), "noir-productred");
        assert_eq!(normalize("--a---b--"), "a-b");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn sku_key_shape() {
        let attrs = SkuAttributes {
            model: "iphone-16-pro".to_string(),
            storage: "256gb".to_string(),
            color: "black".to_string(),
            condition: "new".to_string(),
            ..Default::default()
        };
        assert_eq!(compose_sku_key(&attrs), "iphone-16-pro-256gb-black-new");

        let key_re = Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$").unwrap();
        assert!(key_re.is_match(&compose_sku_key(&attrs)));
    }

    #[test]
    fn sku_key_appends_optional_variants_in_order() {
        let attrs = SkuAttributes {
            model: "iphone-16".to_string(),
            storage: "128gb".to_string(),
            color: "blue".to_string(),
            condition: "new".to_string(),
            sim_variant: Some("eSIM Only".to_string()),
            lock_state: Some("unlocked".to_string()),
            region_variant: Some("jp".to_string()),
        };
        assert_eq!(
            compose_sku_key(&attrs),
            "iphone-16-128gb-blue-new-esim-only-unlocked-jp"
        );
    }

    #[test]
    fn sku_key_drops_empty_parts() {
        let attrs = SkuAttributes {
            model: "iphone-16".to_string(),
            condition: "new".to_string(),
            ..Default::default()
        };
        assert_eq!(compose_sku_key(&attrs), "iphone-16-new");
    }

    #[test]
    fn dedup_key_format() {
        let key = compose_dedup_key("Apple", 1499.0, "usd", Some("https://x/y"));
        let hash8 = &sha256_hex("https://x/y")[..8];
        assert_eq!(key, format!("apple:1499.00:USD:{hash8}"));
    }

    #[test]
    fn dedup_key_without_url() {
        assert_eq!(
            compose_dedup_key("Bic Camera", 159800.0, "JPY", None),
            "bic-camera:159800.00:JPY"
        );
    }

    #[test]
    fn storage_normalization() {
        assert_eq!(normalize_storage("256 GB"), "256gb");
        assert_eq!(normalize_storage("1TB"), "1tb");
        assert_eq!(normalize_storage("weird"), "weird");
    }

    #[test]
    fn color_normalization() {
        assert_eq!(normalize_color("Natural Titanium"), "natural");
        assert_eq!(normalize_color("Space Grey"), "gray");
        assert_eq!(normalize_color("Desert Titanium"), "desert");
        assert_eq!(normalize_color("Deep Blue"), "deep-blue");
    }

    #[test]
    fn fingerprints_are_deterministic() {
        assert_eq!(request_key("iPhone 16 Pro", "jp", "en", None).len(), 64);
        assert_eq!(
            request_key("iPhone 16 Pro", "jp", "en", None),
            request_key("iPhone 16 Pro", "jp", "en", None)
        );
        assert_ne!(
            request_key("iPhone 16 Pro", "jp", "en", None),
            request_key("iPhone 16 Pro", "us", "en", None)
        );
        assert_eq!(link_hash("https://x/y").len(), 32);
    }

    #[test]
    fn candidate_fingerprint_is_order_sensitive() {
        let a = vec!["a".to_string(), "b".to_string()];
        let b = vec!["b".to_string(), "a".to_string()];
        assert_ne!(candidates_fingerprint(&a), candidates_fingerprint(&b));
        assert_eq!(candidates_fingerprint(&[]), None);
        assert_eq!(candidates_fingerprint(&a).unwrap().len(), 40);
    }
}
