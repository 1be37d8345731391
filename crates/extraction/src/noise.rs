use {regex::Regex, std::sync::LazyLock};

/// Accessory and adjacent-product keywords, matched as lowercase
/// substrings. A hit means the row is not a phone listing and must not
/// be promoted.
const NOISE_KEYWORDS: &[&str] = &[
    // English
    "case",
    "cover",
    "protector",
    "tempered glass",
    "charger",
    "charging",
    "cable",
    "adapter",
    "earbuds",
    "headphone",
    "airpods",
    "magsafe",
    "battery pack",
    "power bank",
    "stand",
    "holder",
    "mount",
    "stylus",
    "lens",
    "skin",
    "sticker",
    "ipad",
    "apple watch",
    // German
    "hülle",
    "schutzfolie",
    "panzerglas",
    "ladegerät",
    "ladekabel",
    // French
    "coque",
    "étui",
    "chargeur",
    "câble",
    "protection écran",
    // Japanese
    "ケース",
    "カバー",
    "フィルム",
    "充電器",
    "ケーブル",
    "イヤホン",
    // Korean
    "케이스",
    "커버",
    "충전기",
    "필름",
    // Chinese
    "保護殼",
    "保护壳",
    "保護貼",
    "保护膜",
    "充电器",
    "數據線",
    "数据线",
    // Arabic
    "غطاء",
    "حافظة",
    "شاحن",
];

static IPHONE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)iphone|アイフォン|アイフォーン|아이폰").unwrap());

/// True when the title is an accessory or another product entirely.
pub fn is_noise(title: &str) -> bool {
    let lowered = title.to_lowercase();
    NOISE_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

/// True when the title talks about an iPhone at all (any script).
pub fn mentions_iphone(title: &str) -> bool {
    IPHONE_MENTION.is_match(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_cases_and_protectors() {
        assert!(is_noise("iPhone 16 Pro Case Cover"));
        assert!(is_noise("Leather case for iPhone"));
        assert!(is_noise("iPhone 16 Screen Protector"));
        assert!(is_noise("Tempered Glass for iPhone"));
    }

    #[test]
    fn filters_accessories() {
        assert!(is_noise("iPhone Charger Cable"));
        assert!(is_noise("MagSafe Battery Pack"));
        assert!(is_noise("AirPods Pro 2"));
        assert!(is_noise("iPhone 16 ケース 手帳型"));
        assert!(is_noise("아이폰 16 케이스"));
    }

    #[test]
    fn allows_actual_phones() {
        assert!(!is_noise("Apple iPhone 16 Pro Max 256GB"));
        assert!(!is_noise("iPhone 16 Pro Black Titanium"));
    }

    #[test]
    fn detects_iphone_mentions_across_scripts() {
        assert!(mentions_iphone("Apple iPhone 16 Pro"));
        assert!(mentions_iphone("IPHONE 16"));
        assert!(mentions_iphone("アイフォン16 本体"));
        assert!(mentions_iphone("아이폰 16 프로"));
        assert!(!mentions_iphone("Samsung Galaxy S24"));
        assert!(!mentions_iphone("iPad Pro 2024"));
    }
}
