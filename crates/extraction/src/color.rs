//! Ordered color table, specific to generic.
//!
//! Titanium compounds and multi-word colors come first so that
//! "Natural Titanium" never degrades to a bare metal name and
//! "Deep Blue" is not swallowed by the generic blue row. CJK entries
//! are matched without word boundaries: titles like
//! "iPhone17Pro深藍256GB" have no word breaks around the color.

use {regex::Regex, std::sync::LazyLock};

static COLOR_TABLE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    const SEP: &str = r"[\s\-]*";
    let entry = |pattern: &str, tag| {
        let pattern = format!("(?i){}", pattern.replace(' ', SEP));
        (Regex::new(&pattern).unwrap(), tag)
    };
    vec![
        // Titanium compounds (iPhone 15/16 Pro).
        entry(r"natural titanium", "natural"),
        entry(r"white titanium", "white"),
        entry(r"black titanium", "black"),
        entry(r"desert titanium", "desert"),
        entry(r"blue titanium", "blue"),
        entry(r"\bspace black\b", "black"),
        entry(r"\bspace gr[ae]y\b", "gray"),
        // iPhone 17 generation.
        entry(r"\bdeep blue\b", "deep-blue"),
        entry(r"\bcosmic orange\b", "cosmic-orange"),
        entry(r"\bmist blue\b", "mist-blue"),
        entry(r"\bsky blue\b", "sky-blue"),
        entry(r"\bcloud white\b", "cloud-white"),
        entry(r"\blight gold\b", "light-gold"),
        entry(r"\bsage\b", "sage"),
        entry(r"\blavender\b", "lavender"),
        // iPhone 16 generation.
        entry(r"\bultramarine\b", "ultramarine"),
        entry(r"\bteal\b", "teal"),
        // iPhone 13/14/SE.
        entry(r"\bmidnight\b", "midnight"),
        entry(r"\bstarlight\b", "starlight"),
        entry(r"\(product\)\s*red|\bproduct red\b", "red"),
        // Chinese; the deep blue compound must precede the plain blues.
        entry(r"深藍|深蓝", "deep-blue"),
        entry(r"藍色|蓝色", "blue"),
        entry(r"黑色", "black"),
        entry(r"白色", "white"),
        entry(r"金色", "gold"),
        entry(r"銀色|银色", "silver"),
        // Japanese katakana, compounds first.
        entry(r"ナチュラルチタニウム", "natural"),
        entry(r"ブラックチタニウム", "black"),
        entry(r"ホワイトチタニウム", "white"),
        entry(r"デザートチタニウム", "desert"),
        entry(r"ミッドナイト", "midnight"),
        entry(r"スターライト", "starlight"),
        entry(r"ブラック|黒", "black"),
        entry(r"ホワイト|白", "white"),
        entry(r"ブルー|青", "blue"),
        entry(r"ピンク", "pink"),
        entry(r"グリーン", "green"),
        entry(r"イエロー", "yellow"),
        entry(r"パープル", "purple"),
        entry(r"ゴールド", "gold"),
        entry(r"シルバー", "silver"),
        // Korean.
        entry(r"블랙", "black"),
        entry(r"화이트", "white"),
        entry(r"블루", "blue"),
        entry(r"핑크", "pink"),
        entry(r"골드", "gold"),
        entry(r"실버", "silver"),
        // Arabic.
        entry(r"أسود", "black"),
        entry(r"أبيض", "white"),
        entry(r"أزرق", "blue"),
        entry(r"ذهبي", "gold"),
        entry(r"فضي", "silver"),
        // Generic single words, with DE/FR synonyms.
        entry(r"\bblack\b|\bschwarz\b|\bnoir\b", "black"),
        entry(r"\bwhite\b|\bwei(?:ss|ß)\b|\bblanc\b", "white"),
        entry(r"\bblue\b|\bblau\b|\bbleu\b", "blue"),
        entry(r"\bpink\b|\brosa\b|\brose\b", "pink"),
        entry(r"\bgreen\b|\bgr(?:ün|uen)\b|\bvert\b", "green"),
        entry(r"\byellow\b|\bgelb\b|\bjaune\b", "yellow"),
        entry(r"\bpurple\b|\bviolett?\b|\blila\b", "purple"),
        entry(r"\borange\b", "orange"),
        entry(r"\bred\b|\brot\b|\brouge\b", "red"),
        entry(r"\bgr[ae]y\b|\bgrau\b|\bgris\b", "gray"),
        entry(r"\bsilver\b|\bsilber\b|\bargent\b", "silver"),
        entry(r"\bgold\b|\bdor[ée]e?\b", "gold"),
        entry(r"\bdesert\b", "desert"),
        entry(r"\bnatural\b", "natural"),
    ]
});

/// Extracts the color attribute; first table match wins.
pub fn extract_color(title: &str) -> Option<&'static str> {
    COLOR_TABLE
        .iter()
        .find(|(pattern, _)| pattern.is_match(title))
        .map(|(_, tag)| *tag)
}
