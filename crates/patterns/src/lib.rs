//! Literal-phrase detection for contract/plan listings and condition
//! hints.
//!
//! Compiled-in default phrases keep detection deterministic; admin
//! managed phrases loaded from the database extend them at request
//! time. Phrases are matched as lowercase literal substrings against
//! `title + "\n" + url-hint`, never as regex.

use {
    model::Condition,
    regex::Regex,
    std::sync::LazyLock,
    strum::{AsRefStr, Display, EnumString},
    url::Url,
};

/// What a phrase detects. The string forms are the values stored in the
/// `pattern_phrases.kind` column.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    AsRefStr,
    Display,
    EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum PhraseKind {
    Contract,
    ConditionNew,
    ConditionUsed,
    ConditionRefurbished,
}

impl PhraseKind {
    pub const ALL: [Self; 4] = [
        Self::Contract,
        Self::ConditionNew,
        Self::ConditionUsed,
        Self::ConditionRefurbished,
    ];
}

pub const DEFAULT_CONTRACT_PHRASES: &[&str] = &[
    // English
    "with data plan",
    "with contract",
    "monthly payments",
    "installment payments",
    "mobile phone plan",
    // German
    "vertrag",
    "ratenzahlung",
    "monatlich",
    // French
    "forfait",
    "abonnement",
    "mensualit",
    // Japanese
    "契約",
    "分割",
    "月額",
    "プラン",
    // Korean
    "약정",
    "할부",
    "요금제",
    "플랜",
    // Chinese
    "合約",
    "合约",
    "月費",
    "月费",
    "分期",
    "套餐",
    // Arabic
    "عقد",
    "خطة",
    "أقساط",
    "اقساط",
    "دفعات شهرية",
];

pub const DEFAULT_CONDITION_NEW_PHRASES: &[&str] = &[
    "brand new",
    "new",
    "新品",
    "새제품",
    "全新",
    "جديد",
    "neu",
    "neuf",
];

pub const DEFAULT_CONDITION_USED_PHRASES: &[&str] = &[
    "used",
    "pre-owned",
    "pre owned",
    "中古",
    "중고",
    "二手",
    "مستعمل",
    "gebraucht",
    "occasion",
];

pub const DEFAULT_CONDITION_REFURBISHED_PHRASES: &[&str] = &[
    "refurbished",
    "renewed",
    "reconditioned",
    "整備済み",
    "リファービッシュ",
    "리퍼",
    "翻新",
    "مجدد",
];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Lowercases a phrase and collapses runs of whitespace to single
/// spaces so stored and matched forms line up.
pub fn normalize_phrase(phrase: &str) -> String {
    WHITESPACE
        .replace_all(phrase.trim().to_lowercase().as_str(), " ")
        .to_string()
}

/// The merged phrase set used for one detection pass. Defaults first,
/// insertion order preserved, duplicates (after normalization) dropped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PatternBundle {
    pub contract: Vec<String>,
    pub condition_new: Vec<String>,
    pub condition_used: Vec<String>,
    pub condition_refurbished: Vec<String>,
}

impl PatternBundle {
    /// Builds a bundle from the compiled-in defaults only.
    pub fn defaults() -> Self {
        Self::merged(std::iter::empty())
    }

    /// Merges admin phrases (in load order) into the defaults.
    pub fn merged(extra: impl IntoIterator<Item = (PhraseKind, String)>) -> Self {
        let mut bundle = Self {
            contract: normalized(DEFAULT_CONTRACT_PHRASES),
            condition_new: normalized(DEFAULT_CONDITION_NEW_PHRASES),
            condition_used: normalized(DEFAULT_CONDITION_USED_PHRASES),
            condition_refurbished: normalized(DEFAULT_CONDITION_REFURBISHED_PHRASES),
        };
        for (kind, phrase) in extra {
            let phrase = normalize_phrase(&phrase);
            if phrase.is_empty() {
                continue;
            }
            let list = bundle.list_mut(kind);
            if !list.contains(&phrase) {
                list.push(phrase);
            }
        }
        bundle
    }

    pub fn list(&self, kind: PhraseKind) -> &[String] {
        match kind {
            PhraseKind::Contract => &self.contract,
            PhraseKind::ConditionNew => &self.condition_new,
            PhraseKind::ConditionUsed => &self.condition_used,
            PhraseKind::ConditionRefurbished => &self.condition_refurbished,
        }
    }

    fn list_mut(&mut self, kind: PhraseKind) -> &mut Vec<String> {
        match kind {
            PhraseKind::Contract => &mut self.contract,
            PhraseKind::ConditionNew => &mut self.condition_new,
            PhraseKind::ConditionUsed => &mut self.condition_used,
            PhraseKind::ConditionRefurbished => &mut self.condition_refurbished,
        }
    }
}

fn normalized(defaults: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(defaults.len());
    for phrase in defaults {
        let phrase = normalize_phrase(phrase);
        if !phrase.is_empty() && !out.contains(&phrase) {
            out.push(phrase);
        }
    }
    out
}

/// `host + path + ?query` of a product link, lowercased. The query part
/// often carries tokens like `condition=used`.
pub fn link_hint(product_link: Option<&str>) -> String {
    let Some(link) = product_link else {
        return String::new();
    };
    match Url::parse(link) {
        Ok(url) => format!(
            "{}{}?{}",
            url.host_str().unwrap_or(""),
            url.path(),
            url.query().unwrap_or("")
        )
        .to_lowercase(),
        Err(_) => link.to_lowercase(),
    }
}

fn haystack(title: Option<&str>, product_link: Option<&str>) -> String {
    format!(
        "{}\n{}",
        title.unwrap_or("").trim().to_lowercase(),
        link_hint(product_link)
    )
}

/// True when the listing looks like a carrier contract / plan bundle.
pub fn detect_is_contract(
    title: Option<&str>,
    product_link: Option<&str>,
    bundle: &PatternBundle,
) -> bool {
    let hay = haystack(title, product_link);
    bundle.contract.iter().any(|phrase| hay.contains(phrase))
}

/// Detects a condition hint from title and URL.
///
/// Priority is refurbished > used > new: an unclear second-hand listing
/// must never be promoted as new. Returns at most five matched phrases
/// for explainability.
pub fn detect_condition_hint(
    title: Option<&str>,
    product_link: Option<&str>,
    bundle: &PatternBundle,
) -> (Option<Condition>, Vec<String>) {
    let hay = haystack(title, product_link);
    for (condition, phrases) in [
        (Condition::Refurbished, &bundle.condition_refurbished),
        (Condition::Used, &bundle.condition_used),
        (Condition::New, &bundle.condition_new),
    ] {
        let matched: Vec<String> = phrases
            .iter()
            .filter(|phrase| hay.contains(phrase.as_str()))
            .take(5)
            .cloned()
            .collect();
        if !matched.is_empty() {
            return (Some(condition), matched);
        }
    }
    (None, Vec::new())
}
