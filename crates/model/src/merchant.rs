use strum::{AsRefStr, Display, EnumString};

/// Trust tier of a merchant. Drives the base trust score of every offer
/// promoted for that merchant.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    serde::Deserialize,
    serde::Serialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MerchantTier {
    /// First-party stores (Apple, carrier stores).
    Official,
    /// Known large retailers.
    Verified,
    /// Marketplace sellers (Amazon, eBay).
    Marketplace,
    /// Everyone we have no signal on.
    #[default]
    Unknown,
}

impl MerchantTier {
    /// The stable reason code emitted as the first entry of every trust
    /// score explanation, e.g. `TIER_VERIFIED`.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Official => "TIER_OFFICIAL",
            Self::Verified => "TIER_VERIFIED",
            Self::Marketplace => "TIER_MARKETPLACE",
            Self::Unknown => "TIER_UNKNOWN",
        }
    }
}

/// Normalizes a merchant name the way the `merchants` table keys it.
pub fn normalize_merchant_name(name: &str) -> String {
    name.trim().to_lowercase()
}
