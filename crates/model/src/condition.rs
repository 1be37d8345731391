use strum::{AsRefStr, Display, EnumString};

/// Product condition of a listing or a Golden SKU.
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
pub enum Condition {
    #[default]
    New,
    Used,
    Refurbished,
}

impl Condition {
    /// Normalizes the provider's free-text `second_hand_condition` field.
    ///
    /// Unknown non-empty values map to [`Condition::New`]. This mirrors how
    /// listings without any second-hand marker are promoted and keeps the
    /// promoted set from silently shrinking when the provider invents a new
    /// label. Do not change without an explicit policy decision.
    pub fn from_second_hand(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::New;
        };
        match value.trim().to_lowercase().as_str() {
            "refurbished" | "refurb" | "renewed" | "certified pre-owned" | "cpo" => {
                Self::Refurbished
            }
            "used" | "pre-owned" | "second hand" | "secondhand" | "pre owned" => Self::Used,
            _ => Self::New,
        }
    }
}
