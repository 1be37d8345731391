//! Trust scoring for promoted offers.
//!
//! A pure function: merchant-tier base score plus additive adjustments,
//! clamped to `[0, 100]`. Every score comes with stable reason codes so
//! the number stays explainable after the fact; the tier code is always
//! first.

use model::MerchantTier;

/// Everything that feeds one trust score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrustFactors {
    pub merchant_tier: MerchantTier,
    pub has_shipping_info: bool,
    pub has_warranty_info: bool,
    pub has_return_policy: bool,
    pub price_within_expected_range: bool,
    pub verified_stock: bool,
    pub has_physical_address: bool,
}

impl Default for TrustFactors {
    fn default() -> Self {
        Self {
            merchant_tier: MerchantTier::Unknown,
            has_shipping_info: true,
            has_warranty_info: true,
            has_return_policy: true,
            price_within_expected_range: true,
            verified_stock: false,
            has_physical_address: false,
        }
    }
}

fn tier_base_score(tier: MerchantTier) -> i32 {
    match tier {
        MerchantTier::Official => 95,
        MerchantTier::Verified => 85,
        MerchantTier::Marketplace => 60,
        MerchantTier::Unknown => 40,
    }
}

/// Computes the trust score and its reason codes.
pub fn score_with_reasons(factors: &TrustFactors) -> (i32, Vec<String>) {
    let mut score = tier_base_score(factors.merchant_tier);
    let mut reasons = vec![factors.merchant_tier.reason_code().to_string()];

    if !factors.has_shipping_info {
        score -= 10;
        reasons.push("MISSING_SHIPPING".to_string());
    }
    if !factors.has_warranty_info {
        score -= 10;
        reasons.push("MISSING_WARRANTY".to_string());
    }
    if !factors.has_return_policy {
        score -= 5;
        reasons.push("MISSING_RETURN_POLICY".to_string());
    }
    if !factors.price_within_expected_range {
        score -= 20;
        reasons.push("PRICE_ANOMALY".to_string());
    }
    if factors.verified_stock {
        score += 5;
        reasons.push("VERIFIED_STOCK".to_string());
    }
    if factors.has_physical_address {
        score += 5;
        reasons.push("HAS_PHYSICAL_ADDRESS".to_string());
    }

    let clamped = score.clamp(0, 100);
    if clamped != score {
        reasons.push("CLAMPED".to_string());
    }
    (clamped, reasons)
}

pub fn score(factors: &TrustFactors) -> i32 {
    score_with_reasons(factors).0
}

/// Whether a USD price sits outside the expected band (the caller
/// usually passes 70%..130% of the SKU's MSRP).
pub fn price_anomalous(price_usd: f64, expected_min: f64, expected_max: f64) -> bool {
    price_usd < expected_min || price_usd > expected_max
}

/// Tier lookup for merchants we know; everyone else is unknown.
pub fn merchant_tier(merchant_name: &str) -> MerchantTier {
    match merchant_name.trim().to_lowercase().as_str() {
        "apple store" | "apple" => MerchantTier::Official,
        "bic camera" | "yodobashi" | "mediamarkt" | "saturn" | "best buy" | "fortress hk"
        | "sharaf dg" => MerchantTier::Verified,
        "amazon" | "ebay" => MerchantTier::Marketplace,
        _ => MerchantTier::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_base_scores() {
        for (tier, expected) in [
            (MerchantTier::Official, 95),
            (MerchantTier::Verified, 85),
            (MerchantTier::Marketplace, 60),
            (MerchantTier::Unknown, 40),
        ] {
            let factors = TrustFactors {
                merchant_tier: tier,
                ..Default::default()
            };
            assert_eq!(score(&factors), expected);
        }
    }

    #[test]
    fn tier_reason_code_comes_first() {
        let (_, reasons) = score_with_reasons(&TrustFactors {
            merchant_tier: MerchantTier::Verified,
            has_shipping_info: false,
            ..Default::default()
        });
        assert_eq!(reasons[0], "TIER_VERIFIED");
        assert!(reasons.contains(&"MISSING_SHIPPING".to_string()));
        assert_eq!(
            reasons.iter().filter(|r| r.starts_with("TIER_")).count(),
            1
        );
    }

    #[test]
    fn adjustments_are_additive() {
        let (score, reasons) = score_with_reasons(&TrustFactors {
            merchant_tier: MerchantTier::Marketplace,
            has_shipping_info: false,
            has_warranty_info: false,
            has_return_policy: false,
            price_within_expected_range: false,
            verified_stock: true,
            has_physical_address: true,
        });
        // 60 - 10 - 10 - 5 - 20 + 5 + 5
        assert_eq!(score, 25);
        assert_eq!(reasons.len(), 7);
    }

    #[test]
    fn clamping_appends_a_reason() {
        let (score, reasons) = score_with_reasons(&TrustFactors {
            merchant_tier: MerchantTier::Unknown,
            has_shipping_info: false,
            has_warranty_info: false,
            has_return_policy: false,
            price_within_expected_range: false,
            ..Default::default()
        });
        // 40 - 10 - 10 - 5 - 20 = -5, clamped to 0.
        assert_eq!(score, 0);
        assert_eq!(reasons.last().unwrap(), "CLAMPED");

        let (score, reasons) = score_with_reasons(&TrustFactors {
            merchant_tier: MerchantTier::Official,
            verified_stock: true,
            has_physical_address: true,
            ..Default::default()
        });
        // 95 + 5 + 5 = 105, clamped to 100.
        assert_eq!(score, 100);
        assert_eq!(reasons.last().unwrap(), "CLAMPED");
    }

    #[test]
    fn known_merchant_tiers() {
        assert_eq!(merchant_tier("Apple"), MerchantTier::Official);
        assert_eq!(merchant_tier("  BIC CAMERA "), MerchantTier::Verified);
        assert_eq!(merchant_tier("amazon"), MerchantTier::Marketplace);
        assert_eq!(merchant_tier("Random Phone Shop"), MerchantTier::Unknown);
    }

    #[test]
    fn price_anomaly_band() {
        assert!(price_anomalous(500., 769.3, 1428.7));
        assert!(price_anomalous(1500., 769.3, 1428.7));
        assert!(!price_anomalous(1099., 769.3, 1428.7));
    }
}
