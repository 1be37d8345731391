/// The `flags_json` side-car on a raw offer: classification flags the
/// pipeline derived from the listing text.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize,
)]
pub struct ListingFlags {
    pub is_multi_variant: bool,
    pub is_contract: bool,
}

impl ListingFlags {
    pub fn from_json(stored: Option<&str>) -> Self {
        stored
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("flags serialize")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let flags = ListingFlags {
            is_multi_variant: true,
            is_contract: false,
        };
        assert_eq!(ListingFlags::from_json(Some(&flags.to_json())), flags);
        assert_eq!(ListingFlags::from_json(None), ListingFlags::default());
        assert_eq!(ListingFlags::from_json(Some("broken")), ListingFlags::default());
    }
}
