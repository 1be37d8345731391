/// Human readable country name for an ISO-3166 alpha-2 code.
///
/// Unknown codes fall back to the (uppercased) code itself so the offer
/// row is still presentable.
pub fn display_name(country_code: &str) -> String {
    let code = country_code.to_uppercase();
    match code.as_str() {
        "JP" => "Japan",
        "US" => "United States",
        "HK" => "Hong Kong",
        "AE" => "United Arab Emirates",
        "DE" => "Germany",
        "GB" => "United Kingdom",
        "FR" => "France",
        "SG" => "Singapore",
        "KR" => "South Korea",
        "AU" => "Australia",
        "CA" => "Canada",
        _ => return code,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_countries() {
        assert_eq!(display_name("jp"), "Japan");
        assert_eq!(display_name("DE"), "Germany");
    }

    #[test]
    fn falls_back_to_the_code() {
        assert_eq!(display_name("xx"), "XX");
    }
}
