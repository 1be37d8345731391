//! Currency resolution for provider shopping rows.
//!
//! The stored price is the provider's primary extracted numeric price,
//! so the currency has to follow that same field. The
//! `alternative_price` block may be denominated differently and is
//! therefore only consulted as a last resort.

/// Resolution order, first non-empty wins:
/// 1. the item's `currency` field (symbol or ISO code),
/// 2. the leading symbol of the `price` display string,
/// 3. the country the query ran in (`gl`),
/// 4. `alternative_price.currency`,
/// 5. `USD`.
pub fn resolve(
    currency_field: Option<&str>,
    price_field: Option<&str>,
    alternative_currency: Option<&str>,
    gl: &str,
) -> String {
    if let Some(code) = currency_field.and_then(|value| normalize_symbol(value, gl)) {
        return code;
    }
    if let Some(code) = price_field.and_then(|value| from_price_string(value, gl)) {
        return code;
    }
    if let Some(code) = from_gl(gl) {
        return code.to_string();
    }
    if let Some(code) = alternative_currency.and_then(|value| normalize_symbol(value, gl)) {
        return code;
    }
    "USD".to_string()
}

/// Normalizes a currency symbol or code to ISO 4217. `¥` defaults to
/// JPY but yields CNY when the query ran against China.
pub fn normalize_symbol(symbol: &str, gl: &str) -> Option<String> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return None;
    }
    let mapped = match symbol {
        "₪" => "ILS",
        "US$" | "$" => "USD",
        "£" => "GBP",
        "€" => "EUR",
        "¥" if gl.eq_ignore_ascii_case("cn") => "CNY",
        "¥" => "JPY",
        "₩" => "KRW",
        "HK$" => "HKD",
        "S$" => "SGD",
        "A$" => "AUD",
        "C$" => "CAD",
        "NZ$" => "NZD",
        "₹" => "INR",
        "R$" => "BRL",
        "₽" => "RUB",
        "₨" => "PKR",
        "₦" => "NGN",
        "₫" => "VND",
        "₱" => "PHP",
        _ => {
            if symbol.len() >= 3 && symbol.chars().all(|c| c.is_ascii_alphabetic()) {
                return Some(symbol.to_uppercase());
            }
            return None;
        }
    };
    Some(mapped.to_string())
}

/// Extracts the currency from a display price like `¥159,800` or
/// `US$1,099`. Multi-character symbols are tested first so `HK$` does
/// not read as USD.
pub fn from_price_string(price: &str, gl: &str) -> Option<String> {
    const MULTI_CHAR: &[(&str, &str)] = &[
        ("US$", "USD"),
        ("HK$", "HKD"),
        ("S$", "SGD"),
        ("A$", "AUD"),
        ("C$", "CAD"),
        ("NZ$", "NZD"),
        ("R$", "BRL"),
        ("AED", "AED"),
        ("SAR", "SAR"),
        ("QAR", "QAR"),
        ("KWD", "KWD"),
        ("BHD", "BHD"),
        ("OMR", "OMR"),
        ("JOD", "JOD"),
    ];
    let price = price.trim();
    if price.is_empty() {
        return None;
    }
    for (symbol, code) in MULTI_CHAR {
        if price.starts_with(symbol) {
            return Some(code.to_string());
        }
    }
    let first = price.chars().next()?;
    let code = match first {
        '₪' => "ILS",
        '¥' if gl.eq_ignore_ascii_case("cn") => "CNY",
        '¥' => "JPY",
        '$' => "USD",
        '€' => "EUR",
        '£' => "GBP",
        '₩' => "KRW",
        '₹' => "INR",
        '₽' => "RUB",
        '₨' => "PKR",
        '₦' => "NGN",
        '₫' => "VND",
        '₱' => "PHP",
        _ => return None,
    };
    Some(code.to_string())
}

/// Default currency of the country a query ran against.
pub fn from_gl(gl: &str) -> Option<&'static str> {
    let code = match gl.to_lowercase().as_str() {
        "jp" => "JPY",
        "us" => "USD",
        "uk" | "gb" => "GBP",
        "de" | "fr" | "it" | "es" | "nl" | "be" | "at" | "ie" | "pt" | "gr" | "fi" => "EUR",
        "dk" => "DKK",
        "se" => "SEK",
        "no" => "NOK",
        "pl" => "PLN",
        "cz" => "CZK",
        "hu" => "HUF",
        "hk" => "HKD",
        "ae" => "AED",
        "sg" => "SGD",
        "kr" => "KRW",
        "au" => "AUD",
        "ca" => "CAD",
        "nz" => "NZD",
        "mx" => "MXN",
        "br" => "BRL",
        "in" => "INR",
        "cn" => "CNY",
        "il" => "ILS",
        "sa" => "SAR",
        "qa" => "QAR",
        "kw" => "KWD",
        "bh" => "BHD",
        "om" => "OMR",
        "jo" => "JOD",
        "tr" => "TRY",
        "ru" => "RUB",
        "za" => "ZAR",
        "eg" => "EGP",
        "th" => "THB",
        "my" => "MYR",
        "id" => "IDR",
        "ph" => "PHP",
        "vn" => "VND",
        "pk" => "PKR",
        "bd" => "BDT",
        "ng" => "NGN",
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_field_wins() {
        assert_eq!(resolve(Some("₪"), Some("$100"), None, "us"), "ILS");
        assert_eq!(resolve(Some("eur"), None, None, "us"), "EUR");
        assert_eq!(resolve(Some("US$"), None, None, "jp"), "USD");
    }

    #[test]
    fn price_string_symbol_is_second() {
        assert_eq!(resolve(None, Some("¥159,800"), None, "jp"), "JPY");
        assert_eq!(resolve(None, Some("HK$8,599"), None, "hk"), "HKD");
        assert_eq!(resolve(None, Some("€1,229"), None, "de"), "EUR");
        assert_eq!(resolve(None, Some("£999"), None, "uk"), "GBP");
        assert_eq!(resolve(None, Some("₪14451.71"), None, "il"), "ILS");
    }

    #[test]
    fn yen_defaults_to_jpy_but_cn_overrides() {
        assert_eq!(resolve(None, Some("¥7,999"), None, "cn"), "CNY");
        assert_eq!(resolve(Some("¥"), None, None, "cn"), "CNY");
        assert_eq!(resolve(Some("¥"), None, None, "jp"), "JPY");
    }

    #[test]
    fn gl_inference_is_third() {
        assert_eq!(resolve(None, Some("1234"), None, "jp"), "JPY");
        assert_eq!(resolve(None, None, None, "de"), "EUR");
        assert_eq!(resolve(None, None, None, "ae"), "AED");
    }

    #[test]
    fn alternative_price_is_last_resort_only() {
        // The primary price carries its own symbol; the alternative
        // currency must not override it even when present.
        assert_eq!(resolve(None, Some("¥159,800"), Some("USD"), "jp"), "JPY");
        // Only with nothing else available does the alternative win.
        assert_eq!(resolve(None, None, Some("GBP"), "xx"), "GBP");
    }

    #[test]
    fn falls_back_to_usd() {
        assert_eq!(resolve(None, None, None, "xx"), "USD");
        assert_eq!(resolve(Some("??"), Some("123"), None, "zz"), "USD");
    }
}
