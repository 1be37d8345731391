/// Formats a local price for display, e.g. `¥159,800` or `€1,229.00`.
///
/// Zero-decimal currencies (JPY, KRW) render without cents; everything
/// else gets two decimals. Unknown currencies are prefixed with their
/// ISO code.
pub fn format_local_price(price: f64, currency: &str) -> String {
    let currency = currency.to_uppercase();
    let symbol = match currency.as_str() {
        "USD" => "$".to_string(),
        "EUR" => "€".to_string(),
        "GBP" => "£".to_string(),
        "JPY" => "¥".to_string(),
        "HKD" => "HK$".to_string(),
        "AED" => "AED ".to_string(),
        "SGD" => "S$".to_string(),
        "KRW" => "₩".to_string(),
        "AUD" => "A$".to_string(),
        _ => format!("{currency} "),
    };
    if matches!(currency.as_str(), "JPY" | "KRW") {
        format!("{symbol}{}", group_thousands(&format!("{:.0}", price)))
    } else {
        let formatted = format!("{:.2}", price);
        let (whole, cents) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));
        format!("{symbol}{}.{cents}", group_thousands(whole))
    }
}

/// Inserts `,` thousands separators into a plain digit string.
fn group_thousands(digits: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    format!("{sign}{out}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_two_decimal_currencies() {
        assert_eq!(format_local_price(1499.0, "USD"), "$1,499.00");
        assert_eq!(format_local_price(1229.5, "EUR"), "€1,229.50");
        assert_eq!(format_local_price(999.0, "GBP"), "£999.00");
    }

    #[test]
    fn formats_zero_decimal_currencies() {
        assert_eq!(format_local_price(159800.0, "JPY"), "¥159,800");
        assert_eq!(format_local_price(1_234_567.0, "KRW"), "₩1,234,567");
    }

    #[test]
    fn unknown_currency_uses_the_code() {
        assert_eq!(format_local_price(100.0, "chf"), "CHF 100.00");
    }
}
