use once_cell::sync::Lazy;
use regex::Regex;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(-?\s*[\d,]+(?:[.]\d+)?)").expect("number regex"));

/// Finds the real column name for a logical one, ignoring case and surrounding whitespace.
pub fn actual_column_name<'a>(columns: &'a [String], target: &str) -> Option<&'a str> {
    let target = target.trim().to_lowercase();
    columns
        .iter()
        .find(|c| c.trim().to_lowercase() == target)
        .map(|c| c.as_str())
}

/// Normalizes a price cell: whole numbers lose their decimals, everything else is
/// rounded to two places. Blank, `NA`, `N/A` and values without a number become "".
pub fn format_price_value(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return String::new();
    }
    let upper = value.to_uppercase();
    if upper == "NA" || upper == "N/A" {
        return String::new();
    }

    let Some(m) = NUMBER_RE.find(value) else {
        return String::new();
    };
    let digits: String = m
        .as_str()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let Ok(num) = digits.parse::<f64>() else {
        return String::new();
    };
    if !num.is_finite() {
        return String::new();
    }
    if (num - num.round()).abs() < 1e-9 {
        format!("{}", num.round() as i64)
    } else {
        format!("{num:.2}")
    }
}

/// Collapses embedded line breaks so one value always occupies one payload line.
pub fn flatten_line_breaks(value: &str) -> String {
    value.replace(['\n', '\r'], " ")
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_lookup_ignores_case_and_padding() {
        let cols = vec!["SKU code".to_string(), "  Brand ".to_string(), "Now".to_string()];
        assert_eq!(actual_column_name(&cols, "brand"), Some("  Brand "));
        assert_eq!(actual_column_name(&cols, "sku CODE"), Some("SKU code"));
        assert_eq!(actual_column_name(&cols, "description"), None);
    }

    #[test]
    fn price_values_are_normalized() {
        assert_eq!(format_price_value("12.00"), "12");
        assert_eq!(format_price_value("£1,299.5"), "1299.50");
        assert_eq!(format_price_value("  7.333 "), "7.33");
        assert_eq!(format_price_value("N/A"), "");
        assert_eq!(format_price_value("na"), "");
        assert_eq!(format_price_value(""), "");
        assert_eq!(format_price_value("free"), "");
        assert_eq!(format_price_value("-5"), "-5");
    }

    #[test]
    fn line_breaks_become_spaces() {
        assert_eq!(flatten_line_breaks("a\nb\r\nc"), "a b  c");
    }
}
