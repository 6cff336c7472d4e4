use crate::statement::TabularStatement;
use serde::{Deserialize, Serialize};

/// How a statement writes negative amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NegativeStyle {
    /// `-1,234`
    #[default]
    Minus,
    /// `(1,234)`
    Parentheses,
}

impl NegativeStyle {
    /// Parentheses if any value cell of the statement uses them, minus otherwise.
    pub fn detect(statement: &TabularStatement) -> Self {
        let uses_parentheses = statement
            .rows
            .iter()
            .flat_map(|row| row.iter().skip(1))
            .any(|cell| is_parenthesized_amount(cell));

        if uses_parentheses {
            NegativeStyle::Parentheses
        } else {
            NegativeStyle::Minus
        }
    }
}

fn is_parenthesized_amount(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.len() > 2
        && trimmed.starts_with('(')
        && trimmed.ends_with(')')
        && trimmed[1..trimmed.len() - 1]
            .chars()
            .any(|c| c.is_ascii_digit())
}

/// Parses a report cell such as `1,234`, `-1,234`, `(1,234)` or `$12.5%`.
/// Blank and unparsable cells read as zero.
pub fn parse_amount(cell: &str) -> f64 {
    let mut cleaned: String = cell
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return 0.0;
    }

    let mut negative = false;
    if cleaned.contains('(') && cleaned.contains(')') {
        negative = true;
        cleaned.retain(|c| c != '(' && c != ')');
    }

    let value = match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => return 0.0,
    };

    if negative {
        -value.abs()
    } else {
        value
    }
}

/// Rounds half toward positive infinity, the way the report exports do.
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Formats a whole-unit amount with thousands separators.
pub fn format_amount(value: f64, style: NegativeStyle) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }

    let rounded = round_half_up(value);
    let negative = rounded < 0.0;
    let digits = group_thousands(&format!("{:.0}", rounded.abs()));

    match (negative, style) {
        (false, _) => digits,
        (true, NegativeStyle::Minus) => format!("-{}", digits),
        (true, NegativeStyle::Parentheses) => format!("({})", digits),
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Signed percentage with one decimal, e.g. `+12.5%`.
pub fn format_signed_percent(percent: f64) -> String {
    let sign = if percent > 0.0 { "+" } else { "" };
    format!("{}{:.1}%", sign, percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_variants() {
        assert_eq!(parse_amount("1,234"), 1234.0);
        assert_eq!(parse_amount("-1,234"), -1234.0);
        assert_eq!(parse_amount("(1,234)"), -1234.0);
        assert_eq!(parse_amount(" $2,000.50 "), 2000.5);
        assert_eq!(parse_amount("12.5%"), 12.5);
    }

    #[test]
    fn test_parse_amount_degrades_to_zero() {
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("-"), 0.0);
        assert_eq!(parse_amount("n/a"), 0.0);
        assert_eq!(parse_amount("NaN"), 0.0);
        assert_eq!(parse_amount("inf"), 0.0);
    }

    #[test]
    fn test_format_amount_minus_style() {
        assert_eq!(format_amount(0.0, NegativeStyle::Minus), "0");
        assert_eq!(format_amount(999.0, NegativeStyle::Minus), "999");
        assert_eq!(format_amount(1000.0, NegativeStyle::Minus), "1,000");
        assert_eq!(format_amount(1_234_567.4, NegativeStyle::Minus), "1,234,567");
        assert_eq!(format_amount(-46_715.0, NegativeStyle::Minus), "-46,715");
    }

    #[test]
    fn test_format_amount_parentheses_style() {
        assert_eq!(format_amount(-1234.0, NegativeStyle::Parentheses), "(1,234)");
        assert_eq!(format_amount(1234.0, NegativeStyle::Parentheses), "1,234");
    }

    #[test]
    fn test_rounding_half_up() {
        assert_eq!(format_amount(2.5, NegativeStyle::Minus), "3");
        assert_eq!(format_amount(-2.5, NegativeStyle::Minus), "-2");
        assert_eq!(format_amount(-0.4, NegativeStyle::Minus), "0");
    }

    #[test]
    fn test_detect_negative_style() {
        let minus = TabularStatement::from_str_rows(&["A", "B"], &[&["x", "-5"], &["(y)", "3"]]);
        assert_eq!(NegativeStyle::detect(&minus), NegativeStyle::Minus);

        let parens = TabularStatement::from_str_rows(&["A", "B"], &[&["x", "(5)"]]);
        assert_eq!(NegativeStyle::detect(&parens), NegativeStyle::Parentheses);
    }

    #[test]
    fn test_signed_percent() {
        assert_eq!(format_signed_percent(12.345), "+12.3%");
        assert_eq!(format_signed_percent(-4.0), "-4.0%");
        assert_eq!(format_signed_percent(0.0), "0.0%");
    }
}
