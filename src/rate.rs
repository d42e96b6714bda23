use tracing::debug;

use crate::models::{CellValue, NOT_STARTED};

/// Turns a success/progress cell into a percentage. Never fails: anything that
/// does not read as a number becomes 0.
pub fn parse_rate(value: &CellValue) -> f64 {
    match value {
        CellValue::Missing => 0.0,
        CellValue::Number(rate) if rate.is_nan() => 0.0,
        CellValue::Number(rate) => *rate,
        CellValue::Text(text) if text == NOT_STARTED => 0.0,
        CellValue::Text(text) => parse_rate_text(text),
        CellValue::Date(_) => {
            debug!(?value, "date in a rate column, treating as 0");
            0.0
        }
    }
}

fn parse_rate_text(text: &str) -> f64 {
    let trimmed = text.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();

    if number.is_empty() {
        return 0.0;
    }

    match number.parse::<f64>() {
        Ok(rate) if rate.is_finite() => rate,
        _ => {
            debug!(raw = text, "unparsable rate, treating as 0");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_strings_keep_their_value() {
        assert_eq!(parse_rate(&CellValue::text("90%")), 90.0);
        assert_eq!(parse_rate(&CellValue::text(" 42.5 % ")), 42.5);
        assert_eq!(parse_rate(&CellValue::text("0%")), 0.0);
        assert_eq!(parse_rate(&CellValue::text("75")), 75.0);
    }

    #[test]
    fn numbers_pass_through_unclamped() {
        assert_eq!(parse_rate(&CellValue::Number(66.6)), 66.6);
        assert_eq!(parse_rate(&CellValue::Number(120.0)), 120.0);
    }

    #[test]
    fn sentinels_and_blanks_become_zero() {
        assert_eq!(parse_rate(&CellValue::text("Not Started")), 0.0);
        assert_eq!(parse_rate(&CellValue::Missing), 0.0);
        assert_eq!(parse_rate(&CellValue::text("")), 0.0);
        assert_eq!(parse_rate(&CellValue::text("   ")), 0.0);
        assert_eq!(parse_rate(&CellValue::Number(f64::NAN)), 0.0);
    }

    #[test]
    fn garbage_becomes_zero() {
        assert_eq!(parse_rate(&CellValue::text("n/a")), 0.0);
        assert_eq!(parse_rate(&CellValue::text("%")), 0.0);
        assert_eq!(parse_rate(&CellValue::text("9 0%")), 0.0);
        assert_eq!(parse_rate(&CellValue::text("inf")), 0.0);
    }
}
