use std::fmt;

/// Coins are whole units; there are no fractional coins.
pub type Coins = i64;

/// Fiat amounts paid for coin packages, in integer minor units (1.00 = 100).
pub type Cents = i64;

/// Format a coin amount with thousands separators.
/// Example: 1234567 -> "1,234,567", -1500 -> "-1,500"
pub fn format_coins(coins: Coins) -> String {
    let digits = coins.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if coins < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Format minor units as a decimal string.
/// Example: 5000 -> "50.00", -1234 -> "-12.34"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs_cents = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs_cents / 100, abs_cents % 100)
}

/// Parse a whole coin amount. Coins are indivisible, so "10.5" is rejected.
/// Thousands separators must sit in groups of three: "1,000" but not "1,00".
pub fn parse_coins(input: &str) -> Result<Coins, ParseAmountError> {
    let input = input.trim();
    if input.contains('.') {
        return Err(ParseAmountError::Fractional);
    }
    if input.contains(',') && !has_valid_grouping(input.trim_start_matches('-')) {
        return Err(ParseAmountError::InvalidFormat);
    }
    input
        .replace(',', "")
        .parse()
        .map_err(|_| ParseAmountError::InvalidFormat)
}

fn has_valid_grouping(digits: &str) -> bool {
    let mut groups = digits.split(',');
    let leading_ok = groups
        .next()
        .is_some_and(|g| (1..=3).contains(&g.len()) && g.bytes().all(|b| b.is_ascii_digit()));
    leading_ok && groups.all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit()))
}

/// Parse a decimal fiat string into minor units.
/// Example: "50.00" -> 5000, "12.5" -> 1250, "100" -> 10000
pub fn parse_cents(input: &str) -> Result<Cents, ParseAmountError> {
    let input = input.trim();
    let negative = input.starts_with('-');
    let input = input.trim_start_matches('-');

    let (units_str, decimal_str) = match input.split_once('.') {
        Some((units, decimals)) => (units, decimals),
        None => (input, ""),
    };
    if decimal_str.contains('.') {
        return Err(ParseAmountError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str
            .parse()
            .map_err(|_| ParseAmountError::InvalidFormat)?
    };

    // More than two decimals would silently lose money, so refuse them
    let decimal_cents: i64 = match decimal_str.len() {
        0 => 0,
        1 => {
            decimal_str
                .parse::<i64>()
                .map_err(|_| ParseAmountError::InvalidFormat)?
                * 10
        }
        2 => decimal_str
            .parse()
            .map_err(|_| ParseAmountError::InvalidFormat)?,
        _ => return Err(ParseAmountError::TooManyDecimals),
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(decimal_cents))
        .ok_or(ParseAmountError::InvalidFormat)?;
    Ok(if negative { -cents } else { cents })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    InvalidFormat,
    Fractional,
    TooManyDecimals,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::InvalidFormat => write!(f, "invalid amount format"),
            ParseAmountError::Fractional => write!(f, "coin amounts must be whole numbers"),
            ParseAmountError::TooManyDecimals => write!(f, "at most two decimal places allowed"),
        }
    }
}

impl std::error::Error for ParseAmountError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_coins() {
        assert_eq!(format_coins(0), "0");
        assert_eq!(format_coins(999), "999");
        assert_eq!(format_coins(1000), "1,000");
        assert_eq!(format_coins(1234567), "1,234,567");
        assert_eq!(format_coins(-1500), "-1,500");
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(5000), "50.00");
        assert_eq!(format_cents(1), "0.01");
        assert_eq!(format_cents(-1234), "-12.34");
    }

    #[test]
    fn test_parse_coins() {
        assert_eq!(parse_coins("500"), Ok(500));
        assert_eq!(parse_coins("1,000"), Ok(1000));
        assert_eq!(parse_coins("-30"), Ok(-30));
        assert_eq!(parse_coins("10.5"), Err(ParseAmountError::Fractional));
        assert_eq!(parse_coins("ten"), Err(ParseAmountError::InvalidFormat));
    }

    #[test]
    fn test_parse_coins_thousands_groups() {
        assert_eq!(parse_coins("1,234,567"), Ok(1_234_567));
        assert_eq!(parse_coins("-1,500"), Ok(-1500));
        assert_eq!(parse_coins("1,2,3"), Err(ParseAmountError::InvalidFormat));
        assert_eq!(parse_coins("12,34"), Err(ParseAmountError::InvalidFormat));
        assert_eq!(parse_coins("1234,567"), Err(ParseAmountError::InvalidFormat));
        assert_eq!(parse_coins(",100"), Err(ParseAmountError::InvalidFormat));
        assert_eq!(parse_coins("100,"), Err(ParseAmountError::InvalidFormat));
    }

    #[test]
    fn test_parse_cents() {
        assert_eq!(parse_cents("50.00"), Ok(5000));
        assert_eq!(parse_cents("50"), Ok(5000));
        assert_eq!(parse_cents("12.5"), Ok(1250));
        assert_eq!(parse_cents(".50"), Ok(50));
        assert_eq!(parse_cents("-1.25"), Ok(-125));
        assert_eq!(parse_cents("1.999"), Err(ParseAmountError::TooManyDecimals));
        assert!(parse_cents("12.34.56").is_err());
    }
}
