//! Phone number normalisation for caller lookup and representative dialing.
//!
//! Accepts digits with an optional leading `+`. Common human formatting
//! (spaces, dashes, dots and parentheses) is stripped before validation since
//! both the telephony provider and the business-data store hand us numbers in
//! whatever shape they were entered.

/// Characters removed before validation.
const FORMATTING_CHARS: [char; 5] = [' ', '-', '.', '(', ')'];

/// Number of trailing digits compared when two numbers differ only in
/// country-code prefix.
const NATIONAL_DIGITS: usize = 10;

/// Normalises and validates a phone number.
///
/// # Validation Rules
///
/// - Must not be empty after trimming and removing formatting characters
/// - Must contain only digits (`0-9`), with an optional `+` prefix
/// - If `+` is present, it must be at the very beginning
///
/// # Returns
///
/// - `Ok(String)` - The number as digits with its optional leading `+`
/// - `Err(String)` - A human-readable error message
///
/// # Examples
///
/// ```
/// use callbridge::utils::phone_validation::validate_phone_number;
///
/// assert_eq!(validate_phone_number("+1 (555) 123-0000").unwrap(), "+15551230000");
/// assert!(validate_phone_number("123abc").is_err());
/// ```
pub fn validate_phone_number(phone: &str) -> Result<String, String> {
    let cleaned: String = phone
        .trim()
        .chars()
        .filter(|c| !FORMATTING_CHARS.contains(c))
        .collect();

    if cleaned.is_empty() {
        return Err("Phone number cannot be empty".to_string());
    }

    let (has_plus, digits_part) = match cleaned.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    if has_plus && digits_part.is_empty() {
        return Err("Phone number must contain at least one digit".to_string());
    }

    for (i, ch) in digits_part.chars().enumerate() {
        let position = i + usize::from(has_plus);
        if ch == '+' {
            return Err(format!(
                "Invalid character '+' at position {position} - plus sign is only allowed at the beginning"
            ));
        }
        if !ch.is_ascii_digit() {
            return Err(format!(
                "Invalid character '{ch}' at position {position} - only digits (0-9) and optional leading '+' are allowed"
            ));
        }
    }

    Ok(cleaned)
}

/// Whether two numbers refer to the same line.
///
/// Numbers are equal when their digits match, or when both carry at least ten
/// digits and agree on the last ten (`+15551230000` vs `5551230000`).
/// Invalid numbers never match.
pub fn phones_match(a: &str, b: &str) -> bool {
    let (Ok(a), Ok(b)) = (validate_phone_number(a), validate_phone_number(b)) else {
        return false;
    };
    let a = a.trim_start_matches('+');
    let b = b.trim_start_matches('+');
    if a == b {
        return true;
    }
    a.len() >= NATIONAL_DIGITS
        && b.len() >= NATIONAL_DIGITS
        && a[a.len() - NATIONAL_DIGITS..] == b[b.len() - NATIONAL_DIGITS..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_international_numbers() {
        assert_eq!(validate_phone_number("+1").unwrap(), "+1");
        assert_eq!(validate_phone_number("+1234567890").unwrap(), "+1234567890");
        assert_eq!(
            validate_phone_number("+447123456789").unwrap(),
            "+447123456789"
        );
    }

    #[test]
    fn test_formatting_is_stripped() {
        assert_eq!(
            validate_phone_number("+1 (555) 123-0000").unwrap(),
            "+15551230000"
        );
        assert_eq!(validate_phone_number("555.123.0000").unwrap(), "5551230000");
        assert_eq!(validate_phone_number("  0  ").unwrap(), "0");
    }

    #[test]
    fn test_invalid_empty() {
        assert_eq!(
            validate_phone_number("").unwrap_err(),
            "Phone number cannot be empty"
        );
        assert_eq!(
            validate_phone_number(" - ").unwrap_err(),
            "Phone number cannot be empty"
        );
    }

    #[test]
    fn test_invalid_plus_only() {
        assert_eq!(
            validate_phone_number("+").unwrap_err(),
            "Phone number must contain at least one digit"
        );
    }

    #[test]
    fn test_invalid_plus_not_at_beginning() {
        assert!(
            validate_phone_number("1+234")
                .unwrap_err()
                .contains("plus sign is only allowed at the beginning")
        );
    }

    #[test]
    fn test_invalid_contains_letters() {
        assert!(
            validate_phone_number("+123abc")
                .unwrap_err()
                .contains("Invalid character 'a'")
        );
        assert!(
            validate_phone_number("sip:alice")
                .unwrap_err()
                .contains("Invalid character 's'")
        );
    }

    #[test]
    fn test_phones_match_across_country_prefix() {
        assert!(phones_match("+15551230000", "5551230000"));
        assert!(phones_match("+1 555 123 0000", "(555) 123-0000"));
        assert!(!phones_match("+15551230000", "+15551230001"));
    }

    #[test]
    fn test_short_numbers_need_exact_match() {
        assert!(phones_match("1234", "1234"));
        assert!(!phones_match("1234", "01234"));
        assert!(!phones_match("abc", "abc"));
    }
}
