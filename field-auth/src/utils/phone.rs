//! Phone number and code format checks applied before any side effect.

const MIN_E164_DIGITS: usize = 8;
const MAX_E164_DIGITS: usize = 15;

/// Normalizes a user-entered number to E.164 (`+` followed by 8-15 digits).
///
/// Spaces, dashes, dots and parentheses are dropped. Anything else that is not
/// a digit, a missing leading `+`, or a leading zero country code is rejected.
pub fn normalize_phone_number(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix('+') else {
        return Err("Phone number must be in E.164 format, starting with '+'".to_string());
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return Err(format!("Phone number contains invalid character '{}'", c)),
        }
    }

    if digits.len() < MIN_E164_DIGITS || digits.len() > MAX_E164_DIGITS {
        return Err(format!(
            "Phone number must have between {} and {} digits",
            MIN_E164_DIGITS, MAX_E164_DIGITS
        ));
    }
    if digits.starts_with('0') {
        return Err("Country code cannot start with 0".to_string());
    }

    Ok(format!("+{}", digits))
}

/// A code must be exactly `length` ASCII digits.
pub fn validate_code_format(code: &str, length: usize) -> Result<(), String> {
    if code.len() != length || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("Verification code must be {} digits", length));
    }
    Ok(())
}

/// Keeps the country prefix and the last two digits, for logs.
pub fn mask_phone_number(phone_number: &str) -> String {
    let chars: Vec<char> = phone_number.chars().collect();
    if chars.len() <= 5 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 5), tail)
}
