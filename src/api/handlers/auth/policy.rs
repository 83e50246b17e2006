//! Password complexity policy.
//!
//! Every rule is checked and all violations are returned together, so a
//! client can fix a weak password in one round trip instead of five.

/// Symbols that satisfy the special-character rule.
const SPECIAL_CHARACTERS: &str = "!@#$%^&*()-_=+[]{}|;:'\",.<>?/~`";

const MIN_LENGTH: usize = 8;

/// Validate a candidate password against the complexity policy.
///
/// Returns the list of violated rules, empty when the password is acceptable.
#[must_use]
pub fn validate_password(password: &str) -> Vec<String> {
    let mut violations = Vec::new();

    if password.chars().count() < MIN_LENGTH {
        violations.push(format!(
            "Password must be at least {MIN_LENGTH} characters long"
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        violations.push("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        violations.push("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        violations.push("Password must contain at least one digit".to_string());
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        violations.push("Password must contain at least one special character".to_string());
    }

    violations
}
