//! Destination address normalization.

use crate::error::SendError;

/// Suffix of a personal chat address.
pub const USER_SUFFIX: &str = "@c.us";
/// Suffix of a group chat address.
pub const GROUP_SUFFIX: &str = "@g.us";

const MIN_NATIONAL_DIGITS: usize = 6;
const MAX_NATIONAL_DIGITS: usize = 15;

/// Turn a user-supplied phone number into a canonical chat address.
///
/// `0812-3456-7890` with country code `62` becomes `6281234567890@c.us`.
/// Group ids (`...@g.us`) are kept as they are. Applying this to its own
/// output yields the same address.
pub fn normalize_address(raw: &str, country_code: &str) -> Result<String, SendError> {
    let trimmed = raw.trim();

    if let Some(group) = trimmed.strip_suffix(GROUP_SUFFIX) {
        let id: String = group
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-')
            .collect();
        if !id.chars().any(|c| c.is_ascii_digit()) {
            return Err(SendError::invalid_address(raw));
        }
        return Ok(format!("{id}{GROUP_SUFFIX}"));
    }

    let body = trimmed.strip_suffix(USER_SUFFIX).unwrap_or(trimmed);
    let digits: String = body.chars().filter(char::is_ascii_digit).collect();
    let country_code: String = country_code.chars().filter(char::is_ascii_digit).collect();

    let national = match digits.strip_prefix('0') {
        Some(rest) => rest,
        None => digits.strip_prefix(country_code.as_str()).unwrap_or(&digits),
    };

    if !(MIN_NATIONAL_DIGITS..=MAX_NATIONAL_DIGITS).contains(&national.len()) {
        return Err(SendError::invalid_address(raw));
    }

    Ok(format!("{country_code}{national}{USER_SUFFIX}"))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("081234567890", "6281234567890@c.us")]
    #[case("0812-3456-7890", "6281234567890@c.us")]
    #[case("+62 812 3456 7890", "6281234567890@c.us")]
    #[case("6281234567890", "6281234567890@c.us")]
    #[case("6281234567890@c.us", "6281234567890@c.us")]
    #[case("81234567890", "6281234567890@c.us")]
    #[case("120363025246125@g.us", "120363025246125@g.us")]
    #[case("6281234567890-1612345678@g.us", "6281234567890-1612345678@g.us")]
    fn normalizes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_address(raw, "62").unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("abc")]
    #[case("0123")]
    #[case("62")]
    #[case("01234567890123456789")]
    #[case("@g.us")]
    fn rejects(#[case] raw: &str) {
        assert!(matches!(
            normalize_address(raw, "62"),
            Err(SendError::InvalidAddress(_))
        ));
    }

    #[rstest]
    #[case("0812345678")]
    #[case("08123456789012")]
    #[case("6281234567890")]
    #[case("123456789012345")]
    #[case("9876543210")]
    fn valid_numbers_start_with_country_code_and_are_stable(#[case] raw: &str) {
        let once = normalize_address(raw, "62").unwrap();
        assert!(once.starts_with("62"));
        assert!(once.ends_with(USER_SUFFIX));
        assert_eq!(normalize_address(&once, "62").unwrap(), once);
    }

    #[test]
    fn uses_configured_country_code() {
        assert_eq!(
            normalize_address("07911 123456", "+44").unwrap(),
            "447911123456@c.us"
        );
    }
}
