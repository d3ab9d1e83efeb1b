// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::OnceLock;

use regex::Regex;

use super::response::FieldError;

pub const EMAIL_ADDRESS_FIELD: &str = "EmailAddress";
pub const EMAIL_ADDRESS_REQUIRED: &str = "Email Address cannot be empty.";

/// RFC 5322 address pattern, matched against the whole input.
const EMAIL_PATTERN: &str = r#"(?i)^(?:[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*|"(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21\x23-\x5b\x5d-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])*")@(?:(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?|\[(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?|[a-z0-9-]*[a-z0-9]:(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21-\x5a\x53-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])+)\])$"#;

pub fn is_valid_email(email_address: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX
        .get_or_init(|| Regex::new(EMAIL_PATTERN).expect("Failed to compile email regex"))
        .is_match(email_address)
}

/// Validate the `EmailAddress` field of a subscription command.
///
/// Only an empty value is missing. Whitespace is checked against the
/// pattern, and surrounding whitespace is ignored there.
pub fn validate_email_address(email_address: &str) -> Vec<FieldError> {
    if email_address.is_empty() {
        return vec![FieldError::required_field_missing(
            EMAIL_ADDRESS_FIELD,
            EMAIL_ADDRESS_REQUIRED,
        )];
    }
    if !is_valid_email(email_address.trim()) {
        return vec![FieldError::invalid_email_address(
            EMAIL_ADDRESS_FIELD,
            email_address,
        )];
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_addresses() {
        for email in [
            "reader@example.com",
            "Reader.Name+news@Mail.Example.CO.UK",
            "o'brien@example.ie",
            "user@[192.168.0.1]",
            "\"quoted.name\"@example.com",
        ] {
            assert!(is_valid_email(email), "{email} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for email in [
            "not-an-email",
            "a@b",
            "@example.com",
            "reader@",
            "reader@example.com trailing",
            "prefix reader@example.com",
            "two@@example.com",
        ] {
            assert!(!is_valid_email(email), "{email} should be invalid");
        }
    }

    #[test]
    fn empty_address_is_required_error() {
        let errors = validate_email_address("");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "EmailAddress");
        assert_eq!(errors[0].message, "Email Address cannot be empty.");
    }

    #[test]
    fn whitespace_address_is_invalid_not_missing() {
        let errors = validate_email_address("   ");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "EmailAddress");
        assert_eq!(errors[0].message, "    is not a valid email address");
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert!(validate_email_address("  reader@example.com ").is_empty());
    }

    #[test]
    fn invalid_address_names_the_input() {
        let errors = validate_email_address("nope");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "nope is not a valid email address");
    }
}
