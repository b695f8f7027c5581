//! # User Directory
//!
//! Static lookup from identity string (email) to display name, with a
//! domain-level fallback for known partner domains. Purely passive; the
//! resolved name is substituted into the interview system prompt.

/// Known users, keyed by lower-cased email.
const USERS: &[(&str, &str)] = &[
    ("engineering@example.com", "David Rodriguez"),
    ("marketing@example.com", "Jennifer Smith"),
    ("sales@example.com", "Christopher Lee"),
    ("hr@example.com", "Emily Davis"),
    ("developer1@example.com", "Alex Thompson"),
    ("developer2@example.com", "Jessica Martinez"),
    ("designer@example.com", "Ryan Wilson"),
    ("analyst@example.com", "Olivia Taylor"),
];

/// Fallback display names for whole domains.
const DOMAIN_MAPPING: &[(&str, &str)] = &[
    ("partner.example.com", "Partner Representative"),
    ("client.example.com", "Client Contact"),
    ("vendor.example.com", "Vendor Representative"),
];

/// Resolve a display name for an email address.
///
/// Exact matches win; otherwise the domain mapping is consulted.
/// Unknown identities resolve to `None` and callers fall back to the
/// default system prompt.
pub fn get_user_by_email(email: &str) -> Option<&'static str> {
    let normalized = email.trim().to_lowercase();

    if let Some((_, name)) = USERS.iter().find(|(known, _)| *known == normalized) {
        return Some(*name);
    }

    let domain = normalized.split('@').nth(1)?;
    DOMAIN_MAPPING
        .iter()
        .find(|(known, _)| *known == domain)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_user_lookup() {
        assert_eq!(
            get_user_by_email("engineering@example.com"),
            Some("David Rodriguez")
        );
    }

    #[test]
    fn test_lookup_normalizes_case_and_whitespace() {
        assert_eq!(
            get_user_by_email("  Engineering@Example.COM "),
            Some("David Rodriguez")
        );
    }

    #[test]
    fn test_domain_fallback() {
        assert_eq!(
            get_user_by_email("somebody@partner.example.com"),
            Some("Partner Representative")
        );
    }

    #[test]
    fn test_unknown_user() {
        assert_eq!(get_user_by_email("nobody@unknown.org"), None);
        assert_eq!(get_user_by_email("not-an-email"), None);
    }
}
