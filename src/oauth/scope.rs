//! Scope-set rules shared by the registry, the ledgers, and the grant engine.

use std::collections::HashSet;

/// Parse a space-separated scope string into a set.
pub fn parse_scope(scope: &str) -> HashSet<String> {
    scope.split_whitespace().map(|s| s.to_string()).collect()
}

/// Join scopes into a sorted, space-separated string.
pub fn join_scopes(scopes: &HashSet<String>) -> String {
    let mut scopes: Vec<_> = scopes.iter().cloned().collect();
    scopes.sort();
    scopes.join(" ")
}

/// Every requested scope must appear in `allowed`; an empty request is always
/// a subset.
pub fn scope_subset(requested: &HashSet<String>, allowed: &HashSet<String>) -> bool {
    requested.is_subset(allowed)
}

/// Scope tokens may contain only alphanumerics and `_`, `-`, `:`.
pub fn validate_scope(scope: &str) -> bool {
    scope.split_whitespace().all(|s| {
        s.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_is_always_a_subset() {
        let allowed = parse_scope("read write");
        assert!(scope_subset(&HashSet::new(), &allowed));
        assert!(scope_subset(&HashSet::new(), &HashSet::new()));
    }

    #[test]
    fn subset_requires_every_token() {
        let allowed = parse_scope("read write profile");
        assert!(scope_subset(&parse_scope("read"), &allowed));
        assert!(scope_subset(&parse_scope("read profile"), &allowed));
        assert!(!scope_subset(&parse_scope("read admin"), &allowed));
        assert!(!scope_subset(&parse_scope("admin"), &HashSet::new()));
    }

    #[test]
    fn join_is_sorted_and_space_separated() {
        let scopes = parse_scope("write read api:read");
        assert_eq!(join_scopes(&scopes), "api:read read write");
        assert_eq!(join_scopes(&HashSet::new()), "");
    }

    #[test]
    fn scope_character_validation() {
        assert!(validate_scope("openid profile api:read offline_access"));
        assert!(!validate_scope("bad scope!"));
        assert!(!validate_scope("quo\"ted"));
    }
}
