//! Property tests for scope enforcement, bearer parsing and cache keys

use std::collections::BTreeSet;

use proptest::prelude::*;
use tokenguard::{
    Claims, ErrorKind, GrantedIdentity, ScopeRequirement, ValidationSource, check_scopes,
    extract_bearer_token, token_key,
};

fn identity(scopes: &BTreeSet<String>) -> GrantedIdentity {
    GrantedIdentity {
        name: None,
        roles: Vec::new(),
        scopes: scopes.iter().cloned().collect(),
        claims: Claims::new(),
        authentication_type: "Bearer".to_string(),
        expires_at: None,
        source: ValidationSource::Remote,
    }
}

fn scope_set() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[a-z][a-z0-9:.]{0,7}", 0..6)
}

proptest! {
    #[test]
    fn test_allowed_iff_required_is_subset(granted in scope_set(), required in scope_set()) {
        let required: Vec<String> = required.into_iter().collect();
        let outcome = check_scopes(&identity(&granted), &required);
        let subset = required.iter().all(|s| granted.contains(s));

        prop_assert_eq!(outcome.is_ok(), subset);
        if let Err(e) = outcome {
            prop_assert_eq!(e.kind, ErrorKind::MissingScope);
        }
    }

    #[test]
    fn test_empty_requirement_always_allows(granted in scope_set()) {
        prop_assert!(ScopeRequirement::none().check(&identity(&granted)).is_ok());
    }

    #[test]
    fn test_granted_scopes_satisfy_themselves(granted in scope_set()) {
        let requirement = ScopeRequirement::new(granted.iter().cloned());
        prop_assert!(requirement.check(&identity(&granted)).is_ok());
        prop_assert_eq!(requirement.scopes().len(), granted.len());
    }

    #[test]
    fn test_bearer_token_round_trips(token in "[A-Za-z0-9._~+/=-]{1,64}") {
        let header = format!("Bearer {token}");
        prop_assert_eq!(extract_bearer_token(&header).ok(), Some(token.as_str()));
    }

    #[test]
    fn test_token_key_is_fixed_length_and_url_safe(token in ".{1,256}") {
        let key = token_key(&token);
        prop_assert_eq!(key.len(), 43);
        prop_assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        prop_assert_eq!(key, token_key(&token));
    }

    #[test]
    fn test_token_key_separates_tokens_sharing_a_prefix(token in "[a-z]{64}", tail in "[a-z]{1,8}") {
        prop_assert_ne!(token_key(&token), token_key(&format!("{token}{tail}")));
    }
}
