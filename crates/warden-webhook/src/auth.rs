//! Constant-time bearer auth (§4.K: "401 when header missing / token
//! mismatch (constant-time compare)"). The teacher's own
//! `verify_bearer_token` uses a plain `==`, which leaks comparison time;
//! `subtle` closes that for the secret bytes that actually matter.

use subtle::ConstantTimeEq;

/// `header_value` is the raw `Authorization` header, expected as
/// `Bearer <token>`. Returns `false` for a missing header, wrong scheme,
/// length mismatch, or a token that doesn't match — all in one place so
/// callers can't accidentally short-circuit on a non-constant-time path.
pub fn verify_bearer(header_value: Option<&str>, secret: &str) -> bool {
    let Some(token) = header_value.and_then(|h| h.strip_prefix("Bearer ")) else {
        return false;
    };
    if token.len() != secret.len() {
        return false;
    }
    token.as_bytes().ct_eq(secret.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_token_is_accepted() {
        assert!(verify_bearer(Some("Bearer my-secret"), "my-secret"));
    }

    #[test]
    fn wrong_token_is_rejected() {
        assert!(!verify_bearer(Some("Bearer wrong"), "my-secret"));
    }

    #[test]
    fn missing_header_is_rejected() {
        assert!(!verify_bearer(None, "my-secret"));
    }

    #[test]
    fn missing_bearer_scheme_is_rejected() {
        assert!(!verify_bearer(Some("my-secret"), "my-secret"));
    }

    #[test]
    fn different_length_token_is_rejected() {
        assert!(!verify_bearer(Some("Bearer short"), "a-much-longer-secret"));
    }
}
