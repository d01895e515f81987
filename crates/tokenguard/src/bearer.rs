//! `Authorization: Bearer` header parsing

use crate::error::{AuthError, AuthResult};

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively and exactly one token must
/// follow it.
///
/// # Errors
///
/// Returns `MissingToken` if the value is not a single bearer token.
///
/// # Example
///
/// ```rust
/// use tokenguard::extract_bearer_token;
///
/// assert_eq!(extract_bearer_token("Bearer abc.def.ghi").unwrap(), "abc.def.ghi");
/// assert_eq!(extract_bearer_token("bearer opaque-token").unwrap(), "opaque-token");
/// assert!(extract_bearer_token("Basic dXNlcjpwYXNz").is_err());
/// ```
pub fn extract_bearer_token(header: &str) -> AuthResult<&str> {
    let mut parts = header.split_whitespace();

    match parts.next() {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer") => {}
        Some(_) => {
            return Err(AuthError::missing_token(
                "Authorization header does not use the Bearer scheme",
            ));
        }
        None => return Err(AuthError::missing_token("Authorization header is empty")),
    }

    match (parts.next(), parts.next()) {
        (Some(token), None) => Ok(token),
        (None, _) => Err(AuthError::missing_token("Bearer scheme without a token")),
        (Some(_), Some(_)) => Err(AuthError::missing_token(
            "Authorization header carries more than one token",
        )),
    }
}

/// Extract the bearer token from request headers
///
/// # Errors
///
/// Returns `MissingToken` if there is no `Authorization` header, it is not
/// valid UTF-8, or it does not carry exactly one bearer token.
pub fn bearer_token_from_headers(headers: &http::HeaderMap) -> AuthResult<&str> {
    let value = headers
        .get(http::header::AUTHORIZATION)
        .ok_or_else(|| AuthError::missing_token("no Authorization header"))?;

    let value = value
        .to_str()
        .map_err(|_| AuthError::missing_token("Authorization header is not valid text"))?;

    extract_bearer_token(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_scheme_case_insensitive() {
        for header in ["Bearer tok", "bearer tok", "BEARER tok", "  Bearer   tok  "] {
            assert_eq!(extract_bearer_token(header).unwrap(), "tok", "{header}");
        }
    }

    #[test]
    fn test_rejects_other_shapes() {
        for header in ["", "Bearer", "Bearer a b", "Basic dXNlcg==", "Token abc"] {
            let err = extract_bearer_token(header).unwrap_err();
            assert_eq!(err.kind, ErrorKind::MissingToken, "{header}");
        }
    }

    #[test]
    fn test_from_headers() {
        let mut headers = http::HeaderMap::new();
        assert!(bearer_token_from_headers(&headers).is_err());

        headers.insert(
            http::header::AUTHORIZATION,
            http::HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token_from_headers(&headers).unwrap(), "abc.def.ghi");
    }
}
