//! The authentication boundary: extracting a bearer token from the upgrade
//! request and verifying it as an HS256 JWT before a session is ever
//! constructed. Nothing past [`authenticate`] ever sees a raw token again —
//! downstream code only holds the `UserId` this module hands back.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Verifies `token` as an HS256 JWT signed with `secret`, returning the
/// `sub` claim parsed as a [`UserId`].
pub fn authenticate(token: &str, secret: &str) -> Result<UserId, CoreError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &key, &validation)
        .map_err(|e| CoreError::InvalidMessageFormat(format!("token verification failed: {e}")))?;

    data.claims
        .sub
        .parse::<i64>()
        .map(UserId)
        .map_err(|_| CoreError::InvalidMessageFormat("token subject is not a user id".to_string()))
}

/// Extracts the bearer token from an upgrade request: the `token` query
/// parameter takes precedence over the `Authorization: Bearer ...` header,
/// since browser WebSocket clients cannot set custom headers.
pub fn extract_bearer_token(query: Option<&str>, authorization_header: Option<&str>) -> Option<String> {
    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some(value) = pair.strip_prefix("token=") {
                return Some(urlencoding_decode(value));
            }
        }
    }
    authorization_header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Minimal percent-decoding for the `token` query parameter; query strings
/// reaching this function have already been split on `&`/`=` by the caller.
fn urlencoding_decode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => {
                let hi = chars.next();
                let lo = chars.next();
                if let (Some(hi), Some(lo)) = (hi, lo) {
                    if let Ok(byte) = u8::from_str_radix(&format!("{hi}{lo}"), 16) {
                        out.push(byte as char);
                        continue;
                    }
                }
                out.push('%');
            }
            '+' => out.push(' '),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: usize,
    }

    fn token_for(sub: &str, secret: &str, expired: bool) -> String {
        let exp = if expired {
            0
        } else {
            (chrono::Utc::now().timestamp() + 3600) as usize
        };
        let claims = TestClaims {
            sub: sub.to_string(),
            exp,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_a_valid_token() {
        let token = token_for("42", "s3cr3t", false);
        let user = authenticate(&token, "s3cr3t").unwrap();
        assert_eq!(user, UserId(42));
    }

    #[test]
    fn rejects_a_token_signed_with_the_wrong_secret() {
        let token = token_for("42", "s3cr3t", false);
        assert!(authenticate(&token, "wrong").is_err());
    }

    #[test]
    fn rejects_an_expired_token() {
        let token = token_for("42", "s3cr3t", true);
        assert!(authenticate(&token, "s3cr3t").is_err());
    }

    #[test]
    fn query_token_takes_precedence_over_header() {
        let extracted = extract_bearer_token(
            Some("token=from-query"),
            Some("Bearer from-header"),
        );
        assert_eq!(extracted.as_deref(), Some("from-query"));
    }

    #[test]
    fn falls_back_to_header_when_no_query_token() {
        let extracted = extract_bearer_token(Some("other=1"), Some("Bearer from-header"));
        assert_eq!(extracted.as_deref(), Some("from-header"));
    }
}
