use jsonwebtoken::{DecodingKey, Validation, decode};

use comet_types::api::Claims;

/// Verify an identity-provider token and return the user id it carries.
pub fn verify_token(secret: &str, token: &str) -> Option<String> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()?;

    let sub = data.claims.sub;
    (!sub.is_empty()).then_some(sub)
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;

    fn token(secret: &str, sub: &str, exp_offset: i64) -> String {
        let exp = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
            + exp_offset) as usize;
        let claims = Claims {
            sub: sub.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        assert_eq!(verify_token("s3cret", &token("s3cret", "alice", 600)), Some("alice".into()));
    }

    #[test]
    fn rejects_wrong_secret_expired_and_empty_subject() {
        assert_eq!(verify_token("other", &token("s3cret", "alice", 600)), None);
        assert_eq!(verify_token("s3cret", &token("s3cret", "alice", -600)), None);
        assert_eq!(verify_token("s3cret", &token("s3cret", "", 600)), None);
        assert_eq!(verify_token("s3cret", "not-a-jwt"), None);
    }
}
