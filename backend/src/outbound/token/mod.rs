//! HS256 JSON Web Token credentials.
//!
//! Bearer tokens and verification-link strings are both JWTs signed with
//! the configured secret; a `purpose` claim keeps one from being accepted
//! as the other. Expiry is checked against the injected clock.

use std::sync::Arc;

use chrono::TimeDelta;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::domain::Identifier;
use crate::domain::ports::{CredentialError, CredentialService, TokenClaims, VerificationTicket};

/// Lifetime of verification links.
const VERIFICATION_TTL_HOURS: i64 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Purpose {
    Session,
    Verify,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    obo: Option<Identifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    purpose: Purpose,
    iat: i64,
    exp: i64,
}

/// [`CredentialService`] issuing HS256 tokens.
pub struct JwtCredentialService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl JwtCredentialService {
    pub fn new(secret: &Zeroizing<String>, ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            clock,
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, CredentialError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|err| CredentialError::signing(err.to_string()))
    }

    fn read(&self, token: &str, purpose: Purpose) -> Result<Claims, CredentialError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|err| {
                debug!(error = %err, "credential rejected");
                CredentialError::invalid(err.to_string())
            })?
            .claims;
        if claims.purpose != purpose {
            return Err(CredentialError::invalid("token issued for another purpose"));
        }
        if claims.exp <= self.clock.utc().timestamp() {
            return Err(CredentialError::invalid("token expired"));
        }
        if claims.sub.is_sentinel() {
            return Err(CredentialError::invalid("token names no account"));
        }
        Ok(claims)
    }

    fn claims(&self, user_id: Identifier, purpose: Purpose, ttl: TimeDelta) -> Claims {
        let now = self.clock.utc();
        Claims {
            sub: user_id,
            obo: None,
            code: None,
            purpose,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }
}

impl CredentialService for JwtCredentialService {
    fn issue(&self, claims: &TokenClaims) -> Result<String, CredentialError> {
        let mut token = self.claims(claims.user_id, Purpose::Session, self.ttl);
        token.obo = claims.acting_as;
        self.sign(&token)
    }

    fn validate(&self, token: &str) -> Result<TokenClaims, CredentialError> {
        let claims = self.read(token, Purpose::Session)?;
        Ok(TokenClaims {
            user_id: claims.sub,
            acting_as: claims.obo.filter(|id| !id.is_sentinel()),
        })
    }

    fn issue_verification(&self, ticket: &VerificationTicket) -> Result<String, CredentialError> {
        let mut token = self.claims(
            ticket.user_id,
            Purpose::Verify,
            TimeDelta::hours(VERIFICATION_TTL_HOURS),
        );
        token.code = Some(ticket.code.clone());
        self.sign(&token)
    }

    fn parse_verification(&self, token: &str) -> Result<VerificationTicket, CredentialError> {
        let claims = self.read(token, Purpose::Verify)?;
        let code = claims
            .code
            .ok_or_else(|| CredentialError::invalid("verification token carries no code"))?;
        Ok(VerificationTicket {
            user_id: claims.sub,
            code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MutableClock;
    use chrono::Utc;
    use rstest::{fixture, rstest};

    struct Fixture {
        service: JwtCredentialService,
        clock: Arc<MutableClock>,
    }

    #[fixture]
    fn fixture() -> Fixture {
        let clock = Arc::new(MutableClock::new(Utc::now()));
        let service = JwtCredentialService::new(
            &Zeroizing::new("test-secret".to_owned()),
            TimeDelta::hours(24),
            clock.clone(),
        );
        Fixture { service, clock }
    }

    #[rstest]
    fn bearer_tokens_carry_the_impersonated_account(fixture: Fixture) {
        let claims = TokenClaims {
            user_id: Identifier::generate(),
            acting_as: Some(Identifier::generate()),
        };
        let token = fixture.service.issue(&claims).expect("signed");
        assert_eq!(fixture.service.validate(&token), Ok(claims));
    }

    #[rstest]
    fn bearer_tokens_expire(fixture: Fixture) {
        let token = fixture
            .service
            .issue(&TokenClaims::for_user(Identifier::generate()))
            .expect("signed");
        fixture.clock.advance(TimeDelta::hours(25));
        assert!(matches!(
            fixture.service.validate(&token),
            Err(CredentialError::Invalid { .. })
        ));
    }

    #[rstest]
    fn tokens_signed_with_another_secret_are_rejected(fixture: Fixture) {
        let other = JwtCredentialService::new(
            &Zeroizing::new("other-secret".to_owned()),
            TimeDelta::hours(24),
            fixture.clock.clone(),
        );
        let token = other
            .issue(&TokenClaims::for_user(Identifier::generate()))
            .expect("signed");
        assert!(fixture.service.validate(&token).is_err());
    }

    #[rstest]
    fn verification_strings_are_not_bearer_tokens(fixture: Fixture) {
        let ticket = VerificationTicket {
            user_id: Identifier::generate(),
            code: "123456".to_owned(),
        };
        let token = fixture
            .service
            .issue_verification(&ticket)
            .expect("signed");
        assert_eq!(fixture.service.parse_verification(&token), Ok(ticket));
        assert!(fixture.service.validate(&token).is_err());

        let bearer = fixture
            .service
            .issue(&TokenClaims::for_user(Identifier::generate()))
            .expect("signed");
        assert!(fixture.service.parse_verification(&bearer).is_err());
    }
}
