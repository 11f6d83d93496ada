use crate::model::{Id, user::UserMarker};
use argon2::{Argon2, Params};
use base64::{DecodeError, Engine, display::Base64Display, prelude::BASE64_STANDARD};
use std::{
    fmt::{Debug, Formatter},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub const AUTH_TOKEN_CORE_LEN: usize = 24;
pub const AUTH_TOKEN_SALT_LEN: usize = 18;
pub const AUTH_TOKEN_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;
pub const PASSWORD_SALT_LEN: usize = 16;
pub const PASSWORD_HASH_LEN: usize = Params::DEFAULT_OUTPUT_LEN;
pub const PASSWORD_MIN_LEN: usize = 8;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing failed: {0}")]
pub struct HashError(argon2::Error);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum AuthTokenDecodeError {
    #[error("Not enough parts separated by ':'")]
    NotEnoughParts,
    #[error("Invalid user id: {0}")]
    InvalidUserId(ParseIntError),
    #[error("Decoding base64 failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("The length of the core part is incorrect")]
    InvalidCoreLength,
    #[error("The length of the salt part is incorrect")]
    InvalidSaltLength,
}

/// Bearer credential handed out on login: `<user id>:<base64 core>:<base64 salt>`.
///
/// Only the argon2 hash of core and salt is ever stored.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthToken {
    pub user_id: Id<UserMarker>,
    pub core: [u8; AUTH_TOKEN_CORE_LEN],
    pub salt: [u8; AUTH_TOKEN_SALT_LEN],
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct AuthTokenHash(pub Box<[u8; AUTH_TOKEN_HASH_LEN]>);

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Authentication {
    pub user: Id<UserMarker>,
    pub token_hash: AuthTokenHash,
    pub created_at: OffsetDateTime,
    pub expires_after: Option<PositiveDuration>,
}

impl Authentication {
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_after
            .is_some_and(|expires_after| self.created_at + expires_after.get() < now)
    }
}

impl AuthToken {
    #[must_use]
    pub fn generate_random(user_id: Id<UserMarker>) -> Self {
        let core = rand::random();
        let salt = rand::random();

        Self {
            user_id,
            core,
            salt,
        }
    }

    #[must_use]
    pub fn as_token_str(&self) -> String {
        let user_id = self.user_id;
        let encoded_core = Base64Display::new(&self.core, &BASE64_STANDARD);
        let encoded_salt = Base64Display::new(&self.salt, &BASE64_STANDARD);

        format!("{user_id}:{encoded_core}:{encoded_salt}")
    }

    pub fn hash(&self) -> Result<AuthTokenHash, HashError> {
        let mut hash = Box::new([0; AUTH_TOKEN_HASH_LEN]);
        Argon2::default()
            .hash_password_into(&self.core, &self.salt, &mut *hash)
            .map_err(HashError)?;

        Ok(AuthTokenHash(hash))
    }
}

impl FromStr for AuthToken {
    type Err = AuthTokenDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');

        let user_id_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let core_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;
        let salt_part = parts.next().ok_or(Self::Err::NotEnoughParts)?;

        let user_id = user_id_part.parse().map_err(Self::Err::InvalidUserId)?;
        let core = BASE64_STANDARD
            .decode(core_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidCoreLength)?;
        let salt = BASE64_STANDARD
            .decode(salt_part)?
            .try_into()
            .map_err(|_| Self::Err::InvalidSaltLength)?;

        Ok(Self {
            user_id,
            core,
            salt,
        })
    }
}

impl Debug for AuthToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("user_id", &self.user_id)
            .field("core", &"[redacted]")
            .field("salt", &"[redacted]")
            .finish()
    }
}

impl Debug for AuthTokenHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AuthTokenHash").field(&"[redacted]").finish()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The auth token hash had an invalid length")]
pub struct InvalidAuthTokenHashError;

impl TryFrom<Vec<u8>> for AuthTokenHash {
    type Error = InvalidAuthTokenHashError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let hash: [u8; AUTH_TOKEN_HASH_LEN] =
            value.try_into().map_err(|_| InvalidAuthTokenHashError)?;
        Ok(Self(Box::new(hash)))
    }
}

/// Salted argon2 hash of a user's password.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PasswordHash {
    salt: [u8; PASSWORD_SALT_LEN],
    hash: Box<[u8; PASSWORD_HASH_LEN]>,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The stored password hash or salt had an invalid length")]
pub struct InvalidPasswordHashError;

fn hash_password(
    password: &str,
    salt: &[u8; PASSWORD_SALT_LEN],
) -> Result<Box<[u8; PASSWORD_HASH_LEN]>, HashError> {
    let mut hash = Box::new([0; PASSWORD_HASH_LEN]);
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut *hash)
        .map_err(HashError)?;

    Ok(hash)
}

impl PasswordHash {
    /// Hashes `password` under a fresh random salt.
    pub fn generate(password: &str) -> Result<Self, HashError> {
        let salt = rand::random();
        let hash = hash_password(password, &salt)?;

        Ok(Self { salt, hash })
    }

    pub fn from_parts(salt: Vec<u8>, hash: Vec<u8>) -> Result<Self, InvalidPasswordHashError> {
        let salt = salt.try_into().map_err(|_| InvalidPasswordHashError)?;
        let hash: [u8; PASSWORD_HASH_LEN] =
            hash.try_into().map_err(|_| InvalidPasswordHashError)?;

        Ok(Self {
            salt,
            hash: Box::new(hash),
        })
    }

    pub fn verify(&self, password: &str) -> Result<bool, HashError> {
        let candidate = hash_password(password, &self.salt)?;
        Ok(candidate == self.hash)
    }

    #[must_use]
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    #[must_use]
    pub fn hash(&self) -> &[u8] {
        &*self.hash
    }
}

impl Debug for PasswordHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHash")
            .field("salt", &"[redacted]")
            .field("hash", &"[redacted]")
            .finish()
    }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Debug, Default, Hash)]
pub struct PositiveDuration(Duration);

impl PositiveDuration {
    #[must_use]
    pub fn new(duration: Duration) -> Option<Self> {
        duration.is_positive().then_some(Self(duration))
    }

    #[must_use]
    pub fn get(&self) -> Duration {
        self.0
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The duration is not positive: {0}")]
pub struct NonPositiveDurationError(Duration);

impl TryFrom<Duration> for PositiveDuration {
    type Error = NonPositiveDurationError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(NonPositiveDurationError(value))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        auth::{
            AUTH_TOKEN_HASH_LEN, AuthToken, AuthTokenDecodeError, AuthTokenHash, Authentication,
            PasswordHash, PositiveDuration,
        },
    };
    use time::{Duration, macros::datetime};

    #[test]
    fn token_string_round_trips() {
        let token = AuthToken::generate_random(Id::new(7));
        let parsed: AuthToken = token.as_token_str().parse().unwrap();

        assert_eq!(parsed, token);
        assert_eq!(parsed.hash().unwrap(), token.hash().unwrap());
    }

    #[test]
    fn malformed_tokens() {
        assert_eq!(
            "7:abc".parse::<AuthToken>(),
            Err(AuthTokenDecodeError::NotEnoughParts)
        );
        assert!(matches!(
            "seven:AAAA:AAAA".parse::<AuthToken>(),
            Err(AuthTokenDecodeError::InvalidUserId(_))
        ));
        assert_eq!(
            "7:AAAA:AAAA".parse::<AuthToken>(),
            Err(AuthTokenDecodeError::InvalidCoreLength)
        );
    }

    #[test]
    fn debug_output_is_redacted() {
        let token = AuthToken::generate_random(Id::new(1));
        let debug = format!("{token:?}");

        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains(&format!("{:?}", token.core)));
    }

    #[test]
    fn token_hash_length_is_checked() {
        assert!(AuthTokenHash::try_from(vec![0; AUTH_TOKEN_HASH_LEN]).is_ok());
        assert!(AuthTokenHash::try_from(vec![0; AUTH_TOKEN_HASH_LEN - 1]).is_err());
    }

    #[test]
    fn password_verification() {
        let hash = PasswordHash::generate("correct horse").unwrap();

        assert!(hash.verify("correct horse").unwrap());
        assert!(!hash.verify("battery staple").unwrap());

        let restored =
            PasswordHash::from_parts(hash.salt().to_vec(), hash.hash().to_vec()).unwrap();
        assert!(restored.verify("correct horse").unwrap());
        assert!(PasswordHash::from_parts(vec![1, 2, 3], hash.hash().to_vec()).is_err());
    }

    #[test]
    fn expiry() {
        let created_at = datetime!(2025-10-01 12:00 UTC);
        let mut authentication = Authentication {
            user: Id::new(1),
            token_hash: AuthTokenHash(Box::new([0; AUTH_TOKEN_HASH_LEN])),
            created_at,
            expires_after: None,
        };
        assert!(!authentication.is_expired_at(created_at + Duration::days(1000)));

        authentication.expires_after = PositiveDuration::new(Duration::hours(1));
        assert!(!authentication.is_expired_at(created_at + Duration::minutes(59)));
        assert!(authentication.is_expired_at(created_at + Duration::minutes(61)));

        assert!(PositiveDuration::new(Duration::ZERO).is_none());
    }
}
