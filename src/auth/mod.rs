use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpMessage, HttpRequest};
use futures_util::future::{ready, Ready};
use rand::distr::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::database::StoreError;
use crate::models::Account;
use crate::session::SessionContext;
use crate::utils::error::AppError;

pub mod strategy;

pub use strategy::{AuthOutcome, LocalStrategy, StrategyConfig, StrategyRegistry, VerifyAccount};

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid strategy \"{0}\"")]
    InvalidStrategy(String),
    #[error("User not found")]
    UserNotFound,
    #[error("no model provided for strategy \"{0}\"")]
    MissingModel(String),
    #[error("strategy \"{0}\" is registered twice")]
    DuplicateStrategy(String),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Credential hashing behind the dependency bag, so projects can swap the algorithm
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, AuthError>;
    fn verify(&self, plain: &str, hash: &str) -> Result<bool, AuthError>;
}

/// bcrypt with a fixed cost
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(10)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plain: &str) -> Result<String, AuthError> {
        Ok(bcrypt::hash(plain, self.cost)?)
    }

    fn verify(&self, plain: &str, hash: &str) -> Result<bool, AuthError> {
        Ok(bcrypt::verify(plain, hash)?)
    }
}

/// Random string source for verification and reset tokens
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Alphanumeric tokens of a fixed length
pub struct RandomTokens {
    length: usize,
}

impl RandomTokens {
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

impl Default for RandomTokens {
    fn default() -> Self {
        Self::new(32)
    }
}

impl TokenGenerator for RandomTokens {
    fn generate(&self) -> String {
        generate_random_string(self.length)
    }
}

pub fn generate_random_string(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Hash a token for storage (using SHA-256)
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Current user resolved by the session middleware, if any
pub fn current_user(req: &HttpRequest) -> Option<Account> {
    req.extensions()
        .get::<SessionContext>()
        .and_then(|ctx| ctx.user.clone())
}

/// Guard extractor: handlers taking `Authenticated` only run for logged-in requests
pub struct Authenticated(pub Account);

impl Authenticated {
    pub fn into_inner(self) -> Account {
        self.0
    }
}

impl FromRequest for Authenticated {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(match current_user(req) {
            Some(account) => Ok(Authenticated(account)),
            None => Err(AppError::unauthorized("You are not logged in!").into()),
        })
    }
}
