//! Authentication module
//!
//! Credential storage, bearer token issuing and verification, and the
//! session lifecycle built on top of them.

pub mod cipher;
pub mod claims;
pub mod jwt;
pub mod keys;
pub mod password;
pub mod service;
pub mod token;

pub use claims::{Claims, UserClaims};
pub use jwt::{TokenCodec, TokenError};
pub use keys::{Pepper, SigningKey};
pub use password::{PasswordError, PasswordVault};
pub use service::{SessionService, SweepReport};
pub use token::{IssuedToken, Token, TokenRecord, VerifiedToken};
