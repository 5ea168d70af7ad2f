//! Token construction and verification.
//!
//! Tokens are HS256 JWTs signed with the per-service secret, optionally
//! sealed in an AES-256-GCM envelope.

pub mod cipher;
pub mod claims;
pub mod codec;

pub use cipher::TokenCipher;
pub use claims::TokenClaims;
pub use codec::{CodecError, JwtCodec, TokenCodec};
