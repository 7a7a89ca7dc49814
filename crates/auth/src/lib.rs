//! `stacks-auth` — authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage. Token
//! decoding lives behind the `JwtValidator` trait; everything else is pure.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod principal;
pub mod roles;

pub use authorize::{can_renew, ensure_can_renew};
pub use claims::{validate_claims, JwtClaims, TokenValidationError};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use principal::PrincipalId;
pub use roles::Role;
