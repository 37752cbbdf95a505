//! Authentication and authorization for Farmgate
//!
//! Provides:
//! - JWT token generation and validation
//! - Password hashing with Argon2
//! - The identity provider seam (token issue/verify + credential storage)
//! - Roles, the static capability table, and farm scoping

pub mod access;
pub mod identity;
pub mod jwt;
pub mod password;

pub use access::{AccessContext, Capability, Role};
pub use identity::{IdentityProvider, IssuedToken, LocalIdentityProvider};
pub use jwt::{extract_token_from_header, Claims, JwtValidator};
pub use password::{hash_password, verify_password};
