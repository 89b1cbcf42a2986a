//! Authentication primitives: JWT signing, password hashing, refresh tokens.

pub mod jwt;
pub mod password;
pub mod tokens;
