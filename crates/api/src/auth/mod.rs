//! Authentication primitives.
//!
//! Access tokens are issued by the surrounding platform; this service only
//! validates them. [`jwt::generate_access_token`] exists for service
//! credentials and tests.

pub mod jwt;
