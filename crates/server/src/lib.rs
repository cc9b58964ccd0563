//! An OAuth2 authorization server core.
//!
//! Registered clients authenticate with HTTP Basic credentials whose secrets
//! are stored as Argon2id hashes. The grant engine issues rotating bearer
//! token pairs for password, refresh token and authorization code grants and
//! persists everything through sea-orm.

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod oauth2;
