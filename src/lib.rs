//! In-process OAuth 2.0 authorization server core.
//!
//! Provides the client registry, the credential ledgers (authorization codes,
//! device authorizations, access/refresh tokens), and the grant engine that
//! orchestrates them across the supported grant types. HTTP dispatch, login
//! and device-verification pages, and process bootstrap are the embedding
//! application's responsibility.

pub mod clock;
pub mod config;
pub mod errors;
pub mod ledger;
pub mod oauth;
pub mod sweep;
