//! # Account Core
//!
//! Server-side credential for a Drive-style cloud storage provider.
//!
//! ## Overview
//!
//! A [`Credential`] carries the three token-like values involved in OAuth 2.0
//! server-side access:
//!
//! - a short-lived **access token** presented as a bearer credential on every
//!   provider call;
//! - a long-lived **refresh token** used to mint new access tokens after the
//!   provider rejects an expired one;
//! - a one-time **authorization code** from the client-side consent flow,
//!   exchanged exactly once for the token pair when an account is linked.
//!
//! The value of this crate is [`Credential::api_call`]: provider operations
//! route through it, and when the provider answers with an
//! authentication-failure status the engine refreshes the access token and
//! replays the original request — once, never more — without involving the
//! caller. A per-instance one-shot guard bounds the recovery to a single
//! extra round trip; a credential is expected to live for one logical
//! operation, not to be shared.
//!
//! Token persistence is delegated to the host through the
//! [`CredentialDelegate`] capability. The core never owns storage: a missing
//! delegate downgrades persistence to a logged warning, a failing delegate is
//! a reported error.

pub mod config;
pub mod credential;
pub mod delegate;
pub mod engine;
pub mod error;
mod oauth;

pub use config::AccountConfig;
pub use credential::{
    properties_from_headers, Credential, ACCESS_TOKEN_PROPERTY, AUTHORIZATION_CODE_PROPERTY,
};
pub use delegate::CredentialDelegate;
pub use engine::{ApiRequest, DEFAULT_BASE_URL};
pub use error::{ApiCallError, CredentialError, Result};
