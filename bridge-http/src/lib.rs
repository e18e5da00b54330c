//! # HTTP Bridge
//!
//! The HTTP calling primitive the account core is built on.
//!
//! ## Overview
//!
//! This crate defines the transport seam: a small request/response model and
//! the [`HttpClient`] trait that the credential engine and the storage
//! provider consume. The trait keeps the core testable (mock the transport,
//! assert on issued requests) and keeps TLS/pooling concerns out of the
//! protocol code.
//!
//! A production implementation backed by `reqwest` is provided as
//! [`ReqwestHttpClient`].

pub mod error;
pub mod http;
pub mod reqwest_client;

pub use error::{HttpError, Result};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use reqwest_client::ReqwestHttpClient;
