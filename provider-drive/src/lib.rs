//! # Drive Provider
//!
//! File and folder operations against a Drive-style REST API, built on the
//! authenticated call engine in `core-account`.
//!
//! ## Overview
//!
//! Every operation here routes through [`Credential::api_call`], so an
//! expired access token is refreshed and the request replayed without the
//! operation — or its caller — noticing. Operations report the engine's
//! terminal "access token revoked or expired" outcome as
//! [`StorageError::AccessTokenRevoked`], the signal that the account needs
//! re-authentication.
//!
//! [`Credential::api_call`]: core_account::Credential

pub mod error;
pub mod storage;
pub mod types;

pub use error::{Result, StorageError};
pub use storage::{DriveStorage, FileDownload, FileNameOptions, SearchItem};
pub use types::{DriveFile, FilesListResponse, FOLDER_MIME_TYPE};
