//! # Poboys Conda Package Server
//!
//! A small HTTP server for uploading, listing, downloading and deleting conda
//! packages, grouped by platform. After every change the platform's repodata
//! is regenerated with the external indexing tool, and the directory can be
//! mirrored to an S3 bucket and released to anaconda.org.
//!
//! ## Key Modules
//!
//! - [`repository`]: the upload/delete protocol (mutate, reindex, mirror, roll back)
//! - [`store`]: on-disk layout of platform directories
//! - [`index`]: external indexing tool wrapper
//! - [`mirror`]: object store mirroring
//! - [`release`]: anaconda.org publishing
//! - [`server`] / [`handlers`]: HTTP surface
//! - [`config`] / [`cli`]: startup configuration

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod index;
pub mod locks;
pub mod mirror;
pub mod platform;
pub mod process;
pub mod release;
pub mod repository;
pub mod server;
pub mod state;
pub mod store;
pub mod ui;

pub use config::Config;
pub use error::{ApiErrorResponse, AppError, AppResult, ErrorCode};
pub use platform::Platform;
pub use repository::Repository;
pub use server::{build_router, run_server};
pub use state::AppState;

/// Longest filename accepted on most filesystems.
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Characters that end or escape a URL path segment.
const URL_RESERVED: [char; 3] = ['#', '?', '%'];

/// Validates a package filename taken from a URL or an upload.
///
/// Filenames name a single entry inside a platform directory, so anything
/// that could address another location is refused.
///
/// # Errors
///
/// Returns [`AppError::InvalidFilename`] if the filename:
/// - is empty or longer than [`MAX_FILENAME_LENGTH`] bytes
/// - contains a null byte or other control characters
/// - contains `/` or `\`
/// - contains `#`, `?` or `%`, which would change the meaning of a URL path
/// - is `.`/`..` or contains a `..` sequence
///
/// # Examples
///
/// ```
/// # use poboys_server::validate_filename;
/// assert!(validate_filename("numpy-1.26.0-py311_0.tar.bz2").is_ok());
/// assert!(validate_filename("../etc/passwd").is_err());
/// assert!(validate_filename("linux-64/evil.tar.bz2").is_err());
/// ```
pub fn validate_filename(filename: &str) -> Result<(), AppError> {
    let reject = |reason: &str| {
        tracing::warn!(filename = %filename.escape_debug(), reason, "Rejected filename");
        Err(AppError::InvalidFilename(format!("{reason}: {}", filename.escape_debug())))
    };

    if filename.is_empty() {
        return reject("filename cannot be empty");
    }
    if filename.len() > MAX_FILENAME_LENGTH {
        return reject("filename too long");
    }
    if filename.chars().any(char::is_control) {
        return reject("filename contains control characters");
    }
    if filename.contains('/') || filename.contains('\\') {
        return reject("filename contains a path separator");
    }
    if filename.contains(URL_RESERVED) {
        return reject("filename contains a URL-reserved character");
    }
    if filename.contains("..") || filename == "." {
        return reject("filename contains a directory reference");
    }
    Ok(())
}
