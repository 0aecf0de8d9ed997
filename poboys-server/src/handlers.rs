//! Package route handlers: upload, download, delete and release.
//!
//! Listing pages live in [`crate::ui`]. Every handler here parses the
//! platform first, so an unknown platform never reaches the filesystem.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use bytes::Bytes;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::ui::BASE64_ENCODING;
use crate::{AppError, AppResult, AppState, Platform};

/// Upload form field naming the target platform.
pub const PLATFORM_FIELD: &str = "platform";
/// Upload form field carrying the package file.
pub const FILE_FIELD: &str = "fileupload";
/// The upload form has two fields; anything far beyond that is not a browser.
pub const MAX_MULTIPART_FIELDS: usize = 16;

/// Last component of a client-supplied upload name.
///
/// Some browsers send the full local path, with either separator.
fn client_basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Location of a platform listing, with an optional status query.
pub fn listing_url(prefix: &str, platform: Platform, query: &[(&str, &str)]) -> String {
    let mut url = format!("{prefix}/pkgs/{platform}");
    if !query.is_empty() {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query)
            .finish();
        url.push('?');
        url.push_str(&encoded);
    }
    url
}

/// Accept a package upload from the landing page form.
///
/// # Route
/// `POST /upload`
///
/// # Request Body
/// Multipart form with a `platform` text field and a `fileupload` file field.
/// The stored name is the file name sent with the upload.
///
/// # Returns
/// `303 See Other` to the platform listing with `message=<filename> uploaded`.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Redirect> {
    let mut platform: Option<String> = None;
    let mut package: Option<(String, Bytes)> = None;
    let mut field_count = 0;

    while let Some(field) = multipart.next_field().await? {
        field_count += 1;
        if field_count > MAX_MULTIPART_FIELDS {
            warn!(field_count, "Too many multipart fields");
            return Err(AppError::BadRequest(format!(
                "Too many multipart fields (max: {MAX_MULTIPART_FIELDS})"
            )));
        }

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            PLATFORM_FIELD => platform = Some(field.text().await?.trim().to_string()),
            FILE_FIELD => {
                let filename = field
                    .file_name()
                    .map(client_basename)
                    .ok_or_else(|| AppError::BadRequest("Missing filename in upload".to_string()))?
                    .to_string();
                let data = field.bytes().await?;
                debug!(filename = %filename, size = data.len(), "Read upload body");
                package = Some((filename, data));
            }
            _ => {
                let skipped = field.bytes().await?;
                debug!(field_name = %name, size = skipped.len(), "Ignoring multipart field");
            }
        }
    }

    let platform: Platform = platform
        .ok_or_else(|| AppError::BadRequest(format!("Missing {PLATFORM_FIELD} field")))?
        .parse()?;
    let (filename, data) =
        package.ok_or_else(|| AppError::BadRequest(format!("Missing {FILE_FIELD} field")))?;

    state.repo.upload(platform, &filename, &data).await?;

    let message = format!("{filename} uploaded");
    Ok(Redirect::to(&listing_url(
        &state.config.prefix,
        platform,
        &[("message", &message)],
    )))
}

/// Stream a package file as an attachment.
///
/// # Route
/// `GET /pkgs/{platform}/{filename}`
pub async fn download(
    Path((platform, filename)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Response> {
    let platform: Platform = platform.parse()?;
    let (file, len) = state.repo.download(platform, &filename).await?;
    debug!(platform = %platform, filename = %filename, size = len, "Serving package");

    let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', "\\\""));
    let disposition = HeaderValue::from_bytes(disposition.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid Content-Disposition header: {e}")))?;

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        ),
        (header::CONTENT_LENGTH, HeaderValue::from(len)),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((StatusCode::OK, headers, body).into_response())
}

/// Delete a package and return to the platform listing.
///
/// # Route
/// `POST /delete/pkgs/{platform}/{filename}`
pub async fn delete(
    Path((platform, filename)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Redirect> {
    let platform: Platform = platform.parse()?;
    state.repo.delete(platform, &filename).await?;
    Ok(Redirect::to(&listing_url(&state.config.prefix, platform, &[])))
}

/// Release a package to anaconda.org.
///
/// # Route
/// `POST /anaconda/release/pkgs/{platform}/{filename}`
///
/// # Returns
/// `303 See Other` to the platform listing. The release tool output is sent
/// back base64url-encoded in `message`, flagged with `encoding=base64`.
pub async fn release(
    Path((platform, filename)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> AppResult<Redirect> {
    let platform: Platform = platform.parse()?;
    let output = state.repo.release(platform, &filename).await?;
    info!(platform = %platform, filename = %filename, output_bytes = output.len(), "Release finished");

    let message = URL_SAFE.encode(&output);
    Ok(Redirect::to(&listing_url(
        &state.config.prefix,
        platform,
        &[("message", &message), ("encoding", BASE64_ENCODING)],
    )))
}
