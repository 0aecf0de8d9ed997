use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::Html,
};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use serde::Deserialize;
use tracing::debug;

use crate::{AppResult, AppState, Platform};

/// Query value that marks `message` as base64url text.
pub const BASE64_ENCODING: &str = "base64";

/// Status message passed back to listing pages after a redirect.
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub message: Option<String>,
    pub encoding: Option<String>,
}

impl MessageQuery {
    /// Text to show on the page, if any.
    ///
    /// Base64 messages that fail to decode are shown as received.
    pub fn text(&self) -> Option<String> {
        let message = self.message.as_deref().filter(|m| !m.is_empty())?;
        if self.encoding.as_deref() != Some(BASE64_ENCODING) {
            return Some(message.to_string());
        }
        match URL_SAFE.decode(message.trim_end()) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                debug!(error = %e, "Status message is not valid base64");
                Some(message.to_string())
            }
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate<'a> {
    prefix: &'a str,
    platforms: Vec<&'static str>,
    version: &'static str,
}

/// A listed name and its percent-encoded URL path segment.
struct FileEntry {
    name: String,
    segment: String,
}

impl FileEntry {
    fn new(name: String) -> Self {
        Self {
            segment: encode_segment(&name),
            name,
        }
    }
}

/// Percent-encodes `name` for use as a single URL path segment.
fn encode_segment(name: &str) -> String {
    // Form encoding writes spaces as `+` and escapes literal `+` as `%2B`.
    url::form_urlencoded::byte_serialize(name.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[derive(Template)]
#[template(path = "filelist.html")]
struct FileListTemplate<'a> {
    header: &'a str,
    prefix: &'a str,
    parent_url: String,
    files: Vec<FileEntry>,
    allow_delete: bool,
    release_enabled: bool,
    message: Option<String>,
}

/// Landing page with the upload form
pub async fn home(State(state): State<Arc<AppState>>) -> AppResult<Html<String>> {
    let template = IndexTemplate {
        prefix: &state.config.prefix,
        platforms: Platform::ALL.iter().map(|p| p.as_str()).collect(),
        version: env!("CARGO_PKG_VERSION"),
    };
    Ok(Html(template.render()?))
}

/// Top-level listing of the packages root
pub async fn list_platforms(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageQuery>,
) -> AppResult<Html<String>> {
    let files = state.repo.list_platforms().await?;
    let template = FileListTemplate {
        header: "Platforms",
        prefix: &state.config.prefix,
        parent_url: "/pkgs".to_string(),
        files: files.into_iter().map(FileEntry::new).collect(),
        allow_delete: false,
        release_enabled: false,
        message: query.text(),
    };
    Ok(Html(template.render()?))
}

/// Packages of one platform, with delete and release actions
pub async fn list_packages(
    Path(platform): Path<String>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageQuery>,
) -> AppResult<Html<String>> {
    let platform: Platform = platform.parse()?;
    let files = state.repo.list_packages(platform).await?;
    let template = FileListTemplate {
        header: "Packages",
        prefix: &state.config.prefix,
        parent_url: format!("/pkgs/{platform}"),
        files: files.into_iter().map(FileEntry::new).collect(),
        allow_delete: true,
        release_enabled: state.repo.release_enabled(),
        message: query.text(),
    };
    Ok(Html(template.render()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(message: Option<&str>, encoding: Option<&str>) -> MessageQuery {
        MessageQuery {
            message: message.map(String::from),
            encoding: encoding.map(String::from),
        }
    }

    #[test]
    fn plain_message_is_shown_verbatim() {
        assert_eq!(
            query(Some("pkg.tar.bz2 uploaded"), None).text().as_deref(),
            Some("pkg.tar.bz2 uploaded")
        );
    }

    #[test]
    fn empty_or_missing_message_is_none() {
        assert_eq!(query(None, None).text(), None);
        assert_eq!(query(Some(""), Some("base64")).text(), None);
    }

    #[test]
    fn base64_message_is_decoded() {
        let encoded = URL_SAFE.encode(b"Login successful\n>>> upload done?");
        assert_eq!(
            query(Some(&encoded), Some("base64")).text().as_deref(),
            Some("Login successful\n>>> upload done?")
        );
    }

    #[test]
    fn undecodable_base64_falls_back_to_raw() {
        assert_eq!(
            query(Some("not*base64"), Some("base64")).text().as_deref(),
            Some("not*base64")
        );
    }

    #[test]
    fn file_list_links_use_prefix_and_parent() {
        let page = FileListTemplate {
            header: "Packages",
            prefix: "/poboys",
            parent_url: "/pkgs/noarch".to_string(),
            files: vec![FileEntry::new("a-1.0-0.tar.bz2".to_string())],
            allow_delete: true,
            release_enabled: false,
            message: Some("<b>hi</b>".to_string()),
        }
        .render()
        .unwrap()
        .replace("&#x2f;", "/");

        assert!(page.contains("href=\"/poboys/pkgs/noarch/a-1.0-0.tar.bz2\""));
        assert!(page.contains("action=\"/poboys/delete/pkgs/noarch/a-1.0-0.tar.bz2\""));
        assert!(!page.contains("/anaconda/release/"));
        assert!(page.contains("&lt;b&gt;hi&lt;/b&gt;"));
        assert!(!page.contains("<b>hi"));
    }

    #[test]
    fn file_links_are_percent_encoded() {
        assert_eq!(encode_segment("a-1.0-0.tar.bz2"), "a-1.0-0.tar.bz2");
        assert_eq!(
            encode_segment("pkg 1.0+cu118#1?.tar.bz2"),
            "pkg%201.0%2Bcu118%231%3F.tar.bz2"
        );

        let page = FileListTemplate {
            header: "Packages",
            prefix: "",
            parent_url: "/pkgs/noarch".to_string(),
            files: vec![FileEntry::new("odd name%.tar.bz2".to_string())],
            allow_delete: true,
            release_enabled: true,
            message: None,
        }
        .render()
        .unwrap()
        .replace("&#x2f;", "/");

        assert!(page.contains("href=\"/pkgs/noarch/odd%20name%25.tar.bz2\""));
        assert!(page.contains("action=\"/delete/pkgs/noarch/odd%20name%25.tar.bz2\""));
        assert!(page.contains("action=\"/anaconda/release/pkgs/noarch/odd%20name%25.tar.bz2\""));
        assert!(page.contains(">odd name%.tar.bz2</a>"));
    }

    #[test]
    fn index_lists_every_platform() {
        let page = IndexTemplate {
            prefix: "",
            platforms: Platform::ALL.iter().map(|p| p.as_str()).collect(),
            version: "0.0.0",
        }
        .render()
        .unwrap();
        for platform in Platform::ALL {
            assert!(page.contains(&format!("<option value=\"{platform}\">")));
        }
        assert!(page.contains("action=\"/upload\""));
    }
}
