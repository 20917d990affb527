use std::path::{Path, PathBuf};

use anyhow::Context;
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::{AppError, AppResult, AppState};

/// Where [`router`] is mounted. Stored media references start with this.
pub const MOUNT: &str = "/api/files";

/// Serves stored attachments: `/images/<name>` and `/docs/<name>`.
pub fn router(upload_dir: &Path) -> Router<AppState> {
    Router::new()
        .nest_service("/images", ServeDir::new(upload_dir.join(MediaKind::Image.dir())))
        .nest_service("/docs", ServeDir::new(upload_dir.join(MediaKind::Doc.dir())))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Image,
    Doc,
}

impl MediaKind {
    fn dir(self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Doc => "docs",
        }
    }

    fn from_mime(mime: &str) -> AppResult<MediaKind> {
        if mime.starts_with("image/") {
            Ok(MediaKind::Image)
        } else if mime.starts_with("application/") || mime.starts_with("text/") {
            Ok(MediaKind::Doc)
        } else {
            Err(AppError::Validation(format!("unsupported media type {mime}")))
        }
    }
}

fn extension(mime: &str) -> AppResult<&'static str> {
    Ok(match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/svg+xml" => "svg",
        "application/pdf" => "pdf",
        "application/json" => "json",
        "application/zip" => "zip",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "text/plain" => "txt",
        "text/csv" => "csv",
        "text/markdown" => "md",
        _ => return Err(AppError::Validation(format!("could not determine a file extension for {mime}"))),
    })
}

/// A decoded `data:<mime>;base64,<payload>` URL.
#[derive(Debug)]
struct DataUrl {
    kind: MediaKind,
    extension: &'static str,
    bytes: Vec<u8>,
}

impl DataUrl {
    fn parse(value: &str) -> AppResult<DataUrl> {
        let (header, payload) = value
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(','))
            .ok_or_else(|| AppError::Validation("media must be a data URL".to_owned()))?;

        let mut params = header.split(';');
        let mime = params.next().unwrap_or_default().trim().to_ascii_lowercase();
        if !params.any(|param| param.trim().eq_ignore_ascii_case("base64")) {
            return Err(AppError::Validation("media must be base64 encoded".to_owned()));
        }

        Ok(DataUrl {
            kind: MediaKind::from_mime(&mime)?,
            extension: extension(&mime)?,
            bytes: STANDARD
                .decode(payload.trim())
                .map_err(|_| AppError::Validation("media is not valid base64".to_owned()))?,
        })
    }
}

pub(crate) fn is_data_url(value: &str) -> bool {
    value.starts_with("data:")
}

/// Decodes `data_url` into the upload directory and returns the
/// `/api/files/...` reference it will be served under.
pub(crate) async fn store_data_url(upload_dir: &Path, owner: &str, data_url: &str) -> AppResult<String> {
    let DataUrl { kind, extension, bytes } = DataUrl::parse(data_url)?;

    let dir = upload_dir.join(kind.dir());
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let name = format!("{owner}_{}.{extension}", Uuid::now_v7().simple());
    let path = dir.join(&name);
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;

    tracing::debug!(path = %path.display(), size = bytes.len(), "media stored");
    Ok(format!("{MOUNT}/{}/{name}", kind.dir()))
}

/// Maps a reference produced by [`store_data_url`] back to its file.
/// Anything else, including paths that try to leave the upload directory, is `None`.
fn stored_path(upload_dir: &Path, reference: &str) -> Option<PathBuf> {
    let (dir, name) = reference.strip_prefix(MOUNT)?.strip_prefix('/')?.split_once('/')?;
    if ![MediaKind::Image.dir(), MediaKind::Doc.dir()].contains(&dir) {
        return None;
    }
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return None;
    }
    Some(upload_dir.join(dir).join(name))
}

/// Best effort. The owning row is already gone by the time this runs.
pub(crate) async fn remove_stored(upload_dir: &Path, reference: &str) {
    let Some(path) = stored_path(upload_dir, reference) else {
        return;
    };

    match tokio::fs::remove_file(&path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "media removed"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to remove media"),
    }
}
