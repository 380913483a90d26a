use crate::errors::{self, ShelfError};
use crate::folders::NewSmartFolder;
use crate::ftree::{EntryType, FileTree, ListingEntry};
use crate::library::{validate_user, UploadRequest};
use crate::records::{normalize_tags, FileKind};
use crate::search::{self, SearchQuery, SearchResults};
use crate::server::AppState;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::instrument;
use warp::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use warp::http::StatusCode;
use warp::hyper::Body;
use warp::reply::{Reply, Response};

#[derive(Serialize)]
struct TreeResponse {
    folders: usize,
    files: usize,
    entries: Vec<ListingEntry>,
}

#[derive(Serialize)]
struct Removed {
    removed: usize,
}

fn respond<T: Serialize>(result: errors::Result<T>) -> Result<Response, Infallible> {
    match result {
        Ok(value) => Ok(warp::reply::json(&value).into_response()),
        Err(e) => {
            tracing::error!("{}", e);
            Ok(e.into_response())
        }
    }
}

fn created<T: Serialize>(result: errors::Result<T>) -> Result<Response, Infallible> {
    match result {
        Ok(value) => {
            let reply = warp::reply::with_status(warp::reply::json(&value), StatusCode::CREATED);
            Ok(reply.into_response())
        }
        Err(e) => {
            tracing::error!("{}", e);
            Ok(e.into_response())
        }
    }
}

fn required(params: &HashMap<String, String>, name: &str) -> errors::Result<String> {
    params
        .get(name)
        .cloned()
        .ok_or_else(|| ShelfError::invalid(format!("Missing {} argument", name)))
}

fn tags_param(params: &HashMap<String, String>) -> Vec<String> {
    match params.get("tags") {
        Some(tags) => normalize_tags(tags.split(',')),
        None => Vec::new(),
    }
}

#[instrument(name = "handlers.get_version", level = "info")]
pub(crate) fn get_version() -> Result<impl warp::Reply, Infallible> {
    Ok(warp::reply::with_status(
        warp::reply::json(&env!("CARGO_PKG_VERSION").to_string()),
        StatusCode::OK,
    ))
}

#[instrument(
    name = "handlers.search_files",
    level = "info",
    skip(state, params),
    fields(user = %user)
)]
pub(crate) fn search_files(
    state: Arc<AppState>,
    user: String,
    params: HashMap<String, String>,
) -> Result<Response, Infallible> {
    let result = (|| -> errors::Result<SearchResults> {
        validate_user(&user)?;
        let kind = match params.get("kind").map(String::as_str) {
            None | Some("") | Some("all") => None,
            Some(label) => Some(label.parse::<FileKind>()?),
        };
        let query = SearchQuery::new(params.get("q").map(String::as_str).unwrap_or(""), kind);
        let files = state.live.files(&user)?;
        Ok(search::search(&query, &files))
    })();
    respond(result)
}

/// The whole tree, or with `path` set the part below that folder.
#[instrument(
    name = "handlers.get_tree",
    level = "info",
    skip(state, params),
    fields(user = %user)
)]
pub(crate) fn get_tree(
    state: Arc<AppState>,
    user: String,
    params: HashMap<String, String>,
) -> Result<Response, Infallible> {
    let result = (|| -> errors::Result<TreeResponse> {
        validate_user(&user)?;
        let tree = FileTree::build(&state.live.files(&user)?);
        let entries = match params.get("path") {
            Some(path) => tree.listing_at(path)?,
            None => tree.listing(),
        };
        let folders = entries
            .iter()
            .filter(|e| e.entry_type == EntryType::Folder)
            .count();
        Ok(TreeResponse {
            folders,
            files: entries.len() - folders,
            entries,
        })
    })();
    respond(result)
}

#[instrument(name = "handlers.get_usage", level = "info", skip(state), fields(user = %user))]
pub(crate) fn get_usage(state: Arc<AppState>, user: String) -> Result<Response, Infallible> {
    respond(state.library.usage(&user))
}

#[instrument(
    name = "handlers.upload_file",
    level = "info",
    skip(state, params, body),
    fields(user = %user, size = body.len())
)]
pub(crate) fn upload_file(
    state: Arc<AppState>,
    user: String,
    params: HashMap<String, String>,
    body: Bytes,
) -> Result<Response, Infallible> {
    let result = required(&params, "name").and_then(|name| {
        state.library.upload(
            &user,
            UploadRequest {
                name,
                mime: params.get("mime").cloned(),
                tags: tags_param(&params),
                content: body,
            },
        )
    });
    created(result)
}

type FormPart = (String, Option<String>, Bytes);

async fn read_form(form: warp::multipart::FormData) -> errors::Result<Vec<FormPart>> {
    let mut form = Box::pin(form);
    let mut parts = Vec::new();
    while let Some(part) = form.next().await {
        let part = part.map_err(|e| ShelfError::invalid(format!("Bad multipart body: {}", e)))?;
        let name = part.filename().unwrap_or(part.name()).to_string();
        let mime = part.content_type().map(str::to_string);
        let mut data = Box::pin(part.stream());
        let mut content = BytesMut::new();
        while let Some(chunk) = data.next().await {
            let chunk =
                chunk.map_err(|e| ShelfError::invalid(format!("Bad multipart body: {}", e)))?;
            content.put(chunk);
        }
        parts.push((name, mime, content.freeze()));
    }
    Ok(parts)
}

/// Multipart upload of several files at once; each part's filename is its virtual path.
#[instrument(
    name = "handlers.upload_many",
    level = "info",
    skip(state, params, form),
    fields(user = %user)
)]
pub(crate) async fn upload_many(
    state: Arc<AppState>,
    user: String,
    params: HashMap<String, String>,
    form: warp::multipart::FormData,
) -> Result<Response, Infallible> {
    let tags = tags_param(&params);
    let result = read_form(form).await.and_then(|parts| {
        let requests = parts
            .into_iter()
            .map(|(name, mime, content)| UploadRequest {
                name,
                mime,
                tags: tags.clone(),
                content,
            })
            .collect();
        state.library.upload_batch(&user, requests)
    });
    created(result)
}

#[instrument(
    name = "handlers.get_file",
    level = "info",
    skip(state),
    fields(user = %user, id = %id)
)]
pub(crate) fn get_file(
    state: Arc<AppState>,
    user: String,
    id: String,
) -> Result<Response, Infallible> {
    respond(state.library.get_file(&user, &id))
}

#[instrument(
    name = "handlers.get_content",
    level = "info",
    skip(state),
    fields(user = %user, id = %id)
)]
pub(crate) fn get_content(
    state: Arc<AppState>,
    user: String,
    id: String,
) -> Result<Response, Infallible> {
    let (record, content) = match state.library.read_content(&user, &id) {
        Ok(found) => found,
        Err(e) => {
            tracing::error!("{}", e);
            return Ok(e.into_response());
        }
    };
    let mime = record
        .mime
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(attachment(&mime, record.display_name(), content))
}

fn attachment(mime: &str, file_name: &str, content: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", file_name.replace('"', ""));
    let response = warp::http::Response::builder()
        .header(CONTENT_TYPE, mime)
        .header(CONTENT_DISPOSITION, disposition)
        .body(Body::from(content));
    match response {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Could not build download response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[instrument(
    name = "handlers.delete_file",
    level = "info",
    skip(state),
    fields(user = %user, id = %id)
)]
pub(crate) fn delete_file(
    state: Arc<AppState>,
    user: String,
    id: String,
) -> Result<Response, Infallible> {
    respond(state.library.delete_file(&user, &id))
}

#[instrument(
    name = "handlers.update_file_tags",
    level = "info",
    skip(state, tags),
    fields(user = %user, id = %id)
)]
pub(crate) fn update_file_tags(
    state: Arc<AppState>,
    user: String,
    id: String,
    tags: Vec<String>,
) -> Result<Response, Infallible> {
    respond(state.library.update_tags(&user, &id, &tags))
}

#[instrument(
    name = "handlers.download_folder",
    level = "info",
    skip(state, params),
    fields(user = %user)
)]
pub(crate) fn download_folder(
    state: Arc<AppState>,
    user: String,
    params: HashMap<String, String>,
) -> Result<Response, Infallible> {
    let result =
        required(&params, "path").and_then(|path| state.library.download_folder(&user, &path));
    respond(result)
}

#[instrument(
    name = "handlers.archive_folder",
    level = "info",
    skip(state, params),
    fields(user = %user)
)]
pub(crate) fn archive_folder(
    state: Arc<AppState>,
    user: String,
    params: HashMap<String, String>,
) -> Result<Response, Infallible> {
    match required(&params, "path").and_then(|path| state.library.archive_folder(&user, &path)) {
        Ok(archive) => Ok(attachment("application/zip", &archive.file_name, archive.content)),
        Err(e) => {
            tracing::error!("{}", e);
            Ok(e.into_response())
        }
    }
}

#[instrument(
    name = "handlers.delete_folder",
    level = "info",
    skip(state, params),
    fields(user = %user)
)]
pub(crate) fn delete_folder(
    state: Arc<AppState>,
    user: String,
    params: HashMap<String, String>,
) -> Result<Response, Infallible> {
    let result = required(&params, "path")
        .and_then(|path| state.library.delete_folder(&user, &path))
        .map(|removed| Removed {
            removed: removed.len(),
        });
    respond(result)
}

#[instrument(
    name = "handlers.list_smart_folders",
    level = "info",
    skip(state),
    fields(user = %user)
)]
pub(crate) fn list_smart_folders(
    state: Arc<AppState>,
    user: String,
) -> Result<Response, Infallible> {
    respond(state.library.list_smart_folders(&user))
}

#[instrument(
    name = "handlers.create_smart_folder",
    level = "info",
    skip(state, request),
    fields(user = %user)
)]
pub(crate) fn create_smart_folder(
    state: Arc<AppState>,
    user: String,
    request: NewSmartFolder,
) -> Result<Response, Infallible> {
    created(state.library.create_smart_folder(&user, request))
}

#[instrument(
    name = "handlers.delete_smart_folder",
    level = "info",
    skip(state),
    fields(user = %user, id = %id)
)]
pub(crate) fn delete_smart_folder(
    state: Arc<AppState>,
    user: String,
    id: String,
) -> Result<Response, Infallible> {
    respond(state.library.remove_smart_folder(&user, &id))
}

#[instrument(
    name = "handlers.retag_smart_folder",
    level = "info",
    skip(state, tags),
    fields(user = %user, id = %id)
)]
pub(crate) fn retag_smart_folder(
    state: Arc<AppState>,
    user: String,
    id: String,
    tags: Vec<String>,
) -> Result<Response, Infallible> {
    respond(state.library.retag_smart_folder(&user, &id, &tags))
}

#[instrument(
    name = "handlers.smart_folder_files",
    level = "info",
    skip(state),
    fields(user = %user, id = %id)
)]
pub(crate) fn smart_folder_files(
    state: Arc<AppState>,
    user: String,
    id: String,
) -> Result<Response, Infallible> {
    respond(state.library.smart_folder_files(&user, &id))
}
