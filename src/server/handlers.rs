use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use super::AppState;
use crate::error::{FileCityError, Result};
use crate::lsof::OpenFileEntry;
use crate::metadata::{self, FileEntry, HexLine};
use crate::sandbox::ClientPath;

const DEFAULT_HEX_BYTES: usize = 256;
const FILE_INFO_HEX_BYTES: usize = 512;

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct HexQuery {
    pub path: String,
    pub max_bytes: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct OpenFilesQuery {
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FavouriteRequest {
    pub path: String,
    pub favourite: bool,
}

#[derive(Debug, Serialize)]
pub struct Capabilities {
    pub lsof_available: bool,
}

#[derive(Debug, Serialize)]
pub struct DirectoryListing {
    pub path: ClientPath,
    pub parent: Option<ClientPath>,
    pub items: Vec<FileEntry>,
}

#[derive(Debug, Serialize)]
pub struct HexPreview {
    pub path: ClientPath,
    pub lines: Vec<HexLine>,
}

pub async fn capabilities(State(state): State<Arc<AppState>>) -> Json<Capabilities> {
    Json(Capabilities {
        lsof_available: state.lsof.is_available(),
    })
}

pub async fn browse(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<BrowseQuery>, FileCityError>,
) -> Result<Json<DirectoryListing>> {
    let (client, absolute) = state.sandbox.locate(query.path.as_deref())?;
    if !absolute.is_dir() {
        return Err(FileCityError::InvalidInput("Path is not a directory".to_string()));
    }

    let favourites = state.favourites.load()?;
    let items = metadata::list_directory(&state.sandbox, &client, &absolute, &favourites)?;
    Ok(Json(DirectoryListing {
        parent: client.parent(),
        path: client,
        items,
    }))
}

pub async fn file_hex(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<HexQuery>, FileCityError>,
) -> Result<Json<HexPreview>> {
    let (client, absolute) = state.sandbox.locate(Some(&query.path))?;
    if !absolute.is_file() {
        return Err(FileCityError::InvalidInput("Path is not a file".to_string()));
    }

    let max_bytes = query.max_bytes.unwrap_or(DEFAULT_HEX_BYTES);
    let lines = metadata::hex_preview(&absolute, max_bytes)
        .ok_or_else(|| FileCityError::NotFound("Unable to read file contents".to_string()))?;
    Ok(Json(HexPreview {
        path: client,
        lines,
    }))
}

pub async fn file_preview(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<PathQuery>, FileCityError>,
) -> Result<Response> {
    let (_, absolute) = state.sandbox.locate(Some(&query.path))?;
    if !absolute.is_file() {
        return Err(FileCityError::InvalidInput("Path is not a file".to_string()));
    }

    let file = tokio::fs::File::open(&absolute)
        .await
        .map_err(|_| FileCityError::NotFound("Unable to read file contents".to_string()))?;
    let content_type = metadata::guess_mime(&absolute)
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok((
        [(CONTENT_TYPE, content_type)],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

pub async fn list_favourites(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ClientPath>>> {
    Ok(Json(state.favourites.load()?.into_iter().collect()))
}

pub async fn set_favourite(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(request), _): WithRejection<Json<FavouriteRequest>, FileCityError>,
) -> Result<Json<Vec<ClientPath>>> {
    let path = ClientPath::parse(Some(&request.path))?;
    let favourites = state
        .favourites
        .set_favourite(&state.sandbox, &path, request.favourite)?;
    Ok(Json(favourites.into_iter().collect()))
}

pub async fn open_files(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<OpenFilesQuery>, FileCityError>,
) -> Result<Json<Vec<OpenFileEntry>>> {
    let (_, absolute) = state.sandbox.locate(query.directory.as_deref())?;
    if !absolute.is_dir() {
        return Err(FileCityError::InvalidInput("Path is not a directory".to_string()));
    }
    Ok(Json(state.lsof.entries_for(&absolute)?))
}

pub async fn file_info(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<PathQuery>, FileCityError>,
) -> Result<Json<FileEntry>> {
    let (client, absolute) = state.sandbox.locate(Some(&query.path))?;
    let favourites = state.favourites.load()?;

    let name = match client.segments().last() {
        Some(name) => name.clone(),
        None => state
            .sandbox
            .root()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string()),
    };

    let mut entry = FileEntry::describe(name, client, &absolute, &favourites)
        .map_err(|e| FileCityError::AccessDenied(format!("Cannot access file: {}", e)))?;
    if !entry.is_directory {
        entry.hex_preview = metadata::hex_preview(&absolute, FILE_INFO_HEX_BYTES);
    }
    Ok(Json(entry))
}
