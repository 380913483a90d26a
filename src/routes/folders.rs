use crate::folders::NewSmartFolder;
use crate::handlers;
use crate::server::AppState;
use std::collections::HashMap;
use std::sync::Arc;
use warp::Filter;

pub(super) fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    download_folder(state.clone())
        .or(archive_folder(state.clone()))
        .or(delete_folder(state.clone()))
        .or(list_smart_folders(state.clone()))
        .or(create_smart_folder(state.clone()))
        .or(delete_smart_folder(state.clone()))
        .or(retag_smart_folder(state.clone()))
        .or(smart_folder_files(state))
}

fn download_folder(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "folders" / "download")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .map(move |user, params: HashMap<String, String>| {
            handlers::download_folder(state.clone(), user, params)
        })
}

fn archive_folder(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "folders" / "archive")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .map(move |user, params: HashMap<String, String>| {
            handlers::archive_folder(state.clone(), user, params)
        })
}

fn delete_folder(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "folders")
        .and(warp::delete())
        .and(warp::query::<HashMap<String, String>>())
        .map(move |user, params: HashMap<String, String>| {
            handlers::delete_folder(state.clone(), user, params)
        })
}

fn list_smart_folders(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "smart-folders")
        .and(warp::get())
        .map(move |user| handlers::list_smart_folders(state.clone(), user))
}

fn create_smart_folder(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "smart-folders")
        .and(warp::post())
        .and(warp::body::content_length_limit(super::JSON_BODY_LIMIT))
        .and(warp::body::json())
        .map(move |user, request: NewSmartFolder| {
            handlers::create_smart_folder(state.clone(), user, request)
        })
}

fn delete_smart_folder(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "smart-folders" / String)
        .and(warp::delete())
        .map(move |user, id| handlers::delete_smart_folder(state.clone(), user, id))
}

fn retag_smart_folder(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "smart-folders" / String / "tags")
        .and(warp::put())
        .and(super::tags_body())
        .map(move |user, id, tags| handlers::retag_smart_folder(state.clone(), user, id, tags))
}

fn smart_folder_files(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "smart-folders" / String / "files")
        .and(warp::get())
        .map(move |user, id| handlers::smart_folder_files(state.clone(), user, id))
}
