use crate::handlers;
use crate::server::AppState;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use warp::Filter;

pub(super) fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    search_files(state.clone())
        .or(upload_file(state.clone()))
        .or(upload_many(state.clone()))
        .or(get_tree(state.clone()))
        .or(get_usage(state.clone()))
        .or(get_file(state.clone()))
        .or(get_content(state.clone()))
        .or(delete_file(state.clone()))
        .or(update_tags(state))
}

fn search_files(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "files")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .map(move |user, params: HashMap<String, String>| {
            handlers::search_files(state.clone(), user, params)
        })
}

fn upload_file(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let limit = state.library.quota().hard_limit();
    warp::path!("users" / String / "files")
        .and(warp::post())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::body::content_length_limit(limit))
        .and(warp::body::bytes())
        .map(move |user, params: HashMap<String, String>, body: Bytes| {
            handlers::upload_file(state.clone(), user, params, body)
        })
}

fn upload_many(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let limit = state.library.quota().hard_limit();
    warp::path!("users" / String / "uploads")
        .and(warp::post())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::multipart::form().max_length(limit))
        .and_then(move |user, params: HashMap<String, String>, form| {
            let state = state.clone();
            async move { handlers::upload_many(state, user, params, form).await }
        })
}

fn get_tree(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "tree")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .map(move |user, params: HashMap<String, String>| {
            handlers::get_tree(state.clone(), user, params)
        })
}

fn get_usage(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "usage")
        .and(warp::get())
        .map(move |user| handlers::get_usage(state.clone(), user))
}

fn get_file(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "files" / String)
        .and(warp::get())
        .map(move |user, id| handlers::get_file(state.clone(), user, id))
}

fn get_content(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "files" / String / "content")
        .and(warp::get())
        .map(move |user, id| handlers::get_content(state.clone(), user, id))
}

fn delete_file(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "files" / String)
        .and(warp::delete())
        .map(move |user, id| handlers::delete_file(state.clone(), user, id))
}

fn update_tags(
    state: Arc<AppState>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("users" / String / "files" / String / "tags")
        .and(warp::put())
        .and(super::tags_body())
        .map(move |user, id, tags| handlers::update_file_tags(state.clone(), user, id, tags))
}
