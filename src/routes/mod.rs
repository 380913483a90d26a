mod files;
mod folders;

use crate::handlers;
use crate::server::AppState;
use std::sync::Arc;
use warp::Filter;

const JSON_BODY_LIMIT: u64 = 64 * 1024;

pub(crate) fn routes(
    state: Arc<AppState>,
) -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    version()
        .or(files::routes(state.clone()))
        .or(folders::routes(state))
        .with(warp::trace::request())
}

fn version() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("version")
        .and(warp::get())
        .and_then(|| async { handlers::get_version() })
}

fn tags_body() -> impl Filter<Extract = (Vec<String>,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(JSON_BODY_LIMIT).and(warp::body::json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::test_library;
    use crate::live::LiveRegistry;
    use crate::quota::QuotaPolicy;
    use crate::records::FileRecord;
    use serde_json::Value;
    use std::time::Duration;
    use warp::http::StatusCode;

    fn state(dir: &std::path::Path) -> Arc<AppState> {
        let library = Arc::new(test_library(dir, QuotaPolicy::default()));
        let live = LiveRegistry::new(library.store(), Duration::from_secs(3600));
        Arc::new(AppState { library, live })
    }

    async fn upload(
        state: &Arc<AppState>,
        user: &str,
        name: &str,
        body: &'static [u8],
    ) -> FileRecord {
        let response = warp::test::request()
            .method("POST")
            .path(&format!("/users/{}/files?name={}&tags=work,exam", user, name))
            .body(body)
            .reply(&routes(state.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        serde_json::from_slice(response.body()).unwrap()
    }

    fn json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn version_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let response = warp::test::request()
            .path("/version")
            .reply(&routes(state(dir.path())))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response.body()), env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn upload_then_search_and_tree() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let report = upload(&state, "alice", "docs/Project_Policynth.pdf", b"pdf").await;
        upload(&state, "alice", "docs/images/cover.png", b"png").await;
        assert_eq!(report.tags, vec!["work", "exam"]);

        let filter = routes(state.clone());
        let response = warp::test::request()
            .path("/users/alice/files?q=exam%20tomorrow%20policynth")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let found = json(response.body());
        assert_eq!(found["total"], 1);
        assert_eq!(found["files"][0]["id"], report.id.as_str());

        let response = warp::test::request()
            .path("/users/alice/files?kind=image")
            .reply(&filter)
            .await;
        assert_eq!(json(response.body())["total"], 1);

        let response = warp::test::request()
            .path("/users/alice/files?kind=spreadsheet")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = warp::test::request()
            .path("/users/alice/tree")
            .reply(&filter)
            .await;
        let tree = json(response.body());
        assert_eq!(tree["folders"], 2);
        assert_eq!(tree["files"], 2);
        let paths: Vec<&str> = tree["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["path"].as_str().unwrap())
            .collect();
        assert_eq!(
            paths,
            vec!["docs", "docs/images", "docs/images/cover.png", "docs/Project_Policynth.pdf"]
        );
    }

    #[tokio::test]
    async fn content_download_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let filter = routes(state.clone());
        let record = upload(&state, "bob", "notes.txt", b"hello").await;

        let response = warp::test::request()
            .path(&format!("/users/bob/files/{}/content", record.id))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&response.body()[..], b"hello");
        assert_eq!(response.headers()["content-type"], "text/plain");

        let response = warp::test::request()
            .method("PUT")
            .path(&format!("/users/bob/files/{}/tags", record.id))
            .json(&vec!["a", "a", "b"])
            .reply(&filter)
            .await;
        assert_eq!(json(response.body())["tags"], serde_json::json!(["a", "b"]));

        let response = warp::test::request()
            .method("DELETE")
            .path(&format!("/users/bob/files/{}", record.id))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = warp::test::request()
            .path(&format!("/users/bob/files/{}", record.id))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_name_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = warp::test::request()
            .method("POST")
            .path("/users/carol/files")
            .body("data")
            .reply(&routes(state(dir.path())))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn folder_download_and_delete_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let filter = routes(state.clone());
        upload(&state, "dave", "trip/day1.jpg", b"1").await;
        upload(&state, "dave", "trip/day2.jpg", b"22").await;
        upload(&state, "dave", "tripod.txt", b"3").await;

        let response = warp::test::request()
            .path("/users/dave/folders/download?path=trip")
            .reply(&filter)
            .await;
        let manifest = json(response.body());
        assert_eq!(manifest["folder"], "trip");
        assert_eq!(manifest["total_size"], 3);
        assert_eq!(manifest["entries"].as_array().unwrap().len(), 2);

        let response = warp::test::request()
            .method("DELETE")
            .path("/users/dave/folders?path=trip")
            .reply(&filter)
            .await;
        assert_eq!(json(response.body())["removed"], 2);

        let response = warp::test::request()
            .path("/users/dave/usage")
            .reply(&filter)
            .await;
        let usage = json(response.body());
        assert_eq!(usage["used"], 1);
        assert_eq!(usage["over_limit"], false);
    }

    #[tokio::test]
    async fn folder_archive_is_an_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let filter = routes(state.clone());
        upload(&state, "gus", "trip/day1.jpg", b"1").await;
        upload(&state, "gus", "trip/notes/plan.txt", b"22").await;

        let response = warp::test::request()
            .path("/users/gus/folders/archive?path=trip")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/zip");
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"trip.zip\""
        );
        let archive =
            zip::ZipArchive::new(std::io::Cursor::new(response.body().to_vec())).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(names, vec!["day1.jpg", "notes/plan.txt"]);

        let response = warp::test::request()
            .path("/users/gus/folders/archive?path=elsewhere")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unnamed_folders_are_addressed_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let filter = routes(state.clone());
        upload(&state, "hana", "a//b.txt", b"1").await;
        upload(&state, "hana", "a/c.txt", b"2").await;
        upload(&state, "hana", "/root.txt", b"3").await;

        let response = warp::test::request()
            .path("/users/hana/tree?path=a/")
            .reply(&filter)
            .await;
        let subtree = json(response.body());
        assert_eq!(subtree["files"], 1);
        assert_eq!(subtree["entries"][0]["path"], "a//b.txt");

        let response = warp::test::request()
            .path("/users/hana/tree?path=a/c.txt")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = warp::test::request()
            .method("DELETE")
            .path("/users/hana/folders?path=a/")
            .reply(&filter)
            .await;
        assert_eq!(json(response.body())["removed"], 1);

        let response = warp::test::request()
            .method("DELETE")
            .path("/users/hana/folders?path=")
            .reply(&filter)
            .await;
        assert_eq!(json(response.body())["removed"], 1);

        let left: Vec<FileRecord> = state.library.list_files("hana").unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].name, "a/c.txt");
    }

    #[tokio::test]
    async fn smart_folder_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let filter = routes(state.clone());
        upload(&state, "erin", "song.mp3", b"la").await;

        let response = warp::test::request()
            .method("POST")
            .path("/users/erin/smart-folders")
            .json(&serde_json::json!({"name": "Music", "auto_extensions": [".mp3"]}))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json(response.body())["id"].as_str().unwrap().to_string();

        let response = warp::test::request()
            .path(&format!("/users/erin/smart-folders/{}/files", id))
            .reply(&filter)
            .await;
        assert_eq!(json(response.body()).as_array().unwrap().len(), 1);

        let response = warp::test::request()
            .method("PUT")
            .path(&format!("/users/erin/smart-folders/{}/tags", id))
            .json(&vec!["chill"])
            .reply(&filter)
            .await;
        assert_eq!(json(response.body())["tags"], serde_json::json!(["chill"]));

        let response = warp::test::request()
            .method("DELETE")
            .path(&format!("/users/erin/smart-folders/{}", id))
            .reply(&filter)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = warp::test::request()
            .path("/users/erin/smart-folders")
            .reply(&filter)
            .await;
        assert!(json(response.body()).as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn multipart_batch_upload() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        let boundary = "SHELFBOUNDARY";
        let part = |name: &str, content: &str| {
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                 Content-Type: text/plain\r\n\r\n{}\r\n",
                boundary, name, content
            )
        };
        let body = format!("{}{}--{}--\r\n", part("a.txt", "AAA"), part("b.txt", "BB"), boundary);
        let response = warp::test::request()
            .method("POST")
            .path("/users/fay/uploads?tags=trip")
            .header("content-type", format!("multipart/form-data; boundary={}", boundary))
            .body(body)
            .reply(&routes(state.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let uploaded = json(response.body());
        assert_eq!(uploaded.as_array().unwrap().len(), 2);
        assert_eq!(uploaded[0]["name"], "a.txt");
        assert_eq!(uploaded[0]["size"], 3);
        assert_eq!(uploaded[0]["tags"], serde_json::json!(["trip"]));
    }
}
