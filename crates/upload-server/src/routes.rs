//! Route configuration.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Creates the application router serving probes and deliveries at `route`.
///
/// `route` must start with `/`; [`UploadServer`](crate::UploadServer)
/// validates it before calling this.
pub fn create_router(state: AppState, route: &str, max_request_bytes: usize) -> Router {
    Router::new()
        .route(
            route,
            get(handlers::probe_chunk).post(handlers::deliver_chunk),
        )
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use resumable_protocol::UploadId;
    use resumable_transfer::{Layout, TransferOptions, UploadCoordinator};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "resumable-test-boundary";

    fn router(dir: &TempDir, max_request_bytes: usize) -> Router {
        let layout = Layout::new(dir.path().join("tmp"), dir.path().join("files"));
        let coordinator = Arc::new(UploadCoordinator::new(layout, TransferOptions::default()));
        create_router(AppState::new(coordinator), "/upload", max_request_bytes)
    }

    fn multipart(fields: &[(&str, &str)], files: &[&[u8]]) -> Body {
        let mut body = multipart_bytes(fields, files);
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    /// Form parts without the closing boundary.
    fn multipart_bytes(fields: &[(&str, &str)], files: &[&[u8]]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for data in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"blob\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body
    }

    fn chunk_fields<'a>(
        filename: &'a str,
        index: &'a str,
        total_chunks: &'a str,
        total_size: &'a str,
    ) -> [(&'a str, &'a str); 4] {
        [
            ("resumableFilename", filename),
            ("resumableChunkNumber", index),
            ("resumableTotalChunks", total_chunks),
            ("resumableTotalSize", total_size),
        ]
    }

    async fn post(router: &Router, uri: &str, body: Body) -> StatusCode {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(body)
            .unwrap();
        router.clone().oneshot(request).await.unwrap().status()
    }

    async fn get(router: &Router, uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        router.clone().oneshot(request).await.unwrap().status()
    }

    async fn deliver(
        router: &Router,
        filename: &str,
        index: u32,
        total_chunks: u32,
        total_size: u64,
        data: &[u8],
    ) -> StatusCode {
        let index = index.to_string();
        let total_chunks = total_chunks.to_string();
        let total_size = total_size.to_string();
        let body = multipart(
            &[
                ("resumableChunkNumber", index.as_str()),
                ("resumableChunkSize", "100"),
                ("resumableCurrentChunkSize", "100"),
                ("resumableTotalSize", total_size.as_str()),
                ("resumableType", "application/pdf"),
                ("resumableIdentifier", ""),
                ("resumableFilename", filename),
                ("resumableRelativePath", filename),
                ("resumableTotalChunks", total_chunks.as_str()),
            ],
            &[data],
        );
        post(router, "/upload", body).await
    }

    fn working_dir(dir: &TempDir, filename: &str) -> std::path::PathBuf {
        dir.path()
            .join("tmp")
            .join(UploadId::derive(filename).as_str())
    }

    fn is_empty_dir(path: &Path) -> bool {
        std::fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[tokio::test]
    async fn probe_without_filename_is_400() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 1024 * 1024);
        assert_eq!(
            get(&router, "/upload?resumableChunkNumber=1").await,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get(&router, "/upload?resumableFilename=&resumableChunkNumber=1").await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn probe_reports_absent_then_present() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 1024 * 1024);
        let probe = "/upload?resumableFilename=a.bin&resumableChunkNumber=1";

        assert_eq!(get(&router, probe).await, StatusCode::NOT_FOUND);
        assert!(!working_dir(&dir, "a.bin").exists());

        assert_eq!(
            deliver(&router, "a.bin", 1, 2, 8, b"abcd").await,
            StatusCode::OK
        );
        assert_eq!(get(&router, probe).await, StatusCode::OK);
        assert_eq!(
            get(&router, "/upload?resumableFilename=a.bin&resumableChunkNumber=2").await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn out_of_order_delivery_assembles_report() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 1024 * 1024);
        let c1 = vec![b'1'; 100];
        let c2 = vec![b'2'; 100];
        let c3 = vec![b'3'; 50];

        for (index, data) in [(2, &c2), (1, &c1), (3, &c3)] {
            assert_eq!(
                deliver(&router, "report.pdf", index, 3, 250, data).await,
                StatusCode::OK
            );
        }

        let assembled = std::fs::read(dir.path().join("files").join("report.pdf")).unwrap();
        assert_eq!(assembled, [c1, c2, c3].concat());
        assert!(!working_dir(&dir, "report.pdf").exists());
        assert!(is_empty_dir(&dir.path().join("tmp")));
    }

    #[tokio::test]
    async fn partial_upload_stays_pending() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 1024 * 1024);

        assert_eq!(
            deliver(&router, "half.bin", 1, 2, 200, &[0u8; 100]).await,
            StatusCode::OK
        );
        assert!(!dir.path().join("files").join("half.bin").exists());
        assert!(working_dir(&dir, "half.bin").exists());
    }

    #[tokio::test]
    async fn delivery_without_file_part_is_400() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 1024 * 1024);
        let body = multipart(&chunk_fields("a.bin", "1", "1", "4"), &[]);
        assert_eq!(post(&router, "/upload", body).await, StatusCode::BAD_REQUEST);
        assert!(!working_dir(&dir, "a.bin").exists());
    }

    #[tokio::test]
    async fn truncated_second_file_part_keeps_the_first() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 1024 * 1024);

        let mut body = multipart_bytes(&chunk_fields("x.bin", "1", "2", "8"), &[b"good"]);
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"blob\"\r\n\r\nbad"
            )
            .as_bytes(),
        );

        assert_eq!(
            post(&router, "/upload", Body::from(body)).await,
            StatusCode::OK
        );
        assert_eq!(
            get(&router, "/upload?resumableFilename=x.bin&resumableChunkNumber=1").await,
            StatusCode::OK
        );
        let stored = std::fs::read(working_dir(&dir, "x.bin").join("x.bin.part.1")).unwrap();
        assert_eq!(stored, b"good");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unwritable_scratch_root_is_500() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let router = router(&dir, 1024 * 1024);
        let scratch = dir.path().join("tmp");
        std::fs::create_dir_all(&scratch).unwrap();
        std::fs::set_permissions(&scratch, std::fs::Permissions::from_mode(0o500)).unwrap();
        // Permission bits are not enforced for root.
        let enforced = std::fs::File::create(scratch.join("canary")).is_err();

        let status = deliver(&router, "locked.bin", 1, 2, 200, &[1u8; 100]).await;
        let probe = get(
            &router,
            "/upload?resumableFilename=locked.bin&resumableChunkNumber=1",
        )
        .await;
        std::fs::set_permissions(&scratch, std::fs::Permissions::from_mode(0o700)).unwrap();

        if enforced {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(probe, StatusCode::NOT_FOUND);
            assert!(!working_dir(&dir, "locked.bin").exists());
        } else {
            assert_eq!(status, StatusCode::OK);
            assert_eq!(probe, StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn traversal_filename_is_rejected() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 1024 * 1024);
        assert_eq!(
            deliver(&router, "../escape.bin", 1, 1, 4, b"evil").await,
            StatusCode::BAD_REQUEST
        );
        assert!(!dir.path().join("escape.bin").exists());
        assert!(is_empty_dir(&dir.path().join("tmp")));
    }

    #[tokio::test]
    async fn missing_totals_are_rejected() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 1024 * 1024);
        let body = multipart(
            &[("resumableFilename", "a.bin"), ("resumableChunkNumber", "1")],
            &[b"data"],
        );
        assert_eq!(post(&router, "/upload", body).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn query_string_parameters_are_accepted() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 1024 * 1024);
        let uri = "/upload?resumableFilename=q.bin&resumableChunkNumber=1\
                   &resumableTotalChunks=1&resumableTotalSize=5";
        assert_eq!(
            post(&router, uri, multipart(&[], &[b"query"])).await,
            StatusCode::OK
        );
        assert_eq!(
            std::fs::read(dir.path().join("files").join("q.bin")).unwrap(),
            b"query"
        );
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 1024);
        assert_eq!(
            deliver(&router, "big.bin", 1, 1, 4096, &[7u8; 4096]).await,
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert!(!dir.path().join("files").join("big.bin").exists());
    }

    #[tokio::test]
    async fn other_methods_are_not_allowed() {
        let dir = TempDir::new().unwrap();
        let router = router(&dir, 1024);
        let request = Request::builder()
            .method("PUT")
            .uri("/upload")
            .body(Body::empty())
            .unwrap();
        let status = router.oneshot(request).await.unwrap().status();
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
