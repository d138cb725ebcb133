//! HTTP routes.
//!
//! - `PUT /{filename}` streams the body into storage and answers with the
//!   retrieval and delete URLs.
//! - `GET /{file_id}` / `HEAD /{file_id}` serve a stored file.
//! - `DELETE /delete/{delete_id}` removes an upload.
//! - `GET /list_files` lists every stored file as JSON.
//!
//! `admit_expectation` runs in the connection layer (see `server`) so a
//! client waiting on `Expect: 100-continue` hears about a rejected upload
//! before it sends the body.

use actix_http::{HttpMessage, Request};
use actix_web::body::SizedStream;
use actix_web::http::header::{self, HeaderMap};
use actix_web::http::Method;
use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder};
use bytes::Bytes;
use log::debug;
use serde::Serialize;

use crate::app_state::AppState;
use crate::error::DropError;
use crate::service::download::OpenedFile;
use crate::service::upload::{UploadRequest, UploadService};

/// Register all routes. `/list_files` and `/delete/..` must come before the
/// catch-all `/{name}` resource. A PUT to `/list_files` is still an upload.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/list_files")
            .route(web::get().to(list_files))
            .route(web::put().to(put_file)),
    )
        .service(web::resource("/delete/{delete_id}").route(web::delete().to(delete_file)))
        .service(
            web::resource("/{name}")
                .route(web::put().to(put_file))
                .route(web::get().to(get_file))
                .route(web::head().to(head_file)),
        );
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn client_address(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Decide whether an upload may proceed before its body is read. Anything
/// other than a single-segment PUT passes through to the router.
pub fn admit_expectation(uploads: &UploadService, req: &Request) -> Result<(), DropError> {
    if *req.method() != Method::PUT {
        return Ok(());
    }
    let name = req.path().trim_start_matches('/');
    // Percent-encoded names are decoded by the router; leave those to the handler.
    if name.is_empty() || name.contains('/') || name.contains('%') {
        return Ok(());
    }
    uploads.admit(name, declared_length(req.headers()))?;
    Ok(())
}

async fn put_file(
    path: web::Path<String>,
    payload: web::Payload,
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, DropError> {
    let filename = path.into_inner();
    let request = UploadRequest {
        filename: &filename,
        remote_addr: client_address(&req),
        content_length: declared_length(req.headers()),
    };
    debug!("PUT {} ({:?} bytes declared)", filename, request.content_length);

    let receipt = app_state.uploads.ingest(request, payload).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(receipt.message()))
}

/// Status line and headers shared by GET and HEAD.
fn file_response(opened: &OpenedFile) -> HttpResponseBuilder {
    let mut builder = HttpResponse::Ok();
    builder
        .content_type("application/octet-stream")
        .insert_header((header::CONTENT_DISPOSITION, opened.content_disposition()))
        .no_chunking(opened.size);
    if let Some(checksum) = &opened.record.checksum {
        builder.insert_header((header::ETAG, format!("\"{}\"", checksum)));
    }
    builder
}

async fn get_file(path: web::Path<String>, app_state: web::Data<AppState>) -> Result<HttpResponse, DropError> {
    let opened = app_state.downloads.open(&path.into_inner()).await?;
    let mut response = file_response(&opened);
    Ok(response.streaming(opened.into_stream(app_state.downloads.chunk_size())))
}

async fn head_file(path: web::Path<String>, app_state: web::Data<AppState>) -> Result<HttpResponse, DropError> {
    let opened = app_state.downloads.open(&path.into_inner()).await?;
    let size = opened.size;
    let mut response = file_response(&opened);
    // Sized but empty: Content-Length reflects the file, no bytes are sent.
    let no_body = futures::stream::empty::<Result<Bytes, std::io::Error>>();
    Ok(response.body(SizedStream::new(size, no_body)))
}

async fn delete_file(path: web::Path<String>, app_state: web::Data<AppState>) -> Result<HttpResponse, DropError> {
    let body = match app_state.deletions.delete_by_token(&path.into_inner()).await? {
        Some(record) => format!("Deleted {}\n", record.file_id),
        None => "Nothing to delete\n".to_string(),
    };
    Ok(HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(body))
}

#[derive(Serialize)]
struct ListedFile {
    url: String,
    name: String,
}

async fn list_files(app_state: web::Data<AppState>) -> Result<HttpResponse, DropError> {
    let base_url = &app_state.config.server.base_url;
    let files: Vec<ListedFile> = app_state
        .metadata
        .list_all()?
        .into_iter()
        .map(|record| ListedFile {
            url: format!("{}{}", base_url, record.file_id),
            name: record.original_name,
        })
        .collect();
    Ok(HttpResponse::Ok().json(files))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::extension::ExtensionValidator;
    use crate::metadata::mock_store::MockMetadataStore;
    use crate::storage::config::StorageConfig;
    use crate::storage::local_store::LocalFileStore;
    use actix_web::test::TestRequest;
    use std::sync::Arc;

    fn uploads(dir: &std::path::Path) -> UploadService {
        let storage = StorageConfig {
            upload_dir: dir.join("uploads").to_string_lossy().into_owned(),
            chunk_size: 16,
            allowed_extensions: vec!["txt".to_string()],
        };
        UploadService::new(
            Arc::new(MockMetadataStore::new()),
            Arc::new(LocalFileStore::new(&storage).unwrap()),
            ExtensionValidator::new(&storage.allowed_extensions),
            16,
            64,
            "http://drop.test/".to_string(),
        )
    }

    fn expecting(method: Method, uri: &str, length: &str) -> Request {
        actix_http::test::TestRequest::default()
            .method(method)
            .uri(uri)
            .insert_header((header::CONTENT_LENGTH, length))
            .insert_header((header::EXPECT, "100-continue"))
            .finish()
    }

    #[test]
    fn test_declared_length() {
        let req = TestRequest::default()
            .insert_header((header::CONTENT_LENGTH, "17"))
            .to_http_request();
        assert_eq!(declared_length(req.headers()), Some(17));

        let req = TestRequest::default().to_http_request();
        assert_eq!(declared_length(req.headers()), None);
    }

    #[test]
    fn test_client_address() {
        let req = TestRequest::default()
            .peer_addr("192.168.1.20:5000".parse().unwrap())
            .to_http_request();
        assert_eq!(client_address(&req), "192.168.1.20");
        assert_eq!(client_address(&TestRequest::default().to_http_request()), "unknown");
    }

    #[test]
    fn test_admit_expectation() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = uploads(dir.path());

        assert!(admit_expectation(&uploads, &expecting(Method::PUT, "/notes.txt", "10")).is_ok());
        assert!(matches!(
            admit_expectation(&uploads, &expecting(Method::PUT, "/setup.exe", "2")),
            Err(DropError::Rejected(_))
        ));
        assert!(matches!(
            admit_expectation(&uploads, &expecting(Method::PUT, "/huge.txt", "65")),
            Err(DropError::PayloadTooLarge { limit: 64 })
        ));
        // Not an upload, or left to the handler
        assert!(admit_expectation(&uploads, &expecting(Method::GET, "/setup.exe", "0")).is_ok());
        assert!(admit_expectation(&uploads, &expecting(Method::PUT, "/delete/abc", "0")).is_ok());
        assert!(admit_expectation(&uploads, &expecting(Method::PUT, "/a%2Eexe", "1")).is_ok());
    }
}
