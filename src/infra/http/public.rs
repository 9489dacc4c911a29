use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::error;

use crate::{
    application::{
        error::{ErrorReport, HttpError},
        site::{PublicSiteService, SitePage},
    },
    infra::object_store::{FsObjectStore, ObjectStore, ObjectStoreError},
};

use super::middleware::{log_responses, set_request_context};

/// Response header reporting whether a page came from the page cache.
pub const CACHE_STATUS_HEADER: &str = "x-lectern-cache";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Clone)]
pub struct HttpState {
    pub site: Arc<PublicSiteService>,
    pub media: Arc<FsObjectStore>,
    /// Require a valid presigned query on every media request.
    pub signed_media: bool,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(homepage))
        .route("/_health", get(health))
        .route("/media/{*key}", get(serve_media))
        .route("/{slug}", get(content_page))
        .fallback(not_found)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn homepage(State(state): State<HttpState>) -> Response {
    site_response(state.site.homepage().await)
}

async fn content_page(State(state): State<HttpState>, Path(slug): Path<String>) -> Response {
    site_response(state.site.page(&slug).await)
}

async fn not_found(State(state): State<HttpState>) -> Response {
    // The empty slug is never valid, so this yields the site's 404 page.
    site_response(state.site.page("").await)
}

async fn health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SignatureQuery {
    expires: Option<i64>,
    signature: Option<String>,
}

async fn serve_media(
    State(state): State<HttpState>,
    Path(key): Path<String>,
    Query(query): Query<SignatureQuery>,
) -> Response {
    const SOURCE: &str = "infra::http::public::serve_media";

    if state.signed_media {
        let verified = match (query.expires, query.signature.as_deref()) {
            (Some(expires), Some(signature)) => {
                state.media.verify_signature(&key, expires, signature)
            }
            _ => false,
        };
        if !verified {
            return HttpError::new(
                SOURCE,
                StatusCode::FORBIDDEN,
                "Media link expired or invalid",
                format!("rejected signature for `{key}`"),
            )
            .into_response();
        }
    }

    match state.media.download(&key).await {
        Ok(bytes) => build_media_response(&key, bytes),
        Err(ObjectStoreError::NotFound { .. } | ObjectStoreError::InvalidKey { .. }) => {
            HttpError::new(
                SOURCE,
                StatusCode::NOT_FOUND,
                "Media not found",
                "The requested media is not available",
            )
            .into_response()
        }
        Err(err) => {
            error!(
                target = SOURCE,
                key = %key,
                error = %err,
                "failed to read stored media"
            );
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read media",
                &err,
            )
            .into_response()
        }
    }
}

fn site_response(page: SitePage) -> Response {
    const SOURCE: &str = "infra::http::public::site";

    let SitePage {
        status,
        body,
        cache,
    } = page;
    let length = body.len();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE));
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static(cache.as_str()));
    if !status.is_success() {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        ErrorReport::from_message(SOURCE, status, "served neutral fallback page")
            .attach(&mut response);
    }
    response
}

fn build_media_response(key: &str, bytes: Bytes) -> Response {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(key).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&length.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
