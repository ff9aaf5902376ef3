//! Static file serving using rust-embed.
//!
//! The status page (HTML, JS, CSS) is embedded into the binary at compile
//! time.

use axum::{
    body::Body,
    extract::Path,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

/// Embedded static assets for the status page.
#[derive(RustEmbed)]
#[folder = "src/web/assets/"]
#[include = "*.html"]
#[include = "*.js"]
#[include = "*.css"]
#[include = "*.ico"]
#[include = "*.svg"]
pub struct Assets;

/// GET / - the status page.
pub async fn serve_index() -> impl IntoResponse {
    serve_file("index.html")
}

/// GET /static/{*path} - a named asset.
pub async fn serve_static(Path(path): Path<String>) -> impl IntoResponse {
    serve_file(path.trim_start_matches('/'))
}

/// Fallback for unknown routes.
pub async fn not_found() -> Response {
    plain(StatusCode::NOT_FOUND, "Not Found")
}

fn serve_file(path: &str) -> Response {
    let Some(content) = Assets::get(path) else {
        return plain(StatusCode::NOT_FOUND, "Not Found");
    };
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    (
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, cache_control_for(path).to_string()),
        ],
        Body::from(content.data.into_owned()),
    )
        .into_response()
}

fn plain(status: StatusCode, body: &'static str) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
}

/// Check if path has a specific extension (case-insensitive).
fn has_extension(path: &str, ext: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Get appropriate cache-control header for a file type.
fn cache_control_for(path: &str) -> &'static str {
    if has_extension(path, "html") {
        "no-cache, no-store, must-revalidate"
    } else if has_extension(path, "js") || has_extension(path, "css") {
        "public, max-age=3600"
    } else {
        "public, max-age=86400"
    }
}
