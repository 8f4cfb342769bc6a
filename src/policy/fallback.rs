//! Responses synthesized when neither network nor cache can answer.

use crate::net::message::Response;

const OFFLINE_HTML: &str =
    "<html><body><h1>Offline</h1><p>This page is not available offline.</p></body></html>";

const PLACEHOLDER_SVG: &str = concat!(
    r##"<svg width="200" height="200" xmlns="http://www.w3.org/2000/svg">"##,
    r##"<rect width="200" height="200" fill="#f0f0f0"/>"##,
    r##"<text x="50%" y="50%" text-anchor="middle" dy=".3em" fill="#999">Image unavailable</text>"##,
    "</svg>"
);

/// Minimal HTML page for documents.
pub fn offline_document() -> Response {
    Response::new(200)
        .with_header("content-type", "text/html")
        .with_body(OFFLINE_HTML)
}

/// 200x200 neutral placeholder for images.
pub fn placeholder_image() -> Response {
    Response::new(200)
        .with_header("content-type", "image/svg+xml")
        .with_body(PLACEHOLDER_SVG)
}

/// Empty 404.
pub fn not_found() -> Response {
    Response::new(404)
}
