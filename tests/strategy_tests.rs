//! Integration tests for request routing and the strategy executors.

mod common;

use std::sync::atomic::Ordering;

use common::{ok, url, Harness};
use offline_cache_layer::cache::CacheStore;
use offline_cache_layer::net::{Destination, Method, RequestDescriptor, Response};
use offline_cache_layer::policy::{PassThroughReason, ResponseSource, StrategyOutcome};
use offline_cache_layer::FetchOutcome;
use url::Url;

const STATIC: &str = "static-cache-v1";
const DYNAMIC: &str = "dynamic-cache-v1";

fn request(path: &str, dest: Destination) -> RequestDescriptor {
    RequestDescriptor::get(url(path)).with_destination(dest)
}

async fn serve(h: &Harness, req: RequestDescriptor) -> StrategyOutcome {
    match h.layer.handle_fetch(&req).await {
        FetchOutcome::Responded(outcome) => outcome,
        FetchOutcome::PassThrough(reason) => panic!("unexpected pass-through: {reason:?}"),
    }
}

#[tokio::test]
async fn test_non_get_passes_through_without_side_effects() {
    let h = Harness::new(&[]);
    h.fetcher.respond("/contact/", ok("thanks", "text/html"));

    let req = RequestDescriptor::new(Method::Post, url("/contact/"))
        .with_destination(Destination::Document)
        .with_body("name=a");
    let outcome = h.layer.handle_fetch(&req).await;

    assert!(matches!(
        outcome,
        FetchOutcome::PassThrough(PassThroughReason::UnsafeMethod)
    ));
    assert!(h.fetcher.calls().is_empty());
    assert!(h.store.list_partition_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cross_origin_passes_through() {
    let h = Harness::new(&[]);
    let req = RequestDescriptor::get(Url::parse("https://cdn.test/lib.js").unwrap())
        .with_destination(Destination::Script);

    assert!(matches!(
        h.layer.handle_fetch(&req).await,
        FetchOutcome::PassThrough(PassThroughReason::CrossOrigin)
    ));
    assert!(h.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_document_network_success_is_stored() {
    let h = Harness::new(&[]);
    h.fetcher.respond("/posts/", ok("<h1>Posts</h1>", "text/html"));

    let outcome = serve(&h, request("/posts/", Destination::Document)).await;

    assert_eq!(outcome.source, ResponseSource::Network);
    assert_eq!(outcome.response.body.as_ref(), b"<h1>Posts</h1>");

    let stored = h.cached(DYNAMIC, "/posts/").await.unwrap();
    assert_eq!(stored.body().as_ref(), b"<h1>Posts</h1>");
    assert_eq!(stored.status(), 200);
}

#[tokio::test]
async fn test_document_non_success_not_stored() {
    let h = Harness::new(&[]);
    h.fetcher.respond("/missing/", Response::new(404).with_body("nope"));

    let outcome = serve(&h, request("/missing/", Destination::Document)).await;

    assert_eq!(outcome.source, ResponseSource::Network);
    assert_eq!(outcome.response.status, 404);
    assert!(h.cached(DYNAMIC, "/missing/").await.is_none());
}

#[tokio::test]
async fn test_document_offline_served_from_cache() {
    let h = Harness::new(&[]);
    h.fetcher.respond("/about/", ok("about v1", "text/html"));
    serve(&h, request("/about/", Destination::Document)).await;

    h.fetcher.go_offline();
    let outcome = serve(&h, request("/about/", Destination::Document)).await;

    assert_eq!(outcome.source, ResponseSource::Cache);
    assert_eq!(outcome.response.body.as_ref(), b"about v1");
}

#[tokio::test]
async fn test_document_offline_uses_precached_page() {
    let h = Harness::new(&[]);
    h.seed(STATIC, "/", ok("home", "text/html")).await;

    let outcome = serve(&h, request("/", Destination::Document)).await;

    assert_eq!(outcome.source, ResponseSource::Cache);
    assert_eq!(outcome.response.body.as_ref(), b"home");
}

#[tokio::test]
async fn test_document_offline_falls_back_to_offline_document() {
    let h = Harness::new(&[]);
    h.seed(STATIC, "/offline.html", ok("you are offline", "text/html"))
        .await;

    let outcome = serve(&h, request("/projects/", Destination::Document)).await;

    assert_eq!(outcome.source, ResponseSource::OfflineDocument);
    assert_eq!(outcome.response.body.as_ref(), b"you are offline");
}

#[tokio::test]
async fn test_document_total_failure_synthesizes_html() {
    let h = Harness::new(&[]);

    let outcome = serve(&h, request("/projects/", Destination::Document)).await;

    assert_eq!(outcome.source, ResponseSource::Synthesized);
    assert_eq!(outcome.response.status, 200);
    assert_eq!(outcome.response.content_type(), Some("text/html"));
    assert!(!outcome.response.body.is_empty());
}

#[tokio::test]
async fn test_image_cache_hit_skips_network() {
    let h = Harness::new(&[]);
    h.seed(DYNAMIC, "/images/a.png", ok("png-bytes", "image/png"))
        .await;
    h.fetcher.respond("/images/a.png", ok("fresh", "image/png"));

    let outcome = serve(&h, request("/images/a.png", Destination::Image)).await;

    assert_eq!(outcome.source, ResponseSource::Cache);
    assert_eq!(outcome.response.body.as_ref(), b"png-bytes");
    assert_eq!(h.fetcher.call_count("/images/a.png"), 0);
}

#[tokio::test]
async fn test_image_miss_fetches_and_stores() {
    let h = Harness::new(&[]);
    h.fetcher.respond("/images/b.png", ok("b", "image/png"));

    let first = serve(&h, request("/images/b.png", Destination::Image)).await;
    let second = serve(&h, request("/images/b.png", Destination::Image)).await;

    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(h.fetcher.call_count("/images/b.png"), 1);
}

#[tokio::test]
async fn test_image_total_failure_returns_placeholder() {
    let h = Harness::new(&[]);

    let outcome = serve(&h, request("/images/gone.png", Destination::Image)).await;

    assert_eq!(outcome.source, ResponseSource::Synthesized);
    assert_eq!(outcome.response.content_type(), Some("image/svg+xml"));
    assert!(std::str::from_utf8(&outcome.response.body)
        .unwrap()
        .contains("Image unavailable"));
}

#[tokio::test]
async fn test_asset_served_from_static_partition() {
    let h = Harness::new(&[]);
    h.seed(STATIC, "/css/main.css", ok("body{}", "text/css")).await;

    let outcome = serve(&h, request("/css/main.css", Destination::Style)).await;

    assert_eq!(outcome.source, ResponseSource::Cache);
    assert!(h.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_asset_miss_stored_in_static_partition() {
    let h = Harness::new(&[]);
    h.fetcher.respond("/js/extra.js", ok("1;", "text/javascript"));

    let outcome = serve(&h, request("/js/extra.js", Destination::Script)).await;

    assert_eq!(outcome.source, ResponseSource::Network);
    assert!(h.cached(STATIC, "/js/extra.js").await.is_some());
    assert!(h.cached(DYNAMIC, "/js/extra.js").await.is_none());
}

#[tokio::test]
async fn test_asset_total_failure_is_not_found() {
    let h = Harness::new(&[]);

    let outcome = serve(&h, request("/js/gone.js", Destination::Script)).await;

    assert_eq!(outcome.source, ResponseSource::Synthesized);
    assert_eq!(outcome.response.status, 404);
    assert!(outcome.response.body.is_empty());
}

#[tokio::test]
async fn test_other_network_first_with_fallback() {
    let h = Harness::new(&[]);
    h.fetcher.respond("/api/posts.json", ok("[1]", "application/json"));

    let online = serve(&h, request("/api/posts.json", Destination::default())).await;
    assert_eq!(online.source, ResponseSource::Network);

    h.fetcher.go_offline();
    let offline = serve(&h, request("/api/posts.json", Destination::default())).await;
    assert_eq!(offline.source, ResponseSource::Cache);
    assert_eq!(offline.response.body.as_ref(), b"[1]");

    let missing = serve(&h, request("/api/other.json", Destination::default())).await;
    assert_eq!(missing.source, ResponseSource::Synthesized);
    assert_eq!(missing.response.status, 404);
}

#[tokio::test]
async fn test_store_write_failure_does_not_affect_response() {
    let h = Harness::new(&[]);
    h.store.fail_writes.store(true, Ordering::SeqCst);
    h.fetcher.respond("/posts/", ok("posts", "text/html"));

    let outcome = serve(&h, request("/posts/", Destination::Document)).await;

    assert_eq!(outcome.source, ResponseSource::Network);
    assert_eq!(outcome.response.body.as_ref(), b"posts");
    assert!(h.cached(DYNAMIC, "/posts/").await.is_none());
}

#[tokio::test]
async fn test_store_read_failure_is_a_miss() {
    let h = Harness::new(&[]);
    h.seed(DYNAMIC, "/images/a.png", ok("cached", "image/png")).await;
    h.store.fail_reads.store(true, Ordering::SeqCst);
    h.fetcher.respond("/images/a.png", ok("fresh", "image/png"));

    let outcome = serve(&h, request("/images/a.png", Destination::Image)).await;

    assert_eq!(outcome.source, ResponseSource::Network);
    assert_eq!(outcome.response.body.as_ref(), b"fresh");
}

#[tokio::test]
async fn test_repeated_store_keeps_single_entry() {
    let h = Harness::new(&[]);
    h.fetcher.respond("/posts/", ok("posts", "text/html"));

    serve(&h, request("/posts/", Destination::Document)).await;
    serve(&h, request("/posts/", Destination::Document)).await;

    let handle = h.store.open(DYNAMIC).await.unwrap();
    let keys = h.store.keys(&handle).await.unwrap();
    assert_eq!(keys.len(), 1);
}

#[tokio::test]
async fn test_metrics_count_sources() {
    let h = Harness::new(&[]);
    serve(&h, request("/images/x.png", Destination::Image)).await;

    assert_eq!(
        h.layer
            .metrics()
            .response_count("cache-first-image", "synthesized"),
        1
    );
}

#[tokio::test]
async fn test_cache_miss_creates_no_partition() {
    let h = Harness::new(&[]);

    serve(&h, request("/images/gone.png", Destination::Image)).await;
    serve(&h, request("/css/gone.css", Destination::Style)).await;

    assert!(h.store.list_partition_names().await.unwrap().is_empty());
}
