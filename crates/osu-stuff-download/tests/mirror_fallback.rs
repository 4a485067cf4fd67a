//! Mirror ordering and fallback against mock mirrors

#![allow(clippy::unwrap_used, clippy::expect_used)]

use osu_stuff_download::{DownloadError, MirrorEndpoint, MirrorFetch, MirrorResolver};
use pretty_assertions::assert_eq;
use reqwest::Client;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoints(server: &MockServer) -> Vec<MirrorEndpoint> {
    ["m0", "m1", "m2"]
        .into_iter()
        .map(|name| MirrorEndpoint::new(name, format!("{}/{name}/", server.uri())))
        .collect()
}

fn names(resolver: &MirrorResolver) -> Vec<String> {
    resolver.mirrors().into_iter().map(|m| m.name).collect()
}

#[tokio::test]
async fn bad_status_demotes_mirror_and_next_one_serves() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/m0/123"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/m1/123"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"archive".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/m2/123"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"other".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let resolver = MirrorResolver::with_mirrors(Client::new(), endpoints(&server));
    let body = resolver.fetch(123).await.unwrap();

    assert_eq!(&body[..], b"archive");
    assert_eq!(names(&resolver), vec!["m1", "m2", "m0"]);
    server.verify().await;
}

#[tokio::test]
async fn demotion_persists_across_fetches() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/m0/1"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/m1/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"one".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let resolver = MirrorResolver::with_mirrors(Client::new(), endpoints(&server));
    resolver.fetch(1).await.unwrap();
    // m1 now leads, so m0 is not asked again
    resolver.fetch(1).await.unwrap();

    assert_eq!(names(&resolver), vec!["m1", "m2", "m0"]);
    server.verify().await;
}

#[tokio::test]
async fn not_found_moves_on_without_demotion() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/m0/5"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/m1/5"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/m2/5"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"five".to_vec()))
        .mount(&server)
        .await;

    let resolver = MirrorResolver::with_mirrors(Client::new(), endpoints(&server));
    let body = resolver.fetch(5).await.unwrap();

    // 404 and an empty 200 are misses, not demotions
    assert_eq!(&body[..], b"five");
    assert_eq!(names(&resolver), vec!["m0", "m1", "m2"]);
}

#[tokio::test]
async fn exhausted_list_reports_content_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let resolver = MirrorResolver::with_mirrors(Client::new(), endpoints(&server));
    let err = resolver.fetch(77).await.unwrap_err();

    assert!(matches!(err, DownloadError::MirrorExhausted { content_id: 77 }));
    // Each mirror was demoted once, in turn
    assert_eq!(names(&resolver), vec!["m0", "m1", "m2"]);
    server.verify().await;
}

#[tokio::test]
async fn unreachable_mirror_is_skipped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/m1/9"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"nine".to_vec()))
        .mount(&server)
        .await;

    let mut mirrors = endpoints(&server);
    mirrors[0] = MirrorEndpoint::new("dead", "http://127.0.0.1:1/d/");

    let resolver = MirrorResolver::with_mirrors(Client::new(), mirrors);
    let body = resolver.fetch(9).await.unwrap();

    assert_eq!(&body[..], b"nine");
    assert_eq!(names(&resolver), vec!["dead", "m1", "m2"]);
}
