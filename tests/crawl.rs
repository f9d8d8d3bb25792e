//! Black-box recursive-crawl test (spec §4.5, §8): drives the full worker
//! pool against a real local HTTP server and checks that a link reachable
//! by two different paths (a literal duplicate, and a cycle back to the
//! seed) is only ever fetched once.

mod support;

use std::collections::HashMap;

use support::{base_cli, build_ctx, Route, TestServer};
use wgrs::config::Config;
use wgrs::controller;
use wgrs::error::ExitCode;

#[test_log::test]
fn duplicate_and_cyclic_links_are_fetched_at_most_once() {
    let mut routes = HashMap::new();
    routes.insert("/robots.txt", Route { status: 200, headers: vec![], body: b"User-agent: *\nAllow: /\n".to_vec() });
    routes.insert(
        "/",
        Route::html(r#"<html><body><a href="/a.html">a</a><a href="/a.html">dup</a><a href="/b.html">b</a></body></html>"#),
    );
    routes.insert("/a.html", Route::html("<html><body>leaf</body></html>"));
    routes.insert("/b.html", Route::html(r#"<html><body><a href="/">back to start</a></body></html>"#));
    let server = TestServer::start(routes);

    let dir = tempfile::tempdir().unwrap();
    let mut cli = base_cli(vec![server.url("/")], dir.path());
    cli.recursive = true;
    let config = Config::from_cli(cli).unwrap();
    let ctx = build_ctx(config);

    let status = controller::run(ctx, true);
    assert_eq!(status, ExitCode::Success.as_u8());

    assert_eq!(server.hits("/"), 1);
    assert_eq!(server.hits("/a.html"), 1);
    assert_eq!(server.hits("/b.html"), 1);
    assert_eq!(server.hits("/robots.txt"), 1, "robots.txt is fetched once per host, not once per job");

    assert!(dir.path().join("index.html").exists());
    assert!(dir.path().join("a.html").exists());
    assert!(dir.path().join("b.html").exists());
}
