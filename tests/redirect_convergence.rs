//! Black-box test (spec §4.3, §7): two independent redirect chains that
//! converge on the same target URL are not a redirect loop. The global
//! `Blacklist` still enforces at-most-once fetching of the shared target,
//! but convergence must be a silent dedup, not a reported protocol error.

mod support;

use std::collections::HashMap;

use support::{base_cli, build_ctx, Route, TestServer};
use wgrs::config::Config;
use wgrs::controller;

#[test_log::test]
fn convergent_redirects_are_deduped_silently_not_reported_as_a_loop() {
    let mut routes = HashMap::new();
    routes.insert("/robots.txt", Route { status: 200, headers: vec![], body: b"User-agent: *\nAllow: /\n".to_vec() });
    routes.insert("/seed1", Route::redirect("/common"));
    routes.insert("/seed2", Route::redirect("/common"));
    routes.insert("/common", Route::html("<html>shared target</html>"));
    let server = TestServer::start(routes);

    let dir = tempfile::tempdir().unwrap();
    let cli = base_cli(vec![server.url("/seed1"), server.url("/seed2")], dir.path());
    let config = Config::from_cli(cli).unwrap();
    let ctx = build_ctx(config);

    let status = controller::run(ctx, true);
    assert_eq!(status, 0, "convergent (non-looping) redirects must not raise an error");

    // /common is reachable from two independent chains but only fetched
    // once (spec §4.3: "a URL is never dispatched again in this process").
    assert_eq!(server.hits("/common"), 1);
}
