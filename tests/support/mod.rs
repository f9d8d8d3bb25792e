//! Shared black-box test scaffolding (SPEC_FULL.md §9.4): a minimal raw-socket
//! HTTP server so integration tests exercise the coordinator over real
//! `std::net` sockets and real worker threads, rather than mocking the
//! coordinator's own locking.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use wgrs::cli::Cli;
use wgrs::config::Config;
use wgrs::dns::{SharedDnsCache, SystemResolver};
use wgrs::error::ExitStatus;
use wgrs::fetch::client::build_client;
use wgrs::fetch::cookies::InMemoryCookieStore;
use wgrs::fetch::credentials::InMemoryCredentialStore;
use wgrs::fetch::FetchContext;
use wgrs::host::HostRegistry;
use wgrs::queue::JobQueue;
use wgrs::stats::{NoopProgressSink, NoopStatsSink};

#[derive(Clone)]
pub struct Route {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Route {
    pub fn html(body: &str) -> Self {
        Route {
            status: 200,
            headers: vec![("Content-Type".to_string(), "text/html".to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn redirect(location: &str) -> Self {
        Route {
            status: 302,
            headers: vec![("Location".to_string(), location.to_string())],
            body: Vec::new(),
        }
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl TestServer {
    pub fn start(routes: HashMap<&'static str, Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(routes);
        let hits = Arc::new(Mutex::new(HashMap::new()));
        let hits_for_acceptor = hits.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let routes = routes.clone();
                let hits = hits_for_acceptor.clone();
                thread::spawn(move || serve_one(stream, &routes, &hits));
            }
        });
        TestServer { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        *self.hits.lock().unwrap().get(path).unwrap_or(&0)
    }
}

fn serve_one(mut stream: TcpStream, routes: &HashMap<&'static str, Route>, hits: &Mutex<HashMap<String, usize>>) {
    stream.set_read_timeout(Some(Duration::from_secs(5))).ok();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buf.len() > 1 << 20 {
            return;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.split("\r\n");
    let Some(request_line) = lines.next() else { return };
    let path = request_line.split(' ').nth(1).unwrap_or("/").to_string();
    let mut range: Option<(u64, u64)> = None;
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Range: ") {
            if let Some(spec) = value.strip_prefix("bytes=") {
                if let Some((s, e)) = spec.split_once('-') {
                    if let (Ok(s), Ok(e)) = (s.parse::<u64>(), e.parse::<u64>()) {
                        range = Some((s, e));
                    }
                }
            }
        }
    }

    hits.lock().unwrap().entry(path.clone()).and_modify(|c| *c += 1).or_insert(1);

    let Some(route) = routes.get(path.as_str()) else {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    };

    let (status, body, extra_header) = match range {
        Some((s, e)) if !route.body.is_empty() => {
            let start = (s as usize).min(route.body.len() - 1);
            let end = (e as usize).min(route.body.len() - 1);
            let slice = route.body[start..=end].to_vec();
            let header = format!("Content-Range: bytes {start}-{end}/{}\r\n", route.body.len());
            (206u16, slice, header)
        }
        _ => (route.status, route.body.clone(), String::new()),
    };

    let mut response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Length: {}\r\nConnection: close\r\n{extra_header}",
        reason_phrase(status),
        body.len(),
    );
    for (name, value) in &route.headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(&body);
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        206 => "Partial Content",
        302 => "Found",
        404 => "Not Found",
        _ => "Unknown",
    }
}

/// A `Cli` with every flag at its CLI-level default, seeded with `urls` and
/// rooted at `dir` (mirrors `fetch/save.rs`'s own in-module test helper).
pub fn base_cli(urls: Vec<String>, dir: &Path) -> Cli {
    Cli {
        urls,
        input_file: None,
        recursive: false,
        level: 5,
        no_parent: false,
        span_hosts: false,
        domains: vec![],
        exclude_domains: vec![],
        https_only: false,
        https_enforce: wgrs::cli::HttpsEnforce::None,
        page_requisites: false,
        max_redirect: 20,
        tries: 3,
        wait: 0.0,
        waitretry: 0.1,
        random_wait: false,
        chunk_size: None,
        metalink: false,
        timestamping: false,
        continue_download: false,
        no_clobber: false,
        quota: None,
        threads: 4,
        dns_timeout: 5.0,
        connect_timeout: 5.0,
        read_timeout: 10.0,
        user_agent: "wgrs-test/0.1".into(),
        referer: None,
        header: vec![],
        user: None,
        password: None,
        robots: true,
        spider: false,
        directory_prefix: dir.to_path_buf(),
        verbose: 0,
    }
}

pub fn build_ctx(config: Config) -> Arc<FetchContext> {
    let config = Arc::new(config);
    Arc::new(FetchContext {
        client: build_client(&config).unwrap(),
        dns: SharedDnsCache::new(Box::new(SystemResolver)),
        hosts: Arc::new(HostRegistry::new(config.robots_enabled)),
        blacklist: Arc::new(wgrs::blacklist::Blacklist::new()),
        queue: Arc::new(JobQueue::new()),
        stats: Arc::new(NoopStatsSink),
        progress: Arc::new(NoopProgressSink),
        exit_status: Arc::new(ExitStatus::new()),
        bytes_downloaded: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        parts: Mutex::new(HashMap::new()),
        cookies: Arc::new(InMemoryCookieStore::new()),
        credentials: Arc::new(InMemoryCredentialStore::new(config.user.clone(), config.password.clone())),
        config,
    })
}
