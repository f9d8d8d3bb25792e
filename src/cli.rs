//! Command-line surface (spec §6, coordinator-affecting subset only).
//! Parsing itself follows the teacher's `clap` derive style
//! (`commands.rs`); the CLI's own UX (help text polish, subcommands for
//! unrelated features) is out of scope per spec §1.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HttpsEnforce {
    None,
    Soft,
    Hard,
}

#[derive(Debug, Parser)]
#[command(name = "wgrs", about = "A recursive, multi-threaded web downloader")]
pub struct Cli {
    /// Seed URLs to fetch.
    pub urls: Vec<String>,

    /// Read seed URLs from FILE, or "-" for stdin.
    #[arg(short = 'i', long = "input-file")]
    pub input_file: Option<PathBuf>,

    /// Follow links recursively.
    #[arg(short = 'r', long)]
    pub recursive: bool,

    /// Maximum recursion depth.
    #[arg(short = 'l', long, default_value_t = 5)]
    pub level: u32,

    /// Never ascend above the parent directory of a seed URL.
    #[arg(long = "no-parent")]
    pub no_parent: bool,

    /// Allow recursion onto any host discovered, not just seed hosts.
    #[arg(long = "span-hosts", short = 'H')]
    pub span_hosts: bool,

    /// Additional hosts allowed for recursion (comma-separated).
    #[arg(short = 'D', long = "domains", value_delimiter = ',')]
    pub domains: Vec<String>,

    /// Hosts excluded from recursion (comma-separated).
    #[arg(long = "exclude-domains", value_delimiter = ',')]
    pub exclude_domains: Vec<String>,

    /// Only follow https:// links during recursion.
    #[arg(long = "https-only")]
    pub https_only: bool,

    /// How strictly to require HTTPS: none, soft (prefer), hard (no fallback).
    #[arg(long = "https-enforce", value_enum, default_value_t = HttpsEnforce::None)]
    pub https_enforce: HttpsEnforce,

    /// At max depth, fetch only page requisites (images, css), not links.
    #[arg(short = 'p', long = "page-requisites")]
    pub page_requisites: bool,

    /// Maximum redirects to follow for a single job.
    #[arg(long = "max-redirect", default_value_t = 20)]
    pub max_redirect: u32,

    /// Retries per job before giving up.
    #[arg(short = 't', long, default_value_t = 3)]
    pub tries: u32,

    /// Seconds to wait between requests.
    #[arg(short = 'w', long, default_value_t = 0.0)]
    pub wait: f64,

    /// Seconds to wait between retries.
    #[arg(long = "waitretry", default_value_t = 1.0)]
    pub waitretry: f64,

    /// Randomize the wait between 0.5x and 1.5x of `--wait`.
    #[arg(long = "random-wait")]
    pub random_wait: bool,

    /// Split files larger than this many bytes into parts.
    #[arg(long = "chunk-size")]
    pub chunk_size: Option<u64>,

    /// Treat Link headers / discovered documents as Metalink.
    #[arg(long)]
    pub metalink: bool,

    /// Use If-Modified-Since; skip re-downloading unmodified files.
    #[arg(short = 'N', long)]
    pub timestamping: bool,

    /// Resume a partially downloaded file with a Range request.
    #[arg(short = 'c', long = "continue")]
    pub continue_download: bool,

    /// Never overwrite an existing file; write name.N instead.
    #[arg(long = "no-clobber")]
    pub no_clobber: bool,

    /// Stop after downloading this many bytes total.
    #[arg(long)]
    pub quota: Option<u64>,

    /// Number of worker threads.
    #[arg(long, default_value_t = 5)]
    pub threads: usize,

    /// DNS lookup timeout in seconds; negative = infinite, 0 = immediate.
    #[arg(long = "dns-timeout", default_value_t = 30.0)]
    pub dns_timeout: f64,

    /// TCP connect timeout in seconds.
    #[arg(long = "connect-timeout", default_value_t = 30.0)]
    pub connect_timeout: f64,

    /// Socket read timeout in seconds.
    #[arg(long = "read-timeout", default_value_t = 900.0)]
    pub read_timeout: f64,

    /// User-Agent header to send.
    #[arg(long = "user-agent", default_value = "wgrs/0.1")]
    pub user_agent: String,

    /// Referer header to send with every request.
    #[arg(long)]
    pub referer: Option<String>,

    /// Extra header, "Name: Value"; may be repeated.
    #[arg(long = "header")]
    pub header: Vec<String>,

    /// Username for HTTP authentication.
    #[arg(long)]
    pub user: Option<String>,

    /// Password for HTTP authentication.
    #[arg(long)]
    pub password: Option<String>,

    /// Respect robots.txt (default: on).
    #[arg(long = "robots", default_value_t = true, action = clap::ArgAction::Set)]
    pub robots: bool,

    /// Spider mode: HEAD only, never save bodies.
    #[arg(long)]
    pub spider: bool,

    /// Directory to write downloaded files under.
    #[arg(short = 'P', long = "directory-prefix", default_value = ".")]
    pub directory_prefix: PathBuf,

    /// Increase log verbosity (may be repeated).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
