//! Minimal file-save policy: the coordinator only needs enough of wget's
//! filename/clobber rules to know where bytes land and whether a write
//! proceeds (spec §1 Non-goals: "on-disk filename policy" beyond this is
//! out of scope; spec §4.5 "File policy (summary, coordinator sees
//! only)").

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::{ClobberPolicy, Config};
use crate::error::CoordinatorError;
use crate::url_canon::CanonicalUrl;

/// The cap on `name.N` disambiguation attempts. The source's limit of
/// 999 is flagged in spec §9 as "arbitrary; re-evaluate" — DESIGN.md
/// records keeping the same number for behavioral parity rather than
/// picking a new arbitrary value.
const MAX_DISAMBIGUATION_ATTEMPTS: u32 = 999;

/// Computes the local path for a URL under `directory_prefix`: the URL
/// path segments become directory components, and a trailing slash (or
/// empty path) becomes `index.html`.
pub fn local_path(config: &Config, url: &CanonicalUrl) -> PathBuf {
    let mut path = config.directory_prefix.clone();
    let trimmed = url.path().trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        path.push(trimmed);
        path.push("index.html");
    } else {
        path.push(trimmed);
    }
    path
}

pub enum SaveOutcome {
    Written(PathBuf),
    Skipped,
}

/// Writes `bytes` to `path` according to `clobber` (spec §4.5 File
/// policy). `Overwrite` truncates; `NoClobber` finds the next free
/// `path.N`; `Timestamping` is handled one level up (a 304 already means
/// "don't write") so here it behaves like `Overwrite`.
pub fn save(path: &Path, bytes: &[u8], clobber: ClobberPolicy) -> Result<SaveOutcome, CoordinatorError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let target = match clobber {
        ClobberPolicy::NoClobber if path.exists() => next_free_name(path)?,
        _ => path.to_path_buf(),
    };

    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&target)?;
    file.write_all(bytes)?;
    Ok(SaveOutcome::Written(target))
}

fn next_free_name(path: &Path) -> Result<PathBuf, CoordinatorError> {
    for n in 1..=MAX_DISAMBIGUATION_ATTEMPTS {
        let candidate = path.with_file_name(format!(
            "{}.{n}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("download")
        ));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(CoordinatorError::Io(std::io::Error::other(format!(
        "exhausted {MAX_DISAMBIGUATION_ATTEMPTS} disambiguation attempts for {}",
        path.display()
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> Config {
        let cli = crate::cli::Cli {
            urls: vec![],
            input_file: None,
            recursive: false,
            level: 5,
            no_parent: false,
            span_hosts: false,
            domains: vec![],
            exclude_domains: vec![],
            https_only: false,
            https_enforce: crate::cli::HttpsEnforce::None,
            page_requisites: false,
            max_redirect: 20,
            tries: 3,
            wait: 0.0,
            waitretry: 1.0,
            random_wait: false,
            chunk_size: None,
            metalink: false,
            timestamping: false,
            continue_download: false,
            no_clobber: false,
            quota: None,
            threads: 1,
            dns_timeout: 30.0,
            connect_timeout: 30.0,
            read_timeout: 900.0,
            user_agent: "wgrs/0.1".into(),
            referer: None,
            header: vec![],
            user: None,
            password: None,
            robots: true,
            spider: false,
            directory_prefix: dir.to_path_buf(),
            verbose: 0,
        };
        Config::from_cli(cli).unwrap()
    }

    #[test]
    fn local_path_adds_index_html_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let url = CanonicalUrl::parse("http://example.com/a/").unwrap();
        assert_eq!(local_path(&config, &url), dir.path().join("a/index.html"));
    }

    #[test]
    fn no_clobber_disambiguates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"old").unwrap();
        let outcome = save(&path, b"new", ClobberPolicy::NoClobber).unwrap();
        match outcome {
            SaveOutcome::Written(p) => assert_eq!(p, dir.path().join("f.txt.1")),
            SaveOutcome::Skipped => panic!("expected a write"),
        }
        assert_eq!(std::fs::read(&path).unwrap(), b"old");
    }

    #[test]
    fn overwrite_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"old-and-longer").unwrap();
        save(&path, b"new", ClobberPolicy::Overwrite).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }
}
