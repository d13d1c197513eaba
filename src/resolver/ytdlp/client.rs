//! yt-dlp process client
//!
//! Each lookup spawns `yt-dlp -J ...` and parses stdout. Concurrent
//! processes are capped by a semaphore and every run has a timeout; a
//! timed-out child is killed when its future is dropped.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;

use super::{adapter, dto};
use crate::model::MediaInfo;
use crate::resolver::{ResolveError, Resolver, StreamHandle};

/// Arguments passed to every invocation. Callers end their own options with
/// `--` so user text is never read as an option.
const BASE_ARGS: &[&str] = &["-J", "--no-warnings", "--force-ipv4"];

/// Audio format selector
const AUDIO_FORMAT: &str = "bestaudio/best";

/// yt-dlp backed resolver
pub struct YtDlpClient {
    binary: PathBuf,
    workers: Arc<Semaphore>,
    timeout: Duration,
}

impl YtDlpClient {
    /// Create a client running `binary` with at most `workers` concurrent processes.
    pub fn new(binary: impl Into<PathBuf>, workers: usize, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            workers: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    /// Run yt-dlp with `args` and parse its JSON document.
    async fn run_json(&self, args: &[&str]) -> Result<dto::InfoJson, ResolveError> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| ResolveError::Process("worker pool closed".to_string()))?;

        let mut cmd = Command::new(&self.binary);
        cmd.args(BASE_ARGS)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(target: "resolver", ?args, "Running yt-dlp");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => return Err(ResolveError::Timeout(self.timeout)),
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ResolveError::ToolMissing(self.binary.display().to_string()));
            }
            Ok(Err(e)) => return Err(ResolveError::Process(e.to_string())),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = last_error_line(&stderr)
                .unwrap_or_else(|| format!("exit status {}", output.status));
            return Err(classify_failure(message));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ResolveError::Parse(e.to_string()))
    }
}

/// The `ytsearchN:` pseudo-URL for a text search.
fn search_target(query: &str, limit: usize) -> String {
    format!("ytsearch{}:{}", limit, query)
}

fn last_error_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("ERROR:").trim().to_string())
}

fn classify_failure(message: String) -> ResolveError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("unavailable") || lower.contains("not available") || lower.contains("private video")
    {
        ResolveError::NotFound(message)
    } else {
        ResolveError::Process(message)
    }
}

#[async_trait]
impl Resolver for YtDlpClient {
    async fn resolve_direct(&self, url: &str) -> Result<MediaInfo, ResolveError> {
        let info = self
            .run_json(&["--no-playlist", "-f", AUDIO_FORMAT, "--", url])
            .await?;
        Ok(adapter::to_media_info(&info))
    }

    async fn resolve_playlist(
        &self,
        url: &str,
        max_items: usize,
    ) -> Result<Vec<MediaInfo>, ResolveError> {
        if max_items == 0 {
            return Ok(Vec::new());
        }
        let end = max_items.to_string();
        let info = self
            .run_json(&["--flat-playlist", "--yes-playlist", "--playlist-end", &end, "--", url])
            .await?;
        let items = adapter::to_media_list(&info, max_items);
        tracing::debug!(target: "resolver", url, count = items.len(), "Resolved playlist");
        Ok(items)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MediaInfo>, ResolveError> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let target = search_target(query, limit);
        let info = self.run_json(&["--flat-playlist", "--", &target]).await?;
        Ok(adapter::to_media_list(&info, limit))
    }

    async fn stream_locator(&self, locator: &str) -> Result<StreamHandle, ResolveError> {
        let info = self
            .run_json(&["--no-playlist", "-f", AUDIO_FORMAT, "--", locator])
            .await?;
        adapter::stream_url(&info)
            .map(StreamHandle::new)
            .ok_or_else(|| ResolveError::NoStream(locator.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_target() {
        assert_eq!(search_target("lofi beats", 3), "ytsearch3:lofi beats");
    }

    #[test]
    fn test_last_error_line() {
        let stderr = "WARNING: something\nERROR: [youtube] abc: Video unavailable\n\n";
        assert_eq!(
            last_error_line(stderr).as_deref(),
            Some("[youtube] abc: Video unavailable")
        );
        assert!(last_error_line("  \n").is_none());
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("Video unavailable".to_string()),
            ResolveError::NotFound(_)
        ));
        assert!(matches!(
            classify_failure("HTTP Error 500".to_string()),
            ResolveError::Process(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let client = YtDlpClient::new(
            "/nonexistent/guild-music-test/yt-dlp",
            1,
            Duration::from_secs(5),
        );
        let err = client.resolve_direct("https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, ResolveError::ToolMissing(_)), "got {err:?}");
    }

    /// Fake yt-dlp that appends its argv (one per line) to `argv.log` and
    /// prints a single video document.
    #[cfg(unix)]
    fn fake_ytdlp(dir: &std::path::Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("argv.log");
        let script = dir.join("yt-dlp");
        let body = format!(
            "#!/bin/sh\nfor arg in \"$@\"; do printf '%s\\n' \"$arg\" >> '{}'; done\n\
             echo '{{\"id\":\"abc\",\"title\":\"Song\",\"webpage_url\":\"https://youtu.be/abc\",\"url\":\"https://cdn/abc\"}}'\n",
            log.display()
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_user_text_never_becomes_an_option() {
        let dir = tempfile::tempdir().unwrap();
        let client = YtDlpClient::new(fake_ytdlp(dir.path()), 1, Duration::from_secs(10));
        let hostile = "--exec=touch${IFS}/tmp/x;youtube.com";

        client.resolve_direct(hostile).await.unwrap();
        client.resolve_playlist(hostile, 5).await.unwrap();
        client.stream_locator(hostile).await.unwrap();
        client.search(hostile, 1).await.unwrap();

        let log = std::fs::read_to_string(dir.path().join("argv.log")).unwrap();
        let args: Vec<&str> = log.lines().collect();
        let separators = args.iter().filter(|a| **a == "--").count();
        assert_eq!(separators, 4);
        for (i, arg) in args.iter().enumerate() {
            if arg.contains("--exec") {
                assert_eq!(args[i - 1], "--", "user text followed {:?}", args[i - 1]);
            }
        }
    }

    #[tokio::test]
    async fn test_zero_limits_skip_the_process() {
        let client = YtDlpClient::new("/nonexistent/yt-dlp", 1, Duration::from_secs(5));
        assert!(client.search("anything", 0).await.unwrap().is_empty());
        assert!(client.resolve_playlist("https://youtu.be/x", 0).await.unwrap().is_empty());
    }
}
