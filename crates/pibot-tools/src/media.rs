use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use pibot_core::format::truncate_tail;
use pibot_core::{DownloadedMedia, Invocation, MediaFetcher, ProcessRunner};
use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

const FORMAT: &str = "best[height<=720]/best";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const TIKTOK_REFERER: &str = "https://www.tiktok.com/";
const PRINT_TEMPLATE: &str = "after_move:%(filepath)s\t%(duration)s\t%(title)s";
const INSTAGRAM_PATTERN: &str =
    r"instagram\.com/(?:(?:p|reel)/[^/?#]+|stories/[^/?#]+/\d+)";
const MAX_FILE_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const ERROR_TAIL: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    YouTube,
    TikTok,
    Instagram,
}

impl Platform {
    fn output_template(&self) -> &'static str {
        match self {
            Self::TikTok => "tiktok_%(id)s.%(ext)s",
            Self::YouTube | Self::Instagram => "%(title)s.%(ext)s",
        }
    }
}

fn bare_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(&host)
        .to_string();
    Some(host)
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Works out which site a link belongs to. Instagram links must point at a
/// post, reel or story.
pub fn classify(raw: &str) -> Result<Platform> {
    let url = Url::parse(raw.trim()).with_context(|| format!("not a valid link: {raw}"))?;
    let host = bare_host(&url).ok_or_else(|| anyhow!("link has no host: {raw}"))?;
    if host_matches(&host, "youtube.com") || host == "youtu.be" {
        return Ok(Platform::YouTube);
    }
    if host_matches(&host, "tiktok.com") {
        return Ok(Platform::TikTok);
    }
    if host_matches(&host, "instagram.com") {
        let pattern = Regex::new(INSTAGRAM_PATTERN).context("instagram pattern")?;
        if !pattern.is_match(raw) {
            bail!("unrecognized Instagram link, expected a post, reel or story: {raw}");
        }
        return Ok(Platform::Instagram);
    }
    bail!("unsupported link: {raw}")
}

/// Drops playlist and tracking parameters that follow the first `&`.
pub fn clean_youtube_url(raw: &str) -> &str {
    raw.split('&').next().unwrap_or(raw)
}

fn is_tiktok_short_link(raw: &str) -> bool {
    Url::parse(raw)
        .ok()
        .and_then(|url| bare_host(&url))
        .is_some_and(|host| host == "vt.tiktok.com" || host == "vm.tiktok.com")
}

pub fn build_invocation(platform: Platform, url: &str, download_dir: &Path) -> Invocation {
    let output = download_dir.join(platform.output_template());
    let mut argv = vec![
        "yt-dlp".to_string(),
        "-f".to_string(),
        FORMAT.to_string(),
        "-o".to_string(),
        output.display().to_string(),
        "--socket-timeout".to_string(),
        "30".to_string(),
        "--retries".to_string(),
        "10".to_string(),
        "--user-agent".to_string(),
        USER_AGENT.to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--print".to_string(),
        PRINT_TEMPLATE.to_string(),
    ];
    if platform == Platform::TikTok {
        argv.push("--referer".to_string());
        argv.push(TIKTOK_REFERER.to_string());
    }
    argv.push(url.to_string());
    Invocation::argv(argv)
}

/// Parses the `filepath<TAB>duration<TAB>title` line printed after the move.
pub fn parse_print_line(line: &str) -> Option<DownloadedMedia> {
    let mut parts = line.trim_end_matches(['\r', '\n']).splitn(3, '\t');
    let path = parts.next().filter(|p| !p.is_empty())?;
    let duration_secs = parts
        .next()
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.round() as u64);
    let title = match parts.next().map(str::trim) {
        Some(title) if !title.is_empty() && title != "NA" => title.to_string(),
        _ => "Unknown title".to_string(),
    };
    Some(DownloadedMedia {
        path: PathBuf::from(path),
        title,
        duration_secs,
    })
}

/// Removes regular files in `dir` (not recursing) whose modification time is
/// older than `max_age`. Returns how many were removed.
pub fn cleanup_old_files(dir: &Path, max_age: Duration) -> usize {
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age > max_age {
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!(path = %entry.path().display(), "removed stale download");
                    removed += 1;
                }
                Err(err) => warn!(path = %entry.path().display(), error = %err, "failed to remove stale download"),
            }
        }
    }
    removed
}

/// Downloads videos with `yt-dlp` into a scratch directory.
pub struct YtDlpFetcher {
    runner: Arc<dyn ProcessRunner>,
    client: reqwest::Client,
    download_dir: PathBuf,
    timeout: Duration,
}

impl YtDlpFetcher {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        download_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            runner,
            client,
            download_dir: download_dir.into(),
            timeout,
        })
    }

    async fn resolve_short_link(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to resolve {url}"))?;
        Ok(response.url().to_string())
    }

    async fn prepare_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .with_context(|| format!("failed to create {}", self.download_dir.display()))?;
        let dir = self.download_dir.clone();
        let removed = tokio::task::spawn_blocking(move || cleanup_old_files(&dir, MAX_FILE_AGE))
            .await
            .context("cleanup task failed")?;
        if removed > 0 {
            info!(removed, "cleaned up old downloads");
        }
        Ok(())
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str) -> Result<DownloadedMedia> {
        let url = url.trim();
        let platform = classify(url)?;
        self.prepare_dir().await?;

        let target = match platform {
            Platform::YouTube => clean_youtube_url(url).to_string(),
            Platform::TikTok if is_tiktok_short_link(url) => self.resolve_short_link(url).await?,
            Platform::TikTok | Platform::Instagram => url.to_string(),
        };
        info!(?platform, url = %target, "downloading media");

        let output = self
            .runner
            .run(build_invocation(platform, &target, &self.download_dir), self.timeout)
            .await?;
        if !output.success() {
            bail!(
                "yt-dlp failed (code {}):\n{}",
                output.code_label(),
                truncate_tail(output.stderr.trim(), ERROR_TAIL)
            );
        }
        let media = output
            .stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(parse_print_line)
            .ok_or_else(|| anyhow!("yt-dlp did not report a downloaded file"))?;
        if !tokio::fs::try_exists(&media.path).await.unwrap_or(false) {
            bail!("downloaded file is missing: {}", media.path.display());
        }
        Ok(media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pibot_core::testing::ScriptedRunner;
    use tempfile::tempdir;

    #[test]
    fn classifies_supported_hosts() {
        assert_eq!(
            classify("https://www.youtube.com/watch?v=abc").expect("yt"),
            Platform::YouTube
        );
        assert_eq!(classify("https://youtu.be/abc").expect("short yt"), Platform::YouTube);
        assert_eq!(
            classify("https://m.youtube.com/watch?v=abc").expect("mobile yt"),
            Platform::YouTube
        );
        assert_eq!(classify("https://vt.tiktok.com/ZSabc/").expect("tt"), Platform::TikTok);
        assert_eq!(
            classify("https://www.instagram.com/reel/Cxyz123/").expect("reel"),
            Platform::Instagram
        );
        assert_eq!(
            classify("https://instagram.com/stories/someone/3141592653/").expect("story"),
            Platform::Instagram
        );
    }

    #[test]
    fn rejects_unsupported_or_malformed_links() {
        assert!(classify("https://vimeo.com/123").is_err());
        assert!(classify("https://notyoutube.com/watch?v=1").is_err());
        assert!(classify("https://www.instagram.com/someone/").is_err());
        assert!(classify("https://www.instagram.com/stories/someone/").is_err());
        assert!(classify("youtube.com/watch?v=abc").is_err());
    }

    #[test]
    fn youtube_links_lose_extra_parameters() {
        assert_eq!(
            clean_youtube_url("https://www.youtube.com/watch?v=abc&list=PL1&t=30"),
            "https://www.youtube.com/watch?v=abc"
        );
        assert_eq!(clean_youtube_url("https://youtu.be/abc"), "https://youtu.be/abc");
    }

    #[test]
    fn tiktok_invocation_uses_id_template_and_referer() {
        let inv = build_invocation(
            Platform::TikTok,
            "https://www.tiktok.com/@u/video/1",
            Path::new("/tmp/dl"),
        );
        assert_eq!(inv.argv[0], "yt-dlp");
        assert!(inv.argv.contains(&"/tmp/dl/tiktok_%(id)s.%(ext)s".to_string()));
        assert!(inv.argv.contains(&TIKTOK_REFERER.to_string()));
        assert!(inv.argv.contains(&FORMAT.to_string()));
        assert_eq!(inv.argv.last().map(String::as_str), Some("https://www.tiktok.com/@u/video/1"));

        let yt = build_invocation(Platform::YouTube, "https://youtu.be/x", Path::new("/tmp/dl"));
        assert!(yt.argv.contains(&"/tmp/dl/%(title)s.%(ext)s".to_string()));
        assert!(!yt.argv.contains(&TIKTOK_REFERER.to_string()));
    }

    #[test]
    fn parses_printed_file_line() {
        let media = parse_print_line("/tmp/dl/My Clip.mp4\t75.4\tMy Clip\twith tab\n").expect("line");
        assert_eq!(media.path, PathBuf::from("/tmp/dl/My Clip.mp4"));
        assert_eq!(media.duration_secs, Some(75));
        assert_eq!(media.title, "My Clip\twith tab");

        let bare = parse_print_line("/tmp/dl/x.mp4\tNA\tNA").expect("line");
        assert_eq!(bare.duration_secs, None);
        assert_eq!(bare.title, "Unknown title");
        assert!(parse_print_line("").is_none());
    }

    #[test]
    fn cleanup_respects_age_and_skips_directories() {
        let tmp = tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("old.mp4"), b"x").expect("write");
        std::fs::create_dir(tmp.path().join("nested")).expect("mkdir");
        std::fs::write(tmp.path().join("nested/keep.mp4"), b"x").expect("write");

        assert_eq!(cleanup_old_files(tmp.path(), MAX_FILE_AGE), 0);
        assert!(tmp.path().join("old.mp4").exists());

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cleanup_old_files(tmp.path(), Duration::from_millis(1)), 1);
        assert!(!tmp.path().join("old.mp4").exists());
        assert!(tmp.path().join("nested/keep.mp4").exists());
    }

    #[tokio::test]
    async fn fetch_runs_ytdlp_and_returns_file() {
        let tmp = tempdir().expect("tempdir");
        let file = tmp.path().join("Clip.mp4");
        std::fs::write(&file, b"video").expect("write");
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output(0, &format!("{}\t12\tClip\n", file.display()), "");

        let fetcher = YtDlpFetcher::new(runner.clone(), tmp.path(), Duration::from_secs(60))
            .expect("fetcher");
        let media = fetcher
            .fetch("https://www.youtube.com/watch?v=abc&feature=share")
            .await
            .expect("fetch");
        assert_eq!(media.path, file);
        assert_eq!(media.duration_secs, Some(12));
        let calls = runner.calls();
        assert_eq!(
            calls[0].argv.last().map(String::as_str),
            Some("https://www.youtube.com/watch?v=abc")
        );
    }

    #[tokio::test]
    async fn fetch_reports_ytdlp_failure() {
        let tmp = tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output(1, "", "ERROR: Video unavailable");
        let fetcher = YtDlpFetcher::new(runner, tmp.path(), Duration::from_secs(60)).expect("fetcher");
        let err = fetcher
            .fetch("https://youtu.be/gone")
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("Video unavailable"));
    }

    #[tokio::test]
    async fn unsupported_link_never_runs_ytdlp() {
        let tmp = tempdir().expect("tempdir");
        let runner = Arc::new(ScriptedRunner::new());
        let fetcher =
            YtDlpFetcher::new(runner.clone(), tmp.path(), Duration::from_secs(60)).expect("fetcher");
        assert!(fetcher.fetch("https://example.com/video").await.is_err());
        assert!(runner.calls().is_empty());
    }
}
