use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::types::{AcquiredAudio, FallbackAttempt};

/// Downloader output phrases that mean the platform wants a signed-in
/// session. Matched as lower-cased substrings with typographic apostrophes
/// normalized; the tool's exit codes do not distinguish this case, so text
/// matching is the only available signal.
const AUTH_REQUIRED_PHRASES: &[&str] = &[
    "sign in to confirm",
    "sign in to continue",
    "confirm you're not a bot",
    "age-restricted",
    "age restricted",
    "login required",
    "use --cookies",
];

/// Flags applied to every ladder strategy: bounded retries, IPv4 forcing,
/// geo bypass, single-item mode, extract audio as mp3.
const COMMON_ARGS: &[&str] = &[
    "-R",
    "3",
    "--fragment-retries",
    "3",
    "--force-ipv4",
    "--geo-bypass",
    "--no-playlist",
    "-x",
    "--audio-format",
    "mp3",
];

const FORMAT_STRICT: &str = "bestaudio[ext=m4a]/bestaudio[protocol!=m3u8]/bestaudio/best";
const FORMAT_RELAXED: &str = "bestaudio/best";
const FORMAT_PREFER_M4A: &str = "bestaudio[ext=m4a]/bestaudio/best";

/// One rung of the download fallback ladder.
struct Strategy {
    name: &'static str,
    player_client: &'static str,
    format: &'static str,
    use_cookies: bool,
}

/// The ladder, in attempt order. Different player identities route around
/// platform-side blocks tied to a specific client fingerprint; the cookie
/// rung handles age/region restrictions anonymous access cannot satisfy.
const LADDER: &[Strategy] = &[
    Strategy {
        name: "web-m4a",
        player_client: "web",
        format: FORMAT_STRICT,
        use_cookies: false,
    },
    Strategy {
        name: "web-any",
        player_client: "web",
        format: FORMAT_RELAXED,
        use_cookies: false,
    },
    Strategy {
        name: "android",
        player_client: "android",
        format: FORMAT_PREFER_M4A,
        use_cookies: false,
    },
    Strategy {
        name: "ios",
        player_client: "ios",
        format: FORMAT_PREFER_M4A,
        use_cookies: false,
    },
    Strategy {
        name: "tvhtml5",
        player_client: "tvhtml5",
        format: FORMAT_PREFER_M4A,
        use_cookies: false,
    },
    Strategy {
        name: "cookies",
        player_client: "web",
        format: FORMAT_PREFER_M4A,
        use_cookies: true,
    },
];

/// Exit status and combined output of one external tool run.
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

/// Executes the external downloader. A seam so the fallback ladder can be
/// driven without the real tool.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Verify `program` can be executed at all.
    async fn check_available(&self, _program: &str) -> Result<()> {
        Ok(())
    }

    /// Run `program` with `args`, capturing exit status plus combined
    /// stdout and stderr.
    async fn run(&self, program: &str, args: &[String], deadline: Duration) -> Result<ToolOutput>;
}

/// Production runner on tokio's process API. Children are killed when the
/// owning future is dropped, so request cancellation reaps them.
pub struct SystemRunner;

#[async_trait]
impl ToolRunner for SystemRunner {
    async fn check_available(&self, program: &str) -> Result<()> {
        let out = self
            .run(program, &["--version".to_string()], Duration::from_secs(10))
            .await?;
        if out.success {
            Ok(())
        } else {
            Err(Error::ToolMissing {
                tool: program.to_string(),
            })
        }
    }

    async fn run(&self, program: &str, args: &[String], deadline: Duration) -> Result<ToolOutput> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args).kill_on_drop(true);

        let output = match tokio::time::timeout(deadline, cmd.output()).await {
            Err(_) => {
                return Ok(ToolOutput {
                    success: false,
                    output: format!("{program} timed out after {}s", deadline.as_secs()),
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ToolMissing {
                    tool: program.to_string(),
                })
            }
            Ok(Err(e)) => return Err(Error::Io(e)),
            Ok(Ok(output)) => output,
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ToolOutput {
            success: output.status.success(),
            output: text,
        })
    }
}

/// Resolves a remote URL into a local audio file.
///
/// Drives `yt-dlp` through the fallback ladder, then (when a mirror base
/// URL is configured) falls back to resolving direct stream URLs and
/// downloading the best audio stream over plain HTTP.
///
/// # Security
/// - URLs are validated to start with http:// or https://
/// - Arguments are passed to the tool via `.arg()` (no shell expansion)
/// - All output lands inside the caller's scratch directory
pub struct MediaAcquirer {
    runner: Box<dyn ToolRunner>,
    http: reqwest::Client,
    cookies_file: Option<PathBuf>,
    cookies_content: Option<String>,
    mirror_base_url: Option<String>,
    download_timeout: Duration,
}

impl MediaAcquirer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_runner(config, Box::new(SystemRunner))
    }

    pub fn with_runner(config: &PipelineConfig, runner: Box<dyn ToolRunner>) -> Self {
        Self {
            runner,
            http: reqwest::Client::new(),
            cookies_file: config.cookies_file.clone(),
            cookies_content: config.cookies_content.clone(),
            mirror_base_url: config.mirror_base_url.clone(),
            download_timeout: config.download_timeout,
        }
    }

    /// Download the audio of `url` into `work_dir`.
    ///
    /// Strategies run in ladder order with the URL unchanged, stopping at
    /// the first one that leaves a usable file. Partial output from a
    /// failed strategy is deleted before the next one runs.
    pub async fn acquire(&self, url: &str, work_dir: &Path) -> Result<AcquiredAudio> {
        validate_url(url)?;

        self.runner.check_available("yt-dlp").await?;

        info!(%url, "downloading audio");

        let base = format!(
            "yt_{}",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let out_pattern = work_dir
            .join(format!("{base}.%(ext)s"))
            .to_str()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "scratch directory path is not valid UTF-8",
                ))
            })?
            .to_string();

        let cookies_path = self.stage_cookies(work_dir)?;

        let mut attempts: Vec<FallbackAttempt> = Vec::new();

        for strategy in LADDER {
            let args = build_args(strategy, cookies_path.as_deref(), &out_pattern, url);
            debug!(strategy = strategy.name, "running downloader");

            let out = self.runner.run("yt-dlp", &args, self.download_timeout).await?;
            if out.success {
                if let Some(audio) = find_produced(work_dir, &base)? {
                    info!(
                        strategy = strategy.name,
                        path = %audio.path.display(),
                        size = audio.size_bytes,
                        "audio downloaded"
                    );
                    return Ok(audio);
                }
            }

            warn!(strategy = strategy.name, "download attempt failed");
            let mut output = out.output;
            if out.success {
                output.push_str("(tool exited 0 but produced no output file)");
            }
            attempts.push(FallbackAttempt {
                strategy: strategy.name,
                succeeded: false,
                output,
            });
            remove_partial(work_dir, &base);
        }

        if let Some(mirror) = &self.mirror_base_url {
            match self.acquire_via_mirror(mirror, url, work_dir, &base).await {
                Ok(audio) => {
                    info!(
                        strategy = "stream-mirror",
                        path = %audio.path.display(),
                        size = audio.size_bytes,
                        "audio downloaded"
                    );
                    return Ok(audio);
                }
                Err(e) => {
                    warn!(strategy = "stream-mirror", error = %e, "download attempt failed");
                    attempts.push(FallbackAttempt {
                        strategy: "stream-mirror",
                        succeeded: false,
                        output: e.to_string(),
                    });
                    remove_partial(work_dir, &base);
                }
            }
        }

        Err(exhaustion_error(&attempts))
    }

    /// Resolve the cookie source for the `cookies` strategy: a configured
    /// file wins, raw configured content is staged into `work_dir` (so it
    /// dies with the invocation), and None means browser cookies.
    fn stage_cookies(&self, work_dir: &Path) -> Result<Option<PathBuf>> {
        if let Some(file) = &self.cookies_file {
            return Ok(Some(file.clone()));
        }
        if let Some(content) = &self.cookies_content {
            let path = work_dir.join("cookies.txt");
            std::fs::write(&path, content)?;
            return Ok(Some(path));
        }
        Ok(None)
    }

    /// Last resort: ask a mirror API for direct stream URLs and download
    /// the best audio stream ourselves, no downloader tool involved.
    async fn acquire_via_mirror(
        &self,
        mirror: &str,
        url: &str,
        work_dir: &Path,
        base: &str,
    ) -> Result<AcquiredAudio> {
        let id = video_id(url).ok_or_else(|| {
            Error::InvalidUrl(format!("cannot extract a video id from {url}"))
        })?;
        let endpoint = format!("{}/streams/{}", mirror.trim_end_matches('/'), id);
        debug!(%endpoint, "resolving direct audio streams");

        let response = self
            .http
            .get(&endpoint)
            .timeout(self.download_timeout)
            .send()
            .await?
            .error_for_status()?;
        let streams: StreamsResponse = response.json().await?;

        let stream = pick_audio_stream(&streams.audio_streams).ok_or_else(|| {
            Error::ResponseParseFailed("mirror response contains no audio streams".to_string())
        })?;
        let ext = extension_for_mime(stream.mime_type.as_deref());
        let dest = work_dir.join(format!("{base}.{ext}"));

        debug!(bitrate = stream.bitrate, mime = ?stream.mime_type, "downloading stream");

        let response = self
            .http
            .get(&stream.url)
            .timeout(self.download_timeout)
            .send()
            .await?
            .error_for_status()?;

        let mut file = std::fs::File::create(&dest)?;
        let mut body = response.bytes_stream();

        use std::io::Write;
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?)?;
        }
        file.flush()?;
        drop(file);

        let size_bytes = std::fs::metadata(&dest)?.len();
        if size_bytes == 0 {
            std::fs::remove_file(&dest).ok();
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "mirror stream download produced an empty file",
            )));
        }

        Ok(AcquiredAudio {
            path: dest,
            size_bytes,
        })
    }
}

/// Assemble one strategy's full downloader argv. The source URL is always
/// the last argument and is identical across strategies.
fn build_args(
    strategy: &Strategy,
    cookies: Option<&Path>,
    out_pattern: &str,
    url: &str,
) -> Vec<String> {
    let mut args: Vec<String> = COMMON_ARGS.iter().map(|s| s.to_string()).collect();
    args.push("--extractor-args".to_string());
    args.push(format!("youtube:player_client={}", strategy.player_client));
    args.push("-f".to_string());
    args.push(strategy.format.to_string());
    if strategy.use_cookies {
        match cookies {
            Some(file) => {
                args.push("--cookies".to_string());
                args.push(file.display().to_string());
            }
            None => {
                args.push("--cookies-from-browser".to_string());
                args.push("chrome".to_string());
            }
        }
    }
    args.push("-o".to_string());
    args.push(out_pattern.to_string());
    args.push(url.to_string());
    args
}

/// Validate that a string looks like a URL.
/// Rejects anything that isn't http:// or https://.
fn validate_url(url: &str) -> Result<()> {
    let trimmed = url.trim();
    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        Ok(())
    } else {
        Err(Error::InvalidUrl(trimmed.to_string()))
    }
}

/// Extract the 11-character video id from the common YouTube URL shapes
/// (watch, youtu.be, shorts, embed).
fn video_id(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let rest = rest.strip_prefix("www.").unwrap_or(rest);

    let candidate = if let Some(r) = rest.strip_prefix("youtu.be/") {
        r
    } else if let Some(r) = rest.strip_prefix("youtube.com/shorts/") {
        r
    } else if let Some(r) = rest.strip_prefix("youtube.com/embed/") {
        r
    } else if let Some(pos) = rest.find("v=") {
        &rest[pos + 2..]
    } else {
        return None;
    };

    let id: String = candidate
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (id.len() == 11).then_some(id)
}

/// Locate the file a strategy produced: the expected `.mp3` first, else any
/// `base.*` file (the tool's container choice can vary).
fn find_produced(dir: &Path, base: &str) -> Result<Option<AcquiredAudio>> {
    let expected = dir.join(format!("{base}.mp3"));
    let path = if expected.exists() {
        Some(expected)
    } else {
        let prefix = format!("{base}.");
        let mut found = None;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) {
                found = Some(entry.path());
                break;
            }
        }
        found
    };

    match path {
        Some(path) => {
            let size_bytes = std::fs::metadata(&path)?.len();
            Ok(Some(AcquiredAudio { path, size_bytes }))
        }
        None => Ok(None),
    }
}

/// Delete whatever a failed strategy left behind so the next strategy (and
/// the Segmenter) never sees a partial file.
fn remove_partial(dir: &Path, base: &str) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(base) {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                warn!(file = name, error = %e, "failed to remove partial download");
            }
        }
    }
}

/// Build the terminal error once every strategy has failed.
fn exhaustion_error(attempts: &[FallbackAttempt]) -> Error {
    let mut combined = String::new();
    for attempt in attempts {
        // Limit per-attempt output to avoid dumping huge tool logs
        let truncated: String = attempt.output.chars().take(1000).collect();
        combined.push_str(&format!("[{}] {}\n", attempt.strategy, truncated));
    }

    if is_auth_required(&combined) {
        Error::AuthenticationRequired { output: combined }
    } else {
        Error::AcquisitionFailed {
            attempts: attempts.len(),
            output: combined,
        }
    }
}

fn is_auth_required(output: &str) -> bool {
    let normalized = output.to_lowercase().replace('\u{2019}', "'");
    AUTH_REQUIRED_PHRASES
        .iter()
        .any(|phrase| normalized.contains(phrase))
}

#[derive(Deserialize)]
struct StreamsResponse {
    #[serde(rename = "audioStreams")]
    audio_streams: Vec<AudioStream>,
}

#[derive(Deserialize)]
struct AudioStream {
    url: String,
    bitrate: Option<u64>,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

/// Prefer the highest-bitrate `audio/mp4` stream (a container the
/// transcription API is known to accept), else highest bitrate overall.
fn pick_audio_stream(streams: &[AudioStream]) -> Option<&AudioStream> {
    streams
        .iter()
        .filter(|s| s.mime_type.as_deref() == Some("audio/mp4"))
        .max_by_key(|s| s.bitrate.unwrap_or(0))
        .or_else(|| streams.iter().max_by_key(|s| s.bitrate.unwrap_or(0)))
}

fn extension_for_mime(mime: Option<&str>) -> &'static str {
    match mime {
        Some("audio/mp4") => "m4a",
        Some("audio/webm") => "webm",
        _ => "mp3",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_validate_url_https() {
        assert!(validate_url("https://youtube.com/watch?v=abc").is_ok());
    }

    #[test]
    fn test_validate_url_http() {
        assert!(validate_url("http://example.com/audio.mp3").is_ok());
    }

    #[test]
    fn test_validate_url_rejects_no_scheme() {
        assert!(validate_url("youtube.com/watch?v=abc").is_err());
    }

    #[test]
    fn test_validate_url_rejects_file_scheme() {
        assert!(validate_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_validate_url_rejects_empty() {
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_validate_url_rejects_command() {
        assert!(validate_url("$(whoami)").is_err());
    }

    #[test]
    fn test_video_id_watch_url() {
        assert_eq!(
            video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_video_id_watch_url_with_extra_params() {
        assert_eq!(
            video_id("https://youtube.com/watch?v=dQw4w9WgXcQ&t=30s"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_video_id_short_link() {
        assert_eq!(
            video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_video_id_shorts_and_embed() {
        assert_eq!(
            video_id("https://www.youtube.com/shorts/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_video_id_rejects_other_urls() {
        assert_eq!(video_id("https://example.com/watch"), None);
        assert_eq!(video_id("https://youtu.be/short"), None);
    }

    #[test]
    fn test_ladder_order_and_length() {
        let names: Vec<&str> = LADDER.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["web-m4a", "web-any", "android", "ios", "tvhtml5", "cookies"]
        );
        assert!(LADDER.last().unwrap().use_cookies);
    }

    #[test]
    fn test_build_args_shape() {
        let args = build_args(&LADDER[0], None, "/tmp/yt_1.%(ext)s", "https://youtu.be/x");

        assert_eq!(args[0], "-R");
        assert_eq!(args[1], "3");
        assert!(args.contains(&"--force-ipv4".to_string()));
        assert!(args.contains(&"--geo-bypass".to_string()));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"youtube:player_client=web".to_string()));
        assert!(args.contains(&FORMAT_STRICT.to_string()));
        assert_eq!(args.last(), Some(&"https://youtu.be/x".to_string()));
        assert!(!args.contains(&"--cookies".to_string()));
        assert!(!args.contains(&"--cookies-from-browser".to_string()));
    }

    #[test]
    fn test_build_args_cookie_file() {
        let cookies = LADDER.iter().find(|s| s.use_cookies).unwrap();
        let args = build_args(
            cookies,
            Some(Path::new("/tmp/cookies.txt")),
            "/tmp/yt_1.%(ext)s",
            "https://youtu.be/x",
        );

        let pos = args.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(args[pos + 1], "/tmp/cookies.txt");
        assert!(!args.contains(&"--cookies-from-browser".to_string()));
    }

    #[test]
    fn test_build_args_browser_cookies_when_no_file() {
        let cookies = LADDER.iter().find(|s| s.use_cookies).unwrap();
        let args = build_args(cookies, None, "/tmp/yt_1.%(ext)s", "https://youtu.be/x");

        let pos = args.iter().position(|a| a == "--cookies-from-browser").unwrap();
        assert_eq!(args[pos + 1], "chrome");
    }

    #[test]
    fn test_is_auth_required_phrases() {
        assert!(is_auth_required(
            "ERROR: Sign in to confirm you\u{2019}re not a bot"
        ));
        assert!(is_auth_required("this video is AGE-RESTRICTED"));
        assert!(is_auth_required("Use --cookies for authentication"));
        assert!(!is_auth_required("HTTP Error 404: Not Found"));
        assert!(!is_auth_required(""));
    }

    #[test]
    fn test_find_produced_prefers_expected_mp3() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("yt_1.webm"), b"webm").unwrap();
        std::fs::write(dir.path().join("yt_1.mp3"), b"mp3-data").unwrap();

        let audio = find_produced(dir.path(), "yt_1").unwrap().unwrap();
        assert!(audio.path.ends_with("yt_1.mp3"));
        assert_eq!(audio.size_bytes, 8);
    }

    #[test]
    fn test_find_produced_falls_back_to_any_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("yt_2.m4a"), b"m4a").unwrap();

        let audio = find_produced(dir.path(), "yt_2").unwrap().unwrap();
        assert!(audio.path.ends_with("yt_2.m4a"));
    }

    #[test]
    fn test_find_produced_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("other.mp3"), b"x").unwrap();
        assert!(find_produced(dir.path(), "yt_3").unwrap().is_none());
    }

    #[test]
    fn test_pick_audio_stream_prefers_mp4() {
        let streams = vec![
            AudioStream {
                url: "http://a/webm-high".into(),
                bitrate: Some(160_000),
                mime_type: Some("audio/webm".into()),
            },
            AudioStream {
                url: "http://a/mp4-low".into(),
                bitrate: Some(48_000),
                mime_type: Some("audio/mp4".into()),
            },
            AudioStream {
                url: "http://a/mp4-high".into(),
                bitrate: Some(128_000),
                mime_type: Some("audio/mp4".into()),
            },
        ];
        assert_eq!(pick_audio_stream(&streams).unwrap().url, "http://a/mp4-high");
    }

    #[test]
    fn test_pick_audio_stream_falls_back_to_best_overall() {
        let streams = vec![
            AudioStream {
                url: "http://a/low".into(),
                bitrate: Some(48_000),
                mime_type: Some("audio/webm".into()),
            },
            AudioStream {
                url: "http://a/high".into(),
                bitrate: Some(160_000),
                mime_type: Some("audio/webm".into()),
            },
        ];
        assert_eq!(pick_audio_stream(&streams).unwrap().url, "http://a/high");
        assert!(pick_audio_stream(&[]).is_none());
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime(Some("audio/mp4")), "m4a");
        assert_eq!(extension_for_mime(Some("audio/webm")), "webm");
        assert_eq!(extension_for_mime(Some("audio/ogg")), "mp3");
        assert_eq!(extension_for_mime(None), "mp3");
    }

    #[test]
    fn test_streams_response_parse() {
        let json = r#"{
            "audioStreams": [
                {"url": "http://a/1", "bitrate": 128000, "mimeType": "audio/mp4"},
                {"url": "http://a/2"}
            ],
            "videoStreams": []
        }"#;
        let parsed: StreamsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.audio_streams.len(), 2);
        assert_eq!(parsed.audio_streams[0].bitrate, Some(128_000));
        assert!(parsed.audio_streams[1].mime_type.is_none());
    }

    // --- ladder behavior, driven through a scripted runner ---

    enum Step {
        /// Exit non-zero with this output.
        Fail(&'static str),
        /// Exit non-zero after leaving a partial file behind.
        FailDirty(&'static str),
        /// Exit zero and write the output file.
        Succeed,
        /// Exit zero without writing anything.
        SucceedSilently,
    }

    struct ScriptedRunner {
        steps: Vec<Step>,
        calls: Mutex<usize>,
        args_log: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps,
                calls: Mutex::new(0),
                args_log: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }

        fn logged_args(&self) -> Vec<Vec<String>> {
            self.args_log.lock().unwrap().clone()
        }

        /// The `-o` output pattern with the extension placeholder stripped.
        fn out_base(args: &[String]) -> PathBuf {
            let pos = args.iter().position(|a| a == "-o").unwrap();
            let pattern = &args[pos + 1];
            PathBuf::from(pattern.trim_end_matches(".%(ext)s"))
        }
    }

    #[async_trait]
    impl ToolRunner for ScriptedRunner {
        async fn run(
            &self,
            _program: &str,
            args: &[String],
            _deadline: Duration,
        ) -> Result<ToolOutput> {
            self.args_log.lock().unwrap().push(args.to_vec());
            let mut calls = self.calls.lock().unwrap();
            let step = &self.steps[*calls % self.steps.len()];
            *calls += 1;

            match step {
                Step::Fail(output) => Ok(ToolOutput {
                    success: false,
                    output: output.to_string(),
                }),
                Step::FailDirty(output) => {
                    let base = Self::out_base(args);
                    let partial = format!("{}.mp3.part", base.display());
                    std::fs::write(partial, b"partial").unwrap();
                    Ok(ToolOutput {
                        success: false,
                        output: output.to_string(),
                    })
                }
                Step::Succeed => {
                    let base = Self::out_base(args);
                    let path = format!("{}.mp3", base.display());
                    std::fs::write(path, b"downloaded-audio").unwrap();
                    Ok(ToolOutput {
                        success: true,
                        output: String::new(),
                    })
                }
                Step::SucceedSilently => Ok(ToolOutput {
                    success: true,
                    output: String::new(),
                }),
            }
        }
    }

    fn dir_entry_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_first_strategy_success_stops_ladder() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(vec![Step::Succeed]);
        let config = PipelineConfig::new("sk-test");
        let acquirer = MediaAcquirer::with_runner(&config, Box::new(runner));

        let audio = acquirer
            .acquire("https://youtu.be/dQw4w9WgXcQ", dir.path())
            .await
            .unwrap();
        assert!(audio.path.exists());
        assert_eq!(audio.size_bytes, 16);
    }

    #[tokio::test]
    async fn test_ladder_advances_to_sixth_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let runner = std::sync::Arc::new(ScriptedRunner::new(vec![
            Step::Fail("HTTP Error 403: Forbidden"),
            Step::Fail("HTTP Error 403: Forbidden"),
            Step::Fail("HTTP Error 403: Forbidden"),
            Step::Fail("HTTP Error 403: Forbidden"),
            Step::Fail("HTTP Error 403: Forbidden"),
            Step::Succeed,
        ]));
        let config = PipelineConfig::new("sk-test");
        let acquirer = MediaAcquirer::with_runner(&config, Box::new(SharedRunner(runner.clone())));

        let audio = acquirer
            .acquire("https://youtu.be/dQw4w9WgXcQ", dir.path())
            .await
            .unwrap();
        assert_eq!(runner.calls(), 6);
        assert!(audio.path.exists());
    }

    #[tokio::test]
    async fn test_exhaustion_returns_acquisition_failed() {
        let dir = tempfile::tempdir().unwrap();
        let runner = std::sync::Arc::new(ScriptedRunner::new(vec![Step::FailDirty(
            "HTTP Error 403: Forbidden",
        )]));
        let config = PipelineConfig::new("sk-test");
        let acquirer = MediaAcquirer::with_runner(&config, Box::new(SharedRunner(runner.clone())));

        let result = acquirer
            .acquire("https://youtu.be/dQw4w9WgXcQ", dir.path())
            .await;
        assert_eq!(runner.calls(), 6);
        match result {
            Err(Error::AcquisitionFailed { attempts, output }) => {
                assert_eq!(attempts, 6);
                assert!(output.contains("[web-m4a]"));
                assert!(output.contains("[cookies]"));
                assert!(output.contains("403"));
            }
            other => panic!("expected AcquisitionFailed, got {other:?}"),
        }
        // Every strategy got the same, unchanged URL.
        for args in runner.logged_args() {
            assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/dQw4w9WgXcQ"));
        }
        // No partial file may remain staged for the segmenter.
        assert_eq!(dir_entry_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_classifies_auth_required() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(vec![Step::Fail(
            "ERROR: Sign in to confirm you\u{2019}re not a bot.",
        )]);
        let config = PipelineConfig::new("sk-test");
        let acquirer = MediaAcquirer::with_runner(&config, Box::new(runner));

        let result = acquirer
            .acquire("https://youtu.be/dQw4w9WgXcQ", dir.path())
            .await;
        assert!(matches!(result, Err(Error::AuthenticationRequired { .. })));
    }

    #[tokio::test]
    async fn test_auth_classification_survives_failed_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::new(vec![Step::Fail(
            "ERROR: Sign in to confirm you\u{2019}re not a bot.",
        )]);
        // Port 9 on loopback has no listener, so the mirror attempt fails
        // too and all seven strategies are recorded.
        let config = PipelineConfig::new("sk-test").mirror_base_url("http://127.0.0.1:9");
        let acquirer = MediaAcquirer::with_runner(&config, Box::new(runner));

        let result = acquirer
            .acquire("https://youtu.be/dQw4w9WgXcQ", dir.path())
            .await;
        match result {
            Err(Error::AuthenticationRequired { output }) => {
                assert!(output.contains("[stream-mirror]"));
            }
            other => panic!("expected AuthenticationRequired, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cookie_content_staged_into_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let runner = std::sync::Arc::new(ScriptedRunner::new(vec![Step::Fail("403")]));
        let config = PipelineConfig::new("sk-test")
            .cookies_content("# Netscape HTTP Cookie File\n.youtube.com\tTRUE\t/\n");
        let acquirer = MediaAcquirer::with_runner(&config, Box::new(SharedRunner(runner.clone())));

        let result = acquirer
            .acquire("https://youtu.be/dQw4w9WgXcQ", dir.path())
            .await;
        assert!(result.is_err());

        let staged = dir.path().join("cookies.txt");
        assert!(staged.exists());
        assert!(std::fs::read_to_string(&staged)
            .unwrap()
            .starts_with("# Netscape"));

        // The cookie strategy pointed yt-dlp at the staged file.
        let args = runner.logged_args();
        let cookie_args = args.last().unwrap();
        let pos = cookie_args.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(cookie_args[pos + 1], staged.display().to_string());
    }

    #[tokio::test]
    async fn test_silent_success_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = std::sync::Arc::new(ScriptedRunner::new(vec![
            Step::SucceedSilently,
            Step::Succeed,
        ]));
        let config = PipelineConfig::new("sk-test");
        let acquirer = MediaAcquirer::with_runner(&config, Box::new(SharedRunner(runner.clone())));

        let audio = acquirer
            .acquire("https://youtu.be/dQw4w9WgXcQ", dir.path())
            .await
            .unwrap();
        assert_eq!(runner.calls(), 2);
        assert!(audio.path.exists());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_any_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let runner = std::sync::Arc::new(ScriptedRunner::new(vec![Step::Succeed]));
        let config = PipelineConfig::new("sk-test");
        let acquirer = MediaAcquirer::with_runner(&config, Box::new(SharedRunner(runner.clone())));

        let result = acquirer.acquire("not-a-url", dir.path()).await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_tool_reported_before_ladder() {
        struct NoTool;

        #[async_trait]
        impl ToolRunner for NoTool {
            async fn check_available(&self, program: &str) -> Result<()> {
                Err(Error::ToolMissing {
                    tool: program.to_string(),
                })
            }

            async fn run(
                &self,
                _program: &str,
                _args: &[String],
                _deadline: Duration,
            ) -> Result<ToolOutput> {
                panic!("ladder must not run when the tool is missing");
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new("sk-test");
        let acquirer = MediaAcquirer::with_runner(&config, Box::new(NoTool));

        let result = acquirer
            .acquire("https://youtu.be/dQw4w9WgXcQ", dir.path())
            .await;
        assert!(matches!(result, Err(Error::ToolMissing { ref tool }) if tool == "yt-dlp"));
    }

    /// Lets a test keep a handle on a runner that the acquirer owns boxed.
    struct SharedRunner(std::sync::Arc<ScriptedRunner>);

    #[async_trait]
    impl ToolRunner for SharedRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            deadline: Duration,
        ) -> Result<ToolOutput> {
            self.0.run(program, args, deadline).await
        }
    }
}
