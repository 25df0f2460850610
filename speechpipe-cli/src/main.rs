use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use indicatif::ProgressBar;
use speechpipe::{Error, ErrorCategory, Language, Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "speechpipe", about = "Transcribe audio from a URL or local file")]
struct Cli {
    /// URL or local file path to transcribe.
    input: String,

    /// Language code (e.g. "en", "de") or "auto" for detection.
    #[arg(short, long, default_value = "auto")]
    language: String,

    /// Write the transcript to a file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Transcription model passed to the API.
    #[arg(short, long, default_value = speechpipe::DEFAULT_MODEL)]
    model: String,

    /// Base URL of the transcription API.
    #[arg(long, default_value = speechpipe::DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// Print the transcript as JSON instead of plain text.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("speechpipe=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let api_key = match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            eprintln!("Error: OPENAI_API_KEY is not set");
            std::process::exit(exit_code(ErrorCategory::InvalidInput));
        }
    };

    let language = match Language::new(&cli.language) {
        Ok(lang) => lang,
        Err(e) => fail(&e),
    };

    let mut config = PipelineConfig::new(api_key)
        .model(cli.model)
        .api_base_url(cli.api_base_url);

    if let Ok(cookies) = std::env::var("YTDLP_COOKIES") {
        let path = PathBuf::from(&cookies);
        if path.is_file() {
            config = config.cookies_file(path);
        } else {
            tracing::warn!(path = %cookies, "YTDLP_COOKIES points to a missing file, ignoring");
        }
    }
    if let Ok(mirror) = std::env::var("STREAM_MIRROR_URL") {
        if !mirror.trim().is_empty() {
            config = config.mirror_base_url(mirror.trim());
        }
    }

    let pipeline = Pipeline::new(config);

    let is_url = cli.input.starts_with("http://") || cli.input.starts_with("https://");

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(if is_url {
        "Downloading and transcribing..."
    } else {
        "Transcribing..."
    });
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = if is_url {
        pipeline.run_url(&cli.input, &language).await
    } else {
        pipeline.run_local(&cli.input, &language).await
    };

    spinner.finish_and_clear();

    let transcript = match result {
        Ok(t) => t,
        Err(e) => fail(&e),
    };

    eprintln!("Transcription complete ({} mode)", transcript.mode.as_str());

    let output_text = if cli.json {
        match transcript.to_json_pretty() {
            Ok(j) => j,
            Err(e) => {
                eprintln!("JSON error: {e}");
                std::process::exit(exit_code(ErrorCategory::Internal));
            }
        }
    } else {
        transcript.text
    };

    match cli.output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &output_text) {
                eprintln!("Error writing to {}: {e}", path.display());
                std::process::exit(exit_code(ErrorCategory::Internal));
            }
            eprintln!("Written to {}", path.display());
        }
        None => print!("{output_text}"),
    }
}

/// Print the category message, the specific error, and any hint and raw
/// details, then exit with the category's code.
fn fail(e: &Error) -> ! {
    eprintln!("Error: {}", e.category().message());
    eprintln!("  {e}");
    if let Some(hint) = e.hint() {
        eprintln!("Hint: {hint}");
    }
    if let Some(details) = e.details() {
        eprintln!("Details:\n{details}");
    }
    std::process::exit(exit_code(e.category()));
}

fn exit_code(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::Internal => 1,
        ErrorCategory::InvalidInput => 2,
        ErrorCategory::MissingDependency => 3,
        ErrorCategory::AuthenticationRequired => 4,
        ErrorCategory::TranscriptionFailed => 5,
    }
}
