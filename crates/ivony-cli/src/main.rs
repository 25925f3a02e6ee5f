use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use ivony_contracts::events::{new_session_id, EventWriter};
use ivony_contracts::gallery::split_data_url;
use ivony_contracts::settings::{AspectRatio, ImageStyle, Mode};
use ivony_engine::{default_service_registry, GeminiConfig, Orchestrator, UploadedImage};

mod chat;
mod view;

#[derive(Debug, Parser)]
#[command(name = "ivony", version, about = "Generate and edit images from text prompts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session with a gallery of results.
    Chat(ChatArgs),
    /// Run one generate or edit action and write the image to disk.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct ServiceArgs {
    /// Image service to call (`gemini` or `dryrun`).
    #[arg(long, default_value = "gemini")]
    service: String,
    /// Append session events to this JSONL file.
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    generate_model: Option<String>,
    #[arg(long)]
    edit_model: Option<String>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    service: ServiceArgs,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[command(flatten)]
    service: ServiceArgs,
    #[arg(long)]
    prompt: String,
    /// Edit this image instead of generating from scratch.
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long, default_value_t = ImageStyle::Realistic)]
    style: ImageStyle,
    #[arg(long, default_value_t = AspectRatio::Square)]
    aspect_ratio: AspectRatio,
    #[arg(long)]
    out: PathBuf,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("ivony error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            let orchestrator = build_orchestrator(&args.service)?;
            chat::run_chat(orchestrator)?;
            Ok(0)
        }
        Command::Run(args) => run_once(args),
    }
}

fn build_orchestrator(args: &ServiceArgs) -> Result<Orchestrator> {
    let config = GeminiConfig::from_env()
        .with_generate_model(args.generate_model.clone())
        .with_edit_model(args.edit_model.clone());
    let registry = default_service_registry(config);
    let service = registry.get(&args.service).ok_or_else(|| {
        anyhow!(
            "unknown service '{}' (available: {})",
            args.service.trim(),
            registry.names().join(", ")
        )
    })?;
    let session_id = new_session_id();
    let events = match args.events.as_ref() {
        Some(path) => EventWriter::new(path, session_id),
        None => EventWriter::discard(session_id),
    };
    Ok(Orchestrator::new(service, events))
}

fn run_once(args: RunArgs) -> Result<i32> {
    let mut orchestrator = build_orchestrator(&args.service)?;
    orchestrator.set_style(args.style);
    orchestrator.set_aspect_ratio(args.aspect_ratio);
    if let Some(path) = args.image.as_ref() {
        orchestrator.set_mode(Mode::Edit);
        orchestrator.upload_image(UploadedImage::from_path(path)?);
    }
    orchestrator.set_prompt(args.prompt);

    let result = orchestrator.perform_action();
    orchestrator.finish();
    let image = match result {
        Ok(image) => image,
        Err(err) => {
            eprintln!("{err}");
            return Ok(1);
        }
    };

    let (mime, payload) =
        split_data_url(&image.url).ok_or_else(|| anyhow!("result {} is not inline", image.id))?;
    let bytes = BASE64
        .decode(payload.as_bytes())
        .context("result image base64 decode failed")?;
    if let Some(parent) = args.out.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&args.out, bytes)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    println!("Saved {} ({mime}) to {}", image.id, args.out.display());
    Ok(0)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use anyhow::{bail, Result};
    use clap::Parser;

    use super::{run_once, Cli, Command, RunArgs};

    fn run_args(extra: &[&str]) -> Result<RunArgs> {
        let mut argv = vec!["ivony", "run", "--service", "dryrun"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv)?.command {
            Command::Run(args) => Ok(args),
            Command::Chat(_) => bail!("expected run arguments"),
        }
    }

    fn path_arg(path: &Path) -> String {
        path.display().to_string()
    }

    #[test]
    fn run_writes_decoded_image_into_new_directories() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let out = temp.path().join("renders").join("fox").join("out.png");
        let events = temp.path().join("events.jsonl");
        let args = run_args(&[
            "--prompt",
            "A red fox in snow",
            "--aspect-ratio",
            "16:9",
            "--out",
            &path_arg(&out),
            "--events",
            &path_arg(&events),
        ])?;

        assert_eq!(run_once(args)?, 0);

        let image = image::open(&out)?;
        assert_eq!(image.width(), 64);
        assert!(image.height() < image.width());
        let log = std::fs::read_to_string(&events)?;
        assert!(log.contains("\"type\":\"image_created\""));
        assert!(log.contains("\"type\":\"session_finished\""));
        Ok(())
    }

    #[test]
    fn run_edits_the_given_image() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("source.png");
        image::RgbImage::from_pixel(20, 10, image::Rgb([200, 40, 40])).save(&source)?;
        let out = temp.path().join("edited.png");
        let args = run_args(&[
            "--prompt",
            "make it blue",
            "--image",
            &path_arg(&source),
            "--out",
            &path_arg(&out),
        ])?;

        assert_eq!(run_once(args)?, 0);
        let edited = image::open(&out)?;
        assert_eq!((edited.width(), edited.height()), (20, 10));
        Ok(())
    }

    #[test]
    fn blank_prompt_exits_with_failure_and_writes_nothing() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let out = temp.path().join("nested").join("out.png");
        let args = run_args(&["--prompt", "   ", "--out", &path_arg(&out)])?;

        assert_eq!(run_once(args)?, 1);
        assert!(!out.exists());
        assert!(!out.parent().map(Path::exists).unwrap_or(false));
        Ok(())
    }

    #[test]
    fn unknown_service_is_a_fatal_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let out = temp.path().join("out.png");
        let args = Cli::try_parse_from([
            "ivony",
            "run",
            "--service",
            "midjourney",
            "--prompt",
            "boat",
            "--out",
            &path_arg(&out),
        ])?;
        let Command::Run(args) = args.command else {
            bail!("expected run arguments");
        };

        let err = run_once(args).unwrap_err();
        assert!(format!("{err:#}").contains("unknown service 'midjourney'"));
        assert!(!out.exists());
        Ok(())
    }
}
