use anyhow::{bail, Context};
use clap::Parser;
use mix_assistant::conversation::Role;
use mix_assistant::http::{HttpMixService, DEFAULT_SERVER};
use mix_assistant::models::{AnalysisSettings, ModelId, ReasoningEffort, DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use mix_assistant::orchestrator::Orchestrator;
use mix_assistant::player::SilentPlayback;
use mix_assistant::selection::RegionEvent;
use mix_assistant::service::MixService;
use mix_assistant::worker::Dispatcher;
use mix_assistant::{audio, gui};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about = "AI mix critique for a selected region of a track", long_about = None)]
struct Cli {
    /// Audio file to load
    input: Option<PathBuf>,
    /// Open the desktop app even when a prompt is given
    #[arg(long)]
    gui: bool,

    /// Base URL of the analysis service
    #[arg(long, env = "MIX_ASSISTANT_SERVER", default_value = DEFAULT_SERVER)]
    server: String,
    /// Request timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,

    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,
    #[arg(long, value_enum, default_value_t = ReasoningEffort::None)]
    reasoning: ReasoningEffort,

    /// Analyze headless with this directive
    #[arg(short, long)]
    prompt: Option<String>,
    /// Region start in seconds (headless)
    #[arg(long)]
    start: Option<f64>,
    /// Region end in seconds (headless)
    #[arg(long)]
    end: Option<f64>,
    /// After the analysis, read follow-up messages from stdin
    #[arg(long)]
    chat: bool,
    /// Write the returned spectrogram PNG here
    #[arg(long)]
    spectrogram_out: Option<PathBuf>,
    /// Write the conversation as JSON here
    #[arg(long)]
    transcript: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let settings = AnalysisSettings {
        model: ModelId::new(cli.model.clone()),
        temperature: cli.temperature,
        reasoning: cli.reasoning,
    };
    let service: Arc<dyn MixService> = Arc::new(
        HttpMixService::new(cli.server.clone(), Duration::from_secs(cli.timeout_secs))
            .context("failed to build HTTP client")?,
    );
    log::info!("analysis service at {}", cli.server);

    match (&cli.input, &cli.prompt) {
        (Some(input), Some(prompt)) if !cli.gui => {
            run_headless(&cli, input.clone(), prompt.clone(), settings, service)
        }
        _ => gui::run(cli.input.clone(), settings, service),
    }
}

fn run_headless(
    cli: &Cli,
    input: PathBuf,
    prompt: String,
    settings: AnalysisSettings,
    service: Arc<dyn MixService>,
) -> anyhow::Result<()> {
    println!("Loading audio: {:?}", input);
    let source = Arc::new(audio::load_audio_file(&input)?);
    println!(
        "Audio loaded. Sample rate: {}, Channels: {}, Duration: {:.2}s",
        source.sample_rate,
        source.channels,
        source.duration_secs()
    );

    let mut orchestrator = Orchestrator::new(settings, Box::new(SilentPlayback::default()));
    let generation = orchestrator.load_source(source.clone());

    if cli.start.is_some() || cli.end.is_some() {
        let start = cli.start.unwrap_or(0.0);
        let end = cli.end.unwrap_or_else(|| source.duration_secs());
        if orchestrator
            .region_changed(generation, RegionEvent::DragEnded { start, end })
            .is_none()
        {
            bail!("invalid region {start:.2}s..{end:.2}s for a {:.2}s source", source.duration_secs());
        }
    }
    let Some(range) = orchestrator.range() else {
        bail!("source has no duration to select");
    };
    println!("Region: {:.2}s - {:.2}s", range.start(), range.end());

    orchestrator.set_prompt(prompt);
    let dispatcher = Dispatcher::new(service, || {});
    let wait = Duration::from_secs(cli.timeout_secs + 5);

    let outbound = orchestrator
        .start_analysis()
        .context("analysis could not be started")?;
    println!("Analyzing with {}...", orchestrator.settings().model);
    dispatcher.dispatch(outbound);
    let completion = dispatcher
        .recv_timeout(wait)
        .context("no answer from the analysis service")?;
    orchestrator.apply(completion);

    if let Some(error) = orchestrator.last_error() {
        bail!("analysis failed: {error}");
    }
    print_last_model_turn(&orchestrator);

    if let (Some(path), Some(spectrogram)) = (&cli.spectrogram_out, orchestrator.spectrogram()) {
        std::fs::write(path, &spectrogram.png)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Spectrogram written to {:?}", path);
    }

    if cli.chat {
        println!("Follow-up (empty line or Ctrl+D to finish):");
        for line in std::io::stdin().lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                break;
            }
            let Some(outbound) = orchestrator.send_reply(line) else {
                continue;
            };
            dispatcher.dispatch(outbound);
            let completion = dispatcher
                .recv_timeout(wait)
                .context("no answer from the analysis service")?;
            orchestrator.apply(completion);
            match orchestrator.last_error() {
                Some(error) => eprintln!("Error: {error}"),
                None => print_last_model_turn(&orchestrator),
            }
        }
    }

    if let Some(path) = &cli.transcript {
        let json = serde_json::to_string_pretty(orchestrator.log())?;
        std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        println!("Transcript written to {:?}", path);
    }

    Ok(())
}

fn print_last_model_turn(orchestrator: &Orchestrator) {
    if let Some(turn) = orchestrator.log().last().filter(|t| t.role == Role::Model) {
        println!("\n{}\n", turn.text);
    }
}
