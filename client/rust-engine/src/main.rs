use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lyriclab_engine::config::{Config, CreditPolicy};
use lyriclab_engine::metrics::render_metrics;
use lyriclab_engine::models::{Challenge, ChallengeType, Phase, Question};
use lyriclab_engine::services::challenge_session::Settlement;
use lyriclab_engine::services::question_bank::{DEFAULT_NUM_BLANKS, DEFAULT_NUM_QUESTIONS};
use lyriclab_engine::services::EngineState;

#[derive(Parser)]
#[command(name = "lyriclab-play", version, about = "Play LyricLab lyric challenges in the terminal")]
struct Cli {
    /// Challenge API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Use the bundled challenges and grade locally
    #[arg(long)]
    offline: bool,

    /// Where progress is stored between runs
    #[arg(long)]
    progress: Option<PathBuf>,

    #[arg(long, value_enum)]
    credit_policy: Option<PolicyArg>,

    /// Print Prometheus metrics before exiting
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available challenges
    List {
        #[arg(long)]
        song: Option<String>,
    },
    /// Play a challenge by id
    Play { challenge_id: String },
    /// Generate a fresh challenge for a song and play it
    Generate {
        #[arg(long)]
        song: String,
        /// Song title to display, defaults to the song id
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_enum, default_value = "fill-blank")]
        kind: KindArg,
        #[arg(long)]
        count: Option<u32>,
    },
    /// Show saved progress
    Progress,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Live,
    Reconciled,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    FillBlank,
    MultipleChoice,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Export spans only when a collector is configured
    let provider = match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(endpoint) => Some(init_telemetry(endpoint)?),
        Err(_) => None,
    };
    let otel_layer = provider.as_ref().map(|provider| {
        use opentelemetry::trace::TracerProvider as _;
        tracing_opentelemetry::layer().with_tracer(provider.tracer("lyriclab-engine"))
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lyriclab_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(otel_layer)
        .init();

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(url) = cli.api_url {
        config.api_base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(path) = cli.progress {
        config.progress_path = path;
    }
    if let Some(policy) = cli.credit_policy {
        config.credit_policy = match policy {
            PolicyArg::Live => CreditPolicy::LiveScore,
            PolicyArg::Reconciled => CreditPolicy::ReconciledPoints,
        };
    }
    config.offline |= cli.offline;

    tracing::info!(
        "Configuration loaded for environment: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
    );

    let state = EngineState::new(config).await?;

    match cli.command {
        Command::List { song } => {
            let challenges = match song {
                Some(song_id) => state.questions.challenges_for_song(&song_id).await?,
                None => state.questions.all_challenges().await?,
            };
            if challenges.is_empty() {
                println!("No challenges found.");
            }
            for challenge in challenges {
                println!(
                    "{:<16} {:<16} {} ({} questions, {} pts)",
                    challenge.id,
                    challenge.kind.as_str(),
                    challenge.song_title,
                    challenge.questions.len(),
                    challenge.total_points()
                );
            }
        }
        Command::Play { challenge_id } => {
            let challenge = state.questions.challenge(&challenge_id).await?;
            play(&state, challenge).await?;
        }
        Command::Generate {
            song,
            title,
            kind,
            count,
        } => {
            let kind = match kind {
                KindArg::FillBlank => {
                    state
                        .questions
                        .generate_fill_blank(&song, count.unwrap_or(DEFAULT_NUM_BLANKS))
                        .await?;
                    ChallengeType::FillBlank
                }
                KindArg::MultipleChoice => {
                    state
                        .questions
                        .generate_multiple_choice(&song, count.unwrap_or(DEFAULT_NUM_QUESTIONS))
                        .await?;
                    ChallengeType::MultipleChoice
                }
            };
            let challenge = state
                .questions
                .generated_challenge(&song, title.as_deref(), kind)
                .await
                .with_context(|| format!("No questions generated for song {}", song))?;
            play(&state, challenge).await?;
        }
        Command::Progress => {
            let progress = state.progress.snapshot().await;
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
    }

    if cli.metrics {
        print!("{}", render_metrics()?);
    }

    if let Some(provider) = provider {
        tracing::info!("Shutting down OpenTelemetry");
        provider.shutdown()?;
    }
    Ok(())
}

async fn play(state: &EngineState, challenge: Challenge) -> anyhow::Result<()> {
    println!("\n{} [{}]", challenge.song_title, challenge.kind);

    let session = state.start_session(challenge, |score, correct| {
        println!("\nChallenge complete! Score: {}, correct answers: {}", score, correct);
    })?;
    let mut snapshots = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(question) = session.current_question().await {
        let snapshot = session.snapshot();
        println!(
            "\nQuestion {}/{}  score {}  streak {}",
            snapshot.current_index + 1,
            snapshot.total_questions,
            snapshot.cumulative_score,
            snapshot.streak
        );
        println!("  {}", question.lyric_line);
        for (i, option) in question.options().iter().enumerate() {
            println!("  {}) {}", i + 1, option);
        }
        if session.supports_reveal().await {
            println!("  (:reveal shows the answer for half points, :skip moves on)");
        }
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            session.dispose().await;
            return Ok(());
        };

        match line.trim() {
            ":quit" => {
                session.dispose().await;
                return Ok(());
            }
            ":reveal" => {
                match session.reveal().await {
                    Some(answer) => println!("Answer: {}", question.fill_blank(&answer)),
                    None => println!("Reveal is not available for this question."),
                }
                continue;
            }
            ":skip" => {
                if session.skip().await {
                    println!("Skipped. The answer was: {}", question.correct_answer);
                }
                continue;
            }
            _ => {}
        }

        let answer = resolve_answer(&question, line.trim());
        match session.submit(&answer).await {
            Some(outcome) if outcome.was_correct => {
                println!("Correct! +{} points", outcome.points_awarded);
                println!("  {}", outcome.completed_line);
                snapshots.wait_for(|s| s.phase != Phase::ShowingResult).await?;
            }
            Some(outcome) => {
                println!("Incorrect. The answer was: {}", outcome.expected_answer);
                println!("  {}", outcome.completed_line);
                snapshots.wait_for(|s| s.phase != Phase::ShowingResult).await?;
            }
            None => println!("Please enter an answer."),
        }
    }

    if let Settlement::Settled(settled) = session.wait_settled().await {
        if let Some(reconciled) = &settled.reconciled {
            println!(
                "Result ({}): {}/{} correct, best streak {}",
                reconciled.source.as_str(),
                reconciled.correct_count,
                reconciled.total_questions,
                settled.best_streak
            );
        }
        println!(
            "Points credited: {} (completed {})",
            settled.credited_points,
            settled.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    state.progress.save().await?;
    let progress = state.progress.snapshot().await;
    println!(
        "Total points: {}  Level: {}",
        progress.total_points, progress.level
    );
    Ok(())
}

/// Multiple-choice questions accept the option number as well as its text.
fn resolve_answer(question: &Question, input: &str) -> String {
    let options = question.options();
    input
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i))
        .cloned()
        .unwrap_or_else(|| input.to_string())
}

fn init_telemetry(otlp_endpoint: String) -> anyhow::Result<opentelemetry_sdk::trace::SdkTracerProvider> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use opentelemetry_sdk::Resource;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(otlp_endpoint)
        .build()
        .context("Failed to create OTLP exporter")?;

    let resource = Resource::builder_empty()
        .with_service_name("lyriclab-play")
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok(provider)
}
