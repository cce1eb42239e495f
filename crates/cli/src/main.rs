#![deny(warnings)]

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use protoface_core::capture::{record_session, FaceFeed, MemoryCapture};
use protoface_core::config::{
    resolve_voice, AnimationConfig, AnimationSpeed, AppConfig, Env, Expressiveness, FaceConfig,
    StdEnv, DEFAULT_ANIMATION_SPEED, DEFAULT_EXPRESSIVENESS, ENV_PIPER_BINARY, ENV_VOICE_MODEL,
};
use protoface_core::emotion::{ShapeParameters, ShapeSource};
use protoface_core::face::{FaceRenderer, FaceState};
use protoface_core::idle::{spawn_idle_loop, Gaze, GazeState, IdleBehavior};
use protoface_core::pipeline::{spawn_idle_bridge, PerformRequest, Performer};
use protoface_core::playback::{
    reconcile, scheduled_ms, AudioOutput, NullAudioOutput, PlaybackDriver, RodioOutput,
};
use protoface_core::script::{build_segments, estimate_duration_ms, DEFAULT_MS_PER_CHAR};
use protoface_core::timeline::{build_timeline, Viseme};
use protoface_core::tts::{
    PiperSynthesizer, SpeechSynthesizer, SynthesisSettings, ToneSynthesizer,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "protoface")]
#[command(about = "Procedural talking face driven by tagged scripts")]
struct Cli {
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the animation frames for a script as JSON.
    Timeline {
        script: String,
        #[command(flatten)]
        animation: AnimationArgs,
        /// Reconcile against audio of this length.
        #[arg(long)]
        audio_ms: Option<f64>,
    },
    /// Print the synthesis segments for a script as JSON.
    Segments { script: String },
    /// Render one still frame as SVG.
    Render(RenderArgs),
    /// Perform a script.
    Play(PlayArgs),
}

#[derive(Args, Debug)]
struct AnimationArgs {
    #[arg(long, default_value_t = DEFAULT_ANIMATION_SPEED)]
    speed: f64,

    #[arg(long, default_value_t = DEFAULT_EXPRESSIVENESS)]
    expressiveness: f64,
}

#[derive(Args, Debug)]
struct FaceArgs {
    /// JSON face config.
    #[arg(long)]
    face_config: Option<PathBuf>,

    /// Manual shape `m,p,q,r,s,skew,rotate,browLift,browAngle`; overrides
    /// expression presets.
    #[arg(long)]
    params: Option<String>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[arg(long, default_value = "neutral")]
    expression: String,

    /// Render as if speaking this shape.
    #[arg(long, value_enum)]
    viseme: Option<VisemeArg>,

    #[arg(long, default_value_t = 0.0)]
    volume: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    look_x: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    look_y: f64,

    #[arg(long)]
    blink: bool,

    #[arg(long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    face: FaceArgs,
}

#[derive(Args, Debug)]
struct PlayArgs {
    script: String,

    #[command(flatten)]
    animation: AnimationArgs,

    #[command(flatten)]
    face: FaceArgs,

    #[arg(long, env = ENV_PIPER_BINARY)]
    piper_binary: Option<String>,

    #[arg(long, env = ENV_VOICE_MODEL)]
    voice_model: Option<String>,

    /// Use a synthetic tone instead of a voice when no model is configured.
    #[arg(long)]
    tone: bool,

    /// Defaults to the voice's own setting.
    #[arg(long)]
    noise_scale: Option<f64>,

    /// Defaults to the voice's own setting.
    #[arg(long)]
    noise_w_scale: Option<f64>,

    #[arg(long, default_value_t = 0)]
    speaker_id: u32,

    /// Do not open an audio device.
    #[arg(long)]
    silent: bool,

    #[arg(long)]
    output_device: Option<String>,

    /// Write the captured frames to this file.
    #[arg(long)]
    record: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum VisemeArg {
    Closed,
    Open,
    Wide,
    Narrow,
    Smile,
}

impl From<VisemeArg> for Viseme {
    fn from(v: VisemeArg) -> Self {
        match v {
            VisemeArg::Closed => Viseme::Closed,
            VisemeArg::Open => Viseme::Open,
            VisemeArg::Wide => Viseme::Wide,
            VisemeArg::Narrow => Viseme::Narrow,
            VisemeArg::Smile => Viseme::Smile,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Command::Timeline {
            script,
            animation,
            audio_ms,
        } => print_timeline(&script, &animation, audio_ms),
        Command::Segments { script } => print_segments(&script),
        Command::Render(args) => render(args),
        Command::Play(args) => {
            let env = StdEnv;
            play(args, &env).await
        }
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn animation_config(args: &AnimationArgs) -> anyhow::Result<AnimationConfig> {
    Ok(AnimationConfig {
        speed: AnimationSpeed::new(args.speed)?,
        expressiveness: Expressiveness::new(args.expressiveness)?,
    })
}

fn face_config(args: &FaceArgs) -> anyhow::Result<FaceConfig> {
    let mut face = match &args.face_config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading face config {}", path.display()))?;
            FaceConfig::from_json(&json)
                .with_context(|| format!("parsing face config {}", path.display()))?
        }
        None => FaceConfig::default(),
    };
    if let Some(params) = &args.params {
        let params: ShapeParameters = params.parse().context("invalid --params")?;
        face.shape = ShapeSource::Manual { params };
    }
    Ok(face)
}

/// Flags given on the command line win over `defaults`.
fn synthesis_settings(args: &PlayArgs, defaults: SynthesisSettings) -> SynthesisSettings {
    SynthesisSettings {
        noise_scale: args.noise_scale.unwrap_or(defaults.noise_scale),
        noise_w_scale: args.noise_w_scale.unwrap_or(defaults.noise_w_scale),
        speaker_id: args.speaker_id,
        ..defaults
    }
}

fn build_config(args: &PlayArgs, env: &impl Env) -> anyhow::Result<AppConfig> {
    Ok(AppConfig {
        face: face_config(&args.face)?,
        animation: animation_config(&args.animation)?,
        synthesis: synthesis_settings(args, SynthesisSettings::default()),
        voice: resolve_voice(args.piper_binary.clone(), args.voice_model.clone(), env),
    })
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_timeline(script: &str, args: &AnimationArgs, audio_ms: Option<f64>) -> anyhow::Result<()> {
    let opts = animation_config(args)?.timeline_options();
    let frames = build_timeline(script, opts);
    let reconciliation = reconcile(&frames, audio_ms);
    let scheduled: Vec<f64> = frames
        .iter()
        .map(|f| scheduled_ms(f, reconciliation.scale))
        .collect();
    tracing::info!(frames = frames.len(), scale = reconciliation.scale, "timeline built");
    print_json(&serde_json::json!({
        "frames": frames,
        "reconciliation": reconciliation,
        "scheduled_ms": scheduled,
    }))
}

fn print_segments(script: &str) -> anyhow::Result<()> {
    let segments = build_segments(script);
    let estimate = estimate_duration_ms(&segments, DEFAULT_MS_PER_CHAR);
    print_json(&serde_json::json!({
        "segments": segments,
        "estimated_ms": estimate,
    }))
}

fn render(args: RenderArgs) -> anyhow::Result<()> {
    let renderer = FaceRenderer::new(face_config(&args.face)?);
    let state = FaceState {
        viseme: args.viseme.map(Viseme::from).unwrap_or_default(),
        expression: args.expression,
        animating: args.viseme.is_some(),
        ..FaceState::default()
    };
    let gaze = GazeState {
        look: Gaze {
            x: args.look_x,
            y: args.look_y,
        },
        blinking: args.blink,
    };
    let svg = renderer.render_svg(&state, args.volume.clamp(0.0, 1.0), gaze);

    match args.output {
        Some(path) => std::fs::write(&path, svg)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{svg}"),
    }
    Ok(())
}

async fn play(args: PlayArgs, env: &impl Env) -> anyhow::Result<()> {
    let mut cfg = build_config(&args, env)?;

    let output: Arc<dyn AudioOutput> = if args.silent {
        Arc::new(NullAudioOutput::new())
    } else {
        let rodio = RodioOutput::new();
        Arc::new(match &args.output_device {
            Some(name) => rodio.with_output_device_name(name.clone()),
            None => rodio,
        })
    };

    let synth: Option<Arc<dyn SpeechSynthesizer>> = match &cfg.voice {
        Some(voice) => {
            let piper =
                PiperSynthesizer::load(voice.piper_binary.clone(), voice.model_path.clone())
                    .await
                    .context("loading piper voice")?;
            cfg.synthesis = synthesis_settings(&args, piper.voice().default_settings());
            Some(Arc::new(piper))
        }
        None if args.tone => Some(Arc::new(ToneSynthesizer::default())),
        None => None,
    };
    tracing::info!(
        voice = cfg.voice.is_some(),
        tone = args.tone,
        silent = args.silent,
        expressiveness = cfg.animation.expressiveness.get(),
        speed = cfg.animation.speed.get(),
        "config loaded"
    );

    let driver = PlaybackDriver::new(output);
    let (idle_tx, idle_rx) = mpsc::channel(8);
    let (gaze_tx, gaze_rx) = watch::channel(GazeState::default());
    let idle = spawn_idle_loop(IdleBehavior::new(StdRng::from_os_rng()), idle_rx, gaze_tx);
    let bridge = spawn_idle_bridge(driver.subscribe(), idle_tx);

    let performer = Performer::new(driver.clone(), synth);
    let handle = performer
        .perform(&PerformRequest::from_config(args.script.clone(), &cfg))
        .await
        .context("starting performance")?;
    let reconciliation = handle.reconciliation();

    let outcome = match &args.record {
        Some(path) => {
            let feed = FaceFeed {
                renderer: FaceRenderer::new(cfg.face.clone()),
                face: driver.subscribe(),
                gaze: gaze_rx,
                volume: driver.volume(),
            };
            let mut capture = MemoryCapture::new();
            let (outcome, blob) = record_session(handle, &feed, &mut capture).await;
            let blob = blob.context("recording produced no output")?;
            tokio::fs::write(path, &blob)
                .await
                .with_context(|| format!("writing recording {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = blob.len(), "recording written");
            outcome
        }
        None => handle.wait().await,
    };

    tracing::info!(
        ?outcome,
        scale = reconciliation.scale,
        speech_ms = reconciliation.speech_ms,
        pause_ms = reconciliation.pause_ms,
        "performance finished"
    );

    bridge.abort();
    idle.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use protoface_core::config::MapEnv;

    fn play_args(argv: &[&str]) -> PlayArgs {
        let mut full = vec!["protoface", "play"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).expect("parse").command {
            Command::Play(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn voice_flags_build_a_voice_config() {
        let args = play_args(&["hello", "--voice-model", "en.onnx", "--piper-binary", "/opt/piper"]);
        let cfg = build_config(&args, &MapEnv::default()).expect("config");
        let voice = cfg.voice.expect("voice");
        assert_eq!(voice.model_path, PathBuf::from("en.onnx"));
        assert_eq!(voice.piper_binary, PathBuf::from("/opt/piper"));
        assert_eq!(cfg.animation.expressiveness.get(), DEFAULT_EXPRESSIVENESS);
    }

    #[test]
    fn voice_defaults_fill_unset_synthesis_flags() {
        let voice = protoface_core::tts::VoiceModelConfig::from_json(
            r#"{ "inference": { "noise_scale": 0.5, "length_scale": 1.1, "noise_w": 0.7 } }"#,
        )
        .expect("voice");

        let args = play_args(&["hi", "--noise-scale", "0.2", "--speaker-id", "3"]);
        let s = synthesis_settings(&args, voice.default_settings());
        assert_eq!(s.noise_scale, 0.2);
        assert_eq!(s.noise_w_scale, 0.7);
        assert_eq!(s.length_scale, 1.1);
        assert_eq!(s.speaker_id, 3);

        let cfg = build_config(&play_args(&["hi"]), &MapEnv::default()).expect("config");
        assert_eq!(cfg.synthesis, SynthesisSettings::default());
    }

    #[test]
    fn manual_params_override_presets() {
        let args = play_args(&["hi", "--params", "1,0,0,0.5,0.5,0,0,0,0"]);
        let cfg = build_config(&args, &MapEnv::default()).expect("config");
        assert!(matches!(cfg.face.shape, ShapeSource::Manual { .. }));
    }

    #[test]
    fn bad_expressiveness_is_rejected() {
        let args = play_args(&["hi", "--expressiveness", "2"]);
        assert!(build_config(&args, &MapEnv::default()).is_err());
    }

    #[test]
    fn bad_params_are_rejected() {
        let args = play_args(&["hi", "--params", "1,2,3"]);
        assert!(build_config(&args, &MapEnv::default()).is_err());
    }

    #[test]
    fn render_accepts_negative_gaze() {
        let cli = Cli::try_parse_from([
            "protoface", "render", "--look-x", "-0.5", "--viseme", "wide",
        ])
        .expect("parse");
        match cli.command {
            Command::Render(args) => {
                assert_eq!(args.look_x, -0.5);
                assert!(matches!(args.viseme, Some(VisemeArg::Wide)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
