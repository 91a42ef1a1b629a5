//! Replay a scripted scan scenario through a session and report the outcome.
//!
//! Usage: cardscan-replay <scenario.toml> [--config <path>] [--lane] [--json] [--reveal]
//!        cardscan-replay --version
//!
//! Without `--config`, `cardscan.toml` in the working directory is used when
//! present.
//!
//! A scenario lists what each provider answers, call by call:
//!
//! ```toml
//! frames = 4
//! detections = ["nothing", { card = { x = 0.1, y = 0.2, width = 0.8, height = 0.5 } }]
//! tracks = [{ moved = { x = 0.1, y = 0.2, width = 0.8, height = 0.5 } }, "lost"]
//!
//! [[recognitions]]
//! texts = ["4539", "1488", "0343", "6467"]
//! ```

use anyhow::{bail, Context};
use cardscan::testing::{synthetic_frame, DetectStep, ScriptedProviders, TrackStep};
use cardscan::{
    PixelFormat, ProviderError, ScanLane, ScanSession, ScannerConfig, SessionCallbacks,
    SessionStats,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct Scenario {
    frames: u64,
    #[serde(default = "default_width")]
    width: u32,
    #[serde(default = "default_height")]
    height: u32,
    #[serde(default)]
    detections: Vec<DetectStep>,
    #[serde(default)]
    tracks: Vec<TrackStep>,
    #[serde(default)]
    recognitions: Vec<Recognition>,
}

#[derive(Debug, Deserialize)]
struct Recognition {
    #[serde(default)]
    texts: Vec<String>,
    error: Option<String>,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    400
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    session_id: String,
    state: &'static str,
    number: Option<String>,
    frame_sequence: Option<u64>,
    elapsed_ms: Option<u64>,
    regions_emitted: usize,
    dropped_frames: u64,
    stats: SessionStats,
}

struct Options {
    scenario: PathBuf,
    config: Option<PathBuf>,
    lane: bool,
    json: bool,
    reveal: bool,
}

fn main() -> anyhow::Result<()> {
    cardscan::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.iter().skip(1).any(|arg| arg == "--version") {
        println!("{}", serde_json::to_string_pretty(&cardscan::get_info())?);
        return Ok(());
    }
    let options = parse_args(&args)?;

    let contents = std::fs::read_to_string(&options.scenario)
        .with_context(|| format!("reading scenario {:?}", options.scenario))?;
    let scenario: Scenario = toml::from_str(&contents)
        .with_context(|| format!("parsing scenario {:?}", options.scenario))?;

    let config = match &options.config {
        Some(path) => ScannerConfig::load_from_file(path)?,
        None => ScannerConfig::load_or_default(),
    };

    let script = load_script(&scenario);
    let report = if options.lane {
        run_lane(&scenario, &script, &config, options.reveal)?
    } else {
        run_inline(&scenario, &script, &config, options.reveal)?
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn parse_args(args: &[String]) -> anyhow::Result<Options> {
    let mut scenario = None;
    let mut config = None;
    let mut lane = false;
    let mut json = false;
    let mut reveal = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    bail!("--config needs a path");
                };
                config = Some(PathBuf::from(path));
            }
            "--lane" => lane = true,
            "--json" => json = true,
            "--reveal" => reveal = true,
            other if other.starts_with("--") => bail!("Unknown option: {}", other),
            other => {
                if scenario.is_some() {
                    bail!("Unexpected argument: {}", other);
                }
                scenario = Some(PathBuf::from(other));
            }
        }
        i += 1;
    }

    let Some(scenario) = scenario else {
        bail!(
            "Usage: cardscan-replay <scenario.toml> [--config <path>] [--lane] [--json] [--reveal]"
        );
    };
    Ok(Options {
        scenario,
        config,
        lane,
        json,
        reveal,
    })
}

fn load_script(scenario: &Scenario) -> ScriptedProviders {
    let script = ScriptedProviders::new();
    for step in &scenario.detections {
        script.push_detect_step(*step);
    }
    for step in &scenario.tracks {
        script.push_track(*step);
    }
    for recognition in &scenario.recognitions {
        match &recognition.error {
            Some(message) => script.push_recognition_error(ProviderError::backend(message.clone())),
            None => {
                let texts: Vec<&str> = recognition.texts.iter().map(String::as_str).collect();
                script.push_fragments(&texts);
            }
        }
    }
    script
}

fn callbacks(regions: Arc<Mutex<usize>>) -> SessionCallbacks {
    SessionCallbacks::new(|_| {}).on_region_update(move |_| {
        *regions.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    })
}

fn run_inline(
    scenario: &Scenario,
    script: &ScriptedProviders,
    config: &ScannerConfig,
    reveal: bool,
) -> anyhow::Result<ReplayReport> {
    let regions = Arc::new(Mutex::new(0));
    let mut session =
        ScanSession::start(script.capabilities(), config, callbacks(regions.clone()))?;

    for sequence in 1..=scenario.frames {
        session.submit_frame(&synthetic_frame(
            sequence,
            scenario.width,
            scenario.height,
            PixelFormat::Rgb8,
        ));
        if session.is_finished() {
            break;
        }
    }

    let emitted = *regions.lock().unwrap_or_else(|e| e.into_inner());
    let result = session.result().cloned();
    Ok(ReplayReport {
        session_id: session.id().to_string(),
        state: session.state().name(),
        number: result
            .as_ref()
            .map(|r| display_number(r.number.as_str(), &r.number.masked(), reveal)),
        frame_sequence: result.as_ref().map(|r| r.frame_sequence),
        elapsed_ms: result.as_ref().map(|r| r.elapsed_ms),
        regions_emitted: emitted,
        dropped_frames: 0,
        stats: session.stats().clone(),
    })
}

fn run_lane(
    scenario: &Scenario,
    script: &ScriptedProviders,
    config: &ScannerConfig,
    reveal: bool,
) -> anyhow::Result<ReplayReport> {
    let regions = Arc::new(Mutex::new(0));
    let mut lane = ScanLane::start(script.capabilities(), config, callbacks(regions.clone()))?;

    for sequence in 1..=scenario.frames {
        let frame = synthetic_frame(sequence, scenario.width, scenario.height, PixelFormat::Rgb8);
        lane.submit_frame_timeout(frame, Duration::from_secs(1));
        lane.wait_idle(Duration::from_secs(5));
        if lane.is_finished() {
            break;
        }
    }
    lane.wait_idle(Duration::from_secs(5));

    let state = lane.state();
    let result = lane.result();
    let report = ReplayReport {
        session_id: lane.id().to_string(),
        state: state.name(),
        number: result
            .as_ref()
            .map(|r| display_number(r.number.as_str(), &r.number.masked(), reveal)),
        frame_sequence: result.as_ref().map(|r| r.frame_sequence),
        elapsed_ms: result.as_ref().map(|r| r.elapsed_ms),
        regions_emitted: *regions.lock().unwrap_or_else(|e| e.into_inner()),
        dropped_frames: lane.dropped_frames(),
        stats: lane.stats(),
    };
    lane.stop(Duration::from_secs(1))?;
    Ok(report)
}

fn display_number(number: &str, masked: &str, reveal: bool) -> String {
    if reveal {
        number.to_string()
    } else {
        masked.to_string()
    }
}

fn print_report(report: &ReplayReport) {
    println!("state: {}", report.state);
    if let Some(number) = &report.number {
        println!(
            "number: {} (frame {}, {} ms)",
            number,
            report.frame_sequence.unwrap_or_default(),
            report.elapsed_ms.unwrap_or_default()
        );
    }
    let stats = &report.stats;
    println!(
        "frames: {} processed, {} dropped",
        stats.frames_processed, report.dropped_frames
    );
    println!(
        "detections: {}, tracking losses: {}, extractions: {}",
        stats.detections, stats.tracking_losses, stats.extractions
    );
    println!(
        "rejected candidates: {}, recognition failures: {}",
        stats.rejected_candidates, stats.recognition_failures
    );
    println!("region updates: {}", report.regions_emitted);
}
