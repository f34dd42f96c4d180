mod app;
mod autofix;
mod bridge;
mod clock;
mod config;
mod constants;
mod cues;
mod host;
mod logging;
mod player;
mod protocol;
mod srt;
mod store;
mod surface;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use app::{PlayOptions, read_subtitle_source, run_play};
use autofix::auto_fix;
use config::Config;
use cues::CueList;
use srt::parse_srt;
use store::SubtitleStore;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Synchronized SRT overlay for mpv", long_about = None)]
struct Args {
  /// Log at debug level (RUST_LOG overrides)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Play a video in mpv with the subtitle overlay
  Play {
    /// URL or file to play
    target: String,
    /// Subtitle file to use instead of the saved one ('-' for stdin)
    #[arg(short, long, value_name = "FILE")]
    srt: Option<PathBuf>,
    /// Key to save and look up subtitles under (default: derived from TARGET)
    #[arg(long, value_name = "ID")]
    video_id: Option<String>,
    /// Remember --srt for this video
    #[arg(long, requires = "srt")]
    save: bool,
  },
  /// Repair common SRT formatting mistakes
  Fix {
    /// Subtitle file ('-' for stdin)
    input: PathBuf,
    /// Write the corrected text here instead of stdout
    #[arg(short, long, value_name = "FILE", conflicts_with = "in_place")]
    output: Option<PathBuf>,
    /// Overwrite INPUT with the corrected text
    #[arg(short, long)]
    in_place: bool,
  },
  /// Parse subtitles and print the cues
  Parse {
    /// Subtitle file ('-' for stdin)
    input: PathBuf,
    /// Print cues as JSON
    #[arg(long)]
    json: bool,
    /// Skip the automatic format repair
    #[arg(long)]
    no_fix: bool,
    /// Print only the text shown at this time (seconds)
    #[arg(long, value_name = "SECONDS")]
    at: Option<f64>,
  },
  /// Manage saved subtitles
  Store {
    #[command(subcommand)]
    action: StoreAction,
  },
  /// Show or change overlay preferences
  Prefs {
    /// Overlay font size
    #[arg(long)]
    font_size: Option<u32>,
    /// Bold overlay text
    #[arg(long)]
    bold: Option<bool>,
    /// Italic overlay text
    #[arg(long)]
    italic: Option<bool>,
  },
  /// Generate shell completions
  Completions {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
  },
}

#[derive(Subcommand, Debug)]
enum StoreAction {
  /// Print the subtitles saved for a video
  Get { id: String },
  /// Save a subtitle file for a video ('-' for stdin)
  Set { id: String, file: PathBuf },
  /// Forget the subtitles saved for a video
  Remove { id: String },
}

// --- Commands ---

fn run_fix(input: &Path, output: Option<&Path>, in_place: bool) -> Result<()> {
  let report = auto_fix(&read_subtitle_source(input)?);
  info!(fixes = report.fix_count, input = %input.display(), "autofix: done");

  let destination = if in_place { Some(input) } else { output };
  match destination {
    Some(path) if path != Path::new("-") => {
      std::fs::write(path, &report.corrected_text).with_context(|| format!("Failed to write {}", path.display()))?
    }
    _ => std::io::stdout().write_all(report.corrected_text.as_bytes()).context("Failed to write to stdout")?,
  }
  eprintln!("{} fixes", report.fix_count);
  Ok(())
}

fn run_parse(input: &Path, json: bool, no_fix: bool, at: Option<f64>) -> Result<()> {
  let raw = read_subtitle_source(input)?;
  let text = if no_fix {
    raw
  } else {
    let report = auto_fix(&raw);
    if report.fix_count > 0 {
      eprintln!("{} fixes applied before parsing", report.fix_count);
    }
    report.corrected_text
  };
  let cues = CueList::new(parse_srt(&text));

  let mut out = std::io::stdout().lock();
  if let Some(t) = at {
    let active = cues.active_at(t);
    if json {
      writeln!(out, "{}", serde_json::to_string_pretty(&active)?)?;
    } else {
      writeln!(out, "{}", active.map_or("", |c| c.text.as_str()))?;
    }
    return Ok(());
  }

  if json {
    let all: Vec<_> = cues.iter().collect();
    writeln!(out, "{}", serde_json::to_string_pretty(&all)?)?;
  } else {
    for cue in cues.iter() {
      writeln!(out, "{}", cue.to_srt_block())?;
    }
    eprintln!("{} cues", cues.len());
  }
  Ok(())
}

fn run_store(action: StoreAction) -> Result<()> {
  let store = SubtitleStore::open_default()?;
  match action {
    StoreAction::Get { id } => match store.get(&id) {
      Some(text) => std::io::stdout().write_all(text.as_bytes())?,
      None => anyhow::bail!("Nothing saved for {}", id),
    },
    StoreAction::Set { id, file } => {
      let text = read_subtitle_source(&file)?;
      let cue_count = parse_srt(&auto_fix(&text).corrected_text).len();
      store.set(&id, &text)?;
      eprintln!("Saved {} cues for {}", cue_count, id);
    }
    StoreAction::Remove { id } => {
      if store.remove(&id)? {
        eprintln!("Removed subtitles for {}", id);
      } else {
        eprintln!("Nothing saved for {}", id);
      }
    }
  }
  Ok(())
}

fn apply_prefs(config: &mut Config, font_size: Option<u32>, bold: Option<bool>, italic: Option<bool>) -> bool {
  if font_size.is_none() && bold.is_none() && italic.is_none() {
    return false;
  }
  config.font_size = font_size.or(config.font_size);
  config.bold = bold.or(config.bold);
  config.italic = italic.or(config.italic);
  true
}

fn run_prefs(font_size: Option<u32>, bold: Option<bool>, italic: Option<bool>) {
  let mut config = Config::load();
  if apply_prefs(&mut config, font_size, bold, italic) {
    config.save();
  }
  let style = config.overlay_style();
  let timing = config.surface_timing();
  println!("font_size = {}", style.font_size);
  println!("bold = {}", style.bold);
  println!("italic = {}", style.italic);
  println!("clock_poll_ms = {}", timing.clock.poll_interval.as_millis());
  println!("clock_epsilon_secs = {}", timing.clock.epsilon);
  println!("parent_check_ms = {}", timing.parent_check_interval.as_millis());
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Commands::Completions { shell } = args.command {
    let mut cmd = Args::command();
    generate(shell, &mut cmd, constants::constants().app_name.as_str(), &mut std::io::stdout());
    return Ok(());
  }

  // Logging is optional; a read-only cache dir must not stop playback.
  let _log_guard = match logging::init_tracing(args.verbose) {
    Ok(guard) => Some(guard),
    Err(e) => {
      eprintln!("warning: logging disabled: {:#}", e);
      None
    }
  };

  match args.command {
    Commands::Play { target, srt, video_id, save } => {
      run_play(PlayOptions { target, srt, video_id, save }, &Config::load()).await
    }
    Commands::Fix { input, output, in_place } => run_fix(&input, output.as_deref(), in_place),
    Commands::Parse { input, json, no_fix, at } => run_parse(&input, json, no_fix, at),
    Commands::Store { action } => run_store(action),
    Commands::Prefs { font_size, bold, italic } => {
      run_prefs(font_size, bold, italic);
      Ok(())
    }
    Commands::Completions { .. } => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cli_definition_is_valid() {
    Args::command().debug_assert();
  }

  #[test]
  fn save_requires_a_file() {
    assert!(Args::try_parse_from(["sublay", "play", "https://youtu.be/x", "--save"]).is_err());
    let args = Args::try_parse_from(["sublay", "play", "https://youtu.be/x", "--srt", "a.srt", "--save"]).unwrap();
    assert!(matches!(args.command, Commands::Play { save: true, .. }));
  }

  #[test]
  fn fix_writes_corrected_file_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("broken.srt");
    std::fs::write(&file, "1\n00:00:01.000 --> 00:00:04,000\nHello world\n").unwrap();
    run_fix(&file, None, true).unwrap();
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "1\n00:00:01,000 --> 00:00:04,000\nHello world\n");
  }

  #[test]
  fn prefs_italic_flag_is_stored() {
    let args = Args::try_parse_from(["sublay", "prefs", "--italic", "true"]).unwrap();
    let Commands::Prefs { font_size, bold, italic } = args.command else {
      panic!("expected prefs");
    };
    let mut config = Config { font_size: Some(20), ..Config::default() };
    assert!(apply_prefs(&mut config, font_size, bold, italic));
    assert_eq!(config.italic, Some(true));
    assert_eq!(config.font_size, Some(20));
    assert!(config.overlay_style().italic);
    assert!(!apply_prefs(&mut config, None, None, None));
  }
}
