//! CLI driver (spec §4.10): `splc source.ext [--no-prelude] [-o file] [-v]`.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser};
use splc::CompileOptions;

#[derive(Parser)]
#[command(name = "splc", about = "Ahead-of-time compiler targeting x86-64 NASM")]
struct Cli {
  /// Source file to compile.
  source: PathBuf,

  /// Skip prepending the built-in prelude.
  #[arg(long)]
  no_prelude: bool,

  /// Write assembly to this file instead of stdout.
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// Raise log verbosity; repeat for trace-level output.
  #[arg(short, long, action = ArgAction::Count)]
  verbose: u8,
}

fn init_logger(verbosity: u8) {
  let level = match verbosity {
    0 => log::LevelFilter::Warn,
    1 => log::LevelFilter::Debug,
    _ => log::LevelFilter::Trace,
  };
  env_logger::Builder::new().filter_level(level).format_timestamp(None).init();
}

/// Reads the source, runs the pipeline, and writes output. Returns the
/// process exit code; only an I/O failure is surfaced as an `Err` (bridged
/// through `anyhow` in `main`) — a `CompileError` is rendered to stderr here
/// directly, matching spec §6's "prints a formatted diagnostic to stderr".
fn try_main(args: &Cli) -> anyhow::Result<i32> {
  let source = fs::read_to_string(&args.source)
    .with_context(|| format!("reading {}", args.source.display()))?;
  let options = CompileOptions { no_prelude: args.no_prelude };

  match splc::compile_to_asm(&source, &options) {
    Ok(asm) => {
      match &args.output {
        Some(path) => fs::write(path, &asm).with_context(|| format!("writing {}", path.display()))?,
        None => print!("{asm}"),
      }
      Ok(0)
    }
    Err(err) => {
      eprint!("{}", err.render(&args.source.to_string_lossy(), &source));
      Ok(1)
    }
  }
}

fn main() {
  let args = Cli::parse();
  init_logger(args.verbose);

  let code = match try_main(&args) {
    Ok(code) => code,
    Err(err) => {
      eprintln!("error: {err:#}");
      1
    }
  };
  std::process::exit(code);
}
