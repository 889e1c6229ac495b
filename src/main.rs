//! # mktor command-line entry point
//!
//! `mktor [OPTIONS] <dir-or-file> <tracker-url-or-alias>... | <magnet-uri>`

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use mktor::deploy::Action;
use mktor::metafile::{CrossSeed, FieldEdit, Mutations};
use mktor::pipeline::{self, create_metafile, deploy_created, make_magnet_meta, Input, Options, Plan};
use mktor::progress::{ConsoleProgress, NoProgress, Progress};
use mktor::size::parse_size;
use mktor::Config;

/// Create a BitTorrent metafile.
///
/// If passed a magnet link as the only argument, a metafile is created in the
/// directory set by `magnet_watch`, loadable by rTorrent.
#[derive(Parser, Debug)]
#[command(name = "mktor", version, about, long_about = None)]
struct Cli {
    /// Data path and tracker URLs or aliases, or a single magnet link.
    #[arg(value_name = "ARGS")]
    args: Vec<String>,

    /// Disallow DHT and PEX.
    #[arg(short, long)]
    private: bool,

    /// Leave out the creation date.
    #[arg(long)]
    no_date: bool,

    /// Optional file name (or target directory) for the metafile.
    #[arg(short, long = "output-filename", value_name = "PATH")]
    output: Option<PathBuf>,

    /// Optional root name (default is the basename of the data path).
    #[arg(short, long, value_name = "NAME")]
    root_name: Option<String>,

    /// Exclude files matching a glob pattern from hashing.
    #[arg(short = 'x', long, value_name = "PATTERN", action = ArgAction::Append)]
    exclude: Vec<String>,

    /// Optional human-readable comment.
    #[arg(long)]
    comment: Option<String>,

    /// Set a field to a value (KEY=VAL) or delete it (KEY); keys are dotted paths.
    #[arg(short, long = "set", value_name = "KEY[=VAL]", action = ArgAction::Append)]
    set: Vec<FieldEdit>,

    /// Minimum piece size, e.g. 64K.
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    chunk_min: Option<u64>,

    /// Maximum piece size, e.g. 4M.
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    chunk_max: Option<u64>,

    /// Do not add the automatic tracker-specific cross-seed field.
    #[arg(long)]
    no_cross_seed: bool,

    /// Set a label that changes the info hash; "@entropy" uses random bits.
    #[arg(short = 'X', long, value_name = "LABEL")]
    cross_seed: Option<String>,

    /// Also write a metafile with fast-resume data, for seeding without rehashing.
    #[arg(short = 'H', long = "hashed", visible_alias = "fast-resume")]
    hashed: bool,

    /// Load the metafile into rTorrent.
    #[arg(long)]
    load: bool,

    /// Load and start the metafile in rTorrent.
    #[arg(long)]
    start: bool,

    /// Only report errors; no progress display.
    #[arg(short, long)]
    quiet: bool,

    /// More logging. Repeat for more (-v, -vv).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Path to the configuration file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Cli {
    fn options(&self) -> Options {
        let deploy = if self.start {
            Some(Action::Start)
        } else if self.load {
            Some(Action::Load)
        } else {
            None
        };

        Options {
            private: self.private,
            creation_date: !self.no_date,
            output: self.output.clone(),
            root_name: self.root_name.clone(),
            exclude: self.exclude.clone(),
            comment: self.comment.clone(),
            piece_min: self.chunk_min,
            piece_max: self.chunk_max,
            mutations: Mutations {
                cross_seed: self.cross_seed.as_deref().map(CrossSeed::from_arg),
                suppress_cross_seed: self.no_cross_seed,
                edits: self.set.clone(),
            },
            fast_resume: self.hashed,
            deploy,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            match e.downcast_ref::<mktor::Error>() {
                Some(err) if err.is_usage() => ExitCode::from(2),
                _ => ExitCode::from(1),
            }
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref()).map_err(mktor::Error::from)?;
    let input = Input::classify(&cli.args)?;

    match pipeline::plan(input, cli.options(), &config)? {
        Plan::Magnet { link, watch } => {
            make_magnet_meta(&link, &watch)?;
        }
        Plan::Build(plan) => {
            let mut progress: Box<dyn Progress> = if cli.quiet {
                Box::new(NoProgress)
            } else {
                Box::new(ConsoleProgress::new())
            };
            let created = create_metafile(&plan, progress.as_mut())?;

            // with several trackers, only the last metafile is handed over
            if let (Some(deploy), Some(created)) = (plan.deploy, created.last()) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context("failed to start the async runtime")?;
                let mut client = deploy.client;
                runtime.block_on(deploy_created(
                    &mut client,
                    created,
                    deploy.action,
                    deploy.settle,
                ))?;
            }
        }
    }

    Ok(())
}
