use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use log::*;
use structopt::StructOpt;

use rescan_cli::{init_thread_pool, SessionConfig, SessionError, SessionStore, SubmitOutcome};

#[derive(StructOpt)]
#[structopt(name = "rescan", about = "Align repeat photographs onto a per-session baseline")]
struct Opt {
    /// Session configuration (TOML, or JSON by extension)
    #[structopt(short, long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the configured storage directory
    #[structopt(long, global = true)]
    storage: Option<PathBuf>,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Submit a photograph: the first one of a session becomes its baseline
    Submit {
        #[structopt(parse(from_os_str))]
        image: PathBuf,
        #[structopt(short, long)]
        user: Option<String>,
        #[structopt(short, long)]
        angle: Option<String>,
        /// Also write the aligned scan here
        #[structopt(short, long, parse(from_os_str))]
        out: Option<PathBuf>,
    },
    /// List the stored scans of a session, newest first
    History {
        #[structopt(short, long)]
        user: Option<String>,
        #[structopt(short, long)]
        angle: Option<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn run(opt: Opt) -> Result<(), SessionError> {
    let mut config = match &opt.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(root) = opt.storage {
        config.storage_root = root;
    }

    if let Err(e) = init_thread_pool(config.align.n_threads) {
        warn!("keeping the existing thread pool: {e}");
    }

    match opt.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
        Command::Submit { image, user, angle, out } => {
            let bytes = std::fs::read(&image)?;
            let store = SessionStore::open(config)?;

            let t0 = Instant::now();
            let outcome = store.submit_bytes(user.as_deref(), angle.as_deref(), &bytes)?;
            debug!("submission took {:.2?}", t0.elapsed());

            println!("{}", outcome.message());
            if let SubmitOutcome::ScanCreated { sequence, encoded, .. } = &outcome {
                println!("sequence: {sequence}");
                if let Some(out) = out {
                    std::fs::write(&out, encoded)?;
                    println!("aligned scan written to {}", out.display());
                }
            }
        }
        Command::History { user, angle } => {
            let user = user.unwrap_or_else(|| config.default_user.clone());
            let angle = angle.unwrap_or_else(|| config.default_angle.clone());
            let store = SessionStore::open(config)?;
            let scans = store.history(&user, &angle)?;
            if scans.is_empty() {
                println!("no scans for {user}/{angle}");
            }
            for scan in scans {
                println!("{:>5}  {}  ({} bytes)", scan.sequence, scan.key, scan.bytes.len());
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    pretty_env_logger::init_timed();
    match run(Opt::from_args()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
