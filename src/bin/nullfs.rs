//! Mount helper binary.
//!
//! ```text
//! nullfs /mnt/blackhole -o write=keep,mode=0755
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use nullfs::{ExcludeRule, MountOptions, Namespace};

/// Mount an in-memory blackhole filesystem.
#[derive(Debug, Parser)]
#[command(name = "nullfs", version, about)]
struct Args {
    /// Where to mount the filesystem.
    mountpoint: PathBuf,

    /// Comma-separated mount options: write=<pattern>, mode=<octal>,
    /// uid=<int>, gid=<int>.
    #[arg(short = 'o', long = "options", default_value = "")]
    options: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Args = Args::parse();

    let opts: MountOptions = match MountOptions::parse(&args.options) {
        Ok(opts) => opts,
        Err(e) => {
            tracing::error!(error = %e, "bad mount options");
            return ExitCode::FAILURE;
        }
    };

    let ns: Namespace = Namespace::new(opts, ExcludeRule::new());
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mountpoint = %args.mountpoint.display(),
        "nullfs initialized"
    );

    match nullfs::mount(ns, &args.mountpoint) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "mount failed");
            ExitCode::FAILURE
        }
    }
}
