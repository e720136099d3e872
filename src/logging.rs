use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Install the stderr subscriber shared by the binaries.
///
/// `RUST_LOG` overrides the default level, which is `info` (or `debug` when
/// `verbose` is set). Stdout stays free for the binaries' own reports.
pub fn init(verbose: bool) -> Result<(), InitError> {
    let default = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
}
