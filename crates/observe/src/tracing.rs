use tracing_subscriber::{
    Layer,
    filter::{EnvFilter, LevelFilter, filter_fn},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initializes the global tracing subscriber.
///
/// `env_filter` uses the usual `RUST_LOG` syntax. Events at least as
/// severe as `stderr_threshold` go to stderr, everything else to
/// stdout, so service logs and alerts can be split by stream.
///
/// Panics when called twice; call once at startup before anything
/// logs.
pub fn initialize(env_filter: &str, stderr_threshold: LevelFilter) {
    let env_filter = EnvFilter::try_new(env_filter).expect("invalid log filter");
    let to_stderr = move |level: &::tracing::Level| {
        stderr_threshold != LevelFilter::OFF && *level <= stderr_threshold
    };
    let stdout = fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(filter_fn(move |metadata| !to_stderr(metadata.level())));
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter_fn(move |metadata| to_stderr(metadata.level())));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout)
        .with(stderr)
        .init();
}
