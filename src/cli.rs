use clap::{Parser, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "dynamostream-spanner-cdc", about)]
pub struct Cli {
    /// Where to load config from
    #[arg(long, value_enum, default_value_t = ConfigSource::File)]
    pub config: ConfigSource,

    /// Tokio worker threads
    #[arg(long, default_value_t = default_workers())]
    pub workers: usize,

    /// Skip installing the Spanner writer: records are converted and
    /// counted but never applied. Mirrors the "Write unset during dry
    /// runs" invariant on the shared stream state.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Run only the cutover advisor against a previously populated
    /// RecordsProcessed source (e.g. to re-render the decision from a saved
    /// report) instead of starting a new streaming run.
    ///
    /// Not implemented yet: spec.md is silent on what "a previously
    /// populated source" means outside of a live run. See DESIGN.md.
    #[arg(long, default_value_t = false)]
    pub cutover_only: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ConfigSource {
    Env,
    File,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}
