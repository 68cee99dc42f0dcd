use simplelog::{ConfigBuilder, LevelFilter, SimpleLogger};

/// Log to the terminal; HTTP client internals stay quiet even when verbose.
pub fn init(verbose: bool) {
    let level = if verbose { LevelFilter::Info } else { LevelFilter::Warn };
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off)
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("reqwest")
        .build();
    let _ = SimpleLogger::init(level, config);
}
