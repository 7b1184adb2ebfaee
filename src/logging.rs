//! Logging setup (§4.M): a `tracing-subscriber` `fmt` layer driven by
//! `RUST_LOG`, with `-v`/`-vv` raising the default floor when the
//! environment variable isn't set.

use tracing_subscriber::EnvFilter;

/// `verbosity` is the number of `-v` flags on the command line.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "dotlink=info",
        1 => "dotlink=debug",
        _ => "dotlink=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}
