pub(crate) mod logging;

pub use self::logging::{init_logging, tracing_err, LoggingTask};

const GLOBAL_LABELS: &[(&str, &str)] = &[
    ("app_version", env!("CARGO_PKG_VERSION")),
    ("app_rustc", env!("VERGEN_RUSTC_SEMVER")),
    ("app_build_timestamp", env!("VERGEN_BUILD_TIMESTAMP")),
];
