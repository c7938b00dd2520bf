use std::io::Write;

use chrono::Local;
use log::{LevelFilter, SetLoggerError};

/// Level used until the config has been read
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// Installs the process-wide logger on stderr at [`DEFAULT_LEVEL`].
///
/// Called before the config is loaded so config warnings are not lost;
/// [`set_level`] applies the configured level afterwards. A `RUST_LOG`
/// in the environment takes precedence over both.
pub fn init() -> Result<(), SetLoggerError> {
    env_logger::builder()
        .filter_level(LevelFilter::Trace)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .try_init()?;
    set_level(DEFAULT_LEVEL);
    Ok(())
}

/// Changes the level, unless `RUST_LOG` chose one.
pub fn set_level(level: LevelFilter) {
    if std::env::var_os(env_logger::DEFAULT_FILTER_ENV).is_none() {
        log::set_max_level(level);
    }
}
