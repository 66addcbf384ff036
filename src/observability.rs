//! Logging hooks for the writer.
//!
//! Dictionary decisions, page cuts and page flushes are logged at debug level
//! through the `log` facade. The `log_metric!` macro emits a structured record
//! in debug builds only; in release builds the calls compile to nothing.

use log::LevelFilter;
use std::fs::OpenOptions;
use std::sync::Once;

/// Logs a structured key-value record at debug level, only in debug builds.
///
/// # Example
/// ```
/// use tambak_columnar::log_metric;
/// let pages = 4;
/// log_metric!("event"="begin_write", "column"="a", "pages"=&pages);
/// ```
#[macro_export]
macro_rules! log_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        #[cfg(debug_assertions)]
        {
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+
            log::debug!("TAMBAK_METRIC: {{ {} }}", parts.join(", "));
        }
    };
}

static INIT_LOGGER: Once = Once::new();

/// Installs an `env_logger` at info level with a `[LEVEL] message` format.
///
/// With `log_file` set, records are appended to that file instead of stderr.
/// Only the first call has an effect.
pub fn enable_verbose_logging(log_file: Option<String>) {
    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(LevelFilter::Info);

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())?;
            buf.flush()?;
            Ok(())
        });

        if let Some(filename) = log_file {
            match OpenOptions::new().append(true).create(true).open(&filename) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(e) => eprintln!("could not open log file '{}': {}", filename, e),
            }
        }

        let _ = builder.try_init();
    });
}
