use error_stack::Report;
use log::LevelFilter;

use crate::error::PensiunError;

/// Initialize logging for the application.
/// Should be called once at the start of `main()`.
///
/// Records go to stderr so command output on stdout stays machine readable.
///
/// # Errors
///
/// Returns an error if a global logger is already installed.
pub fn init_logger(level: LevelFilter) -> Result<(), Report<PensiunError>> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}  {} {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                record.level(),
                message
            ))
        })
        .level(level)
        // ureq logs every connection at debug
        .level_for("ureq", LevelFilter::Warn)
        .level_for("ureq_proto", LevelFilter::Warn)
        .level_for("rustls", LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()
        .map_err(|e| {
            Report::new(PensiunError::Configuration {
                message: format!("Failed to initialize logger: {}", e),
            })
        })
}
