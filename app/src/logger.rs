//! Terminal logger for the demo

use std::time::Instant;

use colored::{ColoredString, Colorize};
use log::{LevelFilter, info};

/// Initialise the logger. Must only be called once.
pub fn logger_init(min_level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let epoch = Instant::now();

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let elapsed = epoch.elapsed().as_secs_f64();
            // If debug or trace include the target, otherwise don't include it
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    elapsed,
                    level_to_str(record.level()),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!("[{:10.6} {}] {}", elapsed, level_to_str(record.level()), message))
            }
        })
        .level(min_level)
        .chain(std::io::stdout())
        .apply()?;

    info!("Logging initialised");
    info!("    Log level: {:?}", min_level);

    Ok(())
}

fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info => "INF".normal(),
        log::Level::Warn => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold(),
    }
}
