pub mod seq;
pub mod ext;
pub mod pipeline;
pub mod stage;
pub mod align;
pub mod command;

mod err;
pub use err::Error;

/// Logs into stderr, and into the log file inside the output directory once it is known.
pub fn init_logger() -> Result<(), log::SetLoggerError> {
    use fern::{
        Dispatch,
        colors::{Color, ColoredLevelConfig},
    };
    let colors = ColoredLevelConfig::default()
        .info(Color::Green)
        .debug(Color::Cyan);
    let stderr = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {:>5}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                colors.color(record.level()),
                message
            ))
        })
        .level(log::LevelFilter::Debug)
        .chain(std::io::stderr());
    Dispatch::new()
        .level(log::LevelFilter::Trace)
        .chain(stderr)
        .chain(ext::logfile::log_output())
        .apply()
}
