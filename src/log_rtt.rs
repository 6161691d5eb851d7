use log::{LevelFilter, Metadata, Record};

/// An RTT-based logger implementation.
pub struct RttLogger {}

impl log::Log for RttLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            rtt_target::rprintln!("{} - {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: RttLogger = RttLogger {};

/// Call once at boot, before interrupts that may log are enabled
pub fn init() -> Result<(), log::SetLoggerError> {
    rtt_target::rtt_init_print!(NoBlockSkip, 1024);
    log::set_max_level(LevelFilter::Trace);
    // single core, nothing else is running yet
    unsafe { log::set_logger_racy(&LOGGER) }
}
