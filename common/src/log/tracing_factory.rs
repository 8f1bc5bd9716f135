use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::fmt::writer::MakeWriterExt;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone)]
pub enum OutputType {
    Stdout,
    File,
}

#[derive(Debug, Clone)]
pub struct TracingFactoryOptions {
    pub trace: bool,
    pub output_type: OutputType,
    pub level: Level,
    pub log_dir: Option<String>,
}

impl TracingFactoryOptions {
    pub fn new(trace: bool, output_type: OutputType, log_dir: Option<String>) -> Self {
        let level = if trace { Level::DEBUG } else { Level::INFO };
        TracingFactoryOptions { trace, output_type, level, log_dir }
    }
}

impl Default for TracingFactoryOptions {
    fn default() -> Self {
        TracingFactoryOptions::new(false, OutputType::Stdout, None)
    }
}

/// One-shot global tracing initializer, grounded in the teacher's
/// `TracingFactory` (`common/src/log/tracing_factory.rs`), replacing its
/// `static mut` init guard with an `AtomicBool` compare-exchange (the
/// original is unsound under a concurrent first caller; worker threads here
/// all call this during startup before fan-out, so soundness matters).
pub struct TracingFactory {
    options: TracingFactoryOptions,
}

impl TracingFactory {
    pub fn init(trace: bool, trace_error: bool, log_dir: Option<String>) -> Self {
        let level = if trace {
            Level::DEBUG
        } else if trace_error {
            Level::ERROR
        } else {
            Level::INFO
        };
        let mut opts = TracingFactoryOptions::new(trace, OutputType::Stdout, log_dir);
        opts.level = level;
        Self::init_with_options(opts)
    }

    pub fn init_with_options(opts: TracingFactoryOptions) -> Self {
        if INITIALIZED.compare_exchange(false, true, Ordering::SeqCst, Ordering::Acquire).is_ok() {
            let format = tracing_subscriber::fmt::format()
                .with_file(true)
                .with_line_number(false)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true)
                .compact();

            match &opts.output_type {
                OutputType::Stdout => {
                    let _ = tracing_subscriber::fmt()
                        .with_max_level(opts.level)
                        .event_format(format)
                        .try_init();
                }
                OutputType::File => {
                    let dir = opts.log_dir.clone().unwrap_or_else(|| "/tmp/sqlited-server/logs".to_string());
                    let file_appender = rolling::daily(&dir, "server.log");
                    let writer = file_appender.and(io::stdout);

                    let _ = tracing_subscriber::fmt()
                        .with_max_level(opts.level)
                        .event_format(format)
                        .with_writer(writer)
                        .try_init();
                }
            }
        }

        TracingFactory { options: opts }
    }

    pub fn log_dir(&self) -> Option<&str> {
        self.options.log_dir.as_deref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let _ = TracingFactory::init(true, false, None);
        let _ = TracingFactory::init(true, false, None);
        assert!(INITIALIZED.load(Ordering::SeqCst));
    }
}
