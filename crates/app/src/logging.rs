use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

pub const LOG_FILE_NAME: &str = "saltf.log";

#[derive(Clone, Default)]
struct TeeMakeWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for TeeMakeWriter {
    type Writer = TeeWriter<io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            console: io::stderr(),
            file: self.file.clone(),
        }
    }
}

/// Copies every formatted line to the console stream and, when present, the
/// log file. The console is stderr; stdout stays reserved for command output.
struct TeeWriter<W> {
    console: W,
    file: Option<Arc<Mutex<File>>>,
}

impl<W: io::Write> io::Write for TeeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.console.write_all(buf);
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                file.write_all(buf)?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.console.flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                file.flush()?;
            }
        }
        Ok(())
    }
}

pub fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::OFF),
        "error" => Some(LevelFilter::ERROR),
        "warn" | "warning" => Some(LevelFilter::WARN),
        "info" => Some(LevelFilter::INFO),
        "debug" => Some(LevelFilter::DEBUG),
        "trace" => Some(LevelFilter::TRACE),
        _ => None,
    }
}

/// Events from `saltf*` targets pass at `level`; dependencies only at WARN.
pub fn setup_tracing(level: LevelFilter, log_dir: Option<&Path>) -> io::Result<()> {
    let file = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(LOG_FILE_NAME))?;
            Some(Arc::new(Mutex::new(file)))
        }
        None => None,
    };

    let filter_layer = tracing_subscriber::filter::filter_fn(move |metadata| {
        let target = metadata.target();
        let is_saltf = target.starts_with("saltf");
        let effective = if is_saltf {
            level
        } else {
            LevelFilter::from_level(Level::WARN).min(level)
        };
        effective >= *metadata.level()
    });
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(TeeMakeWriter { file });

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter_layer))
        .init();
    Ok(())
}
