use parking_lot::Mutex;
/// Debug logging for sandpit
///
/// Controlled by the DEBUG_LEVEL environment variable:
/// - 0 or unset: No debugging
/// - 1: Errors only
/// - 2: Info level (installs, context lifecycle)
/// - 3: Debug level (routing, dropped messages)
/// - 4: Trace level (every trap and envelope)
///
/// All output goes to /tmp/sandpit_debug.log on Unix/macOS,
/// or %TEMP%\sandpit_debug.log on Windows.
/// The trap log written by the sink is a separate file; this one is for
/// developers only.
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{LevelFilter, Log, Metadata, Record};

/// Debug log filename inside the temp dir.
pub const DEBUG_LOG_FILENAME: &str = "sandpit_debug.log";

/// Debug level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DebugLevel {
    Off = 0,
    Error = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl DebugLevel {
    fn from_env() -> Self {
        match std::env::var("DEBUG_LEVEL") {
            Ok(val) => Self::parse(&val),
            Err(_) => DebugLevel::Off,
        }
    }

    fn parse(val: &str) -> Self {
        match val.trim().parse::<u8>() {
            Ok(1) => DebugLevel::Error,
            Ok(2) => DebugLevel::Info,
            Ok(3) => DebugLevel::Debug,
            Ok(4) => DebugLevel::Trace,
            _ => DebugLevel::Off,
        }
    }

    /// Equivalent `log` filter. Warnings ride along with errors.
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            DebugLevel::Off => LevelFilter::Off,
            DebugLevel::Error => LevelFilter::Warn,
            DebugLevel::Info => LevelFilter::Info,
            DebugLevel::Debug => LevelFilter::Debug,
            DebugLevel::Trace => LevelFilter::Trace,
        }
    }

    fn from_level_filter(filter: LevelFilter) -> Self {
        match filter {
            LevelFilter::Off => DebugLevel::Off,
            LevelFilter::Error | LevelFilter::Warn => DebugLevel::Error,
            LevelFilter::Info => DebugLevel::Info,
            LevelFilter::Debug => DebugLevel::Debug,
            LevelFilter::Trace => DebugLevel::Trace,
        }
    }
}

/// Path of the debug log file.
pub fn log_path() -> PathBuf {
    #[cfg(unix)]
    let path = PathBuf::from("/tmp").join(DEBUG_LOG_FILENAME);
    #[cfg(not(unix))]
    let path = std::env::temp_dir().join(DEBUG_LOG_FILENAME);
    path
}

/// Global debug logger
struct DebugLogger {
    level: DebugLevel,
    file: Option<std::fs::File>,
}

impl DebugLogger {
    fn new() -> Self {
        let level = DebugLevel::from_env();
        let mut logger = DebugLogger { level, file: None };
        logger.set_level(level);
        logger
    }

    /// Change the level, opening the log file on first use.
    fn set_level(&mut self, level: DebugLevel) {
        self.level = level;
        if level == DebugLevel::Off || self.file.is_some() {
            return;
        }
        // Open failures leave file logging off; stderr mirroring still works.
        if let Ok(f) = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(log_path())
        {
            self.file = Some(f);
            self.write_raw(&format!(
                "\n{}\nsandpit debug session started at {} (level={:?})\n{}\n",
                "=".repeat(80),
                get_timestamp(),
                level,
                "=".repeat(80)
            ));
        }
    }

    fn write_raw(&mut self, msg: &str) {
        if let Some(ref mut file) = self.file {
            let _ = file.write_all(msg.as_bytes());
            let _ = file.flush();
        }
    }

    fn log(&mut self, level: DebugLevel, category: &str, msg: &str) {
        if level <= self.level {
            let level_str = match level {
                DebugLevel::Error => "ERROR",
                DebugLevel::Info => "INFO ",
                DebugLevel::Debug => "DEBUG",
                DebugLevel::Trace => "TRACE",
                DebugLevel::Off => return,
            };
            self.write_raw(&format!(
                "[{}] [{}] [{}] {}\n",
                get_timestamp(),
                level_str,
                category,
                msg
            ));
        }
    }
}

static LOGGER: OnceLock<Mutex<DebugLogger>> = OnceLock::new();

fn get_logger() -> &'static Mutex<DebugLogger> {
    LOGGER.get_or_init(|| Mutex::new(DebugLogger::new()))
}

fn get_timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:06}", now.as_secs(), now.subsec_micros())
}

fn write_record(level: DebugLevel, category: &str, msg: &str) {
    get_logger().lock().log(level, category, msg);
}

/// Forwards `log` crate records into the debug log file.
struct LogBridge {
    mirror_stderr: bool,
}

impl Log for LogBridge {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            log::Level::Error | log::Level::Warn => DebugLevel::Error,
            log::Level::Info => DebugLevel::Info,
            log::Level::Debug => DebugLevel::Debug,
            log::Level::Trace => DebugLevel::Trace,
        };
        let msg = record.args().to_string();
        write_record(level, record.target(), &msg);
        if self.mirror_stderr {
            eprintln!("[{}] [{}] {}", record.level(), record.target(), msg);
        }
    }

    fn flush(&self) {}
}

static BRIDGE: OnceLock<LogBridge> = OnceLock::new();

/// Pick the effective level: explicit override, then `RUST_LOG`, then
/// `DEBUG_LEVEL`.
fn resolve_level(
    override_level: Option<LevelFilter>,
    rust_log: Option<&str>,
    debug_level: DebugLevel,
) -> LevelFilter {
    if let Some(level) = override_level {
        return level;
    }
    if let Some(level) = rust_log.and_then(|s| s.trim().parse::<LevelFilter>().ok()) {
        return level;
    }
    debug_level.to_level_filter()
}

/// Route `log::info!()` and friends into the debug log.
///
/// `level` (from `--log-level`) wins over `RUST_LOG`, which wins over
/// `DEBUG_LEVEL`. When `RUST_LOG` is set, records are mirrored to stderr.
/// Calling this more than once only updates the level.
pub fn init_log_bridge(level: Option<LevelFilter>) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = resolve_level(level, rust_log.as_deref(), DebugLevel::from_env());

    get_logger()
        .lock()
        .set_level(DebugLevel::from_level_filter(filter));

    let bridge = BRIDGE.get_or_init(|| LogBridge {
        mirror_stderr: rust_log.is_some(),
    });
    if log::set_logger(bridge).is_err() {
        log::debug!("log bridge already installed");
    }
    log::set_max_level(filter);
}
