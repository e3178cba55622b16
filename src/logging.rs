// src/logging.rs
//
// Timestamped stderr logging with an optional mirror file.
// Every engine component logs through `tlog!` with a bracketed tag,
// e.g. "[Probe:session-1] batch 2/24 settled".

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Mirror file for `tlog!` output, when attached.
static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// Name of the symlink that always points at the newest log file.
const LATEST_LOG_NAME: &str = "framelapse.log";

/// Start mirroring log output to a timestamped file in `log_dir`.
/// Also refreshes the `framelapse.log` symlink (Unix only).
pub fn init_file_logging(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create log dir: {}", e))?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-framelapse.log")
        .to_string();
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {}", e))?;

    #[cfg(unix)]
    {
        let symlink_path = log_dir.join(LATEST_LOG_NAME);
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            eprintln!(
                "{} [logging] Failed to create {} symlink: {}",
                timestamp(),
                LATEST_LOG_NAME,
                e
            );
        }
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    // Not tlog!: the file handle was only just installed.
    eprintln!(
        "{} [logging] File logging started: {}",
        timestamp(),
        log_path.display()
    );

    Ok(())
}

/// Stop file logging and close the log file.
pub fn stop_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if guard.take().is_some() {
            eprintln!("{} [logging] File logging stopped", timestamp());
        }
    }
}

/// Whether a log file is currently attached.
pub fn is_file_logging() -> bool {
    LOG_FILE.lock().map(|g| g.is_some()).unwrap_or(false)
}

fn timestamp() -> chrono::format::DelayedFormat<chrono::format::StrftimeItems<'static>> {
    chrono::Local::now().format("%H:%M:%S%.3f")
}

/// Write one timestamped line to stderr and, if attached, the log file.
/// Use through `tlog!`.
pub fn write_line(args: std::fmt::Arguments<'_>) {
    let line = format!("{} {}", timestamp(), args);
    eprintln!("{}", line);
    let Ok(mut guard) = LOG_FILE.lock() else {
        return;
    };
    if let Some(file) = guard.as_mut() {
        let _ = writeln!(file, "{}", line);
    }
}

/// `tlog!("[Tag:{}] message", id)`: timestamped line via `write_line`.
macro_rules! tlog {
    ($($arg:tt)*) => {
        $crate::logging::write_line(format_args!($($arg)*))
    };
}
