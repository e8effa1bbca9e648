use std::{
    env,
    ffi::OsString,
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{
    backend_config, BACKEND_LOG_FILE, BACKEND_LOG_MAX_BYTES, DESKTOP_LOG_FILE,
    DESKTOP_LOG_MAX_BYTES, DESKTOP_LOG_PATH_ENV, LOG_BACKUP_COUNT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopLogCategory {
    Startup,
    Runtime,
    Restart,
    Shutdown,
    Renderer,
}

impl DesktopLogCategory {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Runtime => "runtime",
            Self::Restart => "restart",
            Self::Shutdown => "shutdown",
            Self::Renderer => "renderer",
        }
    }
}

/// Which standard stream of the backend a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Destination for desktop diagnostics and captured backend output.
///
/// Implementations must swallow their own I/O failures: logging never
/// changes the outcome of a supervisor operation.
pub trait LogSink: Send + Sync {
    fn desktop(&self, category: DesktopLogCategory, message: &str);

    fn backend_line(&self, stream: OutputStream, line: &str);

    fn runtime(&self, message: &str) {
        self.desktop(DesktopLogCategory::Runtime, message);
    }

    fn startup(&self, message: &str) {
        self.desktop(DesktopLogCategory::Startup, message);
    }

    fn restart(&self, message: &str) {
        self.desktop(DesktopLogCategory::Restart, message);
    }

    fn shutdown(&self, message: &str) {
        self.desktop(DesktopLogCategory::Shutdown, message);
    }
}

#[derive(Debug)]
pub struct FileLogSink {
    desktop_log_path: PathBuf,
    backend_log_path: PathBuf,
    desktop_write_lock: Mutex<()>,
    backend_write_lock: Mutex<()>,
}

impl FileLogSink {
    pub fn new(desktop_log_path: PathBuf, backend_log_path: PathBuf) -> Self {
        Self {
            desktop_log_path,
            backend_log_path,
            desktop_write_lock: Mutex::new(()),
            backend_write_lock: Mutex::new(()),
        }
    }

    pub fn from_env() -> Self {
        let root = backend_config::resolve_data_root();
        Self::new(
            resolve_desktop_log_path(root.clone(), DESKTOP_LOG_FILE),
            resolve_backend_log_path(root),
        )
    }

    pub fn desktop_log_path(&self) -> &Path {
        &self.desktop_log_path
    }

    pub fn backend_log_path(&self) -> &Path {
        &self.backend_log_path
    }
}

impl LogSink for FileLogSink {
    fn desktop(&self, category: DesktopLogCategory, message: &str) {
        append_log_line(
            &self.desktop_log_path,
            category.as_label(),
            message,
            DESKTOP_LOG_MAX_BYTES,
            "desktop",
            &self.desktop_write_lock,
        );
    }

    fn backend_line(&self, stream: OutputStream, line: &str) {
        append_log_line(
            &self.backend_log_path,
            stream.as_label(),
            line,
            BACKEND_LOG_MAX_BYTES,
            "backend",
            &self.backend_write_lock,
        );
    }
}

fn append_log_line(
    path: &Path,
    tag: &str,
    message: &str,
    max_bytes: u64,
    log_scope: &str,
    write_lock: &Mutex<()>,
) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let _guard = match write_lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    rotate_log_if_needed(path, max_bytes, LOG_BACKUP_COUNT, log_scope);
    let line = format_log_line(tag, message);
    let _ = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
}

fn format_log_line(tag: &str, message: &str) -> String {
    let timestamp = chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.3f %z")
        .to_string();
    format!("[{timestamp}] [{tag}] {}\n", message.trim_end())
}

pub fn rotate_log_if_needed(path: &Path, max_bytes: u64, backup_count: usize, log_scope: &str) {
    if max_bytes == 0 || backup_count == 0 {
        return;
    }

    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                eprintln!(
                    "[log rotation:{log_scope}] failed to read metadata for {}: {}",
                    path.display(),
                    error
                );
            }
            return;
        }
    };
    if metadata.len() < max_bytes {
        return;
    }

    let oldest = rotated_log_path(path, backup_count);
    remove_if_present(&oldest, log_scope);

    for index in (1..backup_count).rev() {
        let source = rotated_log_path(path, index);
        if !source.exists() {
            continue;
        }
        let target = rotated_log_path(path, index + 1);
        remove_if_present(&target, log_scope);
        if let Err(error) = fs::rename(&source, &target) {
            eprintln!(
                "[log rotation:{log_scope}] failed to rename {} to {}: {}",
                source.display(),
                target.display(),
                error
            );
        }
    }

    let rotated = rotated_log_path(path, 1);
    remove_if_present(&rotated, log_scope);
    if let Err(error) = fs::rename(path, &rotated) {
        eprintln!(
            "[log rotation:{log_scope}] failed to rotate {} to {}: {}",
            path.display(),
            rotated.display(),
            error
        );
    }
}

fn remove_if_present(path: &Path, log_scope: &str) {
    if let Err(error) = fs::remove_file(path) {
        if error.kind() != std::io::ErrorKind::NotFound {
            eprintln!(
                "[log rotation:{log_scope}] failed to remove {}: {}",
                path.display(),
                error
            );
        }
    }
}

fn rotated_log_path(path: &Path, index: usize) -> PathBuf {
    let mut value = OsString::from(path.as_os_str());
    value.push(format!(".{index}"));
    PathBuf::from(value)
}

pub fn resolve_desktop_log_path(data_root: Option<PathBuf>, desktop_log_file: &str) -> PathBuf {
    if let Ok(custom) = env::var(DESKTOP_LOG_PATH_ENV) {
        let candidate = PathBuf::from(custom.trim());
        if !candidate.as_os_str().is_empty() {
            return candidate;
        }
    }

    logs_dir(data_root).join(desktop_log_file)
}

pub fn resolve_backend_log_path(data_root: Option<PathBuf>) -> PathBuf {
    logs_dir(data_root).join(BACKEND_LOG_FILE)
}

fn logs_dir(data_root: Option<PathBuf>) -> PathBuf {
    data_root
        .unwrap_or_else(|| env::temp_dir().join("agent-pro"))
        .join("logs")
}

/// Collects everything in memory; used by tests across the crate.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemoryLogSink {
    lines: Mutex<Vec<String>>,
}

#[cfg(test)]
impl MemoryLogSink {
    pub(crate) fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("lock memory log").clone()
    }

    pub(crate) fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

#[cfg(test)]
impl LogSink for MemoryLogSink {
    fn desktop(&self, category: DesktopLogCategory, message: &str) {
        self.lines
            .lock()
            .expect("lock memory log")
            .push(format!("[{}] {message}", category.as_label()));
    }

    fn backend_line(&self, stream: OutputStream, line: &str) {
        self.lines
            .lock()
            .expect("lock memory log")
            .push(format!("[{stream}] {line}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn create_temp_case_dir(name: &str) -> PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let dir = env::temp_dir().join(format!(
            "agent-pro-logging-test-{}-{}-{}",
            std::process::id(),
            ts,
            name
        ));
        fs::create_dir_all(&dir).expect("create temp case dir");
        dir
    }

    #[test]
    fn rotate_log_shifts_backups_and_drops_oldest() {
        let dir = create_temp_case_dir("rotate");
        let log = dir.join("desktop.log");
        fs::write(&log, b"0123456789").expect("write active log");
        fs::write(rotated_log_path(&log, 1), b"first").expect("write backup 1");
        fs::write(rotated_log_path(&log, 2), b"second").expect("write backup 2");

        rotate_log_if_needed(&log, 5, 2, "test");

        assert!(!log.exists());
        assert_eq!(
            fs::read(rotated_log_path(&log, 1)).expect("read backup 1"),
            b"0123456789"
        );
        assert_eq!(
            fs::read(rotated_log_path(&log, 2)).expect("read backup 2"),
            b"first"
        );
        fs::remove_dir_all(&dir).expect("cleanup temp case dir");
    }

    #[test]
    fn rotate_log_keeps_small_files_in_place() {
        let dir = create_temp_case_dir("small");
        let log = dir.join("backend.log");
        fs::write(&log, b"tiny").expect("write active log");

        rotate_log_if_needed(&log, 1024, 3, "test");

        assert!(log.exists());
        assert!(!rotated_log_path(&log, 1).exists());
        fs::remove_dir_all(&dir).expect("cleanup temp case dir");
    }

    #[test]
    fn file_sink_tags_backend_lines_with_stream_name() {
        let dir = create_temp_case_dir("sink");
        let sink = FileLogSink::new(dir.join("desktop.log"), dir.join("backend.log"));

        sink.backend_line(OutputStream::Stderr, "Traceback (most recent call last):\n");
        sink.desktop(DesktopLogCategory::Restart, "backend restart requested");

        let backend = fs::read_to_string(sink.backend_log_path()).expect("read backend log");
        assert!(backend.contains("[stderr] Traceback (most recent call last):"));
        assert!(backend.ends_with(":\n"));
        let desktop = fs::read_to_string(sink.desktop_log_path()).expect("read desktop log");
        assert!(desktop.contains("[restart] backend restart requested"));
        fs::remove_dir_all(&dir).expect("cleanup temp case dir");
    }

    #[test]
    fn backend_log_lives_next_to_desktop_log_under_data_root() {
        let root = PathBuf::from("/srv/agent-pro");
        assert_eq!(
            resolve_backend_log_path(Some(root.clone())),
            root.join("logs").join("backend.log")
        );
    }
}
