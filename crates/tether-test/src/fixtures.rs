//! File and logging fixtures.

use std::path::PathBuf;
use std::sync::Once;

use tempfile::TempDir;

static LOGGING: Once = Once::new();

/// Install a test-writer subscriber once per process.
///
/// Honours `RUST_LOG`, defaulting to `debug` for the tether crates.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tether_gateway=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A temporary directory holding input files for one test.
#[derive(Debug)]
pub struct TestFiles {
    dir: TempDir,
}

impl TestFiles {
    /// Create an empty directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// Path of `name` inside the directory, whether or not it exists.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `lines`, one per line, to `name`.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write_lines(&self, name: &str, lines: &[&str]) -> PathBuf {
        let mut content = lines.join("\n");
        content.push('\n');
        self.write(name, &content)
    }

    /// Write `content` verbatim to `name`.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).expect("write fixture file");
        path
    }

    /// Write a credentials file with one bare token per line.
    pub fn tokens(&self, tokens: &[&str]) -> PathBuf {
        self.write_lines("tokens.txt", tokens)
    }

    /// Write a JSON array of `{"content": ...}` messages.
    pub fn messages(&self, contents: &[&str]) -> PathBuf {
        let messages: Vec<serde_json::Value> = contents
            .iter()
            .map(|c| serde_json::json!({ "content": c }))
            .collect();
        self.write("messages.json", &serde_json::Value::from(messages).to_string())
    }
}

impl Default for TestFiles {
    fn default() -> Self {
        Self::new()
    }
}
