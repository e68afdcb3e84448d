#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv_quality::{config::ProfileConfig, session::Session};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes raw bytes, for encoding tests.
    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, contents).expect("write temp bytes");
        path
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.temp_dir.path().join(name)).expect("read output file")
    }

    /// Loads `name` with default configuration and UTF-8 input.
    pub fn open(&self, name: &str, contents: &str) -> Session {
        let path = self.write(name, contents);
        Session::open(&path, ProfileConfig::default(), None, encoding_rs::UTF_8)
            .expect("open session")
    }
}

/// A small patient register with the usual problems: gaps, a duplicate row,
/// currency and percentage formatting and a badly formed postcode.
pub const PATIENTS_CSV: &str = "\
id,name,age,postcode,fee,attendance,registered
1,Ann,34,SW1A 2AA,£1200,95%,2023-01-04
2,Bob,,NE1 4LP,£950,80%,2023-02-11
3,Cara,51,bad code,£1100,NA,2023-03-09
4,Dev,29,,£800,100%,
5,Eli,130,M1 1AE,£1000,75%,2023-05-21
5,Eli,130,M1 1AE,£1000,75%,2023-05-21
";
