#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

pub const ORDERS_HEADER: &str = "order_date,order_id,customer_id,product,amount,channel";

/// Path to a file under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Owns a temporary directory for files a test writes and reads back.
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn new() -> Self {
        Self {
            dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.join(name);
        let mut file = File::create(&path).expect("create scratch file");
        file.write_all(contents.as_bytes())
            .expect("write scratch file");
        path
    }

    /// Writes an orders file with the standard header followed by `rows`.
    pub fn write_orders(&self, name: &str, rows: &[&str]) -> PathBuf {
        let mut contents = String::from(ORDERS_HEADER);
        for row in rows {
            contents.push('\n');
            contents.push_str(row);
        }
        contents.push('\n');
        self.write(name, &contents)
    }
}
