use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::reading::Reading;

pub const LOG_FILE_SUFFIX: &str = "_log.json";

#[derive(Debug)]
pub enum LoadedLog {
    Entries(Vec<Reading>),
    Absent,
    Invalid(String),
}

impl LoadedLog {
    pub fn into_entries(self) -> Vec<Reading> {
        match self {
            LoadedLog::Entries(entries) => entries,
            LoadedLog::Absent | LoadedLog::Invalid(_) => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct DeviceLog {
    dir: PathBuf,
}

impl DeviceLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn init(&self) -> Result<(), anyhow::Error> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create log directory {:?}", self.dir))?;
        Ok(())
    }

    pub fn path(&self, device_id: &str) -> PathBuf {
        self.dir.join(format!("{device_id}{LOG_FILE_SUFFIX}"))
    }

    pub fn load(&self, device_id: &str) -> LoadedLog {
        load_file(&self.path(device_id))
    }

    pub fn append(&self, reading: &Reading) -> Result<usize, anyhow::Error> {
        let path = self.path(&reading.device_id);

        let loaded = self.load(&reading.device_id);
        if let LoadedLog::Invalid(reason) = &loaded {
            log::debug!("Discarding unreadable log {path:?}: {reason}");
        }
        let mut entries = loaded.into_entries();
        entries.push(reading.clone());

        let json = serde_json::to_string_pretty(&entries).context("Failed to serialize log")?;
        write_replace(&path, json.as_bytes())
            .with_context(|| format!("Failed to write log file {path:?}"))?;

        Ok(entries.len())
    }
}

fn load_file(path: &Path) -> LoadedLog {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return LoadedLog::Absent,
        Err(e) => return LoadedLog::Invalid(e.to_string()),
    };

    match serde_json::from_str(&content) {
        Ok(entries) => LoadedLog::Entries(entries),
        Err(e) => LoadedLog::Invalid(e.to_string()),
    }
}

// Readers only ever see the old or the new file, never a partial one.
fn write_replace(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
