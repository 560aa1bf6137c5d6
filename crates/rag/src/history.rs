//! Append-only conversation history.
//!
//! Each session is a `<id>.jsonl` file under `.esg/sessions/`, one `Turn`
//! per line.

use crate::types::Turn;
use esg_core::{AppError, AppResult};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, session_id: &str) -> AppResult<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.dir.join(format!("{}.jsonl", session_id)))
    }

    /// Append one turn and sync it to disk.
    pub fn append(&self, session_id: &str, turn: &Turn) -> AppResult<()> {
        let path = self.session_path(session_id)?;
        std::fs::create_dir_all(&self.dir)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AppError::Other(format!("Failed to open session {}: {}", session_id, e)))?;

        let json_line = serde_json::to_string(turn)?;
        writeln!(file, "{}", json_line)?;
        file.sync_all()?;

        tracing::debug!(session = session_id, "Appended turn");
        Ok(())
    }

    /// All turns of a session, oldest first. Unknown sessions are empty.
    pub fn load(&self, session_id: &str) -> AppResult<Vec<Turn>> {
        let path = self.session_path(session_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut turns = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let turn: Turn = serde_json::from_str(&line).map_err(|e| {
                AppError::Serialization(format!(
                    "Failed to parse line {} of session {}: {}",
                    line_num + 1,
                    session_id,
                    e
                ))
            })?;
            turns.push(turn);
        }
        Ok(turns)
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, session_id: &str, n: usize) -> AppResult<Vec<Turn>> {
        let mut turns = self.load(session_id)?;
        let skip = turns.len().saturating_sub(n);
        Ok(turns.split_off(skip))
    }

    /// Session ids with a history file, sorted.
    #[cfg(test)]
    fn list_sessions(&self) -> AppResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn validate_session_id(id: &str) -> AppResult<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::Config(format!("Invalid session id: {:?}", id)))
    }
}
