//! JSONL output.

use crate::export::Row;
use crate::models::{DynaschemaError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes one JSON row per line to a file or stdout.
pub struct JsonlWriter {
    writer: BufWriter<Box<dyn Write>>,
    rows: usize,
}

impl JsonlWriter {
    /// Create (or truncate) `path`, creating parent directories as needed.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| DynaschemaError::io("creating output directory", e))?;
        }
        let file =
            File::create(path).map_err(|e| DynaschemaError::io("creating output file", e))?;
        Ok(Self::from_writer(Box::new(file)))
    }

    pub fn stdout() -> Self {
        Self::from_writer(Box::new(std::io::stdout()))
    }

    /// File at `path`, or stdout when `None`.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::create(path),
            None => Ok(Self::stdout()),
        }
    }

    fn from_writer(inner: Box<dyn Write>) -> Self {
        Self {
            writer: BufWriter::new(inner),
            rows: 0,
        }
    }

    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        let json = serde_json::to_string(row)
            .map_err(|e| DynaschemaError::Internal(format!("Failed to serialize row: {e}")))?;
        writeln!(self.writer, "{json}").map_err(|e| DynaschemaError::io("writing output", e))?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| DynaschemaError::io("flushing output", e))
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Usage;
    use crate::models::{Answer, MultipleChoiceQuestion};

    fn question(text: &str) -> MultipleChoiceQuestion {
        MultipleChoiceQuestion {
            question: text.to_string(),
            correct_answer: Answer::new("right", true),
            wrong_answer_1: Answer::new("wrong", false),
            wrong_answer_2: Answer::new("also wrong", false),
        }
    }

    #[test]
    fn test_writes_one_row_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("quiz.jsonl");

        let mut writer = JsonlWriter::open(Some(&path)).unwrap();
        writer.write_row(&Row::new(&question("First?"))).unwrap();
        writer
            .write_row(&Row::new(&question("Second?")).with_usage(Usage {
                prompt_tokens: 20,
                completion_tokens: 10,
                total_tokens: 30,
            }))
            .unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.rows_written(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["correct_answer"], "right");
        assert!(first.get("total_tokens").is_none());

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["question"], "Second?");
        assert_eq!(second["total_tokens"], 30);
    }

    #[test]
    fn test_create_truncates_existing_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "stale\nstale\n").unwrap();

        let mut writer = JsonlWriter::create(file.path()).unwrap();
        writer.write_row(&Row::new(&question("Q?"))).unwrap();
        writer.flush().unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(!content.contains("stale"));
    }
}
