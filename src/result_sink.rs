use crate::error::Result;
use csv::{Terminator, WriterBuilder};
use log::debug;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Row separator of an export file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Crlf,
    Lf,
}

impl LineEnding {
    fn terminator(self) -> Terminator {
        match self {
            LineEnding::Crlf => Terminator::CRLF,
            LineEnding::Lf => Terminator::Any(b'\n'),
        }
    }
}

/// Semicolon-delimited export file. The file is reopened for every batch so
/// nothing stays open across the pauses between pages.
pub struct ResultSink {
    path: PathBuf,
    line_ending: LineEnding,
    rows_written: u64,
}

impl ResultSink {
    /// Truncates `path` and writes the header row.
    pub fn create<P: AsRef<Path>>(path: P, columns: &[&str], line_ending: LineEnding) -> Result<Self> {
        let sink = ResultSink {
            path: path.as_ref().to_path_buf(),
            line_ending,
            rows_written: 0,
        };
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&sink.path)?;
        let mut writer = sink.builder().from_writer(file);
        writer.write_record(columns)?;
        writer.flush()?;
        debug!("Created {:?} with {} columns", sink.path, columns.len());
        Ok(sink)
    }

    pub fn append<I>(&mut self, rows: I) -> Result<usize>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = self.builder().from_writer(file);
        let mut count = 0;
        for row in rows {
            writer.write_record(&row)?;
            count += 1;
        }
        writer.flush()?;
        self.rows_written += count as u64;
        Ok(count)
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn builder(&self) -> WriterBuilder {
        let mut builder = WriterBuilder::new();
        builder
            .delimiter(b';')
            .terminator(self.line_ending.terminator())
            .flexible(true)
            .has_headers(false);
        builder
    }
}
