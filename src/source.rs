// 📥 Record Sources - one-pass producers of raw records
// The synchronizer pulls from these strictly in order, exactly once.

use crate::error::Result;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A finite, non-restartable sequence of raw records.
pub trait RecordSource {
    /// Header row, if the source has one. Read before the first record.
    fn header(&mut self) -> Result<Option<Vec<String>>>;

    /// Next raw record, or `None` once the source is exhausted
    fn next_record(&mut self) -> Result<Option<Vec<String>>>;
}

// ============================================================================
// CSV SOURCE
// ============================================================================

pub struct CsvRecordSource<R: Read> {
    reader: csv::Reader<R>,
    has_header: bool,
    record: csv::StringRecord,
}

impl CsvRecordSource<File> {
    pub fn from_path(path: &Path, has_header: bool) -> Result<Self> {
        let reader = Self::builder(has_header).from_path(path)?;
        Ok(Self::with_reader(reader, has_header))
    }
}

impl<R: Read> CsvRecordSource<R> {
    pub fn from_reader(rdr: R, has_header: bool) -> Self {
        let reader = Self::builder(has_header).from_reader(rdr);
        Self::with_reader(reader, has_header)
    }

    fn builder(has_header: bool) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        // record length is checked against the column map, not the first row
        builder.has_headers(has_header).flexible(true);
        builder
    }

    fn with_reader(reader: csv::Reader<R>, has_header: bool) -> Self {
        CsvRecordSource {
            reader,
            has_header,
            record: csv::StringRecord::new(),
        }
    }
}

impl<R: Read> RecordSource for CsvRecordSource<R> {
    fn header(&mut self) -> Result<Option<Vec<String>>> {
        if !self.has_header {
            return Ok(None);
        }
        let headers = self.reader.headers()?;
        Ok(Some(headers.iter().map(str::to_string).collect()))
    }

    fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        if !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }
        Ok(Some(self.record.iter().map(str::to_string).collect()))
    }
}

// ============================================================================
// IN-MEMORY SOURCE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    header: Option<Vec<String>>,
    records: VecDeque<Vec<String>>,
}

impl MemorySource {
    pub fn new<I, R, S>(records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MemorySource {
            header: None,
            records: records
                .into_iter()
                .map(|r| r.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    pub fn with_header<S: Into<String>>(mut self, header: impl IntoIterator<Item = S>) -> Self {
        self.header = Some(header.into_iter().map(Into::into).collect());
        self
    }

    pub fn remaining(&self) -> usize {
        self.records.len()
    }
}

impl RecordSource for MemorySource {
    fn header(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.header.take())
    }

    fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.records.pop_front())
    }
}
