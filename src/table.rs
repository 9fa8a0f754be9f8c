use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::record::ResponseRecord;

/// Column order of the results file.
pub const CSV_HEADER: [&str; 7] = [
    "model",
    "prompt",
    "created_at",
    "total_duration",
    "load_duration",
    "eval_duration",
    "eval_rate",
];

// Field order must match CSV_HEADER
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    model: &'a str,
    prompt: &'a str,
    created_at: &'a str,
    total_duration: f64,
    load_duration: f64,
    eval_duration: f64,
    eval_rate: f64,
}

impl<'a> From<&'a ResponseRecord> for CsvRow<'a> {
    fn from(record: &'a ResponseRecord) -> Self {
        Self {
            model: &record.model,
            prompt: &record.prompt,
            created_at: &record.created_at,
            total_duration: record.total_duration,
            load_duration: record.load_duration,
            eval_duration: record.eval_duration,
            eval_rate: record.eval_rate,
        }
    }
}

/// Records collected during a run, in request order.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    records: Vec<ResponseRecord>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: ResponseRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ResponseRecord] {
        &self.records
    }

    /// Writes the header followed by one row per record.
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);

        // Written explicitly so an empty table still gets a header
        writer.write_record(CSV_HEADER)?;
        for record in &self.records {
            writer.serialize(CsvRow::from(record))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> csv::Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))
    }
}
