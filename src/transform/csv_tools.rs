use crate::error::{IngestError, IngestResult};
use tracing::{debug, warn};

/// One output file of [`split_csv`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvChunk {
    pub name: String,
    pub rows: usize,
    pub body: Vec<u8>,
}

/// Convert `h:m:s` to seconds; `None` for anything else
pub fn duration_to_seconds(duration: &str) -> Option<i64> {
    let parts: Vec<&str> = duration.trim().split(':').collect();
    let [hours, minutes, seconds] = parts.as_slice() else {
        return None;
    };

    let parse = |part: &str| part.trim().parse::<i64>().ok().filter(|v| *v >= 0);
    Some(parse(hours)? * 3600 + parse(minutes)? * 60 + parse(seconds)?)
}

/// Rename and filter columns: only `(source, target)` pairs are kept, in
/// mapping order. Source columns missing from the input produce empty cells.
pub fn remap_columns(input: &[u8], mapping: &[(String, String)]) -> IngestResult<Vec<u8>> {
    if mapping.is_empty() {
        return Err(IngestError::malformed_input("mapping", "no columns to keep"));
    }

    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers()?.clone();
    let positions: Vec<Option<usize>> = mapping
        .iter()
        .map(|(source, _)| headers.iter().position(|header| header == source))
        .collect();

    for ((source, _), position) in mapping.iter().zip(&positions) {
        if position.is_none() {
            warn!(column = %source, "Mapped column not present in input");
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(mapping.iter().map(|(_, target)| target.as_str()))?;
    for record in reader.records() {
        let record = record?;
        writer.write_record(
            positions
                .iter()
                .map(|position| position.and_then(|p| record.get(p)).unwrap_or("")),
        )?;
    }

    writer
        .into_inner()
        .map_err(|e| IngestError::serialization(e.to_string()))
}

/// Split a CSV into `{base}-part{n}.csv` chunks of at most `rows_per_file`
/// rows, repeating the header in each
pub fn split_csv(input: &[u8], source_key: &str, rows_per_file: usize) -> IngestResult<Vec<CsvChunk>> {
    if rows_per_file == 0 {
        return Err(IngestError::malformed_input("rows_per_file", "must be at least 1"));
    }

    let base = source_key.strip_suffix(".csv").unwrap_or(source_key);
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers()?.clone();

    let mut chunks = Vec::new();
    let mut writer: Option<csv::Writer<Vec<u8>>> = None;
    let mut rows_in_chunk = 0;

    for record in reader.records() {
        let record = record?;
        if writer.is_none() {
            let mut fresh = csv::Writer::from_writer(Vec::new());
            fresh.write_record(&headers)?;
            writer = Some(fresh);
        }
        if let Some(current) = writer.as_mut() {
            current.write_record(&record)?;
        }
        rows_in_chunk += 1;

        if rows_in_chunk == rows_per_file {
            if let Some(full) = writer.take() {
                chunks.push(finish_chunk(full, base, chunks.len() + 1, rows_in_chunk)?);
            }
            rows_in_chunk = 0;
        }
    }

    if let Some(rest) = writer.take() {
        chunks.push(finish_chunk(rest, base, chunks.len() + 1, rows_in_chunk)?);
    }

    debug!(source = %source_key, chunks = chunks.len(), "Split CSV");
    Ok(chunks)
}

fn finish_chunk(writer: csv::Writer<Vec<u8>>, base: &str, number: usize, rows: usize) -> IngestResult<CsvChunk> {
    let body = writer
        .into_inner()
        .map_err(|e| IngestError::serialization(e.to_string()))?;
    Ok(CsvChunk {
        name: format!("{base}-part{number}.csv"),
        rows,
        body,
    })
}
