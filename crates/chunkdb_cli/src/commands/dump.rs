//! Dump command implementation.

use super::open_mapper;
use chunkdb_core::ChunkRecord;
use serde::Serialize;
use std::path::Path;

/// A chunk record as printed by `dump`.
#[derive(Debug, Serialize)]
pub struct DumpRecord {
    /// Reference as `seq:offset`.
    pub chunk_ref: String,
    /// Series the chunk belongs to.
    pub series_ref: u64,
    /// Lowest timestamp.
    pub min_time: i64,
    /// Highest timestamp.
    pub max_time: i64,
    /// Number of samples.
    pub num_samples: u16,
    /// Encoding tag.
    pub encoding: u8,
    /// Whether the chunk is out-of-order.
    pub out_of_order: bool,
}

impl From<&ChunkRecord> for DumpRecord {
    fn from(record: &ChunkRecord) -> Self {
        Self {
            chunk_ref: record.chunk_ref.to_string(),
            series_ref: record.series_ref.as_u64(),
            min_time: record.min_time,
            max_time: record.max_time,
            num_samples: record.num_samples,
            encoding: record.encoding.as_u8(),
            out_of_order: record.out_of_order,
        }
    }
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    series: Option<u64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mapper = open_mapper(path)?;
    let records = collect(&mapper, limit, series)?;
    mapper.close()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            println!(
                "{:<16}  {:>10}  {:>16}  {:>16}  {:>7}  {:>3}  {}",
                "REF", "SERIES", "MIN TIME", "MAX TIME", "SAMPLES", "ENC", "OOO"
            );
            for r in &records {
                println!(
                    "{:<16}  {:>10}  {:>16}  {:>16}  {:>7}  {:>3}  {}",
                    r.chunk_ref, r.series_ref, r.min_time, r.max_time, r.num_samples, r.encoding, r.out_of_order
                );
            }
            println!();
            println!("{} record(s)", records.len());
        }
    }
    Ok(())
}

fn collect(
    mapper: &chunkdb_core::ChunkDiskMapper,
    limit: Option<usize>,
    series: Option<u64>,
) -> Result<Vec<DumpRecord>, Box<dyn std::error::Error>> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();
    mapper.iterate_all_chunks(|record| {
        if records.len() < limit && series.map_or(true, |s| s == record.series_ref.as_u64()) {
            records.push(DumpRecord::from(record));
        }
        Ok(())
    })?;
    Ok(records)
}
