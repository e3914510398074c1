//! Inspect command implementation.

use super::open_mapper;
use chunkdb_storage::segment_file_path;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Directory path.
    pub path: String,
    /// Combined file size in bytes.
    pub total_size: u64,
    /// Number of chunks across all files.
    pub chunk_count: usize,
    /// Number of samples across all chunks.
    pub sample_count: u64,
    /// Number of chunks written as out-of-order.
    pub out_of_order_count: usize,
    /// Per-file statistics.
    pub files: Vec<FileStats>,
}

/// Statistics for a single live file.
#[derive(Debug, Default, Serialize)]
pub struct FileStats {
    /// Sequence number.
    pub seq: u64,
    /// Size on disk in bytes.
    pub size: u64,
    /// Number of chunks.
    pub chunk_count: usize,
    /// Lowest chunk timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_time: Option<i64>,
    /// Highest chunk timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_time: Option<i64>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mapper = open_mapper(path)?;

    let mut files: BTreeMap<u64, FileStats> = mapper
        .file_sequences()
        .into_iter()
        .map(|seq| {
            let size = std::fs::metadata(segment_file_path(path, seq)).map_or(0, |m| m.len());
            (
                seq,
                FileStats {
                    seq,
                    size,
                    ..FileStats::default()
                },
            )
        })
        .collect();

    let mut result = InspectResult {
        path: path.display().to_string(),
        total_size: mapper.size()?,
        chunk_count: 0,
        sample_count: 0,
        out_of_order_count: 0,
        files: Vec::new(),
    };

    mapper.iterate_all_chunks(|record| {
        result.chunk_count += 1;
        result.sample_count += u64::from(record.num_samples);
        if record.out_of_order {
            result.out_of_order_count += 1;
        }
        if let Some(file) = files.get_mut(&record.chunk_ref.seq()) {
            file.chunk_count += 1;
            file.min_time = Some(file.min_time.map_or(record.min_time, |t| t.min(record.min_time)));
        }
        Ok(())
    })?;
    for file in files.values_mut() {
        file.max_time = mapper.file_max_time(file.seq);
    }
    result.files = files.into_values().collect();
    mapper.close()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Chunk directory: {}", result.path);
    println!();
    println!("Total size:   {}", format_size(result.total_size));
    println!("Files:        {}", result.files.len());
    println!("Chunks:       {}", result.chunk_count);
    println!("Samples:      {}", result.sample_count);
    println!("Out-of-order: {}", result.out_of_order_count);

    if !result.files.is_empty() {
        println!();
        println!("{:>8}  {:>10}  {:>8}  {:>20}  {:>20}", "SEQ", "SIZE", "CHUNKS", "MIN TIME", "MAX TIME");
        for file in &result.files {
            println!(
                "{:>8}  {:>10}  {:>8}  {:>20}  {:>20}",
                format!("{:06}", file.seq),
                format_size(file.size),
                file.chunk_count,
                file.min_time.map_or_else(|| "-".to_string(), |t| t.to_string()),
                file.max_time.map_or_else(|| "-".to_string(), |t| t.to_string()),
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
