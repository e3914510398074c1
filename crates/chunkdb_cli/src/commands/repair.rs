//! Repair command implementation.

use super::{open_mapper, open_mapper_writable};
use chunkdb_core::{remove_files_from, CoreError};
use chunkdb_storage::list_sequence_files;
use std::path::Path;
use tracing::info;

/// Outcome of a repair.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RepairResult {
    /// First corrupted file, if any.
    pub first_bad: Option<u64>,
    /// Files removed, or that would be removed in a dry run.
    pub removed: Vec<u64>,
    /// Chunks left after the repair.
    pub chunks: usize,
}

/// Runs the repair command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let result = repair(path, dry_run)?;
    match result.first_bad {
        None => println!("No corruption found ({} chunks)", result.chunks),
        Some(seq) if dry_run => {
            println!("Corruption found in file {seq:06}");
            println!("Would remove {} file(s): {}", result.removed.len(), format_seqs(&result.removed));
        }
        Some(seq) => {
            println!("Corruption found in file {seq:06}");
            println!("Removed {} file(s): {}", result.removed.len(), format_seqs(&result.removed));
            println!("{} chunks remain", result.chunks);
        }
    }
    Ok(())
}

/// Finds the first corrupted file and removes it with every later file.
///
/// A dry run opens the directory read-only and changes nothing on disk.
pub fn repair(path: &Path, dry_run: bool) -> Result<RepairResult, Box<dyn std::error::Error>> {
    let mut result = RepairResult::default();
    loop {
        let Some(first_bad) = find_corruption(path, dry_run, &mut result.chunks)? else {
            return Ok(result);
        };
        result.first_bad.get_or_insert(first_bad);
        if dry_run {
            result.removed = list_sequence_files(path)?
                .range(first_bad..)
                .map(|(seq, _)| *seq)
                .collect();
            return Ok(result);
        }
        let removed = remove_files_from(path, first_bad)?;
        info!(path = %path.display(), first_bad, removed = removed.len(), "removed corrupted chunk files");
        result.removed.extend(removed);
    }
}

/// Opens and iterates the directory, returning the first file that fails.
fn find_corruption(
    path: &Path,
    read_only: bool,
    chunks: &mut usize,
) -> Result<Option<u64>, Box<dyn std::error::Error>> {
    *chunks = 0;
    let opened = if read_only {
        open_mapper(path)
    } else {
        open_mapper_writable(path)
    };
    let err = match opened {
        Ok(mapper) => {
            let outcome = mapper.iterate_all_chunks(|_| {
                *chunks += 1;
                Ok(())
            });
            mapper.close()?;
            match outcome {
                Ok(()) => return Ok(None),
                Err(err) => err,
            }
        }
        Err(err) => *err.downcast::<CoreError>()?,
    };

    if let CoreError::UnsequentialFiles { next, .. } = err {
        return Ok(Some(next));
    }
    match err.as_corruption().and_then(|c| c.file_index) {
        Some(seq) => Ok(Some(seq)),
        None => Err(err.into()),
    }
}

fn format_seqs(seqs: &[u64]) -> String {
    seqs.iter().map(|s| format!("{s:06}")).collect::<Vec<_>>().join(", ")
}
