//! Verify command implementation.

use super::open_mapper;
use chunkdb_codec::DefaultPool;
use chunkdb_core::{CoreError, SegmentConfig, SegmentReader};
use std::path::Path;
use std::sync::Arc;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of files checked.
    pub files_checked: usize,
    /// Number of records that passed.
    pub valid_records: usize,
    /// The first error found.
    pub error: Option<CoreError>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, persisted: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying chunk directory at {}", path.display());
    println!();

    let result = if persisted {
        println!("Checking persisted segments...");
        verify_persisted(path)?
    } else {
        println!("Checking live files...");
        verify_live(path)?
    };
    print_result(&result);

    println!();
    if result.is_ok() {
        println!("✓ Verification passed");
        Ok(())
    } else {
        println!("✗ Verification failed");
        Err("Verification failed".into())
    }
}

fn verify_live(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();
    let mapper = match open_mapper(path) {
        Ok(mapper) => mapper,
        Err(err) => match err.downcast::<CoreError>() {
            Ok(err) => {
                result.error = Some(*err);
                return Ok(result);
            }
            Err(err) => return Err(err),
        },
    };
    result.files_checked = mapper.file_sequences().len();

    // Reading each chunk back also decodes its payload.
    let outcome = mapper.iterate_all_chunks(|record| {
        mapper.chunk(record.chunk_ref)?;
        result.valid_records += 1;
        Ok(())
    });
    if let Err(err) = outcome {
        result.error = Some(err);
    }
    mapper.close()?;
    Ok(result)
}

fn verify_persisted(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();
    if !path.is_dir() {
        return Err(format!("No chunk directory found at {}", path.display()).into());
    }
    let reader = match SegmentReader::open(path, Arc::new(DefaultPool), &SegmentConfig::default()) {
        Ok(reader) => reader,
        Err(err) => {
            result.error = Some(err);
            return Ok(result);
        }
    };
    result.files_checked = reader.segment_sequences().len();

    let outcome = reader.for_each_chunk(|_, _| {
        result.valid_records += 1;
        Ok(())
    });
    if let Err(err) = outcome {
        result.error = Some(err);
    }
    Ok(result)
}

fn print_result(result: &VerifyResult) {
    println!("  Files checked: {}", result.files_checked);
    println!("  Valid records: {}", result.valid_records);
    if let Some(err) = &result.error {
        println!("  Error: {err}");
        if let Some(corruption) = err.as_corruption() {
            if let Some(seq) = corruption.file_index {
                println!("  Corrupted file: {seq:06}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkdb_codec::RawChunk;
    use chunkdb_core::{ChunkDiskMapper, ChunkMeta, MapperConfig, SegmentWriter, SeriesRef};
    use tempfile::tempdir;

    #[test]
    fn live_directory_passes_then_fails() {
        let dir = tempdir().unwrap();
        {
            let mapper = ChunkDiskMapper::open(dir.path(), Arc::new(DefaultPool), MapperConfig::default()).unwrap();
            for i in 0..3u8 {
                mapper
                    .write_chunk(SeriesRef::new(1), 0, 1, Arc::new(RawChunk::new(vec![i; 8])), false, |_| {})
                    .unwrap();
            }
            mapper.close().unwrap();
        }
        let result = verify_live(dir.path()).unwrap();
        assert!(result.is_ok());
        assert_eq!(result.valid_records, 3);

        let path = dir.path().join("000001");
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let result = verify_live(dir.path()).unwrap();
        assert_eq!(result.valid_records, 2);
        assert!(result.error.unwrap().is_corruption());
    }

    #[test]
    fn live_verification_leaves_crash_leftovers() {
        let dir = tempdir().unwrap();
        {
            let mapper = ChunkDiskMapper::open(dir.path(), Arc::new(DefaultPool), MapperConfig::default()).unwrap();
            mapper
                .write_chunk(SeriesRef::new(1), 0, 1, Arc::new(RawChunk::new(vec![1; 8])), false, |_| {})
                .unwrap();
            mapper.close().unwrap();
        }
        let short = dir.path().join("000002");
        let tmp = dir.path().join("000003.tmp");
        std::fs::write(&short, [0x01]).unwrap();
        std::fs::write(&tmp, b"partial").unwrap();

        let result = verify_live(dir.path()).unwrap();
        assert!(result.is_ok());
        assert_eq!((result.files_checked, result.valid_records), (1, 1));
        assert!(short.exists());
        assert!(tmp.exists());
    }

    #[test]
    fn persisted_directory_counts_records() {
        let dir = tempdir().unwrap();
        let mut metas: Vec<_> = (0..4u8)
            .map(|i| ChunkMeta::new(Arc::new(RawChunk::new(vec![i; 8])), 0, 1))
            .collect();
        let mut writer = SegmentWriter::new(dir.path(), SegmentConfig::default()).unwrap();
        writer.write_chunks(&mut metas).unwrap();
        writer.close().unwrap();

        let result = verify_persisted(dir.path()).unwrap();
        assert!(result.is_ok());
        assert_eq!((result.files_checked, result.valid_records), (1, 4));
    }
}
