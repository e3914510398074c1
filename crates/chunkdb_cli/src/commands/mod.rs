//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod repair;
pub mod verify;

use chunkdb_codec::DefaultPool;
use chunkdb_core::{ChunkDiskMapper, MapperConfig};
use std::path::Path;
use std::sync::Arc;

/// Opens the live chunk files in `path` for reading without changing them.
pub(crate) fn open_mapper(path: &Path) -> Result<ChunkDiskMapper, Box<dyn std::error::Error>> {
    check_dir(path)?;
    Ok(ChunkDiskMapper::open_read_only(
        path,
        Arc::new(DefaultPool),
        MapperConfig::default(),
    )?)
}

/// Opens the live chunk files in `path` for writing. Opening removes
/// leftovers of an interrupted cut and an incomplete last file.
pub(crate) fn open_mapper_writable(path: &Path) -> Result<ChunkDiskMapper, Box<dyn std::error::Error>> {
    check_dir(path)?;
    Ok(ChunkDiskMapper::open(
        path,
        Arc::new(DefaultPool),
        MapperConfig::default(),
    )?)
}

fn check_dir(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No chunk directory found at {}", path.display()).into());
    }
    Ok(())
}
