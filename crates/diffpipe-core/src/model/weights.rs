//! Header check for downloaded safetensors files

use safetensors::tensor::Metadata;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

/// Refuse headers larger than this; real checkpoints stay far below it
const MAX_HEADER_BYTES: u64 = 100 * 1024 * 1024;

/// Summary of a weight file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightsHeader {
    pub tensor_count: usize,
    pub header_bytes: u64,
    pub file_bytes: u64,
}

/// Read and parse only the header of a safetensors file. Large checkpoints
/// are never loaded into memory.
pub fn inspect_safetensors(path: &Path) -> Result<WeightsHeader> {
    let invalid = |reason: String| Error::InvalidWeights {
        path: path.to_path_buf(),
        reason,
    };

    let mut file = std::fs::File::open(path)?;
    let file_bytes = file.metadata()?.len();

    let mut len_buf = [0u8; 8];
    file.read_exact(&mut len_buf)
        .map_err(|_| invalid("file shorter than header length prefix".to_string()))?;
    let header_bytes = u64::from_le_bytes(len_buf);

    if header_bytes > MAX_HEADER_BYTES {
        return Err(invalid(format!("header length {header_bytes} is too large")));
    }
    if 8 + header_bytes > file_bytes {
        return Err(invalid(format!(
            "header length {header_bytes} exceeds file size {file_bytes}"
        )));
    }

    let mut header = vec![0u8; header_bytes as usize];
    file.read_exact(&mut header)?;

    let metadata: Metadata = serde_json::from_slice(&header)
        .map_err(|e| invalid(format!("unreadable header: {e}")))?;
    let tensor_count = metadata.tensors().len();

    debug!("{:?}: {} tensors", path, tensor_count);
    Ok(WeightsHeader {
        tensor_count,
        header_bytes,
        file_bytes,
    })
}
