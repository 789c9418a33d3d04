use crate::error::ParserError;

/// Maximum file size in bytes (10 MiB).
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Number of leading bytes to inspect for binary detection.
const BINARY_CHECK_SIZE: usize = 8192;

/// Check that a file is within size limits.
/// Returns `Err(ParserError::FileTooLarge)` if the file exceeds 10 MiB.
pub fn check_file_size(path: &str, size: u64) -> Result<(), ParserError> {
    if size > MAX_FILE_SIZE {
        return Err(ParserError::FileTooLarge {
            path: path.to_string(),
            size,
            max: MAX_FILE_SIZE,
        });
    }
    Ok(())
}

/// Returns `true` if the buffer appears to contain binary (non-text) data.
/// Detection: presence of null bytes in the first 8 KB.
pub fn is_binary(content: &[u8]) -> bool {
    let check_len = content.len().min(BINARY_CHECK_SIZE);
    content[..check_len].contains(&0)
}
