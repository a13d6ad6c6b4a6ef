//! Raw byte pass-through for the child's stderr.

use tokio::io::{AsyncRead, AsyncWrite};

use super::StreamError;

/// Copy everything from `reader` to `writer` untouched.
///
/// Returns the number of bytes copied.
///
/// # Errors
///
/// Returns `StreamError::Passthrough` if either side fails.
pub async fn pass_through<R, W>(mut reader: R, mut writer: W) -> Result<u64, StreamError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(StreamError::Passthrough)
}
