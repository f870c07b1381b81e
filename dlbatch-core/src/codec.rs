//! Reply body codec: gzip-compressed UTF-8 text.

use crate::error::DlError;
use flate2::read::GzDecoder;
use std::io::Read;

/// Decompress and decode a `.dat.gz` reply body.
pub fn decode_reply(body: &[u8]) -> Result<String, DlError> {
    let mut text = String::new();
    GzDecoder::new(body)
        .read_to_string(&mut text)
        .map_err(|e| DlError::Decode(format!("gunzip failed: {e}")))?;
    Ok(text)
}
