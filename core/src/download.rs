//! Streaming downloads for PDF, HTML and template endpoints.

use std::io::{Cursor, Read};

use crate::envelope;
use crate::error::Result;
use crate::http::StreamResponse;
use crate::types::Download;

/// Bytes pulled from the response body per read.
pub const CHUNK_SIZE: usize = 1024;

/// Turn a streamed response into a `Download`.
///
/// A successful response is buffered in full and returned rewound. Any other
/// status is treated as an envelope, so server exceptions still surface as
/// `FrappeError::Server`.
pub fn collect(response: StreamResponse) -> Result<Download> {
    let success = response.is_success();
    let StreamResponse { status, mut body } = response;
    let buffer = read_chunked(&mut body)?;
    if success {
        log::debug!("downloaded {} bytes", buffer.get_ref().len());
        return Ok(Download::Content(buffer));
    }
    log::debug!("download failed with status {status}");
    envelope::unwrap_body(buffer.get_ref()).map(Download::Envelope)
}

/// Read `reader` to the end in `CHUNK_SIZE` pieces.
pub fn read_chunked(reader: &mut dyn Read) -> Result<Cursor<Vec<u8>>> {
    let mut output = Vec::new();
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        output.extend_from_slice(&chunk[..n]);
    }
    Ok(Cursor::new(output))
}
