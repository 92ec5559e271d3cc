use crate::config::TEXT_TYPES;
use bytes::Bytes;
use compression_codecs::{
    EncodeV2,
    brotli::{BrotliEncoder, params::EncoderParams as BrotliParams},
    gzip::GzipEncoder,
};
use compression_core::Level;
use compression_core::util::{PartialBuffer, WriteBuffer};
use std::fmt;
use std::io;

const OUTPUT_BUFFER_SIZE: usize = 8 * 1024; // 8KB output buffer

/// Highest effort level the gzip engine accepts.
pub const GZIP_MAX_LEVEL: u32 = 9;

/// Supported compression algorithms, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Brotli compression.
    Brotli,
    /// Gzip compression.
    Gzip,
}

impl Encoding {
    /// Returns the name used for this encoding in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Brotli => "brotli",
            Encoding::Gzip => "gzip",
        }
    }

    /// Creates a new encoder for this encoding.
    ///
    /// Gzip effort is capped at [`GZIP_MAX_LEVEL`]; Brotli receives `level`
    /// as is. `text` selects Brotli's text mode hint.
    pub fn encoder(&self, level: u32, text: bool) -> Box<dyn EncodeV2 + Send> {
        match self {
            Encoding::Brotli => {
                let params = BrotliParams::default().quality(precise(level));
                let params = if text { params.text_mode() } else { params };
                Box::new(BrotliEncoder::new(params))
            }
            Encoding::Gzip => Box::new(GzipEncoder::new(
                precise(level.min(GZIP_MAX_LEVEL)).into(),
            )),
        }
    }

    /// Compresses a whole buffer with this encoding.
    pub fn compress(&self, input: &[u8], level: u32, text: bool) -> io::Result<Vec<u8>> {
        encode_all(self.encoder(level, text), input)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn precise(level: u32) -> Level {
    Level::Precise(i32::try_from(level).unwrap_or(i32::MAX))
}

/// The encoding chosen for a response, with the `Content-Encoding` token to
/// send back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// The selected encoding.
    pub encoding: Encoding,
    /// The token written to `Content-Encoding`, matching what the client sent.
    pub token: &'static str,
}

impl Negotiated {
    /// Selects an encoding from a raw `Accept-Encoding` value.
    ///
    /// Matching is a loose, case-insensitive substring check: any value that
    /// contains `brotli` (or lists the `br` coding) selects Brotli, otherwise
    /// any value containing `gzip` selects Gzip. Quality values are ignored.
    /// Brotli wins when both are acceptable.
    pub fn from_accept_encoding(
        header: &str,
        brotli_enabled: bool,
        gzip_enabled: bool,
    ) -> Option<Negotiated> {
        let header = header.to_ascii_lowercase();

        if brotli_enabled {
            if header.contains("brotli") {
                return Some(Negotiated {
                    encoding: Encoding::Brotli,
                    token: "brotli",
                });
            }
            let lists_br = header
                .split(',')
                .map(|part| part.split(';').next().unwrap_or("").trim())
                .any(|coding| coding == "br");
            if lists_br {
                return Some(Negotiated {
                    encoding: Encoding::Brotli,
                    token: "br",
                });
            }
        }

        if gzip_enabled && header.contains("gzip") {
            return Some(Negotiated {
                encoding: Encoding::Gzip,
                token: "gzip",
            });
        }

        None
    }
}

/// The routine that turns an uncompressed body into compressed bytes.
pub trait Compressor: Send + Sync {
    /// Compresses `input` for a response of the given MIME type.
    fn compress(
        &self,
        encoding: Encoding,
        level: u32,
        mimetype: &str,
        input: &[u8],
    ) -> io::Result<Bytes>;
}

/// Compressor backed by the gzip and Brotli encoders of `compression-codecs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCompressor;

impl Compressor for DefaultCompressor {
    fn compress(
        &self,
        encoding: Encoding,
        level: u32,
        mimetype: &str,
        input: &[u8],
    ) -> io::Result<Bytes> {
        encoding
            .compress(input, level, is_text(mimetype))
            .map(Bytes::from)
    }
}

/// Whether Brotli should be told the payload is text.
fn is_text(mimetype: &str) -> bool {
    TEXT_TYPES.contains(&mimetype)
}

/// Runs an encoder over the whole input and finishes the stream.
fn encode_all(mut encoder: Box<dyn EncodeV2 + Send>, input: &[u8]) -> io::Result<Vec<u8>> {
    let mut output_buffer = vec![0u8; OUTPUT_BUFFER_SIZE];
    let mut compressed = Vec::with_capacity(input.len() / 2);
    let mut input_buf = PartialBuffer::new(input);

    // Keep encoding until all input is consumed
    while input_buf.written_len() < input.len() {
        let consumed = input_buf.written_len();
        let mut output = WriteBuffer::new_initialized(output_buffer.as_mut_slice());

        encoder
            .encode(&mut input_buf, &mut output)
            .map_err(io::Error::other)?;

        let written = output.written_len();
        compressed.extend_from_slice(&output_buffer[..written]);

        if written == 0 && input_buf.written_len() == consumed {
            return Err(io::Error::other("encoder made no progress"));
        }
    }

    loop {
        let mut output = WriteBuffer::new_initialized(output_buffer.as_mut_slice());

        let done = encoder.finish(&mut output).map_err(io::Error::other)?;

        let written = output.written_len();
        compressed.extend_from_slice(&output_buffer[..written]);

        if done {
            return Ok(compressed);
        }
    }
}
