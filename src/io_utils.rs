//! CSV reader/writer construction and text encoding.
//!
//! Objects arrive as byte buffers from the storage layer and leave the same
//! way, so everything here works on in-memory readers and writers:
//!
//! - **Dialect**: separator and quote character come from [`CsvFormat`].
//! - **Encoding**: input decoding and output transcoding via `encoding_rs`,
//!   defaulting to UTF-8.
//! - **Quoting**: output fields are quoted only when necessary.

use std::io::{self, Read, Write};

use anyhow::{Result, anyhow};
use csv::{QuoteStyle, Terminator};
use encoding_rs::{Encoding, UTF_8};

use crate::config::CsvFormat;

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Reader that yields every row, header included, and tolerates ragged rows
/// so the caller can decide how to treat them.
pub fn open_csv_reader<R>(reader: R, format: &CsvFormat) -> Result<csv::Reader<R>>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(format.separator_byte()?)
        .quote(format.quote_byte()?)
        .double_quote(true)
        .flexible(true);
    Ok(builder.from_reader(reader))
}

pub fn open_csv_writer<W>(writer: W, format: &CsvFormat) -> Result<csv::Writer<Box<dyn Write>>>
where
    W: Write + 'static,
{
    let encoding = resolve_encoding(Some(&format.encoding))?;
    let inner: Box<dyn Write> = if encoding == UTF_8 {
        Box::new(writer)
    } else {
        Box::new(TranscodingWriter::new(writer, encoding))
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(format.separator_byte()?)
        .quote(format.quote_byte()?)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .double_quote(true)
        .flexible(false);
    Ok(builder.from_writer(inner))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Strips a UTF-8 byte order mark so it does not leak into the first header.
pub fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes)
}

/// Shared buffer handed to a boxed CSV writer so the bytes can be recovered
/// once the writer is flushed and dropped.
#[derive(Clone, Default)]
pub struct SharedBuffer(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    buffer: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            buffer: Vec::new(),
        }
    }

    fn flush_buffer(&mut self, force: bool) -> io::Result<()> {
        let valid_up_to = match std::str::from_utf8(&self.buffer) {
            Ok(_) => self.buffer.len(),
            Err(err) => {
                if let Some(error_len) = err.error_len() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Invalid UTF-8 sequence in output stream ({error_len} bytes)"),
                    ));
                }
                if force {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "Incomplete UTF-8 sequence at end of output stream",
                    ));
                }
                err.valid_up_to()
            }
        };
        if valid_up_to == 0 {
            return Ok(());
        }
        let pending: Vec<u8> = self.buffer.drain(..valid_up_to).collect();
        let text = std::str::from_utf8(&pending)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.encode_and_write(text)
    }

    fn encode_and_write(&mut self, text: &str) -> io::Result<()> {
        let (encoded, _output_encoding, had_errors) = self.encoding.encode(text);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to encode text using {}", self.encoding.name()),
            ));
        }
        self.inner.write_all(encoded.as_ref())
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.flush_buffer(false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer(true)?;
        self.inner.flush()
    }
}
