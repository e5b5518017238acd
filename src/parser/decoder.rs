//! Streaming decoder: file read -> gzip -> incremental tag tokenizer
//!
//! Produces open/close events one at a time; only the current element and
//! the reader buffers are ever held in memory.

use flate2::read::GzDecoder;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::attributes::Attributes;
use crate::error::{IngestError, Stage};

const READ_BUFFER: usize = 64 * 1024;

/// Structural event emitted by the decoder
#[derive(Debug, Clone, PartialEq)]
pub enum SaxEvent {
    Open { name: String, attrs: Attributes },
    Close { name: String },
    End,
}

/// Raw byte source that counts consumed bytes and remembers its own failures,
/// so errors surfacing through the gzip layer can be attributed correctly
pub struct SourceReader<R> {
    inner: R,
    bytes_read: u64,
    failed: bool,
}

impl<R: Read> SourceReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
            failed: false,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: Read> Read for SourceReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.bytes_read += n as u64;
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }
}

type Pipeline<R> = Reader<BufReader<GzDecoder<SourceReader<R>>>>;

/// Fused stream of [`SaxEvent`]s. After `End` or the first error it yields nothing.
///
/// A document must hold exactly one root element; stray text or a second
/// element outside it is malformed, as is a stream with no root at all.
pub struct EventStream<R: Read> {
    reader: Pipeline<R>,
    label: String,
    buf: Vec<u8>,
    depth: usize,
    saw_root: bool,
    finished: bool,
}

impl EventStream<File> {
    /// Open a gzip-compressed savegame on disk
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file = File::open(path).map_err(|source| IngestError::SourceIo {
            file: label.clone(),
            stage: Stage::Open,
            source,
        })?;
        Ok(Self::from_reader(file, label))
    }
}

impl<R: Read> EventStream<R> {
    /// Wrap any gzip-compressed byte source
    pub fn from_reader(source: R, label: impl Into<String>) -> Self {
        let gunzip = GzDecoder::new(SourceReader::new(source));
        let mut reader = Reader::from_reader(BufReader::with_capacity(READ_BUFFER, gunzip));
        let config = reader.config_mut();
        config.trim_text(true);
        config.expand_empty_elements = true;
        config.check_end_names = true;

        Self {
            reader,
            label: label.into(),
            buf: Vec::with_capacity(1024),
            depth: 0,
            saw_root: false,
            finished: false,
        }
    }

    /// Compressed bytes consumed from the source so far
    pub fn bytes_read(&self) -> u64 {
        self.source().bytes_read()
    }

    fn source(&self) -> &SourceReader<R> {
        self.reader.get_ref().get_ref().get_ref()
    }

    fn malformed(&self, message: impl Into<String>) -> IngestError {
        IngestError::MalformedDocument {
            file: self.label.clone(),
            position: self.reader.buffer_position() as u64,
            message: message.into(),
        }
    }

    fn classify_error(&self, err: quick_xml::Error) -> IngestError {
        match err {
            quick_xml::Error::Io(io_err) => {
                let source = io::Error::new(io_err.kind(), io_err.to_string());
                if self.source().failed {
                    IngestError::SourceIo {
                        file: self.label.clone(),
                        stage: Stage::Read,
                        source,
                    }
                } else {
                    IngestError::Decompression {
                        file: self.label.clone(),
                        source,
                    }
                }
            }
            other => self.malformed(other.to_string()),
        }
    }

    fn next_event(&mut self) -> Result<SaxEvent, IngestError> {
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(err) => return Err(self.classify_error(err)),
            };

            match event {
                Event::Start(start) => {
                    let name = element_name(&start);
                    if self.depth == 0 && self.saw_root {
                        return Err(self.malformed(format!("second root element <{}>", name)));
                    }
                    let attrs = read_attributes(&start);
                    self.depth += 1;
                    self.saw_root = true;
                    return attrs
                        .map(|attrs| SaxEvent::Open { name, attrs })
                        .map_err(|m| self.malformed(m));
                }
                Event::End(end) => {
                    let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    self.depth = self.depth.saturating_sub(1);
                    return Ok(SaxEvent::Close { name });
                }
                Event::Text(text) if self.depth == 0 && !is_blank(&text) => {
                    return Err(self.malformed("text outside the root element"));
                }
                Event::CData(_) if self.depth == 0 => {
                    return Err(self.malformed("CDATA outside the root element"));
                }
                Event::Eof => {
                    if !self.saw_root {
                        return Err(self.malformed("document has no root element"));
                    }
                    if self.depth > 0 {
                        let depth = self.depth;
                        return Err(self.malformed(format!(
                            "document ended with {} unclosed element(s)",
                            depth
                        )));
                    }
                    return Ok(SaxEvent::End);
                }
                // comments, declarations, processing instructions and inner text
                _ => continue,
            }
        }
    }
}

impl<R: Read> Iterator for EventStream<R> {
    type Item = Result<SaxEvent, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let result = self.next_event();
        if matches!(result, Ok(SaxEvent::End) | Err(_)) {
            self.finished = true;
        }
        Some(result)
    }
}

fn element_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn is_blank(text: &BytesText) -> bool {
    text.iter()
        .all(|b| b.is_ascii_whitespace() || matches!(b, 0xEF | 0xBB | 0xBF))
}

fn read_attributes(start: &BytesStart) -> Result<Attributes, String> {
    let mut pairs = Vec::new();
    for attr in start.attributes() {
        let attr =
            attr.map_err(|e| format!("bad attribute in <{}>: {}", element_name(start), e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = match quick_xml::escape::unescape(&raw) {
            Ok(unescaped) => unescaped.into_owned(),
            Err(_) => raw.into_owned(),
        };
        pairs.push((key, value));
    }
    Ok(Attributes::new(pairs))
}
