/*
 * Copyright (C) 2025 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::buffer::{find_marker, StreamBuffer};
use crate::decode;
use log::{debug, warn};
use std::mem;
use std::str;

const LINE_END: &[u8] = b"\r\n";
const HEADERS_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("malformed start line")]
    MalformedStartLine,

    #[error("invalid content length")]
    InvalidContentLength,

    #[error("invalid chunk size")]
    InvalidChunkSize,

    #[error("invalid chunk suffix")]
    InvalidChunkSuffix,

    #[error("decompression failed")]
    DecompressionFailed,
}

/// First line of an HTTP/1.x message.
///
/// The request and response variants differ only in how this line is
/// tokenized; everything after it is parsed identically.
pub trait StartLine: Sized {
    fn parse(line: &str) -> Result<Self, ParseError>;
}

/// Request line: `<method> <target> HTTP/<version>`
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
    pub version: String,
}

impl StartLine for RequestLine {
    fn parse(line: &str) -> Result<Self, ParseError> {
        let (method, rest) = line.split_once(' ').ok_or(ParseError::MalformedStartLine)?;

        // the target may itself contain spaces, so the protocol field is
        // taken from the end
        let (target, proto) = rest.rsplit_once(' ').ok_or(ParseError::MalformedStartLine)?;

        let version = proto
            .strip_prefix("HTTP/")
            .ok_or(ParseError::MalformedStartLine)?;

        if method.is_empty() || target.is_empty() || version.is_empty() {
            return Err(ParseError::MalformedStartLine);
        }

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
        })
    }
}

/// Status line: `HTTP/<version> <code> <reason>`
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StatusLine {
    pub version: String,
    pub code: u16,
    pub reason: String,
}

impl StartLine for StatusLine {
    fn parse(line: &str) -> Result<Self, ParseError> {
        let rest = line
            .strip_prefix("HTTP/")
            .ok_or(ParseError::MalformedStartLine)?;

        let (version, rest) = rest.split_once(' ').ok_or(ParseError::MalformedStartLine)?;

        // the reason phrase is optional
        let (code, reason) = match rest.split_once(' ') {
            Some((code, reason)) => (code, reason),
            None => (rest, ""),
        };

        let code = code.parse().map_err(|_| ParseError::MalformedStartLine)?;

        if version.is_empty() {
            return Err(ParseError::MalformedStartLine);
        }

        Ok(Self {
            version: version.to_string(),
            code,
            reason: reason.to_string(),
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// A fully parsed message.
///
/// `headers` holds all header pairs in wire order with names lowercased
/// and duplicates preserved. The three framing-relevant headers are also
/// copied into derived fields, last occurrence winning.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Message<S> {
    pub start_line: S,
    pub headers: Vec<Header>,
    pub content_length: Option<usize>,
    pub transfer_encoding: Option<String>,
    pub content_encoding: Option<String>,

    /// Body bytes as received on the wire. Only set when content
    /// decoding was attempted.
    pub raw_body: Option<Vec<u8>>,

    /// Body after content decoding, or the wire bytes when no decoding
    /// applies (or when decoding failed).
    pub body: Vec<u8>,
}

/// Events produced by a feed call, in emission order.
///
/// Per message the order is `HeadersLoaded`, `BodyLoaded`,
/// `MessageComplete`. An `Error` may appear at any point; fatal framing
/// errors end the sequence, a decode failure precedes the message it
/// applies to.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Event<S> {
    HeadersLoaded(Vec<Header>),
    BodyLoaded(Vec<u8>),
    MessageComplete(Message<S>),
    Error(ParseError),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MessageState {
    // waiting for the start line terminator
    // next: AwaitingHeaders
    AwaitingStartLine,

    // waiting for the end of the header block
    // next: AwaitingBody
    AwaitingHeaders,

    // waiting for the body per the resolved framing
    // next: AwaitingStartLine (new message)
    AwaitingBody,

    // a fatal framing error occurred and the resume position is
    // ambiguous. feeds are buffered but nothing is parsed until reset()
    Failed,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum BodyFraming {
    Chunked,
    Fixed(usize),
    None,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum ChunkPhase {
    // hex size line
    Size,

    // chunk payload bytes remaining
    Data(usize),

    // \r\n after the payload
    Footer,

    // \r\n ending the (empty) trailer section after the zero-size chunk
    Trailer,
}

enum Step {
    Complete,
    Incomplete,
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, ParseError> {
    let line = str::from_utf8(line).map_err(|_| ParseError::InvalidChunkSize)?;

    // chunk extensions are tolerated but not interpreted
    let size = match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    };

    usize::from_str_radix(size.trim(), 16).map_err(|_| ParseError::InvalidChunkSize)
}

/// Incremental message parser for one direction of one connection.
///
/// Bytes go in through [`feed`](Self::feed) in arbitrarily sized chunks;
/// structured events come out. The parser cycles through message
/// lifecycles for as long as the connection lasts, handling pipelined
/// messages without intervention. Not for sharing across connections or
/// threads.
pub struct MessageParser<S: StartLine> {
    buf: StreamBuffer,
    state: MessageState,
    start_line: Option<S>,
    headers: Vec<Header>,
    content_length: Option<usize>,
    transfer_encoding: Option<String>,
    content_encoding: Option<String>,
    framing: BodyFraming,
    chunk_phase: ChunkPhase,
    body: Vec<u8>,
}

pub type RequestParser = MessageParser<RequestLine>;
pub type ResponseParser = MessageParser<StatusLine>;

#[allow(clippy::new_without_default)]
impl<S: StartLine> MessageParser<S> {
    pub fn new() -> Self {
        Self {
            buf: StreamBuffer::new(),
            state: MessageState::AwaitingStartLine,
            start_line: None,
            headers: Vec::new(),
            content_length: None,
            transfer_encoding: None,
            content_encoding: None,
            framing: BodyFraming::None,
            chunk_phase: ChunkPhase::Size,
            body: Vec::new(),
        }
    }

    pub fn state(&self) -> MessageState {
        self.state
    }

    /// Appends a chunk of stream bytes and parses as far as possible,
    /// returning the events produced. A single call may complete any
    /// number of phases or messages, or none.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Event<S>> {
        self.buf.write(chunk);

        let mut events = Vec::new();
        self.drive(&mut events);

        events
    }

    /// Discards buffered bytes and any partial message, returning to
    /// `AwaitingStartLine`. The caller's tool for resynchronizing after
    /// a fatal framing error.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = MessageState::AwaitingStartLine;
        self.start_line = None;
        self.headers.clear();
        self.content_length = None;
        self.transfer_encoding = None;
        self.content_encoding = None;
        self.framing = BodyFraming::None;
        self.chunk_phase = ChunkPhase::Size;
        self.body.clear();
    }

    fn drive(&mut self, events: &mut Vec<Event<S>>) {
        loop {
            let result = match self.state {
                MessageState::AwaitingStartLine => self.parse_start_line(),
                MessageState::AwaitingHeaders => self.parse_headers(),
                MessageState::AwaitingBody => self.parse_body(),
                MessageState::Failed => return,
            };

            match result {
                Ok(Step::Complete) => match self.state {
                    MessageState::AwaitingStartLine => {
                        self.state = MessageState::AwaitingHeaders;
                    }
                    MessageState::AwaitingHeaders => {
                        events.push(Event::HeadersLoaded(self.headers.clone()));

                        self.framing = self.resolve_framing();
                        self.chunk_phase = ChunkPhase::Size;
                        self.state = MessageState::AwaitingBody;
                    }
                    MessageState::AwaitingBody => {
                        self.finish_message(events);
                        self.state = MessageState::AwaitingStartLine;
                    }
                    MessageState::Failed => unreachable!(),
                },
                Ok(Step::Incomplete) => return,
                Err(e) => {
                    events.push(Event::Error(e));
                    self.state = MessageState::Failed;
                    return;
                }
            }
        }
    }

    fn parse_start_line(&mut self) -> Result<Step, ParseError> {
        let pos = match find_marker(self.buf.read_buf(), LINE_END) {
            Some(pos) => pos,
            None => return Ok(Step::Incomplete),
        };

        let line = match str::from_utf8(&self.buf.read_buf()[..pos]) {
            Ok(line) => line,
            Err(_) => return Err(ParseError::MalformedStartLine),
        };

        self.start_line = Some(S::parse(line)?);
        self.buf.read_commit(pos + LINE_END.len());

        Ok(Step::Complete)
    }

    fn parse_headers(&mut self) -> Result<Step, ParseError> {
        // a message with no headers ends the block right after the start
        // line, leaving only a single terminator
        if self.buf.read_buf().starts_with(LINE_END) {
            self.buf.read_commit(LINE_END.len());

            return Ok(Step::Complete);
        }

        let pos = match find_marker(self.buf.read_buf(), HEADERS_END) {
            Some(pos) => pos,
            None => return Ok(Step::Incomplete),
        };

        let block = String::from_utf8_lossy(&self.buf.read_buf()[..pos]).into_owned();

        for line in block.split("\r\n") {
            // permissive: lines without a separator are skipped
            let (name, value) = match line.split_once(": ") {
                Some(kv) => kv,
                None => continue,
            };

            let name = name.to_ascii_lowercase();
            let value = value.to_string();

            match name.as_str() {
                "content-length" => {
                    let len = value
                        .trim()
                        .parse()
                        .map_err(|_| ParseError::InvalidContentLength)?;

                    self.content_length = Some(len);
                }
                "transfer-encoding" => self.transfer_encoding = Some(value.clone()),
                "content-encoding" => self.content_encoding = Some(value.clone()),
                _ => {}
            }

            self.headers.push(Header { name, value });
        }

        self.buf.read_commit(pos + HEADERS_END.len());

        Ok(Step::Complete)
    }

    fn resolve_framing(&self) -> BodyFraming {
        let chunked = match &self.transfer_encoding {
            Some(enc) => enc.trim().eq_ignore_ascii_case("chunked"),
            None => false,
        };

        if chunked {
            if matches!(self.content_length, Some(len) if len > 0) {
                warn!("message has both content-length and chunked framing, using chunked");
            }

            return BodyFraming::Chunked;
        }

        match self.content_length {
            Some(len) if len > 0 => BodyFraming::Fixed(len),
            _ => BodyFraming::None,
        }
    }

    fn parse_body(&mut self) -> Result<Step, ParseError> {
        match self.framing {
            BodyFraming::Chunked => self.parse_chunks(),
            BodyFraming::Fixed(len) => {
                if self.buf.read_avail() < len {
                    return Ok(Step::Incomplete);
                }

                self.body = self.buf.read_buf()[..len].to_vec();
                self.buf.read_commit(len);

                Ok(Step::Complete)
            }
            BodyFraming::None => Ok(Step::Complete),
        }
    }

    // loops over as many chunks as the buffer holds. completes only on
    // the terminal zero-size chunk
    fn parse_chunks(&mut self) -> Result<Step, ParseError> {
        loop {
            match self.chunk_phase {
                ChunkPhase::Size => {
                    let pos = match find_marker(self.buf.read_buf(), LINE_END) {
                        Some(pos) => pos,
                        None => return Ok(Step::Incomplete),
                    };

                    let size = parse_chunk_size(&self.buf.read_buf()[..pos])?;

                    self.buf.read_commit(pos + LINE_END.len());

                    self.chunk_phase = if size == 0 {
                        ChunkPhase::Trailer
                    } else {
                        ChunkPhase::Data(size)
                    };
                }
                ChunkPhase::Data(size) => {
                    if self.buf.read_avail() < size {
                        return Ok(Step::Incomplete);
                    }

                    self.body.extend_from_slice(&self.buf.read_buf()[..size]);
                    self.buf.read_commit(size);

                    self.chunk_phase = ChunkPhase::Footer;
                }
                ChunkPhase::Footer | ChunkPhase::Trailer => {
                    if self.buf.read_avail() < LINE_END.len() {
                        return Ok(Step::Incomplete);
                    }

                    if &self.buf.read_buf()[..LINE_END.len()] != LINE_END {
                        return Err(ParseError::InvalidChunkSuffix);
                    }

                    self.buf.read_commit(LINE_END.len());

                    if self.chunk_phase == ChunkPhase::Trailer {
                        return Ok(Step::Complete);
                    }

                    self.chunk_phase = ChunkPhase::Size;
                }
            }
        }
    }

    fn finish_message(&mut self, events: &mut Vec<Event<S>>) {
        let mut body = mem::take(&mut self.body);
        let mut raw_body = None;

        let gzipped = match &self.content_encoding {
            Some(enc) => enc.to_ascii_lowercase().contains("gzip"),
            None => false,
        };

        if gzipped {
            match decode::unzip(&body) {
                Ok(decoded) => {
                    raw_body = Some(body);
                    body = decoded;
                }
                Err(e) => {
                    // recoverable at message granularity: the message is
                    // still emitted, with the wire bytes left in body
                    debug!("body decompression failed: {}", e);

                    raw_body = Some(body.clone());
                    events.push(Event::Error(ParseError::DecompressionFailed));
                }
            }
        }

        let message = Message {
            start_line: self.start_line.take().unwrap(),
            headers: mem::take(&mut self.headers),
            content_length: self.content_length.take(),
            transfer_encoding: self.transfer_encoding.take(),
            content_encoding: self.content_encoding.take(),
            raw_body,
            body: body.clone(),
        };

        events.push(Event::BodyLoaded(body));
        events.push(Event::MessageComplete(message));

        self.framing = BodyFraming::None;
        self.chunk_phase = ChunkPhase::Size;
    }
}
