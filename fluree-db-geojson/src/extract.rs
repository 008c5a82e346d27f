//! Streaming bounding-box extraction for lazy mode.
//!
//! Scans a FeatureCollection once, front to back, and reports for every
//! feature object its envelope and the exact byte range of its JSON text.
//! Nothing is materialized: attribute values are skipped by bracket/string
//! balance, and coordinates are folded into a running min/max as they are
//! read. Memory use is bounded by nesting depth, not by document size or
//! point count.
//!
//! ## Recognized structure
//!
//! ```text
//! { ..., "type": "FeatureCollection", ..., "features": [ FEATURE, ... ], ... }
//!
//! FEATURE  = { ..., "geometry": GEOMETRY | null, ... }      -- byte range recorded
//! GEOMETRY = { ..., "coordinates": COORDS, "geometries": [ GEOMETRY, ... ], ... }
//! COORDS   = [ x, y, ... ] | [ COORDS, ... ]
//! ```
//!
//! Only `coordinates` found under a feature's `geometry` member contribute to
//! its envelope, which keeps the result identical to the envelope of the
//! fully parsed feature. Members other than these are checked for balanced
//! brackets and well-formed strings only; their full grammar is left to the
//! feature parser at realization time.

use crate::envelope::Envelope;
use crate::error::{GeoJsonError, Result};
use std::io::BufRead;
use std::ops::Range;

/// Longest object key or string value captured for comparison.
const CAPTURE_LIMIT: usize = 64;

/// Longest number literal accepted.
const NUMBER_LIMIT: usize = 1024;

/// Maximum nesting depth of geometry collections and coordinate arrays.
const MAX_GEOMETRY_DEPTH: usize = 64;

/// One feature found by the extractor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureLocation {
    /// Position of the feature in the `features` array (0-based).
    pub ordinal: usize,
    /// Bounds of the feature's coordinates; invalid when it has none.
    pub envelope: Envelope,
    /// Byte offset of the feature's opening `{`.
    pub offset: u64,
    /// Byte length up to and including the closing `}`.
    pub length: u64,
}

impl FeatureLocation {
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.length
    }
}

/// Extract feature locations from a reader positioned at the document start.
pub fn extract_bounding_boxes<R: BufRead>(reader: R) -> Result<Vec<FeatureLocation>> {
    BoundingBoxExtractor::new(reader).extract()
}

/// Byte-level scanner over a [`BufRead`].
pub struct BoundingBoxExtractor<R> {
    reader: R,
    /// Absolute offset of the next unread byte.
    pos: u64,
    /// Last captured string (object key or short string value).
    capture: Vec<u8>,
    /// Set when the last captured string decoded to more than `CAPTURE_LIMIT`
    /// bytes.
    capture_overflow: bool,
    number: Vec<u8>,
}

impl<R: BufRead> BoundingBoxExtractor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pos: 0,
            capture: Vec::with_capacity(CAPTURE_LIMIT),
            capture_overflow: false,
            number: Vec::with_capacity(NUMBER_LIMIT),
        }
    }

    /// Scan the whole document.
    pub fn extract(mut self) -> Result<Vec<FeatureLocation>> {
        let mut locations = Vec::new();
        let mut saw_features = false;

        self.skip_ws()?;
        self.scan_object(|this| {
            if this.captured(b"type") {
                this.skip_ws()?;
                if this.peek()? != Some(b'"') {
                    return Err(this.unexpected("a string for \"type\""));
                }
                this.scan_string(true)?;
                if !this.captured(b"FeatureCollection") {
                    return Err(GeoJsonError::parse_at(
                        this.pos,
                        "top-level object is not a FeatureCollection",
                    ));
                }
                Ok(())
            } else if this.captured(b"features") {
                saw_features = true;
                this.scan_array(|this| {
                    let location = this.scan_feature(locations.len())?;
                    locations.push(location);
                    Ok(())
                })
            } else {
                this.skip_value()
            }
        })?;

        if !saw_features {
            return Err(GeoJsonError::parse("missing \"features\" member"));
        }
        self.skip_ws()?;
        if self.peek()?.is_some() {
            return Err(self.unexpected("end of document"));
        }

        tracing::debug!(
            features = locations.len(),
            bytes = self.pos,
            "bounding boxes extracted"
        );
        Ok(locations)
    }

    // ------------------------------------------------------------------------
    // GeoJSON structure
    // ------------------------------------------------------------------------

    fn scan_feature(&mut self, ordinal: usize) -> Result<FeatureLocation> {
        self.skip_ws()?;
        if self.peek()? != Some(b'{') {
            return Err(self.unexpected("a feature object"));
        }
        let offset = self.pos;
        let mut envelope = Envelope::invalid();
        self.scan_object(|this| {
            if this.captured(b"geometry") {
                this.scan_geometry(&mut envelope, 0)
            } else {
                this.skip_value()
            }
        })?;
        Ok(FeatureLocation {
            ordinal,
            envelope,
            offset,
            length: self.pos - offset,
        })
    }

    fn scan_geometry(&mut self, envelope: &mut Envelope, depth: usize) -> Result<()> {
        if depth > MAX_GEOMETRY_DEPTH {
            return Err(GeoJsonError::parse_at(self.pos, "geometry nested too deeply"));
        }
        self.skip_ws()?;
        match self.peek()? {
            Some(b'n') => self.expect_literal(b"null"),
            Some(b'{') => self.scan_object(|this| {
                if this.captured(b"coordinates") {
                    this.scan_coordinates(envelope, depth + 1)
                } else if this.captured(b"geometries") {
                    this.scan_array(|this| this.scan_geometry(envelope, depth + 1))
                } else {
                    this.skip_value()
                }
            }),
            _ => Err(self.unexpected("a geometry object or null")),
        }
    }

    /// Fold a (nested) coordinate array into `envelope`.
    fn scan_coordinates(&mut self, envelope: &mut Envelope, depth: usize) -> Result<()> {
        if depth > MAX_GEOMETRY_DEPTH {
            return Err(GeoJsonError::parse_at(self.pos, "coordinates nested too deeply"));
        }
        self.skip_ws()?;
        if self.peek()? != Some(b'[') {
            return Err(self.unexpected("a coordinate array"));
        }
        self.bump();
        self.skip_ws()?;
        match self.peek()? {
            Some(b']') => {
                self.bump();
                Ok(())
            }
            Some(b) if is_number_start(b) => self.scan_position(envelope),
            _ => loop {
                self.scan_coordinates(envelope, depth + 1)?;
                match self.next_non_ws()? {
                    b',' => continue,
                    b']' => break Ok(()),
                    _ => break Err(self.unexpected_at(self.pos - 1, "',' or ']'")),
                }
            },
        }
    }

    /// Position body after its `[`: two or more numbers, then `]`.
    fn scan_position(&mut self, envelope: &mut Envelope) -> Result<()> {
        let x = self.read_number()?;
        if self.next_non_ws()? != b',' {
            return Err(GeoJsonError::parse_at(
                self.pos - 1,
                "position needs at least two numbers",
            ));
        }
        self.skip_ws()?;
        let y = self.read_number()?;
        envelope.expand_to_point(x, y);
        loop {
            match self.next_non_ws()? {
                b',' => {
                    self.skip_ws()?;
                    self.read_number()?;
                }
                b']' => return Ok(()),
                _ => return Err(self.unexpected_at(self.pos - 1, "',' or ']'")),
            }
        }
    }

    // ------------------------------------------------------------------------
    // JSON containers
    // ------------------------------------------------------------------------

    /// Scan `{ "key": value, ... }`. `on_member` runs with the key captured
    /// and must consume the value.
    fn scan_object<F>(&mut self, mut on_member: F) -> Result<()>
    where
        F: FnMut(&mut Self) -> Result<()>,
    {
        self.expect_byte(b'{')?;
        self.skip_ws()?;
        if self.peek()? == Some(b'}') {
            self.bump();
            return Ok(());
        }
        loop {
            self.skip_ws()?;
            if self.peek()? != Some(b'"') {
                return Err(self.unexpected("an object key"));
            }
            self.scan_string(true)?;
            self.expect_byte(b':')?;
            on_member(self)?;
            match self.next_non_ws()? {
                b',' => continue,
                b'}' => return Ok(()),
                _ => return Err(self.unexpected_at(self.pos - 1, "',' or '}'")),
            }
        }
    }

    /// Scan `[ value, ... ]`. `on_element` must consume one value.
    fn scan_array<F>(&mut self, mut on_element: F) -> Result<()>
    where
        F: FnMut(&mut Self) -> Result<()>,
    {
        self.expect_byte(b'[')?;
        self.skip_ws()?;
        if self.peek()? == Some(b']') {
            self.bump();
            return Ok(());
        }
        loop {
            on_element(self)?;
            match self.next_non_ws()? {
                b',' => continue,
                b']' => return Ok(()),
                _ => return Err(self.unexpected_at(self.pos - 1, "',' or ']'")),
            }
        }
    }

    /// Skip any value, checking bracket balance and string termination.
    fn skip_value(&mut self) -> Result<()> {
        self.skip_ws()?;
        match self.peek()? {
            Some(b'"') => self.scan_string(false),
            Some(b'{') | Some(b'[') => self.skip_container(),
            Some(b't') => self.expect_literal(b"true"),
            Some(b'f') => self.expect_literal(b"false"),
            Some(b'n') => self.expect_literal(b"null"),
            Some(b) if is_number_start(b) => self.read_number().map(|_| ()),
            _ => Err(self.unexpected("a value")),
        }
    }

    fn skip_container(&mut self) -> Result<()> {
        let mut closers: Vec<u8> = Vec::new();
        loop {
            let Some(b) = self.peek()? else {
                return Err(GeoJsonError::parse_at(self.pos, "unterminated object or array"));
            };
            match b {
                b'"' => {
                    self.scan_string(false)?;
                    continue;
                }
                b'{' => closers.push(b'}'),
                b'[' => closers.push(b']'),
                b'}' | b']' => {
                    if closers.pop() != Some(b) {
                        return Err(GeoJsonError::parse_at(self.pos, "mismatched bracket"));
                    }
                }
                _ => {}
            }
            self.bump();
            if closers.is_empty() {
                return Ok(());
            }
        }
    }

    // ------------------------------------------------------------------------
    // JSON scalars
    // ------------------------------------------------------------------------

    /// Scan a string starting at its opening quote. With `capture`, the
    /// decoded text is kept for [`Self::captured`] up to `CAPTURE_LIMIT`
    /// bytes.
    fn scan_string(&mut self, capture: bool) -> Result<()> {
        self.expect_byte(b'"')?;
        self.capture.clear();
        self.capture_overflow = false;
        loop {
            let at = self.pos;
            let Some(b) = self.peek()? else {
                return Err(GeoJsonError::parse_at(self.pos, "unterminated string"));
            };
            self.bump();
            match b {
                b'"' => return Ok(()),
                b'\\' => {
                    if let Some(c) = self.scan_escape(at, capture)? {
                        let mut utf8 = [0u8; 4];
                        self.push_capture(c.encode_utf8(&mut utf8).as_bytes());
                    }
                }
                0x00..=0x1f => {
                    return Err(GeoJsonError::parse_at(at, "control character in string"));
                }
                _ if capture => self.push_capture(&[b]),
                _ => {}
            }
        }
    }

    /// Consume the escape after the backslash at `at`. With `decode`, the
    /// escaped character is returned and surrogate pairs are combined.
    fn scan_escape(&mut self, at: u64, decode: bool) -> Result<Option<char>> {
        let Some(b) = self.peek()? else {
            return Err(GeoJsonError::parse_at(self.pos, "unterminated string"));
        };
        self.bump();
        let c = match b {
            b'"' => '"',
            b'\\' => '\\',
            b'/' => '/',
            b'b' => '\u{8}',
            b'f' => '\u{c}',
            b'n' => '\n',
            b'r' => '\r',
            b't' => '\t',
            b'u' => {
                let unit = self.read_hex4(at)?;
                if !decode {
                    return Ok(None);
                }
                self.decode_unit(at, unit)?
            }
            _ => return Err(GeoJsonError::parse_at(at, "invalid escape in string")),
        };
        Ok(decode.then_some(c))
    }

    /// Turn a `\uXXXX` code unit into a char, reading the low half of a
    /// surrogate pair when `unit` is a high surrogate.
    fn decode_unit(&mut self, at: u64, unit: u32) -> Result<char> {
        let code = match unit {
            0xD800..=0xDBFF => {
                if self.peek()? != Some(b'\\') {
                    return Err(GeoJsonError::parse_at(at, "lone surrogate in unicode escape"));
                }
                self.bump();
                if self.peek()? != Some(b'u') {
                    return Err(GeoJsonError::parse_at(at, "lone surrogate in unicode escape"));
                }
                self.bump();
                let low = self.read_hex4(at)?;
                if !(0xDC00..=0xDFFF).contains(&low) {
                    return Err(GeoJsonError::parse_at(at, "lone surrogate in unicode escape"));
                }
                0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00)
            }
            0xDC00..=0xDFFF => {
                return Err(GeoJsonError::parse_at(at, "lone surrogate in unicode escape"));
            }
            _ => unit,
        };
        char::from_u32(code)
            .ok_or_else(|| GeoJsonError::parse_at(at, "invalid unicode escape"))
    }

    fn read_hex4(&mut self, at: u64) -> Result<u32> {
        let mut unit = 0;
        for _ in 0..4 {
            let digit = self.peek()?.and_then(|b| (b as char).to_digit(16));
            let Some(digit) = digit else {
                return Err(GeoJsonError::parse_at(at, "invalid unicode escape"));
            };
            unit = unit * 16 + digit;
            self.bump();
        }
        Ok(unit)
    }

    fn push_capture(&mut self, bytes: &[u8]) {
        if self.capture_overflow || self.capture.len() + bytes.len() > CAPTURE_LIMIT {
            self.capture_overflow = true;
        } else {
            self.capture.extend_from_slice(bytes);
        }
    }

    /// True if the last captured string equals `expected` exactly.
    fn captured(&self, expected: &[u8]) -> bool {
        !self.capture_overflow && self.capture == expected
    }

    /// Read a JSON number:
    /// `-? (0 | [1-9][0-9]*) (. [0-9]+)? ([eE] [+-]? [0-9]+)?`.
    fn read_number(&mut self) -> Result<f64> {
        let start = self.pos;
        self.number.clear();
        self.accept_number_byte(start, |b| b == b'-')?;
        if self.accept_number_byte(start, |b| b == b'0')? {
            if matches!(self.peek()?, Some(b'0'..=b'9')) {
                return Err(GeoJsonError::parse_at(start, "invalid number: leading zero"));
            }
        } else if self.number_digits(start)? == 0 {
            return Err(GeoJsonError::parse_at(start, "invalid number"));
        }
        if self.accept_number_byte(start, |b| b == b'.')? && self.number_digits(start)? == 0 {
            return Err(GeoJsonError::parse_at(
                start,
                "invalid number: expected digits after '.'",
            ));
        }
        if self.accept_number_byte(start, |b| b == b'e' || b == b'E')? {
            self.accept_number_byte(start, |b| b == b'+' || b == b'-')?;
            if self.number_digits(start)? == 0 {
                return Err(GeoJsonError::parse_at(
                    start,
                    "invalid number: expected exponent digits",
                ));
            }
        }
        let value = std::str::from_utf8(&self.number)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| GeoJsonError::parse_at(start, "invalid number"))?;
        if !value.is_finite() {
            return Err(GeoJsonError::parse_at(start, "number out of range"));
        }
        Ok(value)
    }

    /// Consume the next byte into the number buffer if it matches.
    fn accept_number_byte(&mut self, start: u64, accept: impl Fn(u8) -> bool) -> Result<bool> {
        match self.peek()? {
            Some(b) if accept(b) => {
                if self.number.len() == NUMBER_LIMIT {
                    return Err(GeoJsonError::parse_at(start, "number literal too long"));
                }
                self.number.push(b);
                self.bump();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn number_digits(&mut self, start: u64) -> Result<usize> {
        let mut count = 0;
        while self.accept_number_byte(start, |b| b.is_ascii_digit())? {
            count += 1;
        }
        Ok(count)
    }

    fn expect_literal(&mut self, literal: &[u8]) -> Result<()> {
        let start = self.pos;
        for &expected in literal {
            if self.peek()? != Some(expected) {
                return Err(GeoJsonError::parse_at(start, "invalid literal"));
            }
            self.bump();
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Byte access
    // ------------------------------------------------------------------------

    fn peek(&mut self) -> Result<Option<u8>> {
        Ok(self.reader.fill_buf()?.first().copied())
    }

    fn bump(&mut self) {
        self.reader.consume(1);
        self.pos += 1;
    }

    fn skip_ws(&mut self) -> Result<()> {
        loop {
            let buf = self.reader.fill_buf()?;
            let available = buf.len();
            if available == 0 {
                return Ok(());
            }
            let n = buf
                .iter()
                .position(|&b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
                .unwrap_or(available);
            self.reader.consume(n);
            self.pos += n as u64;
            if n < available {
                return Ok(());
            }
        }
    }

    /// Next non-whitespace byte, consumed.
    fn next_non_ws(&mut self) -> Result<u8> {
        self.skip_ws()?;
        match self.peek()? {
            Some(b) => {
                self.bump();
                Ok(b)
            }
            None => Err(GeoJsonError::parse_at(self.pos, "unexpected end of document")),
        }
    }

    fn expect_byte(&mut self, expected: u8) -> Result<()> {
        self.skip_ws()?;
        if self.peek()? != Some(expected) {
            return Err(self.unexpected(&format!("'{}'", expected as char)));
        }
        self.bump();
        Ok(())
    }

    fn unexpected(&mut self, expected: &str) -> GeoJsonError {
        let found = match self.peek() {
            Ok(Some(b)) => format!("'{}'", b.escape_ascii()),
            Ok(None) => "end of document".to_string(),
            Err(e) => return e,
        };
        GeoJsonError::parse_at(self.pos, format!("expected {}, found {}", expected, found))
    }

    fn unexpected_at(&self, offset: u64, expected: &str) -> GeoJsonError {
        GeoJsonError::parse_at(offset, format!("expected {}", expected))
    }
}

fn is_number_start(b: u8) -> bool {
    b == b'-' || b.is_ascii_digit()
}
