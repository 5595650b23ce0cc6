// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Escape-aware scanner
//
// Walks a growing byte buffer that may end in the middle of a JSON value,
// tracking string/escape state and `{`/`}` depth, and reports each object
// that closes back to depth 0. All structural bytes are ASCII, so a UTF-8
// sequence split across chunks never confuses the scan.

/// A syntactically complete object at `buffer[start..=end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn slice<'a>(&self, buffer: &'a [u8]) -> &'a [u8] {
        &buffer[self.start..=self.end]
    }
}

/// Resumable scan state.
///
/// Running `scan` repeatedly over a buffer that only ever grows yields the
/// same spans as one pass over the final buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanCursor {
    /// Next byte to examine.
    pub offset: usize,
    /// Unmatched `{` count. Array brackets are not tracked.
    pub depth: usize,
    pub in_string: bool,
    pub escape_next: bool,
    /// Start of the object currently open at depth 1, if any.
    pub object_start: Option<usize>,
}

impl ScanCursor {
    /// A fresh cursor positioned at `offset`, outside any string or object.
    pub fn at(offset: usize) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    /// Scan from the saved offset to the end of `buffer`.
    pub fn scan(&mut self, buffer: &[u8]) -> Vec<Span> {
        let mut spans = Vec::new();

        while self.offset < buffer.len() {
            let pos = self.offset;
            let byte = buffer[pos];
            self.offset += 1;

            if self.in_string {
                if self.escape_next {
                    self.escape_next = false;
                } else if byte == b'\\' {
                    self.escape_next = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => {
                    if self.depth == 0 {
                        self.object_start = Some(pos);
                    }
                    self.depth += 1;
                }
                b'}' => {
                    // Depth 0 means this closes an enclosing object (the
                    // array has ended); there is nothing to match.
                    if self.depth == 0 {
                        continue;
                    }
                    self.depth -= 1;
                    if self.depth == 0 {
                        if let Some(start) = self.object_start.take() {
                            spans.push(Span { start, end: pos });
                        }
                    }
                }
                _ => {}
            }
        }

        spans
    }

    /// Whether an object has been opened but not yet closed.
    pub fn has_open_object(&self) -> bool {
        self.object_start.is_some()
    }

    /// Re-base all positions after `by` bytes were removed from the front
    /// of the buffer. Callers never remove bytes the cursor still needs.
    pub fn shift(&mut self, by: usize) {
        self.offset -= by;
        if let Some(start) = self.object_start.as_mut() {
            *start -= by;
        }
    }
}

// ---------------------------------------------------------------------------
// Field matching
// ---------------------------------------------------------------------------

/// Result of matching `"<key>"`, optional whitespace, `:`, optional
/// whitespace and an opening byte at a candidate key position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMatch {
    /// Matched; the value body starts at this position (just past the opener).
    Complete(usize),
    /// The buffer ends before the match could be decided.
    Incomplete,
    /// Not the field we are looking for.
    Mismatch,
}

/// Find `needle` in `haystack` at or after `from`.
pub fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| from + pos)
}

/// Match the rest of a field whose quoted key starts at `key_pos`.
pub fn match_field(buffer: &[u8], key_pos: usize, key_len: usize, opener: u8) -> FieldMatch {
    let mut pos = key_pos + key_len;
    let mut seen_colon = false;

    while pos < buffer.len() {
        let byte = buffer[pos];
        match byte {
            b' ' | b'\t' | b'\r' | b'\n' => {}
            b':' if !seen_colon => seen_colon = true,
            _ if seen_colon && byte == opener => return FieldMatch::Complete(pos + 1),
            _ => return FieldMatch::Mismatch,
        }
        pos += 1;
    }

    FieldMatch::Incomplete
}

/// `"name"` as bytes, the literal searched for in the raw document.
pub fn quoted_key(name: &str) -> Vec<u8> {
    format!("\"{name}\"").into_bytes()
}

// ---------------------------------------------------------------------------
// Root-level fields
// ---------------------------------------------------------------------------

/// A watched field whose value closed directly under the root object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootField {
    /// Index into the watched key list.
    pub field: usize,
    /// The raw value: a string including its quotes, or a whole object or array.
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Expect {
    #[default]
    Nothing,
    Key,
    Colon(Option<usize>),
    Value(Option<usize>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StringRole {
    #[default]
    Other,
    Key,
    Value,
}

/// Resumable scan for the fields of a root object.
///
/// Tracks `[`/`]` as well as `{`/`}`, so a key nested anywhere below the
/// root (inside a part, inside function arguments) is never reported.
/// Scalar values are skipped.
#[derive(Debug, Clone, Default)]
pub struct RootFieldScanner {
    keys: Vec<Vec<u8>>,
    offset: usize,
    depth: usize,
    in_string: bool,
    escape_next: bool,
    role: StringRole,
    expect: Expect,
    /// Body start of the root-level key being read.
    key_start: Option<usize>,
    /// Watched field whose value is still open, with its start.
    capture: Option<(usize, usize)>,
    closed_documents: usize,
}

impl RootFieldScanner {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys.into_iter().map(|k| k.as_ref().as_bytes().to_vec()).collect(),
            ..Self::default()
        }
    }

    /// Scan from the saved offset to the end of `buffer`, returning every
    /// watched root-level value that closed, in document order.
    pub fn scan(&mut self, buffer: &[u8]) -> Vec<RootField> {
        let mut fields = Vec::new();

        while self.offset < buffer.len() {
            let pos = self.offset;
            let byte = buffer[pos];
            self.offset += 1;

            if self.in_string {
                if self.escape_next {
                    self.escape_next = false;
                } else if byte == b'\\' {
                    self.escape_next = true;
                } else if byte == b'"' {
                    self.in_string = false;
                    self.close_string(buffer, pos, &mut fields);
                }
                continue;
            }

            match byte {
                b'"' => self.open_string(pos),
                b'{' | b'[' => {
                    if self.depth == 0 {
                        self.expect = if byte == b'{' { Expect::Key } else { Expect::Nothing };
                    } else if self.depth == 1 {
                        if let Expect::Value(field) = self.expect {
                            self.capture = field.map(|f| (f, pos));
                            self.expect = Expect::Nothing;
                        }
                    }
                    self.depth += 1;
                }
                b'}' | b']' => {
                    if self.depth == 0 {
                        continue;
                    }
                    self.depth -= 1;
                    if self.depth == 1 {
                        if let Some((field, start)) = self.capture.take() {
                            fields.push(RootField {
                                field,
                                span: Span { start, end: pos },
                            });
                        }
                    } else if self.depth == 0 {
                        self.closed_documents += 1;
                        self.expect = Expect::Nothing;
                    }
                }
                _ if self.depth != 1 => {}
                b':' => {
                    if let Expect::Colon(field) = self.expect {
                        self.expect = Expect::Value(field);
                    }
                }
                b',' => self.expect = Expect::Key,
                b' ' | b'\t' | b'\r' | b'\n' => {}
                _ => self.expect = Expect::Nothing,
            }
        }

        fields
    }

    fn open_string(&mut self, pos: usize) {
        self.in_string = true;
        self.role = StringRole::Other;
        if self.depth != 1 {
            return;
        }
        match self.expect {
            Expect::Key => {
                self.role = StringRole::Key;
                self.key_start = Some(pos + 1);
            }
            Expect::Value(field) => {
                self.role = StringRole::Value;
                self.capture = field.map(|f| (f, pos));
                self.expect = Expect::Nothing;
            }
            Expect::Nothing | Expect::Colon(_) => {}
        }
    }

    fn close_string(&mut self, buffer: &[u8], pos: usize, fields: &mut Vec<RootField>) {
        match self.role {
            StringRole::Key => {
                let field = self
                    .key_start
                    .take()
                    .and_then(|start| self.keys.iter().position(|k| k.as_slice() == &buffer[start..pos]));
                self.expect = Expect::Colon(field);
            }
            StringRole::Value => {
                if let Some((field, start)) = self.capture.take() {
                    fields.push(RootField {
                        field,
                        span: Span { start, end: pos },
                    });
                }
            }
            StringRole::Other => {}
        }
        self.role = StringRole::Other;
    }

    /// Number of root values that have closed so far.
    pub fn closed_documents(&self) -> usize {
        self.closed_documents
    }

    /// Lowest buffer position a later scan still reads.
    pub fn floor(&self) -> usize {
        [self.key_start, self.capture.map(|(_, start)| start)]
            .into_iter()
            .flatten()
            .fold(self.offset, usize::min)
    }

    /// Re-base positions after `by` bytes were removed from the front of the
    /// buffer. `by` never exceeds `floor()`.
    pub fn shift(&mut self, by: usize) {
        self.offset -= by;
        if let Some(start) = self.key_start.as_mut() {
            *start -= by;
        }
        if let Some((_, start)) = self.capture.as_mut() {
            *start -= by;
        }
    }
}
