// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Defines primitives in control files.

Control files are sequences of *paragraphs* (also called *stanzas*) separated by
empty lines. Each paragraph is an ordered series of `Name: value` fields. Values
may span multiple lines: continuation lines begin with whitespace and a
continuation line consisting of a single space followed by `.` denotes an empty
line inside the value.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html>
for the canonical source of truth for how control files work.
*/

use {
    crate::error::Result,
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        fmt::{Display, Formatter},
        io::{BufRead, Write},
    },
};

/// A continuation line: leading whitespace then content.
static RE_CONTINUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s+)(\S.*)$").unwrap());

/// A line starting a new field.
static RE_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([-\w]+):(.*)$").unwrap());

/// A field in a control file.
///
/// The value is stored in its logical form: lines are separated by `\n` without
/// continuation indentation and embedded empty lines are empty strings.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlField {
    name: String,
    value: String,
}

impl ControlField {
    /// Construct an instance from a field name and value.
    pub fn new(name: impl ToString, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// The name of this field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Obtain the value as a [&str].
    pub fn value_str(&self) -> &str {
        &self.value
    }

    /// Obtain an iterator of lines in the value.
    ///
    /// Embedded empty lines are emitted as empty strings.
    pub fn iter_lines(&self) -> impl Iterator<Item = &str> {
        self.value.split('\n')
    }

    /// Obtain an iterator of words in the value.
    pub fn iter_words(&self) -> impl Iterator<Item = &str> {
        self.value.split_ascii_whitespace()
    }

    /// Consume self and return the owned value.
    pub fn into_value(self) -> String {
        self.value
    }

    /// Write the contents of this field to a writer.
    ///
    /// Lines after the first are written as continuation lines. Empty lines are
    /// written as ` .`.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.to_string().as_bytes())
    }
}

impl Display for ControlField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut lines = self.iter_lines();

        writeln!(f, "{}: {}", self.name, lines.next().unwrap_or_default())?;

        for line in lines {
            if line.is_empty() {
                writeln!(f, " .")?;
            } else {
                writeln!(f, " {}", line)?;
            }
        }

        Ok(())
    }
}

/// A paragraph in a control file.
///
/// A paragraph is an ordered series of control fields.
///
/// Field names are case insensitive on read and case preserving on set.
///
/// Paragraphs can only contain a single occurrence of a field and this is enforced through
/// the mutation APIs.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlParagraph {
    fields: Vec<ControlField>,
}

impl ControlParagraph {
    /// Parse a single paragraph from text.
    ///
    /// Empty lines are ignored, so all fields in `text` land in the same paragraph.
    /// Lines that are neither fields nor continuations are skipped.
    pub fn parse_str(text: &str) -> Self {
        let mut parser = ControlFileParser::default();

        for line in text.lines().filter(|l| !l.trim_end_matches('\r').is_empty()) {
            parser.write_line(line);
        }

        parser.finish().unwrap_or_default()
    }

    /// Whether the paragraph is empty.
    ///
    /// Empty is defined by the lack of any fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set the value of a field via a [ControlField].
    ///
    /// If a field with the same name (case insensitive compare) already exists, its
    /// value is replaced in place. Otherwise the field is appended.
    pub fn set_field(&mut self, field: ControlField) {
        if let Some(existing) = self.field_mut(&field.name) {
            existing.value = field.value;
        } else {
            self.fields.push(field);
        }
    }

    /// Set the value of a field defined via strings.
    pub fn set_field_from_string(&mut self, name: impl ToString, value: impl ToString) {
        self.set_field(ControlField::new(name, value));
    }

    /// Whether a named field is present in this paragraph.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Iterate over fields in this paragraph.
    ///
    /// Iteration order is insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField> {
        self.fields.iter()
    }

    /// Obtain the field with a given name in this paragraph.
    pub fn field(&self, name: &str) -> Option<&ControlField> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut ControlField> {
        self.fields
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }

    /// Remove the named field, returning its value if it was present.
    pub fn take_field(&mut self, name: &str) -> Option<String> {
        let index = self
            .fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))?;

        Some(self.fields.remove(index).into_value())
    }

    /// Consume self and return remaining fields in insertion order.
    pub fn into_fields(self) -> Vec<ControlField> {
        self.fields
    }

    /// Serialize the paragraph to a writer.
    ///
    /// A trailing newline is written as part of the final field. However, an
    /// extra newline is not present. So if serializing multiple paragraphs, an
    /// additional line break must be written to effectively terminate this paragraph
    /// if the writer is not at EOF.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }
}

impl Display for ControlParagraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for field in &self.fields {
            field.fmt(f)?;
        }

        Ok(())
    }
}

/// Holds parsing state for Debian control files.
///
/// Instances of this type are essentially fed lines of text and periodically emit
/// [ControlParagraph] instances as they are completed.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph,
    field: Option<(String, String)>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// If the line terminates an in-progress paragraph, that paragraph will be returned.
    pub fn write_line(&mut self, line: &str) -> Option<ControlParagraph> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);

        if line.is_empty() {
            self.flush_field();

            return if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            };
        }

        if let Some(caps) = RE_CONTINUATION.captures(line) {
            let indent = &caps[1];
            let rest = &caps[2];

            // Continuation lines without an open field have nowhere to go.
            if let Some((_, value)) = self.field.as_mut() {
                if indent.len() == 1 && rest == "." {
                    value.push('\n');
                } else {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(rest);
                }
            }
        } else if let Some(caps) = RE_FIELD.captures(line) {
            self.flush_field();
            self.field = Some((caps[1].to_string(), caps[2].trim().to_string()));
        }

        None
    }

    /// Finish parsing, consuming self.
    ///
    /// If a non-empty paragraph is present in the instance, it will be returned.
    pub fn finish(mut self) -> Option<ControlParagraph> {
        self.flush_field();

        if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        }
    }

    fn flush_field(&mut self) {
        if let Some((name, value)) = self.field.take() {
            self.paragraph.set_field_from_string(name, value);
        }
    }
}

/// A reader for [ControlParagraph].
///
/// Instances are bound to a reader, which is capable of feeding lines into a parser.
///
/// Instances can be consumed as an iterator. Each call into the iterator will attempt to
/// read a full paragraph from the underlying reader.
pub struct ControlParagraphReader<R: BufRead> {
    reader: R,
    parser: Option<ControlFileParser>,
}

impl<R: BufRead> ControlParagraphReader<R> {
    /// Create a new instance bound to a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: Some(ControlFileParser::default()),
        }
    }

    /// Consumes the instance, returning the original reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn get_next(&mut self) -> Result<Option<ControlParagraph>> {
        let mut parser = match self.parser.take() {
            Some(parser) => parser,
            None => return Ok(None),
        };

        loop {
            let mut line = String::new();

            let bytes_read = self.reader.read_line(&mut line)?;

            if bytes_read != 0 {
                if let Some(paragraph) = parser.write_line(&line) {
                    self.parser.replace(parser);
                    return Ok(Some(paragraph));
                }
            } else {
                return Ok(parser.finish());
            }
        }
    }
}

impl<R: BufRead> Iterator for ControlParagraphReader<R> {
    type Item = Result<ControlParagraph>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.get_next() {
            Ok(Some(para)) => Some(Ok(para)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Split control text into paragraphs.
///
/// Paragraphs are separated by empty lines. Runs of empty lines don't produce
/// empty paragraphs.
pub fn split_paragraphs(text: &str) -> Vec<ControlParagraph> {
    let mut parser = ControlFileParser::default();
    let mut paragraphs = text
        .lines()
        .filter_map(|line| parser.write_line(line))
        .collect::<Vec<_>>();

    paragraphs.extend(parser.finish());

    paragraphs
}
