//! Streaming manifest parser and per-entry dispatch.

use std::collections::HashMap;
use std::io::Read;

use snap_codec::{EntityCodec, ValueCodec, find_codec};
use snap_hash::HashValue;

use crate::entry::{Entry, EntryKind};
use crate::error::{Error, Result};
use crate::filter::FilterSet;
use crate::timefmt::parse_timestamp;

/// Receives each manifest entry as the parser closes its element.
///
/// The parser drives `entry` once per file/directory/link record, in
/// document order, with the record's hash list and decoded extended
/// attributes already absorbed. `finish` runs once after the document
/// ends, with the manifest's filter lists; implementations use it for
/// work that must wait until every entry has been seen.
///
/// A sink that needs to abort the pass (fail-fast validation) returns
/// [`Error::Halted`]; the parser propagates it without further dispatch.
pub trait EntrySink {
    fn entry(&mut self, entry: Entry) -> Result<()>;

    fn finish(&mut self, filters: &FilterSet) -> Result<()> {
        let _ = filters;
        Ok(())
    }
}

/// A sink that just collects entries; handy for tests and tooling.
#[derive(Debug, Default)]
pub struct CollectSink {
    pub entries: Vec<Entry>,
}

impl EntrySink for CollectSink {
    fn entry(&mut self, entry: Entry) -> Result<()> {
        self.entries.push(entry);
        Ok(())
    }
}

pub(crate) struct Tag {
    pub name: String,
    pub attrs: HashMap<String, String>,
    pub self_closing: bool,
}

pub(crate) enum MarkupEvent {
    Start(Tag),
    End(String),
    Text(String),
}

/// Incremental tokenizer over raw manifest bytes.
///
/// Reads ahead in `block_size` chunks; never materializes the document.
/// Attribute values are entity-decoded; element text is passed through
/// untouched (hash digests are plain hex, xattr bodies carry their own
/// codec).
pub(crate) struct MarkupScanner<R> {
    input: R,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
    block_size: usize,
    attr_codec: EntityCodec,
}

impl<R: Read> MarkupScanner<R> {
    pub fn new(input: R, block_size: usize) -> Self {
        Self {
            input,
            buf: Vec::new(),
            pos: 0,
            eof: false,
            block_size: block_size.max(64),
            attr_codec: EntityCodec,
        }
    }

    fn fill(&mut self) -> Result<()> {
        if self.eof {
            return Ok(());
        }
        // Drop the consumed prefix before reading more.
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        let start = self.buf.len();
        self.buf.resize(start + self.block_size, 0);
        let mut filled = start;
        while filled < self.buf.len() {
            match self.input.read(&mut self.buf[filled..])? {
                0 => {
                    self.eof = true;
                    break;
                }
                count => filled += count,
            }
        }
        self.buf.truncate(filled);
        Ok(())
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.pos >= self.buf.len() {
            self.fill()?;
        }
        match self.buf.get(self.pos) {
            Some(&byte) => {
                self.pos += 1;
                Ok(Some(byte))
            }
            None => Ok(None),
        }
    }

    /// Bytes up to (not including) `stop`, consuming the stop byte.
    /// Returns `None` on end of input before `stop`.
    fn take_until(&mut self, stop: u8) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::new();
        loop {
            match self.next_byte()? {
                Some(byte) if byte == stop => return Ok(Some(out)),
                Some(byte) => out.push(byte),
                None => {
                    return if out.is_empty() {
                        Ok(None)
                    } else {
                        Err(Error::markup("unexpected end of document"))
                    };
                }
            }
        }
    }

    pub fn next_event(&mut self) -> Result<Option<MarkupEvent>> {
        if self.pos >= self.buf.len() {
            self.fill()?;
        }
        match self.buf.get(self.pos) {
            None => Ok(None),
            Some(b'<') => {
                self.pos += 1;
                let raw = self
                    .take_until(b'>')?
                    .ok_or_else(|| Error::markup("unterminated tag"))?;
                self.parse_tag(&raw).map(Some)
            }
            Some(_) => {
                // Text run up to the next tag or end of input.
                let mut text = Vec::new();
                loop {
                    if self.pos >= self.buf.len() {
                        self.fill()?;
                    }
                    match self.buf.get(self.pos) {
                        None | Some(b'<') => break,
                        Some(&byte) => {
                            text.push(byte);
                            self.pos += 1;
                        }
                    }
                }
                let text = String::from_utf8(text)
                    .map_err(|_| Error::markup("manifest text is not valid UTF-8"))?;
                Ok(Some(MarkupEvent::Text(text)))
            }
        }
    }

    fn parse_tag(&self, raw: &[u8]) -> Result<MarkupEvent> {
        let raw = std::str::from_utf8(raw)
            .map_err(|_| Error::markup("manifest tag is not valid UTF-8"))?
            .trim();
        if raw.is_empty() {
            return Err(Error::markup("empty tag"));
        }
        if let Some(name) = raw.strip_prefix('/') {
            return Ok(MarkupEvent::End(name.trim().to_string()));
        }
        let (body, self_closing) = match raw.strip_suffix('/') {
            Some(body) => (body.trim_end(), true),
            None => (raw, false),
        };

        let name_end = body
            .char_indices()
            .find(|(_, ch)| ch.is_whitespace())
            .map_or(body.len(), |(index, _)| index);
        let name = &body[..name_end];
        if name.is_empty() {
            return Err(Error::markup("tag with no name"));
        }

        let mut attrs = HashMap::new();
        let mut rest = body[name_end..].trim_start();
        while !rest.is_empty() {
            let eq = rest
                .find('=')
                .ok_or_else(|| Error::markup(format!("attribute without value in <{name}>")))?;
            let attr_name = rest[..eq].trim_end();
            let after = &rest[eq + 1..];
            let quote = after
                .chars()
                .next()
                .filter(|&q| q == '\'' || q == '"')
                .ok_or_else(|| Error::markup(format!("unquoted attribute in <{name}>")))?;
            let value_rest = &after[1..];
            let close = value_rest
                .find(quote)
                .ok_or_else(|| Error::markup(format!("unterminated attribute in <{name}>")))?;
            let decoded = self.attr_codec.decode(&value_rest[..close])?;
            let value = String::from_utf8(decoded)
                .map_err(|_| Error::markup("attribute value is not valid UTF-8"))?;
            attrs.insert(attr_name.to_string(), value);
            rest = value_rest[close + 1..].trim_start();
        }

        Ok(MarkupEvent::Start(Tag {
            name: name.to_string(),
            attrs,
            self_closing,
        }))
    }
}

/// `true` attribute values per the manifest convention: anything starting
/// with `t` or `T`.
pub(crate) fn flag(attrs: &HashMap<String, String>, name: &str) -> bool {
    attrs
        .get(name)
        .is_some_and(|value| value.starts_with(['t', 'T']))
}

struct Frame {
    name: String,
    attrs: HashMap<String, String>,
    text: String,
    hashes: Vec<HashValue>,
    xattrs: std::collections::BTreeMap<String, Vec<u8>>,
}

impl Frame {
    fn new(tag: Tag) -> Self {
        Self {
            name: tag.name,
            attrs: tag.attrs,
            text: String::new(),
            hashes: Vec::new(),
            xattrs: std::collections::BTreeMap::new(),
        }
    }
}

fn build_entry(frame: Frame) -> Result<Entry> {
    let kind = EntryKind::from_tag(&frame.name)
        .ok_or_else(|| Error::markup(format!("unknown entry element <{}>", frame.name)))?;
    let path = frame
        .attrs
        .get("path")
        .ok_or_else(|| Error::markup(format!("<{}> without path attribute", frame.name)))?
        .clone();

    let mut entry = Entry::new(kind, path);
    entry.readonly = flag(&frame.attrs, "readonly");
    entry.executable = flag(&frame.attrs, "executable");
    entry.target = frame.attrs.get("target").cloned();
    if let Some(modified) = frame.attrs.get("modified") {
        entry.modified = Some(parse_timestamp(modified)?);
    }
    if let Some(size) = frame.attrs.get("size") {
        entry.size = Some(size.parse().map_err(|_| {
            Error::markup(format!("invalid size '{size}' on {}", entry.path))
        })?);
    }
    if let Some(lines) = frame.attrs.get("lines") {
        entry.lines = Some(lines.parse().map_err(|_| {
            Error::markup(format!("invalid line count '{lines}' on {}", entry.path))
        })?);
    }
    entry.hashes = frame.hashes;
    entry.xattrs = frame.xattrs;
    Ok(entry)
}

/// Parse manifest markup from `input`, dispatching each entry to `sink`.
///
/// Returns the manifest's filter lists. The root element must be
/// `manifest`; an unknown xattr encoding name is fatal. `sink.finish` is
/// *not* called here; orchestration layers decide when (after signature
/// verification).
pub fn parse<R: Read, S: EntrySink>(
    input: R,
    sink: &mut S,
    decoders: &[&dyn ValueCodec],
    block_size: usize,
) -> Result<FilterSet> {
    let mut scanner = MarkupScanner::new(input, block_size);
    let mut filters = FilterSet::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut root_closed = false;

    while let Some(event) = scanner.next_event()? {
        match event {
            MarkupEvent::Start(tag) => {
                if root_closed {
                    return Err(Error::markup("content after document root"));
                }
                if stack.is_empty() && tag.name != "manifest" {
                    return Err(Error::NotAManifest {
                        root: tag.name.clone(),
                    });
                }
                let self_closing = tag.self_closing;
                let name = tag.name.clone();
                if stack.len() == 1 && name == "filter" {
                    if let Some(path) = tag.attrs.get("path") {
                        filters.paths.push(path.clone());
                    }
                    if let Some(name) = tag.attrs.get("name") {
                        filters.names.push(name.clone());
                    }
                    if let Some(extension) = tag.attrs.get("extension") {
                        filters.extensions.push(extension.clone());
                    }
                }
                stack.push(Frame::new(tag));
                if self_closing {
                    close_frame(&mut stack, &name, sink, decoders, &mut root_closed)?;
                }
            }
            MarkupEvent::End(name) => {
                close_frame(&mut stack, &name, sink, decoders, &mut root_closed)?;
            }
            MarkupEvent::Text(text) => {
                match stack.last_mut() {
                    Some(frame) => {
                        // Whitespace between elements never starts a text body.
                        if !frame.text.is_empty() || !text.trim().is_empty() {
                            frame.text.push_str(&text);
                        }
                    }
                    None => {
                        if !text.trim().is_empty() {
                            return Err(Error::markup("text outside document root"));
                        }
                    }
                }
            }
        }
    }

    if !stack.is_empty() {
        return Err(Error::markup("unexpected end of document"));
    }
    if !root_closed {
        return Err(Error::markup("empty document"));
    }
    Ok(filters)
}

fn close_frame<S: EntrySink>(
    stack: &mut Vec<Frame>,
    name: &str,
    sink: &mut S,
    decoders: &[&dyn ValueCodec],
    root_closed: &mut bool,
) -> Result<()> {
    let frame = stack
        .pop()
        .ok_or_else(|| Error::markup(format!("unmatched closing tag </{name}>")))?;
    if frame.name != name {
        return Err(Error::markup(format!(
            "mismatched closing tag: expected </{}>, found </{}>",
            frame.name, name
        )));
    }

    let depth = stack.len(); // after pop: 0 = root, 1 = entry/filter, 2 = hash/xattr
    let entry_parent = if depth == 2 {
        stack
            .last_mut()
            .filter(|parent| EntryKind::from_tag(&parent.name).is_some())
    } else {
        None
    };

    if let Some(parent) = entry_parent {
        let text = frame.text.trim().to_string();
        match frame.name.as_str() {
            "hash" => {
                let algorithm = frame
                    .attrs
                    .get("algorithm")
                    .ok_or_else(|| Error::markup("<hash> without algorithm attribute"))?;
                parent
                    .hashes
                    .push(HashValue::new(algorithm.clone(), text, flag(&frame.attrs, "text")));
            }
            "xattr" => {
                let attr_name = frame
                    .attrs
                    .get("name")
                    .ok_or_else(|| Error::markup("<xattr> without name attribute"))?;
                let value = match frame.attrs.get("encoding") {
                    Some(encoding) => match find_codec(decoders, encoding) {
                        Some(codec) => codec.decode(&text)?,
                        None => {
                            return Err(Error::UnknownEncoding {
                                name: encoding.clone(),
                            });
                        }
                    },
                    None => text.into_bytes(),
                };
                parent.xattrs.insert(attr_name.clone(), value);
            }
            _ => {} // unknown children are tolerated and dropped
        }
    } else if depth == 1 && EntryKind::from_tag(&frame.name).is_some() {
        sink.entry(build_entry(frame)?)?;
    } else if depth == 0 {
        *root_closed = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_str(doc: &str) -> Result<(FilterSet, Vec<Entry>)> {
        let codecs = snap_codec::standard_codecs();
        let refs: Vec<&dyn ValueCodec> = codecs.iter().map(|c| c.as_ref()).collect();
        let mut sink = CollectSink::default();
        let filters = parse(doc.as_bytes(), &mut sink, &refs, 64)?;
        Ok((filters, sink.entries))
    }

    const SAMPLE: &str = "<manifest>\n\
        \t<filter path='old'/>\n\
        \t<filter name='.DS_Store'/>\n\
        \t<filter extension='.pyc'/>\n\
        \t<directory path='sub' modified='2023/11/14@22:13:20'>\n\
        \t</directory>\n\
        \t<file size='12' readonly='true' path='sub/a.txt' modified='1970/01/01@00:00:00' lines='2'>\n\
        \t\t<hash algorithm='md5'>abc123</hash>\n\
        \t\t<hash algorithm='md5' text='true'>def456</hash>\n\
        \t\t<xattr name='user.note' encoding='base64'>aGVsbG8=</xattr>\n\
        \t</file>\n\
        \t<link target='sub/a.txt' path='b' modified='1970/01/01@00:01:00'>\n\
        \t</link>\n\
        </manifest>\n";

    #[test]
    fn parses_entries_in_document_order() {
        let (filters, entries) = parse_str(SAMPLE).unwrap();

        assert_eq!(filters.paths, vec!["old"]);
        assert_eq!(filters.names, vec![".DS_Store"]);
        assert_eq!(filters.extensions, vec![".pyc"]);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].kind, EntryKind::Directory);
        assert_eq!(entries[0].path, "sub");
        assert_eq!(entries[0].modified, Some(1_700_000_000));

        let file = &entries[1];
        assert_eq!(file.kind, EntryKind::File);
        assert_eq!(file.size, Some(12));
        assert_eq!(file.lines, Some(2));
        assert!(file.readonly);
        assert!(!file.executable);
        assert_eq!(file.hashes.len(), 2);
        assert_eq!(file.hashes[0].hex, "abc123");
        assert!(!file.hashes[0].text);
        assert!(file.hashes[1].text);
        assert_eq!(file.xattrs.get("user.note").unwrap(), b"hello");

        let link = &entries[2];
        assert_eq!(link.kind, EntryKind::Link);
        assert_eq!(link.target.as_deref(), Some("sub/a.txt"));
    }

    #[test]
    fn round_trips_writer_output() {
        let codecs = snap_codec::standard_codecs();
        let refs: Vec<&dyn ValueCodec> = codecs.iter().map(|c| c.as_ref()).collect();

        let mut file = Entry::file("dir/name with spaces.txt", 40);
        file.modified = Some(1_700_000_000);
        file.executable = true;
        file.hashes.push(snap_hash::HashValue::new("sha256", "00ff", false));
        file.xattrs.insert("user.tag".to_string(), vec![1, 2, 3]);
        let mut dir = Entry::directory("dir");
        dir.modified = Some(1_700_000_000);
        dir.readonly = true;
        let filters = FilterSet {
            paths: vec!["skip me".to_string()],
            names: vec![],
            extensions: vec![".tmp".to_string()],
        };

        let mut writer = crate::writer::ManifestWriter::new(Vec::new(), &refs);
        writer.begin().unwrap();
        writer.filters(&filters).unwrap();
        writer.entry(&dir).unwrap();
        writer.entry(&file).unwrap();
        writer.end().unwrap();
        let doc = String::from_utf8(writer.into_inner()).unwrap();

        let (parsed_filters, entries) = parse_str(&doc).unwrap();
        assert_eq!(parsed_filters, filters);
        assert_eq!(entries, vec![dir, file]);
    }

    #[test]
    fn rejects_wrong_root_element() {
        let result = parse_str("<inventory>\n</inventory>\n");
        assert!(matches!(result, Err(Error::NotAManifest { root }) if root == "inventory"));
    }

    #[test]
    fn rejects_unknown_xattr_encoding() {
        let doc = "<manifest>\n\
            \t<file size='1' path='a' modified='1970/01/01@00:00:00'>\n\
            \t\t<xattr name='x' encoding='rot13'>abc</xattr>\n\
            \t</file>\n\
            </manifest>\n";
        let result = parse_str(doc);
        assert!(matches!(result, Err(Error::UnknownEncoding { name }) if name == "rot13"));
    }

    #[test]
    fn rejects_truncated_document() {
        let result = parse_str("<manifest>\n\t<directory path='d'>\n");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_mismatched_closing_tag() {
        let result = parse_str("<manifest>\n\t<file size='1' path='a'>\n\t</directory>\n</manifest>\n");
        assert!(result.is_err());
    }

    #[test]
    fn tolerates_tiny_read_blocks() {
        // Block size below the smallest token still parses.
        let codecs = snap_codec::standard_codecs();
        let refs: Vec<&dyn ValueCodec> = codecs.iter().map(|c| c.as_ref()).collect();
        let mut sink = CollectSink::default();
        parse(SAMPLE.as_bytes(), &mut sink, &refs, 1).unwrap();
        assert_eq!(sink.entries.len(), 3);
    }

    #[test]
    fn entity_decodes_attribute_values() {
        let doc = "<manifest>\n\
            \t<directory path='with&#x27;quote' modified='1970/01/01@00:00:00'>\n\
            \t</directory>\n\
            </manifest>\n";
        let (_, entries) = parse_str(doc).unwrap();
        assert_eq!(entries[0].path, "with'quote");
    }
}
