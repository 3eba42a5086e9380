//! Serializes entries and filters into manifest markup.

use std::io::Write;

use snap_codec::{EntityCodec, ValueCodec, best_encoding};

use crate::entry::{Entry, EntryKind};
use crate::error::Result;
use crate::filter::FilterSet;
use crate::timefmt::format_timestamp;

/// Streaming manifest serializer.
///
/// Call [`begin`](Self::begin), then [`filters`](Self::filters) once, then
/// [`entry`](Self::entry) in walk order, then [`end`](Self::end). Extended
/// attribute values are embedded with whichever configured codec encodes
/// them shortest; attribute values use entity escapes directly.
pub struct ManifestWriter<'a, W: Write> {
    out: W,
    codecs: &'a [&'a dyn ValueCodec],
    attr_codec: EntityCodec,
}

impl<'a, W: Write> ManifestWriter<'a, W> {
    pub fn new(out: W, codecs: &'a [&'a dyn ValueCodec]) -> Self {
        Self {
            out,
            codecs,
            attr_codec: EntityCodec,
        }
    }

    fn attr(&self, value: &str) -> String {
        self.attr_codec.encode(value.as_bytes())
    }

    /// Write the document root opening.
    pub fn begin(&mut self) -> Result<()> {
        self.out.write_all(b"<manifest>\n")?;
        Ok(())
    }

    /// Write the skip-filter declarations.
    pub fn filters(&mut self, filters: &FilterSet) -> Result<()> {
        for path in &filters.paths {
            writeln!(self.out, "\t<filter path='{}'/>", self.attr(path))?;
        }
        for name in &filters.names {
            writeln!(self.out, "\t<filter name='{}'/>", self.attr(name))?;
        }
        for extension in &filters.extensions {
            writeln!(self.out, "\t<filter extension='{}'/>", self.attr(extension))?;
        }
        Ok(())
    }

    /// Write one complete entry element with its hash and xattr children.
    pub fn entry(&mut self, entry: &Entry) -> Result<()> {
        let tag = entry.kind.tag();
        write!(self.out, "\t<{tag}")?;
        if entry.kind == EntryKind::Link {
            if let Some(target) = &entry.target {
                write!(self.out, " target='{}'", self.attr(target))?;
            }
        }
        if entry.kind == EntryKind::File {
            if let Some(size) = entry.size {
                write!(self.out, " size='{size}'")?;
            }
        }
        if entry.readonly {
            write!(self.out, " readonly='true'")?;
        }
        if entry.executable {
            write!(self.out, " executable='true'")?;
        }
        write!(self.out, " path='{}'", self.attr(&entry.path))?;
        if let Some(modified) = entry.modified {
            write!(self.out, " modified='{}'", format_timestamp(modified))?;
        }
        if let Some(lines) = entry.lines {
            write!(self.out, " lines='{lines}'")?;
        }
        self.out.write_all(b">\n")?;

        for hash in &entry.hashes {
            let text_attr = if hash.text { " text='true'" } else { "" };
            writeln!(
                self.out,
                "\t\t<hash algorithm='{}'{}>{}</hash>",
                self.attr(&hash.algorithm),
                text_attr,
                hash.hex
            )?;
        }
        for (name, value) in &entry.xattrs {
            match best_encoding(self.codecs, value) {
                Some((codec_name, encoded)) => writeln!(
                    self.out,
                    "\t\t<xattr name='{}' encoding='{}'>{}</xattr>",
                    self.attr(name),
                    codec_name,
                    encoded
                )?,
                None => writeln!(
                    self.out,
                    "\t\t<xattr name='{}'>{}</xattr>",
                    self.attr(name),
                    String::from_utf8_lossy(value)
                )?,
            }
        }

        writeln!(self.out, "\t</{tag}>")?;
        Ok(())
    }

    /// Close the document root.
    pub fn end(&mut self) -> Result<()> {
        self.out.write_all(b"</manifest>\n")?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
