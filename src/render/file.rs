use std::path::Path;

use content_inspector::ContentType;

use super::erb::ContentRenderer;
use super::token::resolve_tokens;
use crate::context::DataContext;
use crate::error::{Result, StampError};

const SAMPLE_SIZE: usize = 8192;
const CONTROL_SAMPLE_SIZE: usize = 512;

/// A file's resolved destination and, when rendering changed it, its new text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub dest: String,
    /// `None` means the original bytes are written unchanged.
    pub content: Option<String>,
}

/// Resolve a file's destination path and render its content if it is text.
pub fn classify(
    source: &Path,
    buffer: &[u8],
    dest_template: &str,
    context: &DataContext,
    renderer: &ContentRenderer,
) -> Result<Classified> {
    let dest = resolve_tokens(dest_template, context)?;

    if is_binary(buffer) {
        return Ok(Classified { dest, content: None });
    }

    let text = String::from_utf8_lossy(buffer);
    let rendered = renderer
        .render(&text, context)
        .map_err(|message| StampError::Render {
            file: source.to_path_buf(),
            message,
        })?;

    let content = if rendered == text {
        None
    } else {
        Some(rendered)
    };
    Ok(Classified { dest, content })
}

/// Detect binary content from the first 8KB.
///
/// Uses content_inspector (BOM-aware, null-byte scanning), a control-byte
/// density check and a table of well-known container signatures. Text in
/// encodings other than UTF-8 is treated as binary and copied untouched.
pub fn is_binary(buffer: &[u8]) -> bool {
    let sample = &buffer[..buffer.len().min(SAMPLE_SIZE)];

    match content_inspector::inspect(sample) {
        ContentType::UTF_8 | ContentType::UTF_8_BOM => {}
        _ => return true,
    }

    !is_utf8_sample(sample, sample.len() < buffer.len())
        || has_dense_control_bytes(sample)
        || sniff_container(sample).is_some()
}

/// content_inspector reports UTF-8 for any BOM-less buffer without nulls, so
/// Latin-1 and similar encodings need an explicit decode check. A multi-byte
/// sequence cut off by the sample boundary still counts as valid.
fn is_utf8_sample(sample: &[u8], truncated: bool) -> bool {
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        Err(e) => truncated && e.error_len().is_none(),
    }
}

fn has_dense_control_bytes(sample: &[u8]) -> bool {
    let head = &sample[..sample.len().min(CONTROL_SAMPLE_SIZE)];
    if head.is_empty() {
        return false;
    }
    let suspicious = head
        .iter()
        .filter(|&&b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c))
        .count();
    suspicious * 10 > head.len()
}

const SIGNATURES: &[(&str, usize, &[u8])] = &[
    ("png", 0, b"\x89PNG\r\n\x1a\n"),
    ("jpeg", 0, b"\xff\xd8\xff"),
    ("gif", 0, b"GIF87a"),
    ("gif", 0, b"GIF89a"),
    ("webp", 8, b"WEBP"),
    ("ico", 0, b"\x00\x00\x01\x00"),
    ("tiff", 0, b"II*\x00"),
    ("tiff", 0, b"MM\x00*"),
    ("pdf", 0, b"%PDF-"),
    ("zip", 0, b"PK\x03\x04"),
    ("zip", 0, b"PK\x05\x06"),
    ("gzip", 0, b"\x1f\x8b"),
    ("bzip2", 0, b"BZh"),
    ("xz", 0, b"\xfd7zXZ\x00"),
    ("7z", 0, b"7z\xbc\xaf\x27\x1c"),
    ("rar", 0, b"Rar!\x1a\x07"),
    ("zstd", 0, b"\x28\xb5\x2f\xfd"),
    ("wasm", 0, b"\x00asm"),
    ("elf", 0, b"\x7fELF"),
    ("macho", 0, b"\xcf\xfa\xed\xfe"),
    ("macho", 0, b"\xce\xfa\xed\xfe"),
    ("macho", 0, b"\xca\xfe\xba\xbe"),
    ("ogg", 0, b"OggS"),
    ("flac", 0, b"fLaC"),
    ("mp3", 0, b"ID3"),
    ("mp4", 4, b"ftyp"),
    ("woff", 0, b"wOFF"),
    ("woff2", 0, b"wOF2"),
    ("sqlite", 0, b"SQLite format 3\x00"),
    ("psd", 0, b"8BPS"),
];

/// Name of the container format whose signature `sample` starts with.
pub fn sniff_container(sample: &[u8]) -> Option<&'static str> {
    SIGNATURES
        .iter()
        .find(|(_, offset, magic)| {
            sample
                .get(*offset..offset + magic.len())
                .is_some_and(|window| window == *magic)
        })
        .map(|(name, _, _)| *name)
}
