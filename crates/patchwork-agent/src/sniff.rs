//! Content-type detection from file bytes
//!
//! Follows the WHATWG MIME sniffing signature table: only the leading bytes of
//! a file are inspected, the file name never is. Anything that matches no
//! signature is classified as UTF-8 text when it contains no binary control
//! bytes, otherwise as `application/octet-stream`.

/// Bytes inspected when sniffing
const SNIFF_LEN: usize = 512;

const TEXT_UTF8: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// One entry of the signature table
enum Signature {
    /// Case-insensitive HTML tag; leading whitespace skipped, must be followed
    /// by a space or `>`
    Html(&'static [u8]),
    /// Literal prefix, optionally after leading whitespace
    Exact {
        prefix: &'static [u8],
        skip_ws: bool,
        content_type: &'static str,
    },
    /// Prefix compared under a byte mask
    Masked {
        pattern: &'static [u8],
        mask: &'static [u8],
        content_type: &'static str,
    },
    /// ISO base media file with an `mp4` brand
    Mp4,
}

const fn exact(prefix: &'static [u8], content_type: &'static str) -> Signature {
    Signature::Exact {
        prefix,
        skip_ws: false,
        content_type,
    }
}

const RIFF_MASK: &[u8] = b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF";

const SIGNATURES: &[Signature] = &[
    Signature::Html(b"<!DOCTYPE HTML"),
    Signature::Html(b"<HTML"),
    Signature::Html(b"<HEAD"),
    Signature::Html(b"<SCRIPT"),
    Signature::Html(b"<IFRAME"),
    Signature::Html(b"<H1"),
    Signature::Html(b"<DIV"),
    Signature::Html(b"<FONT"),
    Signature::Html(b"<TABLE"),
    Signature::Html(b"<A"),
    Signature::Html(b"<STYLE"),
    Signature::Html(b"<TITLE"),
    Signature::Html(b"<B"),
    Signature::Html(b"<BODY"),
    Signature::Html(b"<BR"),
    Signature::Html(b"<P"),
    Signature::Html(b"<!--"),
    Signature::Exact {
        prefix: b"<?xml",
        skip_ws: true,
        content_type: "text/xml; charset=utf-8",
    },
    exact(b"%PDF-", "application/pdf"),
    exact(b"%!PS-Adobe-", "application/postscript"),
    // Byte order marks
    exact(b"\xFE\xFF", "text/plain; charset=utf-16be"),
    exact(b"\xFF\xFE", "text/plain; charset=utf-16le"),
    exact(b"\xEF\xBB\xBF", TEXT_UTF8),
    // Images
    exact(b"\x00\x00\x01\x00", "image/x-icon"),
    exact(b"\x00\x00\x02\x00", "image/x-icon"),
    exact(b"BM", "image/bmp"),
    exact(b"GIF87a", "image/gif"),
    exact(b"GIF89a", "image/gif"),
    Signature::Masked {
        pattern: b"RIFF\x00\x00\x00\x00WEBPVP",
        mask: b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        content_type: "image/webp",
    },
    exact(b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    exact(b"\xFF\xD8\xFF", "image/jpeg"),
    // Audio and video
    Signature::Masked {
        pattern: b"FORM\x00\x00\x00\x00AIFF",
        mask: RIFF_MASK,
        content_type: "audio/aiff",
    },
    exact(b"ID3", "audio/mpeg"),
    exact(b"OggS\x00", "application/ogg"),
    exact(b"MThd\x00\x00\x00\x06", "audio/midi"),
    Signature::Masked {
        pattern: b"RIFF\x00\x00\x00\x00AVI ",
        mask: RIFF_MASK,
        content_type: "video/avi",
    },
    Signature::Masked {
        pattern: b"RIFF\x00\x00\x00\x00WAVE",
        mask: RIFF_MASK,
        content_type: "audio/wave",
    },
    Signature::Mp4,
    exact(b"\x1A\x45\xDF\xA3", "video/webm"),
    // Fonts
    exact(b"wOFF", "font/woff"),
    exact(b"wOF2", "font/woff2"),
    exact(b"OTTO", "font/otf"),
    exact(b"\x00\x01\x00\x00", "font/ttf"),
    // Archives
    exact(b"\x1F\x8B\x08", "application/x-gzip"),
    exact(b"PK\x03\x04", "application/zip"),
    exact(b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    exact(b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    exact(b"\x00asm", "application/wasm"),
];

fn is_ws(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

fn skip_ws(data: &[u8]) -> &[u8] {
    let start = data.iter().position(|b| !is_ws(*b)).unwrap_or(data.len());
    &data[start..]
}

impl Signature {
    fn matches(&self, data: &[u8]) -> Option<&'static str> {
        match self {
            Signature::Html(tag) => {
                let data = skip_ws(data);
                if data.len() < tag.len() + 1 {
                    return None;
                }
                let head_matches = data
                    .iter()
                    .zip(tag.iter())
                    .all(|(d, t)| d.to_ascii_uppercase() == *t);
                let terminated = matches!(data[tag.len()], b' ' | b'>');
                (head_matches && terminated).then_some("text/html; charset=utf-8")
            }
            Signature::Exact {
                prefix,
                skip_ws: skip,
                content_type,
            } => {
                let data = if *skip { skip_ws(data) } else { data };
                data.starts_with(prefix).then_some(*content_type)
            }
            Signature::Masked {
                pattern,
                mask,
                content_type,
            } => {
                if data.len() < pattern.len() {
                    return None;
                }
                pattern
                    .iter()
                    .zip(mask.iter())
                    .zip(data.iter())
                    .all(|((p, m), d)| d & m == *p)
                    .then_some(*content_type)
            }
            Signature::Mp4 => {
                if data.len() < 12 {
                    return None;
                }
                let box_size =
                    u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
                if box_size < 12 || box_size % 4 != 0 || data.len() < box_size {
                    return None;
                }
                if &data[4..8] != b"ftyp" {
                    return None;
                }
                let major = &data[8..11];
                let compatible = (16..box_size)
                    .step_by(4)
                    .any(|st| data.get(st..st + 3) == Some(b"mp4".as_slice()));
                (major == b"mp4" || compatible).then_some("video/mp4")
            }
        }
    }
}

/// Detect the MIME type of `data` from its leading bytes
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    if let Some(content_type) = SIGNATURES.iter().find_map(|sig| sig.matches(data)) {
        return content_type;
    }

    if data.iter().any(|b| is_binary(*b)) {
        OCTET_STREAM
    } else {
        TEXT_UTF8
    }
}
