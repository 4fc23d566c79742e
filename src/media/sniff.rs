//! Content type detection from the leading bytes of a download.
//!
//! Follows the WHATWG MIME sniffing table for the formats the archive cares
//! about. Anything unrecognised is reported as `text/plain; charset=utf-8` or
//! `application/octet-stream`, whose subtypes are too long to be used as a
//! file extension.

/// Number of leading bytes considered.
pub const SNIFF_LEN: usize = 512;

/// Longest MIME subtype accepted as a file extension.
pub const MAX_EXTENSION_LEN: usize = 4;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

const HTML_TAGS: [&[u8]; 17] = [
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

const SIGNATURES: [(&[u8], &str); 16] = [
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
    (b"\xEF\xBB\xBF", TEXT_PLAIN),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"OggS\x00", "application/ogg"),
    (b"ID3", "audio/mpeg"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
    (b"PK\x03\x04", "application/zip"),
];

/// Returns the MIME type of `data`, looking at no more than [`SNIFF_LEN`] bytes.
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    if let Some(content_type) = sniff_markup(data) {
        return content_type;
    }

    for (signature, content_type) in SIGNATURES {
        if data.starts_with(signature) {
            return content_type;
        }
    }

    if let Some(content_type) = sniff_riff(data) {
        return content_type;
    }

    if is_mp4(data) {
        return "video/mp4";
    }

    if data.starts_with(b"\x1F\x8B\x08") {
        return "application/x-gzip";
    }

    if data.iter().any(|&b| is_binary_byte(b)) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

/// File extension for `content_type`, or `None` when the subtype is not
/// usable as one.
pub fn extension_for(content_type: &str) -> Option<&str> {
    let (_, subtype) = content_type.split_once('/')?;
    if subtype.is_empty() || subtype.len() > MAX_EXTENSION_LEN {
        return None;
    }
    Some(subtype)
}

fn sniff_markup(data: &[u8]) -> Option<&'static str> {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))?;
    let data = &data[start..];

    for tag in HTML_TAGS {
        if data.len() > tag.len()
            && data[..tag.len()].eq_ignore_ascii_case(tag)
            && matches!(data[tag.len()], b' ' | b'>')
        {
            return Some("text/html; charset=utf-8");
        }
    }

    if data.starts_with(b"<?xml") {
        return Some("text/xml; charset=utf-8");
    }
    None
}

fn sniff_riff(data: &[u8]) -> Option<&'static str> {
    if data.len() < 12 || !data.starts_with(b"RIFF") {
        return None;
    }
    match &data[8..12] {
        b"WEBP" if data.len() >= 14 && &data[12..14] == b"VP" => Some("image/webp"),
        b"WAVE" => Some("audio/wave"),
        b"AVI " => Some("video/avi"),
        _ => None,
    }
}

fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if box_size % 4 != 0 || box_size < 12 || data.len() < box_size || &data[4..8] != b"ftyp" {
        return false;
    }
    (8..box_size)
        .step_by(4)
        .filter(|&offset| offset != 12)
        .any(|offset| data.get(offset..offset + 3) == Some(b"mp4".as_slice()))
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::{extension_for, sniff_content_type};

    #[test_case(b"\x89PNG\x0D\x0A\x1A\x0A\x00\x00\x00\x0DIHDR", "image/png" ; "png")]
    #[test_case(b"\xFF\xD8\xFF\xE0\x00\x10JFIF", "image/jpeg" ; "jpeg")]
    #[test_case(b"GIF89a\x01\x00\x01\x00", "image/gif" ; "gif")]
    #[test_case(b"RIFF\x24\x00\x00\x00WEBPVP8 ", "image/webp" ; "webp")]
    #[test_case(b"  <html><body>hi</body></html>", "text/html; charset=utf-8" ; "html")]
    #[test_case(b"just some words", "text/plain; charset=utf-8" ; "plain text")]
    #[test_case(b"\x00\x01\x02\x03garbage", "application/octet-stream" ; "binary")]
    fn sniffs(data: &[u8], expected: &str) {
        assert_eq!(sniff_content_type(data), expected);
    }

    #[test]
    fn sniffs_mp4_ftyp_box() {
        let mut data = vec![0x00, 0x00, 0x00, 0x18];
        data.extend_from_slice(b"ftypmp42\x00\x00\x00\x00isommp42");
        assert_eq!(sniff_content_type(&data), "video/mp4");
    }

    #[test_case("image/png", Some("png") ; "png")]
    #[test_case("image/jpeg", Some("jpeg") ; "four characters")]
    #[test_case("image/webp", Some("webp") ; "webp")]
    #[test_case("image/x-icon", None ; "too long")]
    #[test_case("text/html; charset=utf-8", None ; "parameters")]
    #[test_case("application/octet-stream", None ; "octet stream")]
    #[test_case("garbage", None ; "no subtype")]
    fn extensions(content_type: &str, expected: Option<&str>) {
        assert_eq!(extension_for(content_type), expected);
    }
}
