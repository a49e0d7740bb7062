//! Helpers for the version 1 (legacy) text format and shared string encoding.

use bytes::{Buf, BufMut};
use commonware_codec::{Error, ReadExt, Write};

/// Maximum length of any string field carried by a contract payload.
pub const MAX_STRING_LENGTH: usize = 4096;

/// Return the text between the first `open` tag and the next `close` tag.
///
/// Missing tags yield an empty string.
pub fn extract_tag<'a>(message: &'a str, open: &str, close: &str) -> &'a str {
    let Some(start) = message.find(open) else {
        return "";
    };
    let start = start + open.len();
    match message[start..].find(close) {
        Some(end) => &message[start..start + end],
        None => "",
    }
}

/// Write a string as length-prefixed UTF-8 bytes.
pub(crate) fn write_string(s: &str, writer: &mut impl BufMut) {
    let bytes = s.as_bytes();
    (bytes.len() as u32).write(writer);
    writer.put_slice(bytes);
}

/// Read a string from length-prefixed UTF-8 bytes.
pub(crate) fn read_string(reader: &mut impl Buf) -> Result<String, Error> {
    let len = u32::read(reader)? as usize;
    if len > MAX_STRING_LENGTH {
        return Err(Error::Invalid("String", "too long"));
    }
    if reader.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    let mut bytes = vec![0u8; len];
    reader.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| Error::Invalid("String", "invalid UTF-8"))
}

pub(crate) fn string_encode_size(s: &str) -> usize {
    4 + s.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_tag() {
        let message = "<MT>beacon</MT><MK>key</MK><MV></MV>";
        assert_eq!(extract_tag(message, "<MT>", "</MT>"), "beacon");
        assert_eq!(extract_tag(message, "<MK>", "</MK>"), "key");
        assert_eq!(extract_tag(message, "<MV>", "</MV>"), "");
        assert_eq!(extract_tag(message, "<MS>", "</MS>"), "");
    }

    #[test]
    fn test_extract_tag_unterminated() {
        assert_eq!(extract_tag("<MT>beacon", "<MT>", "</MT>"), "");
    }

    #[test]
    fn test_string_roundtrip() {
        let mut buf = Vec::new();
        write_string("héllo", &mut buf);
        assert_eq!(buf.len(), string_encode_size("héllo"));
        let decoded = read_string(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, "héllo");
    }

    #[test]
    fn test_string_too_long() {
        let mut buf = Vec::new();
        ((MAX_STRING_LENGTH + 1) as u32).write(&mut buf);
        assert!(matches!(
            read_string(&mut buf.as_slice()),
            Err(Error::Invalid("String", "too long"))
        ));
    }
}
