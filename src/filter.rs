//! Output filters applied to text captured from a device.

use once_cell::sync::Lazy;
use regex::Regex;

/// Terminal escape sequences: a CSI or charset introducer, parameter bytes,
/// then a final alphanumeric byte.
static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| match Regex::new(r"\x1b(?:\[|\(|\))[;?0-9]*[0-9A-Za-z]") {
        Ok(re) => re,
        Err(err) => panic!("invalid ANSI_ESCAPE regex: {err}"),
    });

/// Stray break (ETX) and substitute (SUB) characters.
static STRAY_CONTROL: Lazy<Regex> = Lazy::new(|| match Regex::new(r"[\x03\x1a]") {
    Ok(re) => re,
    Err(err) => panic!("invalid STRAY_CONTROL regex: {err}"),
});

/// Removes terminal escape sequences and stray control bytes.
///
/// Applying the filter twice yields the same text as applying it once.
pub fn strip_ansi(text: &str) -> String {
    let mut out = text.to_string();
    // A removal can splice an ESC onto the parameters of the next
    // sequence, so run until nothing changes.
    loop {
        let next = ANSI_ESCAPE.replace_all(&out, "");
        let next = STRAY_CONTROL.replace_all(&next, "").into_owned();
        if next == out {
            return out;
        }
        out = next;
    }
}

/// Converts CRLF line endings to LF.
pub fn dos2unix(text: &str) -> String {
    text.replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_colour_and_cursor_sequences() {
        let raw = "\x1b[32mGi0/1\x1b[0m up\x1b[2K\x1b[?25h\r\n";
        assert_eq!(strip_ansi(raw), "Gi0/1 up\r\n");
    }

    #[test]
    fn strips_charset_designators_and_stray_controls() {
        let raw = "\x1b(Bline one\x03\nline\x1a two";
        assert_eq!(strip_ansi(raw), "line one\nline two");
    }

    #[test]
    fn leaves_printable_text_untouched() {
        let text = "Interface  Status [up]; vlan=10 (native) -> ok #1";
        assert_eq!(strip_ansi(text), text);
    }

    #[test]
    fn is_idempotent_for_nested_sequences() {
        // Removing the inner sequence exposes an outer one.
        let raw = "a\x1b\x1b[0m[1mb\x03c";
        let once = strip_ansi(raw);
        assert_eq!(strip_ansi(&once), once);
        assert!(!once.contains('\x1b'));
    }

    #[test]
    fn dos2unix_converts_line_endings() {
        assert_eq!(dos2unix("a\r\nb\r\n"), "a\nb\n");
        assert_eq!(dos2unix("a\rb"), "a\rb");
    }
}
