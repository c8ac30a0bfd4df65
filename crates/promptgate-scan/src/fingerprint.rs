//! Request fingerprinting: a stable hash over the canonical form of a
//! scannable text, used as the `ScanCache` key so identical texts across
//! different clients share a verdict.

use unicode_normalization::UnicodeNormalization;

/// An opaque, content-addressed key. Two texts that canonicalize to the
/// same form produce the same fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex_encode(&self.0))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// NFC-normalize and collapse runs of whitespace to a single ASCII space,
/// trimming the ends. This is the canonical form the fingerprint hashes.
pub fn canonicalize(text: &str) -> String {
    let normalized: String = text.nfc().collect();
    let mut out = String::with_capacity(normalized.len());
    let mut last_was_space = false;
    for c in normalized.chars() {
        if c.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Fingerprint `text` for use as a `ScanCache` key.
pub fn fingerprint(text: &str) -> Fingerprint {
    let canonical = canonicalize(text);
    Fingerprint(*blake3::hash(canonical.as_bytes()).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_differences_collapse() {
        assert_eq!(fingerprint("hello   world"), fingerprint("hello world"));
        assert_eq!(fingerprint("  hello world  "), fingerprint("hello world"));
        assert_eq!(fingerprint("hello\tworld\n"), fingerprint("hello world"));
    }

    #[test]
    fn nfc_equivalent_forms_match() {
        // "é" as a single precomposed code point vs "e" + combining acute.
        let precomposed = "caf\u{00E9}";
        let decomposed = "cafe\u{0301}";
        assert_eq!(fingerprint(precomposed), fingerprint(decomposed));
    }

    #[test]
    fn distinct_text_gives_distinct_fingerprint() {
        assert_ne!(fingerprint("hello"), fingerprint("goodbye"));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn canonicalization_is_idempotent(s in ".*") {
                let once = canonicalize(&s);
                prop_assert_eq!(canonicalize(&once), once.clone());
            }

            #[test]
            fn surrounding_whitespace_never_changes_the_fingerprint(s in "[a-z ]{0,64}") {
                let padded = format!("  {s}\t\n");
                prop_assert_eq!(fingerprint(&padded), fingerprint(&s));
            }
        }
    }
}
