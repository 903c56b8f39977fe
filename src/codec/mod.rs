//! Text helpers shared by every parser: legacy decoding, diacritic folding,
//! CNPJ and number normalization.

pub mod dates;
pub mod hash;

pub use dates::{Clock, FixedClock, SystemClock};
pub use hash::{Fnv1a32, KeyHasher};

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Decode a single-byte legacy (Latin-1 family) buffer to UTF-8
pub fn decode_latin1(bytes: &[u8]) -> String {
    let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Remove diacritics: decompose, drop combining marks, recompose
pub fn strip_diacritics(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect()
}

/// Lower-cased, diacritic-free key used for case-insensitive matching
pub fn fold(text: &str) -> String {
    strip_diacritics(text).to_lowercase()
}

/// Keep only the 14 digits of a CNPJ (`00.000.000/0001-91` -> `00000000000191`)
pub fn cnpj_digits(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == 14).then_some(digits)
}

/// Parse a Brazilian currency string such as `1.234,56`
pub fn parse_brl(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("R$")
        .trim()
        .replace('.', "")
        .replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Parse a plain decimal, accepting either `.` or `,` as separator
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .parse()
        .ok()
        .or_else(|| trimmed.replace(',', ".").parse().ok())
}
