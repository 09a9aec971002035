//! Address codec
//!
//! Converts between the textual address forms used on the console and the raw
//! byte arrays stored in the configuration record.
//!
//! Parsing is lenient: it never fails. Every segment contributes its leading
//! digits, a segment without digits becomes `0`, values wrap modulo 256 and
//! missing segments are zero filled. Malformed input is reported with a
//! warning only.

use log::warn;

/// Parse a dotted-quad string such as `192.168.1.10` into 4 bytes
pub fn parse_dotted_quad(text: &str) -> [u8; 4] {
    let (bytes, well_formed) = parse_segments::<4>(text, '.', 10);

    if !well_formed {
        warn!("lenient parse of malformed address {text:?} -> {bytes:?}");
    }

    bytes
}

/// Format 4 bytes as a dotted-quad string
pub fn format_dotted_quad(bytes: &[u8; 4]) -> String {
    format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
}

/// Parse a dash separated hardware address such as `DE-AD-BE-EF-00-01` into 6 bytes
pub fn parse_hardware_address(text: &str) -> [u8; 6] {
    let (bytes, well_formed) = parse_segments::<6>(text, '-', 16);

    if !well_formed {
        warn!("lenient parse of malformed hardware address {text:?} -> {bytes:02X?}");
    }

    bytes
}

/// Format 6 bytes as an uppercase, dash separated hardware address
pub fn format_hardware_address(bytes: &[u8; 6]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join("-")
}

fn parse_segments<const N: usize>(text: &str, separator: char, radix: u32) -> ([u8; N], bool) {
    let mut bytes = [0u8; N];
    let mut well_formed = true;
    let mut segments = text.split(separator);

    for byte in bytes.iter_mut() {
        let Some(segment) = segments.next() else {
            well_formed = false;
            break;
        };

        let (value, exact) = leading_number(segment.trim(), radix);
        *byte = value as u8;
        well_formed &= exact && value <= u8::MAX as u32;
    }

    if segments.next().is_some() {
        well_formed = false;
    }

    (bytes, well_formed)
}

/// Accumulate the leading digits of `segment`, returning the value and whether
/// the whole segment was a non-empty digit run.
fn leading_number(segment: &str, radix: u32) -> (u32, bool) {
    let mut value: u32 = 0;
    let mut digits = 0;

    for digit in segment.chars().map_while(|c| c.to_digit(radix)) {
        value = value.wrapping_mul(radix).wrapping_add(digit);
        digits += 1;
    }

    (value, digits > 0 && digits == segment.chars().count())
}
