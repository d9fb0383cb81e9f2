//! Binary-coded decimal fields used by the vendor driver.

/// Decode packed BCD digits into an integer, one decimal digit per nibble.
///
/// Nibbles above 9 are not valid BCD; they are clamped to 9 so a corrupt
/// field still yields a bounded number.
#[must_use]
pub fn decode(value: u64) -> u64 {
    let mut result = 0;
    let mut scale = 1;
    let mut rest = value;
    while rest != 0 {
        result += (rest & 0xF).min(9) * scale;
        scale *= 10;
        rest >>= 4;
    }
    result
}

/// Format a `XX.XX` BCD version word, e.g. `0x0412` as `4.12`.
#[must_use]
pub fn version(value: u16) -> String {
    format!("{:x}.{:02x}", value >> 8, value & 0xFF)
}

/// Decode a `XX.XX` BCD value.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bcd2_2(value: u16) -> f64 {
    decode(u64::from(value)) as f64 / 100.0
}

/// Decode a `XXXXXX.XX` BCD value.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bcd6_2(value: u64) -> f64 {
    decode(value & 0xFFFF_FFFF) as f64 / 100.0
}
