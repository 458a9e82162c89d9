//! Plate / UID text normalization

/// Literal the recognition service returns when no plate was found
pub const NO_PLATE_SENTINEL: &str = "NoPlate";

/// Normalize a license plate for comparison
///
/// Strips whitespace, `.` and `-`, then uppercases.
/// `normalize_plate("51F-123.45") == normalize_plate("51f12345")`
pub fn normalize_plate(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '.' && *c != '-')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Normalize an RFID UID as reported by the reader ("a1:b2 c3" -> "A1B2C3")
pub fn normalize_uid(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .flat_map(char::to_uppercase)
        .collect()
}

/// True when a recognizer reading carries no usable plate
pub fn is_no_plate(reading: &str) -> bool {
    let trimmed = reading.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NO_PLATE_SENTINEL)
}
