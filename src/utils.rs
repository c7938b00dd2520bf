use std::fmt::Write;

/// Renders raw bytes as space-separated upper-case hex
pub fn format_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i != 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", byte);
    }
    out
}

/// Renders an attribute value as `hex | "text"`, escaping anything unprintable.
pub fn format_value(bytes: &[u8]) -> String {
    let text: String = bytes
        .iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect();
    format!("{} | \"{}\"", format_bytes(bytes), text)
}
