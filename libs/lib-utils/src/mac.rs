//! Hardware address helpers.
//!
//! Radios report addresses in whatever form the platform prefers. Everything
//! downstream works with the canonical `AA:BB:CC:DD:EE:FF` form.

const OCTETS: usize = 6;

/// Normalize a hardware address to upper-case, colon separated form.
///
/// Accepts `:` or `-` separators. Returns `None` for anything that is not
/// exactly six hex octets.
pub fn normalize(address: &str) -> Option<String> {
    let address = address.trim();
    if address.is_empty() {
        return None;
    }

    let parts: Vec<&str> = address.split([':', '-']).collect();
    if parts.len() != OCTETS {
        return None;
    }

    let mut octets = Vec::with_capacity(OCTETS);
    for part in parts {
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let value = u8::from_str_radix(part, 16).ok()?;
        octets.push(format!("{:02X}", value));
    }

    Some(octets.join(":"))
}

pub fn is_valid(address: &str) -> bool {
    normalize(address).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercase_colon() {
        assert_eq!(
            normalize("aa:bb:cc:0d:ee:ff").as_deref(),
            Some("AA:BB:CC:0D:EE:FF")
        );
    }

    #[test]
    fn test_normalize_dash_separated() {
        assert_eq!(
            normalize(" 01-23-45-67-89-ab ").as_deref(),
            Some("01:23:45:67:89:AB")
        );
    }

    #[test]
    fn test_normalize_rejects_malformed() {
        assert!(normalize("").is_none());
        assert!(normalize("AA:BB:CC:DD:EE").is_none());
        assert!(normalize("AA:BB:CC:DD:EE:FF:00").is_none());
        assert!(normalize("AA:BB:CC:DD:EE:GG").is_none());
        assert!(normalize("A:BB:CC:DD:EE:FF").is_none());
        assert!(!is_valid("not-a-mac"));
    }
}
