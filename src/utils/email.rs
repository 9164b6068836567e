/// Splits an address at its last `@` into `(localpart, domain)`.
pub fn split_address(addr: &str) -> (&str, &str) {
    match addr.rfind('@') {
        Some(at) => (&addr[..at], &addr[at + 1..]),
        None => (addr, ""),
    }
}

/// A minimal sanity check: the address must contain exactly one `@` with a
/// non-empty localpart and domain on either side.
pub fn is_valid_address(addr: &str) -> bool {
    let mut parts = addr.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => !local.is_empty() && !domain.is_empty(),
        _ => false,
    }
}

/// How an SMTP address argument can be rejected, mapped by the session onto
/// distinct reply codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    /// The argument never closes with `>`.
    MissingBracket,
    /// Non-whitespace trails the closing `>`.
    TrailingGarbage,
    /// The bracketed text is not a usable address.
    Malformed,
}

/// Parses the argument of `MAIL FROM:` / `RCPT TO:`: an address wrapped in
/// angle brackets, optionally preceded by a display name.
pub fn parse_bracketed_address(raw: &str) -> Result<String, AddressError> {
    let raw = raw.trim();
    let close = raw.find('>').ok_or(AddressError::MissingBracket)?;
    if !raw[close + 1..].trim().is_empty() {
        return Err(AddressError::TrailingGarbage);
    }

    let before = &raw[..close];
    let inner = match before.rfind('<') {
        Some(open) => &before[open + 1..],
        None => before,
    };
    let inner = inner.trim();

    if !is_valid_address(inner) {
        return Err(AddressError::Malformed);
    }
    Ok(inner.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_uses_last_at() {
        assert_eq!(split_address("a@b.test"), ("a", "b.test"));
        assert_eq!(split_address("weird@local@b.test"), ("weird@local", "b.test"));
    }

    #[test]
    fn validity() {
        assert!(is_valid_address("a@b.test"));
        assert!(!is_valid_address("a@"));
        assert!(!is_valid_address("@b.test"));
        assert!(!is_valid_address("nope"));
        assert!(!is_valid_address("two@ats@b.test"));
    }

    #[test]
    fn bracketed_parse() {
        assert_eq!(
            parse_bracketed_address("<a@b.test>").unwrap(),
            "a@b.test"
        );
        assert_eq!(
            parse_bracketed_address("Alice Doe <a@b.test>").unwrap(),
            "a@b.test"
        );
        assert_eq!(
            parse_bracketed_address(" <a@b.test>  ").unwrap(),
            "a@b.test"
        );
    }

    #[test]
    fn bracketed_parse_rejections() {
        assert_eq!(
            parse_bracketed_address("a@b.test"),
            Err(AddressError::MissingBracket)
        );
        assert_eq!(
            parse_bracketed_address("<a@b.test> trailing"),
            Err(AddressError::TrailingGarbage)
        );
        assert_eq!(
            parse_bracketed_address("<not-an-address>"),
            Err(AddressError::Malformed)
        );
        assert_eq!(
            parse_bracketed_address("<@b.test>"),
            Err(AddressError::Malformed)
        );
    }
}
