use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ByteSizeError {
    #[error("byte size passed was empty")]
    Empty,
    #[error("unknown byte multiplier '{0}'")]
    UnknownMultiplier(char),
    #[error("invalid byte count")]
    InvalidNumber(#[from] std::num::ParseIntError),
}

/// Parses a human readable byte size to its byte count.
///
/// A trailing letter selects a binary multiplier (`10M` → 10 · 1024 · 1024);
/// a letterless value is a plain byte count.
pub fn parse_byte_size(size: &str) -> Result<u64, ByteSizeError> {
    let last = size.chars().next_back().ok_or(ByteSizeError::Empty)?;

    if last.is_ascii_alphabetic() {
        let num: u64 = size[..size.len() - last.len_utf8()].parse()?;
        let unit = last.to_ascii_uppercase();
        let index = "KMGTPE"
            .find(unit)
            .ok_or(ByteSizeError::UnknownMultiplier(last))?;
        Ok(num << (10 * (index as u32 + 1)))
    } else {
        Ok(size.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_numbers() {
        assert_eq!(parse_byte_size("0").unwrap(), 0);
        assert_eq!(parse_byte_size("10485760").unwrap(), 10_485_760);
    }

    #[test]
    fn binary_multipliers() {
        assert_eq!(parse_byte_size("1K").unwrap(), 1024);
        assert_eq!(parse_byte_size("10M").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_byte_size("2g").unwrap(), 2 << 30);
        assert_eq!(parse_byte_size("1T").unwrap(), 1 << 40);
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse_byte_size(""), Err(ByteSizeError::Empty));
    }

    #[test]
    fn rejects_unknown_multiplier() {
        assert_eq!(
            parse_byte_size("5X"),
            Err(ByteSizeError::UnknownMultiplier('X'))
        );
    }

    #[test]
    fn rejects_garbage_number() {
        assert!(matches!(
            parse_byte_size("12a4M"),
            Err(ByteSizeError::InvalidNumber(_))
        ));
    }
}
