/// Raised when a quoted atom is opened but never closed on the same line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmatchedQuote;

/// Splits a space-separated line into atoms, merging runs of tokens that
/// together form a double-quoted string. The surrounding quotes are stripped
/// from the merged atom.
///
/// `a "b c" d` → `["a", "b c", "d"]`
pub fn split_quotes(input: &str) -> Result<Vec<String>, UnmatchedQuote> {
    let parts: Vec<&str> = input.trim().split(' ').collect();

    let mut atoms = Vec::new();
    let mut left = 0;
    while left < parts.len() {
        let part = parts[left];
        if !part.starts_with('"') {
            if !part.is_empty() {
                atoms.push(part.to_string());
            }
            left += 1;
            continue;
        }

        // Scan right for the token that closes the quote. The opening token
        // itself may close it (`"single"`).
        let mut right = left;
        loop {
            match parts.get(right) {
                None => return Err(UnmatchedQuote),
                Some(p) if p.ends_with('"') => break,
                Some(_) => right += 1,
            }
        }

        let full = parts[left..=right].join(" ");
        atoms.push(full.trim_matches('"').to_string());
        left = right + 1;
    }

    Ok(atoms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_atoms() {
        assert_eq!(
            split_quotes("user admin secret").unwrap(),
            vec!["user", "admin", "secret"]
        );
    }

    #[test]
    fn quoted_atom_merges_spaces() {
        assert_eq!(
            split_quotes(r#"motd "Hello there, friend" plain"#).unwrap(),
            vec!["motd", "Hello there, friend", "plain"]
        );
    }

    #[test]
    fn single_token_quotes_are_stripped() {
        assert_eq!(split_quotes(r#"key "value""#).unwrap(), vec!["key", "value"]);
    }

    #[test]
    fn unterminated_quote_fails() {
        assert_eq!(
            split_quotes(r#"key "never closed"#),
            Err(UnmatchedQuote)
        );
    }

    #[test]
    fn repeated_spaces_are_collapsed() {
        assert_eq!(split_quotes("a   b").unwrap(), vec!["a", "b"]);
    }
}
