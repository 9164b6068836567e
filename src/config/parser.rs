use std::path::Path;

use crate::error::{Component, Error, ErrorKind, Result};
use crate::utils::split_quotes;

use super::{Block, Property};

/// Parses configuration text into a block tree.
///
/// Nesting is driven entirely by indentation: every leading whitespace
/// character (tab or space alike) is one level. A line may be at most one
/// level deeper than the previous block header; anything deeper is an
/// indent mismatch.
pub(super) fn parse(origin: &Path, text: &str) -> Result<Block> {
    // Stack of open blocks, root at the bottom. Popped levels attach to the
    // last property of the level below, which is the header that opened them.
    let mut levels: Vec<Vec<Property>> = vec![Vec::new()];

    for (index, raw) in text.lines().enumerate() {
        let lineno = index + 1;
        let line = strip_comment(raw);
        let line = line.trim_end();

        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            continue;
        }

        let is_block = trimmed.ends_with(':');
        let content = trimmed.trim_end_matches(':');
        let indent = line.chars().take_while(|c| c.is_whitespace()).count();

        if indent >= levels.len() {
            return Err(Error::new(Component::Config, ErrorKind::IndentMismatch)
                .with_info(format!("File {} Line {}", origin.display(), lineno)));
        }

        while levels.len() > indent + 1 {
            attach_top(&mut levels);
        }

        let atoms = split_quotes(content).map_err(|_| {
            Error::new(Component::Config, ErrorKind::UnmatchedQuote)
                .with_info(format!("File {} Line {}", origin.display(), lineno))
        })?;
        let Some((key, values)) = atoms.split_first() else {
            continue;
        };

        levels[indent].push(Property {
            key: key.clone(),
            values: values.to_vec(),
            block: is_block.then(Vec::new),
        });
        if is_block {
            levels.push(Vec::new());
        }
    }

    while levels.len() > 1 {
        attach_top(&mut levels);
    }
    Ok(levels.pop().unwrap_or_default())
}

/// Pops the innermost open block and stores it in the header property that
/// opened it.
fn attach_top(levels: &mut Vec<Vec<Property>>) {
    let block = levels.pop().expect("level stack never empty");
    let parent = levels
        .last_mut()
        .and_then(|level| level.last_mut())
        .expect("a popped level always has a header below it");
    parent.block = Some(block);
}

/// Discards everything from the first unescaped `#` onward and turns `\#`
/// into a literal hash.
fn strip_comment(line: &str) -> String {
    let mut cut = line.len();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if c == '#' && !escaped {
            cut = i;
            break;
        }
        escaped = c == '\\';
    }
    line[..cut].replace("\\#", "#")
}
