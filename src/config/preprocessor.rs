use std::path::Path;

use crate::error::{Component, Error, ErrorKind, Result};

use super::{Block, Config};

/// Resolves `@`-directives in a freshly parsed block. Directives only exist
/// at the top level of each file; after this pass no `@`-keys remain.
pub(super) fn process(origin: &Path, block: Block) -> Result<Block> {
    let pwd = origin.parent().unwrap_or_else(|| Path::new("."));

    let mut out = Vec::with_capacity(block.len());
    for property in block {
        let Some(directive) = property.key.strip_prefix('@') else {
            out.push(property);
            continue;
        };

        match directive {
            "include" => {
                if property.values.is_empty() {
                    return Err(
                        Error::new(Component::Config, ErrorKind::MissingParameter).with_info(
                            format!("Directive @include in file {} needs a path", origin.display()),
                        ),
                    );
                }
                for value in &property.values {
                    // Loading recursively also preprocesses the included
                    // file, so nested includes resolve against their own
                    // directory.
                    let included = Config::load(pwd.join(value))?;
                    out.extend(included.data);
                }
            }
            other => {
                return Err(
                    Error::new(Component::Config, ErrorKind::UnknownDirective).with_info(format!(
                        "Directive @{} in file {}",
                        other,
                        origin.display()
                    )),
                );
            }
        }
    }

    Ok(out)
}
