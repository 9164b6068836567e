use super::{Block, Property};

/// Renders a block tree back into parseable configuration text, one tab per
/// nesting level. Comments and resolved includes are not reconstructed.
pub(super) fn dump(block: &Block) -> String {
    let mut out = String::new();
    dump_block(&mut out, block, 0);
    out
}

fn dump_block(out: &mut String, block: &Block, level: usize) {
    for property in block {
        dump_property(out, property, level);
    }
}

fn dump_property(out: &mut String, property: &Property, level: usize) {
    for _ in 0..level {
        out.push('\t');
    }
    out.push_str(&property.key);
    for value in &property.values {
        out.push(' ');
        push_atom(out, value);
    }
    match &property.block {
        Some(inner) => {
            out.push_str(":\n");
            dump_block(out, inner, level + 1);
        }
        None => out.push('\n'),
    }
}

/// Writes a value, quoting it whenever re-parsing would otherwise split or
/// reinterpret it.
fn push_atom(out: &mut String, value: &str) {
    let escaped = value.replace('#', "\\#");
    if value.is_empty() || value.contains(' ') || value.ends_with(':') {
        out.push('"');
        out.push_str(&escaped);
        out.push('"');
    } else {
        out.push_str(&escaped);
    }
}

#[cfg(test)]
mod tests {
    use super::super::Config;

    #[test]
    fn round_trip_preserves_structure() {
        let text = "\
bind localhost mx.test 127.0.0.1
motd \"You have reached meiru\"
domain a.test:
	catch-all postmaster
	user admin:
		box /mail/a/admin
		password plain \"sup er secret\"
empty:
tag \\#notacomment
";
        let cfg = Config::parse_str(text).unwrap();
        let reparsed = Config::parse_str(&cfg.dump()).unwrap();
        assert_eq!(cfg.data, reparsed.data);
    }

    #[test]
    fn dump_is_stable() {
        let cfg = Config::parse_str("a 1\nb:\n\tc 2\n").unwrap();
        let once = cfg.dump();
        let twice = Config::parse_str(&once).unwrap().dump();
        assert_eq!(once, twice);
    }
}
