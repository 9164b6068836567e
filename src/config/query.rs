use crate::error::{Component, Error, ErrorKind, Result};

use super::{Block, Property};

pub type QueryResult<'a> = Vec<&'a Property>;

/// One step of a query path: a key to match, optionally filtered by
/// positional constraints (`key:0=foo,1=bar`).
struct Step {
    key: String,
    constraints: Vec<Constraint>,
}

/// `index=value`: the property's value at `index` must equal `value`.
/// Out-of-range indices never match.
struct Constraint {
    index: usize,
    value: String,
}

fn parse_step(raw: &str) -> Result<Step> {
    let Some((key, rest)) = raw.split_once(':') else {
        return Ok(Step {
            key: raw.to_string(),
            constraints: Vec::new(),
        });
    };

    let mut constraints = Vec::new();
    for part in rest.split(',') {
        let (index, value) = part.split_once('=').ok_or_else(|| {
            Error::new(Component::Config, ErrorKind::InvalidParamConstraint)
                .with_info(format!("Constraint '{part}' in step '{raw}'"))
        })?;
        let index = index.parse().map_err(|_| {
            Error::new(Component::Config, ErrorKind::NonNumericFilter)
                .with_info(format!("Constraint '{part}' in step '{raw}'"))
        })?;
        constraints.push(Constraint {
            index,
            value: value.trim_matches('"').to_string(),
        });
    }
    Ok(Step {
        key: key.to_string(),
        constraints,
    })
}

fn step_matches(property: &Property, step: &Step) -> bool {
    property.key == step.key
        && step
            .constraints
            .iter()
            .all(|c| property.values.get(c.index) == Some(&c.value))
}

/// Walks `path` from `block` and collects every property matched by the
/// final step, in document order.
///
/// Each non-terminal step consumes exactly one nesting level and only
/// descends through properties that actually carry a non-empty block; the
/// terminal step matches properties with and without children.
pub(super) fn query_block<'a>(block: &'a Block, path: &str) -> Result<QueryResult<'a>> {
    let steps = path
        .split_whitespace()
        .map(parse_step)
        .collect::<Result<Vec<_>>>()?;
    Ok(walk(block, &steps))
}

fn walk<'a>(block: &'a Block, steps: &[Step]) -> QueryResult<'a> {
    let mut found = Vec::new();
    match steps {
        [] => {}
        [last] => {
            for property in block {
                if step_matches(property, last) {
                    found.push(property);
                }
            }
        }
        [first, rest @ ..] => {
            for property in block {
                if step_matches(property, first) {
                    if let Some(inner) = &property.block {
                        if !inner.is_empty() {
                            found.extend(walk(inner, rest));
                        }
                    }
                }
            }
        }
    }
    found
}

/// Resolves a query to one value. The final whitespace-separated token of
/// `path` selects the value positionally: `N` picks value N of the first
/// match, `M:N` picks value N of match M.
pub(super) fn query_single(block: &Block, path: &str) -> Result<String> {
    let mut tokens: Vec<&str> = path.split_whitespace().collect();
    let selector = tokens.pop().ok_or_else(|| {
        Error::new(Component::Config, ErrorKind::NonNumericFilter)
            .with_info("Empty query path".to_string())
    })?;

    let (result_index, value_index) = parse_selector(selector)?;

    let matches = walk(
        block,
        &tokens
            .iter()
            .map(|t| parse_step(t))
            .collect::<Result<Vec<_>>>()?,
    );

    let property = matches.get(result_index).ok_or_else(|| {
        Error::new(Component::Config, ErrorKind::TooFewResults).with_info(format!(
            "Asked for result #{} of query '{}' but only {} matched",
            result_index,
            path,
            matches.len()
        ))
    })?;

    property.values.get(value_index).cloned().ok_or_else(|| {
        Error::new(Component::Config, ErrorKind::TooFewValues).with_info(format!(
            "Asked for value #{} of query '{}' but the property has {}",
            value_index,
            path,
            property.values.len()
        ))
    })
}

fn parse_selector(token: &str) -> Result<(usize, usize)> {
    let numeric = |part: &str| {
        part.parse::<usize>().map_err(|_| {
            Error::new(Component::Config, ErrorKind::NonNumericFilter)
                .with_info(format!("Position selector '{token}' is not numeric"))
        })
    };
    match token.split_once(':') {
        Some((result, value)) => Ok((numeric(result)?, numeric(value)?)),
        None => Ok((0, numeric(token)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::super::Config;
    use crate::error::ErrorKind;

    const SAMPLE: &str = "\
domain a.test:
	catch-all postmaster
	user admin:
		box /mail/a/admin
		password plain secret
	user guest:
		box /mail/a/guest
domain b.test:
	user admin:
		box /mail/b/admin
hostname mx.test
";

    fn sample() -> Config {
        Config::parse_str(SAMPLE).unwrap()
    }

    #[test]
    fn terminal_step_collects_in_document_order() {
        let cfg = sample();
        let domains = cfg.query("domain").unwrap();
        assert_eq!(domains.len(), 2);
        assert_eq!(domains[0].values, vec!["a.test"]);
        assert_eq!(domains[1].values, vec!["b.test"]);
    }

    #[test]
    fn path_recurses_one_level_per_step() {
        let cfg = sample();
        let boxes = cfg.query("domain user box").unwrap();
        assert_eq!(boxes.len(), 3);
        assert_eq!(boxes[0].values, vec!["/mail/a/admin"]);
        assert_eq!(boxes[1].values, vec!["/mail/a/guest"]);
        assert_eq!(boxes[2].values, vec!["/mail/b/admin"]);
    }

    #[test]
    fn query_decomposes_per_prefix() {
        // `domain user` must equal the concatenation of `user` applied to
        // each top-level domain block.
        let cfg = sample();
        let all = cfg.query("domain user").unwrap();
        let mut rebuilt = Vec::new();
        for domain in cfg.query("domain").unwrap() {
            let inner = cfg
                .query_sub("user", domain.block.as_ref().unwrap())
                .unwrap();
            rebuilt.extend(inner);
        }
        assert_eq!(all, rebuilt);
    }

    #[test]
    fn constraints_filter_on_value_position() {
        let cfg = sample();
        let matched = cfg.query("domain:0=b.test user box").unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].values, vec!["/mail/b/admin"]);

        assert!(cfg.query("domain:0=c.test user").unwrap().is_empty());
    }

    #[test]
    fn out_of_range_constraint_never_matches() {
        let cfg = sample();
        assert!(cfg.query("domain:5=a.test").unwrap().is_empty());
    }

    #[test]
    fn quoted_constraint_values_compare_unquoted() {
        let cfg = sample();
        let matched = cfg.query("domain:0=\"a.test\"").unwrap();
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn malformed_constraint_is_rejected() {
        let cfg = sample();
        let err = cfg.query("domain:nope user").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParamConstraint);

        let err = cfg.query("domain:x=1 user").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonNumericFilter);
    }

    #[test]
    fn query_single_picks_positional_values() {
        let cfg = sample();
        assert_eq!(cfg.query_single("hostname 0").unwrap(), "mx.test");
        assert_eq!(cfg.query_single("domain 1:0").unwrap(), "b.test");
        assert_eq!(
            cfg.query_single("domain:0=a.test user password 1").unwrap(),
            "secret"
        );
    }

    #[test]
    fn query_single_failure_kinds() {
        let cfg = sample();
        assert_eq!(
            cfg.query_single("hostname x").unwrap_err().kind(),
            ErrorKind::NonNumericFilter
        );
        assert_eq!(
            cfg.query_single("hostname 4:0").unwrap_err().kind(),
            ErrorKind::TooFewResults
        );
        assert_eq!(
            cfg.query_single("hostname 3").unwrap_err().kind(),
            ErrorKind::TooFewValues
        );
        assert_eq!(
            cfg.query_single("absent 0").unwrap_err().kind(),
            ErrorKind::TooFewResults
        );
    }

    #[test]
    fn empty_declared_block_is_not_descended() {
        let cfg = Config::parse_str("domain:\nhostname mx.test\n").unwrap();
        assert!(cfg.query("domain user").unwrap().is_empty());
    }
}
