use std::collections::BTreeSet;

use crate::{errors::Error, Result};

/// Parse a menu selection such as `1,3-5,8` into sorted, unique 1-based
/// indices no greater than `max`.
pub fn parse_selection(input: &str, max: usize) -> Result<Vec<usize>> {
    let mut picked = BTreeSet::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_index(start, max)?;
                let end = parse_index(end, max)?;
                if start > end {
                    return Err(Error::InvalidInput(format!("inverted range '{part}'")));
                }
                picked.extend(start..=end);
            }
            None => {
                picked.insert(parse_index(part, max)?);
            }
        }
    }
    if picked.is_empty() {
        return Err(Error::InvalidInput("nothing selected".to_string()));
    }
    Ok(picked.into_iter().collect())
}

fn parse_index(raw: &str, max: usize) -> Result<usize> {
    let raw = raw.trim();
    let n: usize = raw
        .parse()
        .map_err(|_| Error::InvalidInput(format!("'{raw}' is not a number")))?;
    if n == 0 || n > max {
        return Err(Error::InvalidInput(format!("{n} is out of range 1-{max}")));
    }
    Ok(n)
}
