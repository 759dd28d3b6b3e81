//! Derive the current index of a versioned image family from image names.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

/// Index returned when no image in the family carries a numeric suffix.
pub const DEFAULT_IMAGE_INDEX: u64 = 1;

static TRAILING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)$").expect("valid trailing digits regex"));

/// Highest trailing integer among names starting with `prefix`.
///
/// Names without a trailing integer, or whose integer does not fit in a
/// `u64`, are ignored. With no usable names the result is
/// [`DEFAULT_IMAGE_INDEX`], so a new family can bootstrap. The value is
/// advisory: two concurrent callers can observe the same index.
pub fn max_image_index<'a, I>(names: I, prefix: &str) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    names
        .into_iter()
        .filter(|name| name.starts_with(prefix))
        .filter_map(|name| {
            let digits = TRAILING_DIGITS.captures(name)?.get(1)?.as_str();
            match digits.parse::<u64>() {
                Ok(index) => Some(index),
                Err(err) => {
                    warn!(name, %err, "ignoring image with out-of-range index");
                    None
                }
            }
        })
        .max()
        .unwrap_or(DEFAULT_IMAGE_INDEX)
}
