//! Name normalization for region lookups.
//!
//! Applied symmetrically when the index is built and when a lookup is
//! made, so `"Karnataka"`, `"karnataka "` and `" KARNATAKA"` all reduce to
//! the same key.

/// Normalizes an administrative or city name into a lookup key.
///
/// The pipeline:
/// 1. Lowercase (Unicode case folding)
/// 2. Split on whitespace, dropping leading/trailing runs
/// 3. Re-join with single spaces
#[must_use]
pub fn normalize_name(input: &str) -> String {
    input
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
