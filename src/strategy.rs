//! Ordered fallback chains.
//!
//! Date inference and per-page text selection both try a fixed list of
//! strategies in order and keep the first one that produces a value.

/// Run each strategy in order and return the first `Some`.
///
/// Later strategies are not evaluated once one succeeds, so expensive
/// fallbacks (OCR) belong at the end of the list.
pub fn first_some<T>(strategies: &[&dyn Fn() -> Option<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy())
}
