//! dynamo/errors.rs
//!
//! Centralizes the fragile string-matching predicates spec.md §9 flags as a
//! known limitation: DynamoDB Streams' `TrimmedDataAccessException` doesn't
//! always surface as a distinct error variant through every SDK call path,
//! and Spanner's parent-row-missing condition has no dedicated error kind
//! at all. One function per predicate, so hardening later (swapping a
//! substring check for an SDK error-kind discriminant) touches one place.

/// True if `err` represents (or wraps) a `TrimmedDataAccessException`.
pub fn is_trimmed_data_access(err: &dyn std::error::Error) -> bool {
    error_chain_contains(err, "TrimmedDataAccessException")
}

fn error_chain_contains(err: &dyn std::error::Error, needle: &str) -> bool {
    let mut current: Option<&dyn std::error::Error> = Some(err);
    while let Some(e) = current {
        if e.to_string().contains(needle) {
            return true;
        }
        current = e.source();
    }
    false
}
