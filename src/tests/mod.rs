// src/tests/mod.rs — cross-module scenario tests (spec.md §8 S1-S6),
// placed the way the teacher places `src/tests/redis_retention.rs`:
// focused scenario tests that exercise more than one module together,
// as opposed to the colocated `#[cfg(test)] mod tests` unit tests already
// living inside `pipeline::worker`, `pipeline::discovery`, and
// `cutover::advisor`.

mod parent_child_ordering;
