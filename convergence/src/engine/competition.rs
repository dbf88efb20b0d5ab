//! Uptree competition — deterministic winner selection.

use std::cmp::Ordering;

use crate::chunk::Chunk;

/// Select the winning chunk: maximum weight, ties broken by higher
/// confidence, remaining ties by the lexicographically first processor
/// name. Returns `None` for an empty round.
///
/// The ordering is total over any chunk set with unique processor names,
/// so the same set always yields the same winner regardless of arrival
/// order.
pub fn select_winner(chunks: &[Chunk]) -> Option<&Chunk> {
    chunks.iter().max_by(|a, b| {
        a.weight()
            .partial_cmp(&b.weight())
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                a.confidence()
                    .partial_cmp(&b.confidence())
                    .unwrap_or(Ordering::Equal)
            })
            // Reversed name comparison: the *smaller* name wins the max.
            .then_with(|| b.processor_name.cmp(&a.processor_name))
    })
}
