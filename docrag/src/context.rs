//! Token-budgeted context packing.

use crate::document::RetrievalResult;

/// Greedily selects the longest prefix of a ranked list whose summed token
/// estimate fits the budget.
///
/// Packing stops at the first chunk that would overflow the budget, even if
/// a later, smaller chunk would fit: a higher-ranked chunk is never dropped in
/// favour of a lower-ranked one, and the output order is the input order.
#[derive(Debug, Clone, Copy)]
pub struct ContextPacker {
    max_tokens: usize,
}

impl ContextPacker {
    /// Create a packer with the given token budget.
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// The token budget.
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Return the packed prefix of `ranked`.
    pub fn pack<'a>(&self, ranked: &'a [RetrievalResult]) -> &'a [RetrievalResult] {
        let mut used = 0usize;
        let mut count = 0;
        for result in ranked {
            let next = used.saturating_add(result.chunk.token_count);
            if next > self.max_tokens {
                break;
            }
            used = next;
            count += 1;
        }
        &ranked[..count]
    }

    /// Summed token estimate of a packed slice.
    pub fn token_total(packed: &[RetrievalResult]) -> usize {
        packed.iter().map(|r| r.chunk.token_count).sum()
    }
}
