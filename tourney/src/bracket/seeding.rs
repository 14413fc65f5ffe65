//! Seed placement helpers.

/// Bracket size for `n` entrants: the next power of two, at least 2.
pub fn bracket_size(n: usize) -> usize {
    n.max(2).next_power_of_two()
}

/// Number of rounds needed to reduce `n` entrants to one.
pub fn round_count(n: usize) -> u32 {
    bracket_size(n).trailing_zeros()
}

/// Standard bracket order for a bracket of `size` slots (a power of two).
///
/// Adjacent pairs are round-one opponents: `[1, 8, 4, 5, 2, 7, 3, 6]` for 8.
/// Seeds 1 and 2 can only meet in the final, seeds 1-4 only in the semifinals.
pub fn standard_order(size: usize) -> Vec<usize> {
    let mut order = vec![1];
    let mut width = 1;

    while width < size {
        width *= 2;
        order = order
            .into_iter()
            .flat_map(|seed| [seed, width + 1 - seed])
            .collect();
    }

    order
}
