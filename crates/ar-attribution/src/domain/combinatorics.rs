//! Stars-and-bars helpers for randomized response.
//!
//! An output state of the randomized-response mechanism is an arrangement of
//! `k` stars (reports) and `c·w` bars (trigger-data × window slots). States
//! are enumerated with the combinatorial number system so a uniform index can
//! be decoded without materializing the state space.

/// `C(n, k)`, saturating at `u64::MAX`. Zero when `k > n`.
pub fn binomial(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 0..k {
        // Exact at every step: the running product is C(n, i + 1).
        result = result * u128::from(n - i) / u128::from(i + 1);
        if result > u128::from(u64::MAX) {
            return u64::MAX;
        }
    }
    result as u64
}

/// Decodes `index` into the k-combination at that position, in descending
/// order (`c_k > ... > c_1 >= 0`).
pub fn k_combination_at_index(index: u64, k: u64) -> Vec<u64> {
    let mut combination = Vec::with_capacity(k as usize);
    let mut remaining = index;

    for i in (1..=k).rev() {
        // Largest c with C(c, i) <= remaining.
        let mut c = i - 1;
        while binomial(c + 1, i) <= remaining {
            c += 1;
        }
        combination.push(c);
        remaining -= binomial(c, i);
    }

    combination
}

/// For star positions in descending order, counts the bars preceding each
/// star.
pub fn bars_preceding_each_star(star_indices: &[u64]) -> Vec<u64> {
    let num_stars = star_indices.len() as u64;
    star_indices
        .iter()
        .enumerate()
        .map(|(i, star)| star - (num_stars - 1 - i as u64))
        .collect()
}
