//! Weighted random selection and seed helpers.
//!
//! Everything here is a pure function of its inputs so graph nodes can run it
//! per point on worker threads and still produce identical results for the
//! same execution seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Anything that can take part in a weighted pick.
pub trait Weighted {
    fn weight(&self) -> i32;
}

/// Sum of all weights. Negative weights count as zero.
pub fn total_weight<T: Weighted>(items: &[T]) -> i32 {
    items
        .iter()
        .fold(0i32, |acc, item| acc.saturating_add(item.weight().max(0)))
}

/// Pick an index from `items` proportionally to weight.
///
/// `total_weight` may be passed when the caller already computed it for a
/// whole batch of points. A total of 1 or less short-circuits to the last
/// item without drawing from `rng`.
pub fn select_random_index<T: Weighted, R: Rng + ?Sized>(
    items: &[T],
    rng: &mut R,
    total_weight: Option<i32>,
) -> Option<usize> {
    if items.is_empty() {
        return None;
    }
    let last = items.len() - 1;

    let total = total_weight.unwrap_or_else(|| self::total_weight(items));
    if total <= 1 {
        return Some(last);
    }

    let draw = rng.gen_range(0..total);
    let mut cumulative = 0i32;
    for (index, item) in items.iter().enumerate() {
        cumulative = cumulative.saturating_add(item.weight().max(0));
        if cumulative > draw {
            return Some(index);
        }
    }

    // Only reachable when the supplied total is larger than the real sum
    Some(last)
}

/// Same as [`select_random_index`] but returns the item itself.
pub fn select_random<'a, T: Weighted, R: Rng + ?Sized>(
    items: &'a [T],
    rng: &mut R,
    total_weight: Option<i32>,
) -> Option<&'a T> {
    select_random_index(items, rng, total_weight).map(|index| &items[index])
}

/// Mix two seeds into one (execution seed + point seed, layer seed + point seed).
#[inline]
pub fn combine_seed(a: i32, b: i32) -> i32 {
    ((a as u32).wrapping_mul(196_314_165).wrapping_add(907_633_515) ^ (b as u32)) as i32
}

/// Deterministic RNG for one point / one node execution.
#[inline]
pub fn seeded_rng(seed: i32) -> StdRng {
    StdRng::seed_from_u64(seed as u32 as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item(i32);

    impl Weighted for Item {
        fn weight(&self) -> i32 {
            self.0
        }
    }

    #[test]
    fn test_empty_list_selects_nothing() {
        let mut rng = seeded_rng(1);
        let items: Vec<Item> = Vec::new();
        assert_eq!(select_random_index(&items, &mut rng, None), None);
    }

    #[test]
    fn test_degenerate_total_returns_last() {
        let items = vec![Item(1), Item(0), Item(0)];

        // Total of 1 never draws, whatever the seed
        for seed in 0..64 {
            let mut rng = seeded_rng(seed);
            assert_eq!(select_random_index(&items, &mut rng, None), Some(2));
        }

        // Caller-provided total wins over the real sum
        let heavy = vec![Item(50), Item(50)];
        let mut rng = seeded_rng(7);
        assert_eq!(select_random_index(&heavy, &mut rng, Some(0)), Some(1));
    }

    #[test]
    fn test_uniform_distribution() {
        let items = vec![Item(1), Item(1), Item(1), Item(1)];
        let mut rng = seeded_rng(12345);
        let mut counts = [0usize; 4];

        const DRAWS: usize = 100_000;
        for _ in 0..DRAWS {
            let index = select_random_index(&items, &mut rng, None).unwrap();
            counts[index] += 1;
        }

        let expected = DRAWS as f64 / items.len() as f64;
        for count in counts {
            let deviation = (count as f64 - expected).abs() / expected;
            assert!(deviation < 0.05, "count {} deviates {:.3}", count, deviation);
        }
    }

    #[test]
    fn test_weights_respected() {
        // Item 1 carries 3/4 of the weight
        let items = vec![Item(1), Item(3)];
        let mut rng = seeded_rng(99);
        let hits = (0..40_000)
            .filter(|_| select_random_index(&items, &mut rng, None) == Some(1))
            .count();
        let ratio = hits as f64 / 40_000.0;
        assert!((ratio - 0.75).abs() < 0.02, "ratio {}", ratio);
    }

    #[test]
    fn test_same_seed_same_pick() {
        let items = vec![Item(2), Item(5), Item(9), Item(1)];
        let seed = combine_seed(42, 1337);
        let a = select_random_index(&items, &mut seeded_rng(seed), None);
        let b = select_random_index(&items, &mut seeded_rng(seed), None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_combine_seed_mixes_both_inputs() {
        assert_ne!(combine_seed(1, 2), combine_seed(2, 1));
        assert_ne!(combine_seed(1, 2), combine_seed(1, 3));
        assert_eq!(combine_seed(-5, 17), combine_seed(-5, 17));
    }
}
