//! Sample allocation for new panels
//!
//! Every panelist gets a kit of three coded samples: two of one product and
//! one of the other. Product order alternates per kit so the panel as a whole
//! stays balanced; which product leads is decided once per panel by a coin
//! flip so product A is not systematically the odd one.

use rand::seq::index;
use rand::Rng;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use tasex_common::{Error, Result};

/// Codes printed on the cups
pub const CODE_RANGE: RangeInclusive<u16> = 1000..=9999;

/// Samples per kit
pub const SAMPLES_PER_SET: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedSample {
    pub product_id: i64,
    pub code: u16,
}

/// One planned kit, before it is written to the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedSampleSet {
    pub samples: [AllocatedSample; SAMPLES_PER_SET],
}

impl AllocatedSampleSet {
    /// Product appearing once in this kit
    pub fn odd_product(&self) -> i64 {
        let first = self.samples[0].product_id;
        let same_as_first = self.samples.iter().filter(|s| s.product_id == first).count();
        if same_as_first == 1 {
            first
        } else {
            // Alternating layout: the odd product sits in the middle
            self.samples[1].product_id
        }
    }
}

/// Plan `planned_panelists` kits for a panel
///
/// `taken` holds codes already used by other panels; they are never reissued.
/// Fails with [`Error::CodeRangeExhausted`] instead of reusing codes.
pub fn allocate<R: Rng + ?Sized>(
    rng: &mut R,
    planned_panelists: u16,
    product_a: i64,
    product_b: i64,
    taken: &HashSet<u16>,
) -> Result<Vec<AllocatedSampleSet>> {
    if product_a == product_b {
        return Err(Error::InvalidInput(
            "An experiment needs two distinct products".to_string(),
        ));
    }

    let kits = planned_panelists as usize;
    let requested = kits * SAMPLES_PER_SET;

    let free: Vec<u16> = CODE_RANGE.filter(|code| !taken.contains(code)).collect();
    if requested > free.len() {
        return Err(Error::CodeRangeExhausted {
            requested,
            available: free.len(),
        });
    }

    // Draw without replacement
    let codes: Vec<u16> = index::sample(rng, free.len(), requested)
        .into_iter()
        .map(|i| free[i])
        .collect();

    let mut products = [product_a, product_b];
    if rng.gen::<bool>() {
        products.reverse();
    }

    let sets = (0..kits)
        .map(|i| {
            let sample = |j: usize| AllocatedSample {
                product_id: products[(i + j) % 2],
                code: codes[SAMPLES_PER_SET * i + j],
            };
            AllocatedSampleSet {
                samples: [sample(0), sample(1), sample(2)],
            }
        })
        .collect();

    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const A: i64 = 11;
    const B: i64 = 22;

    fn product_counts(sets: &[AllocatedSampleSet]) -> (usize, usize) {
        let all = sets.iter().flat_map(|s| s.samples.iter());
        let a = all.clone().filter(|s| s.product_id == A).count();
        let b = all.filter(|s| s.product_id == B).count();
        (a, b)
    }

    #[test]
    fn test_even_panelists_are_balanced() {
        let mut rng = StdRng::seed_from_u64(7);
        let sets = allocate(&mut rng, 6, A, B, &HashSet::new()).unwrap();

        assert_eq!(sets.len(), 6);
        let (a, b) = product_counts(&sets);
        assert_eq!(a + b, 18);
        assert_eq!(a, b);
    }

    #[test]
    fn test_odd_panelists_differ_by_one() {
        let mut rng = StdRng::seed_from_u64(7);
        let sets = allocate(&mut rng, 7, A, B, &HashSet::new()).unwrap();

        let (a, b) = product_counts(&sets);
        assert_eq!(a + b, 21);
        assert_eq!(a.abs_diff(b), 1);
    }

    #[test]
    fn test_codes_unique_and_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let sets = allocate(&mut rng, 500, A, B, &HashSet::new()).unwrap();

        let codes: HashSet<u16> = sets
            .iter()
            .flat_map(|s| s.samples.iter().map(|x| x.code))
            .collect();
        assert_eq!(codes.len(), 1500);
        assert!(codes.iter().all(|c| CODE_RANGE.contains(c)));
    }

    #[test]
    fn test_every_set_has_single_odd_sample() {
        let mut rng = StdRng::seed_from_u64(3);
        let sets = allocate(&mut rng, 9, A, B, &HashSet::new()).unwrap();

        for set in &sets {
            let odd = set.odd_product();
            let odd_count = set.samples.iter().filter(|s| s.product_id == odd).count();
            assert_eq!(odd_count, 1);
        }
    }

    #[test]
    fn test_odd_product_alternates_between_sets() {
        let mut rng = StdRng::seed_from_u64(5);
        let sets = allocate(&mut rng, 4, A, B, &HashSet::new()).unwrap();

        assert_ne!(sets[0].odd_product(), sets[1].odd_product());
        assert_eq!(sets[0].odd_product(), sets[2].odd_product());
    }

    #[test]
    fn test_leading_product_depends_on_coin_flip() {
        let leaders: HashSet<i64> = (0..64)
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let sets = allocate(&mut rng, 1, A, B, &HashSet::new()).unwrap();
                sets[0].odd_product()
            })
            .collect();

        assert_eq!(leaders.len(), 2, "both products should lead for some panel");
    }

    #[test]
    fn test_taken_codes_are_skipped() {
        let taken: HashSet<u16> = (1000..=9990).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let sets = allocate(&mut rng, 3, A, B, &taken).unwrap();

        for sample in sets.iter().flat_map(|s| s.samples.iter()) {
            assert!(sample.code > 9990);
        }
    }

    #[test]
    fn test_exhausted_range_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = allocate(&mut rng, 3001, A, B, &HashSet::new()).unwrap_err();

        assert!(matches!(
            err,
            Error::CodeRangeExhausted { requested: 9003, available: 9000 }
        ));
    }

    #[test]
    fn test_zero_panelists_allocates_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(allocate(&mut rng, 0, A, B, &HashSet::new()).unwrap().is_empty());
    }

    #[test]
    fn test_identical_products_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            allocate(&mut rng, 2, A, A, &HashSet::new()),
            Err(Error::InvalidInput(_))
        ));
    }
}
