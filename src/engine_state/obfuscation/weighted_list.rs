//! Weighted random selection.

use crate::errors::{ObfuscationError, Result};

/// An immutable, ordered list of items with positive weights.
///
/// The total weight is computed once at construction and is the exact sum of
/// the stored weights, so a draw always lands on an element.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedList<T> {
    entries: Vec<(T, f64)>,
    total_weight: f64,
}

impl<T> WeightedList<T> {
    /// Builds a list from `(item, weight)` pairs, keeping their order.
    ///
    /// # Errors
    /// `EmptyWeightedList` if `entries` is empty, `InvalidWeight` if any weight is
    /// not finite or not strictly positive.
    pub fn new(entries: Vec<(T, f64)>) -> Result<Self> {
        if entries.is_empty() {
            return Err(ObfuscationError::EmptyWeightedList);
        }
        for (index, (_, weight)) in entries.iter().enumerate() {
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(ObfuscationError::InvalidWeight {
                    index,
                    weight: *weight,
                });
            }
        }
        let total_weight = entries.iter().map(|(_, weight)| weight).sum();

        Ok(WeightedList {
            entries,
            total_weight,
        })
    }

    /// Draws one item, each with probability `weight / total_weight`.
    pub fn get(&self, rng: &mut fastrand::Rng) -> &T {
        let mut remainder = rng.f64() * self.total_weight;
        for (item, weight) in &self.entries {
            remainder -= weight;
            if remainder < 0.0 {
                return item;
            }
        }
        // Rounding can leave a tiny non-negative remainder after the last entry.
        &self.entries[self.entries.len() - 1].0
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; construction rejects empty lists.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, f64)> {
        self.entries.iter().map(|(item, weight)| (item, *weight))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use test_case::test_case;

    use super::*;

    #[test]
    fn converges_to_weights() {
        let list = WeightedList::new(vec![('A', 1.0), ('B', 3.0)]).unwrap();
        let mut rng = fastrand::Rng::with_seed(1234);
        let draws = 100_000;
        let a = (0..draws).filter(|_| *list.get(&mut rng) == 'A').count();

        assert_abs_diff_eq!(a as f64 / draws as f64, 0.25, epsilon = 0.01);
    }

    #[test]
    fn single_entry_always_wins() {
        let list = WeightedList::new(vec![("only", 0.001)]).unwrap();
        let mut rng = fastrand::Rng::with_seed(9);
        for _ in 0..1000 {
            assert_eq!(*list.get(&mut rng), "only");
        }
    }

    #[test]
    fn total_is_exact_sum() {
        let list = WeightedList::new(vec![(1, 0.5), (2, 1.5), (3, 2.0)]).unwrap();
        assert_eq!(list.total_weight(), 4.0);
        assert_eq!(list.len(), 3);
        assert_eq!(list.iter().map(|(item, _)| *item).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(matches!(
            WeightedList::<u8>::new(vec![]),
            Err(ObfuscationError::EmptyWeightedList)
        ));
    }

    #[test_case(0.0 ; "zero")]
    #[test_case(-1.0 ; "negative")]
    #[test_case(f64::NAN ; "nan")]
    #[test_case(f64::INFINITY ; "infinite")]
    fn bad_weight_is_rejected(weight: f64) {
        let result = WeightedList::new(vec![('a', 1.0), ('b', weight)]);
        assert!(matches!(result, Err(ObfuscationError::InvalidWeight { index: 1, .. })));
    }
}
