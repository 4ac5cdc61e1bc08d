//! Right-most match-or-smaller binary search.

/// Index of the right-most element of `sorted[from..=to]` that is `<=`
/// `value`.
///
/// Recurses on the midpoint. On ties, the right-most equal element wins.
/// If every element in range is greater than `value`, returns `from - 1`,
/// or `0` when `from` is `0`.
/// `sorted` must be non-decreasing and `from <= to < sorted.len()`.
///
/// The grid uses this to find the box containing a given offset into its
/// flat, box-sorted agent array: searching the exclusive prefix sum of box
/// sizes for the offset yields the box whose range covers it, skipping
/// empty boxes that share the same start.
pub fn binary_search<T: PartialOrd>(sorted: &[T], value: &T, from: usize, to: usize) -> usize {
    if to <= from {
        if sorted[from] > *value && from > 0 {
            return from - 1;
        }
        return from;
    }
    let m = from + (to - from) / 2;
    if sorted[m] == *value {
        if m < to && sorted[m + 1] == *value {
            return binary_search(sorted, value, m + 1, to);
        }
        m
    } else if sorted[m] > *value {
        binary_search(sorted, value, from, m)
    } else {
        binary_search(sorted, value, m + 1, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let v = [0, 5, 10, 15];
        assert_eq!(binary_search(&v, &10, 0, 3), 2);
    }

    #[test]
    fn between_elements_returns_smaller() {
        let v = [0, 5, 10, 15];
        assert_eq!(binary_search(&v, &7, 0, 3), 1);
        assert_eq!(binary_search(&v, &3, 0, 3), 0);
    }

    #[test]
    fn beyond_last_returns_last() {
        let v = [0, 5, 10];
        assert_eq!(binary_search(&v, &12, 0, 2), 2);
    }

    #[test]
    fn all_greater_returns_index_before_range() {
        let v = [0, 5, 10, 15];
        assert_eq!(binary_search(&v, &7, 2, 3), 1);
        assert_eq!(binary_search(&v, &-1, 0, 3), 0);
    }

    #[test]
    fn ties_prefer_right_most() {
        let v = [0, 3, 3, 3, 3, 9];
        assert_eq!(binary_search(&v, &3, 0, 5), 4);
        let all = [5, 5, 5, 5, 5];
        assert_eq!(binary_search(&all, &5, 0, 4), 4);
    }

    #[test]
    fn prefix_sum_with_empty_boxes_maps_offset_to_occupied_box() {
        // box sizes [2, 0, 0, 3, 1] -> starts [0, 2, 2, 2, 5]
        let starts = [0u64, 2, 2, 2, 5];
        assert_eq!(binary_search(&starts, &0, 0, 4), 0);
        assert_eq!(binary_search(&starts, &1, 0, 4), 0);
        assert_eq!(binary_search(&starts, &2, 0, 4), 3);
        assert_eq!(binary_search(&starts, &4, 0, 4), 3);
        assert_eq!(binary_search(&starts, &5, 0, 4), 4);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn result_is_right_most_not_greater(
                mut v in prop::collection::vec(0u32..50, 1..64),
                target in 0u32..60,
            ) {
                v.sort_unstable();
                let idx = binary_search(&v, &target, 0, v.len() - 1);
                if v[0] <= target {
                    prop_assert!(v[idx] <= target);
                    if idx + 1 < v.len() {
                        prop_assert!(v[idx + 1] > target);
                    }
                } else {
                    prop_assert_eq!(idx, 0);
                }
            }
        }
    }
}
