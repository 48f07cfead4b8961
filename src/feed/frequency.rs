//! Weighted random choice between feeds.

use rand::Rng;

fn usable(weight: f64) -> bool {
    // NaN compares false, so it is excluded here as well
    weight > 0.0 && weight.is_finite()
}

/// Picks one entry with probability `weight / total` using a single uniform
/// `draw` in [0, 1).
///
/// # Algorithm
/// 1. Drop entries whose weight is not a positive finite number.
/// 2. Subtract each remaining normalized weight from `draw` in order.
/// 3. The first entry that brings the remainder to <= 0 wins.
///
/// Rounding can leave a tiny positive remainder after the last entry; the
/// last usable entry is returned in that case. Returns `None` only when no
/// entry has a usable weight.
pub fn pick_weighted<T>(entries: &[(T, f64)], draw: f64) -> Option<&T> {
    let total: f64 = entries
        .iter()
        .map(|(_, w)| *w)
        .filter(|w| usable(*w))
        .sum();
    if total <= 0.0 {
        return None;
    }

    let mut remaining = draw.clamp(0.0, 1.0);
    let mut last = None;
    for (value, weight) in entries {
        if !usable(*weight) {
            continue;
        }
        remaining -= weight / total;
        last = Some(value);
        if remaining <= 0.0 {
            return Some(value);
        }
    }
    last
}

pub fn pick_weighted_with<'a, T, R: Rng + ?Sized>(
    entries: &'a [(T, f64)],
    rng: &mut R,
) -> Option<&'a T> {
    pick_weighted(entries, rng.gen::<f64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_single_entry_always_chosen() {
        let entries = [("only", 0.25)];
        for draw in [0.0, 0.3, 0.999_999] {
            assert_eq!(pick_weighted(&entries, draw), Some(&"only"));
        }
    }

    #[test]
    fn test_no_usable_weights() {
        let empty: [(&str, f64); 0] = [];
        assert_eq!(pick_weighted(&empty, 0.5), None);
        let entries = [("zero", 0.0), ("negative", -2.0), ("nan", f64::NAN)];
        assert_eq!(pick_weighted(&entries, 0.5), None);
    }

    #[test]
    fn test_unusable_weights_never_chosen() {
        let entries = [("zero", 0.0), ("a", 1.0), ("nan", f64::NAN), ("b", 1.0)];
        assert_eq!(pick_weighted(&entries, 0.0), Some(&"a"));
        assert_eq!(pick_weighted(&entries, 0.49), Some(&"a"));
        assert_eq!(pick_weighted(&entries, 0.51), Some(&"b"));
        assert_eq!(pick_weighted(&entries, 1.0), Some(&"b"));
    }

    #[test]
    fn test_shortfall_falls_back_to_last_usable() {
        let entries = [("a", 0.1), ("b", 0.2), ("c", 0.7), ("z", 0.0)];
        assert_eq!(pick_weighted(&entries, 0.999_999_999_999), Some(&"c"));
    }

    #[test]
    fn test_selection_ratio_follows_weights() {
        let entries = [("a", 1.0), ("b", 3.0)];
        let mut rng = StdRng::seed_from_u64(7);
        let mut a = 0u32;
        let mut b = 0u32;
        for _ in 0..100_000 {
            match pick_weighted_with(&entries, &mut rng) {
                Some(&"a") => a += 1,
                Some(&"b") => b += 1,
                other => panic!("unexpected pick {other:?}"),
            }
        }
        let ratio = b as f64 / a as f64;
        assert!((2.8..3.2).contains(&ratio), "ratio was {ratio}");
    }
}
