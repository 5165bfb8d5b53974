//! Samplers for Pitman-Yor seating arrangements.
//!
//! A seating of `c` customers at `t` tables is described in two ways:
//! * table sizes, a vector of `t` positive counts summing to `c`;
//! * table creation indices `z`, where `z[i] + 1` is the number of tables open
//!   after customer `i` was seated. `z[0] = 0`, `z` is non-decreasing with steps
//!   of at most one, and `z[c - 1] = t - 1`.
//!
//! Given `z`, only the sizes remain random ([`sample_given_assignments`]). Given
//! just `(c, t)`, `z` is drawn with either of two `O(c t)` dynamic programs.

use rand::Rng;
use tracing::trace;

use crate::utils::sample_unnormalized;

/// Sample table sizes consistent with the table creation indices `z`.
///
/// # Panics
/// If `z` is empty, does not start at zero, or takes a step other than 0 or +1.
#[allow(clippy::cast_precision_loss)]
pub fn sample_given_assignments<R: Rng>(discount: f64, z: &[usize], rng: &mut R) -> Vec<usize> {
    let Some(&last) = z.last() else {
        panic!("table creation indices must not be empty");
    };
    assert_eq!(z[0], 0, "the first customer always opens table 0");

    let tables = last + 1;
    let mut arrangement = vec![0_usize; tables];
    let mut weights = vec![0.0; tables];
    arrangement[0] = 1;

    for (i, pair) in z.windows(2).enumerate() {
        let (prev, cur) = (pair[0], pair[1]);
        if cur == prev + 1 {
            arrangement[cur] += 1;
            continue;
        }
        assert_eq!(
            cur, prev,
            "table creation indices may only stay or grow by one (customer {})",
            i + 1
        );
        for (w, &size) in weights.iter_mut().zip(arrangement.iter()).take(cur + 1) {
            *w = size as f64 - discount;
        }
        arrangement[sample_unnormalized(&weights, Some(cur), rng)] += 1;
    }

    debug_assert_eq!(arrangement.iter().sum::<usize>(), z.len());
    debug_assert!(arrangement.iter().all(|&n| n > 0));
    arrangement
}

fn normalize_column(grid: &mut [Vec<f64>], column: usize) {
    let total: f64 = grid.iter().map(|row| row[column]).sum();
    if total > 0.0 {
        grid.iter_mut().for_each(|row| row[column] /= total);
    }
}

fn check_counts(customers: usize, tables: usize) {
    assert!(customers != 0, "cannot seat zero customers");
    assert!(
        customers >= tables && tables >= 1,
        "cannot seat {customers} customers at {tables} tables"
    );
}

/// Sample table creation indices by forward filtering, backward sampling.
///
/// Runtime and memory are `O(c t)`.
///
/// # Panics
/// Unless `customers >= tables >= 1`.
#[allow(clippy::cast_precision_loss)]
pub fn sample_forward_backward<R: Rng>(
    discount: f64,
    customers: usize,
    tables: usize,
    rng: &mut R,
) -> Vec<usize> {
    trace!(discount, customers, tables, "sample_forward_backward");
    check_counts(customers, tables);

    let (c, t) = (customers, tables);
    if t == 1 {
        return vec![0; c];
    }

    // grid[j][i]: weight of all seatings of customers 0..=i that end with j + 1 tables.
    // Only ratios within a column are used, so every column is rescaled to sum one.
    let mut grid = vec![vec![0.0_f64; c]; t];
    grid[0][0] = 1.0;
    for i in 1..c - 1 {
        for j in 0..t {
            let mut w = grid[j][i - 1] * discount.mul_add(-((j + 1) as f64), i as f64);
            if j > 0 {
                w += grid[j - 1][i - 1];
            }
            grid[j][i] = w;
        }
        normalize_column(&mut grid, i);
    }

    let mut z = vec![0; c];
    let mut cur = t - 1;
    z[c - 1] = cur;
    for i in (0..c - 1).rev() {
        let opened = grid[cur - 1][i];
        let joined = discount.mul_add(-((cur + 1) as f64), (i + 1) as f64) * grid[cur][i];
        if sample_unnormalized(&[opened, joined], None, rng) == 0 {
            cur -= 1;
        }
        z[i] = cur;
        if cur == 0 {
            break;
        }
    }
    z
}

/// Sample table creation indices by backward filtering, forward sampling.
///
/// Runtime and memory are `O(c t)`. Once the last table has been opened every
/// remaining customer joins an existing table.
///
/// # Panics
/// Unless `customers >= tables >= 1`.
#[allow(clippy::cast_precision_loss)]
pub fn sample_backward_forward<R: Rng>(
    discount: f64,
    customers: usize,
    tables: usize,
    rng: &mut R,
) -> Vec<usize> {
    trace!(discount, customers, tables, "sample_backward_forward");
    check_counts(customers, tables);

    let (c, t) = (customers, tables);
    if t == 1 {
        return vec![0; c];
    }

    // grid[j][i]: weight of all ways to seat customers i+1..c, given j + 1 tables
    // after customer i, that end with exactly t tables.
    let mut grid = vec![vec![0.0_f64; c]; t];
    grid[t - 1][c - 1] = 1.0;
    for i in (1..c - 1).rev() {
        let lo = (t + i).saturating_sub(c);
        for j in (lo..=(t - 1).min(i)).rev() {
            let mut w = grid[j][i + 1] * discount.mul_add(-((j + 1) as f64), (i + 1) as f64);
            if j < t - 1 {
                w += grid[j + 1][i + 1];
            }
            grid[j][i] = w;
        }
        normalize_column(&mut grid, i);
    }

    let mut z = vec![0; c];
    let mut cur = 0;
    z[c - 1] = t - 1;
    for i in 1..c - 1 {
        let joined = discount.mul_add(-((cur + 1) as f64), i as f64) * grid[cur][i];
        let opened = grid[cur + 1][i];
        if sample_unnormalized(&[joined, opened], None, rng) == 1 {
            cur += 1;
        }
        z[i] = cur;
        if cur == t - 1 {
            z[i + 1..c - 1].fill(cur);
            break;
        }
    }
    z
}

/// Sample a complete seating of `customers` customers from a Pitman-Yor CRP.
///
/// Customer `i` joins table `j` with weight `size_j - discount` or opens a new
/// table with weight `concentration + discount * tables`.
#[allow(clippy::cast_precision_loss)]
pub fn sample_crp_marginal<R: Rng>(
    discount: f64,
    concentration: f64,
    customers: usize,
    rng: &mut R,
) -> Vec<usize> {
    trace!(discount, concentration, customers, "sample_crp_marginal");
    if customers == 0 {
        return Vec::new();
    }

    let mut weights = vec![0.0; customers];
    let mut arrangement = vec![1_usize];
    for _ in 1..customers {
        let open = arrangement.len();
        for (w, &size) in weights.iter_mut().zip(arrangement.iter()) {
            *w = size as f64 - discount;
        }
        weights[open] = discount.mul_add(open as f64, concentration);
        let choice = sample_unnormalized(&weights, Some(open), rng);
        if choice == open {
            arrangement.push(1);
        } else {
            arrangement[choice] += 1;
        }
    }
    arrangement
}

/// Sample table sizes for `customers` customers at exactly `tables` tables.
///
/// # Panics
/// Unless `customers >= tables >= 1`.
pub fn sample_seating<R: Rng>(
    discount: f64,
    customers: usize,
    tables: usize,
    rng: &mut R,
) -> Vec<usize> {
    let z = sample_forward_backward(discount, customers, tables, rng);
    sample_given_assignments(discount, &z, rng)
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;
    use rv::dist::Crp;
    use rv::traits::Sampleable;

    use super::*;
    use crate::predictive::expected_tables;
    use crate::utils::{assert_same_distribution, MeanAndVariance};

    fn assert_valid_z(z: &[usize], c: usize, t: usize) {
        assert_eq!(z.len(), c);
        assert_eq!(z[0], 0);
        assert_eq!(z[c - 1], t - 1);
        assert!(z.windows(2).all(|p| p[1] == p[0] || p[1] == p[0] + 1));
    }

    #[test]
    fn single_table_is_all_zeros() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        for d in [0.0, 0.3, 0.9] {
            assert_eq!(sample_forward_backward(d, 5, 1, &mut rng), vec![0; 5]);
            assert_eq!(sample_backward_forward(d, 5, 1, &mut rng), vec![0; 5]);
        }
    }

    #[test]
    fn one_table_per_customer() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let expected: Vec<usize> = (0..6).collect();
        assert_eq!(sample_forward_backward(0.5, 6, 6, &mut rng), expected);
        assert_eq!(sample_backward_forward(0.5, 6, 6, &mut rng), expected);
        assert_eq!(sample_given_assignments(0.5, &expected, &mut rng), vec![1; 6]);
    }

    #[test]
    fn assignments_are_well_formed() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0xF00D);
        for (c, t) in [(2, 2), (3, 2), (10, 3), (50, 7), (200, 40)] {
            for _ in 0..20 {
                assert_valid_z(&sample_forward_backward(0.5, c, t, &mut rng), c, t);
                assert_valid_z(&sample_backward_forward(0.5, c, t, &mut rng), c, t);
            }
        }
    }

    #[test]
    fn seating_matches_counts() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0xF00D);
        for (c, t) in [(1, 1), (10, 3), (10, 10), (75, 12)] {
            for _ in 0..20 {
                let seating = sample_seating(0.7, c, t, &mut rng);
                assert_eq!(seating.len(), t);
                assert_eq!(seating.iter().sum::<usize>(), c);
                assert!(seating.iter().all(|&n| n > 0));
            }
        }
    }

    #[test]
    fn large_counts_do_not_overflow() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let seating = sample_seating(0.2, 2_000, 30, &mut rng);
        assert_eq!(seating.iter().sum::<usize>(), 2_000);
        assert_eq!(seating.len(), 30);
    }

    #[test]
    #[should_panic(expected = "cannot seat")]
    fn more_tables_than_customers_panics() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        sample_forward_backward(0.5, 3, 4, &mut rng);
    }

    #[test]
    #[should_panic(expected = "stay or grow by one")]
    fn malformed_assignments_panic() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        sample_given_assignments(0.5, &[0, 2, 2], &mut rng);
    }

    #[allow(clippy::cast_precision_loss)]
    #[test]
    fn fb_and_bf_agree() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0x5EED);
        let (d, c, t) = (0.4, 30, 6);
        let n = 2_000;

        // Customers seated before the third table is opened.
        let third_opened = |z: Vec<usize>| z.iter().filter(|&&j| j < 2).count() as f64;
        let fb: Vec<f64> = (0..n)
            .map(|_| third_opened(sample_forward_backward(d, c, t, &mut rng)))
            .collect();
        let bf: Vec<f64> = (0..n)
            .map(|_| third_opened(sample_backward_forward(d, c, t, &mut rng)))
            .collect();

        assert_same_distribution(&fb, &bf, 0.001);
    }

    #[allow(clippy::cast_precision_loss)]
    #[test]
    fn seating_agrees_with_conditioned_crp() {
        // Rejection sample the CRP on having exactly `t` tables and compare the
        // size of the largest table.
        let mut rng = Xoshiro256Plus::seed_from_u64(0xBEEF);
        let (d, k, c, t) = (0.5, 1.0, 12, 3);
        let n = 1_500;

        let largest = |s: Vec<usize>| s.into_iter().max().unwrap_or(0) as f64;
        let mut rejection = Vec::with_capacity(n);
        while rejection.len() < n {
            let s = sample_crp_marginal(d, k, c, &mut rng);
            if s.len() == t {
                rejection.push(largest(s));
            }
        }
        let direct: Vec<f64> = (0..n)
            .map(|_| largest(sample_seating(d, c, t, &mut rng)))
            .collect();

        assert_same_distribution(&rejection, &direct, 0.001);
    }

    #[allow(clippy::cast_precision_loss)]
    #[test]
    fn marginal_matches_rv_crp() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let (alpha, n) = (2.5, 40);
        let crp = Crp::new(alpha, n).expect("valid CRP parameters");

        let ours: Vec<f64> = (0..2_000)
            .map(|_| sample_crp_marginal(0.0, alpha, n, &mut rng).len() as f64)
            .collect();
        let theirs: Vec<f64> = (0..2_000)
            .map(|_| {
                let partition: rv::data::Partition = crp.draw(&mut rng);
                partition.k() as f64
            })
            .collect();

        assert_same_distribution(&ours, &theirs, 0.001);
    }

    #[allow(clippy::cast_precision_loss)]
    #[test]
    fn marginal_mean_tables() {
        let mut rng = SmallRng::seed_from_u64(0xF00D);
        let (d, k, c) = (0.6, 2.0, 100);
        let stats: MeanAndVariance = (0..4_000)
            .map(|_| sample_crp_marginal(d, k, c, &mut rng).len() as f64)
            .collect();
        let expected = expected_tables(d, k, c);
        let std_err = (stats.sample_variance() / stats.count() as f64).sqrt();
        assert!(
            (stats.mean() - expected).abs() < 5.0 * std_err,
            "mean {} vs expected {expected}",
            stats.mean()
        );
    }

    #[test]
    fn tiny_concentration_has_dominant_table() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let trials = 500;
        let dominated = (0..trials)
            .filter(|_| {
                let s = sample_crp_marginal(0.0, 1e-6, 50, &mut rng);
                s.len() == 1
            })
            .count();
        assert!(dominated > trials * 99 / 100);
    }

    #[test]
    fn marginal_edge_counts() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        assert!(sample_crp_marginal(0.5, 1.0, 0, &mut rng).is_empty());
        assert_eq!(sample_crp_marginal(0.5, 1.0, 1, &mut rng), vec![1]);
    }
}
