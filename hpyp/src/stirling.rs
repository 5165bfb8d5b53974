//! Generalized Stirling numbers of the Pitman-Yor seating distribution.
//!
//! For a discount `d`, `S_d(n, m)` is the total weight of all seatings of `n`
//! customers at exactly `m` tables:
//!
//! ```text
//! S_d(0, 0) = 1
//! S_d(n + 1, m) = S_d(n, m - 1) + (n - m d) S_d(n, m)
//! ```
//!
//! They grow factorially, so the table keeps natural logarithms.
//!
//! Reference: P. Blunsom et al. "A note on the implementation of Hierarchical
//! Dirichlet Processes", ACL 2009.

use rand::Rng;
use rv::misc::{ln_pflip, LogSumExp};

fn ln_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        b
    } else if b == f64::NEG_INFINITY {
        a
    } else {
        [a, b].into_iter().logsumexp()
    }
}

/// Lazily grown table of `ln S_d(n, m)` for a fixed discount.
#[derive(Clone, Debug, PartialEq)]
pub struct StirlingTable {
    discount: f64,
    max_tables: usize,
    rows: Vec<Vec<f64>>,
}

impl StirlingTable {
    /// Create an empty table for `discount`.
    #[must_use]
    pub fn new(discount: f64) -> Self {
        Self {
            discount,
            max_tables: 16,
            rows: vec![vec![0.0]],
        }
    }

    #[must_use]
    pub const fn discount(&self) -> f64 {
        self.discount
    }

    /// Number of customers covered so far.
    #[must_use]
    pub fn customers(&self) -> usize {
        self.rows.len() - 1
    }

    /// Make sure `ln S_d(n, m)` is available.
    pub fn ensure(&mut self, n: usize, m: usize) {
        if m > self.max_tables {
            // Rows are truncated at `max_tables`; rebuild them wider.
            self.max_tables = m.max(2 * self.max_tables);
            self.rows.truncate(1);
        }
        while self.rows.len() <= n {
            self.push_row();
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn push_row(&mut self) {
        let n = self.rows.len() - 1;
        let prev = &self.rows[n];
        let width = (n + 1).min(self.max_tables) + 1;
        let row = (0..width)
            .map(|m| {
                let new_table = if m == 0 {
                    f64::NEG_INFINITY
                } else {
                    prev.get(m - 1).copied().unwrap_or(f64::NEG_INFINITY)
                };
                let join = prev.get(m).map_or(f64::NEG_INFINITY, |ln_s| {
                    let w = self.discount.mul_add(-(m as f64), n as f64);
                    if w > 0.0 {
                        w.ln() + ln_s
                    } else {
                        f64::NEG_INFINITY
                    }
                });
                ln_add(new_table, join)
            })
            .collect();
        self.rows.push(row);
    }

    /// `ln S_d(n, m)`, or negative infinity when no such seating exists.
    pub fn ln_stirling(&mut self, n: usize, m: usize) -> f64 {
        if m > n {
            return f64::NEG_INFINITY;
        }
        self.ensure(n, m);
        self.rows[n][m]
    }

    /// Log weights of the two ways the last of `customers` customers seated at
    /// `tables` tables could have arrived: `[joined a shared table, opened its own table]`.
    ///
    /// By exchangeability these are also the weights for a customer chosen uniformly
    /// at random, so they drive removal from a compact `(cw, tw)` record.
    #[allow(clippy::cast_precision_loss)]
    pub fn ln_removal_weights(&mut self, customers: usize, tables: usize) -> [f64; 2] {
        assert!(
            tables >= 1 && customers >= tables,
            "no seating of {customers} customers at {tables} tables"
        );
        let n = customers - 1;
        let occupied = self.discount.mul_add(-(tables as f64), n as f64);
        let shared = if occupied > 0.0 {
            occupied.ln() + self.ln_stirling(n, tables)
        } else {
            f64::NEG_INFINITY
        };
        let alone = self.ln_stirling(n, tables - 1);
        [shared, alone]
    }

    /// Probability that a uniformly chosen customer sits alone at its table.
    pub fn singleton_probability(&mut self, customers: usize, tables: usize) -> f64 {
        let [shared, alone] = self.ln_removal_weights(customers, tables);
        (alone - ln_add(shared, alone)).exp()
    }

    /// Sample whether removing a uniformly chosen customer empties its table.
    pub fn sample_removes_table<R: Rng>(
        &mut self,
        customers: usize,
        tables: usize,
        rng: &mut R,
    ) -> bool {
        let weights = self.ln_removal_weights(customers, tables);
        if weights[0] == f64::NEG_INFINITY {
            return true;
        }
        if weights[1] == f64::NEG_INFINITY {
            return false;
        }
        ln_pflip(&weights, false, rng) == 1
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::StirlingTable;

    #[test]
    fn unsigned_stirling_first_kind() {
        let mut table = StirlingTable::new(0.0);
        let expected = [(4, 1, 6.0), (4, 2, 11.0), (4, 3, 6.0), (5, 2, 50.0), (6, 3, 225.0)];
        for (n, m, s) in expected {
            assert::close(table.ln_stirling(n, m).exp(), s, 1e-9);
        }
        assert_eq!(table.ln_stirling(3, 0), f64::NEG_INFINITY);
        assert_eq!(table.ln_stirling(2, 3), f64::NEG_INFINITY);
        assert::close(table.ln_stirling(0, 0), 0.0, 1e-12);
    }

    #[test]
    fn half_discount_by_hand() {
        let mut table = StirlingTable::new(0.5);
        assert::close(table.ln_stirling(2, 1).exp(), 0.5, 1e-12);
        assert::close(table.ln_stirling(2, 2).exp(), 1.0, 1e-12);
        assert::close(table.ln_stirling(3, 1).exp(), 0.75, 1e-12);
        assert::close(table.ln_stirling(3, 2).exp(), 1.5, 1e-12);
        assert::close(table.ln_stirling(3, 3).exp(), 1.0, 1e-12);
    }

    #[test]
    fn widening_keeps_values() {
        let mut narrow = StirlingTable::new(0.3);
        let before = narrow.ln_stirling(40, 5);
        let wide = narrow.ln_stirling(40, 30);
        assert::close(narrow.ln_stirling(40, 5), before, 1e-10);

        let mut fresh = StirlingTable::new(0.3);
        assert::close(fresh.ln_stirling(40, 30), wide, 1e-10);
        assert_eq!(narrow.customers(), 40);
    }

    #[test]
    fn large_counts_stay_finite() {
        let mut table = StirlingTable::new(0.8);
        let v = table.ln_stirling(5000, 40);
        assert!(v.is_finite());
    }

    #[test]
    fn singleton_probability_edges() {
        let mut table = StirlingTable::new(0.5);
        assert::close(table.singleton_probability(4, 4), 1.0, 1e-12);
        assert::close(table.singleton_probability(4, 1), 0.0, 1e-12);
        // sizes {2, 1}: one of three customers is alone
        assert::close(table.singleton_probability(3, 2), 1.0 / 3.0, 1e-12);
    }

    #[test]
    fn forced_removals() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let mut table = StirlingTable::new(0.5);
        for _ in 0..100 {
            assert!(table.sample_removes_table(5, 5, &mut rng));
            assert!(!table.sample_removes_table(5, 1, &mut rng));
        }
    }
}
