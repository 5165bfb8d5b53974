//! The Pitman-Yor predictive rule shared by every restaurant.

/// Predictive probability of a type at a node of a hierarchical Pitman-Yor process.
///
/// * `cw`, `tw` - customers and tables of the type at this node.
/// * `c`, `t` - customers and tables of all types at this node.
/// * `parent_probability` - predictive probability of the type at the parent.
///
/// A node without customers backs off to its parent. With `discount == 0` this is
/// the Dirichlet process rule `(cw + concentration * parent) / (c + concentration)`.
///
/// No validation is performed; this is called on every prediction.
#[allow(clippy::cast_precision_loss)]
#[inline]
#[must_use]
pub fn hpyp_predictive(
    cw: usize,
    tw: usize,
    c: usize,
    t: usize,
    parent_probability: f64,
    discount: f64,
    concentration: f64,
) -> f64 {
    if c == 0 {
        parent_probability
    } else {
        hpyp_predictive_f64(
            cw as f64,
            tw as f64,
            c as f64,
            t as f64,
            parent_probability,
            discount,
            concentration,
        )
    }
}

/// [`hpyp_predictive`] for fractional table counts, such as expected tables.
#[inline]
#[must_use]
pub fn hpyp_predictive_f64(
    cw: f64,
    tw: f64,
    c: f64,
    t: f64,
    parent_probability: f64,
    discount: f64,
    concentration: f64,
) -> f64 {
    if c == 0.0 {
        parent_probability
    } else {
        (discount.mul_add(-tw, cw) + discount.mul_add(t, concentration) * parent_probability)
            / (c + concentration)
    }
}

/// Expected number of tables in a Pitman-Yor CRP with `customers` customers.
///
/// Customer `n + 1` opens a table with probability `(concentration + discount * T_n) / (concentration + n)`,
/// which is linear in `T_n`, so the expectation follows the same recursion exactly.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn expected_tables(discount: f64, concentration: f64, customers: usize) -> f64 {
    if customers == 0 {
        return 0.0;
    }
    (1..customers).fold(1.0, |tables, n| {
        tables + discount.mul_add(tables, concentration) / (concentration + n as f64)
    })
}
