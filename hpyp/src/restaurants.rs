//! Seating representations for a single node of a hierarchical Pitman-Yor process.
//!
//! Every node stores its seating in a payload. The restaurant types here hold
//! no per-node state; they interpret a payload and are passed the node's
//! discount and concentration on every call.

use std::fmt::Debug;

use rand::Rng;
use tracing::debug;

use crate::error::InvariantViolation;
use crate::predictive::hpyp_predictive;
use crate::seating::{sample_crp_marginal, sample_seating};

pub mod any;
pub mod compact;
pub mod histogram;
pub mod kneser_ney;
pub mod simple_full;

pub use any::{AnyPayload, AnyRemoval, AnyRestaurant};
pub use compact::{
    CompactPayload, CompactRestaurant, ExpectedTables, Reinstantiating, RemovalStrategy,
    StirlingRemoval,
};
pub use histogram::{HistogramPayload, HistogramRestaurant};
pub use kneser_ney::{KneserNeyPayload, KneserNeyRestaurant};
pub use simple_full::{SimpleFullPayload, SimpleFullRestaurant};

/// Keys that can label customer types.
pub trait TypeKey: Ord + Clone + Debug {}

impl<T: Ord + Clone + Debug> TypeKey for T {}

/// A way of storing and updating the seating of one node.
pub trait Restaurant<K: TypeKey> {
    /// Per-node seating state.
    type Payload: Clone + Debug;
    /// Scratch state that removal may need, such as a reconstructed seating.
    type Removal;

    /// A payload with no customers.
    fn make_payload(&self) -> Self::Payload;

    /// Customers of type `ty`.
    fn c(&self, payload: &Self::Payload, ty: &K) -> usize;
    /// Customers of all types.
    fn total_c(&self, payload: &Self::Payload) -> usize;
    /// Tables of type `ty`. Zero iff [`Self::c`] is zero.
    fn t(&self, payload: &Self::Payload, ty: &K) -> usize;
    /// Tables of all types.
    fn total_t(&self, payload: &Self::Payload) -> usize;

    /// Predictive probability of `ty` given the parent's predictive probability.
    fn compute_probability(
        &self,
        payload: &Self::Payload,
        ty: &K,
        parent_probability: f64,
        discount: f64,
        concentration: f64,
    ) -> f64 {
        hpyp_predictive(
            self.c(payload, ty),
            self.t(payload, ty),
            self.total_c(payload),
            self.total_t(payload),
            parent_probability,
            discount,
            concentration,
        )
    }

    /// Types with at least one customer, in key order.
    fn type_vector(&self, payload: &Self::Payload) -> Vec<K>;

    /// Seat a customer of `ty`. Returns whether it opened a new table, in which
    /// case the caller must also add a customer to the parent node.
    ///
    /// `removal` is passed when the caller holds removal data for this payload
    /// and wants it kept in step.
    #[allow(clippy::too_many_arguments)]
    fn add_customer<R: Rng>(
        &self,
        payload: &mut Self::Payload,
        ty: K,
        parent_probability: f64,
        discount: f64,
        concentration: f64,
        removal: Option<&mut Self::Removal>,
        rng: &mut R,
    ) -> bool;

    /// Remove a customer of `ty`, chosen proportional to table size. Returns
    /// whether its table became empty, in which case the caller must also
    /// remove a customer from the parent node.
    ///
    /// # Panics
    /// If no customer of `ty` is seated.
    fn remove_customer<R: Rng>(
        &self,
        payload: &mut Self::Payload,
        ty: &K,
        discount: f64,
        removal: &mut Self::Removal,
        rng: &mut R,
    ) -> bool;

    /// Build the removal data for a batch of removals from `payload`.
    fn create_additional_data<R: Rng>(
        &self,
        payload: &Self::Payload,
        discount: f64,
        concentration: f64,
        rng: &mut R,
    ) -> Self::Removal;

    /// Release removal data built by [`Self::create_additional_data`].
    fn free_additional_data(&self, removal: Self::Removal) {
        drop(removal);
    }

    /// Seat `tables.len()` new tables of `ty` with the given sizes.
    ///
    /// # Panics
    /// If any size is zero.
    fn seat(&self, payload: &mut Self::Payload, ty: K, tables: &[usize]);

    /// Table sizes of `ty`: exact where the payload stores them, otherwise
    /// sampled from the stored counts.
    fn table_sizes<R: Rng>(
        &self,
        payload: &Self::Payload,
        ty: &K,
        discount: f64,
        rng: &mut R,
    ) -> Vec<usize>;

    /// Insert a node between `longer` and its former parent.
    ///
    /// `shorter` must be empty. Each table of `longer` is fragmented with a
    /// `CRP(discount_after, -discount_before)`: the fragments become the tables
    /// of `longer`, and the table itself becomes one table of `shorter` seating
    /// one customer per fragment. With `parent_only` only `shorter` is built
    /// and `longer` is left as it was.
    ///
    /// # Panics
    /// If `discount_after < discount_before`. Debug builds also panic when
    /// `shorter` is not empty.
    fn update_after_split<R: Rng>(
        &self,
        longer: &mut Self::Payload,
        shorter: &mut Self::Payload,
        discount_before: f64,
        discount_after: f64,
        parent_only: bool,
        rng: &mut R,
    ) {
        assert!(
            discount_after >= discount_before,
            "a split cannot lower the discount ({discount_before} -> {discount_after})"
        );
        debug_assert!(
            self.total_c(shorter) == 0,
            "split target already seats {} customers",
            self.total_c(shorter)
        );
        let mut fragmented = self.make_payload();
        for ty in self.type_vector(longer) {
            let tables = self.table_sizes(longer, &ty, discount_before, rng);
            let mut parent_tables = Vec::with_capacity(tables.len());
            let mut child_tables = Vec::new();
            for size in tables {
                let fragments = sample_crp_marginal(discount_after, -discount_before, size, rng);
                parent_tables.push(fragments.len());
                child_tables.extend(fragments);
            }
            self.seat(shorter, ty.clone(), &parent_tables);
            if !parent_only {
                self.seat(&mut fragmented, ty, &child_tables);
            }
        }
        if !parent_only {
            *longer = fragmented;
        }
        debug!(
            discount_before,
            discount_after,
            parent_only,
            shorter_customers = self.total_c(shorter),
            shorter_tables = self.total_t(shorter),
            "split node"
        );
    }

    /// Human readable dump of the payload.
    fn describe(&self, payload: &Self::Payload) -> String;

    /// Re-derive every cached count from stored detail.
    ///
    /// # Errors
    /// The first invariant found not to hold.
    fn check_consistency(&self, payload: &Self::Payload) -> Result<(), InvariantViolation>;
}

/// Rebuild a payload of `target` from a payload of `source`.
///
/// Only `(c, t)` per type is read from the source; a seating is resampled for
/// each type with `discount`, so counts are preserved exactly.
pub fn payload_from_other<K, S, T, R>(
    target: &T,
    source: &S,
    source_payload: &S::Payload,
    discount: f64,
    rng: &mut R,
) -> T::Payload
where
    K: TypeKey,
    S: Restaurant<K>,
    T: Restaurant<K>,
    R: Rng,
{
    let mut payload = target.make_payload();
    for ty in source.type_vector(source_payload) {
        let customers = source.c(source_payload, &ty);
        let tables = source.t(source_payload, &ty);
        let sizes = sample_seating(discount, customers, tables, rng);
        target.seat(&mut payload, ty, &sizes);
    }
    debug!(
        customers = target.total_c(&payload),
        tables = target.total_t(&payload),
        "converted payload"
    );
    payload
}


#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;

    fn counts<T: Restaurant<u32>>(restaurant: &T, payload: &T::Payload) -> Vec<(u32, usize, usize)> {
        restaurant
            .type_vector(payload)
            .into_iter()
            .map(|ty| (ty, restaurant.c(payload, &ty), restaurant.t(payload, &ty)))
            .collect()
    }

    #[test]
    fn conversion_preserves_counts() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let full = SimpleFullRestaurant;
        let mut payload = full.make_payload();
        full.seat(&mut payload, 1, &[4, 3, 3]);
        full.seat(&mut payload, 7, &[1]);

        let histogram = HistogramRestaurant;
        let compact = CompactRestaurant::new(StirlingRemoval);
        for _ in 0..20 {
            let h = payload_from_other(&histogram, &full, &payload, 0.5, &mut rng);
            let c = payload_from_other(&compact, &histogram, &h, 0.5, &mut rng);
            let back = payload_from_other(&full, &compact, &c, 0.5, &mut rng);
            assert_eq!(counts(&histogram, &h), vec![(1, 10, 3), (7, 1, 1)]);
            assert_eq!(counts(&compact, &c), vec![(1, 10, 3), (7, 1, 1)]);
            assert_eq!(counts(&full, &back), vec![(1, 10, 3), (7, 1, 1)]);
            full.check_consistency(&back).unwrap();
            histogram.check_consistency(&h).unwrap();
        }
    }

    #[test]
    fn split_preserves_customers() {
        let mut rng = SmallRng::seed_from_u64(0xabc);
        let full = SimpleFullRestaurant;
        for _ in 0..50 {
            let mut longer = full.make_payload();
            full.seat(&mut longer, 0, &[6, 2, 1]);
            full.seat(&mut longer, 3, &[5]);
            let mut shorter = full.make_payload();
            full.update_after_split(&mut longer, &mut shorter, 0.25, 0.5, false, &mut rng);

            full.check_consistency(&longer).unwrap();
            full.check_consistency(&shorter).unwrap();
            assert_eq!(full.c(&longer, &0), 9);
            assert_eq!(full.c(&longer, &3), 5);
            // one shorter table per original table, one customer per fragment
            assert_eq!(full.t(&shorter, &0), 3);
            assert_eq!(full.t(&shorter, &3), 1);
            assert_eq!(full.c(&shorter, &0), full.t(&longer, &0));
            assert_eq!(full.c(&shorter, &3), full.t(&longer, &3));
        }
    }

    #[test]
    fn parent_only_split_leaves_longer() {
        let mut rng = SmallRng::seed_from_u64(0xabc);
        let compact = CompactRestaurant::new(Reinstantiating);
        let mut longer = compact.make_payload();
        compact.seat(&mut longer, 2, &[3, 3, 1]);
        let before = longer.clone();
        let mut shorter = compact.make_payload();
        compact.update_after_split(&mut longer, &mut shorter, 0.2, 0.6, true, &mut rng);
        assert_eq!(longer, before);
        assert_eq!(compact.t(&shorter, &2), 3);
        assert!((3..=7).contains(&compact.c(&shorter, &2)));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "split target already seats 1 customers")]
    fn split_rejects_occupied_shorter() {
        let mut rng = SmallRng::seed_from_u64(1);
        let full = SimpleFullRestaurant;
        let mut longer = full.make_payload();
        full.seat(&mut longer, 0, &[2]);
        let mut shorter = full.make_payload();
        full.seat(&mut shorter, 3, &[1]);
        full.update_after_split(&mut longer, &mut shorter, 0.3, 0.6, false, &mut rng);
    }

    #[test]
    #[should_panic(expected = "cannot lower the discount")]
    fn split_rejects_lower_discount() {
        let mut rng = SmallRng::seed_from_u64(1);
        let full = SimpleFullRestaurant;
        let mut longer = full.make_payload();
        full.seat(&mut longer, 0, &[2]);
        let mut shorter = full.make_payload();
        full.update_after_split(&mut longer, &mut shorter, 0.6, 0.3, false, &mut rng);
    }
}
