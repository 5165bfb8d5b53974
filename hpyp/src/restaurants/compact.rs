//! Restaurants that keep only `(customers, tables)` per type.
//!
//! Adding a customer only needs those two counts: the mass of the existing
//! tables of a type is `cw - d tw` whatever their sizes. Removing one needs to
//! know whether the customer sat alone, which the counts do not say, so each
//! [`RemovalStrategy`] answers that question differently.

use std::collections::BTreeMap;

use itertools::Itertools;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::simple_full::check_totals;
use super::{payload_from_other, Restaurant, SimpleFullPayload, SimpleFullRestaurant, TypeKey};
use crate::error::InvariantViolation;
use crate::predictive::{expected_tables, hpyp_predictive, hpyp_predictive_f64};
use crate::seating::sample_seating;
use crate::stirling::StirlingTable;
use crate::utils::sample_unnormalized;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompactArrangement {
    pub customers: usize,
    pub tables: usize,
}

/// Customer and table counts per type.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "K: Serialize",
        deserialize = "K: Ord + Deserialize<'de>"
    ))
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactPayload<K> {
    #[cfg_attr(feature = "serde", serde(default))]
    table_map: BTreeMap<K, CompactArrangement>,
    #[cfg_attr(feature = "serde", serde(default))]
    sum_customers: usize,
    #[cfg_attr(feature = "serde", serde(default))]
    sum_tables: usize,
}

impl<K> Default for CompactPayload<K> {
    fn default() -> Self {
        Self {
            table_map: BTreeMap::new(),
            sum_customers: 0,
            sum_tables: 0,
        }
    }
}

impl<K: Ord> CompactPayload<K> {
    pub fn arrangement(&self, ty: &K) -> Option<CompactArrangement> {
        self.table_map.get(ty).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &CompactArrangement)> {
        self.table_map.iter()
    }

    fn record_addition(&mut self, ty: K, opened: bool) {
        let arrangement = self.table_map.entry(ty).or_default();
        arrangement.customers += 1;
        self.sum_customers += 1;
        if opened {
            arrangement.tables += 1;
            self.sum_tables += 1;
        }
    }

    fn record_removal(&mut self, ty: &K, emptied: bool) {
        if let Some(arrangement) = self.table_map.get_mut(ty) {
            arrangement.customers -= 1;
            self.sum_customers -= 1;
            if emptied {
                arrangement.tables -= 1;
                self.sum_tables -= 1;
            }
            if arrangement.customers == 0 {
                self.table_map.remove(ty);
            }
        }
    }
}

/// Sample whether a new customer of `ty` opens a table, from the counts alone.
#[allow(clippy::cast_precision_loss)]
fn sample_opens_table<K: Ord, R: Rng>(
    payload: &CompactPayload<K>,
    ty: &K,
    parent_probability: f64,
    discount: f64,
    concentration: f64,
    rng: &mut R,
) -> bool {
    let Some(arrangement) = payload.table_map.get(ty) else {
        return true;
    };
    let weights = [
        discount.mul_add(-(arrangement.tables as f64), arrangement.customers as f64),
        discount.mul_add(payload.sum_tables as f64, concentration) * parent_probability,
    ];
    sample_unnormalized(&weights, None, rng) == 1
}

/// How a [`CompactRestaurant`] decides whether a removed customer sat alone.
pub trait RemovalStrategy<K: TypeKey> {
    type Removal;

    fn create_removal<R: Rng>(
        &self,
        payload: &CompactPayload<K>,
        discount: f64,
        concentration: f64,
        rng: &mut R,
    ) -> Self::Removal;

    /// Whether removing a customer of `ty` empties its table. `payload` still
    /// holds the counts from before the removal.
    fn removes_table<R: Rng>(
        &self,
        payload: &CompactPayload<K>,
        ty: &K,
        discount: f64,
        removal: &mut Self::Removal,
        rng: &mut R,
    ) -> bool;

    /// Whether adding a customer of `ty` opens a table, given removal data the
    /// caller wants kept in step.
    #[allow(clippy::too_many_arguments)]
    fn opens_table<R: Rng>(
        &self,
        payload: &CompactPayload<K>,
        ty: &K,
        parent_probability: f64,
        discount: f64,
        concentration: f64,
        _removal: &mut Self::Removal,
        rng: &mut R,
    ) -> bool {
        sample_opens_table(payload, ty, parent_probability, discount, concentration, rng)
    }

    fn compute_probability(
        &self,
        payload: &CompactPayload<K>,
        ty: &K,
        parent_probability: f64,
        discount: f64,
        concentration: f64,
    ) -> f64 {
        let arrangement = payload.arrangement(ty).unwrap_or_default();
        hpyp_predictive(
            arrangement.customers,
            arrangement.tables,
            payload.sum_customers,
            payload.sum_tables,
            parent_probability,
            discount,
            concentration,
        )
    }
}

/// Resamples a full seating for every removal batch and removes from it.
///
/// Additions made while the seating is held go through it as well, so it stays
/// in step with the counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Reinstantiating;

impl<K: TypeKey> RemovalStrategy<K> for Reinstantiating {
    type Removal = SimpleFullPayload<K>;

    fn create_removal<R: Rng>(
        &self,
        payload: &CompactPayload<K>,
        discount: f64,
        _concentration: f64,
        rng: &mut R,
    ) -> SimpleFullPayload<K> {
        let seating = payload_from_other::<K, _, _, _>(
            &SimpleFullRestaurant,
            &CompactRestaurant::new(*self),
            payload,
            discount,
            rng,
        );
        debug!(
            types = payload.table_map.len(),
            customers = payload.sum_customers,
            "reinstantiated seating"
        );
        seating
    }

    fn removes_table<R: Rng>(
        &self,
        _payload: &CompactPayload<K>,
        ty: &K,
        discount: f64,
        removal: &mut SimpleFullPayload<K>,
        rng: &mut R,
    ) -> bool {
        SimpleFullRestaurant.remove_customer(removal, ty, discount, &mut (), rng)
    }

    fn opens_table<R: Rng>(
        &self,
        _payload: &CompactPayload<K>,
        ty: &K,
        parent_probability: f64,
        discount: f64,
        concentration: f64,
        removal: &mut SimpleFullPayload<K>,
        rng: &mut R,
    ) -> bool {
        SimpleFullRestaurant.add_customer(
            removal,
            ty.clone(),
            parent_probability,
            discount,
            concentration,
            None,
            rng,
        )
    }
}

/// Removes with the exact singleton probability `S_d(cw - 1, tw - 1) / S_d(cw, tw)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StirlingRemoval;

impl<K: TypeKey> RemovalStrategy<K> for StirlingRemoval {
    type Removal = StirlingTable;

    fn create_removal<R: Rng>(
        &self,
        _payload: &CompactPayload<K>,
        discount: f64,
        _concentration: f64,
        _rng: &mut R,
    ) -> StirlingTable {
        StirlingTable::new(discount)
    }

    fn removes_table<R: Rng>(
        &self,
        payload: &CompactPayload<K>,
        ty: &K,
        discount: f64,
        removal: &mut StirlingTable,
        rng: &mut R,
    ) -> bool {
        if removal.discount() != discount {
            *removal = StirlingTable::new(discount);
        }
        let arrangement = payload.table_map[ty];
        removal.sample_removes_table(arrangement.customers, arrangement.tables, rng)
    }
}

/// [`StirlingRemoval`], but predicts with the expected number of tables for
/// each type's customer count instead of the stored table counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExpectedTables;

impl<K: TypeKey> RemovalStrategy<K> for ExpectedTables {
    type Removal = StirlingTable;

    fn create_removal<R: Rng>(
        &self,
        payload: &CompactPayload<K>,
        discount: f64,
        concentration: f64,
        rng: &mut R,
    ) -> StirlingTable {
        StirlingRemoval.create_removal(payload, discount, concentration, rng)
    }

    fn removes_table<R: Rng>(
        &self,
        payload: &CompactPayload<K>,
        ty: &K,
        discount: f64,
        removal: &mut StirlingTable,
        rng: &mut R,
    ) -> bool {
        StirlingRemoval.removes_table(payload, ty, discount, removal, rng)
    }

    /// Predictive probability with every `tw` replaced by its expectation.
    ///
    /// The expectations are not cached, so each call costs one
    /// `expected_tables` evaluation per customer in the node.
    #[allow(clippy::cast_precision_loss)]
    fn compute_probability(
        &self,
        payload: &CompactPayload<K>,
        ty: &K,
        parent_probability: f64,
        discount: f64,
        concentration: f64,
    ) -> f64 {
        let mut tw = 0.0;
        let mut t = 0.0;
        for (key, arrangement) in &payload.table_map {
            let expected = expected_tables(discount, concentration, arrangement.customers);
            if key == ty {
                tw = expected;
            }
            t += expected;
        }
        let cw = payload.arrangement(ty).unwrap_or_default().customers;
        hpyp_predictive_f64(
            cw as f64,
            tw,
            payload.sum_customers as f64,
            t,
            parent_probability,
            discount,
            concentration,
        )
    }
}

/// Stores `(cw, tw)` per type and delegates removal to `S`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompactRestaurant<S> {
    strategy: S,
}

impl<S> CompactRestaurant<S> {
    pub const fn new(strategy: S) -> Self {
        Self { strategy }
    }

    pub const fn strategy(&self) -> &S {
        &self.strategy
    }
}

impl<K: TypeKey, S: RemovalStrategy<K>> Restaurant<K> for CompactRestaurant<S> {
    type Payload = CompactPayload<K>;
    type Removal = S::Removal;

    fn make_payload(&self) -> Self::Payload {
        CompactPayload::default()
    }

    fn c(&self, payload: &Self::Payload, ty: &K) -> usize {
        payload.table_map.get(ty).map_or(0, |a| a.customers)
    }

    fn total_c(&self, payload: &Self::Payload) -> usize {
        payload.sum_customers
    }

    fn t(&self, payload: &Self::Payload, ty: &K) -> usize {
        payload.table_map.get(ty).map_or(0, |a| a.tables)
    }

    fn total_t(&self, payload: &Self::Payload) -> usize {
        payload.sum_tables
    }

    fn compute_probability(
        &self,
        payload: &Self::Payload,
        ty: &K,
        parent_probability: f64,
        discount: f64,
        concentration: f64,
    ) -> f64 {
        self.strategy
            .compute_probability(payload, ty, parent_probability, discount, concentration)
    }

    fn type_vector(&self, payload: &Self::Payload) -> Vec<K> {
        payload.table_map.keys().cloned().collect()
    }

    fn add_customer<R: Rng>(
        &self,
        payload: &mut Self::Payload,
        ty: K,
        parent_probability: f64,
        discount: f64,
        concentration: f64,
        removal: Option<&mut S::Removal>,
        rng: &mut R,
    ) -> bool {
        let opened = match removal {
            Some(removal) => self.strategy.opens_table(
                payload,
                &ty,
                parent_probability,
                discount,
                concentration,
                removal,
                rng,
            ),
            None => sample_opens_table(
                payload,
                &ty,
                parent_probability,
                discount,
                concentration,
                rng,
            ),
        };
        payload.record_addition(ty, opened);
        opened
    }

    fn remove_customer<R: Rng>(
        &self,
        payload: &mut Self::Payload,
        ty: &K,
        discount: f64,
        removal: &mut S::Removal,
        rng: &mut R,
    ) -> bool {
        assert!(
            payload.table_map.contains_key(ty),
            "cannot remove a customer of type {ty:?}: none are seated"
        );
        let emptied = self
            .strategy
            .removes_table(payload, ty, discount, removal, rng);
        payload.record_removal(ty, emptied);
        emptied
    }

    fn create_additional_data<R: Rng>(
        &self,
        payload: &Self::Payload,
        discount: f64,
        concentration: f64,
        rng: &mut R,
    ) -> S::Removal {
        self.strategy
            .create_removal(payload, discount, concentration, rng)
    }

    fn seat(&self, payload: &mut Self::Payload, ty: K, tables: &[usize]) {
        if tables.is_empty() {
            return;
        }
        assert!(tables.iter().all(|&n| n > 0), "cannot seat an empty table");
        let customers: usize = tables.iter().sum();
        let arrangement = payload.table_map.entry(ty).or_default();
        arrangement.customers += customers;
        arrangement.tables += tables.len();
        payload.sum_customers += customers;
        payload.sum_tables += tables.len();
    }

    fn table_sizes<R: Rng>(
        &self,
        payload: &Self::Payload,
        ty: &K,
        discount: f64,
        rng: &mut R,
    ) -> Vec<usize> {
        payload.table_map.get(ty).map_or_else(Vec::new, |a| {
            sample_seating(discount, a.customers, a.tables, rng)
        })
    }

    fn describe(&self, payload: &Self::Payload) -> String {
        let types = payload
            .table_map
            .iter()
            .map(|(ty, a)| format!("{ty:?}: {}/{}", a.customers, a.tables))
            .join("; ");
        format!(
            "c={} t={} | {types}",
            payload.sum_customers, payload.sum_tables
        )
    }

    fn check_consistency(&self, payload: &Self::Payload) -> Result<(), InvariantViolation> {
        let mut customers = 0;
        let mut tables = 0;
        for (ty, a) in &payload.table_map {
            let key = format!("{ty:?}");
            if a.customers == 0 {
                return Err(InvariantViolation::EmptyType { key });
            }
            if a.tables == 0 {
                return Err(InvariantViolation::NoTables {
                    key,
                    customers: a.customers,
                });
            }
            if a.tables > a.customers {
                return Err(InvariantViolation::TablesExceedCustomers {
                    key,
                    customers: a.customers,
                    tables: a.tables,
                });
            }
            customers += a.customers;
            tables += a.tables;
        }
        check_totals(payload.sum_customers, customers, payload.sum_tables, tables)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    use super::*;
    use crate::restaurants::testing::{add_then_remove_all, churn};

    #[test]
    fn add_then_remove_all_customers() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        for _ in 0..50 {
            add_then_remove_all(&CompactRestaurant::new(Reinstantiating), &mut rng);
            add_then_remove_all(&CompactRestaurant::new(StirlingRemoval), &mut rng);
            add_then_remove_all(&CompactRestaurant::new(ExpectedTables), &mut rng);
        }
    }

    #[test]
    fn random_workload_stays_consistent() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0x777);
        let keys = [10_u16, 20, 30, 40, 50];

        let reinstantiating = CompactRestaurant::new(Reinstantiating);
        let mut payload = reinstantiating.make_payload();
        churn(&reinstantiating, &mut payload, &keys, 1_000, &mut rng);

        let stirling = CompactRestaurant::new(StirlingRemoval);
        let mut payload = stirling.make_payload();
        churn(&stirling, &mut payload, &keys, 2_000, &mut rng);
    }

    /// How often removing one customer from `(10, 3)` empties a table.
    #[allow(clippy::cast_precision_loss)]
    fn emptied_frequency<S: RemovalStrategy<u8>>(
        restaurant: CompactRestaurant<S>,
        discount: f64,
        rng: &mut Xoshiro256Plus,
    ) -> f64 {
        let n = 20_000;
        let hits = (0..n)
            .filter(|_| {
                let mut payload = restaurant.make_payload();
                restaurant.seat(&mut payload, 0_u8, &[8, 1, 1]);
                let mut removal = restaurant.create_additional_data(&payload, discount, 1.0, rng);
                restaurant.remove_customer(&mut payload, &0, discount, &mut removal, rng)
            })
            .count();
        hits as f64 / f64::from(n)
    }

    #[test]
    fn removal_strategies_agree_with_stirling_numbers() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0xD1CE);
        let d = 0.5;
        let expected = StirlingTable::new(d).singleton_probability(10, 3);

        let by_stirling = emptied_frequency(CompactRestaurant::new(StirlingRemoval), d, &mut rng);
        let by_reinstantiating =
            emptied_frequency(CompactRestaurant::new(Reinstantiating), d, &mut rng);

        assert::close(by_stirling, expected, 0.015);
        assert::close(by_reinstantiating, expected, 0.015);
    }

    #[test]
    fn reinstantiated_seating_follows_additions() {
        let mut rng = SmallRng::seed_from_u64(0xF00);
        let (d, k) = (0.3, 0.5);
        let restaurant = CompactRestaurant::new(Reinstantiating);
        let mut payload = restaurant.make_payload();
        for ty in [1_u8, 1, 2, 1, 3, 3] {
            restaurant.add_customer(&mut payload, ty, 0.2, d, k, None, &mut rng);
        }

        let mut removal = restaurant.create_additional_data(&payload, d, k, &mut rng);
        for ty in [1_u8, 4, 4, 2] {
            restaurant.add_customer(&mut payload, ty, 0.2, d, k, Some(&mut removal), &mut rng);
        }
        restaurant.remove_customer(&mut payload, &1, d, &mut removal, &mut rng);

        let full = SimpleFullRestaurant;
        full.check_consistency(&removal).unwrap();
        for ty in [1_u8, 2, 3, 4] {
            assert_eq!(full.c(&removal, &ty), restaurant.c(&payload, &ty));
            assert_eq!(full.t(&removal, &ty), restaurant.t(&payload, &ty));
        }
        restaurant.free_additional_data(removal);
    }

    #[test]
    fn stirling_table_follows_discount() {
        let mut rng = SmallRng::seed_from_u64(5);
        let restaurant = CompactRestaurant::new(StirlingRemoval);
        let mut payload = restaurant.make_payload();
        restaurant.seat(&mut payload, 'q', &[3, 2]);
        let mut removal = restaurant.create_additional_data(&payload, 0.1, 1.0, &mut rng);
        restaurant.remove_customer(&mut payload, &'q', 0.7, &mut removal, &mut rng);
        assert::close(removal.discount(), 0.7, 1e-12);
    }

    #[test]
    fn expected_tables_probability() {
        let (d, k) = (0.5, 1.0);
        let restaurant = CompactRestaurant::new(ExpectedTables);
        let mut payload = restaurant.make_payload();
        restaurant.seat(&mut payload, 0_u8, &[5]);
        restaurant.seat(&mut payload, 1_u8, &[1, 1]);

        let (e0, e1) = (expected_tables(d, k, 5), expected_tables(d, k, 2));
        let p = restaurant.compute_probability(&payload, &0, 0.25, d, k);
        assert::close(p, (5.0 - d * e0 + (k + d * (e0 + e1)) * 0.25) / 8.0, 1e-12);

        // The stored table counts are still reported as is.
        assert_eq!(restaurant.t(&payload, &0), 1);

        // Uniform base over four types.
        let total: f64 = (0..4_u8)
            .map(|ty| restaurant.compute_probability(&payload, &ty, 0.25, d, k))
            .sum();
        assert::close(total, 1.0, 1e-12);
    }

    #[test]
    fn check_consistency_reports_counts() {
        let restaurant = CompactRestaurant::new(StirlingRemoval);
        let mut payload = restaurant.make_payload();
        restaurant.seat(&mut payload, 9_u8, &[1, 1]);
        payload.table_map.insert(9, CompactArrangement { customers: 2, tables: 3 });
        payload.sum_tables = 3;
        assert!(matches!(
            restaurant.check_consistency(&payload),
            Err(InvariantViolation::TablesExceedCustomers { customers: 2, tables: 3, .. })
        ));
        payload.table_map.insert(9, CompactArrangement { customers: 2, tables: 0 });
        assert!(matches!(
            restaurant.check_consistency(&payload),
            Err(InvariantViolation::NoTables { customers: 2, .. })
        ));
    }
}
