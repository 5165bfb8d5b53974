use std::collections::BTreeMap;

use itertools::Itertools;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::simple_full::check_totals;
use super::{Restaurant, TypeKey};
use crate::error::InvariantViolation;

/// Customer counts per type; every seated type has exactly one table.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "K: Serialize",
        deserialize = "K: Ord + Deserialize<'de>"
    ))
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KneserNeyPayload<K> {
    #[cfg_attr(feature = "serde", serde(default))]
    table_map: BTreeMap<K, usize>,
    #[cfg_attr(feature = "serde", serde(default))]
    sum_customers: usize,
}

impl<K> Default for KneserNeyPayload<K> {
    fn default() -> Self {
        Self {
            table_map: BTreeMap::new(),
            sum_customers: 0,
        }
    }
}

/// Minimal-path seating: a customer opens a table only for a type not yet seated,
/// which gives interpolated Kneser-Ney style counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KneserNeyRestaurant;

impl<K: TypeKey> Restaurant<K> for KneserNeyRestaurant {
    type Payload = KneserNeyPayload<K>;
    type Removal = ();

    fn make_payload(&self) -> Self::Payload {
        KneserNeyPayload::default()
    }

    fn c(&self, payload: &Self::Payload, ty: &K) -> usize {
        payload.table_map.get(ty).copied().unwrap_or(0)
    }

    fn total_c(&self, payload: &Self::Payload) -> usize {
        payload.sum_customers
    }

    fn t(&self, payload: &Self::Payload, ty: &K) -> usize {
        usize::from(payload.table_map.contains_key(ty))
    }

    fn total_t(&self, payload: &Self::Payload) -> usize {
        payload.table_map.len()
    }

    fn type_vector(&self, payload: &Self::Payload) -> Vec<K> {
        payload.table_map.keys().cloned().collect()
    }

    fn add_customer<R: Rng>(
        &self,
        payload: &mut Self::Payload,
        ty: K,
        _parent_probability: f64,
        _discount: f64,
        _concentration: f64,
        _removal: Option<&mut ()>,
        _rng: &mut R,
    ) -> bool {
        let customers = payload.table_map.entry(ty).or_insert(0);
        *customers += 1;
        payload.sum_customers += 1;
        *customers == 1
    }

    fn remove_customer<R: Rng>(
        &self,
        payload: &mut Self::Payload,
        ty: &K,
        _discount: f64,
        _removal: &mut (),
        _rng: &mut R,
    ) -> bool {
        let Some(customers) = payload.table_map.get_mut(ty) else {
            panic!("cannot remove a customer of type {ty:?}: none are seated");
        };
        *customers -= 1;
        payload.sum_customers -= 1;
        let emptied = *customers == 0;
        if emptied {
            payload.table_map.remove(ty);
        }
        emptied
    }

    fn create_additional_data<R: Rng>(
        &self,
        _payload: &Self::Payload,
        _discount: f64,
        _concentration: f64,
        _rng: &mut R,
    ) {
    }

    /// All tables of a type collapse into its single table.
    fn seat(&self, payload: &mut Self::Payload, ty: K, tables: &[usize]) {
        if tables.is_empty() {
            return;
        }
        assert!(tables.iter().all(|&n| n > 0), "cannot seat an empty table");
        let customers: usize = tables.iter().sum();
        *payload.table_map.entry(ty).or_insert(0) += customers;
        payload.sum_customers += customers;
    }

    fn table_sizes<R: Rng>(
        &self,
        payload: &Self::Payload,
        ty: &K,
        _discount: f64,
        _rng: &mut R,
    ) -> Vec<usize> {
        payload.table_map.get(ty).map(|&c| vec![c]).unwrap_or_default()
    }

    /// `longer` keeps its counts. Every type of `longer` sends exactly one
    /// customer to `shorter`, since it holds one table there.
    fn update_after_split<R: Rng>(
        &self,
        longer: &mut Self::Payload,
        shorter: &mut Self::Payload,
        discount_before: f64,
        discount_after: f64,
        parent_only: bool,
        _rng: &mut R,
    ) {
        for ty in longer.table_map.keys() {
            Restaurant::<K>::seat(self, shorter, ty.clone(), &[1]);
        }
        debug!(
            discount_before,
            discount_after,
            parent_only,
            shorter_customers = shorter.sum_customers,
            "split node"
        );
    }

    fn describe(&self, payload: &Self::Payload) -> String {
        let types = payload
            .table_map
            .iter()
            .map(|(ty, c)| format!("{ty:?}: {c}"))
            .join("; ");
        format!(
            "c={} t={} | {types}",
            payload.sum_customers,
            payload.table_map.len()
        )
    }

    fn check_consistency(&self, payload: &Self::Payload) -> Result<(), InvariantViolation> {
        if let Some((ty, _)) = payload.table_map.iter().find(|(_, &c)| c == 0) {
            return Err(InvariantViolation::EmptyType {
                key: format!("{ty:?}"),
            });
        }
        let customers = payload.table_map.values().sum();
        let tables = payload.table_map.len();
        check_totals(payload.sum_customers, customers, tables, tables)
    }
}
