use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{Restaurant, TypeKey};
use crate::error::InvariantViolation;
use crate::utils::{sample_unnormalized, NoPrettyPrint};

/// Every table of one type.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FullArrangement {
    pub customers: usize,
    pub tables: Vec<usize>,
}

/// Explicit table sizes for every type.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "K: Serialize",
        deserialize = "K: Ord + Deserialize<'de>"
    ))
)]
#[derive(Clone, PartialEq, Eq)]
pub struct SimpleFullPayload<K> {
    #[cfg_attr(feature = "serde", serde(default))]
    table_map: BTreeMap<K, FullArrangement>,
    #[cfg_attr(feature = "serde", serde(default))]
    sum_customers: usize,
    #[cfg_attr(feature = "serde", serde(default))]
    sum_tables: usize,
}

impl<K> Default for SimpleFullPayload<K> {
    fn default() -> Self {
        Self {
            table_map: BTreeMap::new(),
            sum_customers: 0,
            sum_tables: 0,
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for SimpleFullPayload<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (ty, arrangement) in &self.table_map {
            map.entry(ty, &NoPrettyPrint::new(&arrangement.tables));
        }
        map.finish()
    }
}

impl<K: Ord> SimpleFullPayload<K> {
    /// The tables of `ty`, if any are seated.
    pub fn arrangement(&self, ty: &K) -> Option<&FullArrangement> {
        self.table_map.get(ty)
    }
}

/// Stores the size of every table. Exact removal, most memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimpleFullRestaurant;

impl<K: TypeKey> Restaurant<K> for SimpleFullRestaurant {
    type Payload = SimpleFullPayload<K>;
    type Removal = ();

    fn make_payload(&self) -> Self::Payload {
        SimpleFullPayload::default()
    }

    fn c(&self, payload: &Self::Payload, ty: &K) -> usize {
        payload.table_map.get(ty).map_or(0, |a| a.customers)
    }

    fn total_c(&self, payload: &Self::Payload) -> usize {
        payload.sum_customers
    }

    fn t(&self, payload: &Self::Payload, ty: &K) -> usize {
        payload.table_map.get(ty).map_or(0, |a| a.tables.len())
    }

    fn total_t(&self, payload: &Self::Payload) -> usize {
        payload.sum_tables
    }

    fn type_vector(&self, payload: &Self::Payload) -> Vec<K> {
        payload.table_map.keys().cloned().collect()
    }

    #[allow(clippy::cast_precision_loss)]
    fn add_customer<R: Rng>(
        &self,
        payload: &mut Self::Payload,
        ty: K,
        parent_probability: f64,
        discount: f64,
        concentration: f64,
        _removal: Option<&mut ()>,
        rng: &mut R,
    ) -> bool {
        let open_tables = payload.sum_tables as f64;
        let arrangement = payload.table_map.entry(ty).or_default();

        let opened = if arrangement.tables.is_empty() {
            true
        } else {
            let mut weights: Vec<f64> = arrangement
                .tables
                .iter()
                .map(|&size| size as f64 - discount)
                .collect();
            weights.push(discount.mul_add(open_tables, concentration) * parent_probability);
            let choice = sample_unnormalized(&weights, None, rng);
            if choice == arrangement.tables.len() {
                true
            } else {
                arrangement.tables[choice] += 1;
                false
            }
        };

        if opened {
            arrangement.tables.push(1);
            payload.sum_tables += 1;
        }
        arrangement.customers += 1;
        payload.sum_customers += 1;
        opened
    }

    #[allow(clippy::cast_precision_loss)]
    fn remove_customer<R: Rng>(
        &self,
        payload: &mut Self::Payload,
        ty: &K,
        _discount: f64,
        _removal: &mut (),
        rng: &mut R,
    ) -> bool {
        let Some(arrangement) = payload.table_map.get_mut(ty) else {
            panic!("cannot remove a customer of type {ty:?}: none are seated");
        };

        let weights: Vec<f64> = arrangement.tables.iter().map(|&size| size as f64).collect();
        let choice = sample_unnormalized(&weights, None, rng);
        arrangement.tables[choice] -= 1;
        arrangement.customers -= 1;
        payload.sum_customers -= 1;

        let emptied = arrangement.tables[choice] == 0;
        if emptied {
            arrangement.tables.swap_remove(choice);
            payload.sum_tables -= 1;
        }
        if arrangement.customers == 0 {
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

    fn seat(&self, payload: &mut Self::Payload, ty: K, tables: &[usize]) {
        if tables.is_empty() {
            return;
        }
        assert!(tables.iter().all(|&n| n > 0), "cannot seat an empty table");
        let arrangement = payload.table_map.entry(ty).or_default();
        let customers: usize = tables.iter().sum();
        arrangement.tables.extend_from_slice(tables);
        arrangement.customers += customers;
        payload.sum_customers += customers;
        payload.sum_tables += tables.len();
    }

    fn table_sizes<R: Rng>(
        &self,
        payload: &Self::Payload,
        ty: &K,
        _discount: f64,
        _rng: &mut R,
    ) -> Vec<usize> {
        payload
            .table_map
            .get(ty)
            .map(|a| a.tables.clone())
            .unwrap_or_default()
    }

    fn describe(&self, payload: &Self::Payload) -> String {
        let types = payload
            .table_map
            .iter()
            .map(|(ty, a)| format!("{ty:?}: {} [{}]", a.customers, a.tables.iter().join(", ")))
            .join("; ");
        format!(
            "c={} t={} | {types}",
            payload.sum_customers, payload.sum_tables
        )
    }

    fn check_consistency(&self, payload: &Self::Payload) -> Result<(), InvariantViolation> {
        let mut customers = 0;
        let mut tables = 0;
        for (ty, arrangement) in &payload.table_map {
            let key = format!("{ty:?}");
            if arrangement.customers == 0 {
                return Err(InvariantViolation::EmptyType { key });
            }
            if arrangement.tables.contains(&0) {
                return Err(InvariantViolation::EmptyTable { key });
            }
            let derived: usize = arrangement.tables.iter().sum();
            if derived != arrangement.customers {
                return Err(InvariantViolation::CustomerSum {
                    key,
                    stored: arrangement.customers,
                    derived,
                });
            }
            customers += arrangement.customers;
            tables += arrangement.tables.len();
        }
        check_totals(payload.sum_customers, customers, payload.sum_tables, tables)
    }
}

/// Compare cached node totals against the per-type sums.
pub(crate) fn check_totals(
    stored_customers: usize,
    customers: usize,
    stored_tables: usize,
    tables: usize,
) -> Result<(), InvariantViolation> {
    if stored_customers != customers {
        return Err(InvariantViolation::Total {
            which: "customer",
            stored: stored_customers,
            derived: customers,
        });
    }
    if stored_tables != tables {
        return Err(InvariantViolation::Total {
            which: "table",
            stored: stored_tables,
            derived: tables,
        });
    }
    Ok(())
}
