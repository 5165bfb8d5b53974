use std::collections::BTreeMap;

use itertools::Itertools;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::simple_full::check_totals;
use super::{Restaurant, TypeKey};
use crate::error::InvariantViolation;
use crate::utils::sample_unnormalized;

/// Tables of one type, grouped by size.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistogramArrangement {
    pub customers: usize,
    pub tables: usize,
    /// table size -> number of tables of that size
    pub histogram: BTreeMap<usize, usize>,
}

impl HistogramArrangement {
    fn insert(&mut self, size: usize, count: usize) {
        *self.histogram.entry(size).or_insert(0) += count;
    }

    fn take(&mut self, size: usize) {
        if let Some(count) = self.histogram.get_mut(&size) {
            *count -= 1;
            if *count == 0 {
                self.histogram.remove(&size);
            }
        }
    }
}

/// Table sizes as a `size -> count` histogram per type.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "K: Serialize",
        deserialize = "K: Ord + Deserialize<'de>"
    ))
)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistogramPayload<K> {
    #[cfg_attr(feature = "serde", serde(default))]
    table_map: BTreeMap<K, HistogramArrangement>,
    #[cfg_attr(feature = "serde", serde(default))]
    sum_customers: usize,
    #[cfg_attr(feature = "serde", serde(default))]
    sum_tables: usize,
}

impl<K> Default for HistogramPayload<K> {
    fn default() -> Self {
        Self {
            table_map: BTreeMap::new(),
            sum_customers: 0,
            sum_tables: 0,
        }
    }
}

impl<K: Ord> HistogramPayload<K> {
    pub fn arrangement(&self, ty: &K) -> Option<&HistogramArrangement> {
        self.table_map.get(ty)
    }
}

/// Exact like [`super::SimpleFullRestaurant`], but many equal tables share a bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HistogramRestaurant;

impl<K: TypeKey> Restaurant<K> for HistogramRestaurant {
    type Payload = HistogramPayload<K>;
    type Removal = ();

    fn make_payload(&self) -> Self::Payload {
        HistogramPayload::default()
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

        let joined = if arrangement.customers == 0 {
            None
        } else {
            let sizes: Vec<usize> = arrangement.histogram.keys().copied().collect();
            let mut weights: Vec<f64> = arrangement
                .histogram
                .iter()
                .map(|(&size, &count)| (size as f64 - discount) * count as f64)
                .collect();
            weights.push(discount.mul_add(open_tables, concentration) * parent_probability);
            sizes.get(sample_unnormalized(&weights, None, rng)).copied()
        };

        arrangement.customers += 1;
        payload.sum_customers += 1;
        match joined {
            Some(size) => {
                arrangement.take(size);
                arrangement.insert(size + 1, 1);
                false
            }
            None => {
                arrangement.insert(1, 1);
                arrangement.tables += 1;
                payload.sum_tables += 1;
                true
            }
        }
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

        let (sizes, weights): (Vec<usize>, Vec<f64>) = arrangement
            .histogram
            .iter()
            .map(|(&size, &count)| (size, (size * count) as f64))
            .unzip();
        let size = sizes[sample_unnormalized(&weights, None, rng)];

        arrangement.take(size);
        arrangement.customers -= 1;
        payload.sum_customers -= 1;
        let emptied = size == 1;
        if emptied {
            arrangement.tables -= 1;
            payload.sum_tables -= 1;
        } else {
            arrangement.insert(size - 1, 1);
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
        for (size, count) in tables.iter().copied().counts() {
            arrangement.insert(size, count);
        }
        let customers: usize = tables.iter().sum();
        arrangement.customers += customers;
        arrangement.tables += tables.len();
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
        payload.table_map.get(ty).map_or_else(Vec::new, |a| {
            a.histogram
                .iter()
                .flat_map(|(&size, &count)| std::iter::repeat_n(size, count))
                .collect()
        })
    }

    fn describe(&self, payload: &Self::Payload) -> String {
        let types = payload
            .table_map
            .iter()
            .map(|(ty, a)| {
                let buckets = a
                    .histogram
                    .iter()
                    .map(|(size, count)| format!("{size}x{count}"))
                    .join(" ");
                format!("{ty:?}: {}/{} [{buckets}]", a.customers, a.tables)
            })
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
            if let Some((&size, _)) = arrangement.histogram.iter().find(|(_, &count)| count == 0) {
                return Err(InvariantViolation::EmptyBucket { key, size });
            }
            if arrangement.histogram.contains_key(&0) {
                return Err(InvariantViolation::EmptyTable { key });
            }
            let derived_customers: usize = arrangement.histogram.iter().map(|(s, n)| s * n).sum();
            if derived_customers != arrangement.customers {
                return Err(InvariantViolation::CustomerSum {
                    key,
                    stored: arrangement.customers,
                    derived: derived_customers,
                });
            }
            let derived_tables: usize = arrangement.histogram.values().sum();
            if derived_tables != arrangement.tables {
                return Err(InvariantViolation::TableSum {
                    key,
                    stored: arrangement.tables,
                    derived: derived_tables,
                });
            }
            customers += arrangement.customers;
            tables += arrangement.tables;
        }
        check_totals(payload.sum_customers, customers, payload.sum_tables, tables)
    }
}
