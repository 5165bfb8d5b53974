//! Runtime choice of restaurant.
//!
//! [`Restaurant`] has generic methods, so it cannot be boxed. [`AnyRestaurant`]
//! closes over the known variants instead. Payloads and removal data from one
//! variant handed to another are a programming error and panic.

use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{
    CompactPayload, CompactRestaurant, ExpectedTables, HistogramPayload, HistogramRestaurant,
    KneserNeyPayload, KneserNeyRestaurant, Reinstantiating, Restaurant, SimpleFullPayload,
    SimpleFullRestaurant, StirlingRemoval, TypeKey,
};
use crate::config::RestaurantKind;
use crate::error::InvariantViolation;
use crate::stirling::StirlingTable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnyRestaurant {
    SimpleFull(SimpleFullRestaurant),
    Histogram(HistogramRestaurant),
    Reinstantiating(CompactRestaurant<Reinstantiating>),
    Stirling(CompactRestaurant<StirlingRemoval>),
    ExpectedTables(CompactRestaurant<ExpectedTables>),
    KneserNey(KneserNeyRestaurant),
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "K: Serialize",
        deserialize = "K: Ord + Deserialize<'de>"
    ))
)]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnyPayload<K> {
    Full(SimpleFullPayload<K>),
    Histogram(HistogramPayload<K>),
    Compact(CompactPayload<K>),
    KneserNey(KneserNeyPayload<K>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnyRemoval<K> {
    None,
    Seating(SimpleFullPayload<K>),
    Stirling(StirlingTable),
}

impl AnyRestaurant {
    pub const fn kind(&self) -> RestaurantKind {
        match self {
            Self::SimpleFull(_) => RestaurantKind::SimpleFull,
            Self::Histogram(_) => RestaurantKind::Histogram,
            Self::Reinstantiating(_) => RestaurantKind::Reinstantiating,
            Self::Stirling(_) => RestaurantKind::Stirling,
            Self::ExpectedTables(_) => RestaurantKind::ExpectedTables,
            Self::KneserNey(_) => RestaurantKind::KneserNey,
        }
    }
}

impl From<RestaurantKind> for AnyRestaurant {
    fn from(kind: RestaurantKind) -> Self {
        match kind {
            RestaurantKind::SimpleFull => Self::SimpleFull(SimpleFullRestaurant),
            RestaurantKind::Histogram => Self::Histogram(HistogramRestaurant),
            RestaurantKind::Reinstantiating => {
                Self::Reinstantiating(CompactRestaurant::new(Reinstantiating))
            }
            RestaurantKind::Stirling => Self::Stirling(CompactRestaurant::new(StirlingRemoval)),
            RestaurantKind::ExpectedTables => {
                Self::ExpectedTables(CompactRestaurant::new(ExpectedTables))
            }
            RestaurantKind::KneserNey => Self::KneserNey(KneserNeyRestaurant),
        }
    }
}

fn mismatch(restaurant: &AnyRestaurant, what: &str) -> ! {
    panic!("{what} does not belong to a {:?} restaurant", restaurant.kind())
}

/// Run `$body` with the concrete restaurant `$r` and payload `$p`.
macro_rules! with_payload {
    ($self:expr, $payload:expr, |$r:ident, $p:ident| $body:expr) => {
        match ($self, $payload) {
            (AnyRestaurant::SimpleFull($r), AnyPayload::Full($p)) => $body,
            (AnyRestaurant::Histogram($r), AnyPayload::Histogram($p)) => $body,
            (AnyRestaurant::Reinstantiating($r), AnyPayload::Compact($p)) => $body,
            (AnyRestaurant::Stirling($r), AnyPayload::Compact($p)) => $body,
            (AnyRestaurant::ExpectedTables($r), AnyPayload::Compact($p)) => $body,
            (AnyRestaurant::KneserNey($r), AnyPayload::KneserNey($p)) => $body,
            (restaurant, _) => mismatch(restaurant, "payload"),
        }
    };
}

impl<K: TypeKey> Restaurant<K> for AnyRestaurant {
    type Payload = AnyPayload<K>;
    type Removal = AnyRemoval<K>;

    fn make_payload(&self) -> Self::Payload {
        match self {
            Self::SimpleFull(r) => AnyPayload::Full(r.make_payload()),
            Self::Histogram(r) => AnyPayload::Histogram(r.make_payload()),
            Self::Reinstantiating(r) => AnyPayload::Compact(r.make_payload()),
            Self::Stirling(r) => AnyPayload::Compact(r.make_payload()),
            Self::ExpectedTables(r) => AnyPayload::Compact(r.make_payload()),
            Self::KneserNey(r) => AnyPayload::KneserNey(r.make_payload()),
        }
    }

    fn c(&self, payload: &Self::Payload, ty: &K) -> usize {
        with_payload!(self, payload, |r, p| r.c(p, ty))
    }

    fn total_c(&self, payload: &Self::Payload) -> usize {
        with_payload!(self, payload, |r, p| r.total_c(p))
    }

    fn t(&self, payload: &Self::Payload, ty: &K) -> usize {
        with_payload!(self, payload, |r, p| r.t(p, ty))
    }

    fn total_t(&self, payload: &Self::Payload) -> usize {
        with_payload!(self, payload, |r, p| r.total_t(p))
    }

    fn compute_probability(
        &self,
        payload: &Self::Payload,
        ty: &K,
        parent_probability: f64,
        discount: f64,
        concentration: f64,
    ) -> f64 {
        with_payload!(self, payload, |r, p| r.compute_probability(
            p,
            ty,
            parent_probability,
            discount,
            concentration
        ))
    }

    fn type_vector(&self, payload: &Self::Payload) -> Vec<K> {
        with_payload!(self, payload, |r, p| r.type_vector(p))
    }

    fn add_customer<R: Rng>(
        &self,
        payload: &mut Self::Payload,
        ty: K,
        parent_probability: f64,
        discount: f64,
        concentration: f64,
        removal: Option<&mut AnyRemoval<K>>,
        rng: &mut R,
    ) -> bool {
        let (d, k, pp) = (discount, concentration, parent_probability);
        match (self, payload) {
            (Self::SimpleFull(r), AnyPayload::Full(p)) => r.add_customer(p, ty, pp, d, k, None, rng),
            (Self::Histogram(r), AnyPayload::Histogram(p)) => {
                r.add_customer(p, ty, pp, d, k, None, rng)
            }
            (Self::KneserNey(r), AnyPayload::KneserNey(p)) => {
                r.add_customer(p, ty, pp, d, k, None, rng)
            }
            (Self::Reinstantiating(r), AnyPayload::Compact(p)) => {
                let removal = removal.map(|removal| match removal {
                    AnyRemoval::Seating(seating) => seating,
                    _ => mismatch(self, "removal data"),
                });
                r.add_customer(p, ty, pp, d, k, removal, rng)
            }
            (Self::Stirling(r), AnyPayload::Compact(p)) => {
                let removal = removal.map(|removal| stirling_removal(self, removal));
                r.add_customer(p, ty, pp, d, k, removal, rng)
            }
            (Self::ExpectedTables(r), AnyPayload::Compact(p)) => {
                let removal = removal.map(|removal| stirling_removal(self, removal));
                r.add_customer(p, ty, pp, d, k, removal, rng)
            }
            _ => mismatch(self, "payload"),
        }
    }

    fn remove_customer<R: Rng>(
        &self,
        payload: &mut Self::Payload,
        ty: &K,
        discount: f64,
        removal: &mut AnyRemoval<K>,
        rng: &mut R,
    ) -> bool {
        match (self, payload, removal) {
            (Self::SimpleFull(r), AnyPayload::Full(p), AnyRemoval::None) => {
                r.remove_customer(p, ty, discount, &mut (), rng)
            }
            (Self::Histogram(r), AnyPayload::Histogram(p), AnyRemoval::None) => {
                r.remove_customer(p, ty, discount, &mut (), rng)
            }
            (Self::KneserNey(r), AnyPayload::KneserNey(p), AnyRemoval::None) => {
                r.remove_customer(p, ty, discount, &mut (), rng)
            }
            (Self::Reinstantiating(r), AnyPayload::Compact(p), AnyRemoval::Seating(s)) => {
                r.remove_customer(p, ty, discount, s, rng)
            }
            (Self::Stirling(r), AnyPayload::Compact(p), AnyRemoval::Stirling(s)) => {
                r.remove_customer(p, ty, discount, s, rng)
            }
            (Self::ExpectedTables(r), AnyPayload::Compact(p), AnyRemoval::Stirling(s)) => {
                r.remove_customer(p, ty, discount, s, rng)
            }
            _ => mismatch(self, "payload or removal data"),
        }
    }

    fn create_additional_data<R: Rng>(
        &self,
        payload: &Self::Payload,
        discount: f64,
        concentration: f64,
        rng: &mut R,
    ) -> AnyRemoval<K> {
        let (d, k) = (discount, concentration);
        match (self, payload) {
            (Self::SimpleFull(_), AnyPayload::Full(_))
            | (Self::Histogram(_), AnyPayload::Histogram(_))
            | (Self::KneserNey(_), AnyPayload::KneserNey(_)) => AnyRemoval::None,
            (Self::Reinstantiating(r), AnyPayload::Compact(p)) => {
                AnyRemoval::Seating(r.create_additional_data(p, d, k, rng))
            }
            (Self::Stirling(r), AnyPayload::Compact(p)) => {
                AnyRemoval::Stirling(r.create_additional_data(p, d, k, rng))
            }
            (Self::ExpectedTables(r), AnyPayload::Compact(p)) => {
                AnyRemoval::Stirling(r.create_additional_data(p, d, k, rng))
            }
            _ => mismatch(self, "payload"),
        }
    }

    fn seat(&self, payload: &mut Self::Payload, ty: K, tables: &[usize]) {
        with_payload!(self, payload, |r, p| r.seat(p, ty, tables));
    }

    fn table_sizes<R: Rng>(
        &self,
        payload: &Self::Payload,
        ty: &K,
        discount: f64,
        rng: &mut R,
    ) -> Vec<usize> {
        with_payload!(self, payload, |r, p| r.table_sizes(p, ty, discount, rng))
    }

    fn update_after_split<R: Rng>(
        &self,
        longer: &mut Self::Payload,
        shorter: &mut Self::Payload,
        discount_before: f64,
        discount_after: f64,
        parent_only: bool,
        rng: &mut R,
    ) {
        let (before, after) = (discount_before, discount_after);
        match (self, longer, shorter) {
            (Self::SimpleFull(r), AnyPayload::Full(l), AnyPayload::Full(s)) => {
                r.update_after_split(l, s, before, after, parent_only, rng);
            }
            (Self::Histogram(r), AnyPayload::Histogram(l), AnyPayload::Histogram(s)) => {
                r.update_after_split(l, s, before, after, parent_only, rng);
            }
            (Self::Reinstantiating(r), AnyPayload::Compact(l), AnyPayload::Compact(s)) => {
                r.update_after_split(l, s, before, after, parent_only, rng);
            }
            (Self::Stirling(r), AnyPayload::Compact(l), AnyPayload::Compact(s)) => {
                r.update_after_split(l, s, before, after, parent_only, rng);
            }
            (Self::ExpectedTables(r), AnyPayload::Compact(l), AnyPayload::Compact(s)) => {
                r.update_after_split(l, s, before, after, parent_only, rng);
            }
            (Self::KneserNey(r), AnyPayload::KneserNey(l), AnyPayload::KneserNey(s)) => {
                r.update_after_split(l, s, before, after, parent_only, rng);
            }
            _ => mismatch(self, "payload"),
        }
    }

    fn describe(&self, payload: &Self::Payload) -> String {
        with_payload!(self, payload, |r, p| r.describe(p))
    }

    fn check_consistency(&self, payload: &Self::Payload) -> Result<(), InvariantViolation> {
        with_payload!(self, payload, |r, p| r.check_consistency(p))
    }
}

fn stirling_removal<'a, K>(
    restaurant: &AnyRestaurant,
    removal: &'a mut AnyRemoval<K>,
) -> &'a mut StirlingTable {
    match removal {
        AnyRemoval::Stirling(table) => table,
        _ => mismatch(restaurant, "removal data"),
    }
}
