//! Arena of node payloads addressed by generational handles.

use std::fmt;
use std::sync::Arc;

use crate::error::PoolError;
use crate::restaurants::{Restaurant, TypeKey};

/// Index of a payload in a [`PayloadPool`].
///
/// A handle outlives its payload harmlessly: once the slot is recycled the
/// generation no longer matches and lookups fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PayloadHandle {
    index: usize,
    generation: u32,
}

impl PayloadHandle {
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Clone)]
struct Slot<P> {
    generation: u32,
    payload: Option<P>,
}

#[derive(Clone)]
pub struct PayloadPool<P> {
    slots: Vec<Slot<P>>,
    free: Vec<usize>,
    init: Arc<dyn Fn() -> P + Send + Sync + 'static>,
}

impl<P> PayloadPool<P> {
    /// Create an empty pool.
    ///
    /// # Arguments
    /// * `init` - Function to create new, empty payloads.
    pub fn new<I: Fn() -> P + Send + Sync + 'static>(init: I) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            init: Arc::new(init),
        }
    }

    /// A pool of empty payloads for `restaurant`.
    pub fn for_restaurant<K, R>(restaurant: R) -> Self
    where
        K: TypeKey,
        R: Restaurant<K, Payload = P> + Send + Sync + 'static,
    {
        Self::new(move || restaurant.make_payload())
    }

    /// Hand out a fresh payload, reusing a recycled slot when one is free.
    pub fn make(&mut self) -> PayloadHandle {
        let payload = (self.init)();
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.payload = Some(payload);
                PayloadHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    payload: Some(payload),
                });
                PayloadHandle {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Release the payload behind `handle`, returning it.
    ///
    /// # Errors
    /// If the handle does not refer to a live payload.
    pub fn recycle(&mut self, handle: PayloadHandle) -> Result<P, PoolError> {
        let slot = self
            .slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(PoolError::StaleHandle {
                index: handle.index,
                generation: handle.generation,
            })?;
        let payload = slot.payload.take().ok_or(PoolError::StaleHandle {
            index: handle.index,
            generation: handle.generation,
        })?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Ok(payload)
    }

    pub fn get(&self, handle: PayloadHandle) -> Option<&P> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.payload.as_ref())
    }

    pub fn get_mut(&mut self, handle: PayloadHandle) -> Option<&mut P> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.payload.as_mut())
    }

    pub fn contains(&self, handle: PayloadHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live payloads.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Live payloads with their handles, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (PayloadHandle, &P)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.payload.as_ref().map(|payload| {
                (
                    PayloadHandle {
                        index,
                        generation: slot.generation,
                    },
                    payload,
                )
            })
        })
    }
}

impl<P> fmt::Debug for PayloadPool<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadPool")
            .field("live", &self.len())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;
    use crate::restaurants::{
        CompactPayload, CompactRestaurant, SimpleFullPayload, SimpleFullRestaurant, StirlingRemoval,
    };

    #[test]
    fn make_and_recycle_reuses_slots() {
        let mut pool = PayloadPool::for_restaurant::<u8, _>(SimpleFullRestaurant);
        let a = pool.make();
        let b = pool.make();
        assert_eq!(pool.len(), 2);
        pool.recycle(a).unwrap();
        assert_eq!(pool.len(), 1);

        let c = pool.make();
        assert_eq!(c.index(), a.index());
        assert_ne!(c.generation(), a.generation());
        assert_eq!(pool.capacity(), 2);
        assert!(pool.contains(b));
        assert!(pool.contains(c));
    }

    #[test]
    fn pools_can_be_shared_between_threads() {
        fn shareable<T: Send + Sync>() {}
        shareable::<PayloadPool<SimpleFullPayload<u8>>>();
        shareable::<PayloadPool<CompactPayload<u8>>>();

        let pool = std::sync::Mutex::new(PayloadPool::for_restaurant::<u8, _>(SimpleFullRestaurant));
        let handles: Vec<_> = std::thread::scope(|scope| {
            (0..4)
                .map(|_| scope.spawn(|| pool.lock().unwrap().make()))
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });
        let pool = pool.into_inner().unwrap();
        assert_eq!(pool.len(), 4);
        assert!(handles.iter().all(|h| pool.contains(*h)));
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut pool = PayloadPool::for_restaurant::<u8, _>(SimpleFullRestaurant);
        let a = pool.make();
        pool.recycle(a).unwrap();
        assert!(pool.get(a).is_none());
        assert!(pool.get_mut(a).is_none());
        assert_eq!(
            pool.recycle(a),
            Err(PoolError::StaleHandle {
                index: a.index(),
                generation: a.generation()
            })
        );

        let reused = pool.make();
        assert!(pool.get(a).is_none());
        assert!(pool.get(reused).is_some());
    }

    #[test]
    fn reused_slots_start_empty() {
        let mut rng = SmallRng::seed_from_u64(11);
        let restaurant = CompactRestaurant::new(StirlingRemoval);
        let mut pool = PayloadPool::for_restaurant::<&str, _>(restaurant);
        let a = pool.make();
        let payload = pool.get_mut(a).unwrap();
        restaurant.add_customer(payload, "x", 0.5, 0.5, 1.0, None, &mut rng);
        assert_eq!(restaurant.total_c(pool.get(a).unwrap()), 1);

        let old = pool.recycle(a).unwrap();
        assert_eq!(restaurant.total_c(&old), 1);
        let b = pool.make();
        assert_eq!(restaurant.total_c(pool.get(b).unwrap()), 0);
    }

    #[test]
    fn iter_skips_free_slots() {
        let mut pool = PayloadPool::new(Vec::<u32>::new);
        let handles: Vec<_> = (0..4).map(|_| pool.make()).collect();
        pool.recycle(handles[1]).unwrap();
        pool.get_mut(handles[2]).unwrap().push(7);
        let live: Vec<_> = pool.iter().map(|(h, p)| (h.index(), p.len())).collect();
        assert_eq!(live, vec![(0, 0), (2, 1), (3, 0)]);
        assert!(!pool.is_empty());
        assert_eq!(format!("{pool:?}"), "PayloadPool { live: 3, capacity: 4, .. }");
    }
}
