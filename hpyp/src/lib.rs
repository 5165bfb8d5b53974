//! Restaurant bookkeeping for hierarchical Pitman-Yor process language models.
//!
//! Each node of the model's context tree is a Chinese restaurant. A node owns
//! a payload, and a [`Restaurant`](restaurants::Restaurant) interprets it:
//!
//! * [`SimpleFullRestaurant`] and [`HistogramRestaurant`] keep every table.
//! * [`CompactRestaurant`] keeps `(customers, tables)` per type and delegates
//!   removal to a [`RemovalStrategy`](restaurants::RemovalStrategy).
//! * [`KneserNeyRestaurant`] has one table per type.
//!
//! ```
//! use hpyp::restaurants::{CompactRestaurant, Restaurant, StirlingRemoval};
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::SmallRng::seed_from_u64(1);
//! let restaurant = CompactRestaurant::new(StirlingRemoval);
//! let mut node = restaurant.make_payload();
//! for word in ["a", "b", "a"] {
//!     if restaurant.add_customer(&mut node, word, 0.25, 0.5, 1.0, None, &mut rng) {
//!         // a table was opened; seat a customer in the parent as well
//!     }
//! }
//! let p = restaurant.compute_probability(&node, &"a", 0.25, 0.5, 1.0);
//! assert!(p > 0.25);
//! ```

#[cfg(feature = "serde")]
pub mod archive;
pub mod config;
pub mod error;
pub mod pool;
pub mod predictive;
pub mod restaurants;
pub mod seating;
pub mod stirling;
pub mod utils;

pub use config::{PypParams, RestaurantConfig, RestaurantKind};
pub use pool::{PayloadHandle, PayloadPool};
pub use restaurants::{
    AnyRestaurant, CompactRestaurant, HistogramRestaurant, KneserNeyRestaurant,
    SimpleFullRestaurant,
};
