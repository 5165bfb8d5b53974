//! Pitman-Yor parameters and restaurant selection.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::restaurants::AnyRestaurant;

/// Discount and concentration of one node.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PypParams {
    discount: f64,
    concentration: f64,
}

impl PypParams {
    /// Create new parameters.
    ///
    /// # Errors
    /// Unless `0 <= discount < 1` and `concentration > -discount`, both finite.
    pub fn new(discount: f64, concentration: f64) -> Result<Self, ConfigError> {
        if !(0.0..1.0).contains(&discount) {
            return Err(ConfigError::DiscountOutOfRange { discount });
        }
        if !concentration.is_finite() || concentration <= -discount {
            return Err(ConfigError::ConcentrationTooLow {
                discount,
                concentration,
            });
        }
        Ok(Self::new_unchecked(discount, concentration))
    }

    /// Create new parameters without checking them.
    #[must_use]
    pub const fn new_unchecked(discount: f64, concentration: f64) -> Self {
        Self {
            discount,
            concentration,
        }
    }

    #[must_use]
    pub const fn discount(&self) -> f64 {
        self.discount
    }

    #[must_use]
    pub const fn concentration(&self) -> f64 {
        self.concentration
    }
}

/// The available seating representations.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RestaurantKind {
    SimpleFull,
    Histogram,
    Reinstantiating,
    #[default]
    Stirling,
    ExpectedTables,
    KneserNey,
}

impl RestaurantKind {
    /// Whether removals are exact without any removal data.
    #[must_use]
    pub const fn tracks_tables(&self) -> bool {
        matches!(self, Self::SimpleFull | Self::Histogram)
    }
}

/// A restaurant choice with the parameters it is used with.
///
/// ```json
/// { "kind": "stirling", "discount": 0.5, "concentration": 1.0 }
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestaurantConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub kind: RestaurantKind,
    pub discount: f64,
    pub concentration: f64,
}

impl RestaurantConfig {
    /// # Errors
    /// If the parameters are out of range.
    pub fn params(&self) -> Result<PypParams, ConfigError> {
        PypParams::new(self.discount, self.concentration)
    }

    /// Parse and validate a JSON config document.
    ///
    /// # Errors
    /// If the document is malformed or the parameters are out of range.
    #[cfg(feature = "serde")]
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.params()?;
        Ok(config)
    }

    #[must_use]
    pub fn build(&self) -> AnyRestaurant {
        AnyRestaurant::from(self.kind)
    }
}
