//! Opaque identifiers for sensors and factories.
//!
//! Neither identifier carries interpreted structure; the core never parses
//! a sensor or factory id to derive meaning from it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a single monitored sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorId(String);

/// Identifies a factory: a logical grouping of sensors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactoryId(String);

macro_rules! opaque_id {
    ($ty:ident) => {
        impl $ty {
            /// Wrap a raw string as an id. Empty ids are rejected.
            pub fn new(raw: impl Into<String>) -> Result<Self, crate::FleetError> {
                let raw = raw.into();
                if raw.is_empty() {
                    return Err(crate::FleetError::InvariantViolation(format!(
                        "{} cannot be empty",
                        stringify!($ty)
                    )));
                }
                Ok(Self(raw))
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $ty {
            fn from(raw: String) -> Self {
                // Ingestion already drops empty-id payloads before constructing
                // these; this conversion is used in contexts (config, tests)
                // where the string is known non-empty.
                Self(raw)
            }
        }

        impl From<&str> for $ty {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }
    };
}

opaque_id!(SensorId);
opaque_id!(FactoryId);
