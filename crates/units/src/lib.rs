//! Measurement units and quantity conversion.
//!
//! Built-in units fall into two convertible families (mass: `g`/`kg`,
//! volume: `ml`/`l`) plus the count unit `pcs`. User-defined units carry no
//! ratio to anything and only convert to themselves.
//!
//! Cost and stock arithmetic never rejects an unconvertible pair: the value is
//! passed through unscaled and a [`UnitMismatch`] warning travels with it so
//! callers can show that the total may be wrong.

pub mod convert;
pub mod custom;
pub mod unit;

pub use convert::{Converted, UnitMismatch, convert, convert_or_pass_through};
pub use custom::CustomUnit;
pub use unit::{BuiltinUnit, Dimension, UnitSymbol};
