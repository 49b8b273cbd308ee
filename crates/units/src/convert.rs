use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::unit::UnitSymbol;

/// Warning: a quantity could not be converted and was used as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[error("cannot convert {from} to {to}; quantity used unconverted")]
pub struct UnitMismatch {
    pub from: UnitSymbol,
    pub to: UnitSymbol,
}

/// Result of a lenient conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Converted {
    pub value: f64,
    pub mismatch: Option<UnitMismatch>,
}

impl Converted {
    pub fn is_exact(&self) -> bool {
        self.mismatch.is_none()
    }
}

/// Convert `value` from one unit into another.
///
/// Same unit is identity; `g`↔`kg` and `ml`↔`l` scale by 1000. Every other
/// pair (cross-family, `pcs` against anything else, any custom unit against a
/// different symbol) is not convertible and yields `None`.
pub fn convert(value: f64, from: &UnitSymbol, to: &UnitSymbol) -> Option<f64> {
    if from == to {
        return Some(value);
    }

    let (from, to) = (from.builtin()?, to.builtin()?);
    if from.dimension() != to.dimension() {
        return None;
    }

    let from_factor = from.base_factor()?;
    let to_factor = to.base_factor()?;
    Some(value * from_factor / to_factor)
}

/// Lenient conversion used by cost and stock arithmetic: an unconvertible
/// quantity is treated as already being in `to`, flagged with a warning.
pub fn convert_or_pass_through(value: f64, from: &UnitSymbol, to: &UnitSymbol) -> Converted {
    match convert(value, from, to) {
        Some(value) => Converted {
            value,
            mismatch: None,
        },
        None => Converted {
            value,
            mismatch: Some(UnitMismatch {
                from: from.clone(),
                to: to.clone(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::BuiltinUnit;
    use proptest::prelude::*;

    fn u(symbol: &str) -> UnitSymbol {
        UnitSymbol::parse(symbol).unwrap()
    }

    #[test]
    fn same_unit_is_identity() {
        assert_eq!(convert(3.5, &u("g"), &u("g")), Some(3.5));
        assert_eq!(convert(2.0, &u("pcs"), &u("pcs")), Some(2.0));
        assert_eq!(convert(1.0, &u("cup"), &u("cup")), Some(1.0));
    }

    #[test]
    fn scales_within_family() {
        assert_eq!(convert(250.0, &u("g"), &u("kg")), Some(0.25));
        assert_eq!(convert(1.5, &u("kg"), &u("g")), Some(1500.0));
        assert_eq!(convert(2.0, &u("l"), &u("ml")), Some(2000.0));
        assert_eq!(convert(500.0, &u("ml"), &u("l")), Some(0.5));
    }

    #[test]
    fn cross_family_and_count_are_not_convertible() {
        assert_eq!(convert(1.0, &u("g"), &u("ml")), None);
        assert_eq!(convert(1.0, &u("l"), &u("kg")), None);
        assert_eq!(convert(1.0, &u("pcs"), &u("g")), None);
        assert_eq!(convert(1.0, &u("kg"), &u("pcs")), None);
        assert_eq!(convert(1.0, &u("cup"), &u("ml")), None);
        assert_eq!(convert(1.0, &u("cup"), &u("tbsp")), None);
    }

    #[test]
    fn pass_through_flags_mismatch() {
        let converted = convert_or_pass_through(3.0, &u("cup"), &u("g"));
        assert_eq!(converted.value, 3.0);
        assert_eq!(
            converted.mismatch,
            Some(UnitMismatch {
                from: u("cup"),
                to: u("g"),
            })
        );
        assert!(!converted.is_exact());

        let exact = convert_or_pass_through(1000.0, &u("g"), &u("kg"));
        assert_eq!(exact.value, 1.0);
        assert!(exact.is_exact());
    }

    fn convertible_pair() -> impl Strategy<Value = (BuiltinUnit, BuiltinUnit)> {
        prop_oneof![
            Just((BuiltinUnit::Gram, BuiltinUnit::Kilogram)),
            Just((BuiltinUnit::Kilogram, BuiltinUnit::Gram)),
            Just((BuiltinUnit::Milliliter, BuiltinUnit::Liter)),
            Just((BuiltinUnit::Liter, BuiltinUnit::Milliliter)),
            Just((BuiltinUnit::Gram, BuiltinUnit::Gram)),
            Just((BuiltinUnit::Piece, BuiltinUnit::Piece)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            ..ProptestConfig::default()
        })]

        /// Property: converting there and back within a family returns the input.
        #[test]
        fn round_trip_within_family(value in 0.0f64..1_000_000.0, (a, b) in convertible_pair()) {
            let (a, b) = (UnitSymbol::from(a), UnitSymbol::from(b));
            let there = convert(value, &a, &b).unwrap();
            let back = convert(there, &b, &a).unwrap();
            prop_assert!((back - value).abs() <= 1e-9 * value.max(1.0));
        }

        /// Property: mass never converts to volume, whatever the value.
        #[test]
        fn mass_to_volume_never_converts(value in -1e6f64..1e6) {
            for from in [BuiltinUnit::Gram, BuiltinUnit::Kilogram] {
                for to in [BuiltinUnit::Milliliter, BuiltinUnit::Liter] {
                    prop_assert_eq!(convert(value, &from.into(), &to.into()), None);
                }
            }
        }
    }
}
