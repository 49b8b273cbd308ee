use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use batchworks_core::{DomainError, ValueObject};

/// Physical dimension of a built-in unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Mass,
    Volume,
    Count,
}

/// Units the system knows how to convert between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinUnit {
    Gram,
    Kilogram,
    Milliliter,
    Liter,
    Piece,
}

impl BuiltinUnit {
    pub const ALL: [BuiltinUnit; 5] = [
        BuiltinUnit::Gram,
        BuiltinUnit::Kilogram,
        BuiltinUnit::Milliliter,
        BuiltinUnit::Liter,
        BuiltinUnit::Piece,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            BuiltinUnit::Gram => "g",
            BuiltinUnit::Kilogram => "kg",
            BuiltinUnit::Milliliter => "ml",
            BuiltinUnit::Liter => "l",
            BuiltinUnit::Piece => "pcs",
        }
    }

    /// Case-insensitive lookup by symbol (`"L"` and `"l"` are both liters).
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let symbol = symbol.trim();
        Self::ALL
            .into_iter()
            .find(|u| u.symbol().eq_ignore_ascii_case(symbol))
    }

    pub fn dimension(self) -> Dimension {
        match self {
            BuiltinUnit::Gram | BuiltinUnit::Kilogram => Dimension::Mass,
            BuiltinUnit::Milliliter | BuiltinUnit::Liter => Dimension::Volume,
            BuiltinUnit::Piece => Dimension::Count,
        }
    }

    /// Multiplier to the smallest unit of the family (`g` or `ml`).
    ///
    /// `None` for `pcs`, which has no family to convert within.
    pub(crate) fn base_factor(self) -> Option<f64> {
        match self {
            BuiltinUnit::Gram | BuiltinUnit::Milliliter => Some(1.0),
            BuiltinUnit::Kilogram | BuiltinUnit::Liter => Some(1000.0),
            BuiltinUnit::Piece => None,
        }
    }
}

impl fmt::Display for BuiltinUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// The unit an inventory item or ingredient is expressed in: either a
/// built-in code or the symbol of a user-defined unit.
///
/// Serialized as the bare symbol string (`"kg"`, `"cup"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UnitSymbol {
    Builtin(BuiltinUnit),
    Custom(String),
}

impl UnitSymbol {
    /// Resolve a symbol; anything that is not a built-in code is custom.
    pub fn parse(symbol: &str) -> Result<Self, DomainError> {
        let trimmed = symbol.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("unit symbol cannot be empty"));
        }
        Ok(match BuiltinUnit::from_symbol(trimmed) {
            Some(unit) => UnitSymbol::Builtin(unit),
            None => UnitSymbol::Custom(trimmed.to_string()),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            UnitSymbol::Builtin(unit) => unit.symbol(),
            UnitSymbol::Custom(symbol) => symbol,
        }
    }

    pub fn builtin(&self) -> Option<BuiltinUnit> {
        match self {
            UnitSymbol::Builtin(unit) => Some(*unit),
            UnitSymbol::Custom(_) => None,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, UnitSymbol::Custom(_))
    }
}

impl ValueObject for UnitSymbol {}

impl Default for UnitSymbol {
    fn default() -> Self {
        UnitSymbol::Builtin(BuiltinUnit::Piece)
    }
}

impl From<BuiltinUnit> for UnitSymbol {
    fn from(value: BuiltinUnit) -> Self {
        UnitSymbol::Builtin(value)
    }
}

impl FromStr for UnitSymbol {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UnitSymbol {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UnitSymbol> for String {
    fn from(value: UnitSymbol) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for UnitSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
