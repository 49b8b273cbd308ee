use serde::{Deserialize, Serialize};

use batchworks_core::{DomainError, DomainResult, Entity};

use crate::unit::{BuiltinUnit, UnitSymbol};

/// A user-defined unit ("cup", "sachet"). It has no conversion ratio, so it
/// only ever converts to itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomUnit {
    symbol: String,
    name: String,
}

impl CustomUnit {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> DomainResult<Self> {
        let symbol = symbol.into().trim().to_string();
        let name = name.into().trim().to_string();

        if symbol.is_empty() {
            return Err(DomainError::validation("custom unit symbol cannot be empty"));
        }
        if BuiltinUnit::from_symbol(&symbol).is_some() {
            return Err(DomainError::validation(format!(
                "custom unit symbol '{symbol}' shadows a built-in unit"
            )));
        }
        if name.is_empty() {
            return Err(DomainError::validation("custom unit name cannot be empty"));
        }

        Ok(Self { symbol, name })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_symbol(&self) -> UnitSymbol {
        UnitSymbol::Custom(self.symbol.clone())
    }
}

impl Entity for CustomUnit {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::convert;

    #[test]
    fn rejects_builtin_shadowing() {
        let err = CustomUnit::new("KG", "kilo").unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("shadows")));
    }

    #[test]
    fn rejects_blank_fields() {
        assert!(CustomUnit::new("  ", "cup").is_err());
        assert!(CustomUnit::new("cup", "").is_err());
    }

    #[test]
    fn custom_unit_converts_only_to_itself() {
        let cup = CustomUnit::new("cup", "Cup").unwrap();
        let symbol = cup.unit_symbol();
        assert_eq!(convert(2.0, &symbol, &symbol), Some(2.0));
        assert_eq!(convert(2.0, &symbol, &BuiltinUnit::Milliliter.into()), None);
        assert_eq!(cup.id(), "cup");
    }
}
