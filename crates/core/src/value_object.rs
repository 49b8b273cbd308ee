//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity of their own: a recipe step, an ingredient
/// line or a unit symbol is fully described by its attribute values, and two
/// of them with the same values are interchangeable.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq)]
/// struct StepTiming { minutes: u32 }
///
/// impl ValueObject for StepTiming {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
