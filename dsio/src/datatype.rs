//! Data types.
//!
//! A [`DataType`] describes the byte representation of one dataset element:
//!  - [`DataType::Integer`]: signed or unsigned 8, 16, 32, or 64-bit integers,
//!  - [`DataType::Float`]: 16, 32, or 64-bit IEEE 754 floats,
//!  - [`DataType::Compound`]: named members at byte offsets within a fixed-size record, and
//!  - [`DataType::VariableLength`]: a fixed 16-byte descriptor referencing variable-length data elsewhere.
//!
//! Integers and floats are stored in either [`ByteOrder`].
//! Conversions between data types are described by a [`ConversionPath`].

mod conversion;

pub use conversion::{ConversionError, ConversionPath};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The size in bytes of a variable-length element descriptor.
pub const VARIABLE_LENGTH_DESCRIPTOR_SIZE: usize = 16;

/// A byte order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Little endian.
    #[display("little")]
    Little,
    /// Big endian.
    #[display("big")]
    Big,
}

impl ByteOrder {
    /// The native byte order of the target.
    #[cfg(target_endian = "little")]
    pub const NATIVE: Self = Self::Little;

    /// The native byte order of the target.
    #[cfg(target_endian = "big")]
    pub const NATIVE: Self = Self::Big;
}

/// A member of a [`DataType::Compound`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompoundMember {
    /// The member name.
    pub name: String,
    /// The byte offset of the member within the compound element.
    pub offset: usize,
    /// The member data type.
    pub data_type: DataType,
}

impl CompoundMember {
    /// Create a new compound member.
    pub fn new(name: impl Into<String>, offset: usize, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            offset,
            data_type,
        }
    }
}

/// A data type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum DataType {
    /// An integer.
    Integer {
        /// The size in bytes (1, 2, 4, or 8).
        size: usize,
        /// Whether the integer is signed.
        signed: bool,
        /// The byte order.
        byte_order: ByteOrder,
    },
    /// An IEEE 754 floating point number.
    Float {
        /// The size in bytes (2, 4, or 8).
        size: usize,
        /// The byte order.
        byte_order: ByteOrder,
    },
    /// A record of named members.
    Compound {
        /// The size in bytes of each element.
        size: usize,
        /// The members.
        members: Vec<CompoundMember>,
    },
    /// A variable-length element, stored as a fixed-size descriptor.
    VariableLength,
}

/// An invalid data type error.
#[derive(Clone, Debug, Error)]
#[error("invalid data type: {0}")]
pub struct InvalidDataTypeError(String);

macro_rules! native_constructors {
    ($($bits:literal),*) => {
        paste::paste! {
            $(
                #[doc = "A native byte order signed " $bits "-bit integer."]
                #[must_use]
                pub const fn [<int $bits>]() -> Self {
                    Self::Integer {
                        size: $bits / 8,
                        signed: true,
                        byte_order: ByteOrder::NATIVE,
                    }
                }

                #[doc = "A native byte order unsigned " $bits "-bit integer."]
                #[must_use]
                pub const fn [<uint $bits>]() -> Self {
                    Self::Integer {
                        size: $bits / 8,
                        signed: false,
                        byte_order: ByteOrder::NATIVE,
                    }
                }
            )*
        }
    };
}

macro_rules! native_float_constructors {
    ($($bits:literal),*) => {
        paste::paste! {
            $(
                #[doc = "A native byte order " $bits "-bit float."]
                #[must_use]
                pub const fn [<float $bits>]() -> Self {
                    Self::Float {
                        size: $bits / 8,
                        byte_order: ByteOrder::NATIVE,
                    }
                }
            )*
        }
    };
}

impl DataType {
    native_constructors!(8, 16, 32, 64);
    native_float_constructors!(16, 32, 64);

    /// Create a compound data type.
    ///
    /// # Errors
    /// Returns an [`InvalidDataTypeError`] if a member lies outside the element, members overlap, or member names repeat.
    pub fn compound(
        size: usize,
        members: Vec<CompoundMember>,
    ) -> Result<Self, InvalidDataTypeError> {
        let data_type = Self::Compound { size, members };
        data_type.validate()?;
        Ok(data_type)
    }

    /// Return the data type with its byte order replaced.
    ///
    /// Only integers and floats have a byte order; other data types are returned unchanged.
    #[must_use]
    pub fn with_byte_order(self, byte_order: ByteOrder) -> Self {
        match self {
            Self::Integer { size, signed, .. } => Self::Integer {
                size,
                signed,
                byte_order,
            },
            Self::Float { size, .. } => Self::Float { size, byte_order },
            other => other,
        }
    }

    /// Return the size in bytes of one element.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Integer { size, .. } | Self::Float { size, .. } | Self::Compound { size, .. } => {
                *size
            }
            Self::VariableLength => VARIABLE_LENGTH_DESCRIPTOR_SIZE,
        }
    }

    /// Returns true if the data type is variable-length.
    #[must_use]
    pub fn is_variable_length(&self) -> bool {
        matches!(self, Self::VariableLength)
    }

    /// Validate the data type.
    ///
    /// # Errors
    /// Returns an [`InvalidDataTypeError`] if the data type has an unsupported size or an inconsistent compound layout.
    pub fn validate(&self) -> Result<(), InvalidDataTypeError> {
        match self {
            Self::Integer { size, .. } => {
                if ![1, 2, 4, 8].contains(size) {
                    return Err(InvalidDataTypeError(format!(
                        "integers must be 1, 2, 4, or 8 bytes, got {size}"
                    )));
                }
            }
            Self::Float { size, .. } => {
                if ![2, 4, 8].contains(size) {
                    return Err(InvalidDataTypeError(format!(
                        "floats must be 2, 4, or 8 bytes, got {size}"
                    )));
                }
            }
            Self::Compound { size, members } => {
                let mut extents = Vec::with_capacity(members.len());
                for member in members {
                    member.data_type.validate()?;
                    if member.data_type.is_variable_length() {
                        return Err(InvalidDataTypeError(format!(
                            "compound member `{}` is variable-length",
                            member.name
                        )));
                    }
                    let end = member.offset + member.data_type.size();
                    if end > *size {
                        return Err(InvalidDataTypeError(format!(
                            "compound member `{}` ends at byte {end}, beyond the element size {size}",
                            member.name
                        )));
                    }
                    if members.iter().filter(|m| m.name == member.name).count() > 1 {
                        return Err(InvalidDataTypeError(format!(
                            "compound member name `{}` is repeated",
                            member.name
                        )));
                    }
                    extents.push(member.offset..end);
                }
                extents.sort_by_key(|r| r.start);
                if extents.windows(2).any(|w| w[1].start < w[0].end) {
                    return Err(InvalidDataTypeError(
                        "compound members overlap".to_string(),
                    ));
                }
            }
            Self::VariableLength => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_sizes() {
        assert_eq!(DataType::int8().size(), 1);
        assert_eq!(DataType::uint64().size(), 8);
        assert_eq!(DataType::float16().size(), 2);
        assert_eq!(DataType::VariableLength.size(), 16);
        assert!(DataType::float32().validate().is_ok());
        assert!(DataType::Integer {
            size: 3,
            signed: true,
            byte_order: ByteOrder::Big
        }
        .validate()
        .is_err());
    }

    #[test]
    fn data_type_compound_validation() {
        assert!(DataType::compound(
            8,
            vec![
                CompoundMember::new("a", 0, DataType::int32()),
                CompoundMember::new("b", 4, DataType::float32()),
            ],
        )
        .is_ok());
        assert!(DataType::compound(
            8,
            vec![
                CompoundMember::new("a", 0, DataType::int32()),
                CompoundMember::new("b", 2, DataType::float32()),
            ],
        )
        .is_err());
        assert!(
            DataType::compound(4, vec![CompoundMember::new("a", 2, DataType::int32())]).is_err()
        );
        assert!(DataType::compound(
            8,
            vec![
                CompoundMember::new("a", 0, DataType::int32()),
                CompoundMember::new("a", 4, DataType::int32()),
            ],
        )
        .is_err());
    }

    #[test]
    fn data_type_serde() {
        let data_type = DataType::int16().with_byte_order(ByteOrder::Big);
        let json = serde_json::to_string(&data_type).unwrap();
        assert_eq!(
            json,
            r#"{"class":"integer","size":2,"signed":true,"byte_order":"big"}"#
        );
        assert_eq!(serde_json::from_str::<DataType>(&json).unwrap(), data_type);
        let json = serde_json::to_string(&DataType::VariableLength).unwrap();
        assert_eq!(json, r#"{"class":"variable_length"}"#);
    }
}
