//! Fill values and storage allocation policy.
//!
//! A [`FillValueRecord`] combines an optional [`FillValue`] with two independent policies:
//!  - [`AllocTime`]: when raw storage is materialised, and
//!  - [`FillTime`]: whether newly allocated storage is overwritten with the fill value.
//!
//! Reads of storage that has not been allocated never touch the file: the output is synthesised from the fill value if [`FillValueRecord::writes_fill`] is true, and is left untouched otherwise.

use serde::{Deserialize, Serialize};

/// The fill value of a dataset, in the byte representation of the dataset data type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FillValue(Vec<u8>);

impl core::fmt::Display for FillValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl From<&[u8]> for FillValue {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for FillValue {
    fn from(value: [u8; N]) -> Self {
        Self(value.to_vec())
    }
}

impl From<Vec<u8>> for FillValue {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

macro_rules! impl_from_ne_bytes {
    ($($t:ty),*) => {
        $(
            impl From<$t> for FillValue {
                fn from(value: $t) -> Self {
                    Self(value.to_ne_bytes().to_vec())
                }
            }
        )*
    };
}

impl_from_ne_bytes!(u8, u16, u32, u64, i8, i16, i32, i64, half::f16, f32, f64);

impl FillValue {
    /// Create a new fill value composed of `bytes`.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the size in bytes of the fill value.
    #[must_use]
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// Return the byte representation of the fill value.
    #[must_use]
    pub fn as_ne_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check if the bytes are equal to a sequence of the fill value.
    #[must_use]
    pub fn equals_all(&self, bytes: &[u8]) -> bool {
        if self.0.is_empty() {
            return bytes.is_empty();
        }
        bytes.len() % self.0.len() == 0
            && bytes
                .chunks_exact(self.0.len())
                .all(|element| element == self.0.as_slice())
    }
}

/// When raw storage is allocated.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocTime {
    /// Allocate all storage when the dataset is created, opened, or extended.
    Early,
    /// Allocate chunks as they are first written.
    #[default]
    Incremental,
    /// Allocate all storage on the first write.
    Late,
}

/// When the fill value is written to newly allocated storage.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillTime {
    /// Always write the fill value, or zeros if none is defined.
    Alloc,
    /// Write the fill value only if one is defined.
    #[default]
    IfSet,
    /// Never write the fill value.
    Never,
}

/// The fill value record of a dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillValueRecord {
    /// The fill value, if defined.
    pub value: Option<FillValue>,
    /// The allocation time.
    pub alloc_time: AllocTime,
    /// The fill time.
    pub fill_time: FillTime,
}

impl FillValueRecord {
    /// Create a new fill value record.
    #[must_use]
    pub fn new(value: Option<FillValue>, alloc_time: AllocTime, fill_time: FillTime) -> Self {
        Self {
            value,
            alloc_time,
            fill_time,
        }
    }

    /// Returns true if a fill value is defined.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }

    /// Returns true if newly allocated storage (and reads of unallocated storage) receive the fill value or zeros.
    #[must_use]
    pub fn writes_fill(&self) -> bool {
        match self.fill_time {
            FillTime::Alloc => true,
            FillTime::IfSet => self.is_defined(),
            FillTime::Never => false,
        }
    }

    /// Return `num_elements` fill elements of `element_size` bytes.
    ///
    /// The elements are zero if no fill value is defined.
    #[must_use]
    pub fn fill_bytes(&self, element_size: usize, num_elements: usize) -> Vec<u8> {
        match &self.value {
            Some(value) if value.size() == element_size => value.as_ne_bytes().repeat(num_elements),
            _ => vec![0; element_size * num_elements],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_value_from() {
        assert_eq!(FillValue::from(1u16).as_ne_bytes(), 1u16.to_ne_bytes());
        assert_eq!(FillValue::from(-1.5f32).size(), 4);
        assert_eq!(FillValue::from([1u8, 2]).as_ne_bytes(), &[1, 2]);
        assert!(FillValue::from(7u8).equals_all(&[7, 7, 7]));
        assert!(!FillValue::from(7u8).equals_all(&[7, 0]));
        assert!(!FillValue::from(7u16).equals_all(&[7]));
    }

    #[test]
    fn fill_value_policy() {
        let mut record = FillValueRecord::default();
        assert!(!record.writes_fill());
        record.fill_time = FillTime::Alloc;
        assert!(record.writes_fill());
        assert_eq!(record.fill_bytes(2, 2), vec![0; 4]);
        record.value = Some(FillValue::from(3u16));
        record.fill_time = FillTime::IfSet;
        assert!(record.writes_fill());
        assert_eq!(record.fill_bytes(2, 2), [3u16.to_ne_bytes(), 3u16.to_ne_bytes()].concat());
        record.fill_time = FillTime::Never;
        assert!(!record.writes_fill());
    }

    #[test]
    fn fill_value_record_serde() {
        let record = FillValueRecord::new(
            Some(FillValue::from(7u8)),
            AllocTime::Early,
            FillTime::Alloc,
        );
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"value":[7],"alloc_time":"early","fill_time":"alloc"}"#
        );
        assert_eq!(serde_json::from_str::<FillValueRecord>(&json).unwrap(), record);
    }
}
