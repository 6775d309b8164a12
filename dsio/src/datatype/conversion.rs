use half::f16;
use thiserror::Error;

use super::{ByteOrder, DataType};

/// A data type conversion error.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ConversionError {
    /// There is no conversion path between the data types.
    #[error("no conversion path from {src:?} to {dst:?}")]
    NoPath {
        /// The source data type.
        src: Box<DataType>,
        /// The destination data type.
        dst: Box<DataType>,
    },
    /// A conversion buffer is too small.
    #[error("conversion buffer of {got} bytes is too small, expected at least {expected} bytes")]
    BufferTooSmall {
        /// The required size.
        expected: usize,
        /// The actual size.
        got: usize,
    },
    /// The conversion requires a background buffer but none was supplied.
    #[error("conversion requires a background buffer")]
    MissingBackground,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum NumericClass {
    Signed,
    Unsigned,
    Float,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Numeric {
    class: NumericClass,
    size: usize,
    byte_order: ByteOrder,
}

#[derive(Copy, Clone, Debug)]
enum Value {
    Int(i128),
    Float(f64),
}

impl Numeric {
    fn new(data_type: &DataType) -> Option<Self> {
        match *data_type {
            DataType::Integer {
                size,
                signed,
                byte_order,
            } => Some(Self {
                class: if signed {
                    NumericClass::Signed
                } else {
                    NumericClass::Unsigned
                },
                size,
                byte_order,
            }),
            DataType::Float { size, byte_order } => Some(Self {
                class: NumericClass::Float,
                size,
                byte_order,
            }),
            DataType::Compound { .. } | DataType::VariableLength => None,
        }
    }

    fn int_range(self) -> (i128, i128) {
        let bits = 8 * self.size as u32;
        match self.class {
            NumericClass::Signed => (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1),
            NumericClass::Unsigned | NumericClass::Float => (0, (1i128 << bits) - 1),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn read(self, bytes: &[u8]) -> Value {
        let mut le = [0u8; 8];
        le[..self.size].copy_from_slice(bytes);
        if self.byte_order == ByteOrder::Big {
            le[..self.size].reverse();
        }
        let raw = u64::from_le_bytes(le);
        match self.class {
            NumericClass::Unsigned => Value::Int(i128::from(raw)),
            NumericClass::Signed => {
                let shift = 64 - 8 * self.size as u32;
                Value::Int(i128::from(((raw << shift) as i64) >> shift))
            }
            NumericClass::Float => Value::Float(match self.size {
                2 => f16::from_bits(raw as u16).to_f64(),
                4 => f64::from(f32::from_bits(raw as u32)),
                _ => f64::from_bits(raw),
            }),
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn write(self, value: Value, bytes: &mut [u8]) {
        let raw: u64 = match (self.class, value) {
            (NumericClass::Float, value) => {
                let float = match value {
                    Value::Int(int) => int as f64,
                    Value::Float(float) => float,
                };
                match self.size {
                    2 => u64::from(f16::from_f64(float).to_bits()),
                    4 => u64::from((float as f32).to_bits()),
                    _ => float.to_bits(),
                }
            }
            (_, Value::Int(int)) => {
                let (min, max) = self.int_range();
                num::clamp(int, min, max) as u64
            }
            (_, Value::Float(float)) => {
                let (min, max) = self.int_range();
                let int = if float.is_nan() {
                    0
                } else if float >= max as f64 {
                    max
                } else if float <= min as f64 {
                    min
                } else {
                    float as i128
                };
                int as u64
            }
        };
        let le = raw.to_le_bytes();
        bytes.copy_from_slice(&le[..self.size]);
        if self.byte_order == ByteOrder::Big {
            bytes.reverse();
        }
    }
}

#[derive(Clone, Debug)]
struct MemberConversion {
    src_offset: usize,
    dst_offset: usize,
    path: ConversionPath,
}

#[derive(Clone, Debug)]
enum ConversionKind {
    Noop,
    Numeric { src: Numeric, dst: Numeric },
    Compound { members: Vec<MemberConversion> },
}

/// A conversion path between two data types.
///
/// Numeric conversions are saturating: out of range values clamp to the destination range, and NaN converts to zero for integers.
/// Compound conversions match members by name; destination members absent from the source keep their background value, so the path [needs a background buffer](ConversionPath::needs_background).
/// Variable-length data only converts to itself.
#[derive(Clone, Debug)]
pub struct ConversionPath {
    src: DataType,
    dst: DataType,
    kind: ConversionKind,
    need_bkg: bool,
}

impl ConversionPath {
    /// Find the conversion path from `src` to `dst`.
    ///
    /// # Errors
    /// Returns [`ConversionError::NoPath`] if the data types cannot be converted.
    pub fn new(src: &DataType, dst: &DataType) -> Result<Self, ConversionError> {
        let no_path = || ConversionError::NoPath {
            src: Box::new(src.clone()),
            dst: Box::new(dst.clone()),
        };
        if src == dst {
            return Ok(Self {
                src: src.clone(),
                dst: dst.clone(),
                kind: ConversionKind::Noop,
                need_bkg: false,
            });
        }
        let (kind, need_bkg) = match (src, dst) {
            (
                DataType::Compound {
                    members: src_members,
                    ..
                },
                DataType::Compound {
                    members: dst_members,
                    ..
                },
            ) => {
                let mut need_bkg = false;
                let mut members = Vec::with_capacity(dst_members.len());
                for dst_member in dst_members {
                    if let Some(src_member) = src_members.iter().find(|m| m.name == dst_member.name)
                    {
                        let path = Self::new(&src_member.data_type, &dst_member.data_type)?;
                        need_bkg |= path.need_bkg;
                        members.push(MemberConversion {
                            src_offset: src_member.offset,
                            dst_offset: dst_member.offset,
                            path,
                        });
                    } else {
                        need_bkg = true;
                    }
                }
                (ConversionKind::Compound { members }, need_bkg)
            }
            _ => match (Numeric::new(src), Numeric::new(dst)) {
                (Some(src), Some(dst)) => (ConversionKind::Numeric { src, dst }, false),
                _ => return Err(no_path()),
            },
        };
        Ok(Self {
            src: src.clone(),
            dst: dst.clone(),
            kind,
            need_bkg,
        })
    }

    /// Return the source data type.
    #[must_use]
    pub fn src(&self) -> &DataType {
        &self.src
    }

    /// Return the destination data type.
    #[must_use]
    pub fn dst(&self) -> &DataType {
        &self.dst
    }

    /// Returns true if the source and destination representations are identical.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        matches!(self.kind, ConversionKind::Noop)
    }

    /// Returns true if the conversion must preserve destination contents, and therefore needs a background buffer.
    #[must_use]
    pub fn needs_background(&self) -> bool {
        self.need_bkg
    }

    fn convert_element(&self, src: &[u8], dst: &mut [u8]) {
        match &self.kind {
            ConversionKind::Noop => dst.copy_from_slice(src),
            ConversionKind::Numeric {
                src: src_numeric,
                dst: dst_numeric,
            } => dst_numeric.write(src_numeric.read(src), dst),
            ConversionKind::Compound { members } => {
                for member in members {
                    let src_size = member.path.src.size();
                    let dst_size = member.path.dst.size();
                    member.path.convert_element(
                        &src[member.src_offset..member.src_offset + src_size],
                        &mut dst[member.dst_offset..member.dst_offset + dst_size],
                    );
                }
            }
        }
    }

    /// Convert `nelmts` elements in place.
    ///
    /// `buf` holds the source elements packed at the source element size on input and the destination elements packed at the destination element size on output.
    /// If the path [needs a background buffer](ConversionPath::needs_background), `bkg` must hold the current destination elements.
    ///
    /// # Errors
    /// Returns a [`ConversionError`] if a buffer is too small or a required background buffer is missing.
    pub fn convert(
        &self,
        nelmts: usize,
        buf: &mut [u8],
        bkg: Option<&[u8]>,
    ) -> Result<(), ConversionError> {
        if self.is_noop() {
            return Ok(());
        }
        let src_size = self.src.size();
        let dst_size = self.dst.size();
        let expected = nelmts * std::cmp::max(src_size, dst_size);
        if buf.len() < expected {
            return Err(ConversionError::BufferTooSmall {
                expected,
                got: buf.len(),
            });
        }
        let bkg = if self.need_bkg {
            let bkg = bkg.ok_or(ConversionError::MissingBackground)?;
            if bkg.len() < nelmts * dst_size {
                return Err(ConversionError::BufferTooSmall {
                    expected: nelmts * dst_size,
                    got: bkg.len(),
                });
            }
            Some(bkg)
        } else {
            None
        };

        let mut src_element = vec![0; src_size];
        let mut dst_element = vec![0; dst_size];
        let mut convert = |i: usize| {
            src_element.copy_from_slice(&buf[i * src_size..(i + 1) * src_size]);
            match bkg {
                Some(bkg) => dst_element.copy_from_slice(&bkg[i * dst_size..(i + 1) * dst_size]),
                None => dst_element.fill(0),
            }
            self.convert_element(&src_element, &mut dst_element);
            buf[i * dst_size..(i + 1) * dst_size].copy_from_slice(&dst_element);
        };
        // growing elements are converted back to front so no unread source element is overwritten
        if dst_size > src_size {
            (0..nelmts).rev().for_each(&mut convert);
        } else {
            (0..nelmts).for_each(&mut convert);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::CompoundMember;

    #[test]
    fn conversion_noop() {
        let path = ConversionPath::new(&DataType::int32(), &DataType::int32()).unwrap();
        assert!(path.is_noop());
        assert!(!path.needs_background());
        let path =
            ConversionPath::new(&DataType::VariableLength, &DataType::VariableLength).unwrap();
        assert!(path.is_noop());
        assert!(ConversionPath::new(&DataType::VariableLength, &DataType::int32()).is_err());
        assert!(ConversionPath::new(&DataType::int32(), &DataType::VariableLength).is_err());
    }

    #[test]
    fn conversion_widening_in_place() {
        let path = ConversionPath::new(&DataType::int16(), &DataType::float64()).unwrap();
        let mut buf = vec![0u8; 3 * 8];
        for (i, v) in [-3i16, 0, 1000].iter().enumerate() {
            buf[i * 2..i * 2 + 2].copy_from_slice(&v.to_ne_bytes());
        }
        path.convert(3, &mut buf, None).unwrap();
        let out: Vec<f64> = buf
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(out, vec![-3.0, 0.0, 1000.0]);
    }

    #[test]
    fn conversion_narrowing_saturates() {
        let path = ConversionPath::new(&DataType::float32(), &DataType::uint8()).unwrap();
        let mut buf = Vec::new();
        for v in [-1.5f32, 2.7, 300.0, f32::NAN] {
            buf.extend_from_slice(&v.to_ne_bytes());
        }
        path.convert(4, &mut buf, None).unwrap();
        assert_eq!(&buf[..4], &[0, 2, 255, 0]);

        let path = ConversionPath::new(&DataType::int64(), &DataType::int8()).unwrap();
        let mut buf = Vec::new();
        for v in [-1000i64, -5, 127, 128] {
            buf.extend_from_slice(&v.to_ne_bytes());
        }
        path.convert(4, &mut buf, None).unwrap();
        assert_eq!(&buf[..4], &[128, 251, 127, 127]);
    }

    #[test]
    fn conversion_byte_swap() {
        let big = DataType::uint32().with_byte_order(ByteOrder::Big);
        let path = ConversionPath::new(&big, &DataType::uint32()).unwrap();
        assert!(!path.is_noop());
        let mut buf = vec![0x01, 0x02, 0x03, 0x04];
        path.convert(1, &mut buf, None).unwrap();
        assert_eq!(u32::from_ne_bytes(buf.try_into().unwrap()), 0x0102_0304);
    }

    #[test]
    fn conversion_float16() {
        let path = ConversionPath::new(&DataType::float64(), &DataType::float16()).unwrap();
        let mut buf = 1.5f64.to_ne_bytes().to_vec();
        path.convert(1, &mut buf, None).unwrap();
        assert_eq!(
            f16::from_ne_bytes([buf[0], buf[1]]),
            f16::from_f32(1.5)
        );
    }

    #[test]
    fn conversion_compound_background() {
        let src = DataType::compound(
            6,
            vec![
                CompoundMember::new("b", 0, DataType::uint16()),
                CompoundMember::new("a", 2, DataType::int32()),
            ],
        )
        .unwrap();
        let dst = DataType::compound(
            16,
            vec![
                CompoundMember::new("a", 0, DataType::int64()),
                CompoundMember::new("c", 8, DataType::float64()),
            ],
        )
        .unwrap();
        let path = ConversionPath::new(&src, &dst).unwrap();
        assert!(path.needs_background());

        let mut buf = vec![0u8; 2 * 16];
        for (i, (b, a)) in [(7u16, -2i32), (9, 40)].iter().enumerate() {
            buf[i * 6..i * 6 + 2].copy_from_slice(&b.to_ne_bytes());
            buf[i * 6 + 2..i * 6 + 6].copy_from_slice(&a.to_ne_bytes());
        }
        let mut bkg = vec![0u8; 2 * 16];
        for i in 0..2 {
            bkg[i * 16 + 8..i * 16 + 16]
                .copy_from_slice(&(0.5f64 * (i as f64 + 1.0)).to_ne_bytes());
        }
        assert!(matches!(
            path.convert(2, &mut buf.clone(), None),
            Err(ConversionError::MissingBackground)
        ));
        path.convert(2, &mut buf, Some(&bkg)).unwrap();
        let a0 = i64::from_ne_bytes(buf[0..8].try_into().unwrap());
        let c0 = f64::from_ne_bytes(buf[8..16].try_into().unwrap());
        let a1 = i64::from_ne_bytes(buf[16..24].try_into().unwrap());
        let c1 = f64::from_ne_bytes(buf[24..32].try_into().unwrap());
        assert_eq!((a0, c0, a1, c1), (-2, 0.5, 40, 1.0));
    }

    #[test]
    fn conversion_buffer_too_small() {
        let path = ConversionPath::new(&DataType::int8(), &DataType::int32()).unwrap();
        let mut buf = vec![0u8; 7];
        assert!(matches!(
            path.convert(2, &mut buf, None),
            Err(ConversionError::BufferTooSmall { expected: 8, got: 7 })
        ));
    }
}
