//! IR value types.

use std::fmt;

/// The type a node's value carries.
///
/// `Int8`/`Int16` appear only as constant and store widths; narrow loads widen
/// to `Int32` in registers (signedness chosen by the opcode). `Address` is
/// modelled as up to 64 bits at the IR level; the backend narrows it to the
/// target's pointer width. Vectors are fixed 128-bit, four lanes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Address,
    VectorInt32,
    VectorFloat,
    Mask,
    Void,
}

impl DataType {
    /// Bit width of a scalar value of this type (vectors report the full
    /// 128-bit width, masks one bit per lane).
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            DataType::Int8 => 8,
            DataType::Int16 => 16,
            DataType::Int32 | DataType::Float => 32,
            DataType::Int64 | DataType::Double | DataType::Address => 64,
            DataType::VectorInt32 | DataType::VectorFloat => 128,
            DataType::Mask => 4,
            DataType::Void => 0,
        }
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }

    #[must_use]
    pub fn is_vector(self) -> bool {
        matches!(self, DataType::VectorInt32 | DataType::VectorFloat)
    }

    /// Number of lanes for vector and mask types.
    pub const LANES: usize = 4;
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Address => "address",
            DataType::VectorInt32 => "vector<int32>",
            DataType::VectorFloat => "vector<float>",
            DataType::Mask => "mask",
            DataType::Void => "void",
        };
        f.write_str(s)
    }
}
