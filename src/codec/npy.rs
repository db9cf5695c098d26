//! Reader and writer for the NumPy `.npy` array file format.
//!
//! Layout: 6-byte magic `\x93NUMPY`, a major/minor version pair, a
//! little-endian header length (`u16` for 1.x, `u32` for 2.x and 3.x),
//! a Python dict literal describing `descr`, `fortran_order` and `shape`,
//! and finally the raw element bytes.

use serde_json::Value;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

/// Errors produced while reading an `.npy` payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The payload does not start with the `.npy` magic string.
    #[error("not an npy file: bad magic string")]
    BadMagic,

    /// The format version is not one this reader understands.
    #[error("unsupported npy format version {0}.{1}")]
    UnsupportedVersion(u8, u8),

    /// The header dict could not be parsed.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The element type is not supported.
    #[error("unsupported dtype {0:?}")]
    UnsupportedDtype(String),

    /// The payload ended before the header or data was complete.
    #[error("payload truncated")]
    Truncated,

    /// Data length does not match the declared shape.
    #[error("expected {expected} data bytes, found {actual}")]
    LengthMismatch {
        /// Bytes implied by shape and dtype.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// The declared shape has more elements than fit in memory.
    #[error("shape element count overflows")]
    ShapeOverflow,
}

/// Element type of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    /// `bool`, one byte per element.
    Bool,
    /// `int8`.
    Int8,
    /// `int16`.
    Int16,
    /// `int32`.
    Int32,
    /// `int64`.
    Int64,
    /// `uint8`.
    UInt8,
    /// `uint16`.
    UInt16,
    /// `uint32`.
    UInt32,
    /// `uint64`.
    UInt64,
    /// `float16` (IEEE 754 half precision).
    Float16,
    /// `float32`.
    Float32,
    /// `float64`.
    Float64,
}

impl DType {
    /// NumPy dtype name, e.g. `"float64"`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float16 => "float16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Bytes per element.
    #[must_use]
    pub const fn item_size(self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 | Self::Float16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Little-endian type descriptor as written by [`encode`].
    const fn descr(self) -> &'static str {
        match self {
            Self::Bool => "|b1",
            Self::Int8 => "|i1",
            Self::Int16 => "<i2",
            Self::Int32 => "<i4",
            Self::Int64 => "<i8",
            Self::UInt8 => "|u1",
            Self::UInt16 => "<u2",
            Self::UInt32 => "<u4",
            Self::UInt64 => "<u8",
            Self::Float16 => "<f2",
            Self::Float32 => "<f4",
            Self::Float64 => "<f8",
        }
    }

    fn parse_descr(descr: &str) -> Result<(Self, Endian), CodecError> {
        let unsupported = || CodecError::UnsupportedDtype(descr.to_string());
        let mut chars = descr.chars();
        let endian = match chars.next() {
            Some('<') | Some('|') => Endian::Little,
            Some('>') => Endian::Big,
            Some('=') if cfg!(target_endian = "big") => Endian::Big,
            Some('=') => Endian::Little,
            _ => return Err(unsupported()),
        };
        let dtype = match chars.as_str() {
            "b1" => Self::Bool,
            "i1" => Self::Int8,
            "i2" => Self::Int16,
            "i4" => Self::Int32,
            "i8" => Self::Int64,
            "u1" => Self::UInt8,
            "u2" => Self::UInt16,
            "u4" => Self::UInt32,
            "u8" => Self::UInt64,
            "f2" => Self::Float16,
            "f4" => Self::Float32,
            "f8" => Self::Float64,
            _ => return Err(unsupported()),
        };
        Ok((dtype, endian))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

/// Typed element storage in C (row-major) order.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// Boolean elements.
    Bool(Vec<bool>),
    /// Signed 8-bit elements.
    Int8(Vec<i8>),
    /// Signed 16-bit elements.
    Int16(Vec<i16>),
    /// Signed 32-bit elements.
    Int32(Vec<i32>),
    /// Signed 64-bit elements.
    Int64(Vec<i64>),
    /// Unsigned 8-bit elements.
    UInt8(Vec<u8>),
    /// Unsigned 16-bit elements.
    UInt16(Vec<u16>),
    /// Unsigned 32-bit elements.
    UInt32(Vec<u32>),
    /// Unsigned 64-bit elements.
    UInt64(Vec<u64>),
    /// Half-precision elements, kept as raw binary16 bit patterns.
    Float16(Vec<u16>),
    /// 32-bit float elements.
    Float32(Vec<f32>),
    /// 64-bit float elements.
    Float64(Vec<f64>),
}

/// Applies `$body` to the inner vector of every variant, re-wrapping the
/// result in the same variant.
macro_rules! map_variants {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ArrayData::Bool($v) => ArrayData::Bool($body),
            ArrayData::Int8($v) => ArrayData::Int8($body),
            ArrayData::Int16($v) => ArrayData::Int16($body),
            ArrayData::Int32($v) => ArrayData::Int32($body),
            ArrayData::Int64($v) => ArrayData::Int64($body),
            ArrayData::UInt8($v) => ArrayData::UInt8($body),
            ArrayData::UInt16($v) => ArrayData::UInt16($body),
            ArrayData::UInt32($v) => ArrayData::UInt32($body),
            ArrayData::UInt64($v) => ArrayData::UInt64($body),
            ArrayData::Float16($v) => ArrayData::Float16($body),
            ArrayData::Float32($v) => ArrayData::Float32($body),
            ArrayData::Float64($v) => ArrayData::Float64($body),
        }
    };
}

/// Evaluates `$body` against the inner vector of any variant.
macro_rules! with_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ArrayData::Bool($v) => $body,
            ArrayData::Int8($v) => $body,
            ArrayData::Int16($v) => $body,
            ArrayData::Int32($v) => $body,
            ArrayData::Int64($v) => $body,
            ArrayData::UInt8($v) => $body,
            ArrayData::UInt16($v) => $body,
            ArrayData::UInt32($v) => $body,
            ArrayData::UInt64($v) => $body,
            ArrayData::Float16($v) => $body,
            ArrayData::Float32($v) => $body,
            ArrayData::Float64($v) => $body,
        }
    };
}

/// Decodes fixed-width numbers from `$bytes` with the given endianness.
macro_rules! read_numbers {
    ($bytes:expr, $ty:ty, $endian:expr) => {{
        const SIZE: usize = std::mem::size_of::<$ty>();
        $bytes
            .chunks_exact(SIZE)
            .map(|chunk| {
                let mut buf = [0u8; SIZE];
                buf.copy_from_slice(chunk);
                match $endian {
                    Endian::Little => <$ty>::from_le_bytes(buf),
                    Endian::Big => <$ty>::from_be_bytes(buf),
                }
            })
            .collect::<Vec<$ty>>()
    }};
}

impl ArrayData {
    /// Element type of the stored values.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::Int8(_) => DType::Int8,
            Self::Int16(_) => DType::Int16,
            Self::Int32(_) => DType::Int32,
            Self::Int64(_) => DType::Int64,
            Self::UInt8(_) => DType::UInt8,
            Self::UInt16(_) => DType::UInt16,
            Self::UInt32(_) => DType::UInt32,
            Self::UInt64(_) => DType::UInt64,
            Self::Float16(_) => DType::Float16,
            Self::Float32(_) => DType::Float32,
            Self::Float64(_) => DType::Float64,
        }
    }

    /// Number of stored elements.
    #[must_use]
    pub fn len(&self) -> usize {
        with_variant!(self, v => v.len())
    }

    /// Returns `true` if there are no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn from_bytes(dtype: DType, endian: Endian, bytes: &[u8]) -> Self {
        match dtype {
            DType::Bool => Self::Bool(bytes.iter().map(|b| *b != 0).collect()),
            DType::Int8 => Self::Int8(read_numbers!(bytes, i8, endian)),
            DType::Int16 => Self::Int16(read_numbers!(bytes, i16, endian)),
            DType::Int32 => Self::Int32(read_numbers!(bytes, i32, endian)),
            DType::Int64 => Self::Int64(read_numbers!(bytes, i64, endian)),
            DType::UInt8 => Self::UInt8(bytes.to_vec()),
            DType::UInt16 => Self::UInt16(read_numbers!(bytes, u16, endian)),
            DType::UInt32 => Self::UInt32(read_numbers!(bytes, u32, endian)),
            DType::UInt64 => Self::UInt64(read_numbers!(bytes, u64, endian)),
            DType::Float16 => Self::Float16(read_numbers!(bytes, u16, endian)),
            DType::Float32 => Self::Float32(read_numbers!(bytes, f32, endian)),
            DType::Float64 => Self::Float64(read_numbers!(bytes, f64, endian)),
        }
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        match self {
            Self::Bool(v) => out.extend(v.iter().map(|b| u8::from(*b))),
            Self::UInt8(v) => out.extend_from_slice(v),
            Self::Int8(v) => out.extend(v.iter().flat_map(|x| x.to_le_bytes())),
            Self::Int16(v) => out.extend(v.iter().flat_map(|x| x.to_le_bytes())),
            Self::Int32(v) => out.extend(v.iter().flat_map(|x| x.to_le_bytes())),
            Self::Int64(v) => out.extend(v.iter().flat_map(|x| x.to_le_bytes())),
            Self::UInt16(v) => out.extend(v.iter().flat_map(|x| x.to_le_bytes())),
            Self::UInt32(v) => out.extend(v.iter().flat_map(|x| x.to_le_bytes())),
            Self::UInt64(v) => out.extend(v.iter().flat_map(|x| x.to_le_bytes())),
            Self::Float16(v) => out.extend(v.iter().flat_map(|x| x.to_le_bytes())),
            Self::Float32(v) => out.extend(v.iter().flat_map(|x| x.to_le_bytes())),
            Self::Float64(v) => out.extend(v.iter().flat_map(|x| x.to_le_bytes())),
        }
    }

    fn to_json_values(&self) -> Vec<Value> {
        match self {
            Self::Float16(v) => v.iter().map(|bits| Value::from(f16_to_f64(*bits))).collect(),
            other => with_variant!(other, v => v.iter().map(|x| Value::from(*x)).collect()),
        }
    }
}

/// Widens an IEEE 754 binary16 bit pattern.
fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 == 0 { 1.0 } else { -1.0 };
    let exponent = i32::from((bits >> 10) & 0x1f);
    let mantissa = f64::from(bits & 0x03ff);
    let magnitude = match exponent {
        0 => mantissa * 2f64.powi(-24),
        0x1f if mantissa == 0.0 => f64::INFINITY,
        0x1f => f64::NAN,
        _ => (1.0 + mantissa / 1024.0) * 2f64.powi(exponent - 15),
    };
    sign * magnitude
}

/// An n-dimensional array held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NpyArray {
    /// Builds an array from a shape and C-ordered elements.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::LengthMismatch`] if the element count does not
    /// match the shape, or [`CodecError::ShapeOverflow`] if the shape's
    /// element count overflows.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self, CodecError> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            let item = data.dtype().item_size();
            return Err(CodecError::LengthMismatch {
                expected: expected.saturating_mul(item),
                actual: data.len().saturating_mul(item),
            });
        }
        Ok(Self { shape, data })
    }

    /// Array dimensions.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element type.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Element storage.
    #[must_use]
    pub const fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Renders the elements as nested JSON lists following the shape.
    ///
    /// A zero-dimensional array renders as a bare scalar. Non-finite floats
    /// render as `null`.
    #[must_use]
    pub fn to_nested_json(&self) -> Value {
        let mut values = self.data.to_json_values().into_iter();
        nest(&mut values, &self.shape)
    }
}

fn nest(values: &mut impl Iterator<Item = Value>, shape: &[usize]) -> Value {
    match shape.split_first() {
        None => values.next().unwrap_or(Value::Null),
        Some((&dim, rest)) => Value::Array((0..dim).map(|_| nest(values, rest)).collect()),
    }
}

fn element_count(shape: &[usize]) -> Result<usize, CodecError> {
    shape
        .iter()
        .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
        .ok_or(CodecError::ShapeOverflow)
}

/// Parses an `.npy` payload.
///
/// # Errors
///
/// Returns a [`CodecError`] describing the first problem found.
pub fn decode(bytes: &[u8]) -> Result<NpyArray, CodecError> {
    let rest = bytes.strip_prefix(MAGIC).ok_or(CodecError::BadMagic)?;
    let (&major, rest) = rest.split_first().ok_or(CodecError::Truncated)?;
    let (&minor, rest) = rest.split_first().ok_or(CodecError::Truncated)?;

    let (header_len, rest) = match major {
        1 => {
            let (len, rest) = split_at_checked(rest, 2)?;
            let len: [u8; 2] = len.try_into().map_err(|_| CodecError::Truncated)?;
            (usize::from(u16::from_le_bytes(len)), rest)
        }
        2 | 3 => {
            let (len, rest) = split_at_checked(rest, 4)?;
            let len: [u8; 4] = len.try_into().map_err(|_| CodecError::Truncated)?;
            let len = u32::from_le_bytes(len);
            let len = usize::try_from(len).map_err(|_| CodecError::Truncated)?;
            (len, rest)
        }
        _ => return Err(CodecError::UnsupportedVersion(major, minor)),
    };

    let (header, body) = split_at_checked(rest, header_len)?;
    let header = std::str::from_utf8(header)
        .map_err(|_| CodecError::MalformedHeader("header is not valid text".to_string()))?;
    let header = Header::parse(header)?;

    let (dtype, endian) = DType::parse_descr(&header.descr)?;
    let count = element_count(&header.shape)?;
    let expected = count
        .checked_mul(dtype.item_size())
        .ok_or(CodecError::ShapeOverflow)?;
    if body.len() != expected {
        return Err(CodecError::LengthMismatch {
            expected,
            actual: body.len(),
        });
    }

    let mut data = ArrayData::from_bytes(dtype, endian, body);
    if header.fortran_order && header.shape.len() > 1 {
        data = map_variants!(data, v => fortran_to_c(&v, &header.shape)?);
    }
    NpyArray::new(header.shape, data)
}

/// Serializes `array` as a version 1.0 (or 2.0 for very large headers)
/// little-endian `.npy` payload in C order.
#[must_use]
pub fn encode(array: &NpyArray) -> Vec<u8> {
    let shape = match array.shape.as_slice() {
        [] => "()".to_string(),
        [only] => format!("({only},)"),
        dims => format!(
            "({})",
            dims.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {shape}, }}",
        array.dtype().descr()
    );

    let long_header = header.len() + 11 > usize::from(u16::MAX);
    let preamble = if long_header { 12 } else { 10 };
    let unpadded = preamble + header.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    header.extend(std::iter::repeat_n(' ', padding));
    header.push('\n');

    let mut out = Vec::with_capacity(
        preamble + header.len() + array.data.len() * array.dtype().item_size(),
    );
    out.extend_from_slice(MAGIC);
    if long_header {
        out.extend_from_slice(&[2, 0]);
        let len = u32::try_from(header.len()).unwrap_or(u32::MAX);
        out.extend_from_slice(&len.to_le_bytes());
    } else {
        out.extend_from_slice(&[1, 0]);
        let len = u16::try_from(header.len()).unwrap_or(u16::MAX);
        out.extend_from_slice(&len.to_le_bytes());
    }
    out.extend_from_slice(header.as_bytes());
    array.data.write_le(&mut out);
    out
}

fn split_at_checked(bytes: &[u8], mid: usize) -> Result<(&[u8], &[u8]), CodecError> {
    bytes.split_at_checked(mid).ok_or(CodecError::Truncated)
}

/// Reorders column-major elements into row-major order.
fn fortran_to_c<T: Copy>(data: &[T], shape: &[usize]) -> Result<Vec<T>, CodecError> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride = 1usize;
    for dim in shape {
        strides.push(stride);
        stride = stride.saturating_mul(*dim);
    }

    let mut index = vec![0usize; shape.len()];
    let mut out = Vec::with_capacity(data.len());
    for _ in 0..data.len() {
        let offset: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
        let value = data.get(offset).copied().ok_or_else(|| {
            CodecError::MalformedHeader("fortran-ordered data does not match shape".to_string())
        })?;
        out.push(value);

        // Row-major increment: last axis fastest.
        for (axis, dim) in shape.iter().enumerate().rev() {
            if let Some(i) = index.get_mut(axis) {
                *i += 1;
                if *i < *dim {
                    break;
                }
                *i = 0;
            }
        }
    }
    Ok(out)
}

#[derive(Debug)]
struct Header {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

impl Header {
    fn parse(text: &str) -> Result<Self, CodecError> {
        let text = text.trim();
        if !(text.starts_with('{') && text.ends_with('}')) {
            return Err(CodecError::MalformedHeader(
                "header is not a dict literal".to_string(),
            ));
        }

        let descr = value_after_key(text, "descr")?;
        let quote = descr
            .chars()
            .next()
            .filter(|c| *c == '\'' || *c == '"')
            .ok_or_else(|| CodecError::MalformedHeader("descr is not a string".to_string()))?;
        let descr = descr
            .get(1..)
            .and_then(|s| s.split(quote).next())
            .ok_or_else(|| CodecError::MalformedHeader("unterminated descr".to_string()))?
            .to_string();

        let fortran = value_after_key(text, "fortran_order")?;
        let fortran_order = if fortran.starts_with("True") {
            true
        } else if fortran.starts_with("False") {
            false
        } else {
            return Err(CodecError::MalformedHeader(
                "fortran_order is not a bool".to_string(),
            ));
        };

        let shape = value_after_key(text, "shape")?;
        let inner = shape
            .strip_prefix('(')
            .and_then(|s| s.split(')').next())
            .ok_or_else(|| CodecError::MalformedHeader("shape is not a tuple".to_string()))?;
        let shape = inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.trim_end_matches('L').parse::<usize>().map_err(|_| {
                    CodecError::MalformedHeader(format!("bad shape dimension {s:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            descr,
            fortran_order,
            shape,
        })
    }
}

/// Returns the text following `'key':`, with leading whitespace removed.
fn value_after_key<'a>(text: &'a str, key: &str) -> Result<&'a str, CodecError> {
    let single = format!("'{key}'");
    let double = format!("\"{key}\"");
    let (pos, len) = text
        .find(&single)
        .map(|p| (p, single.len()))
        .or_else(|| text.find(&double).map(|p| (p, double.len())))
        .ok_or_else(|| CodecError::MalformedHeader(format!("missing key {key:?}")))?;
    text.get(pos + len..)
        .map(str::trim_start)
        .and_then(|s| s.strip_prefix(':'))
        .map(str::trim_start)
        .ok_or_else(|| CodecError::MalformedHeader(format!("missing value for {key:?}")))
}
