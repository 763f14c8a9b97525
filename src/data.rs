//! Traits and impls used to convert values to and from the process image.

use core::fmt;

/**
    trait for data types than can be stored in a domain slot or transfered in a parameter request

    The raw form is the content of a slot right-aligned in a `u64`, as the driver reads it. The packed form is the little-endian byte sequence exchanged on the bus.
*/
pub trait PduData: Sized {
    const ID: TypeId;
    /// number of bits this type occupies on the bus
    const BITS: u8;

    fn pack(&self, dst: &mut [u8]) -> PackingResult<()>;
    fn unpack(src: &[u8]) -> PackingResult<Self>;

    fn to_raw(&self) -> u64;
    fn from_raw(raw: u64) -> Self;

    fn packed_size() -> usize  {(usize::from(Self::BITS) + 7) / 8}
}

/// Enum to identify and raise adapted error raised by this package
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PackingError {
    BadSize(usize, &'static str),
    InvalidValue(&'static str),
}

pub type PackingResult<T> = Result<T, PackingError>;

/**
    dtype identifiers associated to dtypes allowing to dynamically check the type of a [PduData] implementor
*/
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TypeId {
    BOOL,
    I8, I16, I32, I64,
    U8, U16, U32, U64,
    F32, F64,
}

impl PduData for bool {
    const ID: TypeId = TypeId::BOOL;
    const BITS: u8 = 1;

    fn pack(&self, dst: &mut [u8]) -> PackingResult<()>  {
        if dst.is_empty()
            {return Err(PackingError::BadSize(dst.len(), "no byte to pack a bool"))}
        dst[0] = if *self {0b1} else {0b0};
        Ok(())
    }
    fn unpack(src: &[u8]) -> PackingResult<Self>  {
        if src.is_empty()
            {return Err(PackingError::BadSize(src.len(), "no byte to unpack a bool"))}
        Ok(src[0] & 0b1 == 0b1)
    }
    fn to_raw(&self) -> u64  {u64::from(*self)}
    fn from_raw(raw: u64) -> Self  {raw & 0b1 != 0}
}

/// macro implementing [PduData] for integer types, `$u` is the unsigned integer of the same size
macro_rules! num_pdudata {
    ($t: ty, $u: ty, $id: ident) => { impl crate::data::PduData for $t {
        const ID: crate::data::TypeId = crate::data::TypeId::$id;
        const BITS: u8 = <$t>::BITS as u8;

        fn pack(&self, dst: &mut [u8]) -> crate::data::PackingResult<()> {
            let size = core::mem::size_of::<$t>();
            if dst.len() < size
                {return Err(crate::data::PackingError::BadSize(dst.len(), "not enough bytes for integer"))}
            dst[.. size].copy_from_slice(&self.to_le_bytes());
            Ok(())
        }
        fn unpack(src: &[u8]) -> crate::data::PackingResult<Self> {
            let size = core::mem::size_of::<$t>();
            Ok(Self::from_le_bytes(src.get(.. size)
                .and_then(|s| s.try_into().ok())
                .ok_or(crate::data::PackingError::BadSize(src.len(), "not enough bytes for integer"))?
                ))
        }
        fn to_raw(&self) -> u64  {*self as $u as u64}
        fn from_raw(raw: u64) -> Self  {raw as $u as $t}
    }};
}

/// macro implementing [PduData] for float types, `$u` is the integer holding its bits
macro_rules! float_pdudata {
    ($t: ty, $u: ty, $id: ident) => { impl crate::data::PduData for $t {
        const ID: crate::data::TypeId = crate::data::TypeId::$id;
        const BITS: u8 = <$u>::BITS as u8;

        fn pack(&self, dst: &mut [u8]) -> crate::data::PackingResult<()> {
            self.to_bits().pack(dst)
        }
        fn unpack(src: &[u8]) -> crate::data::PackingResult<Self> {
            <$u>::unpack(src).map(<$t>::from_bits)
        }
        fn to_raw(&self) -> u64  {u64::from(self.to_bits())}
        fn from_raw(raw: u64) -> Self  {<$t>::from_bits(raw as $u)}
    }};
}

num_pdudata!(u8, u8, U8);
num_pdudata!(u16, u16, U16);
num_pdudata!(u32, u32, U32);
num_pdudata!(u64, u64, U64);
num_pdudata!(i8, u8, I8);
num_pdudata!(i16, u16, I16);
num_pdudata!(i32, u32, I32);
num_pdudata!(i64, u64, I64);
float_pdudata!(f32, u32, F32);
float_pdudata!(f64, u64, F64);


/// whether a slot of this bit size can be exchanged with the bus
pub fn supported(bitsize: u8) -> bool {
    matches!(bitsize, 1 | 8 | 16 | 32 | 64)
}

/**
    reverse the byte order of a raw value of the given bit size

    only 16, 32 and 64 bit values are swapped, bits and bytes are returned unchanged
*/
pub fn swap(raw: u64, bitsize: u8) -> u64 {
    match bitsize {
        16 => u64::from((raw as u16).swap_bytes()),
        32 => u64::from((raw as u32).swap_bytes()),
        64 => raw.swap_bytes(),
        _ => raw,
    }
}

/**
    value of a domain slot, interpreted according to its bit size and signedness

    64 bit values are always exposed unsigned
*/
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Bit(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
}

impl Value {
    /// interpret a raw slot content, `None` is returned for bit sizes that cannot be exchanged
    pub fn new(raw: u64, bitsize: u8, signed: bool) -> Option<Self> {
        Some(match (bitsize, signed) {
            (1, _) => Self::Bit(raw & 1 != 0),
            (8, false) => Self::U8(raw as u8),
            (8, true) => Self::I8(raw as u8 as i8),
            (16, false) => Self::U16(raw as u16),
            (16, true) => Self::I16(raw as u16 as i16),
            (32, false) => Self::U32(raw as u32),
            (32, true) => Self::I32(raw as u32 as i32),
            (64, _) => Self::U64(raw),
            _ => return None,
        })
    }
    /// the raw slot content this value comes from
    pub fn raw(&self) -> u64 {
        match *self {
            Self::Bit(v) => v.to_raw(),
            Self::U8(v) => v.to_raw(),
            Self::I8(v) => v.to_raw(),
            Self::U16(v) => v.to_raw(),
            Self::I16(v) => v.to_raw(),
            Self::U32(v) => v.to_raw(),
            Self::I32(v) => v.to_raw(),
            Self::U64(v) => v,
        }
    }
    /// the numeric value, with its sign. 64 bit values above `i64::MAX` wrap
    pub fn as_i64(&self) -> i64 {
        match *self {
            Self::Bit(v) => i64::from(v),
            Self::U8(v) => i64::from(v),
            Self::I8(v) => i64::from(v),
            Self::U16(v) => i64::from(v),
            Self::I16(v) => i64::from(v),
            Self::U32(v) => i64::from(v),
            Self::I32(v) => i64::from(v),
            Self::U64(v) => v as i64,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bit(v) => write!(f, "{}", v),
            Self::U64(v) => write!(f, "{}", v),
            other => write!(f, "{}", other.as_i64()),
        }
    }
}
