//! Target ABI abstraction.  Every size, alignment, and signedness decision
//! the layout stages make is delegated to an [`Abi`] implementation so that
//! the rest of the compiler contains no architecture specific constants.

use std::fmt::Display;

mod aarch64;

pub use aarch64::AArch64Abi;

/// Properties of a single C primitive type on the target ABI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CType {
    /// The name of this type as it appears in emitted C code.
    pub name: &'static str,
    pub signed: bool,
    pub size: u64,
    pub align: u64,

    /// The number of value bits in the type, when narrower than the storage.
    /// Only `bool` sets this; everywhere else the full `size * 8` bits carry
    /// value.
    pub bitsize: Option<u64>,
}

impl CType {
    pub(super) fn new(name: &'static str, signed: bool, size: u64) -> CType {
        CType {
            name,
            signed,
            size,
            align: size,
            bitsize: None,
        }
    }

    pub(super) fn with_bitsize(name: &'static str, signed: bool, size: u64, bitsize: u64) -> CType {
        CType {
            name,
            signed,
            size,
            align: size,
            bitsize: Some(bitsize),
        }
    }

    fn value_bits(&self) -> u64 {
        self.bitsize.unwrap_or(self.size * 8)
    }

    /// The smallest value representable in this type.
    pub fn min_value(&self) -> i128 {
        if self.signed {
            -(1i128 << (self.value_bits() - 1))
        } else {
            0
        }
    }

    /// The largest value representable in this type.
    pub fn max_value(&self) -> i128 {
        if self.signed {
            (1i128 << (self.value_bits() - 1)) - 1
        } else {
            (1i128 << self.value_bits()) - 1
        }
    }
}

/// The size, alignment, and signedness chosen for an enumeration from the
/// range of its enumerator values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumProperties {
    pub size: u64,
    pub align: u64,
    pub signed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbiError {
    /// The requested ABI name is not one this compiler knows about.
    UnknownAbi(String),

    /// A layout stage asked for the properties of a C type the ABI does not
    /// define.
    UnknownCType(String),

    /// The enumerator values of an enumeration span a range no C integer
    /// type on this ABI can represent.
    EnumRangeUnsupported { min: i128, max: i128 },
}

impl Display for AbiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbiError::UnknownAbi(name) => write!(f, "unknown ABI: {}", name),
            AbiError::UnknownCType(name) => write!(f, "unknown C type: {}", name),
            AbiError::EnumRangeUnsupported { min, max } => {
                write!(f, "enumeration range [{}, {}] not supported", min, max)
            }
        }
    }
}

/// The interface between the layout stages and the target architecture.
///
/// An implementation supplies the primitive C type table, the pointer and
/// register widths, struct member placement, and the integer type selection
/// rules for enumerations.
pub trait Abi: std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn pointer_size(&self) -> u64;
    fn pointer_align(&self) -> u64;
    fn register_size(&self) -> u64;
    fn register_align(&self) -> u64;

    /// Whether plain `char` is a signed type on this ABI.
    fn signed_char(&self) -> bool;

    /// Looks up the properties of a primitive C type by its C name.
    fn c_type(&self, name: &str) -> Result<&CType, AbiError>;

    /// Some type names are aliases whose concrete definition depends on the
    /// ABI.  Returns the C type the alias should be emitted as, or `None` if
    /// the name is not an alias.
    fn map_type_name(&self, name: &str) -> Option<&'static str>;

    /// Places the next member of a struct.
    ///
    /// `current_offset` is the first unoccupied byte and `current_align` the
    /// alignment of the struct so far.  When `next_size` is `Some`, the
    /// returned offset is where a member of `next_align` alignment lands.
    /// When `next_size` is `None` there is no further member and the result
    /// is the total size of the struct, padded out to its alignment.
    fn layout_struct_member(
        &self,
        current_offset: u64,
        current_align: u64,
        next_size: Option<u64>,
        next_align: u64,
    ) -> u64 {
        let align = if next_size.is_some() {
            next_align
        } else {
            current_align
        };
        debug_assert!(align.is_power_of_two());
        (current_offset + align - 1) & !(align - 1)
    }

    /// Chooses the C integer type which backs an enumeration whose
    /// enumerator values lie in `[min, max]`.
    fn enum_properties(&self, min: i128, max: i128) -> Result<EnumProperties, AbiError>;
}

/// Returns the ABI registered under the given name.
pub fn lookup(name: &str) -> Result<Box<dyn Abi>, AbiError> {
    match name {
        "aarch64" => Ok(Box::new(AArch64Abi::new())),
        _ => Err(AbiError::UnknownAbi(name.into())),
    }
}

/// The names accepted by [`lookup`], for the CLI argument validator.
pub const ABI_NAMES: &[&str] = &["aarch64"];

/// The number of bits needed to represent the magnitude of `v`, excluding
/// the sign.  Zero needs no bits.
pub(super) fn bit_length(v: i128) -> u32 {
    128 - v.unsigned_abs().leading_zeros()
}
