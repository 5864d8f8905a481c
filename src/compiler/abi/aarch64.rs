use std::collections::HashMap;

use super::{bit_length, Abi, AbiError, CType, EnumProperties};

const POINTER_SIZE: u64 = 8;
const REGISTER_SIZE: u64 = 8;

/// The AArch64 ABI.  64 bit pointers and registers, and plain `char` is a
/// signed type.
#[derive(Debug)]
pub struct AArch64Abi {
    c_types: HashMap<&'static str, CType>,
}

impl AArch64Abi {
    pub fn new() -> AArch64Abi {
        let table = [
            CType::with_bitsize("bool", false, 1, 1),
            CType::new("uint8_t", false, 1),
            CType::new("uint16_t", false, 2),
            CType::new("uint32_t", false, 4),
            CType::new("uint64_t", false, 8),
            CType::new("uintptr_t", false, POINTER_SIZE),
            CType::new("int8_t", true, 1),
            CType::new("int16_t", true, 2),
            CType::new("int32_t", true, 4),
            CType::new("int64_t", true, 8),
            CType::new("intptr_t", true, POINTER_SIZE),
            CType::new("char", true, 1),
            CType::new("size_t", false, POINTER_SIZE),
            CType::new("uregister_t", false, REGISTER_SIZE),
            CType::new("sregister_t", true, REGISTER_SIZE),
        ];

        AArch64Abi {
            c_types: table.iter().map(|t| (t.name, *t)).collect(),
        }
    }
}

impl Default for AArch64Abi {
    fn default() -> Self {
        Self::new()
    }
}

impl Abi for AArch64Abi {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn pointer_size(&self) -> u64 {
        POINTER_SIZE
    }

    fn pointer_align(&self) -> u64 {
        POINTER_SIZE
    }

    fn register_size(&self) -> u64 {
        REGISTER_SIZE
    }

    fn register_align(&self) -> u64 {
        REGISTER_SIZE
    }

    fn signed_char(&self) -> bool {
        true
    }

    fn c_type(&self, name: &str) -> Result<&CType, AbiError> {
        self.c_types
            .get(name)
            .ok_or_else(|| AbiError::UnknownCType(name.into()))
    }

    fn map_type_name(&self, name: &str) -> Option<&'static str> {
        match name {
            "uregister_t" => Some("uint64_t"),
            "sregister_t" => Some("int64_t"),
            _ => None,
        }
    }

    /// The register width types hold a full machine register, so the choice
    /// here only ever selects a 32 or 64 bit integer.
    fn enum_properties(&self, min: i128, max: i128) -> Result<EnumProperties, AbiError> {
        let signed = min < 0;
        let min_bits = bit_length(min);
        let max_bits = bit_length(max);

        if !signed && max_bits <= 32 {
            Ok(EnumProperties {
                size: 4,
                align: 4,
                signed: false,
            })
        } else if signed && max_bits <= 31 && min_bits <= 32 {
            Ok(EnumProperties {
                size: 4,
                align: 4,
                signed: true,
            })
        } else if !signed && max_bits <= 64 {
            Ok(EnumProperties {
                size: 8,
                align: 8,
                signed: false,
            })
        } else if signed && max_bits <= 63 && min_bits <= 64 {
            Ok(EnumProperties {
                size: 8,
                align: 8,
                signed: true,
            })
        } else {
            Err(AbiError::EnumRangeUnsupported { min, max })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_type_table() {
        let abi = AArch64Abi::new();

        let u32t = abi.c_type("uint32_t").unwrap();
        assert_eq!(u32t.size, 4);
        assert_eq!(u32t.align, 4);
        assert!(!u32t.signed);

        let c = abi.c_type("char").unwrap();
        assert_eq!(c.size, 1);
        assert!(c.signed);

        let b = abi.c_type("bool").unwrap();
        assert_eq!(b.size, 1);
        assert_eq!(b.bitsize, Some(1));

        assert_eq!(abi.c_type("size_t").unwrap().size, 8);
        assert!(abi.c_type("float").is_err());
    }

    #[test]
    fn register_aliases_map_to_fixed_width_types() {
        let abi = AArch64Abi::new();
        assert_eq!(abi.map_type_name("uregister_t"), Some("uint64_t"));
        assert_eq!(abi.map_type_name("sregister_t"), Some("int64_t"));
        assert_eq!(abi.map_type_name("uint32_t"), None);
    }

    #[test]
    fn member_placement_pads_to_alignment() {
        let abi = AArch64Abi::new();

        // a uint64_t after a uint32_t lands at offset 8
        assert_eq!(abi.layout_struct_member(4, 4, Some(8), 8), 8);

        // a uint8_t packs in with no padding
        assert_eq!(abi.layout_struct_member(4, 4, Some(1), 1), 4);

        // the trailing call pads the size out to the struct alignment
        assert_eq!(abi.layout_struct_member(12, 8, None, 0), 16);
        assert_eq!(abi.layout_struct_member(16, 8, None, 0), 16);
    }

    #[test]
    fn enum_fits_in_unsigned_32() {
        let abi = AArch64Abi::new();
        let p = abi.enum_properties(0, 255).unwrap();
        assert_eq!((p.size, p.align, p.signed), (4, 4, false));

        let p = abi.enum_properties(0, u32::MAX as i128).unwrap();
        assert_eq!((p.size, p.align, p.signed), (4, 4, false));
    }

    #[test]
    fn enum_with_negative_value_is_signed() {
        let abi = AArch64Abi::new();
        let p = abi.enum_properties(-1, 100).unwrap();
        assert_eq!((p.size, p.align, p.signed), (4, 4, true));

        let p = abi.enum_properties(i32::MIN as i128, 0).unwrap();
        assert_eq!((p.size, p.align, p.signed), (4, 4, true));
    }

    #[test]
    fn enum_widens_to_64_bits() {
        let abi = AArch64Abi::new();
        let p = abi.enum_properties(0, 1 << 40).unwrap();
        assert_eq!((p.size, p.align, p.signed), (8, 8, false));

        let p = abi.enum_properties(-(1 << 40), 0).unwrap();
        assert_eq!((p.size, p.align, p.signed), (8, 8, true));
    }

    #[test]
    fn enum_range_too_wide_is_rejected() {
        let abi = AArch64Abi::new();
        assert!(abi.enum_properties(0, 1 << 70).is_err());
        assert!(abi.enum_properties(-1, u64::MAX as i128).is_err());
    }
}
