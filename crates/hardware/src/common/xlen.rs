//! Architectural word-width abstraction.
//!
//! Cores, register files, and the executor are generic over `Xlen`, which is
//! implemented for `u32` (RV32) and `u64` (RV64). Values cross module
//! boundaries as canonical `u64` (zero-extended to 64 bits); the trait
//! provides the truncation and sign-interpretation helpers the ALU needs.
//! Monomorphization keeps the hot paths free of width branches; only the
//! top-level driver holds a type-erased core.

use std::fmt;

/// Machine word width selector. Implemented for `u32` and `u64`.
pub trait Xlen:
    Copy + Clone + Default + PartialEq + Eq + fmt::Debug + fmt::LowerHex + Send + 'static
{
    /// Architectural width in bits (32 or 64).
    const BITS: u32;
    /// Shift-amount mask (0x1F for RV32, 0x3F for RV64).
    const SHAMT_MASK: u32;
    /// Top bit of `mcause`, set for interrupts.
    const INTERRUPT_BIT: u64;

    /// Truncates a 64-bit value to the architectural width.
    fn from_u64(v: u64) -> Self;
    /// Zero-extends to the canonical 64-bit form.
    fn to_u64(self) -> u64;

    /// Keeps the low `BITS` bits of `v` (canonical zero-extended form).
    fn trunc(v: u64) -> u64;
    /// Interprets the low `BITS` bits of `v` as a signed value.
    fn sext(v: u64) -> i64;
}

macro_rules! impl_xlen {
    ($ty:ty, $signed:ty, $bits:expr, $shamt:expr) => {
        impl Xlen for $ty {
            const BITS: u32 = $bits;
            const SHAMT_MASK: u32 = $shamt;
            const INTERRUPT_BIT: u64 = 1u64 << ($bits - 1);

            #[inline]
            fn from_u64(v: u64) -> Self {
                v as $ty
            }

            #[inline]
            fn to_u64(self) -> u64 {
                self as u64
            }

            #[inline]
            fn trunc(v: u64) -> u64 {
                (v as $ty) as u64
            }

            #[inline]
            fn sext(v: u64) -> i64 {
                (v as $ty) as $signed as i64
            }
        }
    };
}

impl_xlen!(u32, i32, 32, 0x1F);
impl_xlen!(u64, i64, 64, 0x3F);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trunc_rv32() {
        assert_eq!(u32::trunc(0x1_2345_6789), 0x2345_6789);
        assert_eq!(u64::trunc(0x1_2345_6789), 0x1_2345_6789);
    }

    #[test]
    fn test_sext_rv32() {
        assert_eq!(u32::sext(0xFFFF_FFFF), -1);
        assert_eq!(u32::sext(0x7FFF_FFFF), 0x7FFF_FFFF);
        assert_eq!(u64::sext(0xFFFF_FFFF), 0xFFFF_FFFF);
        assert_eq!(u64::sext(u64::MAX), -1);
    }

    #[test]
    fn test_interrupt_bit() {
        assert_eq!(<u32 as Xlen>::INTERRUPT_BIT, 0x8000_0000);
        assert_eq!(<u64 as Xlen>::INTERRUPT_BIT, 0x8000_0000_0000_0000);
    }

    #[test]
    fn test_shamt_mask() {
        assert_eq!(<u32 as Xlen>::SHAMT_MASK, 0x1F);
        assert_eq!(<u64 as Xlen>::SHAMT_MASK, 0x3F);
    }
}
