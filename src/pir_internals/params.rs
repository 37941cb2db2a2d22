pub const BIT_SECURITY_LEVEL: usize = 128;
pub const BLOCK_BYTE_LEN: usize = BIT_SECURITY_LEVEL / 8;
pub const SEED_BYTE_LEN: usize = (2 * BIT_SECURITY_LEVEL) / 8;

/// Single-point DPFs only, one non-zero point per key pair.
pub const DPF_SUPPORTED_NUM_POINTS: u64 = 1;

/// Low 128 bits of the reduction polynomial x^128 + x^7 + x^2 + x + 1, with bit `i` holding the coefficient of x^i.
pub const GF128_REDUCTION_POLYNOMIAL: u128 = 0x87;
