//! Arithmetic in GF(2^128), defined by reduction polynomial x^128 + x^7 + x^2 + x + 1.
//!
//! A 16 -byte block is read as a little-endian 128 -bit integer, whose bit `i` is the coefficient of x^i. So the block with only
//! its first byte set to 1 is the multiplicative identity. This is the convention used by the DPF library's block type, both PIR
//! servers must agree on it bit-for-bit.

use super::{
    branch_opt_util,
    error::PIRError,
    params::BLOCK_BYTE_LEN,
};
use std::ops::{BitXor, BitXorAssign};

/// A block of 128 bits, also a GF(2^128) field element.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Block([u8; BLOCK_BYTE_LEN]);

impl Block {
    pub const ZERO: Block = Block([0u8; BLOCK_BYTE_LEN]);
    pub const ONE: Block = Block::from_u128(1);

    #[inline(always)]
    pub const fn new(bytes: [u8; BLOCK_BYTE_LEN]) -> Block {
        Block(bytes)
    }

    /// Reads a block from a byte slice of exactly BLOCK_BYTE_LEN bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Block, PIRError> {
        let bytes: [u8; BLOCK_BYTE_LEN] = bytes.try_into().map_err(|_| PIRError::UnexpectedBufferLength {
            expected: BLOCK_BYTE_LEN,
            actual: bytes.len(),
        })?;

        Ok(Block(bytes))
    }

    #[inline(always)]
    pub const fn to_bytes(self) -> [u8; BLOCK_BYTE_LEN] {
        self.0
    }
    #[inline(always)]
    pub const fn as_bytes(&self) -> &[u8; BLOCK_BYTE_LEN] {
        &self.0
    }

    #[inline(always)]
    const fn to_u128(self) -> u128 {
        u128::from_le_bytes(self.0)
    }
    #[inline(always)]
    const fn from_u128(v: u128) -> Block {
        Block(v.to_le_bytes())
    }

    /// Carry-less multiplication of two blocks, returning the 256 -bit polynomial product as (low, high) halves, without reduction.
    #[inline]
    pub fn clmul(self, other: Block) -> (Block, Block) {
        let (low, high) = clmul128(self.to_u128(), other.to_u128());
        (Block::from_u128(low), Block::from_u128(high))
    }

    /// Reduces the 256 -bit polynomial `high * x^128 + low` modulo x^128 + x^7 + x^2 + x + 1.
    #[inline]
    pub fn reduce(low: Block, high: Block) -> Block {
        Block::from_u128(reduce(low.to_u128(), high.to_u128()))
    }

    /// The multiplication of two field elements.
    #[inline]
    pub fn gfmul(self, other: Block) -> Block {
        let (low, high) = clmul128(self.to_u128(), other.to_u128());
        Block::from_u128(reduce(low, high))
    }

    /// Computes `XOR_i (a_i * b_i)` over all pairs. Products are accumulated unreduced and reduced once, at the end.
    pub fn inner_product<I: IntoIterator<Item = (Block, Block)>>(pairs: I) -> Block {
        let (low, high) = pairs.into_iter().fold((0u128, 0u128), |(acc_low, acc_high), (a, b)| {
            let (low, high) = clmul128(a.to_u128(), b.to_u128());
            (acc_low ^ low, acc_high ^ high)
        });

        Block::from_u128(reduce(low, high))
    }
}

impl From<[u8; BLOCK_BYTE_LEN]> for Block {
    #[inline(always)]
    fn from(bytes: [u8; BLOCK_BYTE_LEN]) -> Block {
        Block(bytes)
    }
}

impl From<Block> for [u8; BLOCK_BYTE_LEN] {
    #[inline(always)]
    fn from(block: Block) -> [u8; BLOCK_BYTE_LEN] {
        block.0
    }
}

impl AsRef<[u8]> for Block {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl BitXor for Block {
    type Output = Block;

    #[inline(always)]
    fn bitxor(self, rhs: Block) -> Block {
        Block::from_u128(self.to_u128() ^ rhs.to_u128())
    }
}

impl BitXorAssign for Block {
    #[inline(always)]
    fn bitxor_assign(&mut self, rhs: Block) {
        *self = *self ^ rhs;
    }
}

#[inline(always)]
const fn sep(x: u128) -> (u64, u64) {
    ((x >> 64) as u64, x as u64)
}

#[inline(always)]
const fn join(high: u64, low: u64) -> u128 {
    ((high as u128) << 64) | (low as u128)
}

/// Constant-time carry-less product of two 64 -bit polynomials.
#[inline(always)]
fn clmul64(a: u64, b: u64) -> u128 {
    let a = a as u128;

    (0..u64::BITS).fold(0u128, |acc, bit_idx| {
        let mask = 0u128.wrapping_sub(((b >> bit_idx) & 1) as u128);
        acc ^ ((a << bit_idx) & mask)
    })
}

/// Karatsuba over 64 -bit halves. Returns (low, high) 128 -bit halves of the product.
#[inline(always)]
fn clmul128(a: u128, b: u128) -> (u128, u128) {
    let (a1, a0) = sep(a);
    let (b1, b0) = sep(b);

    let lo = clmul64(a0, b0);
    let hi = clmul64(a1, b1);
    let mid = clmul64(a0 ^ a1, b0 ^ b1) ^ lo ^ hi;

    (lo ^ (mid << 64), hi ^ (mid >> 64))
}

/// See page 16 of Intel's "Carry-Less Multiplication Instruction and its Usage for Computing the GCM Mode", rev 2.02.
#[inline(always)]
fn reduce(low: u128, high: u128) -> u128 {
    let (x3, x2) = sep(high);
    let (x1, x0) = sep(low);

    // Terms of x^7 + x^2 + x, shifted past x^127, folded back in.
    let a = x3 >> 63;
    let b = x3 >> 62;
    let c = x3 >> 57;
    let d = x2 ^ a ^ b ^ c;

    let x3d = join(x3, d);
    let (e1, e0) = sep(x3d << 1);
    let (f1, f0) = sep(x3d << 2);
    let (g1, g0) = sep(x3d << 7);

    let h1 = x3 ^ e1 ^ f1 ^ g1;
    let h0 = d ^ e0 ^ f0 ^ g0;

    join(x1 ^ h1, x0 ^ h0)
}

/// Multiplies two 16 -byte field elements.
pub fn gf128_mul(x: &[u8; BLOCK_BYTE_LEN], y: &[u8; BLOCK_BYTE_LEN]) -> [u8; BLOCK_BYTE_LEN] {
    Block::new(*x).gfmul(Block::new(*y)).to_bytes()
}

/// Computes GF(2^128) inner product `XOR_{i < length} key_expansion[i] * db[i]`, over 16 -byte blocks, starting from the all-zero block.
///
/// Both buffers may be longer than `length` blocks, trailing bytes are ignored.
pub fn multiply_and_sum(key_expansion: &[u8], db: &[u8], length: usize) -> Result<Block, PIRError> {
    let byte_len = length.checked_mul(BLOCK_BYTE_LEN).ok_or(PIRError::ArithmeticOverflowComputingOffset)?;

    for buffer_len in [key_expansion.len(), db.len()] {
        if branch_opt_util::unlikely(buffer_len < byte_len) {
            return Err(PIRError::UnexpectedBufferLength {
                expected: byte_len,
                actual: buffer_len,
            });
        }
    }

    let key_blocks = key_expansion[..byte_len].chunks_exact(BLOCK_BYTE_LEN);
    let db_blocks = db[..byte_len].chunks_exact(BLOCK_BYTE_LEN);

    Ok(Block::inner_product(key_blocks.zip(db_blocks).map(|(k, d)| {
        let mut key_block = [0u8; BLOCK_BYTE_LEN];
        let mut db_block = [0u8; BLOCK_BYTE_LEN];

        key_block.copy_from_slice(k);
        db_block.copy_from_slice(d);

        (Block::new(key_block), Block::new(db_block))
    })))
}
