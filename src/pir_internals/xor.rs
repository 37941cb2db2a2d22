//! Fixed-stride XOR aggregation of database rows.
//!
//! A database is a flat byte buffer of equal length rows. Every function here validates all of its inputs before touching the
//! output, so an error leaves the caller's output buffer unmodified.

use super::{branch_opt_util, error::PIRError};
use std::ops::Range;

#[inline(always)]
fn xor_in_place(acc: &mut [u8], row: &[u8]) {
    acc.iter_mut().zip(row).for_each(|(a, &r)| *a ^= r);
}

#[inline(always)]
fn expect_len(actual: usize, expected: usize) -> Result<(), PIRError> {
    if branch_opt_util::likely(actual == expected) {
        Ok(())
    } else {
        Err(PIRError::UnexpectedBufferLength { expected, actual })
    }
}

#[inline(always)]
fn expect_at_least(actual: usize, expected: usize) -> Result<(), PIRError> {
    if branch_opt_util::likely(actual >= expected) {
        Ok(())
    } else {
        Err(PIRError::UnexpectedBufferLength { expected, actual })
    }
}

/// Byte range of the `block_len` -byte block starting at `offset`, if it lies fully within a `db_len` -byte database.
#[inline(always)]
fn block_range(offset: u64, block_len: usize, db_len: usize) -> Result<Range<usize>, PIRError> {
    let begin = usize::try_from(offset).ok();
    let end = begin.and_then(|begin| begin.checked_add(block_len));

    match (begin, end) {
        (Some(begin), Some(end)) if end <= db_len => Ok(begin..end),
        _ => {
            branch_opt_util::cold();
            Err(PIRError::RowOffsetOutOfBounds { offset, block_len, db_len })
        }
    }
}

/// Byte range of row `index`, in a database of `elem_size` -byte rows.
#[inline(always)]
pub fn row_range(db_len: usize, index: usize, elem_size: usize) -> Result<Range<usize>, PIRError> {
    if branch_opt_util::unlikely(elem_size == 0) {
        return Err(PIRError::InvalidElementByteLength);
    }

    let num_rows = db_len / elem_size;
    if branch_opt_util::unlikely(index >= num_rows) {
        return Err(PIRError::RowIndexOutOfBounds { index, num_rows });
    }

    let begin = index * elem_size;
    Ok(begin..begin + elem_size)
}

/// XORs first `row_len` bytes of `row` into first `row_len` bytes of `accumulator`, in place.
pub fn xor_into(accumulator: &mut [u8], row: &[u8], row_len: usize) -> Result<(), PIRError> {
    expect_at_least(accumulator.len(), row_len)?;
    expect_at_least(row.len(), row_len)?;

    xor_in_place(&mut accumulator[..row_len], &row[..row_len]);
    Ok(())
}

/// XORs row `index` of a database of `elem_size` -byte rows into `out`, which must be `elem_size` bytes long.
pub fn xor_row_at(db: &[u8], index: usize, elem_size: usize, out: &mut [u8]) -> Result<(), PIRError> {
    let range = row_range(db.len(), index, elem_size)?;
    expect_len(out.len(), elem_size)?;

    xor_in_place(out, &db[range]);
    Ok(())
}

/// Overwrites `out` with the XOR of the `out.len()` -byte blocks of `db` starting at each of `offsets`.
///
/// Every offset is bounds checked before any block is read, a block running past the end of `db` fails the whole call.
/// Offsets may repeat, and a block XORed twice cancels out.
pub fn xor_rows(db: &[u8], offsets: &[u64], out: &mut [u8]) -> Result<(), PIRError> {
    let block_len = out.len();
    let db_len = db.len();

    offsets.iter().try_for_each(|&offset| block_range(offset, block_len, db_len).map(|_| ()))?;

    out.fill(0);
    offsets.iter().for_each(|&offset| {
        let begin = offset as usize;
        xor_in_place(out, &db[begin..begin + block_len]);
    });

    Ok(())
}

/// Overwrites `out` with the XOR of the first `num_elems` rows of a database of `elem_size` -byte rows.
pub fn xor_all_rows(db: &[u8], num_elems: usize, elem_size: usize, out: &mut [u8]) -> Result<(), PIRError> {
    if branch_opt_util::unlikely(elem_size == 0) {
        return Err(PIRError::InvalidElementByteLength);
    }

    let byte_len = num_elems.checked_mul(elem_size).ok_or(PIRError::ArithmeticOverflowComputingOffset)?;
    expect_at_least(db.len(), byte_len)?;
    expect_len(out.len(), elem_size)?;

    out.fill(0);
    db[..byte_len].chunks_exact(elem_size).for_each(|row| xor_in_place(out, row));

    Ok(())
}

/// Overwrites `out` with the XOR of those rows of `db` whose bit is set in `indexing`. Row length is `out.len()`.
///
/// Bit `j` of `indexing` is bit `j % 8` (least significant first) of byte `j / 8`, and selects row `j`.
pub fn xor_hashes_by_bit_vector(db: &[u8], indexing: &[u8], out: &mut [u8]) -> Result<(), PIRError> {
    let row_len = out.len();
    if branch_opt_util::unlikely(row_len == 0) {
        return Err(PIRError::InvalidElementByteLength);
    }
    if branch_opt_util::unlikely(db.len() % row_len != 0) {
        return Err(PIRError::DatabaseLengthNotMultipleOfRowLength { db_len: db.len(), row_len });
    }

    let num_rows = db.len() / row_len;
    let num_bits = indexing.len().saturating_mul(8);
    if branch_opt_util::unlikely(num_bits < num_rows) {
        return Err(PIRError::BitVectorTooShort { num_rows, num_bits });
    }

    out.fill(0);
    db.chunks_exact(row_len)
        .enumerate()
        .filter(|&(row_idx, _)| (indexing[row_idx / 8] >> (row_idx % 8)) & 1 == 1)
        .for_each(|(_, row)| xor_in_place(out, row));

    Ok(())
}

/// Accumulates one database chunk into its parities: for each slot `p` in `[0, perm_size)`, row `inverse_permutation[p]` of
/// `db_chunk` is XORed into `parities[p]`, where `perm_size = inverse_permutation.len()`.
///
/// Parities are XORed into, not overwritten. So calling this once per chunk, against the same parity buffer, makes every slot
/// accumulate one row of every chunk. `inverse_permutation` need not be a bijection, several slots may read the same row.
///
/// # Arguments
///
/// * `db_chunk` - At least `perm_size` rows of `elem_size` bytes each.
/// * `inverse_permutation` - Maps parity slot to chunk row. Every entry must be below `perm_size`.
/// * `parities` - Exactly `perm_size * elem_size` bytes.
/// * `elem_size` - Byte length of one row, non-zero.
pub fn xor_single_pass(db_chunk: &[u8], inverse_permutation: &[u32], parities: &mut [u8], elem_size: usize) -> Result<(), PIRError> {
    if branch_opt_util::unlikely(elem_size == 0) {
        return Err(PIRError::InvalidElementByteLength);
    }

    let perm_size = inverse_permutation.len();
    let chunk_byte_len = perm_size.checked_mul(elem_size).ok_or(PIRError::ArithmeticOverflowComputingOffset)?;

    expect_len(parities.len(), chunk_byte_len)?;
    expect_at_least(db_chunk.len(), chunk_byte_len)?;

    if let Some(&entry) = inverse_permutation.iter().find(|&&entry| entry as usize >= perm_size) {
        branch_opt_util::cold();
        return Err(PIRError::PermutationEntryOutOfRange { entry, perm_size });
    }

    parities.chunks_exact_mut(elem_size).zip(inverse_permutation).for_each(|(parity, &target)| {
        let begin = target as usize * elem_size;
        xor_in_place(parity, &db_chunk[begin..begin + elem_size]);
    });

    Ok(())
}
