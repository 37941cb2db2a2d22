//! Field-based PIR, answering distributed point function (DPF) queries with GF(2^128) inner products.
//!
//! Database is read as `domain` consecutive 16 -byte blocks. Each of two non-colluding servers expands its DPF key into one block per
//! domain point and returns the inner product of that expansion with the database. As both expansions sum up to `value` at the
//! queried point and to zero elsewhere, XOR of the two answers is `value * db[point]`.

use crate::pir_internals::{
    branch_opt_util,
    error::PIRError,
    gf128::{self, Block},
    params::{BLOCK_BYTE_LEN, DPF_SUPPORTED_NUM_POINTS},
};
use std::{iter, slice, vec};

/// Which of the two servers is answering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Party {
    First,
    Second,
}

impl Party {
    /// Party index, as understood by DPF libraries.
    #[inline(always)]
    pub const fn index(self) -> u8 {
        match self {
            Party::First => 0,
            Party::Second => 1,
        }
    }
}

/// Two-party distributed point function over GF(2^128), with keys serialized as opaque byte strings.
pub trait DistributedPointFunction {
    /// Expanded key share, yielding `(position, block)` pairs. Positions not yielded contribute zero.
    type Expansion: IntoIterator<Item = (usize, Block)>;

    /// Generates a pair of keys, one per party, sharing the function which maps `points[i]` to `values[i]` and every other point of
    /// `[0, domain)` to zero.
    fn key_gen(&self, domain: usize, points: &[u64], values: &[Block], seed: u64) -> Result<(Vec<u8>, Vec<u8>), PIRError>;

    /// Expands `party`'s key over the whole domain `[0, domain)`. Expansion failures are reported as `PIRError::DpfEvaluationFailed`.
    fn expand(&self, party: Party, domain: usize, num_points: u64, key: &[u8]) -> Result<Self::Expansion, PIRError>;
}

/// DPF key expansion, stored as one block per domain point. Can be iterated over as many times as required.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpandedShare {
    blocks: Vec<Block>,
}

impl ExpandedShare {
    /// Reads an expansion from concatenated 16 -byte blocks.
    pub fn from_bytes(bytes: &[u8]) -> Result<ExpandedShare, PIRError> {
        if branch_opt_util::unlikely(bytes.len() % BLOCK_BYTE_LEN != 0) {
            return Err(PIRError::DatabaseLengthNotMultipleOfRowLength {
                db_len: bytes.len(),
                row_len: BLOCK_BYTE_LEN,
            });
        }

        let blocks = bytes.chunks_exact(BLOCK_BYTE_LEN).map(Block::from_bytes).collect::<Result<Vec<Block>, PIRError>>()?;
        Ok(ExpandedShare { blocks })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
    #[inline(always)]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn iter(&self) -> iter::Enumerate<iter::Copied<slice::Iter<'_, Block>>> {
        self.blocks.iter().copied().enumerate()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.blocks.iter().flat_map(|block| block.to_bytes()).collect()
    }
}

impl From<Vec<Block>> for ExpandedShare {
    fn from(blocks: Vec<Block>) -> ExpandedShare {
        ExpandedShare { blocks }
    }
}

impl IntoIterator for ExpandedShare {
    type Item = (usize, Block);
    type IntoIter = iter::Enumerate<vec::IntoIter<Block>>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter().enumerate()
    }
}

impl<'a> IntoIterator for &'a ExpandedShare {
    type Item = (usize, Block);
    type IntoIter = iter::Enumerate<iter::Copied<slice::Iter<'a, Block>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Answer of one server to an authenticated query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldAnswer {
    /// Inner product of the query key expansion with the database.
    pub query: Block,
    /// Inner product of the authentication key expansion with the database.
    pub auth: Block,
}

/// Number of 16 -byte blocks in `db`.
fn domain_size(db: &[u8]) -> Result<usize, PIRError> {
    if branch_opt_util::unlikely(db.len() % BLOCK_BYTE_LEN != 0) {
        return Err(PIRError::DatabaseLengthNotMultipleOfRowLength {
            db_len: db.len(),
            row_len: BLOCK_BYTE_LEN,
        });
    }

    Ok(db.len() / BLOCK_BYTE_LEN)
}

/// Computes `XOR_{i < length} key_expansion[i] * db[i]` in GF(2^128), over the first `length` 16 -byte blocks of both buffers.
#[inline]
pub fn combine(key_expansion: &[u8], db: &[u8], length: usize) -> Result<Block, PIRError> {
    gf128::multiply_and_sum(key_expansion, db, length)
}

/// Computes `XOR value * db[position]` in GF(2^128), over all `(position, value)` pairs yielded by `expansion`.
///
/// Returns an error if a position falls outside the database, or if the database isn't a whole number of blocks.
pub fn combine_expansion<I>(expansion: I, db: &[u8]) -> Result<Block, PIRError>
where
    I: IntoIterator<Item = (usize, Block)>,
{
    let domain = domain_size(db)?;

    let mut failure = None;
    let pairs = expansion.into_iter().map_while(|(position, value)| {
        if branch_opt_util::unlikely(position >= domain) {
            failure = Some(PIRError::DomainPointOutOfRange { position, domain });
            return None;
        }

        let begin = position * BLOCK_BYTE_LEN;
        match Block::from_bytes(&db[begin..begin + BLOCK_BYTE_LEN]) {
            Ok(row) => Some((value, row)),
            Err(e) => {
                failure = Some(e);
                None
            }
        }
    });

    let sum = Block::inner_product(pairs);
    match failure {
        Some(e) => Err(e),
        None => Ok(sum),
    }
}

fn check_num_points(num_points: u64) -> Result<(), PIRError> {
    if branch_opt_util::likely(num_points == DPF_SUPPORTED_NUM_POINTS) {
        Ok(())
    } else {
        Err(PIRError::UnsupportedNumberOfDpfPoints(num_points))
    }
}

fn expand_and_combine<D: DistributedPointFunction>(dpf: &D, party: Party, num_points: u64, key: &[u8], db: &[u8]) -> Result<Block, PIRError> {
    check_num_points(num_points)?;
    let domain = domain_size(db)?;

    let expansion = dpf.expand(party, domain, num_points, key)?;
    combine_expansion(expansion, db)
}

/// Answers a DPF query: expands `key` over the database domain, `db.len() / 16` points, and returns its inner product with `db`.
///
/// # Arguments
///
/// * `dpf` - DPF implementation the client generated `key` with.
/// * `party` - Which share of the key pair this server holds.
/// * `num_points` - Number of non-zero points shared by the key, must be `DPF_SUPPORTED_NUM_POINTS`. Checked before expansion.
/// * `key` - Serialized key share.
/// * `db` - Database of 16 -byte blocks.
///
/// # Returns
///
/// * `Result<Block, PIRError>` - This server's answer share.
pub fn answer<D: DistributedPointFunction>(dpf: &D, party: Party, num_points: u64, key: &[u8], db: &[u8]) -> Result<Block, PIRError> {
    tracing::debug!(party = party.index(), db_len = db.len(), key_len = key.len(), "Answering DPF query");

    expand_and_combine(dpf, party, num_points, key, db).inspect_err(|e| tracing::warn!(error = %e, "Failed to answer DPF query"))
}

/// Answers an authenticated DPF query, made of a query key, sharing value one at the queried point, and an authentication key,
/// sharing a secret value `alpha` at the same point. Client accepts reconstructed `query` iff `query * alpha == auth`.
pub fn answer_authenticated<D: DistributedPointFunction>(
    dpf: &D,
    party: Party,
    num_points: u64,
    query_key: &[u8],
    auth_key: &[u8],
    db: &[u8],
) -> Result<FieldAnswer, PIRError> {
    tracing::debug!(party = party.index(), db_len = db.len(), key_len = query_key.len(), "Answering authenticated DPF query");

    let compute = || -> Result<FieldAnswer, PIRError> {
        let query = expand_and_combine(dpf, party, num_points, query_key, db)?;
        let auth = expand_and_combine(dpf, party, num_points, auth_key, db)?;

        Ok(FieldAnswer { query, auth })
    };

    compute().inspect_err(|e| tracing::warn!(error = %e, "Failed to answer authenticated DPF query"))
}
