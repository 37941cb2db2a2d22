use crate::pir_internals::{branch_opt_util, error::PIRError, xor};

/// Pseudorandom set which can be evaluated at every one of its elements, but one.
///
/// Implemented by the puncturable-set library backing the server. A description `pset`, produced client-side, fixes a set of
/// `set_size` elements in `[0, univ_size)`. Evaluating it punctured at `pos` must yield every element but the punctured one,
/// always in the same order for the same input.
pub trait PuncturableSetEvaluator: Sized {
    /// Allocates workspace for evaluating sets of `set_size` elements over universe `[0, univ_size)`.
    fn init(univ_size: u32, set_size: u32) -> Result<Self, PIRError>;

    /// Evaluates set description `pset`, punctured at `pos`, appending resulting elements to `elems`, which is empty on entry.
    ///
    /// Malformed descriptions, or a `pos` outside of the set, must be reported as `PIRError::PuncturableSetEvaluationFailed`.
    fn eval_punctured(&mut self, pset: &[u8], pos: u32, elems: &mut Vec<u64>) -> Result<(), PIRError>;
}

/// Answers puncturable-set PIR queries against a database of rows, keeping the evaluator workspace alive across queries.
///
/// A query is a punctured set of `set_size` elements. Its answer is the XOR of the database rows those elements address, after
/// rotating each element by `shift`, modulo the universe size.
pub struct PuncturedSetResponder<G: PuncturableSetEvaluator> {
    evaluator: G,
    univ_size: u32,
    set_size: u32,
    elems: Vec<u64>,
    offsets: Vec<u64>,
}

impl<G: PuncturableSetEvaluator> PuncturedSetResponder<G> {
    /// Sets up a responder for punctured sets of `set_size` elements, over universe `[0, univ_size)`. The evaluator is initialized
    /// for the unpunctured set, which holds one more element.
    pub fn new(univ_size: u32, set_size: u32) -> Result<PuncturedSetResponder<G>, PIRError> {
        if branch_opt_util::unlikely(univ_size == 0) {
            return Err(PIRError::EmptyUniverse);
        }

        let full_set_size = set_size.checked_add(1).ok_or(PIRError::ArithmeticOverflowComputingOffset)?;
        let evaluator = G::init(univ_size, full_set_size)?;

        Ok(PuncturedSetResponder {
            evaluator,
            univ_size,
            set_size,
            elems: Vec::with_capacity(set_size as usize),
            offsets: Vec::with_capacity(set_size as usize),
        })
    }

    #[inline(always)]
    pub const fn univ_size(&self) -> u32 {
        self.univ_size
    }
    #[inline(always)]
    pub const fn set_size(&self) -> u32 {
        self.set_size
    }

    /// Answers one query, writing the XOR of addressed `out.len()` -byte blocks into `out`.
    ///
    /// # Arguments
    ///
    /// * `pset` - Punctured set description, as sent by the client.
    /// * `pos` - Punctured position.
    /// * `shift` - Rotation applied to every element, before it's turned into a row offset.
    /// * `db` - Database, read-only.
    /// * `row_len` - Stride between consecutive rows, in bytes.
    /// * `out` - Answer buffer, its length being the number of bytes read at each row offset.
    ///
    /// # Returns
    ///
    /// Returns an error if set evaluation fails, if it doesn't yield exactly `set_size` elements, or if any addressed block runs
    /// past the end of `db`. In case of error `out` is left untouched.
    pub fn answer(&mut self, pset: &[u8], pos: u32, shift: u32, db: &[u8], row_len: usize, out: &mut [u8]) -> Result<(), PIRError> {
        tracing::debug!(
            univ_size = self.univ_size,
            set_size = self.set_size,
            db_len = db.len(),
            row_len,
            block_len = out.len(),
            "Answering punctured set query"
        );

        self.compute_answer(pset, pos, shift, db, row_len, out)
            .inspect_err(|e| tracing::warn!(error = %e, "Failed to answer punctured set query"))
    }

    fn compute_answer(&mut self, pset: &[u8], pos: u32, shift: u32, db: &[u8], row_len: usize, out: &mut [u8]) -> Result<(), PIRError> {
        self.elems.clear();
        self.evaluator.eval_punctured(pset, pos, &mut self.elems)?;

        if branch_opt_util::unlikely(self.elems.len() != self.set_size as usize) {
            return Err(PIRError::UnexpectedPuncturedSetSize {
                expected: self.set_size as usize,
                actual: self.elems.len(),
            });
        }

        let univ_size = self.univ_size as u64;
        let row_len = row_len as u64;

        self.offsets.clear();
        for &elem in &self.elems {
            let offset = elem
                .checked_add(shift as u64)
                .map(|rotated| rotated % univ_size)
                .and_then(|row_idx| row_idx.checked_mul(row_len))
                .ok_or(PIRError::ArithmeticOverflowComputingOffset)?;

            self.offsets.push(offset);
        }

        xor::xor_rows(db, &self.offsets, out)
    }
}

/// Answers a single puncturable-set PIR query, setting up a fresh evaluator for it.
///
/// Writes XOR of the `out.len()` -byte blocks at offsets `((e + shift) mod univ_size) * row_len` into `out`, for every element `e`
/// of the set described by `pset`, punctured at `pos`. See `PuncturedSetResponder::answer` for failure modes, and prefer a
/// responder when answering many queries over the same universe.
#[allow(clippy::too_many_arguments)]
pub fn answer<G: PuncturableSetEvaluator>(
    pset: &[u8],
    pos: u32,
    univ_size: u32,
    set_size: u32,
    shift: u32,
    db: &[u8],
    row_len: usize,
    out: &mut [u8],
) -> Result<(), PIRError> {
    let mut responder = PuncturedSetResponder::<G>::new(univ_size, set_size).inspect_err(|e| tracing::warn!(error = %e, "Failed to set up punctured set evaluator"))?;
    responder.answer(pset, pos, shift, db, row_len, out)
}
