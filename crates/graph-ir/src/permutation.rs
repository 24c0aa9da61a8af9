//! Axis permutations and the re-indexing of per-axis masks and arrays.
//!
//! A [`Permutation`] keeps the forward order and its inverse together; the pair
//! is validated once on construction.

/// Paired forward and inverse axis orders, with `inv[perm[i]] == i`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permutation {
    perm: Vec<usize>,
    inv: Vec<usize>,
}

impl Permutation {
    /// Build from a forward order. `None` if `perm` is not a permutation of `0..len`.
    pub fn new(perm: Vec<usize>) -> Option<Self> {
        let mut inv = vec![usize::MAX; perm.len()];
        for (i, &p) in perm.iter().enumerate() {
            if p >= perm.len() || inv[p] != usize::MAX {
                return None;
            }
            inv[p] = i;
        }
        Some(Self { perm, inv })
    }

    /// Build from an explicit pair, checking that `inv` really inverts `perm`.
    pub fn from_parts(perm: Vec<usize>, inv: Vec<usize>) -> Option<Self> {
        let candidate = Self::new(perm)?;
        (candidate.inv == inv).then_some(candidate)
    }

    pub fn identity(len: usize) -> Self {
        let perm: Vec<usize> = (0..len).collect();
        Self {
            inv: perm.clone(),
            perm,
        }
    }

    /// Order that moves the channel axis of an NHWC tensor to position 1:
    /// `[0, n - 1, 1, .., n - 2]`.
    pub fn nhwc_to_nchw(len: usize) -> Self {
        if len < 2 {
            return Self::identity(len);
        }
        let perm = std::iter::once(0)
            .chain(std::iter::once(len - 1))
            .chain(1..len - 1)
            .collect();
        let inv = std::iter::once(0)
            .chain(2..len)
            .chain(std::iter::once(1))
            .collect();
        Self { perm, inv }
    }

    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    pub fn inv(&self) -> &[usize] {
        &self.inv
    }

    pub fn len(&self) -> usize {
        self.perm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perm.is_empty()
    }

    pub fn inverse(&self) -> Self {
        Self {
            perm: self.inv.clone(),
            inv: self.perm.clone(),
        }
    }

    /// Permutation equivalent to applying `self` and then `next` to the same
    /// tensor: `result[i] = self[next[i]]`. `None` on a length mismatch.
    pub fn compose(&self, next: &Permutation) -> Option<Self> {
        if self.len() != next.len() {
            return None;
        }
        let perm: Vec<usize> = next.perm.iter().map(|&i| self.perm[i]).collect();
        let inv = self.inv.iter().map(|&i| next.inv[i]).collect();
        Some(Self { perm, inv })
    }

    pub fn is_identity(&self) -> bool {
        self.perm.iter().enumerate().all(|(i, &p)| i == p)
    }

    /// Reorder `values` so that `out[i] = values[perm[i]]`.
    pub fn apply<T: Copy>(&self, values: &[T]) -> Option<Vec<T>> {
        (values.len() == self.len()).then(|| self.perm.iter().map(|&p| values[p]).collect())
    }
}

/// Re-index a per-axis mask under `perm`.
///
/// A mask shorter than the permutation is first padded with `fill` at the end.
/// A longer mask has its first `perm.len()` entries permuted and its tail kept.
pub fn permute_mask<T: Copy>(mask: &[T], perm: &Permutation, fill: T) -> Vec<T> {
    permute_array_with_ellipsis(mask, perm, None, fill)
}

/// Re-index an array whose entries may be compressed by an ellipsis.
///
/// When the array is shorter than the permutation, the missing entries are the
/// axes the ellipsis stands for: `fill` values are inserted right after the
/// ellipsis position (or appended when there is none) before permuting.
pub fn permute_array_with_ellipsis<T: Copy>(
    array: &[T],
    perm: &Permutation,
    ellipsis: Option<usize>,
    fill: T,
) -> Vec<T> {
    let n = perm.len();
    if array.len() >= n {
        return perm
            .perm
            .iter()
            .map(|&p| array[p])
            .chain(array[n..].iter().copied())
            .collect();
    }

    let at = ellipsis
        .map(|pos| pos + 1)
        .unwrap_or(array.len())
        .min(array.len());
    let mut extended = Vec::with_capacity(n);
    extended.extend_from_slice(&array[..at]);
    extended.extend(std::iter::repeat_n(fill, n - array.len()));
    extended.extend_from_slice(&array[at..]);

    perm.perm.iter().map(|&p| extended[p]).collect()
}
