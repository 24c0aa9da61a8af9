//! # StridedSlice
//!
//! Slices the input with `begin`, `end` and `stride` arrays (inputs 1, 2 and 3)
//! whose interpretation is refined by five per-axis masks:
//!
//! - `begin_mask` / `end_mask`: when set, the bound is used; when clear the
//!   axis is taken from its start (or to its end)
//! - `new_axis_mask`: insert a unit axis at this position
//! - `shrink_axis_mask`: drop this axis from the output
//! - `ellipsis_mask`: this position stands for all axes not mentioned
//!
//! The masks are written against the layout the graph was imported in. When
//! that layout is NHWC they have to be re-indexed once, see
//! [`StridedSliceLayout`](crate::rewrite::StridedSliceLayout).

use derive_new::new;

use crate::permutation::{Permutation, permute_array_with_ellipsis};

/// Configuration for the StridedSlice operation.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct StridedSliceConfig {
    pub begin_mask: Vec<bool>,
    pub end_mask: Vec<bool>,
    pub new_axis_mask: Vec<bool>,
    pub shrink_axis_mask: Vec<bool>,
    pub ellipsis_mask: Vec<bool>,

    /// Set once the masks have been converted to NCHW.
    #[new(default)]
    pub permuted: bool,
}

impl StridedSliceConfig {
    pub const BEGIN: usize = 1;
    pub const END: usize = 2;
    pub const STRIDE: usize = 3;

    /// Position of the (single) ellipsis, if any.
    pub fn ellipsis_position(&self) -> Option<usize> {
        self.ellipsis_mask.iter().position(|&set| set)
    }

    /// Number of axes the masks address: the output rank plus the axes the
    /// slice shrinks away.
    pub fn addressed_rank(&self, output_rank: usize) -> usize {
        output_rank + self.shrink_axis_mask.iter().filter(|&&set| set).count()
    }

    /// Masks re-indexed under `perm`, every one computed from the current
    /// (unpermuted) ellipsis position. Missing begin/end entries mean "use the
    /// bound"; missing entries of the other masks mean "not set".
    pub fn permute_masks(&self, perm: &Permutation) -> Self {
        let ellipsis = self.ellipsis_position();
        let permute = |mask: &[bool], fill| permute_array_with_ellipsis(mask, perm, ellipsis, fill);
        Self {
            begin_mask: permute(&self.begin_mask, true),
            end_mask: permute(&self.end_mask, true),
            new_axis_mask: permute(&self.new_axis_mask, false),
            shrink_axis_mask: permute(&self.shrink_axis_mask, false),
            ellipsis_mask: permute(&self.ellipsis_mask, false),
            permuted: true,
        }
    }
}
