//! Compressed-column sparsity patterns.
//!
//! A [`Sparsity`] records which `(row, col)` positions of a matrix may be
//! nonzero. Stored entries are ordered column by column, rows ascending
//! within a column; this "nonzero order" is how every matrix value is laid
//! out in the tape's working array.
//!
//! Patterns never under-approximate: any position not stored is exactly zero
//! for every input.

use std::fmt;

use crate::error::GraphError;
use crate::opcode::ZeroRule;

/// Compressed sparse column pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sparsity {
    nrow: usize,
    ncol: usize,
    /// Column pointers, length `ncol + 1`.
    colind: Vec<usize>,
    /// Row index of each stored entry, length `nnz`.
    row: Vec<usize>,
}

/// Source of one entry of a concatenation: `(part, nonzero index within part)`.
pub type PartEntry = (usize, usize);

impl Sparsity {
    /// Build from raw compressed-column arrays, validating ordering and bounds.
    pub fn new(
        nrow: usize,
        ncol: usize,
        colind: Vec<usize>,
        row: Vec<usize>,
    ) -> Result<Self, GraphError> {
        if colind.len() != ncol + 1 {
            return Err(GraphError::InvalidSparsity(format!(
                "colind has length {}, expected {}",
                colind.len(),
                ncol + 1
            )));
        }
        if colind[0] != 0 || colind[ncol] != row.len() {
            return Err(GraphError::InvalidSparsity(
                "colind must start at 0 and end at nnz".into(),
            ));
        }
        for c in 0..ncol {
            if colind[c] > colind[c + 1] {
                return Err(GraphError::InvalidSparsity(format!(
                    "colind decreases at column {c}"
                )));
            }
            let rows = &row[colind[c]..colind[c + 1]];
            if rows.windows(2).any(|w| w[0] >= w[1]) {
                return Err(GraphError::InvalidSparsity(format!(
                    "rows not strictly increasing in column {c}"
                )));
            }
            if rows.last().is_some_and(|&r| r >= nrow) {
                return Err(GraphError::InvalidSparsity(format!(
                    "row index out of range in column {c}"
                )));
            }
        }
        Ok(Self {
            nrow,
            ncol,
            colind,
            row,
        })
    }

    /// Fully dense `nrow x ncol` pattern.
    pub fn dense(nrow: usize, ncol: usize) -> Self {
        let colind = (0..=ncol).map(|c| c * nrow).collect();
        let row = (0..ncol).flat_map(|_| 0..nrow).collect();
        Self {
            nrow,
            ncol,
            colind,
            row,
        }
    }

    /// Dense 1x1 pattern.
    pub fn scalar() -> Self {
        Self::dense(1, 1)
    }

    /// Dense column vector of length `n`.
    pub fn column(n: usize) -> Self {
        Self::dense(n, 1)
    }

    /// Pattern with no stored entries.
    pub fn empty(nrow: usize, ncol: usize) -> Self {
        Self {
            nrow,
            ncol,
            colind: vec![0; ncol + 1],
            row: Vec::new(),
        }
    }

    /// Square diagonal pattern.
    pub fn diagonal(n: usize) -> Self {
        Self {
            nrow: n,
            ncol: n,
            colind: (0..=n).collect(),
            row: (0..n).collect(),
        }
    }

    /// Build from `(row, col)` pairs in any order; duplicates are merged.
    pub fn from_triplets(
        nrow: usize,
        ncol: usize,
        entries: &[(usize, usize)],
    ) -> Result<Self, GraphError> {
        let mut sorted: Vec<(usize, usize)> = entries.iter().map(|&(r, c)| (c, r)).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut colind = vec![0usize; ncol + 1];
        let mut row = Vec::with_capacity(sorted.len());
        for &(c, r) in &sorted {
            if r >= nrow || c >= ncol {
                return Err(GraphError::InvalidSparsity(format!(
                    "entry ({r}, {c}) outside {nrow}x{ncol}"
                )));
            }
            colind[c + 1] += 1;
            row.push(r);
        }
        for c in 0..ncol {
            colind[c + 1] += colind[c];
        }
        Ok(Self {
            nrow,
            ncol,
            colind,
            row,
        })
    }

    /// Build from per-column row lists (unsorted, possibly repeated).
    pub(crate) fn from_columns(nrow: usize, mut columns: Vec<Vec<usize>>) -> Self {
        let ncol = columns.len();
        let mut colind = Vec::with_capacity(ncol + 1);
        let mut row = Vec::new();
        colind.push(0);
        for rows in &mut columns {
            rows.sort_unstable();
            rows.dedup();
            debug_assert!(rows.last().map_or(true, |&r| r < nrow));
            row.extend_from_slice(rows);
            colind.push(row.len());
        }
        Self {
            nrow,
            ncol,
            colind,
            row,
        }
    }

    // ── Queries ──

    #[inline]
    pub fn nrow(&self) -> usize {
        self.nrow
    }

    #[inline]
    pub fn ncol(&self) -> usize {
        self.ncol
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrow, self.ncol)
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.row.len()
    }

    /// Number of positions, stored or not.
    #[inline]
    pub fn numel(&self) -> usize {
        self.nrow * self.ncol
    }

    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.nrow == 1 && self.ncol == 1
    }

    #[inline]
    pub fn is_dense(&self) -> bool {
        self.nnz() == self.numel()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }

    pub fn colind(&self) -> &[usize] {
        &self.colind
    }

    pub fn row(&self) -> &[usize] {
        &self.row
    }

    /// Stored positions in nonzero order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.ncol).flat_map(move |c| {
            self.row[self.colind[c]..self.colind[c + 1]]
                .iter()
                .map(move |&r| (r, c))
        })
    }

    /// Nonzero index of position `(r, c)`, if stored.
    pub fn get_nz(&self, r: usize, c: usize) -> Option<usize> {
        if c >= self.ncol {
            return None;
        }
        let start = self.colind[c];
        let rows = &self.row[start..self.colind[c + 1]];
        rows.binary_search(&r).ok().map(|k| start + k)
    }

    pub fn contains(&self, r: usize, c: usize) -> bool {
        self.get_nz(r, c).is_some()
    }

    /// Scatter nonzero values into a dense column-major buffer.
    pub fn densify<T: Copy + num_traits::Zero>(&self, nz: &[T]) -> Vec<T> {
        debug_assert_eq!(nz.len(), self.nnz());
        let mut dense = vec![T::zero(); self.numel()];
        for (k, (r, c)) in self.iter().enumerate() {
            dense[c * self.nrow + r] = nz[k];
        }
        dense
    }

    // ── Elementwise combination ──

    /// Union of two same-shaped patterns.
    pub fn union(&self, other: &Self) -> Self {
        self.merge(other, true)
    }

    /// Intersection of two same-shaped patterns.
    pub fn intersection(&self, other: &Self) -> Self {
        self.merge(other, false)
    }

    /// Pattern of `op(a, b)` for same-shaped operands under the op's zero rule.
    pub fn combine(&self, other: &Self, rule: ZeroRule) -> Self {
        debug_assert_eq!(self.shape(), other.shape());
        match rule {
            ZeroRule::Union | ZeroRule::Preserves => self.union(other),
            ZeroRule::Intersection => self.intersection(other),
            ZeroRule::Dense => Self::dense(self.nrow, self.ncol),
            ZeroRule::LeftOperand => {
                // Zero only where `a` is absent and `b` is stored.
                let mut colind = vec![0usize; self.ncol + 1];
                let mut row = Vec::new();
                for c in 0..self.ncol {
                    for r in 0..self.nrow {
                        if self.contains(r, c) || !other.contains(r, c) {
                            row.push(r);
                        }
                    }
                    colind[c + 1] = row.len();
                }
                Self {
                    nrow: self.nrow,
                    ncol: self.ncol,
                    colind,
                    row,
                }
            }
        }
    }

    fn merge(&self, other: &Self, keep_single: bool) -> Self {
        debug_assert_eq!(self.shape(), other.shape());
        let mut colind = vec![0usize; self.ncol + 1];
        let mut row = Vec::with_capacity(self.nnz().max(other.nnz()));
        for c in 0..self.ncol {
            let a = &self.row[self.colind[c]..self.colind[c + 1]];
            let b = &other.row[other.colind[c]..other.colind[c + 1]];
            let (mut i, mut j) = (0, 0);
            while i < a.len() || j < b.len() {
                let ra = a.get(i).copied().unwrap_or(usize::MAX);
                let rb = b.get(j).copied().unwrap_or(usize::MAX);
                if ra == rb {
                    row.push(ra);
                    i += 1;
                    j += 1;
                } else if ra < rb {
                    if keep_single {
                        row.push(ra);
                    }
                    i += 1;
                } else {
                    if keep_single {
                        row.push(rb);
                    }
                    j += 1;
                }
            }
            colind[c + 1] = row.len();
        }
        Self {
            nrow: self.nrow,
            ncol: self.ncol,
            colind,
            row,
        }
    }

    // ── Structural operations ──

    /// Transposed pattern together with, for each of its nonzeros, the
    /// nonzero index in `self` it came from.
    pub fn transpose(&self) -> (Self, Vec<usize>) {
        let mut counts = vec![0usize; self.nrow + 1];
        for &r in &self.row {
            counts[r + 1] += 1;
        }
        for r in 0..self.nrow {
            counts[r + 1] += counts[r];
        }
        let colind = counts.clone();
        let mut next = counts;
        let mut row = vec![0usize; self.nnz()];
        let mut mapping = vec![0usize; self.nnz()];
        for c in 0..self.ncol {
            for k in self.colind[c]..self.colind[c + 1] {
                let r = self.row[k];
                let dst = next[r];
                row[dst] = c;
                mapping[dst] = k;
                next[r] += 1;
            }
        }
        (
            Self {
                nrow: self.ncol,
                ncol: self.nrow,
                colind,
                row,
            },
            mapping,
        )
    }

    /// Side-by-side concatenation. Parts must share the row count.
    pub fn horzcat(parts: &[&Self]) -> Result<(Self, Vec<PartEntry>), GraphError> {
        let nrow = parts.first().map_or(0, |p| p.nrow);
        let mut colind = vec![0usize];
        let mut row = Vec::new();
        let mut mapping = Vec::new();
        for (p, part) in parts.iter().enumerate() {
            if part.nrow != nrow {
                return Err(GraphError::ConcatMismatch {
                    kind: crate::graph::ConcatKind::Horizontal,
                    expected: nrow,
                    found: part.nrow,
                });
            }
            for c in 0..part.ncol {
                for k in part.colind[c]..part.colind[c + 1] {
                    row.push(part.row[k]);
                    mapping.push((p, k));
                }
                colind.push(row.len());
            }
        }
        let ncol = colind.len() - 1;
        Ok((
            Self {
                nrow,
                ncol,
                colind,
                row,
            },
            mapping,
        ))
    }

    /// Stacked concatenation. Parts must share the column count.
    pub fn vertcat(parts: &[&Self]) -> Result<(Self, Vec<PartEntry>), GraphError> {
        let ncol = parts.first().map_or(0, |p| p.ncol);
        for part in parts {
            if part.ncol != ncol {
                return Err(GraphError::ConcatMismatch {
                    kind: crate::graph::ConcatKind::Vertical,
                    expected: ncol,
                    found: part.ncol,
                });
            }
        }
        let nrow = parts.iter().map(|p| p.nrow).sum();
        let mut colind = vec![0usize];
        let mut row = Vec::new();
        let mut mapping = Vec::new();
        for c in 0..ncol {
            let mut offset = 0;
            for (p, part) in parts.iter().enumerate() {
                for k in part.colind[c]..part.colind[c + 1] {
                    row.push(offset + part.row[k]);
                    mapping.push((p, k));
                }
                offset += part.nrow;
            }
            colind.push(row.len());
        }
        Ok((
            Self {
                nrow,
                ncol,
                colind,
                row,
            },
            mapping,
        ))
    }

    /// Block-diagonal concatenation.
    pub fn diagcat(parts: &[&Self]) -> (Self, Vec<PartEntry>) {
        let nrow = parts.iter().map(|p| p.nrow).sum();
        let mut colind = vec![0usize];
        let mut row = Vec::new();
        let mut mapping = Vec::new();
        let mut offset = 0;
        for (p, part) in parts.iter().enumerate() {
            for c in 0..part.ncol {
                for k in part.colind[c]..part.colind[c + 1] {
                    row.push(offset + part.row[k]);
                    mapping.push((p, k));
                }
                colind.push(row.len());
            }
            offset += part.nrow;
        }
        let ncol = colind.len() - 1;
        (
            Self {
                nrow,
                ncol,
                colind,
                row,
            },
            mapping,
        )
    }

    // ── Coloring ──

    /// Greedy column coloring: columns sharing a color never share a row.
    ///
    /// Returns `(colors, num_colors)`. Columns of one color can be seeded
    /// together in a single forward sweep.
    pub fn column_coloring(&self) -> (Vec<u32>, u32) {
        let (t, _) = self.transpose();
        greedy_coloring(self.ncol, |c| &self.row[self.colind[c]..self.colind[c + 1]], |r| {
            &t.row[t.colind[r]..t.colind[r + 1]]
        })
    }

    /// Greedy row coloring: rows sharing a color never share a column.
    ///
    /// Rows of one color can be seeded together in a single reverse sweep.
    pub fn row_coloring(&self) -> (Vec<u32>, u32) {
        let (t, _) = self.transpose();
        t.column_coloring()
    }
}

/// Distance-2 greedy coloring over a bipartite graph.
///
/// `members(v)` lists the neighbours of vertex `v` on the other side and
/// `back(u)` the vertices adjacent to `u`.
fn greedy_coloring<'a>(
    n: usize,
    members: impl Fn(usize) -> &'a [usize],
    back: impl Fn(usize) -> &'a [usize],
) -> (Vec<u32>, u32) {
    let mut colors = vec![u32::MAX; n];
    let mut forbidden: Vec<usize> = Vec::new();
    let mut num_colors = 0u32;

    for v in 0..n {
        for &u in members(v) {
            for &w in back(u) {
                let cw = colors[w];
                if cw != u32::MAX {
                    let cw = cw as usize;
                    if forbidden.len() <= cw {
                        forbidden.resize(cw + 1, usize::MAX);
                    }
                    forbidden[cw] = v;
                }
            }
        }
        let color = (0..)
            .find(|&c: &usize| forbidden.get(c).map_or(true, |&stamp| stamp != v))
            .unwrap_or(0);
        colors[v] = color as u32;
        num_colors = num_colors.max(color as u32 + 1);
    }

    (colors, num_colors)
}

impl fmt::Display for Sparsity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}, {} nnz", self.nrow, self.ncol, self.nnz())
    }
}
