//! Pure index arithmetic shared by the lowerers.

use thiserror::Error;

use crate::spec::Dimension;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("dimension {dim} is out of range for rank {rank}")]
    InvalidDim { dim: i64, rank: usize },
    #[error("slice step must be non-zero")]
    ZeroStep,
    #[error("cannot broadcast {lhs} against {rhs}")]
    BroadcastMismatch { lhs: Dimension, rhs: Dimension },
    #[error("cannot prove {lhs} and {rhs} broadcast-compatible")]
    Unresolved { lhs: Dimension, rhs: Dimension },
    #[error("target rank {target} is smaller than input rank {input}")]
    RankMismatch { input: usize, target: usize },
    #[error("extent {extent} is not valid for a new leading dimension")]
    InvalidExtent { extent: i64 },
}

/// Maps a possibly negative `dim` into `[0, rank)`.
pub fn normalize_dim(dim: i64, rank: usize) -> Result<usize, ShapeError> {
    let rank_i = rank as i64;
    let normalized = if dim < 0 { dim + rank_i } else { dim };
    if (0..rank_i).contains(&normalized) {
        Ok(normalized as usize)
    } else {
        Err(ShapeError::InvalidDim { dim, rank })
    }
}

/// Explicit bounds of one sliced axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceBounds {
    pub offset: usize,
    pub length: usize,
    pub stride: i64,
}

impl SliceBounds {
    /// Source indices visited by the slice, in order.
    pub fn indices(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.length as i64).map(move |i| self.offset as i64 + i * self.stride)
    }
}

/// Resolves Python-style `start:end:step` on an axis of extent `dim_size`.
///
/// `start` is wrapped once and clamped into `[0, dim_size]`. `end` is wrapped once; if it is
/// still negative it becomes `-1` so that a reversed slice can reach index 0, and it is capped
/// at `dim_size`. An absent `start` is 0 and an absent `end` is `dim_size`, whatever the sign
/// of `step`.
pub fn compute_slice_bounds(
    dim_size: usize,
    start: Option<i64>,
    end: Option<i64>,
    step: i64,
) -> Result<SliceBounds, ShapeError> {
    if step == 0 {
        return Err(ShapeError::ZeroStep);
    }
    let size = dim_size as i64;

    let start = match start {
        None => 0,
        Some(start) => {
            let start = if start < 0 { start + size } else { start };
            start.clamp(0, size)
        }
    };

    let end = match end {
        None => size,
        Some(end) => {
            let end = if end < 0 { end + size } else { end };
            if end < 0 {
                -1
            } else {
                end.min(size)
            }
        }
    };

    let length = floor_div(end - start + step - step.signum(), step).max(0);
    Ok(SliceBounds {
        offset: start as usize,
        length: length as usize,
        stride: step,
    })
}

/// Division rounding toward negative infinity.
pub fn floor_div(lhs: i64, rhs: i64) -> i64 {
    let quotient = lhs / rhs;
    if lhs % rhs != 0 && ((lhs < 0) != (rhs < 0)) {
        quotient - 1
    } else {
        quotient
    }
}

/// Combines two aligned extents under the trailing broadcast rule.
pub fn broadcast_dims(lhs: &Dimension, rhs: &Dimension) -> Result<Dimension, ShapeError> {
    match (lhs, rhs) {
        (Dimension::Static(a), Dimension::Static(b)) if a == b => Ok(lhs.clone()),
        (Dimension::Static(1), _) => Ok(rhs.clone()),
        (_, Dimension::Static(1)) => Ok(lhs.clone()),
        (Dimension::Static(_), Dimension::Static(_)) => Err(ShapeError::BroadcastMismatch {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        }),
        (Dimension::Dynamic(a), Dimension::Dynamic(b)) if a == b => Ok(lhs.clone()),
        _ => Err(ShapeError::Unresolved {
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        }),
    }
}
