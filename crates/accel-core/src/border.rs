//! Out-of-bounds sampling policy.
//!
//! [`apply_border_1d`] rewrites one prospective coordinate in place and
//! reports whether a valid sample exists. [`crate::Image::apply_border`]
//! combines both axes.

/// How coordinates outside `[0, size)` are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Border {
    /// No valid sample outside the image; the caller supplies zero.
    Zero,
    /// Reflect around the nearest edge. A single reflection only.
    Mirror,
    /// Clamp to the nearest edge pixel.
    Repeat,
    /// Wrap around modulo the size.
    Wrap,
    /// No policy. Reaching it with an out-of-range coordinate is a bug.
    Undefined,
}

/// Resolves coordinate `i` against an axis of length `size`.
///
/// In-range coordinates are always valid and left unchanged.
///
/// # Panics
///
/// With [`Border::Mirror`] when the coordinate would need more than one
/// reflection, and with [`Border::Undefined`] for any out-of-range input.
pub fn apply_border_1d(i: &mut i32, size: i32, border: Border) -> bool {
    if *i >= 0 && *i < size {
        return true;
    }
    match border {
        Border::Zero => false,
        Border::Mirror => {
            if *i < 0 {
                *i = -*i;
            } else {
                *i = 2 * (size - 1) - *i;
            }
            assert!(
                *i >= 0 && *i < size,
                "mirror border supports a single reflection only"
            );
            true
        }
        Border::Repeat => {
            *i = (*i).clamp(0, size - 1);
            true
        }
        Border::Wrap => {
            *i = i.rem_euclid(size);
            true
        }
        Border::Undefined => panic!("undefined border mode reached at coordinate {i}"),
    }
}
