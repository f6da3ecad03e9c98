use crate::error::ShmemError;

/// Add two sizes, failing instead of wrapping.
pub fn add_size(s1: usize, s2: usize) -> Result<usize, ShmemError> {
    s1.checked_add(s2).ok_or(ShmemError::SizeOverflow)
}

/// Multiply two sizes, failing instead of wrapping.
pub fn mul_size(s1: usize, s2: usize) -> Result<usize, ShmemError> {
    if s1 == 0 || s2 == 0 {
        return Ok(0);
    }
    s1.checked_mul(s2).ok_or(ShmemError::SizeOverflow)
}

/// Round `size` up to the next multiple of `align` (a power of two).
pub fn align_up(size: usize, align: usize) -> Result<usize, ShmemError> {
    debug_assert!(align.is_power_of_two());
    add_size(size, align - 1).map(|s| s & !(align - 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn add_size_sums_positive_sizes() {
        assert_eq!(add_size(99, 100), Ok(199));
    }

    #[test]
    fn add_size_rejects_overflow() {
        assert_eq!(add_size(usize::MAX, 1), Err(ShmemError::SizeOverflow));
    }

    #[test]
    fn mul_size_with_a_zero_operand_is_zero() {
        assert_eq!(mul_size(0, 100), Ok(0));
        assert_eq!(mul_size(100, 0), Ok(0));
        assert_eq!(mul_size(0, 0), Ok(0));
        // Zero wins even when the other operand is huge.
        assert_eq!(mul_size(0, usize::MAX), Ok(0));
    }

    #[test]
    fn mul_size_multiplies() {
        assert_eq!(mul_size(10, 30), Ok(300));
        assert_eq!(mul_size(usize::MAX, 2), Err(ShmemError::SizeOverflow));
    }

    #[test]
    fn align_up_rounds_to_boundary() {
        assert_eq!(align_up(0, 64), Ok(0));
        assert_eq!(align_up(1, 64), Ok(64));
        assert_eq!(align_up(64, 64), Ok(64));
        assert_eq!(align_up(65, 64), Ok(128));
        assert_eq!(align_up(usize::MAX, 64), Err(ShmemError::SizeOverflow));
    }

    proptest! {
        #[test]
        fn align_up_is_aligned_and_minimal(size in 0usize..1 << 40, shift in 0u32..12) {
            let align = 1usize << shift;
            let aligned = align_up(size, align).unwrap();
            prop_assert_eq!(aligned % align, 0);
            prop_assert!(aligned >= size);
            prop_assert!(aligned - size < align);
        }
    }
}
