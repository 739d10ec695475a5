//! Helpers for the FAST segment test

/// Bresenham circle of radius 3, clockwise starting straight above the center
pub const FAST_RING: [(i32, i32); 16] = [
    (0, -3), (1, -3), (2, -2), (3, -1),
    (3, 0), (3, 1), (2, 2), (1, 3),
    (0, 3), (-1, 3), (-2, 2), (-3, 1),
    (-3, 0), (-3, -1), (-2, -2), (-1, -3),
];

/// Minimum arc length for FAST-9
pub const FAST_ARC: usize = 9;

/// True if `mask` (bit i = ring pixel i) holds a circular run of at least `min_count` set bits.
pub fn has_consecutive_bits(mask: u16, min_count: usize) -> bool {
    if min_count == 0 || min_count > 16 {
        return false;
    }
    if mask == u16::MAX {
        return true;
    }

    // AND together rotations; any surviving bit starts a long enough run
    let mut run = mask;
    for i in 1..min_count as u32 {
        run &= mask.rotate_right(i);
        if run == 0 {
            return false;
        }
    }
    run != 0
}
