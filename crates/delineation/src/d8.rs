//! D8 flow-direction encoding (Esri convention)
//!
//! Each cell's code names the single neighbor it drains to:
//! 1=E, 2=SE, 4=S, 8=SW, 16=W, 32=NW, 64=N, 128=NE. Any other value is
//! treated as invalid/no-flow.

/// The eight valid direction codes.
pub const VALID_CODES: [u16; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

/// Upstream adjacency: a neighbor at offset (dr, dc) drains into the current
/// cell iff its own code is the third element (it points back at us). E.g.
/// the NW neighbor (-1, -1) contributes iff its code is 2 (SE).
pub const UPSTREAM_NEIGHBORS: [(isize, isize, u16); 8] = [
    (-1, -1, 2),   // NW neighbor flowing SE
    (-1, 0, 4),    // N  neighbor flowing S
    (-1, 1, 8),    // NE neighbor flowing SW
    (0, -1, 1),    // W  neighbor flowing E
    (0, 1, 16),    // E  neighbor flowing W
    (1, -1, 128),  // SW neighbor flowing NE
    (1, 0, 64),    // S  neighbor flowing N
    (1, 1, 32),    // SE neighbor flowing NW
];

/// Interpret a raw cell value as a direction code, if valid.
///
/// Cell values arrive as `f64`; anything non-finite, fractional or outside
/// the eight codes is no-flow.
pub fn code_of(value: f64) -> Option<u16> {
    if !value.is_finite() || value.trunc() != value || !(1.0..=128.0).contains(&value) {
        return None;
    }
    let code = value as u16;
    if VALID_CODES.contains(&code) {
        Some(code)
    } else {
        None
    }
}

/// The (dr, dc) offset a code drains to, for walking downstream.
pub fn downstream_offset(code: u16) -> Option<(isize, isize)> {
    match code {
        1 => Some((0, 1)),    // E
        2 => Some((1, 1)),    // SE
        4 => Some((1, 0)),    // S
        8 => Some((1, -1)),   // SW
        16 => Some((0, -1)),  // W
        32 => Some((-1, -1)), // NW
        64 => Some((-1, 0)),  // N
        128 => Some((-1, 1)), // NE
        _ => None,
    }
}
