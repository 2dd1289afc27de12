/// Integer division rounding towards positive infinity.
#[inline]
pub fn div_ceil(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator - 1) / denominator
}

/// The size of an axis after `levels` halvings, never dropping below 1.
#[inline]
pub fn halve_clamped(size: u64, levels: u32) -> u64 {
    size.checked_shr(levels).unwrap_or(0).max(1)
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
