//! ARGB color helpers.
//!
//! Colors travel through the property system as `0xAARRGGBB` values packed in
//! an `f64` slot, the same representation every other paint property uses.
//! Interpolation happens per channel so that transitions and animation
//! actions blend colors instead of sweeping through unrelated bit patterns.

pub const WHITE: u32 = 0xffff_ffff;

/// Interpolates two packed ARGB colors per channel. `t` is clamped to [0,1];
/// `t == 0` yields `a`, `t == 1` yields `b`.
pub fn merge_colors(a: u32, b: u32, t: f64) -> u32 {
    let t = t.clamp(0.0, 1.0);

    fn channel(a: u32, b: u32, shift: u32, t: f64) -> u32 {
        let ca = f64::from((a >> shift) & 0xff);
        let cb = f64::from((b >> shift) & 0xff);
        let v = (ca + (cb - ca) * t).round().clamp(0.0, 255.0) as u32;
        v << shift
    }

    channel(a, b, 24, t) | channel(a, b, 16, t) | channel(a, b, 8, t) | channel(a, b, 0, t)
}

/// Packs a color carried in an `f64` property slot back into `u32`.
pub fn from_slot(v: f64) -> u32 {
    v.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Widens a packed color into an `f64` property slot. Exact: every `u32` is
/// representable in `f64`.
pub fn to_slot(c: u32) -> f64 {
    f64::from(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_endpoints_are_exact() {
        assert_eq!(merge_colors(0xff000000, 0xffffffff, 0.0), 0xff000000);
        assert_eq!(merge_colors(0xff000000, 0xffffffff, 1.0), 0xffffffff);
    }

    #[test]
    fn merge_blends_per_channel() {
        let mid = merge_colors(0xff000000, 0xff0000ff, 0.5);
        assert_eq!(mid, 0xff000080);
        // Alpha interpolates like any other channel.
        let half = merge_colors(0x00ff0000, 0xffff0000, 0.5);
        assert_eq!(half >> 24, 0x80);
    }

    #[test]
    fn merge_clamps_t() {
        assert_eq!(merge_colors(0xff0000ff, 0xffff0000, -1.0), 0xff0000ff);
        assert_eq!(merge_colors(0xff0000ff, 0xffff0000, 2.0), 0xffff0000);
    }

    #[test]
    fn slot_round_trip_is_lossless() {
        for c in [0u32, WHITE, 0x80402010, u32::MAX] {
            assert_eq!(from_slot(to_slot(c)), c);
        }
    }
}
