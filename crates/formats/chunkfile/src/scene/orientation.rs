//! Packed orientation matrices.
//!
//! Each entry stores the `x` and `y` components of the first two axes as
//! fixed-point words scaled by 2^30. Bit 0 of an axis's first word carries
//! the sign of that axis's `z` component, whose magnitude is recovered from
//! unit length. The third axis is the cross product of the first two.

use glam::{DMat3, DVec3};

/// Fixed-point scale of a packed component.
pub const SCALE: f64 = (1u32 << 30) as f64;

/// Tolerance used by [`is_orthonormal`].
pub const ORTHONORMAL_EPSILON: f64 = 1e-4;

/// Pack an orientation into its four stored words.
///
/// Only the first two axes are stored. Components outside `[-2, 2)` saturate.
pub fn pack(m: &DMat3) -> [i32; 4] {
    let [a, b] = pack_axis(m.x_axis);
    let [c, d] = pack_axis(m.y_axis);
    [a, b, c, d]
}

fn pack_axis(axis: DVec3) -> [i32; 2] {
    let mut x = (axis.x * SCALE).round() as i32;
    let y = (axis.y * SCALE).round() as i32;
    if axis.z.is_sign_negative() {
        x |= 1;
    } else {
        x &= !1;
    }
    [x, y]
}

/// Rebuild an orientation from its stored words.
pub fn unpack(words: [i32; 4]) -> DMat3 {
    let x_axis = unpack_axis(words[0], words[1]);
    let y_axis = unpack_axis(words[2], words[3]);
    DMat3::from_cols(x_axis, y_axis, x_axis.cross(y_axis))
}

fn unpack_axis(x: i32, y: i32) -> DVec3 {
    let fx = f64::from(x) / SCALE;
    let fy = f64::from(y) / SCALE;
    let z = (1.0 - fx * fx - fy * fy).max(0.0).sqrt();
    DVec3::new(fx, fy, if x & 1 != 0 { -z } else { z })
}

/// Whether every axis has unit length and the axes are mutually perpendicular.
pub fn is_orthonormal(m: &DMat3) -> bool {
    let axes = [m.x_axis, m.y_axis, m.z_axis];
    let unit = axes
        .iter()
        .all(|a| (a.length_squared() - 1.0).abs() < ORTHONORMAL_EPSILON);
    unit && m.x_axis.dot(m.y_axis).abs() < ORTHONORMAL_EPSILON
        && m.x_axis.dot(m.z_axis).abs() < ORTHONORMAL_EPSILON
        && m.y_axis.dot(m.z_axis).abs() < ORTHONORMAL_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_exact() {
        let words = pack(&DMat3::IDENTITY);
        assert_eq!(words, [1 << 30, 0, 0, 1 << 30]);
        assert_eq!(unpack(words), DMat3::IDENTITY);
    }

    #[test]
    fn negative_z_sets_low_bit() {
        let angle = -0.5f64;
        let m = DMat3::from_rotation_x(angle);
        let words = pack(&m);
        assert_eq!(words[0] & 1, 0);
        assert_eq!(words[2] & 1, 1);
        let back = unpack(words);
        assert!(back.y_axis.z < 0.0);
        assert!(back.abs_diff_eq(m, 1e-6));
        assert!(is_orthonormal(&back));
    }

    #[test]
    fn repacking_a_decoded_matrix_is_stable() {
        for words in [
            [1 << 30, 0, 0, 1 << 30],
            [0x2000_0001, 0x1234_5678, -0x0ABC_DEF0, 0x0100_0000],
            [1, 0, 0, 0],
        ] {
            let decoded = unpack(words);
            assert_eq!(pack(&decoded), words);
            assert_eq!(unpack(pack(&decoded)), decoded);
        }
    }

    #[test]
    fn third_axis_is_cross_product() {
        let m = DMat3::from_rotation_x(0.4) * DMat3::from_rotation_y(0.3) * DMat3::from_rotation_z(1.0);
        let back = unpack(pack(&m));
        assert!(back.z_axis.abs_diff_eq(back.x_axis.cross(back.y_axis), 1e-12));
        assert!(back.abs_diff_eq(m, 1e-6));
    }

    #[test]
    fn parallel_axes_are_not_orthonormal() {
        let half = 1 << 29;
        let m = unpack([half, half, half, half]);
        assert!(!is_orthonormal(&m));
    }
}
