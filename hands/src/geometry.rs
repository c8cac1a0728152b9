//! Small affine helpers over plain arrays.
//!
//! Positions are `[f64; 3]`, transforms are row-major 4x4 matrices with the
//! translation in column 3.

/// A point or direction in scene coordinates.
pub type Vec3 = [f64; 3];

/// Row-major 4x4 affine matrix.
pub type Mat4 = [[f64; 4]; 4];

pub const ORIGIN: Vec3 = [0.0, 0.0, 0.0];

pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn norm(v: Vec3) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Unit vector in the direction of `v`, or `v` unchanged if it has no length.
pub fn normalize(v: Vec3) -> Vec3 {
    let len = norm(v);
    if len < 1e-12 {
        return v;
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

pub fn identity() -> Mat4 {
    let mut m = [[0.0; 4]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

/// Identity with a uniform scale on the 3x3 diagonal.
pub fn scaling(s: f64) -> Mat4 {
    let mut m = identity();
    for (i, row) in m.iter_mut().enumerate().take(3) {
        row[i] = s;
    }
    m
}

pub fn mul(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [[0.0; 4]; 4];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..4).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Translation column of an affine matrix.
pub fn translation(m: &Mat4) -> Vec3 {
    [m[0][3], m[1][3], m[2][3]]
}

pub fn set_translation(m: &mut Mat4, p: Vec3) {
    m[0][3] = p[0];
    m[1][3] = p[1];
    m[2][3] = p[2];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cross_right_handed() {
        assert_eq!(cross([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]), [0.0, 0.0, 1.0]);
        assert_eq!(cross([0.0, 0.0, 1.0], [0.0, 1.0, 0.0]), [-1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(normalize(ORIGIN), ORIGIN);
        let n = normalize([3.0, 0.0, 4.0]);
        assert!((norm(n) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mul_composes_translations() {
        let mut a = identity();
        set_translation(&mut a, [1.0, 2.0, 3.0]);
        let mut b = scaling(10.0);
        set_translation(&mut b, [1.0, 0.0, 0.0]);
        // b's translation is not scaled by b's own diagonal, only by a's 3x3.
        let m = mul(&a, &b);
        assert_eq!(translation(&m), [2.0, 2.0, 3.0]);
        assert_eq!(m[0][0], 10.0);
    }
}
