use crate::{sample_bilinear_u8, GrayImage, GrayImageView};
use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Projective 3x3 transform acting on homogeneous pixel coordinates.
///
/// Pixel coordinates use integer values at pixel centres.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// `[[s, 0, tx], [0, s, ty], [0, 0, 1]]`.
    pub fn scale_translation(s: f64, tx: f64, ty: f64) -> Self {
        Self::new(Matrix3::new(s, 0.0, tx, 0.0, s, ty, 0.0, 0.0, 1.0))
    }

    /// Rotation by `theta` radians about `(cx, cy)`.
    pub fn rotation_about(theta: f64, cx: f64, cy: f64) -> Self {
        let (s, c) = theta.sin_cos();
        Self::new(Matrix3::new(
            c,
            -s,
            cx - c * cx + s * cy,
            s,
            c,
            cy - s * cx - c * cy,
            0.0,
            0.0,
            1.0,
        ))
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    /// Map `(x, y)` in f64. `None` when the point lands on the line at infinity.
    #[inline]
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let v = self.h * Vector3::new(x, y, 1.0);
        if v[2].abs() < 1e-12 {
            return None;
        }
        Some((v[0] / v[2], v[1] / v[2]))
    }

    pub fn inverse(&self) -> Option<Self> {
        let inv = self.h.try_inverse()?;
        normalize_homography(inv).map(Self::new)
    }

    pub fn is_finite(&self) -> bool {
        self.h.iter().all(|v| v.is_finite())
    }

    /// In-plane rotation angle of the linear part, radians.
    pub fn rotation_angle(&self) -> f64 {
        self.h[(1, 0)].atan2(self.h[(0, 0)])
    }

    /// Translation column `(tx, ty)` after normalizing `h22` to one.
    pub fn translation(&self) -> (f64, f64) {
        let s = self.h[(2, 2)];
        (self.h[(0, 2)] / s, self.h[(1, 2)] / s)
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn centroid(pts: &[Point2<f32>]) -> (f64, f64) {
    let n = pts.len() as f64;
    let (sx, sy) = pts
        .iter()
        .fold((0.0, 0.0), |(ax, ay), p| (ax + p.x as f64, ay + p.y as f64));
    (sx / n, sy / n)
}

/// Translate to the centroid and scale so the mean distance is sqrt(2).
fn normalize_points(pts: &[Point2<f32>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    let (cx, cy) = centroid(pts);
    let mean_dist = pts
        .iter()
        .map(|p| {
            let dx = p.x as f64 - cx;
            let dy = p.y as f64 - cy;
            (dx * dx + dy * dy).sqrt()
        })
        .sum::<f64>()
        / pts.len() as f64;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x as f64, p.y as f64, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Least-squares H with `dst ~ H * src` over N >= 4 correspondences
/// (normalized DLT). Exactly four points go through [`homography_from_4pt`].
pub fn fit_homography(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }

    if src.len() == 4 {
        let s: &[Point2<f32>; 4] = src.try_into().ok()?;
        let d: &[Point2<f32>; 4] = dst.try_into().ok()?;
        return homography_from_4pt(s, d);
    }

    let (sn, ts) = normalize_points(src);
    let (dn, td) = normalize_points(dst);

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);

    for k in 0..n {
        let (x, y) = (sn[k].x, sn[k].y);
        let (u, v) = (dn[k].x, dn[k].y);

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // Null vector of A: last row of V^T.
    let svd = a.svd(true, true);
    let vt = svd.v_t?;
    let last = vt.nrows().checked_sub(1)?;
    let h = vt.row(last);

    let hn =
        Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    let h_den = denormalize_homography(hn, ts, td)?;
    let h_den = normalize_homography(h_den)?;
    let out = Homography::new(h_den);
    out.is_finite().then_some(out)
}

/// Exact H with `dst ~ H * src` from four correspondences.
///
/// Solves the normalized 8x8 system with `h33 = 1`. Returns `None` when the
/// system is singular (e.g. three collinear points).
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let (src_n, t_src) = normalize_points(src);
    let (dst_n, t_dst) = normalize_points(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let (x, y) = (src_n[k].x, src_n[k].y);
        let (u, v) = (dst_n[k].x, dst_n[k].y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h_den = denormalize_homography(hn, t_src, t_dst)?;
    let h_den = normalize_homography(h_den)?;
    let out = Homography::new(h_den);
    out.is_finite().then_some(out)
}

/// Least-squares `dst ~ s * src + t` (uniform scale plus translation, no
/// rotation) over N >= 2 correspondences.
///
/// Returns `None` when the source points coincide or the fitted scale is not
/// positive.
pub fn fit_scale_translation(src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 2 {
        return None;
    }
    let (sx, sy) = centroid(src);
    let (dx, dy) = centroid(dst);

    let mut num = 0.0;
    let mut den = 0.0;
    for (p, q) in src.iter().zip(dst) {
        let (px, py) = (p.x as f64 - sx, p.y as f64 - sy);
        let (qx, qy) = (q.x as f64 - dx, q.y as f64 - dy);
        num += px * qx + py * qy;
        den += px * px + py * py;
    }
    if den < 1e-9 {
        return None;
    }
    let s = num / den;
    if s.is_nan() || s <= 1e-9 {
        return None;
    }
    let out = Homography::scale_translation(s, dx - s * sx, dy - s * sy);
    out.is_finite().then_some(out)
}

/// Resample `src` into an `out_w x out_h` grid.
///
/// `h_src_from_dst` maps output pixel coordinates into `src`. Output pixels
/// whose source position falls outside the image get `fill`.
pub fn warp_gray(
    src: &GrayImageView<'_>,
    h_src_from_dst: &Homography,
    out_w: usize,
    out_h: usize,
    fill: u8,
) -> GrayImage {
    let mut out = vec![fill; out_w * out_h];

    for y in 0..out_h {
        for x in 0..out_w {
            let Some((sx, sy)) = h_src_from_dst.project(x as f64, y as f64) else {
                continue;
            };
            let (sx, sy) = (sx as f32, sy as f32);
            if src.contains(sx, sy) {
                out[y * out_w + x] = sample_bilinear_u8(src, sx, sy);
            }
        }
    }

    GrayImage {
        width: out_w,
        height: out_h,
        data: out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_close(a: Point2<f32>, b: Point2<f32>, tol: f32) {
        let dx = (a.x - b.x).abs();
        let dy = (a.y - b.y).abs();
        assert!(
            dx < tol && dy < tol,
            "expected ({:.6},{:.6}) ~ ({:.6},{:.6}) within {}",
            a.x,
            a.y,
            b.x,
            b.y,
            tol
        );
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = Homography::new(Matrix3::new(
            1.2, 0.1, 5.0, //
            -0.05, 0.9, 3.0, //
            0.001, 0.0005, 1.0,
        ));
        let inv = h.inverse().expect("invertible");

        for p in [
            Point2::new(0.0_f32, 0.0),
            Point2::new(50.0_f32, -20.0),
            Point2::new(320.0_f32, 200.0),
        ] {
            assert_close(inv.apply(h.apply(p)), p, 1e-3);
        }
    }

    #[test]
    fn four_points_recover_projective_map() {
        let truth = Homography::new(Matrix3::new(
            0.8, 0.05, 120.0, //
            -0.02, 1.1, 80.0, //
            0.0009, -0.0004, 1.0,
        ));

        let src = [
            Point2::new(0.0_f32, 0.0),
            Point2::new(180.0_f32, 0.0),
            Point2::new(180.0_f32, 130.0),
            Point2::new(0.0_f32, 130.0),
        ];
        let dst = src.map(|p| truth.apply(p));

        let recovered = homography_from_4pt(&src, &dst).expect("recoverable");
        for p in [
            Point2::new(0.0_f32, 0.0),
            Point2::new(60.0, 40.0),
            Point2::new(150.0, 120.0),
        ] {
            assert_close(recovered.apply(p), truth.apply(p), 1e-3);
        }
    }

    #[test]
    fn dlt_handles_overdetermined_case() {
        let truth = Homography::new(Matrix3::new(
            1.0, 0.2, 12.0, //
            -0.1, 0.9, 6.0, //
            0.0006, 0.0004, 1.0,
        ));

        let src: Vec<Point2<f32>> = (0..3)
            .flat_map(|y| (0..3).map(move |x| Point2::new(x as f32 * 40.0, y as f32 * 50.0)))
            .collect();
        let dst: Vec<Point2<f32>> = src.iter().map(|&p| truth.apply(p)).collect();

        let estimated = fit_homography(&src, &dst).expect("estimate");
        for p in [
            Point2::new(0.0_f32, 0.0),
            Point2::new(60.0, 40.0),
            Point2::new(80.0, 100.0),
        ] {
            assert_close(estimated.apply(p), truth.apply(p), 1e-3);
        }
    }

    #[test]
    fn mismatched_input_lengths_fail() {
        let src = [Point2::new(0.0_f32, 0.0); 4];
        let dst = [Point2::new(1.0_f32, 1.0); 3];
        assert!(fit_homography(&src, &dst).is_none());
        assert!(fit_scale_translation(&src, &dst).is_none());
    }

    #[test]
    fn scale_translation_fit_has_no_rotation_terms() {
        let truth = Homography::scale_translation(1.25, -7.0, 3.5);
        let src: Vec<Point2<f32>> = [(10.0, 10.0), (90.0, 15.0), (40.0, 70.0), (5.0, 55.0)]
            .iter()
            .map(|&(x, y)| Point2::new(x, y))
            .collect();
        let dst: Vec<Point2<f32>> = src.iter().map(|&p| truth.apply(p)).collect();

        let fit = fit_scale_translation(&src, &dst).expect("fit");
        assert_eq!(fit.h[(0, 1)], 0.0);
        assert_eq!(fit.h[(1, 0)], 0.0);
        assert_relative_eq!(fit.h[(0, 0)], 1.25, epsilon = 1e-5);
        let (tx, ty) = fit.translation();
        assert_relative_eq!(tx, -7.0, epsilon = 1e-3);
        assert_relative_eq!(ty, 3.5, epsilon = 1e-3);
    }

    #[test]
    fn scale_translation_rejects_coincident_points() {
        let src = [Point2::new(4.0_f32, 4.0); 3];
        let dst = [Point2::new(9.0_f32, 1.0); 3];
        assert!(fit_scale_translation(&src, &dst).is_none());
    }

    #[test]
    fn rotation_about_centre_reports_its_angle() {
        let h = Homography::rotation_about(0.1, 50.0, 40.0);
        assert_relative_eq!(h.rotation_angle(), 0.1, epsilon = 1e-12);
        let (x, y) = h.project(50.0, 40.0).expect("finite");
        assert_relative_eq!(x, 50.0, epsilon = 1e-9);
        assert_relative_eq!(y, 40.0, epsilon = 1e-9);
    }

    #[test]
    fn warp_gray_fills_outside_pixels() {
        let src = GrayImage::from_fn(8, 8, |x, y| (x * 10 + y) as u8);
        // Output (x, y) reads source (x + 2, y).
        let shift = Homography::scale_translation(1.0, 2.0, 0.0);
        let out = warp_gray(&src.view(), &shift, 8, 8, 200);
        assert_eq!(out.data[0], src.data[2]);
        assert_eq!(out.data[3 * 8 + 5], src.data[3 * 8 + 7]);
        assert_eq!(out.data[3 * 8 + 6], 200);
    }
}
