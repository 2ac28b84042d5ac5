//! Planar homography estimation with RANSAC.

use nalgebra::{DMatrix, DVector, Matrix3, RowDVector, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;

/// Projective 3x3 transform, normalized so the bottom-right entry is 1.
pub type Homography = Matrix3<f64>;

const ITERATIONS: usize = 1000;
const INLIER_THRESHOLD: f64 = 3.0;
const SEED: u64 = 0x5EED;
const SINGULAR_EPS: f64 = 1e-10;

pub fn project(h: &Homography, (x, y): (f64, f64)) -> Option<(f64, f64)> {
  let p = h * Vector3::new(x, y, 1.0);
  if p.z.abs() < 1e-12 {
    return None;
  }
  Some((p.x / p.z, p.y / p.z))
}

/// Robustly fit `src -> dst`. Returns the model and its inlier count.
pub fn find_homography(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<(Homography, usize)> {
  let n = src.len().min(dst.len());
  if n < 4 {
    return None;
  }

  let mut rng = StdRng::seed_from_u64(SEED);
  let mut best: Option<(Homography, Vec<usize>)> = None;

  for _ in 0..ITERATIONS {
    let sample = index::sample(&mut rng, n, 4).into_vec();
    let s: Vec<_> = sample.iter().map(|&i| src[i]).collect();
    let d: Vec<_> = sample.iter().map(|&i| dst[i]).collect();
    let Some(h) = fit(&s, &d) else {
      continue;
    };
    let inliers = inliers(&h, src, dst);
    if best.as_ref().is_none_or(|(_, b)| inliers.len() > b.len()) {
      let all = inliers.len() == n;
      best = Some((h, inliers));
      if all {
        break;
      }
    }
  }

  let (h, inlier_idx) = best?;
  if inlier_idx.len() < 4 {
    return None;
  }

  // Least-squares refinement on the consensus set.
  let s: Vec<_> = inlier_idx.iter().map(|&i| src[i]).collect();
  let d: Vec<_> = inlier_idx.iter().map(|&i| dst[i]).collect();
  let refined = fit(&s, &d).unwrap_or(h);
  let count = inliers(&refined, src, dst).len();
  if count < inlier_idx.len() {
    return Some((h, inlier_idx.len()));
  }
  Some((refined, count))
}

fn inliers(h: &Homography, src: &[(f64, f64)], dst: &[(f64, f64)]) -> Vec<usize> {
  src
    .iter()
    .zip(dst)
    .enumerate()
    .filter_map(|(i, (s, d))| {
      let (x, y) = project(h, *s)?;
      ((x - d.0).hypot(y - d.1) <= INLIER_THRESHOLD).then_some(i)
    })
    .collect()
}

/// Similarity transform moving the centroid to the origin with mean distance sqrt(2).
fn normalizer(points: &[(f64, f64)]) -> Matrix3<f64> {
  let n = points.len() as f64;
  let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
  let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
  let mean = points.iter().map(|p| (p.0 - cx).hypot(p.1 - cy)).sum::<f64>() / n;
  let scale = if mean > 1e-12 { std::f64::consts::SQRT_2 / mean } else { 1.0 };
  Matrix3::new(scale, 0.0, -scale * cx, 0.0, scale, -scale * cy, 0.0, 0.0, 1.0)
}

fn apply(t: &Matrix3<f64>, (x, y): (f64, f64)) -> (f64, f64) {
  let p = t * Vector3::new(x, y, 1.0);
  (p.x, p.y)
}

/// Direct linear fit with `h33 = 1` on Hartley-normalized points.
fn fit(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Homography> {
  let t_src = normalizer(src);
  let t_dst = normalizer(dst);

  let n = src.len().min(dst.len());
  let mut a = DMatrix::<f64>::zeros(2 * n, 8);
  let mut b = DVector::<f64>::zeros(2 * n);
  for (i, (s, d)) in src.iter().zip(dst).enumerate() {
    let (x, y) = apply(&t_src, *s);
    let (u, v) = apply(&t_dst, *d);
    a.set_row(2 * i, &RowDVector::from_row_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -x * u, -y * u]));
    b[2 * i] = u;
    a.set_row(2 * i + 1, &RowDVector::from_row_slice(&[0.0, 0.0, 0.0, x, y, 1.0, -x * v, -y * v]));
    b[2 * i + 1] = v;
  }

  let x = solve_dlt(a, b)?;
  let hn = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0);

  let h = t_dst.try_inverse()? * hn * t_src;
  let w = h[(2, 2)];
  if w.abs() < 1e-12 {
    return None;
  }
  Some(h / w)
}

/// Exact solve for a minimal sample, least squares for a consensus set.
/// Rank-deficient systems (collinear points) yield `None`.
fn solve_dlt(a: DMatrix<f64>, b: DVector<f64>) -> Option<DVector<f64>> {
  if a.nrows() == 8 {
    let lu = a.lu();
    if lu.determinant().abs() < SINGULAR_EPS {
      return None;
    }
    return lu.solve(&b);
  }
  let svd = a.svd(true, true);
  if svd.rank(SINGULAR_EPS) < 8 {
    return None;
  }
  svd.solve(&b, SINGULAR_EPS).ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn transform(h: &Homography, points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    points.iter().map(|p| project(h, *p).unwrap()).collect()
  }

  fn grid() -> Vec<(f64, f64)> {
    (0..5)
      .flat_map(|i| (0..4).map(move |j| (10.0 + i as f64 * 23.0, 5.0 + j as f64 * 31.0)))
      .collect()
  }

  #[test]
  fn test_recovers_translation() {
    let src = grid();
    let dst: Vec<_> = src.iter().map(|(x, y)| (x + 40.0, y + 50.0)).collect();

    let (h, inliers) = find_homography(&src, &dst).unwrap();
    assert_eq!(inliers, src.len());
    let (x, y) = project(&h, (0.0, 0.0)).unwrap();
    assert!((x - 40.0).abs() < 1e-6 && (y - 50.0).abs() < 1e-6);
  }

  #[test]
  fn test_ignores_outliers() {
    let truth = Matrix3::new(0.9, -0.2, 12.0, 0.15, 1.1, -7.0, 0.0005, 0.0002, 1.0);
    let src = grid();
    let mut dst = transform(&truth, &src);
    dst[3] = (500.0, -20.0);
    dst[11] = (0.0, 0.0);

    let (h, inliers) = find_homography(&src, &dst).unwrap();
    assert_eq!(inliers, src.len() - 2);
    let (x, y) = project(&h, (60.0, 60.0)).unwrap();
    let (tx, ty) = project(&truth, (60.0, 60.0)).unwrap();
    assert!((x - tx).abs() < 1e-3 && (y - ty).abs() < 1e-3);
  }

  #[test]
  fn test_four_points_fit_a_perspective_exactly() {
    let truth = Matrix3::new(1.2, 0.1, -4.0, -0.05, 0.95, 9.0, 0.001, -0.0008, 1.0);
    let src = [(0.0, 0.0), (100.0, 0.0), (100.0, 60.0), (0.0, 60.0)];
    let dst = transform(&truth, &src);

    let h = fit(&src, &dst).unwrap();
    assert!((h - truth).abs().max() < 1e-9);
  }

  #[test]
  fn test_collinear_points_fail() {
    let src: Vec<_> = (0..6).map(|i| (i as f64, i as f64)).collect();
    let dst = src.clone();
    assert!(find_homography(&src, &dst).is_none());
  }

  #[test]
  fn test_too_few_points() {
    let pts = vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];
    assert!(find_homography(&pts, &pts).is_none());
  }
}
