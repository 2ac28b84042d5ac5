use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_polygon_mut};
use imageproc::point::Point;
use inspekt_config::{Roi, RoiShape, RoiUsage};
use tracing::debug;

pub const INCLUDED: u8 = 255;
pub const EXCLUDED: u8 = 0;

/// Compose ROIs into a binary processing mask (255 = process, 0 = ignore).
///
/// With no enabled include region the whole frame is included. Otherwise
/// only the union of include regions is. Exclude regions are painted last
/// and always win.
pub fn build_mask(rois: &[Roi], width: u32, height: u32) -> GrayImage {
  let enabled = || rois.iter().filter(|r| r.enabled);
  let has_include = enabled().any(|r| r.usage == RoiUsage::Include);

  let mut mask = GrayImage::from_pixel(width, height, Luma([if has_include { EXCLUDED } else { INCLUDED }]));

  for roi in enabled().filter(|r| r.usage == RoiUsage::Include) {
    paint(&mut mask, roi, INCLUDED);
  }
  for roi in enabled().filter(|r| r.usage == RoiUsage::Exclude) {
    paint(&mut mask, roi, EXCLUDED);
  }
  mask
}

fn paint(mask: &mut GrayImage, roi: &Roi, value: u8) {
  match roi.shape {
    RoiShape::Circle => {
      let [cx, cy, radius] = match roi.points.as_slice() {
        [cx, cy, radius, ..] => [*cx, *cy, *radius],
        _ => {
          debug!(roi_id = %roi.id, "circle ROI needs three points");
          return;
        }
      };
      if radius < 0.0 {
        return;
      }
      draw_filled_circle_mut(
        mask,
        (cx.round() as i32, cy.round() as i32),
        radius.round() as i32,
        Luma([value]),
      );
    }
    RoiShape::Rectangle | RoiShape::Triangle | RoiShape::Polygon => {
      fill_polygon(mask, &roi.vertices(), value);
    }
  }
}

fn fill_polygon(mask: &mut GrayImage, vertices: &[(f64, f64)], value: u8) {
  let mut points: Vec<Point<i32>> = Vec::with_capacity(vertices.len());
  for (x, y) in vertices {
    let point = Point::new(x.round() as i32, y.round() as i32);
    if points.last() != Some(&point) {
      points.push(point);
    }
  }
  // The rasterizer expects an open polygon.
  while points.len() > 1 && points.first() == points.last() {
    points.pop();
  }
  if points.len() < 3 {
    return;
  }
  draw_polygon_mut(mask, &points, Luma([value]));
}
