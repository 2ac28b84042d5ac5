//! ROI masks feeding the defect tool.

use inspekt_config::{DefectThreshold, Roi, RoiUsage};
use inspekt_vision::{BgrImage, DefectDetectionTool, InspectionStatus, VisionTool, build_mask};

/// 100x100 dark plate with bright spots at (20, 20) and (70, 70), 8px each.
fn plate() -> BgrImage {
  let mut image = BgrImage::from_pixel(100, 100, [20, 20, 20]);
  for (ox, oy) in [(20, 20), (70, 70)] {
    for y in oy..oy + 8 {
      for x in ox..ox + 8 {
        image.put_pixel(x, y, [240, 240, 240]);
      }
    }
  }
  image
}

fn white_only() -> DefectDetectionTool {
  DefectDetectionTool::new(DefectThreshold {
    detect_black: false,
    ..Default::default()
  })
}

#[test]
fn test_unmasked_finds_both_spots() {
  let result = white_only().run(&plate(), None);
  assert_eq!(result.defects.len(), 2);
  assert_eq!(result.data["defectCount"], 2);
}

#[test]
fn test_include_region_limits_search() {
  let rois = vec![Roi::rectangle(25.0, 25.0, 30.0, 30.0, RoiUsage::Include)];
  let mask = build_mask(&rois, 100, 100);

  let result = white_only().run(&plate(), Some(&mask));
  assert_eq!(result.defects.len(), 1);
  assert_eq!(result.defects[0].x, 20.0);
}

#[test]
fn test_exclude_region_hides_spot() {
  let rois = vec![
    Roi::circle(74.0, 74.0, 10.0, RoiUsage::Exclude),
    Roi::circle(24.0, 24.0, 10.0, RoiUsage::Exclude),
  ];
  let mask = build_mask(&rois, 100, 100);

  let result = white_only().run(&plate(), Some(&mask));
  assert_eq!(result.status, InspectionStatus::Ok);
}
