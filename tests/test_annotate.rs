mod common;
use common::*;

use billvision::detection::render::Renderer;
use billvision::{BoundingBox, Detection, partition, preprocess};

fn detection(name: &str, confidence: f32, bbox: BoundingBox) -> Detection {
    Detection {
        bbox,
        confidence,
        class_id: 0,
        class_name: name.to_string(),
    }
}

#[test]
fn test_annotate_detections_on_image() -> anyhow::Result<()> {
    let file = create_test_image();
    let img = preprocess::open_image(file.path())?;

    let split = partition(
        vec![
            detection("Ten Dollar", 0.9, BoundingBox::new(20, 40, 80, 90)),
            detection("One Dollar", 0.5, BoundingBox::new(0, 0, 10, 10)),
            detection("Five Dollar", 0.2, BoundingBox::new(5, 5, 50, 50)),
        ],
        0.5,
    );
    assert_eq!(split.accepted.len(), 2);
    assert_eq!(split.rejected.len(), 1);

    let annotations = split.annotations();
    assert_eq!(annotations[0].label, "Ten Dollar: 0.90");

    let mut canvas = img.to_rgb8();
    Renderer::new().draw(&mut canvas, &annotations);
    assert_eq!(canvas.get_pixel(20, 60).0, [0, 255, 0]);
    assert_eq!(canvas.get_pixel(50, 70).0, [255, 0, 0]);

    let dir = tempfile::TempDir::new()?;
    let out = dir.path().join("predicted_bill.png");
    canvas.save(&out)?;
    assert!(preprocess::open_image(&out).is_ok());
    Ok(())
}
