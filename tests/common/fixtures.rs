use std::io::Cursor;

use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use shelfscan::models::{BoundingBox, Detection};

pub const RED: [u8; 3] = [220, 30, 30];
pub const ORANGE: [u8; 3] = [255, 140, 0];
pub const GREEN: [u8; 3] = [30, 200, 30];
pub const BLUE: [u8; 3] = [30, 30, 220];

pub fn bbox(x1: i32, y1: i32, x2: i32, y2: i32) -> BoundingBox {
    BoundingBox::new(x1, y1, x2, y2).expect("valid test box")
}

pub fn detection(x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32) -> Detection {
    Detection::new(bbox(x1, y1, x2, y2), confidence)
}

pub const BLACK: [u8; 3] = [0, 0, 0];

/// Black shelf with one solid rectangle per product.
pub fn shelf_image(width: u32, height: u32, products: &[(BoundingBox, [u8; 3])]) -> RgbImage {
    shelf_image_on(width, height, BLACK, products)
}

/// Shelf of a single `background` colour with one solid rectangle per product.
pub fn shelf_image_on(
    width: u32,
    height: u32,
    background: [u8; 3],
    products: &[(BoundingBox, [u8; 3])],
) -> RgbImage {
    let mut img: RgbImage = ImageBuffer::from_pixel(width, height, Rgb(background));
    for (b, color) in products {
        let rect = Rect::at(b.x1(), b.y1()).of_size(b.width() as u32, b.height() as u32);
        draw_filled_rect_mut(&mut img, rect, Rgb(*color));
    }
    img
}

/// PNG file bytes for `img`.
pub fn encode_png(img: &RgbImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes.into_inner()
}

/// Four products in a row: two red, two green.
pub fn four_product_shelf() -> (RgbImage, Vec<Detection>) {
    let boxes = [
        (bbox(10, 20, 70, 140), RED),
        (bbox(90, 20, 150, 140), RED),
        (bbox(170, 20, 230, 140), GREEN),
        (bbox(250, 20, 310, 140), GREEN),
    ];
    let img = shelf_image(320, 160, &boxes);
    let detections = boxes
        .iter()
        .map(|(b, _)| Detection::new(*b, 0.8))
        .collect();
    (img, detections)
}
