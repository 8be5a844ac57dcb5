//! Synthetic test set: solid circles, squares and triangles in distinct
//! colours on white, for trying the tool without a real photo collection.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

pub const IMAGE_SIZE: u32 = 200;
pub const DEFAULT_PER_SHAPE: usize = 20;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
/// Every 24-bit colour except white.
const DISTINCT_COLORS: usize = (1 << 24) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Circle,
    Square,
    Triangle,
}

impl Shape {
    pub const ALL: [Shape; 3] = [Shape::Circle, Shape::Square, Shape::Triangle];

    pub fn name(&self) -> &'static str {
        match self {
            Shape::Circle => "circle",
            Shape::Square => "square",
            Shape::Triangle => "triangle",
        }
    }

    /// Whether pixel (x, y) is inside the shape. Bounds are inclusive.
    fn contains(&self, x: u32, y: u32) -> bool {
        let size = IMAGE_SIZE as f64;
        let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
        match self {
            Shape::Circle => {
                let margin = 20.0;
                let center = size / 2.0;
                let radius = center - margin;
                (px - center).powi(2) + (py - center).powi(2) <= radius * radius
            }
            Shape::Square => {
                let margin = 30;
                (margin..=IMAGE_SIZE - margin).contains(&x)
                    && (margin..=IMAGE_SIZE - margin).contains(&y)
            }
            Shape::Triangle => {
                let margin = 20.0;
                let a = (size / 2.0, margin);
                let b = (margin, size - margin);
                let c = (size - margin, size - margin);
                let edge = |p: (f64, f64), q: (f64, f64)| {
                    (q.0 - p.0) * (py - p.1) - (q.1 - p.1) * (px - p.0)
                };
                let (d1, d2, d3) = (edge(a, b), edge(b, c), edge(c, a));
                let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
                let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
                !(has_neg && has_pos)
            }
        }
    }

    pub fn render(&self, color: Rgb<u8>) -> RgbImage {
        RgbImage::from_fn(IMAGE_SIZE, IMAGE_SIZE, |x, y| {
            if self.contains(x, y) { color } else { WHITE }
        })
    }
}

pub fn hex(color: Rgb<u8>) -> String {
    format!("{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

/// Write `per_shape` images of each shape into `dir`, every one in a colour
/// not used elsewhere in the set. The same seed reproduces the same files.
pub fn generate(dir: &Path, per_shape: usize, seed: u64) -> Result<Vec<PathBuf>> {
    let total = per_shape
        .checked_mul(Shape::ALL.len())
        .filter(|&n| n <= DISTINCT_COLORS)
        .with_context(|| {
            format!("{per_shape} images per shape needs more than {DISTINCT_COLORS} distinct colours")
        })?;

    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut used = HashSet::new();
    let mut written = Vec::with_capacity(total);

    for shape in Shape::ALL {
        for i in 1..=per_shape {
            let color = loop {
                let c = Rgb([rng.r#gen(), rng.r#gen(), rng.r#gen()]);
                // White would make the shape invisible.
                if c != WHITE && used.insert(c) {
                    break c;
                }
            };
            let path = dir.join(format!("{}_{}_{i:02}.png", shape.name(), hex(color)));
            shape
                .render(color)
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            written.push(path);
        }
    }

    info!(count = written.len(), dir = %dir.display(), "generated sample images");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_cover_their_centres_not_their_corners() {
        for shape in Shape::ALL {
            assert!(shape.contains(100, 120), "{shape:?}");
            assert!(!shape.contains(0, 0), "{shape:?}");
            assert!(!shape.contains(199, 199), "{shape:?}");
        }
    }

    #[test]
    fn shapes_differ_in_footprint() {
        // Near the top middle only the triangle's apex and the circle reach.
        assert!(Shape::Triangle.contains(100, 25));
        assert!(Shape::Circle.contains(100, 25));
        assert!(!Shape::Square.contains(100, 25));
        // Bottom-left corner region: square and triangle, not the circle.
        assert!(Shape::Square.contains(35, 165));
        assert!(Shape::Triangle.contains(25, 178));
        assert!(!Shape::Circle.contains(30, 170));
    }

    #[test]
    fn generates_unique_named_files() {
        let tmp = tempfile::tempdir().unwrap();
        let files = generate(tmp.path(), 4, 42).unwrap();
        assert_eq!(files.len(), 12);

        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names[0].starts_with("circle_") && names[0].ends_with("_01.png"));
        assert!(names[4].starts_with("square_"));
        assert!(names[11].starts_with("triangle_") && names[11].ends_with("_04.png"));

        let colors: HashSet<&str> = names.iter().map(|n| n.split('_').nth(1).unwrap()).collect();
        assert_eq!(colors.len(), 12);

        let img = image::open(&files[0]).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (IMAGE_SIZE, IMAGE_SIZE));
        assert_eq!(img.get_pixel(0, 0), &WHITE);
        assert_eq!(hex(*img.get_pixel(100, 100)), names[0].split('_').nth(1).unwrap());
    }

    #[test]
    fn too_many_images_for_unique_colours_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("out");
        let err = generate(&dir, DISTINCT_COLORS / 3 + 1, 0).unwrap_err();
        assert!(err.to_string().contains("distinct colours"), "{err}");
        assert!(!dir.exists());
        assert!(generate(&dir, usize::MAX, 0).is_err());
    }

    #[test]
    fn same_seed_same_set() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let fa: Vec<_> = generate(a.path(), 2, 9).unwrap().iter().map(|p| p.file_name().unwrap().to_owned()).collect();
        let fb: Vec<_> = generate(b.path(), 2, 9).unwrap().iter().map(|p| p.file_name().unwrap().to_owned()).collect();
        assert_eq!(fa, fb);
    }
}
