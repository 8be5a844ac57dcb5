pub mod hasher;
pub mod walker;

pub use hasher::hash_file;
pub use walker::{is_image, mime_type, walk_images, WalkConfig};
