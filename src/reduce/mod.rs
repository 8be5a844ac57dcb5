//! Dimensionality reduction and neighbour search over embeddings.

pub mod neighbors;
pub mod pca;

pub use neighbors::{connections, nearest_neighbors, Connection};
pub use pca::{pca, Projection};
