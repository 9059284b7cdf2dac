//! The scene object graph and the asset-store contract the core consumes.

mod asset;
mod object;

pub use asset::{AssetError, AssetStore, MemoryAssetStore};
pub use object::{Scene, SceneError, SceneObject, Transform};
