pub mod asset;

pub use asset::{Asset, LocalAsset, RemoteAsset};
