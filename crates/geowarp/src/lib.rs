#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use geowarp_raster as raster;

#[doc(inline)]
pub use geowarp_warp as warp;
