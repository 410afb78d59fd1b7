//! Raster primitives: 2-D buffers, masks, cutouts, frames, the pixel/sky
//! transform and the FITS and raw file formats.

mod buffer2;
mod cutout;
mod ellipse;
pub mod fits;
mod frame;
mod mask;
pub mod raw;
mod transform;


pub use buffer2::{Buffer2, Raster, SegmentationMap};
pub use cutout::Cutout;
pub use ellipse::Ellipse;
pub use frame::{Filter, Frame};
pub use mask::Mask;
pub use transform::{CoordinateTransform, SkyBox, SkyCoordinate};
