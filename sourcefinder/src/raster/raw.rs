//! Headerless little-endian raster files.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::buffer2::Buffer2;
use crate::error::Error;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Swaps every element between host and little-endian byte order. A no-op on
/// little-endian hosts.
fn swap_to_little_endian<T: bytemuck::Pod>(values: &mut [T]) {
    if cfg!(target_endian = "big") {
        let size = std::mem::size_of::<T>();
        for value in bytemuck::cast_slice_mut::<T, u8>(values).chunks_exact_mut(size) {
            value.reverse();
        }
    }
}

pub fn write_raw<T: bytemuck::Pod>(path: &Path, buffer: &Buffer2<T>) -> Result<(), Error> {
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = BufWriter::new(file);
    if cfg!(target_endian = "little") {
        writer
            .write_all(bytemuck::cast_slice(buffer.pixels()))
            .map_err(io_error(path))?;
    } else {
        let mut pixels = buffer.pixels().to_vec();
        swap_to_little_endian(&mut pixels);
        writer
            .write_all(bytemuck::cast_slice(&pixels))
            .map_err(io_error(path))?;
    }
    writer.flush().map_err(io_error(path))
}

/// Reads a `width x height` raster. A file of the wrong size yields a buffer
/// whose pixel count disagrees with the shape, which frame validation rejects.
pub fn read_raw<T: bytemuck::Pod>(
    path: &Path,
    width: usize,
    height: usize,
) -> Result<Buffer2<T>, Error> {
    let bytes = std::fs::read(path).map_err(io_error(path))?;
    let usable = bytes.len() - bytes.len() % std::mem::size_of::<T>();
    let mut pixels: Vec<T> = bytemuck::pod_collect_to_vec(&bytes[..usable]);
    swap_to_little_endian(&mut pixels);
    Ok(Buffer2::from_parts_unchecked(width, height, pixels))
}
