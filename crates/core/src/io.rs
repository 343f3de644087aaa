//! Native GeoTIFF I/O for elevation models.
//!
//! Uses the `tiff` crate directly. Only single-band grids are supported:
//! the DEM is the one raster input of the chi pipeline and everything
//! downstream is tabular.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use std::fs::File;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

// GeoTIFF tags: ModelPixelScaleTag / ModelTiepointTag
const TAG_PIXEL_SCALE: u16 = 33550;
const TAG_TIEPOINT: u16 = 33922;

/// Read a single-band GeoTIFF into an f64 raster.
///
/// Integer and f32 samples are widened to f64. The geotransform is taken
/// from the pixel-scale and tiepoint tags when present; otherwise the
/// default unit transform applies.
pub fn read_dem<P: AsRef<Path>>(path: P) -> Result<Raster<f64>> {
    let file = File::open(path.as_ref())?;
    let mut decoder = Decoder::new(file)?;

    let (width, height) = decoder.dimensions()?;
    let rows = height as usize;
    let cols = width as usize;

    let data: Vec<f64> = match decoder.read_image()? {
        DecodingResult::F32(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::U16(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::U32(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::I8(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::I16(buf) => buf.iter().map(|&v| v as f64).collect(),
        DecodingResult::I32(buf) => buf.iter().map(|&v| v as f64).collect(),
        _ => return Err(Error::Tiff("unsupported TIFF sample format".to_string())),
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;
    if let Ok(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_nodata(Some(-9999.0));

    Ok(raster)
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::Unknown(TAG_PIXEL_SCALE))
        .map_err(|e| Error::Tiff(e.to_string()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::Unknown(TAG_TIEPOINT))
        .map_err(|e| Error::Tiff(e.to_string()))?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(Error::Tiff("incomplete georeferencing tags".to_string()));
    }

    // tiepoint: [I, J, K, X, Y, Z]; scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Ok(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// Write an f64 raster as a 32-bit float GeoTIFF with pixel-scale and
/// tiepoint tags.
pub fn write_raster<P: AsRef<Path>>(raster: &Raster<f64>, path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut encoder = TiffEncoder::new(file)?;

    let (rows, cols) = raster.shape();
    let data: Vec<f32> = raster.data().iter().map(|&v| v as f32).collect();

    let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image.encoder().write_tag(Tag::Unknown(TAG_PIXEL_SCALE), &scale[..])?;
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image.encoder().write_tag(Tag::Unknown(TAG_TIEPOINT), &tiepoint[..])?;

    image.write_data(&data)?;
    Ok(())
}
