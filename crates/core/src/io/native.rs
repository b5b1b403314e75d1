//! GeoTIFF reading/writing on top of the `tiff` crate
//!
//! Georeferencing is carried in the standard GeoTIFF tags: ModelPixelScale,
//! ModelTiepoint and a GeoKeyDirectory holding the EPSG code. No-data is
//! stored in the GDAL_NODATA ASCII tag so GDAL-based tools pick it up.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

/// Read the first band of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(BufReader::new(file))
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let rows = height as usize;
    let cols = width as usize;

    let data: Vec<T> = match decoder.read_image()? {
        DecodingResult::F32(buf) => cast_all(&buf),
        DecodingResult::F64(buf) => cast_all(&buf),
        DecodingResult::U8(buf) => cast_all(&buf),
        DecodingResult::U16(buf) => cast_all(&buf),
        DecodingResult::U32(buf) => cast_all(&buf),
        DecodingResult::I8(buf) => cast_all(&buf),
        DecodingResult::I16(buf) => cast_all(&buf),
        DecodingResult::I32(buf) => cast_all(&buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));

    if let Ok(text) = decoder.get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        && let Ok(nd) = text.trim_matches(char::from(0)).trim().parse::<f64>()
    {
        raster.set_nodata(Some(T::from_f64(nd)));
    }

    Ok(raster)
}

fn cast_all<S: num_traits::ToPrimitive + Copy, T: RasterElement>(buf: &[S]) -> Vec<T> {
    buf.iter()
        .map(|&v| <T as num_traits::NumCast>::from(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT)).ok()?;

    if scale.len() >= 2 && tiepoint.len() >= 6 {
        // tiepoint: [I, J, K, X, Y, Z]
        let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
        let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
        return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
    }
    None
}

fn read_crs<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder.get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY)).ok()?;
    // Header is 4 shorts, then entries of (key, location, count, value)
    keys.get(4..)?
        .chunks_exact(4)
        .filter(|e| e[1] == 0)
        .find(|e| e[0] == PROJECTED_CS_TYPE || e[0] == GEOGRAPHIC_TYPE)
        .map(|e| CRS::from_epsg(u32::from(e[3])))
}

/// Write a Raster to a single-band Float32 GeoTIFF file
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, BufWriter::new(file))
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer)?;
    let (rows, cols) = raster.shape();

    let nodata = raster.nodata();
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| {
            if v.is_nodata(nodata) {
                f32::NAN
            } else {
                num_traits::cast(v).unwrap_or(f32::NAN)
            }
        })
        .collect();

    let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image.encoder().write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image.encoder().write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])?;

    let geokeys = geokey_directory(raster.crs());
    image.encoder().write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), geokeys.as_slice())?;

    // Every no-data cell was written as NaN above
    image.encoder().write_tag(Tag::Unknown(GDAL_NODATA), "nan")?;

    image.write_data(&data)?;
    Ok(())
}

fn geokey_directory(crs: Option<&CRS>) -> Vec<u16> {
    let mut entries: Vec<[u16; 4]> = Vec::new();
    let geographic = crs.is_some_and(|c| c.is_geographic());
    entries.push([GT_MODEL_TYPE, 0, 1, if geographic { 2 } else { 1 }]);
    // RasterPixelIsArea
    entries.push([GT_RASTER_TYPE, 0, 1, 1]);
    if let Some(code) = crs.and_then(|c| c.epsg()).and_then(|e| u16::try_from(e).ok()) {
        let key = if geographic { GEOGRAPHIC_TYPE } else { PROJECTED_CS_TYPE };
        entries.push([key, 0, 1, code]);
    }

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_geotiff_keeps_georeferencing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dem.tif");

        let mut r = Raster::from_vec(vec![1.0, 2.0, -9999.0, 4.0], 2, 2).unwrap();
        r.set_transform(GeoTransform::new(330_000.0, 7_400_000.0, 10.0, -10.0));
        r.set_crs(Some(CRS::from_epsg(31983)));
        r.set_nodata(Some(-9999.0));
        write_geotiff(&r, &path).unwrap();

        let back: Raster<f64> = read_geotiff(&path).unwrap();
        assert_eq!(back.shape(), (2, 2));
        assert_eq!(back.transform(), r.transform());
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(31983));
        assert_eq!(back.get(0, 1).unwrap(), 2.0);
        assert!(back.get(1, 0).unwrap().is_nan());
    }

    #[test]
    fn test_geokeys_layout() {
        let keys = geokey_directory(Some(&CRS::from_epsg(31983)));
        assert_eq!(keys[3], 3);
        assert_eq!(&keys[12..16], &[PROJECTED_CS_TYPE, 0, 1, 31983]);
        let keys = geokey_directory(None);
        assert_eq!(keys[3], 2);
    }
}
