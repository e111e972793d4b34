// raster.rs — Raster storage interface and an in-memory grid
//
// The runtime only ever touches pixels through `Raster` / `WritableRaster`:
// get or set one sample at an integer (x, y, band) location and report the
// pixel-grid extent. `GridRaster` is the in-memory implementation used by the
// CLI (as JSON) and by tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RasterError {
    #[error("pixel ({x}, {y}) is outside the raster")]
    OutOfBounds { x: i64, y: i64 },
    #[error("band {band} is out of range ({bands} band(s))")]
    BandOutOfRange { band: u32, bands: u32 },
    #[error("expected {expected} samples, found {found}")]
    DataLength { expected: usize, found: usize },
    #[error("a raster needs at least one band")]
    NoBands,
}

// ── Extent ─────────────────────────────────────────────────────────────────

/// A rectangular pixel grid: `width` × `height` pixels starting at
/// (`min_x`, `min_y`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: i64,
    pub min_y: i64,
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(min_x: i64, min_y: i64, width: u32, height: u32) -> Self {
        Extent {
            min_x,
            min_y,
            width,
            height,
        }
    }

    /// Extent with its origin at (0, 0).
    pub fn sized(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Inclusive upper x bound.
    pub fn max_x(&self) -> i64 {
        self.min_x + i64::from(self.width) - 1
    }

    /// Inclusive upper y bound.
    pub fn max_y(&self) -> i64 {
        self.min_y + i64::from(self.height) - 1
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.min_x && x <= self.max_x() && y >= self.min_y && y <= self.max_y()
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Pixel positions in row-major order: rows ascending, columns ascending
    /// within each row.
    pub fn positions(&self) -> impl Iterator<Item = (i64, i64)> {
        let extent = *self;
        (extent.min_y..=extent.max_y())
            .flat_map(move |y| (extent.min_x..=extent.max_x()).map(move |x| (x, y)))
    }
}

// ── Traits ─────────────────────────────────────────────────────────────────

/// Read access to a banded raster.
pub trait Raster: Send + Sync {
    fn extent(&self) -> Extent;

    fn bands(&self) -> u32;

    fn sample(&self, x: i64, y: i64, band: u32) -> Result<f64, RasterError>;
}

/// A raster that can also be written.
pub trait WritableRaster: Raster {
    fn set_sample(&mut self, x: i64, y: i64, band: u32, value: f64) -> Result<(), RasterError>;
}

// ── GridRaster ─────────────────────────────────────────────────────────────

/// Dense in-memory raster. Samples are stored pixel-interleaved in
/// row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridRasterData")]
pub struct GridRaster {
    extent: Extent,
    bands: u32,
    data: Vec<f64>,
}

/// Unvalidated serde form of [`GridRaster`].
#[derive(Deserialize)]
struct GridRasterData {
    extent: Extent,
    #[serde(default = "one_band")]
    bands: u32,
    /// `null` stands for NaN, which is how `serde_json` writes it.
    data: Vec<Option<f64>>,
}

fn one_band() -> u32 {
    1
}

impl TryFrom<GridRasterData> for GridRaster {
    type Error = RasterError;

    fn try_from(raw: GridRasterData) -> Result<Self, Self::Error> {
        let data = raw.data.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        GridRaster::from_data(raw.extent, raw.bands, data)
    }
}

impl GridRaster {
    /// A raster with every sample set to `value`.
    pub fn filled(extent: Extent, bands: u32, value: f64) -> Result<Self, RasterError> {
        if bands == 0 {
            return Err(RasterError::NoBands);
        }
        let len = extent.pixel_count() as usize * bands as usize;
        Ok(GridRaster {
            extent,
            bands,
            data: vec![value; len],
        })
    }

    pub fn new(extent: Extent, bands: u32) -> Result<Self, RasterError> {
        Self::filled(extent, bands, 0.0)
    }

    pub fn from_data(extent: Extent, bands: u32, data: Vec<f64>) -> Result<Self, RasterError> {
        if bands == 0 {
            return Err(RasterError::NoBands);
        }
        let expected = extent.pixel_count() as usize * bands as usize;
        if data.len() != expected {
            return Err(RasterError::DataLength {
                expected,
                found: data.len(),
            });
        }
        Ok(GridRaster {
            extent,
            bands,
            data,
        })
    }

    /// Single-band raster whose value at (x, y) is `f(x, y)`.
    pub fn from_fn(extent: Extent, f: impl Fn(i64, i64) -> f64) -> Self {
        let data = extent.positions().map(|(x, y)| f(x, y)).collect();
        GridRaster {
            extent,
            bands: 1,
            data,
        }
    }

    /// All samples, pixel-interleaved in row-major order.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    fn index(&self, x: i64, y: i64, band: u32) -> Result<usize, RasterError> {
        if !self.extent.contains(x, y) {
            return Err(RasterError::OutOfBounds { x, y });
        }
        if band >= self.bands {
            return Err(RasterError::BandOutOfRange {
                band,
                bands: self.bands,
            });
        }
        let col = (x - self.extent.min_x) as usize;
        let row = (y - self.extent.min_y) as usize;
        let pixel = row * self.extent.width as usize + col;
        Ok(pixel * self.bands as usize + band as usize)
    }
}

impl Raster for GridRaster {
    fn extent(&self) -> Extent {
        self.extent
    }

    fn bands(&self) -> u32 {
        self.bands
    }

    fn sample(&self, x: i64, y: i64, band: u32) -> Result<f64, RasterError> {
        self.index(x, y, band).map(|i| self.data[i])
    }
}

impl WritableRaster for GridRaster {
    fn set_sample(&mut self, x: i64, y: i64, band: u32, value: f64) -> Result<(), RasterError> {
        let i = self.index(x, y, band)?;
        self.data[i] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_bounds_are_inclusive() {
        let e = Extent::new(-1, 2, 3, 2);
        assert_eq!(e.max_x(), 1);
        assert_eq!(e.max_y(), 3);
        assert!(e.contains(-1, 2));
        assert!(e.contains(1, 3));
        assert!(!e.contains(2, 3));
        assert_eq!(e.pixel_count(), 6);
    }

    #[test]
    fn positions_are_row_major() {
        let order: Vec<(i64, i64)> = Extent::sized(2, 2).positions().collect();
        assert_eq!(order, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
        assert_eq!(Extent::sized(0, 3).positions().count(), 0);
    }

    #[test]
    fn sample_and_set() {
        let mut r = GridRaster::new(Extent::new(10, 10, 2, 2), 2).unwrap();
        r.set_sample(11, 10, 1, 4.5).unwrap();
        assert_eq!(r.sample(11, 10, 1), Ok(4.5));
        assert_eq!(r.sample(11, 10, 0), Ok(0.0));
        assert_eq!(
            r.sample(12, 10, 0),
            Err(RasterError::OutOfBounds { x: 12, y: 10 })
        );
        assert_eq!(
            r.sample(10, 10, 2),
            Err(RasterError::BandOutOfRange { band: 2, bands: 2 })
        );
    }

    #[test]
    fn from_data_checks_length() {
        let err = GridRaster::from_data(Extent::sized(2, 2), 1, vec![1.0]).unwrap_err();
        assert_eq!(
            err,
            RasterError::DataLength {
                expected: 4,
                found: 1
            }
        );
        assert_eq!(
            GridRaster::new(Extent::sized(1, 1), 0).unwrap_err(),
            RasterError::NoBands
        );
    }

    #[test]
    fn json_round_trip_validates() {
        let json = r#"{"extent":{"min_x":0,"min_y":0,"width":2,"height":1},"data":[1.0,2.0]}"#;
        let r: GridRaster = serde_json::from_str(json).unwrap();
        assert_eq!(r.bands(), 1);
        assert_eq!(r.sample(1, 0, 0), Ok(2.0));

        let bad = r#"{"extent":{"min_x":0,"min_y":0,"width":2,"height":2},"data":[1.0]}"#;
        assert!(serde_json::from_str::<GridRaster>(bad).is_err());
    }

    #[test]
    fn nan_samples_survive_json() {
        let r = GridRaster::from_data(Extent::sized(3, 1), 1, vec![1.0, f64::NAN, -2.5]).unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("null"), "{json}");

        let back: GridRaster = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sample(0, 0, 0), Ok(1.0));
        assert!(back.sample(1, 0, 0).unwrap().is_nan());
        assert_eq!(back.sample(2, 0, 0), Ok(-2.5));
    }
}
