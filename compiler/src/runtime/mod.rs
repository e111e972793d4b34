// runtime — Evaluating compiled scripts against bound rasters
//
// `Runtime` holds the state every evaluator shares: the compiled LIR, the
// image bindings with their transforms, the processing bounds and the
// image-scope variables. What a runtime can do is expressed as capability
// traits, implemented per evaluation strategy:
//
//   SourceBindable, DestBindable  both strategies
//   DirectlyEvaluable             `DirectRuntime` (random access per pixel)
//   SweepEvaluable                `SweepRuntime` (whole destination, row-major)
//
// A runtime is used from one thread at a time. Independent runtimes share
// nothing mutable and may run on separate threads.

mod interp;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

use crate::builtins::Builtin;
use crate::lir::LirScript;
use crate::progress::{ProgressListener, ProgressTracker};
use crate::raster::{Extent, Raster, RasterError, WritableRaster};
use crate::transform::{to_pixel, CoordinateTransform, IdentityTransform};

use interp::{Env, Machine};

// ── Errors ──────────────────────────────────────────────────────────────────

/// A fatal runtime failure. Evaluation stops at the first one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("unknown image '{0}'")]
    UnknownImage(String),
    #[error("image '{0}' is not bound")]
    UnboundImage(String),
    #[error("position ({x}, {y}) is outside image '{image}'")]
    OutOfBounds { image: String, x: f64, y: f64 },
    #[error("band {band} is out of range for image '{image}' ({bands} band(s))")]
    BandOutOfRange { image: String, band: f64, bands: u32 },
    #[error("processing bounds are not set")]
    BoundsNotSet,
    #[error("coordinate transform of image '{0}' is not invertible")]
    NonInvertibleTransform(String),
}

// ── Capabilities ────────────────────────────────────────────────────────────

/// Binding and reading source images.
pub trait SourceBindable<'img> {
    fn set_source_image(&mut self, name: &str, raster: &'img dyn Raster) -> Result<(), RuntimeError> {
        self.set_source_image_with_transform(name, raster, Box::new(IdentityTransform))
    }

    fn set_source_image_with_transform(
        &mut self,
        name: &str,
        raster: &'img dyn Raster,
        transform: Box<dyn CoordinateTransform>,
    ) -> Result<(), RuntimeError>;

    /// Sample a bound source at world position (`x`, `y`).
    fn read_from_image(&self, name: &str, x: f64, y: f64, band: u32) -> Result<f64, RuntimeError>;
}

/// Binding and writing destination images, and setting processing bounds.
pub trait DestBindable<'img> {
    fn set_destination_image(
        &mut self,
        name: &str,
        raster: &'img mut dyn WritableRaster,
    ) -> Result<(), RuntimeError> {
        self.set_destination_image_with_transform(name, raster, Box::new(IdentityTransform))
    }

    fn set_destination_image_with_transform(
        &mut self,
        name: &str,
        raster: &'img mut dyn WritableRaster,
        transform: Box<dyn CoordinateTransform>,
    ) -> Result<(), RuntimeError>;

    /// Write one sample of a bound destination at world position (`x`, `y`).
    fn write_to_image(&mut self, name: &str, x: f64, y: f64, band: u32, value: f64) -> Result<(), RuntimeError>;

    /// Processing bounds in world pixel coordinates.
    fn set_bounds(&mut self, bounds: Extent);

    /// Bounds covering the first bound destination image.
    fn set_default_bounds(&mut self) -> Result<(), RuntimeError>;
}

/// Random-access evaluation of one position.
pub trait DirectlyEvaluable {
    /// Run the script at world position (`x`, `y`) and return one value per
    /// destination, in declaration order. Unwritten destinations are NaN.
    fn evaluate(&mut self, x: f64, y: f64) -> Result<Vec<f64>, RuntimeError>;
}

/// Whole-image evaluation.
pub trait SweepEvaluable {
    /// Visit every pixel of the first destination once, rows then columns
    /// ascending, skipping pixels whose world position lies outside the
    /// bounds. The first destination is written at the visited pixel; the
    /// others through their own transforms.
    fn evaluate_all(&mut self, listener: &mut dyn ProgressListener) -> Result<(), RuntimeError>;
}

// ── Runtime ─────────────────────────────────────────────────────────────────

/// Strategy marker: random access per pixel.
#[derive(Debug)]
pub enum Direct {}

/// Strategy marker: whole-image sweep.
#[derive(Debug)]
pub enum Sweep {}

pub type DirectRuntime<'img> = Runtime<'img, Direct>;
pub type SweepRuntime<'img> = Runtime<'img, Sweep>;

struct SourceBinding<'img> {
    raster: &'img dyn Raster,
    transform: Box<dyn CoordinateTransform>,
}

struct DestBinding<'img> {
    raster: &'img mut dyn WritableRaster,
    transform: Box<dyn CoordinateTransform>,
}

pub struct Runtime<'img, S> {
    script: Arc<LirScript>,
    sources: Vec<Option<SourceBinding<'img>>>,
    destinations: Vec<Option<DestBinding<'img>>>,
    bounds: Option<Extent>,
    image_values: Vec<f64>,
    initialized: bool,
    _strategy: PhantomData<S>,
}

impl<S> fmt::Debug for Runtime<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("sources", &self.script.sources)
            .field("destinations", &self.script.destinations)
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

impl<'img, S> Runtime<'img, S> {
    pub(crate) fn new(script: Arc<LirScript>) -> Self {
        Runtime {
            sources: script.sources.iter().map(|_| None).collect(),
            destinations: script.destinations.iter().map(|_| None).collect(),
            bounds: None,
            image_values: vec![0.0; script.image_slots.len()],
            initialized: false,
            script,
            _strategy: PhantomData,
        }
    }

    pub fn bounds(&self) -> Option<Extent> {
        self.bounds
    }

    pub fn source_names(&self) -> &[String] {
        &self.script.sources
    }

    pub fn destination_names(&self) -> &[String] {
        &self.script.destinations
    }

    fn source_index(&self, name: &str) -> Result<usize, RuntimeError> {
        self.script
            .sources
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| RuntimeError::UnknownImage(name.to_string()))
    }

    fn dest_index(&self, name: &str) -> Result<usize, RuntimeError> {
        self.script
            .destinations
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| RuntimeError::UnknownImage(name.to_string()))
    }

    /// Run the `init` block; image-scope variables keep the results.
    fn run_init(&mut self) -> Result<(), RuntimeError> {
        let script = Arc::clone(&self.script);
        self.image_values = vec![0.0; script.image_slots.len()];
        let env = PixelEnv {
            script: &script,
            sources: &self.sources,
            bounds: self.bounds,
            x: 0.0,
            y: 0.0,
        };
        Machine::new(&script, &mut self.image_values).run(&script.init, &env)?;
        self.initialized = true;
        Ok(())
    }

    /// Run the per-pixel body at world position (`x`, `y`).
    fn run_pixel(&mut self, x: f64, y: f64) -> Result<Vec<Option<f64>>, RuntimeError> {
        let script = Arc::clone(&self.script);
        let env = PixelEnv {
            script: &script,
            sources: &self.sources,
            bounds: self.bounds,
            x,
            y,
        };
        Machine::new(&script, &mut self.image_values).run(&script.body, &env)
    }
}

// ── Pixel environment ───────────────────────────────────────────────────────

struct PixelEnv<'a, 'img> {
    script: &'a LirScript,
    sources: &'a [Option<SourceBinding<'img>>],
    bounds: Option<Extent>,
    x: f64,
    y: f64,
}

impl Env for PixelEnv<'_, '_> {
    fn read_source(&self, image: u32, band: f64, x: f64, y: f64) -> Result<f64, RuntimeError> {
        let name = self.script.source_name(image);
        let binding = self.sources[image as usize]
            .as_ref()
            .ok_or_else(|| RuntimeError::UnboundImage(name.to_string()))?;
        let raster = binding.raster;
        if band < 0.0 || band.fract() != 0.0 || band >= f64::from(raster.bands()) {
            return Err(RuntimeError::BandOutOfRange {
                image: name.to_string(),
                band,
                bands: raster.bands(),
            });
        }
        match sample_at(raster, binding.transform.as_ref(), x, y, band as u32) {
            Some(v) => Ok(v),
            None => self.script.outside.ok_or_else(|| RuntimeError::OutOfBounds {
                image: name.to_string(),
                x,
                y,
            }),
        }
    }

    fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    fn bounds_value(&self, func: Builtin) -> Result<f64, RuntimeError> {
        let b = self.bounds.ok_or(RuntimeError::BoundsNotSet)?;
        Ok(match func {
            Builtin::XMin => b.min_x as f64,
            Builtin::YMin => b.min_y as f64,
            Builtin::XMax => b.max_x() as f64,
            Builtin::YMax => b.max_y() as f64,
            Builtin::Width => f64::from(b.width),
            Builtin::Height => f64::from(b.height),
            Builtin::X => self.x,
            Builtin::Y => self.y,
            _ => f64::NAN,
        })
    }
}

/// Sample `raster` at world (`x`, `y`); `None` if the mapped pixel is outside.
fn sample_at(
    raster: &dyn Raster,
    transform: &dyn CoordinateTransform,
    x: f64,
    y: f64,
    band: u32,
) -> Option<f64> {
    let (ix, iy) = transform.world_to_image(x, y);
    let (px, py) = (to_pixel(ix)?, to_pixel(iy)?);
    raster.sample(px, py, band).ok()
}

fn raster_error(image: &str, x: f64, y: f64, err: RasterError) -> RuntimeError {
    match err {
        RasterError::BandOutOfRange { band, bands } => RuntimeError::BandOutOfRange {
            image: image.to_string(),
            band: f64::from(band),
            bands,
        },
        _ => RuntimeError::OutOfBounds {
            image: image.to_string(),
            x,
            y,
        },
    }
}

// ── Binding (both strategies) ───────────────────────────────────────────────

impl<'img, S> SourceBindable<'img> for Runtime<'img, S> {
    fn set_source_image_with_transform(
        &mut self,
        name: &str,
        raster: &'img dyn Raster,
        transform: Box<dyn CoordinateTransform>,
    ) -> Result<(), RuntimeError> {
        let i = self.source_index(name)?;
        tracing::debug!(image = name, extent = ?raster.extent(), identity = transform.is_identity(), "bound source image");
        self.sources[i] = Some(SourceBinding { raster, transform });
        Ok(())
    }

    fn read_from_image(&self, name: &str, x: f64, y: f64, band: u32) -> Result<f64, RuntimeError> {
        let i = self.source_index(name)?;
        let binding = self.sources[i]
            .as_ref()
            .ok_or_else(|| RuntimeError::UnboundImage(name.to_string()))?;
        let (ix, iy) = binding.transform.world_to_image(x, y);
        let out_of_bounds = || RuntimeError::OutOfBounds {
            image: name.to_string(),
            x,
            y,
        };
        let px = to_pixel(ix).ok_or_else(out_of_bounds)?;
        let py = to_pixel(iy).ok_or_else(out_of_bounds)?;
        binding
            .raster
            .sample(px, py, band)
            .map_err(|e| raster_error(name, x, y, e))
    }
}

impl<'img, S> DestBindable<'img> for Runtime<'img, S> {
    fn set_destination_image_with_transform(
        &mut self,
        name: &str,
        raster: &'img mut dyn WritableRaster,
        transform: Box<dyn CoordinateTransform>,
    ) -> Result<(), RuntimeError> {
        let i = self.dest_index(name)?;
        tracing::debug!(image = name, extent = ?raster.extent(), identity = transform.is_identity(), "bound destination image");
        self.destinations[i] = Some(DestBinding { raster, transform });
        Ok(())
    }

    fn write_to_image(&mut self, name: &str, x: f64, y: f64, band: u32, value: f64) -> Result<(), RuntimeError> {
        let i = self.dest_index(name)?;
        write_dest(&mut self.destinations[i], name, x, y, band, value)
    }

    fn set_bounds(&mut self, bounds: Extent) {
        self.bounds = Some(bounds);
    }

    fn set_default_bounds(&mut self) -> Result<(), RuntimeError> {
        let (i, binding) = self
            .destinations
            .iter()
            .enumerate()
            .find_map(|(i, d)| d.as_ref().map(|d| (i, d)))
            .ok_or(RuntimeError::BoundsNotSet)?;
        let name = &self.script.destinations[i];
        let extent = binding.raster.extent();
        let bounds = if binding.transform.is_identity() {
            extent
        } else {
            world_extent(extent, binding.transform.as_ref())
                .ok_or_else(|| RuntimeError::NonInvertibleTransform(name.clone()))?
        };
        tracing::debug!(image = %name, ?bounds, "default bounds");
        self.bounds = Some(bounds);
        Ok(())
    }
}

fn write_dest(
    slot: &mut Option<DestBinding<'_>>,
    name: &str,
    x: f64,
    y: f64,
    band: u32,
    value: f64,
) -> Result<(), RuntimeError> {
    let binding = slot
        .as_mut()
        .ok_or_else(|| RuntimeError::UnboundImage(name.to_string()))?;
    let (ix, iy) = binding.transform.world_to_image(x, y);
    let out_of_bounds = || RuntimeError::OutOfBounds {
        image: name.to_string(),
        x,
        y,
    };
    let px = to_pixel(ix).ok_or_else(out_of_bounds)?;
    let py = to_pixel(iy).ok_or_else(out_of_bounds)?;
    binding
        .raster
        .set_sample(px, py, band, value)
        .map_err(|e| raster_error(name, x, y, e))
}

/// Write band 0 of destination pixel (`px`, `py`) directly, without mapping.
fn write_pixel(
    slot: &mut Option<DestBinding<'_>>,
    name: &str,
    px: i64,
    py: i64,
    x: f64,
    y: f64,
    value: f64,
) -> Result<(), RuntimeError> {
    let binding = slot
        .as_mut()
        .ok_or_else(|| RuntimeError::UnboundImage(name.to_string()))?;
    binding
        .raster
        .set_sample(px, py, 0, value)
        .map_err(|e| raster_error(name, x, y, e))
}

/// World-space pixel grid covering an image's extent.
fn world_extent(extent: Extent, transform: &dyn CoordinateTransform) -> Option<Extent> {
    let (x0, y0) = transform.image_to_world(extent.min_x as f64, extent.min_y as f64)?;
    let (x1, y1) = transform.image_to_world(extent.max_x() as f64, extent.max_y() as f64)?;
    let min_x = to_pixel(x0.min(x1))?;
    let min_y = to_pixel(y0.min(y1))?;
    let max_x = to_pixel(x0.max(x1))?;
    let max_y = to_pixel(y0.max(y1))?;
    Some(Extent::new(
        min_x,
        min_y,
        u32::try_from(max_x - min_x + 1).ok()?,
        u32::try_from(max_y - min_y + 1).ok()?,
    ))
}

// ── Strategies ──────────────────────────────────────────────────────────────

impl DirectlyEvaluable for Runtime<'_, Direct> {
    fn evaluate(&mut self, x: f64, y: f64) -> Result<Vec<f64>, RuntimeError> {
        if !self.initialized {
            self.run_init()?;
        }
        let outputs = self.run_pixel(x, y)?;
        Ok(outputs.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

impl SweepEvaluable for Runtime<'_, Sweep> {
    fn evaluate_all(&mut self, listener: &mut dyn ProgressListener) -> Result<(), RuntimeError> {
        if let Some(i) = self.destinations.iter().position(Option::is_none) {
            return Err(RuntimeError::UnboundImage(self.script.destinations[i].clone()));
        }
        if self.bounds.is_none() {
            self.set_default_bounds()?;
        }
        let bounds = self.bounds.ok_or(RuntimeError::BoundsNotSet)?;

        // The first destination's own pixel grid drives the sweep.
        let script = Arc::clone(&self.script);
        let (grid, total) = {
            let reference = self
                .destinations
                .first()
                .and_then(Option::as_ref)
                .ok_or(RuntimeError::BoundsNotSet)?;
            let grid = reference.raster.extent();
            let transform = reference.transform.as_ref();
            if !grid.is_empty() && transform.image_to_world(grid.min_x as f64, grid.min_y as f64).is_none() {
                return Err(RuntimeError::NonInvertibleTransform(script.destinations[0].clone()));
            }
            let total = grid
                .positions()
                .filter(|&(px, py)| sweep_position(transform, bounds, px, py).is_some())
                .count() as u64;
            (grid, total)
        };

        let span = tracing::info_span!(
            "rasc.sweep",
            min_x = bounds.min_x,
            min_y = bounds.min_y,
            width = bounds.width,
            height = bounds.height,
            pixels = total
        );
        let _enter = span.enter();

        self.run_init()?;

        let mut tracker = ProgressTracker::start(listener, total);
        for (px, py) in grid.positions() {
            let position = self.destinations[0]
                .as_ref()
                .and_then(|d| sweep_position(d.transform.as_ref(), bounds, px, py));
            let Some((x, y)) = position else {
                continue;
            };
            let outputs = self.run_pixel(x, y)?;
            for (i, value) in outputs.into_iter().enumerate() {
                let name = &script.destinations[i];
                let value = value.unwrap_or(f64::NAN);
                if i == 0 {
                    write_pixel(&mut self.destinations[0], name, px, py, x, y, value)?;
                } else {
                    write_dest(&mut self.destinations[i], name, x, y, 0, value)?;
                }
            }
            tracker.step();
        }
        tracker.finish();

        tracing::debug!(pixels = total, "sweep complete");
        Ok(())
    }
}

/// World position of destination pixel (`px`, `py`), if it falls inside
/// `bounds`.
fn sweep_position(
    transform: &dyn CoordinateTransform,
    bounds: Extent,
    px: i64,
    py: i64,
) -> Option<(f64, f64)> {
    let (x, y) = transform.image_to_world(px as f64, py as f64)?;
    bounds
        .contains(to_pixel(x)?, to_pixel(y)?)
        .then_some((x, y))
}
