// Direct and sweep evaluation against bound rasters.

use rasc::pipeline::{compile, CompileOptions, CompiledScript};
use rasc::progress::{NullProgressListener, ProgressListener};
use rasc::raster::{Extent, GridRaster, Raster, WritableRaster};
use rasc::runtime::{
    DestBindable, DirectlyEvaluable, RuntimeError, SourceBindable, SweepEvaluable,
};
use rasc::transform::AffineTransform;

fn compile_ok(source: &str, opts: CompileOptions) -> CompiledScript {
    let outcome = compile(source, &opts);
    match outcome.script {
        Some(script) => script,
        None => panic!("compile failed:\n{}", outcome.diagnostics.render()),
    }
}

fn src_dest() -> CompileOptions {
    CompileOptions::new().source("src").destination("dest")
}

fn ramp(extent: Extent) -> GridRaster {
    GridRaster::from_fn(extent, |x, y| (y * 100 + x) as f64)
}

#[derive(Default)]
struct Recorder {
    size: Option<u64>,
    events: Vec<&'static str>,
    updates: Vec<f64>,
}

impl ProgressListener for Recorder {
    fn set_task_size(&mut self, size: u64) {
        self.size = Some(size);
    }
    fn start(&mut self) {
        self.events.push("start");
    }
    fn update(&mut self, fraction: f64) {
        self.updates.push(fraction);
    }
    fn finish(&mut self) {
        self.events.push("finish");
    }
}

// ── Sweep ──

#[test]
fn sweep_visits_every_pixel_in_row_major_order() {
    let script = compile_ok(
        "init { n = 0; } n += 1; dest = n + 0 * src;",
        src_dest(),
    );
    let extent = Extent::new(-2, 5, 4, 3);
    let src = ramp(extent);
    let mut dest = GridRaster::filled(extent, 1, f64::NAN).unwrap();
    {
        let mut rt = script.sweep_runtime();
        rt.set_source_image("src", &src).unwrap();
        rt.set_destination_image("dest", &mut dest).unwrap();
        rt.evaluate_all(&mut NullProgressListener).unwrap();
    }
    let expected: Vec<f64> = (1..=12).map(f64::from).collect();
    assert_eq!(dest.data(), expected.as_slice());
}

#[test]
fn sweep_positions_are_world_coordinates() {
    let script = compile_ok("dest = x() * 10 + y() + 0 * src;", src_dest());
    let extent = Extent::new(3, 7, 2, 2);
    let src = ramp(extent);
    let mut dest = GridRaster::new(extent, 1).unwrap();
    {
        let mut rt = script.sweep_runtime();
        rt.set_source_image("src", &src).unwrap();
        rt.set_destination_image("dest", &mut dest).unwrap();
        rt.evaluate_all(&mut NullProgressListener).unwrap();
    }
    assert_eq!(dest.data(), &[37.0, 47.0, 38.0, 48.0]);
}

#[test]
fn progress_ends_at_completion() {
    let script = compile_ok("dest = src;", src_dest());
    let extent = Extent::sized(25, 8);
    let src = ramp(extent);
    let mut dest = GridRaster::new(extent, 1).unwrap();
    let mut recorder = Recorder::default();
    {
        let mut rt = script.sweep_runtime();
        rt.set_source_image("src", &src).unwrap();
        rt.set_destination_image("dest", &mut dest).unwrap();
        rt.evaluate_all(&mut recorder).unwrap();
    }
    assert_eq!(recorder.size, Some(200));
    assert_eq!(recorder.events, vec!["start", "finish"]);
    assert_eq!(recorder.updates.last(), Some(&1.0));
    assert_eq!(recorder.updates.iter().filter(|&&u| u == 1.0).count(), 1);
    assert!(recorder.updates.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(dest.data(), src.data());
}

#[test]
fn explicit_bounds_limit_the_sweep() {
    let script = compile_ok("dest = src + xmax();", src_dest());
    let extent = Extent::sized(4, 4);
    let src = ramp(extent);
    let mut dest = GridRaster::filled(extent, 1, -1.0).unwrap();
    {
        let mut rt = script.sweep_runtime();
        rt.set_source_image("src", &src).unwrap();
        rt.set_destination_image("dest", &mut dest).unwrap();
        rt.set_bounds(Extent::new(1, 1, 2, 1));
        rt.evaluate_all(&mut NullProgressListener).unwrap();
    }
    assert_eq!(dest.sample(0, 1, 0), Ok(-1.0));
    assert_eq!(dest.sample(1, 1, 0), Ok(103.0));
    assert_eq!(dest.sample(2, 1, 0), Ok(104.0));
    assert_eq!(dest.sample(3, 1, 0), Ok(-1.0));
}

#[test]
fn scaled_destination_pixels_are_each_visited_once() {
    let script = compile_ok(
        "init { n = 0; } n += 1; dest = n * 100 + x();",
        CompileOptions::new().destination("dest"),
    );
    let cases = [
        (2.0, [100.0, 200.5, 301.0, 401.5]),
        (0.5, [100.0, 202.0, 304.0, 406.0]),
    ];
    for (scale, expected) in cases {
        let mut dest = GridRaster::filled(Extent::sized(4, 1), 1, -1.0).unwrap();
        let mut recorder = Recorder::default();
        {
            let mut rt = script.sweep_runtime();
            rt.set_destination_image_with_transform(
                "dest",
                &mut dest,
                Box::new(AffineTransform::scale(scale, 1.0)),
            )
            .unwrap();
            rt.evaluate_all(&mut recorder).unwrap();
        }
        assert_eq!(dest.data(), &expected, "scale {scale}");
        assert_eq!(recorder.size, Some(4), "scale {scale}");
        assert_eq!(recorder.updates.last(), Some(&1.0));
    }
}

#[test]
fn scaled_destination_sweeps_rows_then_columns() {
    let script = compile_ok(
        "dest = x() * 10 + y();",
        CompileOptions::new().destination("dest"),
    );
    let mut dest = GridRaster::new(Extent::sized(2, 2), 1).unwrap();
    {
        let mut rt = script.sweep_runtime();
        rt.set_destination_image_with_transform(
            "dest",
            &mut dest,
            Box::new(AffineTransform::scale(2.0, 2.0)),
        )
        .unwrap();
        rt.evaluate_all(&mut NullProgressListener).unwrap();
    }
    assert_eq!(dest.data(), &[0.0, 5.0, 0.5, 5.5]);
}

#[test]
fn several_destinations_in_declaration_order() {
    let opts = CompileOptions::new()
        .source("src")
        .destination("lo")
        .destination("hi");
    let script = compile_ok("hi = src + 1; lo = src - 1;", opts);
    assert_eq!(script.destination_names(), ["lo", "hi"]);

    let src = ramp(Extent::sized(2, 1));
    let mut rt = script.direct_runtime();
    rt.set_source_image("src", &src).unwrap();
    assert_eq!(rt.evaluate(1.0, 0.0), Ok(vec![0.0, 2.0]));
}

#[test]
fn unwritten_destination_pixels_are_nan() {
    let script = compile_ok("if (src > 0) dest = src;", src_dest());
    let extent = Extent::sized(2, 1);
    let src = ramp(extent);
    let mut dest = GridRaster::new(extent, 1).unwrap();
    {
        let mut rt = script.sweep_runtime();
        rt.set_source_image("src", &src).unwrap();
        rt.set_destination_image("dest", &mut dest).unwrap();
        rt.evaluate_all(&mut NullProgressListener).unwrap();
    }
    assert!(dest.data()[0].is_nan());
    assert_eq!(dest.data()[1], 1.0);
}

#[test]
fn images_block_declares_roles() {
    let source = "images { a = read; b = read; out = write; }\nout = a - b;";
    let script = compile_ok(source, CompileOptions::new());
    let extent = Extent::sized(2, 2);
    let a = GridRaster::filled(extent, 1, 10.0).unwrap();
    let b = ramp(extent);
    let mut out = GridRaster::new(extent, 1).unwrap();
    {
        let mut rt = script.sweep_runtime();
        rt.set_source_image("a", &a).unwrap();
        rt.set_source_image("b", &b).unwrap();
        rt.set_destination_image("out", &mut out).unwrap();
        rt.evaluate_all(&mut NullProgressListener).unwrap();
    }
    assert_eq!(out.data(), &[10.0, 9.0, -90.0, -91.0]);
}

// ── Failures ──

#[test]
fn unbound_source_is_fatal() {
    let script = compile_ok("dest = src;", src_dest());
    let mut dest = GridRaster::new(Extent::sized(1, 1), 1).unwrap();
    let mut rt = script.sweep_runtime();
    rt.set_destination_image("dest", &mut dest).unwrap();
    assert_eq!(
        rt.evaluate_all(&mut NullProgressListener),
        Err(RuntimeError::UnboundImage("src".into()))
    );
}

#[test]
fn binding_unknown_name_is_rejected() {
    let script = compile_ok("dest = src;", src_dest());
    let mut other = GridRaster::new(Extent::sized(1, 1), 1).unwrap();
    let mut rt = script.sweep_runtime();
    let err = rt.set_destination_image("other", &mut other).unwrap_err();
    assert_eq!(err, RuntimeError::UnknownImage("other".into()));
    assert_eq!(err.to_string(), "unknown image 'other'");
}

#[test]
fn reading_past_the_edge_is_fatal() {
    let script = compile_ok("dest = src[$1, $0];", src_dest());
    let extent = Extent::sized(3, 1);
    let src = ramp(extent);
    let mut dest = GridRaster::new(extent, 1).unwrap();
    let mut rt = script.sweep_runtime();
    rt.set_source_image("src", &src).unwrap();
    rt.set_destination_image("dest", &mut dest).unwrap();
    let err = rt.evaluate_all(&mut NullProgressListener).unwrap_err();
    assert_eq!(
        err,
        RuntimeError::OutOfBounds {
            image: "src".into(),
            x: 3.0,
            y: 0.0
        }
    );
}

#[test]
fn outside_option_fills_the_edge() {
    let script = compile_ok(
        "options { outside = 0; } dest = src[$1, $0] - src;",
        src_dest(),
    );
    let extent = Extent::sized(3, 1);
    let src = ramp(extent);
    let mut dest = GridRaster::new(extent, 1).unwrap();
    {
        let mut rt = script.sweep_runtime();
        rt.set_source_image("src", &src).unwrap();
        rt.set_destination_image("dest", &mut dest).unwrap();
        rt.evaluate_all(&mut NullProgressListener).unwrap();
    }
    assert_eq!(dest.data(), &[1.0, 1.0, -2.0]);
}

// ── Transforms ──

#[test]
fn source_at_half_resolution() {
    let script = compile_ok("dest = src;", src_dest());
    let src = ramp(Extent::sized(2, 2));
    let mut dest = GridRaster::new(Extent::sized(4, 4), 1).unwrap();
    {
        let mut rt = script.sweep_runtime();
        // world 0..3 -> image 0..1 (x * 0.5 - 0.25 keeps 0,1 -> 0 and 2,3 -> 1)
        rt.set_source_image_with_transform(
            "src",
            &src,
            Box::new(AffineTransform::new(0.5, 0.5, -0.25, -0.25)),
        )
        .unwrap();
        rt.set_destination_image("dest", &mut dest).unwrap();
        rt.evaluate_all(&mut NullProgressListener).unwrap();
    }
    assert_eq!(
        dest.data(),
        &[
            0.0, 0.0, 1.0, 1.0, //
            0.0, 0.0, 1.0, 1.0, //
            100.0, 100.0, 101.0, 101.0, //
            100.0, 100.0, 101.0, 101.0,
        ]
    );
}

#[test]
fn non_invertible_destination_transform() {
    let script = compile_ok("dest = src;", src_dest());
    let mut dest = GridRaster::new(Extent::sized(2, 2), 1).unwrap();
    let mut rt = script.sweep_runtime();
    rt.set_destination_image_with_transform(
        "dest",
        &mut dest,
        Box::new(AffineTransform::scale(0.0, 1.0)),
    )
    .unwrap();
    assert_eq!(
        rt.set_default_bounds(),
        Err(RuntimeError::NonInvertibleTransform("dest".into()))
    );
}

#[test]
fn read_and_write_through_the_runtime() {
    let script = compile_ok("dest = src;", src_dest());
    let src = ramp(Extent::sized(3, 3));
    let mut dest = GridRaster::new(Extent::sized(3, 3), 1).unwrap();
    {
        let mut rt = script.direct_runtime();
        rt.set_source_image("src", &src).unwrap();
        rt.set_destination_image_with_transform(
            "dest",
            &mut dest,
            Box::new(AffineTransform::translate(1.0, 0.0)),
        )
        .unwrap();
        assert_eq!(rt.read_from_image("src", 2.0, 1.0, 0), Ok(102.0));
        assert!(matches!(
            rt.read_from_image("src", 0.0, 0.0, 1),
            Err(RuntimeError::BandOutOfRange { bands: 1, .. })
        ));
        rt.write_to_image("dest", 0.0, 2.0, 0, 42.0).unwrap();
        assert!(matches!(
            rt.write_to_image("dest", 2.0, 0.0, 0, 1.0),
            Err(RuntimeError::OutOfBounds { .. })
        ));
    }
    assert_eq!(dest.sample(1, 2, 0), Ok(42.0));
}

// ── Threads ──

#[test]
fn independent_runtimes_on_separate_threads() {
    let script = compile_ok("dest = src * 2 + x();", src_dest());
    let extent = Extent::sized(16, 16);
    let results: Vec<Vec<f64>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4u8)
            .map(|i| {
                let script = script.clone();
                s.spawn(move || {
                    let src = GridRaster::filled(extent, 1, f64::from(i)).unwrap();
                    let mut dest = GridRaster::new(extent, 1).unwrap();
                    {
                        let mut rt = script.sweep_runtime();
                        rt.set_source_image("src", &src).unwrap();
                        rt.set_destination_image("dest", &mut dest).unwrap();
                        rt.evaluate_all(&mut NullProgressListener).unwrap();
                    }
                    dest.data().to_vec()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for (i, data) in results.iter().enumerate() {
        for (p, (x, _)) in extent.positions().enumerate() {
            assert_eq!(data[p], i as f64 * 2.0 + x as f64);
        }
    }
}

#[test]
fn custom_writable_raster() {
    /// Records write order.
    struct Log(Vec<(i64, i64)>);

    impl Raster for Log {
        fn extent(&self) -> Extent {
            Extent::sized(3, 2)
        }
        fn bands(&self) -> u32 {
            1
        }
        fn sample(&self, _x: i64, _y: i64, _band: u32) -> Result<f64, rasc::raster::RasterError> {
            Ok(0.0)
        }
    }

    impl WritableRaster for Log {
        fn set_sample(
            &mut self,
            x: i64,
            y: i64,
            _band: u32,
            _value: f64,
        ) -> Result<(), rasc::raster::RasterError> {
            self.0.push((x, y));
            Ok(())
        }
    }

    let script = compile_ok("dest = 1;", CompileOptions::new().destination("dest"));
    let mut log = Log(Vec::new());
    {
        let mut rt = script.sweep_runtime();
        rt.set_destination_image("dest", &mut log).unwrap();
        rt.evaluate_all(&mut NullProgressListener).unwrap();
    }
    assert_eq!(log.0, vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]);
}
