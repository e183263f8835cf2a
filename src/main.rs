use anyhow::Context;
use clap::Parser;
use kinect_bvh::export::DEFAULT_FRAME_RATE;
use kinect_bvh::parse::{load_capture_from_file, load_reference_pose_from_file};
use kinect_bvh::{kinect, validate, write_bvh_file, ExportSettings, Recorder, Skeleton};
use log::{info, warn};
use std::path::PathBuf;

/// Convert a Kinect capture dump into a .bvh file.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Reference pose (.bvh with ROT lines). Without one the Kinect v2
    /// hierarchy is used, with bone lengths taken from the first capture
    /// record.
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Capture dump of timestamped joint samples.
    #[arg(long)]
    capture: PathBuf,

    /// Where to write the .bvh file.
    #[arg(long, default_value = "out.bvh")]
    output: PathBuf,

    /// Output frame rate.
    #[arg(long, default_value_t = DEFAULT_FRAME_RATE)]
    fps: u32,

    /// Check the capture against the reference pose before exporting.
    #[arg(long)]
    validate: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let settings = ExportSettings::new(args.fps)?;

    let records = load_capture_from_file(&args.capture)
        .with_context(|| format!("loading capture {:?}", args.capture))?;

    let pose = match &args.reference {
        Some(path) => load_reference_pose_from_file(path)
            .with_context(|| format!("loading reference pose {:?}", path))?,
        None => {
            info!("no reference pose given, using the Kinect v2 hierarchy");
            let lengths = records.first().map(kinect::bone_lengths).unwrap_or_default();
            kinect::default_pose(&kinect::bone_offsets(&lengths))
        }
    };
    let skeleton = Skeleton::from_reference_pose(pose).context("building skeleton")?;
    info!(
        "skeleton has {} joints, {} bound to sensor ids",
        skeleton.len(),
        skeleton.sensor_index().len()
    );

    let mut recorder = Recorder::new(&skeleton);
    let mut dropped = 0;
    for record in records.iter() {
        match recorder.record(record) {
            Ok(count) => dropped += count,
            Err(err) => warn!("skipping record at {} ms: {}", record.timestamp_ms, err),
        }
    }
    info!("recorded {} frames, dropped {} samples", recorder.len(), dropped);

    if args.validate {
        let report = validate::validate(&skeleton, recorder.frames());
        if report.is_clean() {
            info!("validation passed");
        }
    }

    write_bvh_file(&args.output, &skeleton, &recorder, &settings)
        .with_context(|| format!("writing {:?}", args.output))?;
    info!("wrote {:?}", args.output);
    Ok(())
}
