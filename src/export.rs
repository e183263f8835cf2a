//! BVH text output: the HIERARCHY block from the skeleton and the MOTION
//! block from the resampled frames.

use crate::capture::Recorder;
use crate::derive::derive_local_rotations;
use crate::resample::{resample, ResampledFrame};
use crate::skeleton::Skeleton;
use crate::types::*;
use log::info;
use std::fmt::Write;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_FRAME_RATE: u32 = 30;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("frame rate must be at least 1 fps")]
    InvalidFrameRate,
    #[error("failed to format bvh output")]
    Format(#[from] std::fmt::Error),
    #[error("failed to write bvh file")]
    Io(#[from] std::io::Error),
}

/////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSettings {
    frame_rate: u32,
}

impl ExportSettings {
    pub fn new(frame_rate: u32) -> Result<Self, ExportError> {
        if frame_rate == 0 {
            return Err(ExportError::InvalidFrameRate);
        }
        Ok(ExportSettings { frame_rate })
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// seconds per output frame
    pub fn frame_time(&self) -> f64 {
        1.0 / self.frame_rate as f64
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings {
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////

fn indent(depth: Depth) -> String {
    "\t".repeat(depth)
}

fn write_offset(out: &mut String, depth: Depth, offset: Position) -> std::fmt::Result {
    writeln!(
        out,
        "{}OFFSET {:.6} {:.6} {:.6}",
        indent(depth),
        offset.x,
        offset.y,
        offset.z
    )
}

fn write_end_site(out: &mut String, depth: Depth, offset: Position) -> std::fmt::Result {
    writeln!(out, "{}End Site", indent(depth))?;
    writeln!(out, "{}{{", indent(depth))?;
    write_offset(out, depth + 1, offset)?;
    writeln!(out, "{}}}", indent(depth))
}

enum Visit {
    Enter(NodeId, Depth),
    Leave(Depth),
}

/// Pre-order walk of the joint tree. Joint order matches the tree indices,
/// so the motion columns line up with the declarations.
pub fn write_hierarchy(out: &mut String, skeleton: &Skeleton) -> std::fmt::Result {
    writeln!(out, "HIERARCHY")?;

    let mut stack = vec![Visit::Enter(skeleton.root().node, 0)];
    while let Some(visit) = stack.pop() {
        let (node, depth) = match visit {
            Visit::Enter(node, depth) => (node, depth),
            Visit::Leave(depth) => {
                writeln!(out, "{}}}", indent(depth))?;
                continue;
            }
        };

        let joint = skeleton.node(node);
        if joint.end_site {
            write_end_site(out, depth, joint.offset)?;
            continue;
        }

        let keyword = if joint.parent.is_none() { "ROOT" } else { "JOINT" };
        writeln!(out, "{}{} {}", indent(depth), keyword, joint.name)?;
        writeln!(out, "{}{{", indent(depth))?;
        write_offset(out, depth + 1, joint.offset)?;
        if joint.parent.is_none() {
            writeln!(
                out,
                "{}CHANNELS 6 Xposition Yposition Zposition Xrotation Yrotation Zrotation",
                indent(depth + 1)
            )?;
        } else {
            writeln!(out, "{}CHANNELS 3 Xrotation Yrotation Zrotation", indent(depth + 1))?;
        }
        // a channel-carrying joint still needs a terminator to be valid bvh
        if joint.children.is_empty() {
            write_end_site(out, depth + 1, Position::new(0.0, 0.0, 0.0))?;
        }

        stack.push(Visit::Leave(depth));
        for &child in joint.children.iter().rev() {
            stack.push(Visit::Enter(child, depth + 1));
        }
    }
    Ok(())
}

/// Root translation is not tracked and always written as zero.
pub fn write_motion(
    out: &mut String,
    frames: &[ResampledFrame],
    settings: &ExportSettings,
) -> std::fmt::Result {
    writeln!(out, "MOTION")?;
    writeln!(out, "Frames: {}", frames.len())?;
    writeln!(out, "Frame Time: {:.6}", settings.frame_time())?;

    for frame in frames {
        write!(out, "{:.6} {:.6} {:.6}", 0.0, 0.0, 0.0)?;
        for sample in frame.samples.iter() {
            let degrees = sample.euler.to_degrees();
            write!(out, " {:.6} {:.6} {:.6}", degrees.x, degrees.y, degrees.z)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn serialize(
    skeleton: &Skeleton,
    frames: &[ResampledFrame],
    settings: &ExportSettings,
) -> Result<String, ExportError> {
    let mut out = String::new();
    write_hierarchy(&mut out, skeleton)?;
    write_motion(&mut out, frames, settings)?;
    Ok(out)
}

/// Derive, resample and serialize everything the recorder holds.
pub fn export_bvh(
    skeleton: &Skeleton,
    recorder: &Recorder,
    settings: &ExportSettings,
) -> Result<String, ExportError> {
    let derived = derive_local_rotations(skeleton, recorder.frames());
    let frames = resample(skeleton, &derived, settings.frame_rate());
    info!(
        "resampled {} raw frames into {} frames at {} fps",
        recorder.len(),
        frames.len(),
        settings.frame_rate()
    );
    serialize(skeleton, &frames, settings)
}

/// The file is only touched once the whole text has been produced.
pub fn write_bvh_file<P: AsRef<Path>>(
    path: P,
    skeleton: &Skeleton,
    recorder: &Recorder,
    settings: &ExportSettings,
) -> Result<(), ExportError> {
    let contents = export_bvh(skeleton, recorder, settings)?;
    std::fs::write(path, contents)?;
    Ok(())
}
