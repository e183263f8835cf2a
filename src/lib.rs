//! Turns Kinect skeletal captures into .bvh motion files.
//!
//! The pipeline is a batch job: build a [`Skeleton`] from a reference pose,
//! record raw frames with a [`Recorder`], then [`export_bvh`] derives local
//! rotations, resamples them to a fixed frame rate and writes the bvh text.

pub mod capture;
pub mod derive;
pub mod export;
pub mod kinect;
pub mod parse;
pub mod quat;
pub mod resample;
pub mod skeleton;
pub mod types;
pub mod validate;

pub use capture::{CaptureError, CaptureRecord, Recorder, StateError};
pub use export::{export_bvh, write_bvh_file, ExportError, ExportSettings};
pub use skeleton::{ReferenceJoint, Skeleton, SkeletonError, UnknownJointError};
