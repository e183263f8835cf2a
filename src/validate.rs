//! Consistency checks between the reference pose, bone lengths and the
//! sensed data. Purely diagnostic: nothing here changes the exported file.

use crate::capture::RawFrame;
use crate::quat;
use crate::skeleton::Skeleton;
use crate::types::*;
use cgmath::InnerSpace;
use log::{info, warn};

/// Largest distance tolerated between a position and its prediction.
pub const POSITION_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    /// `None` for rest-pose checks
    pub frame: Option<usize>,
    pub joint: Index,
    pub expected: Position,
    pub predicted: Position,
}

impl Mismatch {
    pub fn distance(&self) -> f64 {
        (self.expected - self.predicted).magnitude()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub rest_pose: Vec<Mismatch>,
    pub frames: Vec<Mismatch>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.rest_pose.is_empty() && self.frames.is_empty()
    }
}

fn bone_axis(rotation: Quaternion) -> Position {
    rotation * Position::unit_y()
}

/// Rest-pose forward kinematics: world positions from summed offsets,
/// world rotations from chained reference rotations. Each joint is then
/// predicted by walking its bone length along the parent's +Y axis.
pub fn check_rest_pose(skeleton: &Skeleton) -> Vec<Mismatch> {
    let mut positions: Vec<Position> = Vec::with_capacity(skeleton.len());
    let mut rotations: Vec<Quaternion> = Vec::with_capacity(skeleton.len());
    let mut mismatches = Vec::new();

    for (index, joint) in skeleton.joints().enumerate() {
        let (position, rotation) = match skeleton.parent_of(index) {
            Some(parent) => (
                positions[parent] + joint.offset,
                quat::multiply(joint.reference_rotation, rotations[parent]),
            ),
            None => (joint.offset, joint.reference_rotation),
        };
        positions.push(position);
        rotations.push(rotation);

        if let Some(parent) = skeleton.parent_of(index) {
            let predicted =
                positions[parent] + bone_axis(rotations[parent]) * joint.offset.magnitude();
            if (position - predicted).magnitude() > POSITION_TOLERANCE {
                mismatches.push(Mismatch {
                    frame: None,
                    joint: index,
                    expected: position,
                    predicted,
                });
            }
        }
    }
    mismatches
}

/// For every sensed joint whose parent position is also known, predict its
/// position from the parent position, its own world +Y axis and the sensed
/// bone length.
pub fn check_frames(skeleton: &Skeleton, frames: &[RawFrame]) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    for (frame_index, frame) in frames.iter().enumerate() {
        for (index, sample) in frame.samples.iter().enumerate() {
            let Some(parent) = skeleton.parent_of(index) else {
                continue;
            };
            let (Some(position), Some(rotation)) = (sample.world_position, sample.world_rotation)
            else {
                continue;
            };
            let Some(parent_position) = frame.samples[parent].world_position else {
                continue;
            };

            let length = (parent_position - position).magnitude();
            let predicted = parent_position + bone_axis(quat::normalize(rotation)) * length;
            if (position - predicted).magnitude() > POSITION_TOLERANCE {
                mismatches.push(Mismatch {
                    frame: Some(frame_index),
                    joint: index,
                    expected: position,
                    predicted,
                });
            }
        }
    }
    mismatches
}

pub fn validate(skeleton: &Skeleton, frames: &[RawFrame]) -> ValidationReport {
    let report = ValidationReport {
        rest_pose: check_rest_pose(skeleton),
        frames: check_frames(skeleton, frames),
    };

    for mismatch in report.rest_pose.iter().chain(report.frames.iter()) {
        warn!(
            "joint `{}` (frame {:?}) is {:.4} away from its predicted position",
            skeleton.joint(mismatch.joint).name,
            mismatch.frame,
            mismatch.distance()
        );
    }
    if !report.is_clean() {
        info!(
            "validation found {} rest pose and {} captured mismatches",
            report.rest_pose.len(),
            report.frames.len()
        );
    }
    report
}
