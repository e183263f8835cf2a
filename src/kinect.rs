//! Kinect v2 joint ids (`JointType`), used to bind reference-pose joints to
//! the ids found in capture dumps, and the sensor's own joint hierarchy for
//! captures that come without a reference pose.

use crate::capture::CaptureRecord;
use crate::quat;
use crate::skeleton::ReferenceJoint;
use crate::types::{Position, SensorJointId};
use cgmath::InnerSpace;

pub const JOINT_COUNT: usize = 25;

/// Indexed by `JointType`.
pub const JOINT_NAMES: [&str; JOINT_COUNT] = [
    "SpineBase",
    "SpineMid",
    "Neck",
    "Head",
    "ShoulderLeft",
    "ElbowLeft",
    "WristLeft",
    "HandLeft",
    "ShoulderRight",
    "ElbowRight",
    "WristRight",
    "HandRight",
    "HipLeft",
    "KneeLeft",
    "AnkleLeft",
    "FootLeft",
    "HipRight",
    "KneeRight",
    "AnkleRight",
    "FootRight",
    "SpineShoulder",
    "HandTipLeft",
    "ThumbLeft",
    "HandTipRight",
    "ThumbRight",
];

/// Parent of each joint, indexed by `JointType`. `SpineBase` is the root.
pub const JOINT_PARENTS: [Option<SensorJointId>; JOINT_COUNT] = [
    None,     // SpineBase
    Some(0),  // SpineMid
    Some(20), // Neck
    Some(2),  // Head
    Some(20), // ShoulderLeft
    Some(4),  // ElbowLeft
    Some(5),  // WristLeft
    Some(6),  // HandLeft
    Some(20), // ShoulderRight
    Some(8),  // ElbowRight
    Some(9),  // WristRight
    Some(10), // HandRight
    Some(0),  // HipLeft
    Some(12), // KneeLeft
    Some(13), // AnkleLeft
    Some(14), // FootLeft
    Some(0),  // HipRight
    Some(16), // KneeRight
    Some(17), // AnkleRight
    Some(18), // FootRight
    Some(1),  // SpineShoulder
    Some(7),  // HandTipLeft
    Some(7),  // ThumbLeft
    Some(11), // HandTipRight
    Some(11), // ThumbRight
];

/// Axis a bone points along in the sensor's rest pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoneDirection {
    X,
    Y,
    Z,
    NegX,
    NegY,
    NegZ,
}

impl BoneDirection {
    pub fn axis(&self) -> Position {
        match self {
            BoneDirection::X => Position::unit_x(),
            BoneDirection::Y => Position::unit_y(),
            BoneDirection::Z => Position::unit_z(),
            BoneDirection::NegX => -Position::unit_x(),
            BoneDirection::NegY => -Position::unit_y(),
            BoneDirection::NegZ => -Position::unit_z(),
        }
    }
}

/// Indexed by `JointType`. Arms and hips point sideways, everything else up.
pub const BONE_DIRECTIONS: [BoneDirection; JOINT_COUNT] = {
    use BoneDirection::*;
    [
        Y, Y, Y, Y, // spine, neck, head
        X, X, Y, Y, // left arm
        NegX, NegX, Y, Y, // right arm
        X, X, Y, Y, // left leg
        NegX, NegX, Y, Y, // right leg
        Y, Y, Y, Y, Y, // spine shoulder, hand tips and thumbs
    ]
};

pub fn joint_id(name: &str) -> Option<SensorJointId> {
    JOINT_NAMES.iter().position(|&joint| joint == name)
}

pub fn joint_name(id: SensorJointId) -> Option<&'static str> {
    JOINT_NAMES.get(id).copied()
}

/// Offsets laying each bone of the given length along its rest direction.
pub fn bone_offsets(lengths: &[f64; JOINT_COUNT]) -> [Position; JOINT_COUNT] {
    let mut offsets = [Position::new(0.0, 0.0, 0.0); JOINT_COUNT];
    for (id, offset) in offsets.iter_mut().enumerate() {
        if JOINT_PARENTS[id].is_some() {
            *offset = BONE_DIRECTIONS[id].axis() * lengths[id];
        }
    }
    offsets
}

/// Bone lengths measured from one record's joint positions. Bones whose
/// end points are not both present get length zero.
pub fn bone_lengths(record: &CaptureRecord) -> [f64; JOINT_COUNT] {
    let mut positions: [Option<Position>; JOINT_COUNT] = [None; JOINT_COUNT];
    for &(id, position) in record.positions.iter() {
        if let Some(slot) = positions.get_mut(id) {
            *slot = Some(position);
        }
    }

    let mut lengths = [0.0; JOINT_COUNT];
    for (id, length) in lengths.iter_mut().enumerate() {
        let Some(parent) = JOINT_PARENTS[id] else {
            continue;
        };
        if let (Some(joint), Some(parent)) = (positions[id], positions[parent]) {
            *length = (joint - parent).magnitude();
        }
    }
    lengths
}

/// The sensor's own 25 joint hierarchy as a reference pose: identity
/// reference rotations, every joint bound to its `JointType`.
pub fn default_pose(offsets: &[Position; JOINT_COUNT]) -> Vec<ReferenceJoint> {
    JOINT_NAMES
        .iter()
        .enumerate()
        .map(|(id, name)| {
            let parent = JOINT_PARENTS[id].map(|parent| JOINT_NAMES[parent]);
            ReferenceJoint::new(name, parent, offsets[id], quat::identity()).with_sensor(id)
        })
        .collect()
}
