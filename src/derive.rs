use crate::capture::RawFrame;
use crate::quat;
use crate::skeleton::Skeleton;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedSample {
    /// rotation relative to the parent joint
    pub local_rotation: Quaternion,
    /// sensed world rotation, or the one implied by the reference pose
    pub world_rotation: Quaternion,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedFrame {
    pub timestamp_ms: Milliseconds,
    pub samples: Vec<DerivedSample>,
}

/// Convert every raw frame's world rotations into parent-relative ones.
///
/// Joints are walked in tree-index order, so a parent's world rotation is
/// always settled before its children need it. Joints without a sensed
/// rotation take their reference rotation, and their world rotation is
/// rebuilt from it so descendants stay consistent with the rest pose.
pub fn derive_local_rotations(skeleton: &Skeleton, frames: &[RawFrame]) -> Vec<DerivedFrame> {
    frames
        .iter()
        .map(|frame| derive_frame(skeleton, frame))
        .collect()
}

pub fn derive_frame(skeleton: &Skeleton, frame: &RawFrame) -> DerivedFrame {
    let mut samples: Vec<DerivedSample> = Vec::with_capacity(frame.samples.len());

    for (index, sample) in frame.samples.iter().enumerate() {
        let reference = skeleton.joint(index).reference_rotation;

        let derived = match (skeleton.parent_of(index), sample.world_rotation) {
            (Some(parent), Some(world)) => {
                debug_assert!(parent < index);
                let world = quat::normalize(world);
                let parent_world = samples[parent].world_rotation;
                // local * parent.world = world
                let local = quat::multiply(world, quat::inverse(parent_world));
                DerivedSample {
                    local_rotation: quat::normalize(local),
                    world_rotation: world,
                }
            }
            (Some(parent), None) => DerivedSample {
                local_rotation: reference,
                world_rotation: quat::multiply(reference, samples[parent].world_rotation),
            },
            (None, Some(world)) => {
                let world = quat::normalize(world);
                DerivedSample {
                    local_rotation: world,
                    world_rotation: world,
                }
            }
            (None, None) => DerivedSample {
                local_rotation: reference,
                world_rotation: reference,
            },
        };
        samples.push(derived);
    }

    DerivedFrame {
        timestamp_ms: frame.timestamp_ms,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::JointSample;
    use crate::skeleton::ReferenceJoint;
    use cgmath::{InnerSpace, Rad, Rotation3, Vector3};

    fn about(axis: Vector3<f64>, degrees: f64) -> Quaternion {
        Quaternion::from_axis_angle(axis, Rad(degrees.to_radians()))
    }

    fn same_rotation(a: Quaternion, b: Quaternion) -> bool {
        (a.dot(b).abs() - 1.0).abs() < 1e-9
    }

    /// Root -> Mid -> Tip, Mid rests rotated 30 degrees about Z.
    fn chain() -> Skeleton {
        let up = Position::new(0.0, 10.0, 0.0);
        Skeleton::from_reference_pose(vec![
            ReferenceJoint::new("Root", None, Position::new(0.0, 0.0, 0.0), quat::identity()),
            ReferenceJoint::new("Mid", Some("Root"), up, about(Vector3::unit_z(), 30.0)),
            ReferenceJoint::new("Tip", Some("Mid"), up, quat::identity()),
            ReferenceJoint::end_site("Tip_End", "Tip", up),
        ])
        .unwrap()
    }

    fn frame(rotations: [Option<Quaternion>; 3]) -> RawFrame {
        RawFrame {
            timestamp_ms: 0,
            samples: rotations
                .iter()
                .map(|&world_rotation| JointSample {
                    world_rotation,
                    world_position: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_local_is_world_relative_to_parent() {
        let root = about(Vector3::unit_y(), 40.0);
        let local = about(Vector3::unit_x(), 25.0);
        let mid_world = quat::multiply(local, root);
        let derived = derive_frame(&chain(), &frame([Some(root), Some(mid_world), None]));

        assert!(same_rotation(derived.samples[0].local_rotation, root));
        assert!(same_rotation(derived.samples[1].local_rotation, local));
    }

    #[test]
    fn test_untracked_joints_fall_back_to_reference() {
        let skeleton = chain();
        let derived = derive_frame(&skeleton, &frame([None, None, None]));

        assert!(same_rotation(derived.samples[0].local_rotation, quat::identity()));
        assert!(same_rotation(
            derived.samples[1].local_rotation,
            skeleton.joint(1).reference_rotation
        ));
        // world of the gap is rebuilt from the rest pose
        assert!(same_rotation(
            derived.samples[2].world_rotation,
            skeleton.joint(1).reference_rotation
        ));
    }

    #[test]
    fn test_descendant_of_gap_uses_repaired_world() {
        let skeleton = chain();
        let root = about(Vector3::unit_y(), 90.0);
        let tip_local = about(Vector3::unit_x(), 10.0);
        let mid_world = quat::multiply(skeleton.joint(1).reference_rotation, root);
        let tip_world = quat::multiply(tip_local, mid_world);
        let derived = derive_frame(&skeleton, &frame([Some(root), None, Some(tip_world)]));

        assert!(same_rotation(derived.samples[1].world_rotation, mid_world));
        assert!(same_rotation(derived.samples[2].local_rotation, tip_local));
    }

    #[test]
    fn test_unnormalized_input_is_normalized() {
        let root = Quaternion::new(2.0, 0.0, 0.0, 0.0);
        let derived = derive_frame(&chain(), &frame([Some(root), None, None]));
        assert!((derived.samples[0].local_rotation.magnitude() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_timestamps_carry_over() {
        let mut raw = frame([None, None, None]);
        raw.timestamp_ms = 1234;
        let derived = derive_local_rotations(&chain(), &[raw.clone(), raw]);
        assert_eq!(derived.len(), 2);
        assert!(derived.iter().all(|frame| frame.timestamp_ms == 1234));
    }
}
