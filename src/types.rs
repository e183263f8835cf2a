use cgmath::{Quaternion as CgQuaternion, Vector3};

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Position of a joint in the parent-before-child flattening of the skeleton.
pub type Index = usize;
/// Position of a joint in declaration order (end sites included).
pub type NodeId = usize;
/// Joint identifier used by the capture source (Kinect `JointType`).
pub type SensorJointId = usize;
pub type Depth = usize;
pub type Milliseconds = u64;
pub type Quaternion = CgQuaternion<f64>;
pub type Position = Vector3<f64>;

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Euler triple in radians, as written to the X/Y/Z rotation channels.
///
/// `x` carries the heading, `y` the attitude and `z` the bank of the
/// decomposition done by [`crate::quat::to_euler_zyx`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Euler {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Euler {
    pub fn new(x: f64, y: f64, z: f64) -> Euler {
        Euler { x, y, z }
    }

    pub fn zero() -> Euler {
        Euler::new(0.0, 0.0, 0.0)
    }

    pub fn to_degrees(&self) -> Euler {
        Euler::new(self.x.to_degrees(), self.y.to_degrees(), self.z.to_degrees())
    }
}
