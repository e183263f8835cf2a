use crate::quat;
use crate::types::*;
use log::debug;
use std::collections::HashMap;
use thiserror::Error;

/// Reference pose is malformed. Nothing is built when this is returned.
#[derive(Debug, Error, PartialEq)]
pub enum SkeletonError {
    #[error("reference pose contains no joints")]
    EmptyPose,
    #[error("reference pose has more than one root: `{first}` and `{second}`")]
    MultipleRoots { first: String, second: String },
    #[error("reference pose has no root joint")]
    NoRoot,
    #[error("joint `{joint}` references unknown parent `{parent}`")]
    MissingParent { joint: String, parent: String },
    #[error("joint name `{0}` is declared twice")]
    DuplicateJoint(String),
    #[error("sensor joint {0} is bound to more than one joint")]
    DuplicateSensor(SensorJointId),
    #[error("end site `{0}` cannot have children")]
    EndSiteWithChildren(String),
    #[error("root `{0}` cannot be an end site")]
    EndSiteRoot(String),
    #[error("joint `{0}` is not connected to the root")]
    Unreachable(String),
}

#[derive(Debug, Error, PartialEq)]
#[error("sensor joint {0} is not bound to any joint of the reference pose")]
pub struct UnknownJointError(pub SensorJointId);

/////////////////////////////////////////////////////////////////////////////////////////////////

/// One joint of the reference pose, as produced by a pose source.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceJoint {
    pub name: String,
    /// `None` for the root.
    pub parent: Option<String>,
    pub offset: Position,
    pub rotation: Quaternion,
    pub sensor: Option<SensorJointId>,
    /// Geometry-only terminal joint ("End Site"). Carries no channels.
    pub end_site: bool,
}

impl ReferenceJoint {
    pub fn new(name: &str, parent: Option<&str>, offset: Position, rotation: Quaternion) -> Self {
        ReferenceJoint {
            name: name.to_string(),
            parent: parent.map(str::to_string),
            offset,
            rotation,
            sensor: None,
            end_site: false,
        }
    }

    pub fn end_site(name: &str, parent: &str, offset: Position) -> Self {
        ReferenceJoint {
            end_site: true,
            ..ReferenceJoint::new(name, Some(parent), offset, quat::identity())
        }
    }

    pub fn with_sensor(mut self, sensor: SensorJointId) -> Self {
        self.sensor = Some(sensor);
        self
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub node: NodeId,
    /// Tree index. `None` for end sites, which carry no motion data.
    pub index: Option<Index>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub depth: Depth,
    pub offset: Position,
    pub reference_rotation: Quaternion,
    pub inverse_reference_rotation: Quaternion,
    pub sensor: Option<SensorJointId>,
    pub end_site: bool,
}

/// Sensor joint id -> tree index.
#[derive(Debug, Clone, Default)]
pub struct SkeletonIndex {
    table: HashMap<SensorJointId, Index>,
}

impl SkeletonIndex {
    pub fn index_of(&self, sensor: SensorJointId) -> Result<Index, UnknownJointError> {
        self.table
            .get(&sensor)
            .copied()
            .ok_or(UnknownJointError(sensor))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Joint tree stored as an arena in declaration order, plus the
/// parent-before-child flattening used by every per-frame pass.
#[derive(Debug, Clone)]
pub struct Skeleton {
    nodes: Vec<Joint>,
    root: NodeId,
    /// tree index -> node
    order: Vec<NodeId>,
    /// tree index -> parent tree index
    parents: Vec<Option<Index>>,
    index: SkeletonIndex,
}

impl Skeleton {
    pub fn from_reference_pose(joints: Vec<ReferenceJoint>) -> Result<Skeleton, SkeletonError> {
        if joints.is_empty() {
            return Err(SkeletonError::EmptyPose);
        }

        let mut by_name: HashMap<String, NodeId> = HashMap::with_capacity(joints.len());
        for (node, joint) in joints.iter().enumerate() {
            if by_name.insert(joint.name.clone(), node).is_some() {
                return Err(SkeletonError::DuplicateJoint(joint.name.clone()));
            }
        }

        let parent_names: Vec<Option<String>> =
            joints.iter().map(|joint| joint.parent.clone()).collect();

        let mut nodes: Vec<Joint> = joints
            .into_iter()
            .enumerate()
            .map(|(node, joint)| {
                let reference_rotation = quat::normalize(joint.rotation);
                Joint {
                    name: joint.name,
                    node,
                    index: None,
                    parent: None,
                    children: Vec::new(),
                    depth: 0,
                    offset: joint.offset,
                    reference_rotation,
                    inverse_reference_rotation: quat::inverse(reference_rotation),
                    sensor: joint.sensor,
                    end_site: joint.end_site,
                }
            })
            .collect();

        //// resolve parents
        let mut root: Option<NodeId> = None;
        for (node, parent_name) in parent_names.iter().enumerate() {
            let parent_name = parent_name.as_deref().filter(|name| !name.is_empty());
            let Some(parent_name) = parent_name else {
                if let Some(first) = root {
                    return Err(SkeletonError::MultipleRoots {
                        first: nodes[first].name.clone(),
                        second: nodes[node].name.clone(),
                    });
                }
                root = Some(node);
                continue;
            };
            let parent = *by_name
                .get(parent_name)
                .ok_or_else(|| SkeletonError::MissingParent {
                    joint: nodes[node].name.clone(),
                    parent: parent_name.to_string(),
                })?;
            if nodes[parent].end_site {
                return Err(SkeletonError::EndSiteWithChildren(nodes[parent].name.clone()));
            }
            nodes[node].parent = Some(parent);
            nodes[parent].children.push(node);
        }
        let root = root.ok_or(SkeletonError::NoRoot)?;
        if nodes[root].end_site {
            return Err(SkeletonError::EndSiteRoot(nodes[root].name.clone()));
        }

        //// flatten: pre-order walk with an explicit stack, end sites are not indexed
        let mut order: Vec<NodeId> = Vec::new();
        let mut parents: Vec<Option<Index>> = Vec::new();
        let mut visited = vec![false; nodes.len()];
        let mut stack: Vec<(NodeId, Depth, Option<Index>)> = vec![(root, 0, None)];
        while let Some((node, depth, parent_index)) = stack.pop() {
            visited[node] = true;
            let joint = &mut nodes[node];
            joint.depth = depth;
            if joint.end_site {
                continue;
            }
            let index = order.len();
            joint.index = Some(index);
            order.push(node);
            parents.push(parent_index);
            debug!("joint `{}` -> tree index {}", joint.name, index);

            for &child in joint.children.iter().rev() {
                stack.push((child, depth + 1, Some(index)));
            }
        }
        // every non-root joint has a parent, so anything unvisited sits on a cycle
        if let Some(lost) = visited.iter().position(|&seen| !seen) {
            return Err(SkeletonError::Unreachable(nodes[lost].name.clone()));
        }

        //// bind sensor ids
        let mut table = HashMap::new();
        for (index, &node) in order.iter().enumerate() {
            if let Some(sensor) = nodes[node].sensor {
                if table.insert(sensor, index).is_some() {
                    return Err(SkeletonError::DuplicateSensor(sensor));
                }
            }
        }
        for joint in nodes.iter().filter(|joint| joint.end_site && joint.sensor.is_some()) {
            debug!("end site `{}` carries a sensor id, ignoring it", joint.name);
        }

        Ok(Skeleton {
            nodes,
            root,
            order,
            parents,
            index: SkeletonIndex { table },
        })
    }

    /// Number of indexed (motion-carrying) joints.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn joint(&self, index: Index) -> &Joint {
        &self.nodes[self.order[index]]
    }

    pub fn parent_of(&self, index: Index) -> Option<Index> {
        self.parents[index]
    }

    /// Indexed joints in tree-index order.
    pub fn joints(&self) -> impl Iterator<Item = &Joint> + '_ {
        self.order.iter().map(move |&node| &self.nodes[node])
    }

    pub fn root(&self) -> &Joint {
        &self.nodes[self.root]
    }

    pub fn node(&self, node: NodeId) -> &Joint {
        &self.nodes[node]
    }

    /// Every joint, end sites included, in declaration order.
    pub fn nodes(&self) -> &[Joint] {
        &self.nodes
    }

    pub fn find(&self, name: &str) -> Option<&Joint> {
        self.nodes.iter().find(|joint| joint.name == name)
    }

    pub fn sensor_index(&self) -> &SkeletonIndex {
        &self.index
    }

    pub fn index_of(&self, sensor: SensorJointId) -> Result<Index, UnknownJointError> {
        self.index.index_of(sensor)
    }
}
