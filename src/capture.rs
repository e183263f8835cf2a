//! Raw, irregularly timed frames as they arrive from the sensor.

use crate::quat;
use crate::skeleton::{Skeleton, SkeletonIndex, UnknownJointError};
use crate::types::*;
use log::warn;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("no capture frame is open")]
    NoOpenFrame,
    #[error("capture frame was already closed")]
    FrameAlreadyClosed,
    #[error("timestamp {requested} ms precedes the previous frame at {previous} ms")]
    NonMonotonicTimestamp {
        previous: Milliseconds,
        requested: Milliseconds,
    },
}

/// Sample-time failures. The recorder leaves its data untouched when
/// returning one of these, so callers can log and carry on.
#[derive(Debug, Error, PartialEq)]
pub enum CaptureError {
    #[error(transparent)]
    UnknownJoint(#[from] UnknownJointError),
    #[error(transparent)]
    State(#[from] StateError),
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// What the sensor reported for one joint in one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JointSample {
    pub world_rotation: Option<Quaternion>,
    pub world_position: Option<Position>,
}

impl JointSample {
    pub fn is_initialized(&self) -> bool {
        self.world_rotation.is_some() || self.world_position.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub timestamp_ms: Milliseconds,
    /// one slot per joint, in tree-index order
    pub samples: Vec<JointSample>,
}

/// One record of the capture dump.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureRecord {
    pub timestamp_ms: Milliseconds,
    pub positions: Vec<(SensorJointId, Position)>,
    pub rotations: Vec<(SensorJointId, Quaternion)>,
}

/// Misuse is logged here so callers that drop the error still leave a trace.
fn rejected(err: StateError) -> CaptureError {
    warn!("ignoring capture call: {}", err);
    err.into()
}

/////////////////////////////////////////////////////////////////////////////////////////////////

/// Append-only buffer of raw frames.
#[derive(Debug, Clone)]
pub struct Recorder {
    index: SkeletonIndex,
    joint_count: usize,
    frames: Vec<RawFrame>,
    open: bool,
}

impl Recorder {
    pub fn new(skeleton: &Skeleton) -> Self {
        Recorder {
            index: skeleton.sensor_index().clone(),
            joint_count: skeleton.len(),
            frames: Vec::new(),
            open: false,
        }
    }

    /// Open a new frame with every slot uninitialized. Returns its position
    /// in the buffer. A frame still open is sealed first.
    pub fn begin_frame(&mut self, timestamp_ms: Milliseconds) -> Result<usize, CaptureError> {
        if let Some(previous) = self.frames.last() {
            if timestamp_ms < previous.timestamp_ms {
                return Err(rejected(StateError::NonMonotonicTimestamp {
                    previous: previous.timestamp_ms,
                    requested: timestamp_ms,
                }));
            }
            if self.open {
                warn!(
                    "frame at {} ms was never closed, sealing it",
                    previous.timestamp_ms
                );
            }
        }

        self.frames.push(RawFrame {
            timestamp_ms,
            samples: vec![JointSample::default(); self.joint_count],
        });
        self.open = true;
        Ok(self.frames.len() - 1)
    }

    /// Store a world rotation. The all-zero quaternion means "not tracked"
    /// and clears the slot's rotation instead.
    pub fn set_joint_rotation(
        &mut self,
        sensor: SensorJointId,
        rotation: Quaternion,
    ) -> Result<(), CaptureError> {
        let slot = self.open_slot(sensor)?;
        slot.world_rotation = if quat::is_zero(rotation) {
            None
        } else {
            Some(rotation)
        };
        Ok(())
    }

    pub fn set_joint_position(
        &mut self,
        sensor: SensorJointId,
        position: Position,
    ) -> Result<(), CaptureError> {
        let slot = self.open_slot(sensor)?;
        slot.world_position = Some(position);
        Ok(())
    }

    pub fn end_frame(&mut self) -> Result<(), CaptureError> {
        if !self.open {
            return Err(rejected(if self.frames.is_empty() {
                StateError::NoOpenFrame
            } else {
                StateError::FrameAlreadyClosed
            }));
        }
        self.open = false;
        Ok(())
    }

    /// Feed one dump record through begin/set/end. Samples for unknown
    /// joints are dropped and counted; the frame itself is kept.
    pub fn record(&mut self, record: &CaptureRecord) -> Result<usize, CaptureError> {
        self.begin_frame(record.timestamp_ms)?;

        let mut outcomes = Vec::with_capacity(record.positions.len() + record.rotations.len());
        for &(sensor, position) in &record.positions {
            outcomes.push(self.set_joint_position(sensor, position));
        }
        for &(sensor, rotation) in &record.rotations {
            outcomes.push(self.set_joint_rotation(sensor, rotation));
        }

        let mut dropped = 0;
        for outcome in outcomes {
            match outcome {
                Ok(()) => {}
                Err(CaptureError::UnknownJoint(err)) => {
                    warn!("{} ms: dropping sample, {}", record.timestamp_ms, err);
                    dropped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        self.end_frame()?;
        Ok(dropped)
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn frames(&self) -> &[RawFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    fn open_slot(&mut self, sensor: SensorJointId) -> Result<&mut JointSample, CaptureError> {
        if !self.open {
            return Err(rejected(StateError::NoOpenFrame));
        }
        let index = self.index.index_of(sensor)?;
        match self.frames.last_mut() {
            Some(frame) => Ok(&mut frame.samples[index]),
            None => Err(rejected(StateError::NoOpenFrame)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::ReferenceJoint;

    fn skeleton() -> Skeleton {
        let offset = Position::new(0.0, 10.0, 0.0);
        Skeleton::from_reference_pose(vec![
            ReferenceJoint::new("SpineBase", None, offset, quat::identity()).with_sensor(0),
            ReferenceJoint::new("SpineMid", Some("SpineBase"), offset, quat::identity())
                .with_sensor(1),
            ReferenceJoint::end_site("SpineMid_End", "SpineMid", offset),
        ])
        .unwrap()
    }

    #[test]
    fn test_begin_frame_starts_uninitialized() {
        let mut recorder = Recorder::new(&skeleton());
        assert_eq!(recorder.begin_frame(10), Ok(0));
        let frame = &recorder.frames()[0];
        assert_eq!(frame.timestamp_ms, 10);
        assert_eq!(frame.samples.len(), 2);
        assert!(frame.samples.iter().all(|sample| !sample.is_initialized()));
    }

    #[test]
    fn test_samples_land_in_tree_index_slots() {
        let mut recorder = Recorder::new(&skeleton());
        recorder.begin_frame(0).unwrap();
        let rotation = Quaternion::new(0.0, 1.0, 0.0, 0.0);
        recorder.set_joint_rotation(1, rotation).unwrap();
        recorder.set_joint_position(0, Position::new(1.0, 2.0, 3.0)).unwrap();
        recorder.end_frame().unwrap();

        let samples = &recorder.frames()[0].samples;
        assert_eq!(samples[1].world_rotation, Some(rotation));
        assert_eq!(samples[0].world_position, Some(Position::new(1.0, 2.0, 3.0)));
        assert!(samples[0].is_initialized());
        assert_eq!(samples[0].world_rotation, None);
    }

    #[test]
    fn test_zero_quaternion_marks_untracked() {
        let mut recorder = Recorder::new(&skeleton());
        recorder.begin_frame(0).unwrap();
        recorder.set_joint_rotation(1, quat::identity()).unwrap();
        recorder.set_joint_rotation(1, quat::zero()).unwrap();
        assert!(!recorder.frames()[0].samples[1].is_initialized());
    }

    #[test]
    fn test_unknown_joint_is_rejected_without_side_effects() {
        let mut recorder = Recorder::new(&skeleton());
        recorder.begin_frame(0).unwrap();
        assert_eq!(
            recorder.set_joint_rotation(9, quat::identity()),
            Err(CaptureError::UnknownJoint(UnknownJointError(9)))
        );
        assert!(recorder.is_open());
        assert!(recorder.frames()[0].samples.iter().all(|s| !s.is_initialized()));
    }

    #[test]
    fn test_samples_outside_frame_are_ignored() {
        let mut recorder = Recorder::new(&skeleton());
        assert_eq!(
            recorder.set_joint_position(0, Position::new(0.0, 0.0, 0.0)),
            Err(CaptureError::State(StateError::NoOpenFrame))
        );
        recorder.begin_frame(0).unwrap();
        recorder.end_frame().unwrap();
        assert_eq!(
            recorder.set_joint_rotation(0, quat::identity()),
            Err(CaptureError::State(StateError::NoOpenFrame))
        );
        assert!(!recorder.frames()[0].samples[0].is_initialized());
    }

    static WARNINGS: std::sync::Mutex<Vec<String>> = std::sync::Mutex::new(Vec::new());

    struct CollectWarnings;

    impl log::Log for CollectWarnings {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            metadata.level() <= log::Level::Warn
        }

        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                WARNINGS.lock().unwrap().push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: CollectWarnings = CollectWarnings;

    #[test]
    fn test_misuse_is_logged() {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(log::LevelFilter::Warn);
        }

        let mut recorder = Recorder::new(&skeleton());
        assert!(recorder.set_joint_rotation(0, quat::identity()).is_err());
        recorder.begin_frame(10).unwrap();
        recorder.end_frame().unwrap();
        assert!(recorder.end_frame().is_err());
        assert!(recorder.begin_frame(5).is_err());

        let warnings = WARNINGS.lock().unwrap();
        for expected in [
            "ignoring capture call: no capture frame is open",
            "ignoring capture call: capture frame was already closed",
            "ignoring capture call: timestamp 5 ms precedes the previous frame at 10 ms",
        ] {
            assert!(warnings.iter().any(|line| line == expected), "missing `{}`", expected);
        }
    }

    #[test]
    fn test_end_frame_twice() {
        let mut recorder = Recorder::new(&skeleton());
        assert_eq!(
            recorder.end_frame(),
            Err(CaptureError::State(StateError::NoOpenFrame))
        );
        recorder.begin_frame(0).unwrap();
        recorder.set_joint_rotation(0, quat::identity()).unwrap();
        recorder.end_frame().unwrap();
        assert_eq!(
            recorder.end_frame(),
            Err(CaptureError::State(StateError::FrameAlreadyClosed))
        );
        assert_eq!(recorder.frames()[0].samples[0].world_rotation, Some(quat::identity()));
    }

    #[test]
    fn test_timestamps_must_not_decrease() {
        let mut recorder = Recorder::new(&skeleton());
        recorder.begin_frame(100).unwrap();
        recorder.end_frame().unwrap();
        assert_eq!(recorder.begin_frame(100), Ok(1));
        recorder.end_frame().unwrap();
        assert_eq!(
            recorder.begin_frame(50),
            Err(CaptureError::State(StateError::NonMonotonicTimestamp {
                previous: 100,
                requested: 50
            }))
        );
        assert_eq!(recorder.len(), 2);
    }

    #[test]
    fn test_record_drops_unknown_samples() {
        let mut recorder = Recorder::new(&skeleton());
        let record = CaptureRecord {
            timestamp_ms: 33,
            positions: vec![(0, Position::new(0.0, 1.0, 0.0)), (20, Position::new(0.0, 0.0, 0.0))],
            rotations: vec![(1, quat::identity()), (0, quat::zero())],
        };
        assert_eq!(recorder.record(&record), Ok(1));
        assert!(!recorder.is_open());
        let samples = &recorder.frames()[0].samples;
        assert_eq!(samples[1].world_rotation, Some(quat::identity()));
        assert_eq!(samples[0].world_rotation, None);
        assert!(samples[0].is_initialized());
    }
}
