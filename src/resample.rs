use crate::derive::{DerivedFrame, DerivedSample};
use crate::quat;
use crate::skeleton::Skeleton;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResampledSample {
    pub local_rotation: Quaternion,
    /// local rotation relative to the reference rotation
    pub deviation: Quaternion,
    /// radians
    pub euler: Euler,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResampledFrame {
    /// milliseconds since the first raw frame
    pub elapsed_ms: Milliseconds,
    pub samples: Vec<ResampledSample>,
}

/// Target time of output frame `k`, relative to the first raw frame.
pub fn target_time(k: u64, frame_rate: u32) -> Milliseconds {
    k * 1000 / frame_rate as u64
}

/// Put the irregular raw timeline onto a fixed `frame_rate` grid.
///
/// A raw frame sitting exactly on a grid time is copied as is; grid times
/// falling between two raw frames are slerped from them. The final raw
/// frame only ever acts as an interpolation target. Fewer than two raw
/// frames give an empty result. `frame_rate` must not be zero.
pub fn resample(skeleton: &Skeleton, frames: &[DerivedFrame], frame_rate: u32) -> Vec<ResampledFrame> {
    let mut out: Vec<ResampledFrame> = Vec::new();
    if frames.len() < 2 || frame_rate == 0 {
        return out;
    }

    let origin = frames[0].timestamp_ms;
    let mut k: u64 = 0;
    let mut current = origin;

    for pair in frames.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);

        if from.timestamp_ms == current {
            let locals = from.samples.iter().map(|sample| sample.local_rotation);
            out.push(build_frame(skeleton, current - origin, locals));
            k += 1;
            current = origin + target_time(k, frame_rate);
        }

        while from.timestamp_ms <= current && current < to.timestamp_ms {
            let span = (to.timestamp_ms - from.timestamp_ms) as f64;
            let t = (current - from.timestamp_ms) as f64 / span;
            let locals = interpolate(&from.samples, &to.samples, t);
            out.push(build_frame(skeleton, current - origin, locals));
            k += 1;
            current = origin + target_time(k, frame_rate);
        }
    }

    out
}

fn interpolate<'a>(
    from: &'a [DerivedSample],
    to: &'a [DerivedSample],
    t: f64,
) -> impl Iterator<Item = Quaternion> + 'a {
    from.iter()
        .zip(to.iter())
        .map(move |(a, b)| quat::slerp(a.local_rotation, b.local_rotation, t))
}

fn build_frame(
    skeleton: &Skeleton,
    elapsed_ms: Milliseconds,
    locals: impl Iterator<Item = Quaternion>,
) -> ResampledFrame {
    let samples = locals
        .enumerate()
        .map(|(index, local_rotation)| {
            // local = deviation * reference
            let deviation =
                quat::multiply(local_rotation, skeleton.joint(index).inverse_reference_rotation);
            ResampledSample {
                local_rotation,
                deviation,
                euler: quat::to_euler_zyx(deviation),
            }
        })
        .collect();

    ResampledFrame {
        elapsed_ms,
        samples,
    }
}
