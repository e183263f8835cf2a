use crate::capture::CaptureRecord;
use crate::kinect;
use crate::quat;
use crate::skeleton::ReferenceJoint;
use crate::types::*;
use regex::Regex;
use std::path::Path;
use std::collections::HashSet;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("failed to read `{path}`")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

fn syntax<T>(line: usize, message: impl Into<String>) -> Result<T, ParseError> {
    Err(ParseError::Syntax {
        line,
        message: message.into(),
    })
}

///////////////////////////////////////////////////////////////////////////////////////////////////
// TOKENS

/// Whitespace separated words, with `{` and `}` always standing alone so
/// `ROOT Hips {` and `Hips{` read the same as the one-per-line layout.
struct Tokens<'a> {
    inner: std::vec::IntoIter<(usize, &'a str)>,
    line: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Result<Self, ParseError> {
        let re_token = Regex::new(r"[{}]|[^\s{}]+")?;
        let mut tokens = Vec::new();
        for (i, line) in text.lines().enumerate() {
            for token in re_token.find_iter(line) {
                tokens.push((i + 1, token.as_str()));
            }
        }
        Ok(Tokens {
            inner: tokens.into_iter(),
            line: 0,
        })
    }

    fn next(&mut self) -> Option<&'a str> {
        let (line, token) = self.inner.next()?;
        self.line = line;
        Some(token)
    }

    fn expect(&mut self, what: &str) -> Result<&'a str, ParseError> {
        match self.next() {
            Some(token) => Ok(token),
            None => syntax(self.line, format!("unexpected end of input, expected {}", what)),
        }
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        let token = self.expect(keyword)?;
        if token != keyword {
            return syntax(self.line, format!("expected `{}`, found `{}`", keyword, token));
        }
        Ok(())
    }

    fn value<T: FromStr>(&mut self, what: &str) -> Result<T, ParseError> {
        let token = self.expect(what)?;
        match token.parse::<T>() {
            Ok(value) => Ok(value),
            Err(_) => syntax(self.line, format!("invalid {}: `{}`", what, token)),
        }
    }

    fn name(&mut self, what: &str) -> Result<&'a str, ParseError> {
        let token = self.expect(what)?;
        if token == "{" || token == "}" {
            return syntax(self.line, format!("expected {}, found `{}`", what, token));
        }
        Ok(token)
    }
}

///////////////////////////////////////////////////////////////////////////////////////////////////
// REFERENCE POSE

/// First free name among `name`, `name_2`, `name_3`, ...
fn unique_name(taken: &HashSet<String>, name: &str) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", name, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

/// Reads the HIERARCHY part of a reference pose file, which is plain bvh
/// plus a `ROT x y z w` entry per joint. Stops at `MOTION`.
fn parse_reference_text(text: &str) -> Result<Vec<ReferenceJoint>, ParseError> {
    let mut tokens = Tokens::new(text)?;

    let mut joints: Vec<ReferenceJoint> = Vec::new();
    let mut names: HashSet<String> = HashSet::new();
    // joints whose `{` is open
    let mut stack: Vec<usize> = Vec::new();
    // declared, waiting for its `{`
    let mut pending: Option<usize> = None;

    while let Some(token) = tokens.next() {
        let line = tokens.line;
        if pending.is_some() && token != "{" {
            return syntax(line, format!("expected `{{`, found `{}`", token));
        }

        match token {
            "HIERARCHY" => {}
            "MOTION" => break,
            "ROOT" | "JOINT" => {
                //// Create joint
                let name = tokens.name("joint name")?;
                let is_root = token == "ROOT";
                let parent = match stack.last() {
                    Some(&parent) if !is_root => Some(joints[parent].name.as_str()),
                    None if is_root => None,
                    Some(_) => return syntax(line, "ROOT must not be nested"),
                    None => return syntax(line, format!("JOINT `{}` has no enclosing joint", name)),
                };
                let mut joint =
                    ReferenceJoint::new(name, parent, Position::new(0.0, 0.0, 0.0), quat::identity());
                joint.sensor = kinect::joint_id(name);
                names.insert(name.to_string());
                pending = Some(joints.len());
                joints.push(joint);
            }
            _ if token.eq_ignore_ascii_case("end") => {
                //// Create endsite, `End Site` and `End <name>` alike
                let declared = tokens.name("end site name")?;
                let Some(&parent) = stack.last() else {
                    return syntax(line, "end site outside of any joint");
                };
                let name = unique_name(&names, declared);
                names.insert(name.clone());
                let parent = joints[parent].name.clone();
                pending = Some(joints.len());
                joints.push(ReferenceJoint::end_site(&name, &parent, Position::new(0.0, 0.0, 0.0)));
            }
            "{" => match pending.take() {
                Some(joint) => stack.push(joint),
                None => return syntax(line, "unexpected `{`"),
            },
            "}" => {
                if stack.pop().is_none() {
                    return syntax(line, "unbalanced `}`");
                }
            }
            "OFFSET" => {
                //// Parse offset
                let Some(&joint) = stack.last() else {
                    return syntax(line, "OFFSET outside of any joint");
                };
                let x = tokens.value("coordinate")?;
                let y = tokens.value("coordinate")?;
                let z = tokens.value("coordinate")?;
                joints[joint].offset = Position::new(x, y, z);
            }
            "ROT" => {
                //// Parse reference rotation (x y z w)
                let Some(&joint) = stack.last() else {
                    return syntax(line, "ROT outside of any joint");
                };
                let x = tokens.value("quaternion component")?;
                let y = tokens.value("quaternion component")?;
                let z = tokens.value("quaternion component")?;
                let w = tokens.value("quaternion component")?;
                let rotation = Quaternion::new(w, x, y, z);
                if quat::is_zero(rotation) {
                    return syntax(line, "ROT must not be the zero quaternion");
                }
                joints[joint].rotation = quat::normalize(rotation);
            }
            "EULER" => {
                // informational only, the quaternion is authoritative
                for _ in 0..3 {
                    tokens.value::<f64>("angle")?;
                }
            }
            "CHANNELS" => {
                let count: usize = tokens.value("channel count")?;
                for _ in 0..count {
                    tokens.name("channel name")?;
                }
            }
            _ => return syntax(line, format!("unexpected `{}`", token)),
        }
    }

    if pending.is_some() || !stack.is_empty() {
        return syntax(tokens.line, "unexpected end of hierarchy");
    }
    Ok(joints)
}

///////////////////////////////////////////////////////////////////////////////////////////////////
// CAPTURE DUMP

/// Records look like
/// `<ms> Pos <n> (<joint> x y z)*n Rot <m> (<joint> x y z w)*m`,
/// whitespace separated, with line breaks anywhere.
fn parse_capture_text(text: &str) -> Result<Vec<CaptureRecord>, ParseError> {
    let mut tokens = Tokens::new(text)?;
    let mut records = Vec::new();

    while let Some(token) = tokens.next() {
        let timestamp_ms = match token.parse::<Milliseconds>() {
            Ok(timestamp_ms) => timestamp_ms,
            Err(_) => return syntax(tokens.line, format!("invalid timestamp: `{}`", token)),
        };

        tokens.keyword("Pos")?;
        let count: usize = tokens.value("position count")?;
        let mut positions = Vec::with_capacity(count);
        for _ in 0..count {
            let joint: SensorJointId = tokens.value("joint id")?;
            let x = tokens.value("coordinate")?;
            let y = tokens.value("coordinate")?;
            let z = tokens.value("coordinate")?;
            positions.push((joint, Position::new(x, y, z)));
        }

        tokens.keyword("Rot")?;
        let count: usize = tokens.value("rotation count")?;
        let mut rotations = Vec::with_capacity(count);
        for _ in 0..count {
            let joint: SensorJointId = tokens.value("joint id")?;
            let x = tokens.value("quaternion component")?;
            let y = tokens.value("quaternion component")?;
            let z = tokens.value("quaternion component")?;
            let w = tokens.value("quaternion component")?;
            rotations.push((joint, Quaternion::new(w, x, y, z)));
        }

        records.push(CaptureRecord {
            timestamp_ms,
            positions,
            rotations,
        });
    }

    Ok(records)
}

///////////////////////////////////////////////////////////////////////////////////////////////////
// PUBLIC

fn read_file<P: AsRef<Path>>(path: P) -> Result<String, ParseError> {
    std::fs::read_to_string(path.as_ref()).map_err(|source| ParseError::Io {
        path: path.as_ref().display().to_string(),
        source,
    })
}

/// load a reference pose from a file path
pub fn load_reference_pose_from_file<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<ReferenceJoint>, ParseError> {
    let contents = read_file(path)?;
    parse_reference_text(&contents)
}

/// load a reference pose from a string
pub fn load_reference_pose_from_string(text: &str) -> Result<Vec<ReferenceJoint>, ParseError> {
    parse_reference_text(text)
}

/// load a capture dump from a file path
pub fn load_capture_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<CaptureRecord>, ParseError> {
    let contents = read_file(path)?;
    parse_capture_text(&contents)
}

/// load a capture dump from a string
pub fn load_capture_from_string(text: &str) -> Result<Vec<CaptureRecord>, ParseError> {
    parse_capture_text(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSE: &str = "\
HIERARCHY
ROOT SpineBase
{
\tOFFSET 0.0 0.0 0.0
\tCHANNELS 6 Xposition Yposition Zposition Xrotation Yrotation Zrotation
\tROT 0 0 0 2
\tJOINT SpineMid
\t{
\t\tOFFSET 0.0 25.5 0.0
\t\tROT 0 0.7071068 0 0.7071068
\t\tEULER 0 90 0
\t\tEnd Site
\t\t{
\t\t\tOFFSET 0.0 10.0 0.0
\t\t}
\t}
\tJOINT Tail
\t{
\t\tOFFSET 0.0 -5.0 0.0
\t\tEnd Site
\t\t{
\t\t\tOFFSET 0.0 -1.0 0.0
\t\t}
\t}
}
MOTION
Frames: 0
";

    #[test]
    fn test_reference_pose_joints() {
        let joints = load_reference_pose_from_string(POSE).unwrap();
        let names: Vec<&str> = joints.iter().map(|joint| joint.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["SpineBase", "SpineMid", "Site", "Tail", "Site_2"]
        );

        assert_eq!(joints[0].parent, None);
        assert_eq!(joints[1].parent.as_deref(), Some("SpineBase"));
        assert_eq!(joints[3].parent.as_deref(), Some("SpineBase"));
        assert!(joints[2].end_site && joints[4].end_site);
        assert_eq!(joints[1].offset, Position::new(0.0, 25.5, 0.0));
        assert_eq!(joints[4].offset, Position::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_reference_pose_rotations_and_sensors() {
        let joints = load_reference_pose_from_string(POSE).unwrap();
        // ROT is x y z w and gets normalised
        assert_eq!(joints[0].rotation, quat::identity());
        assert!((joints[1].rotation.v.y - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        // missing ROT means identity
        assert_eq!(joints[3].rotation, quat::identity());

        assert_eq!(joints[0].sensor, Some(0));
        assert_eq!(joints[1].sensor, Some(1));
        assert_eq!(joints[3].sensor, None);
        assert_eq!(joints[2].sensor, None);
    }

    #[test]
    fn test_reference_pose_errors() {
        // the third coordinate is the `}` on the next line
        let err = load_reference_pose_from_string("HIERARCHY\nROOT A\n{\nOFFSET 1 2\n}\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 5, .. }));

        let err = load_reference_pose_from_string("ROOT A\n{\nJOINT B\n{\n}\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 5, .. }));

        let err = load_reference_pose_from_string("ROOT A\n}\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));

        let err = load_reference_pose_from_string("ROOT A\n{\nROT 0 0 0 0\n}\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 3, .. }));
    }

    #[test]
    fn test_reference_pose_braces_on_keyword_lines() {
        let text = "\
HIERARCHY
ROOT SpineBase {
\tOFFSET 0 0 0 ROT 0 0 0 1
\tJOINT SpineMid { OFFSET 0 20 0
\t\tEnd Site { OFFSET 0 5 0 } }
\tJOINT HipLeft{OFFSET 8 0 0}
}
MOTION
";
        let joints = load_reference_pose_from_string(text).unwrap();
        let names: Vec<&str> = joints.iter().map(|joint| joint.name.as_str()).collect();
        assert_eq!(names, vec!["SpineBase", "SpineMid", "Site", "HipLeft"]);
        assert_eq!(joints[2].parent.as_deref(), Some("SpineMid"));
        assert_eq!(joints[2].offset, Position::new(0.0, 5.0, 0.0));
        assert_eq!(joints[3].parent.as_deref(), Some("SpineBase"));
        assert_eq!(joints[3].offset, Position::new(8.0, 0.0, 0.0));
        assert_eq!(joints[3].sensor, Some(12));
    }

    #[test]
    fn test_end_site_names() {
        let text = "\
ROOT A
{
\tOFFSET 0 0 0
\tEnd Site { OFFSET 0 1 0 }
\tEnd Site { OFFSET 1 0 0 }
\tEnd HandTipLeft { OFFSET 0 0 1 }
\tEnd A { OFFSET 0 0 2 }
}
";
        let joints = load_reference_pose_from_string(text).unwrap();
        let names: Vec<&str> = joints.iter().map(|joint| joint.name.as_str()).collect();
        assert_eq!(names, vec!["A", "Site", "Site_2", "HandTipLeft", "A_2"]);
        assert!(joints[1..].iter().all(|joint| joint.end_site && joint.sensor.is_none()));

        let skeleton = crate::skeleton::Skeleton::from_reference_pose(joints).unwrap();
        assert_eq!(skeleton.len(), 1);
        assert_eq!(skeleton.root().children.len(), 4);
    }

    #[test]
    fn test_capture_records() {
        let text = "\
0 Pos 2 0 0.1 0.2 0.3 1 0.0 0.5 0.0 Rot 2 0 0 0 0 1 1 0 0 0 0
33 Pos 0
Rot 1
20 0.0 0.7071068 0.0 0.7071068
";
        let records = load_capture_from_string(text).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].timestamp_ms, 0);
        assert_eq!(records[0].positions[0], (0, Position::new(0.1, 0.2, 0.3)));
        assert_eq!(records[0].rotations[0], (0, quat::identity()));
        assert!(quat::is_zero(records[0].rotations[1].1));

        assert_eq!(records[1].timestamp_ms, 33);
        assert!(records[1].positions.is_empty());
        assert_eq!(records[1].rotations[0].0, 20);
        assert!((records[1].rotations[0].1.s - 0.7071068).abs() < 1e-12);
    }

    #[test]
    fn test_capture_errors() {
        let err = load_capture_from_string("0 Pos 1 0 1.0 2.0\nRot 0\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 2, .. }));

        let err = load_capture_from_string("0 Rot 0\n").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }));

        let err = load_capture_from_string("0 Pos 0 Rot 1 3 0 0 0").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_capture_from_file("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
    }
}
