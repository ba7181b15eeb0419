//! Zero-configuration link placement

use std::collections::HashMap;
use tendon_core::UrdfModel;

use crate::transform::Transform;

/// Pose of every link in the model root frame with all joints at zero.
///
/// Joint origins are composed from the root links down. Links that cannot
/// be reached from a root (a malformed cyclic tree) sit at the identity.
pub fn rest_transforms(model: &UrdfModel) -> HashMap<String, Transform> {
    let mut poses: HashMap<String, Transform> = HashMap::with_capacity(model.link.len());
    let mut stack: Vec<(&str, Transform)> = model
        .root_links()
        .into_iter()
        .map(|link| (link.name.as_str(), Transform::IDENTITY))
        .collect();

    while let Some((link, transform)) = stack.pop() {
        if poses.contains_key(link) {
            continue;
        }
        poses.insert(link.to_string(), transform);
        for joint in model.child_joints(link) {
            let origin = Transform::from_pose(&joint.pose());
            stack.push((joint.child.link.as_str(), transform.mul_transform(&origin)));
        }
    }

    for link in &model.link {
        poses
            .entry(link.name.clone())
            .or_insert(Transform::IDENTITY);
    }
    poses
}
