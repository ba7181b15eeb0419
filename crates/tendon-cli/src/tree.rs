//! Plain-text rendering of scene snapshots

use std::fmt::Write;
use tendon_scene::{ContentSummary, NodeSnapshot, Shape};

/// Indented outline of a snapshot, one node per line
pub fn format_tree(snapshot: &NodeSnapshot) -> String {
    let mut out = String::new();
    write_node(&mut out, snapshot, 0);
    out
}

fn write_node(out: &mut String, node: &NodeSnapshot, depth: usize) {
    let _ = write!(out, "{}{}", "  ".repeat(depth), node.name);
    if let Some(frame) = &node.frame_id {
        if frame != &node.name {
            let _ = write!(out, " [{}]", frame);
        }
    }
    let t = node.transform.translation;
    if t.length_squared() > 0.0 {
        let _ = write!(out, " @ ({:.3}, {:.3}, {:.3})", t.x, t.y, t.z);
    }
    if let Some(content) = describe(&node.content) {
        let _ = write!(out, ": {}", content);
    }
    out.push('\n');

    for child in &node.children {
        write_node(out, child, depth + 1);
    }
}

fn describe(content: &ContentSummary) -> Option<String> {
    match content {
        ContentSummary::Empty => None,
        ContentSummary::Shape { shape, color } => {
            let shape = match shape {
                Shape::Box { size } => format!("box {}x{}x{}", size.x, size.y, size.z),
                Shape::Cylinder { radius, length } => format!("cylinder r={} l={}", radius, length),
                Shape::Sphere { radius } => format!("sphere r={}", radius),
            };
            Some(format!("{} ({})", shape, color))
        }
        ContentSummary::Mesh {
            uri, bytes, color, ..
        } => Some(match color {
            Some(color) => format!("mesh {} ({} bytes, color {})", uri, bytes, color),
            None => format!("mesh {} ({} bytes)", uri, bytes),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tendon_core::{Color, Pose};
    use tendon_scene::{NodeContent, SceneNode, Transform};

    #[test]
    fn test_format_tree() {
        let root = SceneNode::new("scene");
        let robot = SceneNode::new("rover");
        let link = SceneNode::new("rover1/base_link");
        link.set_frame_id("rover1/base_link");
        link.set_transform(Transform::from_pose(&Pose::new([1.0, 0.0, 0.5], [0.0; 3])));
        let visual = SceneNode::new("base_link/visual_0");
        visual.set_content(NodeContent::Shape {
            shape: Shape::Sphere { radius: 0.5 },
            color: Color::rgb(1.0, 0.0, 0.0),
        });
        link.add_child(&visual);
        robot.add_child(&link);
        root.add_child(&robot);

        let text = format_tree(&root.snapshot());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "scene");
        assert_eq!(lines[1], "  rover");
        assert_eq!(lines[2], "    rover1/base_link @ (1.000, 0.000, 0.500)");
        assert_eq!(lines[3], "      base_link/visual_0: sphere r=0.5 (1 0 0 1)");
    }
}
