//! Rigid transforms and the coordinate-frame client interface

use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tendon_core::Pose;
use tokio::sync::watch;

/// Translation, rotation and scale, composed parent-first
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Convert a URDF pose. Roll/pitch/yaw are fixed-axis X-Y-Z rotations,
    /// which is the intrinsic Z-Y-X sequence.
    pub fn from_pose(pose: &Pose) -> Self {
        let [x, y, z] = pose.xyz;
        let [roll, pitch, yaw] = pose.rpy;
        Self {
            translation: Vec3::new(x as f32, y as f32, z as f32),
            rotation: Quat::from_euler(EulerRot::ZYX, yaw as f32, pitch as f32, roll as f32),
            scale: Vec3::ONE,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * (self.scale * point) + self.translation
    }

    /// `self * child`: the child expressed in this transform's parent frame
    pub fn mul_transform(&self, child: &Transform) -> Transform {
        Transform {
            translation: self.transform_point(child.translation),
            rotation: self.rotation * child.rotation,
            scale: self.scale * child.scale,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Source of live coordinate-frame poses.
///
/// Each subscription yields the latest transform of `frame_id` relative to
/// the scene's fixed frame, or `None` until one is known.
pub trait TransformClient: Send + Sync {
    fn subscribe(&self, frame_id: &str) -> watch::Receiver<Option<Transform>>;
}

/// In-memory transform client fed by [`StaticTransformClient::publish`]
#[derive(Default)]
pub struct StaticTransformClient {
    frames: Mutex<HashMap<String, watch::Sender<Option<Transform>>>>,
}

impl StaticTransformClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pose of a frame, notifying every subscriber
    pub fn publish(&self, frame_id: &str, transform: Transform) {
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        frames
            .entry(frame_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(transform));
    }

    pub fn get(&self, frame_id: &str) -> Option<Transform> {
        let frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        frames.get(frame_id).and_then(|tx| *tx.borrow())
    }

    /// Number of live subscriptions to a frame
    pub fn subscriber_count(&self, frame_id: &str) -> usize {
        let frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        frames.get(frame_id).map_or(0, |tx| tx.receiver_count())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl TransformClient for StaticTransformClient {
    fn subscribe(&self, frame_id: &str) -> watch::Receiver<Option<Transform>> {
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        frames
            .entry(frame_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_from_pose_yaw() {
        let tf = Transform::from_pose(&Pose::new([1.0, 0.0, 0.0], [0.0, 0.0, FRAC_PI_2 as f64]));
        // Yaw of 90 degrees maps +X onto +Y
        assert!(approx(tf.rotation * Vec3::X, Vec3::Y));
        assert!(approx(tf.translation, Vec3::X));
    }

    #[test]
    fn test_rpy_is_fixed_axis() {
        // roll then yaw about fixed axes: Z is first rolled onto -Y, then yawed onto +X
        let tf = Transform::from_pose(&Pose::new([0.0; 3], [FRAC_PI_2 as f64, 0.0, FRAC_PI_2 as f64]));
        assert!(approx(tf.rotation * Vec3::Z, Vec3::X));
    }

    #[test]
    fn test_mul_transform() {
        let parent = Transform {
            translation: Vec3::new(0.0, 0.0, 1.0),
            rotation: Quat::from_rotation_z(FRAC_PI_2),
            scale: Vec3::ONE,
        };
        let child = Transform::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let combined = parent.mul_transform(&child);
        assert!(approx(combined.translation, Vec3::new(0.0, 1.0, 1.0)));
        assert_eq!(Transform::IDENTITY.mul_transform(&child), child);
    }

    #[test]
    fn test_static_client_publish_and_subscribe() {
        let client = StaticTransformClient::new();
        let rx = client.subscribe("base_link");
        assert!(rx.borrow().is_none());

        let tf = Transform::from_translation(Vec3::new(2.0, 0.0, 0.0));
        client.publish("base_link", tf);
        assert_eq!(*rx.borrow(), Some(tf));
        assert_eq!(client.get("base_link"), Some(tf));
        assert_eq!(client.get("other"), None);
        assert_eq!(client.frame_count(), 1);
        assert_eq!(client.subscriber_count("base_link"), 1);
        drop(rx);
        assert_eq!(client.subscriber_count("base_link"), 0);
        assert_eq!(client.subscriber_count("other"), 0);
    }
}
