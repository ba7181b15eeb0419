//! Tendon Scene - Scene-graph assembly for robot descriptions
//!
//! This crate turns a parsed [`tendon_core::UrdfModel`] into a tree of
//! [`SceneNode`]s. Link poses follow a [`TransformClient`] when one is
//! provided, and mesh resources are loaded in the background through a
//! [`MeshLoader`] so the tree can be inserted into a scene before every
//! mesh has arrived.

pub mod builder;
pub mod kinematics;
pub mod mesh;
pub mod node;
pub mod transform;

pub use builder::{build_scene, frame_id, BuildOptions, MeshProgress, UrdfScene};
pub use kinematics::rest_transforms;
pub use mesh::{resolve_mesh_uri, MeshAsset, MeshError, MeshFormat, MeshLoader, StandardMeshLoader};
pub use node::{
    ContentSummary, MeshContent, MeshMaterial, NodeContent, NodeId, NodeSnapshot, SceneNode, Shape,
    WeakSceneNode,
};
pub use transform::{StaticTransformClient, Transform, TransformClient};
