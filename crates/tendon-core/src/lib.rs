//! Tendon Core - URDF model parsing and shared value types
//!
//! This crate provides the foundational types for the Tendon system:
//! - URDF (Unified Robot Description Format) parsing into a structured model
//! - Pose parsing for `<origin xyz rpy>` attributes
//! - RGBA colors used for material overrides

pub mod color;
pub mod pose;
pub mod urdf;

pub use color::{Color, ColorError};
pub use pose::{parse_vec3, Pose};
pub use urdf::{
    Geometry, GeometryKind, Joint, JointType, Link, Material, UrdfError, UrdfModel, Visual,
};
