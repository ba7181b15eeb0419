//! Scene-graph node type
//!
//! A [`SceneNode`] is a cheaply cloneable handle; clones refer to the same
//! node and equality is identity. Child insertion is set-like, so adding a
//! node that is already a child does nothing.

use glam::Vec3;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tendon_core::Color;
use uuid::Uuid;

use crate::mesh::{MeshAsset, MeshFormat};
use crate::transform::Transform;

/// Held across the cycle check and the insert in [`SceneNode::add_child`],
/// so concurrent inserts on different nodes cannot close a loop
static TOPOLOGY: Mutex<()> = Mutex::new(());

/// Unique identity of a scene node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(Uuid);

impl NodeId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Primitive shapes from URDF geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Box { size: Vec3 },
    Cylinder { radius: f32, length: f32 },
    Sphere { radius: f32 },
}

/// How a loaded mesh is shaded
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeshMaterial {
    /// Use the material embedded in the mesh file
    Native,
    /// Replace every material with a flat color
    Override(Color),
}

#[derive(Debug, Clone)]
pub struct MeshContent {
    pub asset: Arc<MeshAsset>,
    pub scale: Vec3,
    pub material: MeshMaterial,
}

/// Renderable payload of a node
#[derive(Debug, Clone, Default)]
pub enum NodeContent {
    #[default]
    Empty,
    Shape { shape: Shape, color: Color },
    Mesh(MeshContent),
}

impl NodeContent {
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeContent::Empty)
    }
}

struct NodeState {
    frame_id: Option<String>,
    transform: Transform,
    content: NodeContent,
    children: Vec<SceneNode>,
}

struct NodeInner {
    id: NodeId,
    name: String,
    state: Mutex<NodeState>,
}

#[derive(Clone)]
pub struct SceneNode(Arc<NodeInner>);

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::new(NodeInner {
            id: NodeId::new(),
            name: name.into(),
            state: Mutex::new(NodeState {
                frame_id: None,
                transform: Transform::IDENTITY,
                content: NodeContent::Empty,
                children: Vec::new(),
            }),
        }))
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.0.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Insert `child` unless it is already a child, is this node, or
    /// contains this node. Returns whether the tree changed.
    pub fn add_child(&self, child: &SceneNode) -> bool {
        let _topology = TOPOLOGY.lock().unwrap_or_else(PoisonError::into_inner);
        if child == self || child.has_descendant(self) {
            return false;
        }
        let mut state = self.state();
        if state.children.iter().any(|c| c == child) {
            return false;
        }
        state.children.push(child.clone());
        true
    }

    /// Remove `child` if present. Returns whether the tree changed.
    pub fn remove_child(&self, child: &SceneNode) -> bool {
        let mut state = self.state();
        let before = state.children.len();
        state.children.retain(|c| c != child);
        state.children.len() != before
    }

    pub fn contains_child(&self, child: &SceneNode) -> bool {
        self.state().children.iter().any(|c| c == child)
    }

    pub fn children(&self) -> Vec<SceneNode> {
        self.state().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.state().children.len()
    }

    /// Whether `node` appears anywhere below this node
    pub fn has_descendant(&self, node: &SceneNode) -> bool {
        self.children()
            .iter()
            .any(|c| c == node || c.has_descendant(node))
    }

    /// Number of nodes below this one
    pub fn descendant_count(&self) -> usize {
        self.children()
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }

    /// Depth-first search by name, including this node
    pub fn find(&self, name: &str) -> Option<SceneNode> {
        if self.name() == name {
            return Some(self.clone());
        }
        self.children().iter().find_map(|c| c.find(name))
    }

    pub fn transform(&self) -> Transform {
        self.state().transform
    }

    pub fn set_transform(&self, transform: Transform) {
        self.state().transform = transform;
    }

    pub fn frame_id(&self) -> Option<String> {
        self.state().frame_id.clone()
    }

    pub fn set_frame_id(&self, frame_id: impl Into<String>) {
        self.state().frame_id = Some(frame_id.into());
    }

    pub fn content(&self) -> NodeContent {
        self.state().content.clone()
    }

    pub fn set_content(&self, content: NodeContent) {
        self.state().content = content;
    }

    pub fn downgrade(&self) -> WeakSceneNode {
        WeakSceneNode(Arc::downgrade(&self.0))
    }

    /// Serializable copy of the subtree rooted at this node
    pub fn snapshot(&self) -> NodeSnapshot {
        let (frame_id, transform, content, children) = {
            let state = self.state();
            (
                state.frame_id.clone(),
                state.transform,
                ContentSummary::from(&state.content),
                state.children.clone(),
            )
        };
        NodeSnapshot {
            id: self.id(),
            name: self.name().to_string(),
            frame_id,
            transform,
            content,
            children: children.iter().map(SceneNode::snapshot).collect(),
        }
    }
}

impl PartialEq for SceneNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SceneNode {}

impl fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneNode")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("children", &self.child_count())
            .finish()
    }
}

/// Non-owning handle, used by background tasks that must not keep a
/// detached subtree alive
#[derive(Clone)]
pub struct WeakSceneNode(Weak<NodeInner>);

impl WeakSceneNode {
    pub fn upgrade(&self) -> Option<SceneNode> {
        self.0.upgrade().map(SceneNode)
    }
}

/// Content description used in snapshots
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSummary {
    Empty,
    Shape {
        shape: Shape,
        color: Color,
    },
    Mesh {
        uri: String,
        format: MeshFormat,
        bytes: usize,
        scale: Vec3,
        color: Option<Color>,
    },
}

impl From<&NodeContent> for ContentSummary {
    fn from(content: &NodeContent) -> Self {
        match content {
            NodeContent::Empty => ContentSummary::Empty,
            NodeContent::Shape { shape, color } => ContentSummary::Shape {
                shape: *shape,
                color: *color,
            },
            NodeContent::Mesh(mesh) => ContentSummary::Mesh {
                uri: mesh.asset.uri.clone(),
                format: mesh.asset.format,
                bytes: mesh.asset.data.len(),
                scale: mesh.scale,
                color: match mesh.material {
                    MeshMaterial::Native => None,
                    MeshMaterial::Override(color) => Some(color),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub name: String,
    pub frame_id: Option<String>,
    pub transform: Transform,
    pub content: ContentSummary,
    pub children: Vec<NodeSnapshot>,
}
