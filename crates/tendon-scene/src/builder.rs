//! Scene subtree assembly from a URDF model
//!
//! [`build_scene`] returns the subtree root immediately. Mesh geometry and
//! live link poses arrive later from background tasks, so the caller can
//! insert the root into a scene right away and watch it fill in.

use glam::Vec3;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tendon_core::{Color, GeometryKind, UrdfModel};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::kinematics::rest_transforms;
use crate::mesh::{resolve_mesh_uri, MeshFormat, MeshLoader, StandardMeshLoader};
use crate::node::{MeshContent, MeshMaterial, NodeContent, SceneNode, Shape, WeakSceneNode};
use crate::transform::{Transform, TransformClient};

/// Options passed through from the loader configuration
#[derive(Clone)]
pub struct BuildOptions {
    /// Base path or URL that `package://` mesh references resolve against
    pub path: String,
    /// Source of live link poses; links sit at their rest pose without one
    pub tf_client: Option<Arc<dyn TransformClient>>,
    /// Namespace for link frame ids
    pub frame_prefix: String,
    pub mesh_loader: Arc<dyn MeshLoader>,
    /// Replaces every mesh and shape material when set
    pub color: Option<Color>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            tf_client: None,
            frame_prefix: String::new(),
            mesh_loader: Arc::new(StandardMeshLoader::new()),
            color: None,
        }
    }
}

/// Mesh loading counters for one built scene
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MeshProgress {
    pub total: usize,
    pub loaded: usize,
    pub failed: usize,
}

impl MeshProgress {
    pub fn pending(&self) -> usize {
        self.total.saturating_sub(self.loaded + self.failed)
    }

    pub fn is_settled(&self) -> bool {
        self.pending() == 0
    }
}

/// A freshly built subtree and its mesh loading progress
pub struct UrdfScene {
    pub root: SceneNode,
    pub meshes: watch::Receiver<MeshProgress>,
}

impl UrdfScene {
    /// Wait until every mesh has either loaded or failed
    pub async fn meshes_settled(&mut self) -> MeshProgress {
        if let Ok(progress) = self.meshes.wait_for(MeshProgress::is_settled).await {
            return *progress;
        }
        // Every loader task is gone; the last published counts are final
        *self.meshes.borrow()
    }
}

/// Frame id of a link under the given prefix
pub fn frame_id(prefix: &str, link: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        link.to_string()
    } else {
        format!("{}/{}", prefix, link)
    }
}

/// Build the scene subtree for `model`.
///
/// Must be called from within a Tokio runtime; mesh loads and transform
/// subscriptions run as spawned tasks.
pub fn build_scene(model: &UrdfModel, options: &BuildOptions) -> UrdfScene {
    let root = SceneNode::new(&model.name);
    let (progress_tx, progress_rx) = watch::channel(MeshProgress::default());
    let progress_tx = Arc::new(progress_tx);

    let rest: HashMap<String, Transform> = match options.tf_client {
        Some(_) => HashMap::new(),
        None => rest_transforms(model),
    };

    for link in &model.link {
        let mut visuals = Vec::with_capacity(link.visual.len());
        for (index, visual) in link.visual.iter().enumerate() {
            match visual.geometry_kind() {
                Some(geometry) => visuals.push((index, visual, geometry)),
                None => warn!(link = %link.name, visual = index, "Skipping visual without usable geometry"),
            }
        }
        if visuals.is_empty() {
            continue;
        }

        let frame = frame_id(&options.frame_prefix, &link.name);
        let link_node = SceneNode::new(frame.clone());
        link_node.set_frame_id(frame.clone());
        match &options.tf_client {
            Some(client) => {
                follow_frame(link_node.downgrade(), client.subscribe(&frame));
            }
            None => link_node.set_transform(rest.get(&link.name).copied().unwrap_or_default()),
        }

        for (index, visual, geometry) in visuals {
            let name = match &visual.name {
                Some(name) => frame_id(&options.frame_prefix, name),
                None => frame_id(
                    &options.frame_prefix,
                    &format!("{}/visual_{}", link.name, index),
                ),
            };
            let node = SceneNode::new(name);
            node.set_transform(Transform::from_pose(&visual.pose()));

            match geometry {
                GeometryKind::Mesh { filename, scale } => {
                    let uri = resolve_mesh_uri(&options.path, filename);
                    let format = MeshFormat::from_uri(&uri);
                    if !options.mesh_loader.supports(format) {
                        warn!(link = %link.name, uri = %uri, "Could not load geometry mesh");
                        continue;
                    }
                    progress_tx.send_modify(|p| p.total += 1);
                    spawn_mesh_load(
                        node.clone(),
                        &uri,
                        to_vec3(scale),
                        options,
                        progress_tx.clone(),
                    );
                }
                shape => {
                    let color = options
                        .color
                        .or_else(|| visual.color())
                        .unwrap_or(Color::DEFAULT_GREY);
                    if let Some(shape) = to_shape(&shape) {
                        node.set_content(NodeContent::Shape { shape, color });
                    }
                }
            }
            link_node.add_child(&node);
        }
        root.add_child(&link_node);
    }

    info!(
        robot = %model.name,
        links = root.child_count(),
        meshes = progress_rx.borrow().total,
        "Built robot scene"
    );
    UrdfScene {
        root,
        meshes: progress_rx,
    }
}

fn spawn_mesh_load(
    node: SceneNode,
    uri: &str,
    scale: Vec3,
    options: &BuildOptions,
    progress: Arc<watch::Sender<MeshProgress>>,
) {
    let material = match options.color {
        Some(color) => MeshMaterial::Override(color),
        None => MeshMaterial::Native,
    };
    let load = options.mesh_loader.load(uri);
    let uri = uri.to_string();

    tokio::spawn(async move {
        match load.await {
            Ok(asset) => {
                debug!(uri = %uri, node = %node.name(), "Mesh attached");
                node.set_content(NodeContent::Mesh(MeshContent {
                    asset: Arc::new(asset),
                    scale,
                    material,
                }));
                progress.send_modify(|p| p.loaded += 1);
            }
            Err(e) => {
                warn!(uri = %uri, node = %node.name(), error = %e, "Failed to load mesh");
                progress.send_modify(|p| p.failed += 1);
            }
        }
    });
}

/// Keep a link node positioned at the latest pose of its frame.
///
/// The task ends once the frame channel closes, or on the first update
/// after the node has been dropped.
fn follow_frame(
    node: WeakSceneNode,
    mut frames: watch::Receiver<Option<Transform>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let latest = *frames.borrow_and_update();
            if let Some(transform) = latest {
                match node.upgrade() {
                    Some(node) => node.set_transform(transform),
                    None => break,
                }
            }
            if frames.changed().await.is_err() {
                break;
            }
        }
    })
}

fn to_vec3(v: [f64; 3]) -> Vec3 {
    Vec3::new(v[0] as f32, v[1] as f32, v[2] as f32)
}

fn to_shape(geometry: &GeometryKind<'_>) -> Option<Shape> {
    match geometry {
        GeometryKind::Box { size } => Some(Shape::Box { size: to_vec3(*size) }),
        GeometryKind::Cylinder { radius, length } => Some(Shape::Cylinder {
            radius: *radius as f32,
            length: *length as f32,
        }),
        GeometryKind::Sphere { radius } => Some(Shape::Sphere {
            radius: *radius as f32,
        }),
        GeometryKind::Mesh { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{MeshAsset, MeshError};
    use crate::node::NodeContent;
    use crate::transform::StaticTransformClient;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use std::collections::HashSet;
    use std::time::Duration;

    const ROBOT: &str = r#"<robot name="rover">
    <material name="red"><color rgba="1 0 0 1"/></material>
    <link name="base_link">
        <visual>
            <geometry><box size="0.4 0.2 0.1"/></geometry>
            <material name="red"/>
        </visual>
        <visual name="lidar">
            <origin xyz="0 0 0.1"/>
            <geometry><mesh filename="package://rover/meshes/lidar.dae"/></geometry>
        </visual>
    </link>
    <joint name="wheel_joint" type="continuous">
        <parent link="base_link"/>
        <child link="wheel"/>
        <origin xyz="0.1 0.15 0"/>
    </joint>
    <link name="wheel">
        <visual>
            <geometry><mesh filename="package://rover/meshes/wheel.stl" scale="2 2 2"/></geometry>
        </visual>
        <visual>
            <geometry><mesh filename="package://rover/meshes/decal.png"/></geometry>
        </visual>
    </link>
    <link name="virtual_frame"/>
</robot>"#;

    /// Loader that serves every supported URI from memory
    struct MemoryLoader {
        failing: HashSet<String>,
    }

    impl MemoryLoader {
        fn new() -> Self {
            Self {
                failing: HashSet::new(),
            }
        }

        fn failing(uri: &str) -> Self {
            Self {
                failing: [uri.to_string()].into_iter().collect(),
            }
        }
    }

    impl MeshLoader for MemoryLoader {
        fn supports(&self, format: MeshFormat) -> bool {
            matches!(format, MeshFormat::Collada | MeshFormat::Stl)
        }

        fn load(&self, uri: &str) -> BoxFuture<'static, Result<MeshAsset, MeshError>> {
            let uri = uri.to_string();
            let fail = self.failing.contains(&uri);
            async move {
                if fail {
                    return Err(MeshError::Unsupported(uri));
                }
                Ok(MeshAsset {
                    format: MeshFormat::from_uri(&uri),
                    uri,
                    data: vec![0u8; 16],
                })
            }
            .boxed()
        }
    }

    fn options(loader: MemoryLoader) -> BuildOptions {
        BuildOptions {
            path: "/srv/robots".to_string(),
            mesh_loader: Arc::new(loader),
            ..BuildOptions::default()
        }
    }

    async fn eventually(check: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check()
    }

    #[test]
    fn test_frame_id() {
        assert_eq!(frame_id("", "base_link"), "base_link");
        assert_eq!(frame_id("robot1", "base_link"), "robot1/base_link");
        assert_eq!(frame_id("robot1/", "base_link"), "robot1/base_link");
    }

    #[tokio::test]
    async fn test_structure_and_shapes() {
        let model = UrdfModel::from_xml(ROBOT).unwrap();
        let scene = build_scene(&model, &options(MemoryLoader::new()));

        assert_eq!(scene.root.name(), "rover");
        // virtual_frame has no visuals and gets no node
        assert_eq!(scene.root.child_count(), 2);

        let base = scene.root.find("base_link").unwrap();
        assert_eq!(base.frame_id().as_deref(), Some("base_link"));
        assert_eq!(base.child_count(), 2);

        let body = scene.root.find("base_link/visual_0").unwrap();
        match body.content() {
            NodeContent::Shape { shape, color } => {
                assert_eq!(shape, Shape::Box { size: Vec3::new(0.4, 0.2, 0.1) });
                assert_eq!(color, Color::rgb(1.0, 0.0, 0.0));
            }
            other => panic!("expected shape, got {:?}", other),
        }

        // The png decal is skipped, leaving only the wheel mesh
        let wheel = scene.root.find("wheel").unwrap();
        assert_eq!(wheel.child_count(), 1);
        assert_eq!(scene.meshes.borrow().total, 2);
    }

    #[tokio::test]
    async fn test_meshes_fill_in() {
        let model = UrdfModel::from_xml(ROBOT).unwrap();
        let mut scene = build_scene(&model, &options(MemoryLoader::new()));

        let progress = scene.meshes_settled().await;
        assert_eq!(progress, MeshProgress { total: 2, loaded: 2, failed: 0 });

        let lidar = scene.root.find("lidar").unwrap();
        assert_eq!(lidar.transform().translation, Vec3::new(0.0, 0.0, 0.1));
        match lidar.content() {
            NodeContent::Mesh(mesh) => {
                assert_eq!(mesh.asset.uri, "/srv/robots/rover/meshes/lidar.dae");
                assert_eq!(mesh.material, MeshMaterial::Native);
            }
            other => panic!("expected mesh, got {:?}", other),
        }

        match scene.root.find("wheel/visual_0").unwrap().content() {
            NodeContent::Mesh(mesh) => assert_eq!(mesh.scale, Vec3::splat(2.0)),
            other => panic!("expected mesh, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_color_override() {
        let model = UrdfModel::from_xml(ROBOT).unwrap();
        let green = Color::rgb(0.0, 1.0, 0.0);
        let opts = BuildOptions {
            color: Some(green),
            ..options(MemoryLoader::new())
        };
        let mut scene = build_scene(&model, &opts);
        scene.meshes_settled().await;

        match scene.root.find("lidar").unwrap().content() {
            NodeContent::Mesh(mesh) => assert_eq!(mesh.material, MeshMaterial::Override(green)),
            other => panic!("expected mesh, got {:?}", other),
        }
        match scene.root.find("base_link/visual_0").unwrap().content() {
            NodeContent::Shape { color, .. } => assert_eq!(color, green),
            other => panic!("expected shape, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_mesh_is_scoped_to_its_visual() {
        let model = UrdfModel::from_xml(ROBOT).unwrap();
        let loader = MemoryLoader::failing("/srv/robots/rover/meshes/wheel.stl");
        let mut scene = build_scene(&model, &options(loader));

        let progress = scene.meshes_settled().await;
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.loaded, 1);

        assert!(scene.root.find("wheel/visual_0").unwrap().content().is_empty());
        assert!(!scene.root.find("lidar").unwrap().content().is_empty());
    }

    #[tokio::test]
    async fn test_rest_pose_without_tf_client() {
        let model = UrdfModel::from_xml(ROBOT).unwrap();
        let scene = build_scene(&model, &options(MemoryLoader::new()));
        let wheel = scene.root.find("wheel").unwrap();
        assert!((wheel.transform().translation - Vec3::new(0.1, 0.15, 0.0)).length() < 1e-6);
    }

    #[tokio::test]
    async fn test_links_follow_tf_client() {
        let model = UrdfModel::from_xml(ROBOT).unwrap();
        let tf = Arc::new(StaticTransformClient::new());
        let opts = BuildOptions {
            tf_client: Some(tf.clone()),
            frame_prefix: "rover1".to_string(),
            ..options(MemoryLoader::new())
        };
        let scene = build_scene(&model, &opts);

        let base = scene.root.find("rover1/base_link").unwrap();
        assert_eq!(base.frame_id().as_deref(), Some("rover1/base_link"));
        assert_eq!(base.transform(), Transform::IDENTITY);

        let target = Transform::from_translation(Vec3::new(3.0, 0.0, 0.0));
        tf.publish("rover1/base_link", target);
        assert!(eventually(|| base.transform() == target).await);

        let moved = Transform::from_translation(Vec3::new(4.0, 1.0, 0.0));
        tf.publish("rover1/base_link", moved);
        assert!(eventually(|| base.transform() == moved).await);
    }

    #[tokio::test]
    async fn test_visual_names_carry_frame_prefix() {
        let model = UrdfModel::from_xml(ROBOT).unwrap();
        let first = build_scene(
            &model,
            &BuildOptions {
                frame_prefix: "rover1".to_string(),
                ..options(MemoryLoader::new())
            },
        );
        let second = build_scene(
            &model,
            &BuildOptions {
                frame_prefix: "rover2/".to_string(),
                ..options(MemoryLoader::new())
            },
        );

        assert!(first.root.find("rover1/base_link/visual_0").is_some());
        assert!(first.root.find("rover1/lidar").is_some());
        assert!(second.root.find("rover2/base_link/visual_0").is_some());
        assert!(second.root.find("rover2/lidar").is_some());
        assert!(first.root.find("base_link/visual_0").is_none());
    }

    #[tokio::test]
    async fn test_unusable_geometry_is_skipped() {
        let xml = r#"<robot name="partial">
    <link name="base_link">
        <visual><geometry><box size="1 1"/></geometry></visual>
        <visual><geometry><sphere radius="0.2"/></geometry></visual>
    </link>
    <link name="ghost">
        <visual><geometry><box size="a b c"/></geometry></visual>
    </link>
</robot>"#;
        let model = UrdfModel::from_xml(xml).unwrap();
        let scene = build_scene(&model, &options(MemoryLoader::new()));

        // ghost has no usable visual left, so it gets no node
        assert_eq!(scene.root.child_count(), 1);
        let base = scene.root.find("base_link").unwrap();
        assert_eq!(base.child_count(), 1);
        assert!(scene.root.find("base_link/visual_1").is_some());
        assert!(scene.root.find("base_link/visual_0").is_none());
    }

    #[tokio::test]
    async fn test_follower_stops_when_scene_dropped() {
        let model = UrdfModel::from_xml(ROBOT).unwrap();
        let tf = Arc::new(StaticTransformClient::new());
        let opts = BuildOptions {
            tf_client: Some(tf.clone()),
            ..options(MemoryLoader::new())
        };
        let mut scene = build_scene(&model, &opts);
        scene.meshes_settled().await;
        assert_eq!(tf.subscriber_count("base_link"), 1);
        assert_eq!(tf.subscriber_count("wheel"), 1);

        drop(scene);
        tf.publish("base_link", Transform::IDENTITY);
        tf.publish("wheel", Transform::IDENTITY);
        assert!(eventually(|| tf.subscriber_count("base_link") == 0).await);
        assert!(eventually(|| tf.subscriber_count("wheel") == 0).await);
    }

    #[tokio::test]
    async fn test_follower_stops_when_frame_channel_closes() {
        let (tx, rx) = watch::channel(None);
        let node = SceneNode::new("base_link");
        let follower = follow_frame(node.downgrade(), rx);

        let target = Transform::from_translation(Vec3::new(0.0, 2.0, 0.0));
        tx.send_replace(Some(target));
        assert!(eventually(|| node.transform() == target).await);

        drop(tx);
        assert!(tokio::time::timeout(Duration::from_secs(1), follower)
            .await
            .is_ok());
        assert_eq!(node.transform(), target);
    }
}
