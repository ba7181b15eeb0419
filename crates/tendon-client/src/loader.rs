//! Robot model loader
//!
//! [`ModelLoader::new`] issues a single fetch of the robot description and
//! returns straight away. When the fetch completes the description is
//! parsed, the scene subtree is built and, unless the loader is hidden, the
//! subtree is attached to the target root.
//!
//! [`ModelLoader::add`] and [`ModelLoader::remove`] act on the built subtree
//! only. Before it exists they do nothing; calls are never queued and
//! replayed later.

use std::sync::{Arc, OnceLock};
use tendon_core::{Color, UrdfError, UrdfModel};
use tendon_scene::{
    build_scene, BuildOptions, MeshLoader, MeshProgress, SceneNode, StandardMeshLoader,
    TransformClient, UrdfScene,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::store::{ParamStore, StoreError};

/// Parameter holding the robot description unless configured otherwise
pub const DEFAULT_PARAM: &str = "robot_description";

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to fetch robot description: {0}")]
    Fetch(#[from] StoreError),
    #[error("Failed to parse robot description: {0}")]
    Parse(#[from] UrdfError),
}

/// Progress of the one fetch a loader performs
#[derive(Debug, Clone)]
pub enum LoadStatus {
    Pending,
    Loaded,
    Failed(Arc<LoadError>),
}

impl LoadStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, LoadStatus::Pending)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadStatus::Loaded)
    }
}

/// Everything a [`ModelLoader`] needs, captured at construction
#[derive(Clone)]
pub struct LoaderConfig {
    pub store: Arc<dyn ParamStore>,
    /// Parameter name of the description
    pub param: String,
    /// Leave the model detached once loaded
    pub hidden: bool,
    /// Base path or URL for mesh resources
    pub path: String,
    pub frame_prefix: String,
    /// Flat colour replacing every material; `None` keeps native materials
    pub color: Option<Color>,
    /// Node the model is attached to
    pub root: SceneNode,
    pub tf_client: Option<Arc<dyn TransformClient>>,
    pub mesh_loader: Arc<dyn MeshLoader>,
}

impl LoaderConfig {
    pub fn new(store: Arc<dyn ParamStore>) -> Self {
        Self {
            store,
            param: DEFAULT_PARAM.to_string(),
            hidden: false,
            path: "/".to_string(),
            frame_prefix: String::new(),
            color: None,
            root: SceneNode::new("root"),
            tf_client: None,
            mesh_loader: Arc::new(StandardMeshLoader::new()),
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = param.into();
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_frame_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.frame_prefix = prefix.into();
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_root(mut self, root: SceneNode) -> Self {
        self.root = root;
        self
    }

    pub fn with_tf_client(mut self, client: Arc<dyn TransformClient>) -> Self {
        self.tf_client = Some(client);
        self
    }

    pub fn with_mesh_loader(mut self, loader: Arc<dyn MeshLoader>) -> Self {
        self.mesh_loader = loader;
        self
    }

    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            path: self.path.clone(),
            tf_client: self.tf_client.clone(),
            frame_prefix: self.frame_prefix.clone(),
            mesh_loader: self.mesh_loader.clone(),
            color: self.color,
        }
    }
}

struct Shared {
    root: SceneNode,
    model: OnceLock<SceneNode>,
    meshes: OnceLock<watch::Receiver<MeshProgress>>,
    status: watch::Sender<LoadStatus>,
}

/// Loads one robot description into a scene
pub struct ModelLoader {
    shared: Arc<Shared>,
    param: String,
    fetch: JoinHandle<()>,
}

impl ModelLoader {
    /// Start loading. The fetch is requested before this returns, but
    /// nothing waits for it.
    ///
    /// Must be called from within a Tokio runtime. Dropping the loader
    /// leaves the fetch running, so a visible model still gets attached.
    pub fn new(config: LoaderConfig) -> Self {
        let (status, _) = watch::channel(LoadStatus::Pending);
        let shared = Arc::new(Shared {
            root: config.root.clone(),
            model: OnceLock::new(),
            meshes: OnceLock::new(),
            status,
        });

        info!(param = %config.param, hidden = config.hidden, "Requesting robot description");
        let request = config.store.get(&config.param);
        let options = config.build_options();
        let param = config.param.clone();
        let hidden = config.hidden;
        let task_shared = shared.clone();

        let fetch = tokio::spawn(async move {
            let shared = task_shared;
            let outcome = match request.await {
                Ok(xml) => UrdfModel::from_xml(&xml).map_err(LoadError::from),
                Err(e) => Err(LoadError::from(e)),
            };

            let model = match outcome {
                Ok(model) => model,
                Err(e) => {
                    error!(param = %param, error = %e, "Failed to load robot description");
                    shared.status.send_replace(LoadStatus::Failed(Arc::new(e)));
                    return;
                }
            };

            let UrdfScene { root, meshes } = build_scene(&model, &options);
            let _ = shared.meshes.set(meshes);
            if shared.model.set(root.clone()).is_err() {
                return;
            }
            if !hidden {
                shared.root.add_child(&root);
            }
            info!(
                param = %param,
                robot = %model.name,
                links = model.link.len(),
                joints = model.joint.len(),
                attached = !hidden,
                "Robot model loaded"
            );
            shared.status.send_replace(LoadStatus::Loaded);
        });

        Self {
            shared,
            param: config.param,
            fetch,
        }
    }

    /// Attach the model to the root. No-op until the model is loaded, and
    /// when it is already attached.
    pub fn add(&self) {
        if let Some(model) = self.shared.model.get() {
            if self.shared.root.add_child(model) {
                debug!(param = %self.param, "Attached robot model");
            }
        }
    }

    /// Detach the model from the root. No-op until the model is loaded, and
    /// when it is not attached.
    pub fn remove(&self) {
        if let Some(model) = self.shared.model.get() {
            if self.shared.root.remove_child(model) {
                debug!(param = %self.param, "Detached robot model");
            }
        }
    }

    /// The built subtree, once loaded
    pub fn model(&self) -> Option<SceneNode> {
        self.shared.model.get().cloned()
    }

    pub fn root(&self) -> &SceneNode {
        &self.shared.root
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    pub fn is_attached(&self) -> bool {
        self.shared
            .model
            .get()
            .is_some_and(|model| self.shared.root.contains_child(model))
    }

    pub fn status(&self) -> LoadStatus {
        self.shared.status.borrow().clone()
    }

    /// Receiver that changes exactly once, when the fetch settles
    pub fn subscribe(&self) -> watch::Receiver<LoadStatus> {
        self.shared.status.subscribe()
    }

    /// Whether the fetch task has run to completion
    pub fn fetch_finished(&self) -> bool {
        self.fetch.is_finished()
    }

    /// Wait for the fetch to settle. Never resolves if the store never
    /// answers.
    pub async fn loaded(&self) -> Result<SceneNode, Arc<LoadError>> {
        let mut status = self.subscribe();
        let settled = match status.wait_for(|s| !s.is_pending()).await {
            Ok(settled) => settled.clone(),
            // The sender lives in `self`, so the channel cannot close here
            Err(_) => return std::future::pending().await,
        };
        match settled {
            LoadStatus::Failed(e) => Err(e),
            _ => match self.model() {
                Some(model) => Ok(model),
                None => std::future::pending().await,
            },
        }
    }

    /// Wait for every mesh of the loaded model to load or fail.
    /// Returns `None` when the model has not been loaded.
    pub async fn meshes_settled(&self) -> Option<MeshProgress> {
        let mut meshes = self.shared.meshes.get()?.clone();
        if let Ok(progress) = meshes.wait_for(MeshProgress::is_settled).await {
            return Some(*progress);
        }
        let progress = *meshes.borrow();
        Some(progress)
    }
}
