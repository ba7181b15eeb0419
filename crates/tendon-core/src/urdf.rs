//! URDF (Unified Robot Description Format) parsing
//!
//! Only the parts needed for visualization are modelled: named materials,
//! links with their visuals, and the joints connecting them. Collision,
//! inertial, gazebo and transmission elements are ignored.

use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

use crate::color::Color;
use crate::pose::{parse_vec3, Pose};

#[derive(Error, Debug)]
pub enum UrdfError {
    #[error("Failed to parse URDF: {0}")]
    ParseError(String),
    #[error("Invalid URDF structure: {0}")]
    ValidationError(String),
}

/// `<origin xyz="..." rpy="..."/>`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Origin {
    #[serde(rename = "@xyz", default)]
    pub xyz: Option<String>,
    #[serde(rename = "@rpy", default)]
    pub rpy: Option<String>,
}

impl Origin {
    pub fn pose(&self) -> Pose {
        Pose::from_attrs(self.xyz.as_deref(), self.rpy.as_deref())
    }
}

/// `<color rgba="r g b a"/>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorElement {
    #[serde(rename = "@rgba")]
    pub rgba: String,
}

/// `<texture filename="..."/>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Texture {
    #[serde(rename = "@filename")]
    pub filename: String,
}

/// Material, either declared at robot level or inline in a visual
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Material {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<ColorElement>,
    #[serde(default)]
    pub texture: Option<Texture>,
}

impl Material {
    /// Parsed color, if the material has a valid `<color>`
    pub fn parse_color(&self) -> Option<Color> {
        let rgba = &self.color.as_ref()?.rgba;
        match Color::parse_rgba(rgba) {
            Ok(color) => Some(color),
            Err(e) => {
                debug!(material = %self.name, rgba = %rgba, error = %e, "Ignoring invalid material color");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxGeometry {
    #[serde(rename = "@size")]
    pub size: String,
}

impl BoxGeometry {
    pub fn parse_size(&self) -> Option<[f64; 3]> {
        parse_vec3(&self.size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CylinderGeometry {
    #[serde(rename = "@radius")]
    pub radius: f64,
    #[serde(rename = "@length")]
    pub length: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SphereGeometry {
    #[serde(rename = "@radius")]
    pub radius: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshGeometry {
    #[serde(rename = "@filename")]
    pub filename: String,
    #[serde(rename = "@scale", default)]
    pub scale: Option<String>,
}

impl MeshGeometry {
    pub fn parse_scale(&self) -> [f64; 3] {
        self.scale
            .as_deref()
            .and_then(parse_vec3)
            .unwrap_or([1.0, 1.0, 1.0])
    }
}

/// `<geometry>` holds exactly one shape element
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "box", default)]
    pub box_geom: Option<BoxGeometry>,
    #[serde(default)]
    pub cylinder: Option<CylinderGeometry>,
    #[serde(default)]
    pub sphere: Option<SphereGeometry>,
    #[serde(default)]
    pub mesh: Option<MeshGeometry>,
}

/// Resolved view over [`Geometry`]
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryKind<'a> {
    Box { size: [f64; 3] },
    Cylinder { radius: f64, length: f64 },
    Sphere { radius: f64 },
    Mesh { filename: &'a str, scale: [f64; 3] },
}

impl Geometry {
    pub fn kind(&self) -> Option<GeometryKind<'_>> {
        if let Some(m) = &self.mesh {
            return Some(GeometryKind::Mesh {
                filename: &m.filename,
                scale: m.parse_scale(),
            });
        }
        if let Some(b) = &self.box_geom {
            return Some(GeometryKind::Box { size: b.parse_size()? });
        }
        if let Some(c) = &self.cylinder {
            return Some(GeometryKind::Cylinder {
                radius: c.radius,
                length: c.length,
            });
        }
        if let Some(s) = &self.sphere {
            return Some(GeometryKind::Sphere { radius: s.radius });
        }
        None
    }
}

/// Visual element of a link
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Visual {
    #[serde(rename = "@name", default)]
    pub name: Option<String>,
    #[serde(default)]
    pub origin: Option<Origin>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub material: Option<Material>,
}

impl Visual {
    pub fn pose(&self) -> Pose {
        self.origin.as_ref().map(Origin::pose).unwrap_or_default()
    }

    pub fn geometry_kind(&self) -> Option<GeometryKind<'_>> {
        self.geometry.as_ref().and_then(Geometry::kind)
    }

    pub fn color(&self) -> Option<Color> {
        self.material.as_ref().and_then(Material::parse_color)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(default)]
    pub visual: Vec<Visual>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRef {
    #[serde(rename = "@link")]
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    #[serde(rename = "@xyz")]
    pub xyz: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Limit {
    #[serde(rename = "@lower", default)]
    pub lower: Option<f64>,
    #[serde(rename = "@upper", default)]
    pub upper: Option<f64>,
    #[serde(rename = "@effort", default)]
    pub effort: Option<f64>,
    #[serde(rename = "@velocity", default)]
    pub velocity: Option<f64>,
}

/// Joint type from the `type` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointType {
    Revolute,
    Continuous,
    Prismatic,
    Fixed,
    Floating,
    Planar,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Joint {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub joint_type: String,
    pub parent: LinkRef,
    pub child: LinkRef,
    #[serde(default)]
    pub origin: Option<Origin>,
    #[serde(default)]
    pub axis: Option<Axis>,
    #[serde(default)]
    pub limit: Option<Limit>,
}

impl Joint {
    pub fn kind(&self) -> JointType {
        match self.joint_type.as_str() {
            "revolute" => JointType::Revolute,
            "continuous" => JointType::Continuous,
            "prismatic" => JointType::Prismatic,
            "fixed" => JointType::Fixed,
            "floating" => JointType::Floating,
            "planar" => JointType::Planar,
            _ => JointType::Unknown,
        }
    }

    pub fn pose(&self) -> Pose {
        self.origin.as_ref().map(Origin::pose).unwrap_or_default()
    }

    /// Joint axis, defaulting to `1 0 0` as URDF does
    pub fn axis(&self) -> [f64; 3] {
        self.axis
            .as_ref()
            .and_then(|a| parse_vec3(&a.xyz))
            .unwrap_or([1.0, 0.0, 0.0])
    }
}

/// Root `<robot>` document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "robot")]
pub struct UrdfModel {
    #[serde(rename = "@name")]
    pub name: String,

    #[serde(default)]
    pub material: Vec<Material>,

    #[serde(default)]
    pub link: Vec<Link>,

    #[serde(default)]
    pub joint: Vec<Joint>,
}

impl UrdfModel {
    /// Parse and validate a URDF document
    pub fn from_xml(xml: &str) -> Result<Self, UrdfError> {
        let mut model: UrdfModel =
            from_str(xml).map_err(|e| UrdfError::ParseError(e.to_string()))?;
        model.validate()?;
        model.resolve_materials();
        debug!(
            robot = %model.name,
            links = model.link.len(),
            joints = model.joint.len(),
            "Parsed URDF"
        );
        Ok(model)
    }

    /// Check names and joint references
    pub fn validate(&self) -> Result<(), UrdfError> {
        if self.name.trim().is_empty() {
            return Err(UrdfError::ValidationError("robot has no name".to_string()));
        }

        let mut names = HashSet::new();
        for link in &self.link {
            if !names.insert(link.name.as_str()) {
                return Err(UrdfError::ValidationError(format!(
                    "duplicate link '{}'",
                    link.name
                )));
            }
        }

        for joint in &self.joint {
            for end in [&joint.parent.link, &joint.child.link] {
                if !names.contains(end.as_str()) {
                    return Err(UrdfError::ValidationError(format!(
                        "joint '{}' references unknown link '{}'",
                        joint.name, end
                    )));
                }
            }
        }
        Ok(())
    }

    /// Fill in visual materials that only reference a robot-level material by name
    pub fn resolve_materials(&mut self) {
        let named: HashMap<String, Material> = self
            .material
            .iter()
            .filter(|m| !m.name.is_empty())
            .map(|m| (m.name.clone(), m.clone()))
            .collect();

        for link in &mut self.link {
            for visual in &mut link.visual {
                let Some(material) = visual.material.as_mut() else {
                    continue;
                };
                if let Some(global) = named.get(&material.name) {
                    if material.color.is_none() {
                        material.color = global.color.clone();
                    }
                    if material.texture.is_none() {
                        material.texture = global.texture.clone();
                    }
                }
            }
        }
    }

    pub fn get_link(&self, name: &str) -> Option<&Link> {
        self.link.iter().find(|l| l.name == name)
    }

    /// Joints whose parent is the given link
    pub fn child_joints<'a>(&'a self, link: &'a str) -> impl Iterator<Item = &'a Joint> + 'a {
        self.joint.iter().filter(move |j| j.parent.link == link)
    }

    /// Links that are not the child of any joint
    pub fn root_links(&self) -> Vec<&Link> {
        let children: HashSet<&str> = self.joint.iter().map(|j| j.child.link.as_str()).collect();
        self.link
            .iter()
            .filter(|l| !children.contains(l.name.as_str()))
            .collect()
    }
}
