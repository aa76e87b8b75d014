use crate::error::ResourceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Organization,
    Folder,
    Project,
    BackendService,
}

struct ResourceTypeDef {
    resource_type: ResourceType,
    name: &'static str,
    plural: &'static str,
    can_create_resource: bool,
}

const RESOURCE_TYPES: &[ResourceTypeDef] = &[
    ResourceTypeDef {
        resource_type: ResourceType::Organization,
        name: "organization",
        plural: "Organizations",
        can_create_resource: true,
    },
    ResourceTypeDef {
        resource_type: ResourceType::Folder,
        name: "folder",
        plural: "Folders",
        can_create_resource: true,
    },
    ResourceTypeDef {
        resource_type: ResourceType::Project,
        name: "project",
        plural: "Projects",
        can_create_resource: true,
    },
    ResourceTypeDef {
        resource_type: ResourceType::BackendService,
        name: "backend_service",
        plural: "Backend Services",
        can_create_resource: false,
    },
];

impl ResourceType {
    pub fn all() -> impl Iterator<Item = ResourceType> {
        RESOURCE_TYPES.iter().map(|def| def.resource_type)
    }

    fn def(self) -> &'static ResourceTypeDef {
        let index = match self {
            ResourceType::Organization => 0,
            ResourceType::Folder => 1,
            ResourceType::Project => 2,
            ResourceType::BackendService => 3,
        };
        &RESOURCE_TYPES[index]
    }

    pub fn as_str(self) -> &'static str {
        self.def().name
    }

    pub fn can_create_resource(self) -> bool {
        self.def().can_create_resource
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RESOURCE_TYPES
            .iter()
            .find(|def| def.name == s)
            .map(|def| def.resource_type)
            .ok_or_else(|| ResourceError::UnknownType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub lifecycle_state: Option<String>,
}

impl Resource {
    fn new(id: &str, resource_type: ResourceType) -> Self {
        Self {
            id: id.to_string(),
            resource_type,
            name: format!("{}/{}", resource_name_prefix(resource_type), id),
            display_name: None,
            parent: None,
            lifecycle_state: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_parent(mut self, parent: &Resource) -> Self {
        self.parent = Some(parent.name.clone());
        self
    }

    pub fn with_lifecycle_state(mut self, state: impl Into<String>) -> Self {
        self.lifecycle_state = Some(state.into());
        self
    }
}

fn resource_name_prefix(resource_type: ResourceType) -> String {
    pluralize(resource_type).to_lowercase().replace(' ', "_")
}

pub fn create_resource(id: &str, resource_type: ResourceType) -> Option<Resource> {
    if !resource_type.can_create_resource() {
        return None;
    }
    Some(Resource::new(id, resource_type))
}

pub fn pluralize(resource_type: ResourceType) -> &'static str {
    resource_type.def().plural
}

pub fn type_from_name(resource_name: &str) -> Option<ResourceType> {
    if resource_name.is_empty() {
        return None;
    }
    RESOURCE_TYPES
        .iter()
        .find(|def| resource_name.starts_with(&resource_name_prefix(def.resource_type)))
        .map(|def| def.resource_type)
}

// Entries whose type is not modeled here (buckets, instances, ...) are skipped.
pub fn load_all(path: &Path, resource_type: ResourceType) -> Result<Vec<Resource>, ResourceError> {
    let path_display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| ResourceError::Io {
        path: path_display.clone(),
        source,
    })?;
    let inventory: Vec<Value> =
        serde_json::from_str(&content).map_err(|source| ResourceError::Inventory {
            path: path_display.clone(),
            source,
        })?;

    let total = inventory.len();
    let mut resources = Vec::new();
    for entry in inventory {
        let entry_type = entry.get("type").and_then(Value::as_str).unwrap_or_default();
        match entry_type.parse::<ResourceType>() {
            Ok(parsed) if parsed == resource_type => {}
            Ok(_) => continue,
            Err(_) => {
                tracing::debug!(path = %path_display, entry_type, "skipping unmodeled inventory entry");
                continue;
            }
        }
        let mut resource: Resource =
            serde_json::from_value(entry).map_err(|source| ResourceError::Inventory {
                path: path_display.clone(),
                source,
            })?;
        if resource.name.is_empty() {
            resource.name = format!("{}/{}", resource_name_prefix(resource_type), resource.id);
        }
        resources.push(resource);
    }

    if resources.is_empty() {
        tracing::warn!(path = %path_display, %resource_type, "no resources of this type in inventory");
    } else {
        tracing::debug!(
            path = %path_display,
            %resource_type,
            loaded = resources.len(),
            total,
            "loaded resources"
        );
    }

    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn creates_hierarchy_resources_only() {
        let org = create_resource("660570133860", ResourceType::Organization)
            .expect("organizations are creatable");
        assert_eq!(org.name, "organizations/660570133860");

        let project = create_resource("my-project", ResourceType::Project)
            .expect("projects are creatable")
            .with_parent(&org)
            .with_lifecycle_state("ACTIVE");
        assert_eq!(project.parent.as_deref(), Some("organizations/660570133860"));

        assert!(create_resource("bs-1", ResourceType::BackendService).is_none());
    }

    #[test]
    fn pluralizes_every_type() {
        assert_eq!(pluralize(ResourceType::Organization), "Organizations");
        assert_eq!(pluralize(ResourceType::Folder), "Folders");
        assert_eq!(pluralize(ResourceType::Project), "Projects");
        assert_eq!(pluralize(ResourceType::BackendService), "Backend Services");
    }

    #[test]
    fn type_from_name_uses_plural_prefix() {
        assert_eq!(type_from_name("organizations/1"), Some(ResourceType::Organization));
        assert_eq!(type_from_name("folders/22"), Some(ResourceType::Folder));
        assert_eq!(type_from_name("projects/abc"), Some(ResourceType::Project));
        assert_eq!(
            type_from_name("backend_services/7"),
            Some(ResourceType::BackendService)
        );
        assert_eq!(type_from_name(""), None);
        assert_eq!(type_from_name("buckets/x"), None);
    }

    #[test]
    fn parses_type_names() {
        assert_eq!(
            "backend_service".parse::<ResourceType>().expect("known type"),
            ResourceType::BackendService
        );
        let err = "bucket".parse::<ResourceType>().expect_err("unknown type");
        assert!(matches!(err, ResourceError::UnknownType(name) if name == "bucket"));
        assert_eq!(ResourceType::all().count(), 4);
    }

    #[test]
    fn load_all_filters_by_type() {
        let path = std::env::temp_dir().join(format!("gcpsec-inventory-{}.json", std::process::id()));
        let inventory = r#"[
  {"id": "1", "type": "organization", "display_name": "Company"},
  {"id": "p1", "type": "project", "parent": "organizations/1"},
  {"id": "p2", "type": "project", "name": "projects/p2", "lifecycle_state": "ACTIVE"}
]"#;
        fs::write(&path, inventory).expect("failed to write inventory");

        let projects = load_all(&path, ResourceType::Project).expect("inventory loads");
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].name, "projects/p1");
        assert_eq!(projects[1].lifecycle_state.as_deref(), Some("ACTIVE"));

        let folders = load_all(&path, ResourceType::Folder).expect("inventory loads");
        assert!(folders.is_empty());

        fs::remove_file(&path).ok();
    }

    #[test]
    fn load_all_skips_unmodeled_types() {
        let path = std::env::temp_dir().join(format!("gcpsec-mixed-{}.json", std::process::id()));
        let inventory = r#"[
  {"id": "p1", "type": "project"},
  {"id": "b1", "type": "bucket"},
  {"id": "i1", "type": "instance", "zone": "us-central1-a"},
  {"id": "untyped"}
]"#;
        fs::write(&path, inventory).expect("failed to write inventory");

        let projects = load_all(&path, ResourceType::Project).expect("mixed inventory loads");
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "projects/p1");

        fs::remove_file(&path).ok();
    }

    #[test]
    fn load_all_rejects_malformed_matching_entry() {
        let path = std::env::temp_dir().join(format!("gcpsec-broken-{}.json", std::process::id()));
        fs::write(&path, r#"[{"type": "folder"}]"#).expect("failed to write inventory");

        let err = load_all(&path, ResourceType::Folder).expect_err("folder without id");
        assert!(matches!(err, ResourceError::Inventory { .. }));

        fs::remove_file(&path).ok();
    }

    #[test]
    fn load_all_reports_missing_file() {
        let path = std::env::temp_dir().join("gcpsec-inventory-does-not-exist.json");
        let err = load_all(&path, ResourceType::Project).expect_err("missing file");
        assert!(matches!(err, ResourceError::Io { .. }));
    }
}
