use indexmap::IndexMap;
use serde::Serialize;

use super::error::ContainerError;
use super::value::Value;

/// The NeXus class given to groups created only as parents of another group
const IMPLICIT_CLASS: &str = "NXcollection";

/// Container is the output side of a writer callback: a tree of groups addressed by
/// absolute `/`-separated paths, each holding datasets and attributes.
pub trait Container {
    /// Create the group at path (and any missing parents). Creating an existing group
    /// only updates its class and description.
    fn make_group(&mut self, path: &str, nx_class: &str, description: &str)
        -> Result<(), ContainerError>;

    /// Write (or overwrite) a dataset in an existing group
    fn write_dataset(&mut self, group: &str, name: &str, value: Value) -> Result<(), ContainerError>;

    /// Write (or overwrite) an attribute of an existing group
    fn write_attribute(&mut self, group: &str, name: &str, value: Value)
        -> Result<(), ContainerError>;

    /// Write (or overwrite) an attribute of an existing dataset
    fn write_dataset_attribute(
        &mut self,
        group: &str,
        dataset: &str,
        name: &str,
        value: Value,
    ) -> Result<(), ContainerError>;

    /// Write every entry of a mapping as a dataset of the group
    fn write_dict(
        &mut self,
        group: &str,
        entries: &IndexMap<String, Value>,
    ) -> Result<(), ContainerError> {
        for (name, value) in entries {
            self.write_dataset(group, name, value.clone())?;
        }
        Ok(())
    }
}

/// Join a child name onto a group path
pub fn join_path(parent: &str, child: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), child)
}

fn split_path(path: &str) -> Result<Vec<&str>, ContainerError> {
    if !path.starts_with('/') {
        return Err(ContainerError::BadPath(path.to_string()));
    }
    Ok(path.split('/').filter(|part| !part.is_empty()).collect())
}

/// One group of a TreeContainer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Group {
    pub nx_class: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub datasets: IndexMap<String, Value>,
    /// Attributes of the datasets, by dataset name
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub dataset_attributes: IndexMap<String, IndexMap<String, Value>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub groups: IndexMap<String, Group>,
}

impl Group {
    fn new(nx_class: &str) -> Self {
        Self {
            nx_class: nx_class.to_string(),
            ..Default::default()
        }
    }
}

/// An in-memory Container. Groups and datasets keep their creation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeContainer {
    root: Group,
}

impl Default for TreeContainer {
    fn default() -> Self {
        Self {
            root: Group::new("NXroot"),
        }
    }
}

impl TreeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    /// The group at path, if it exists
    pub fn group(&self, path: &str) -> Option<&Group> {
        let parts = split_path(path).ok()?;
        let mut group = &self.root;
        for part in parts {
            group = group.groups.get(part)?;
        }
        Some(group)
    }

    fn group_mut(&mut self, path: &str) -> Result<&mut Group, ContainerError> {
        let parts = split_path(path)?;
        let mut group = &mut self.root;
        for part in parts {
            group = group
                .groups
                .get_mut(part)
                .ok_or_else(|| ContainerError::MissingGroup(path.to_string()))?;
        }
        Ok(group)
    }

    /// Convenience read of a dataset
    pub fn dataset(&self, group: &str, name: &str) -> Option<&Value> {
        self.group(group)?.datasets.get(name)
    }
}

impl Container for TreeContainer {
    fn make_group(
        &mut self,
        path: &str,
        nx_class: &str,
        description: &str,
    ) -> Result<(), ContainerError> {
        let parts = split_path(path)?;
        let mut group = &mut self.root;
        for part in parts {
            group = group
                .groups
                .entry(part.to_string())
                .or_insert_with(|| Group::new(IMPLICIT_CLASS));
        }
        group.nx_class = nx_class.to_string();
        group.description = description.to_string();
        Ok(())
    }

    fn write_dataset(&mut self, group: &str, name: &str, value: Value) -> Result<(), ContainerError> {
        self.group_mut(group)?.datasets.insert(name.to_string(), value);
        Ok(())
    }

    fn write_attribute(
        &mut self,
        group: &str,
        name: &str,
        value: Value,
    ) -> Result<(), ContainerError> {
        self.group_mut(group)?.attributes.insert(name.to_string(), value);
        Ok(())
    }

    fn write_dataset_attribute(
        &mut self,
        group: &str,
        dataset: &str,
        name: &str,
        value: Value,
    ) -> Result<(), ContainerError> {
        let target = self.group_mut(group)?;
        if !target.datasets.contains_key(dataset) {
            return Err(ContainerError::MissingDataset(
                group.to_string(),
                dataset.to_string(),
            ));
        }
        target
            .dataset_attributes
            .entry(dataset.to_string())
            .or_default()
            .insert(name.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_group_creates_parents() {
        let mut container = TreeContainer::new();
        container
            .make_group("/S1/instrument/geometry_parameters", "NXnote", "")
            .unwrap();
        assert_eq!(container.group("/S1").map(|g| g.nx_class.as_str()), Some(IMPLICIT_CLASS));
        assert_eq!(
            container
                .group("/S1/instrument/geometry_parameters")
                .map(|g| g.nx_class.as_str()),
            Some("NXnote")
        );

        container.make_group("/S1", "NXentry", "scan 1").unwrap();
        let entry = container.group("/S1").unwrap();
        assert_eq!(entry.nx_class, "NXentry");
        assert_eq!(entry.groups.len(), 1);
    }

    #[test]
    fn test_datasets() {
        let mut container = TreeContainer::new();
        assert!(matches!(
            container.write_dataset("/S1", "title", Value::from("x")),
            Err(ContainerError::MissingGroup(_))
        ));
        assert!(matches!(
            container.make_group("S1", "NXentry", ""),
            Err(ContainerError::BadPath(_))
        ));

        container.make_group("/S1", "NXentry", "").unwrap();
        let mut entries = IndexMap::new();
        entries.insert(String::from("b"), Value::from(2.0));
        entries.insert(String::from("a"), Value::from(1.0));
        container.write_dict("/S1", &entries).unwrap();
        container.write_dataset("/S1", "b", Value::from(3.0)).unwrap();

        let names: Vec<&String> = container.group("/S1").unwrap().datasets.keys().collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(container.dataset("/S1", "b"), Some(&Value::Number(3.0)));
        assert_eq!(join_path("/S1/", "data"), "/S1/data");
    }

    #[test]
    fn test_dataset_attributes() {
        let mut container = TreeContainer::new();
        container.make_group("/S1/data", "NXdata", "").unwrap();
        assert!(matches!(
            container.write_dataset_attribute("/S1/data", "_mca_", "units", Value::from("counts")),
            Err(ContainerError::MissingDataset(_, name)) if name == "_mca_"
        ));

        container
            .write_dataset("/S1/data", "_mca_", Value::from(vec![1.0, 2.0]))
            .unwrap();
        container
            .write_dataset_attribute("/S1/data", "_mca_", "units", Value::from("counts"))
            .unwrap();
        let group = container.group("/S1/data").unwrap();
        assert!(group.attributes.is_empty());
        assert_eq!(
            group.dataset_attributes.get("_mca_").and_then(|a| a.get("units")),
            Some(&Value::from("counts"))
        );
    }
}
