//! Resource name derivation and tagging

/// Prefix shared by every resource this tool creates
pub const NAME_PREFIX: &str = "evilian-";

/// Tag key/value marking resource groups created by this tool
pub const CREATED_BY_TAG: (&str, &str) = ("createdBy", "evilian");

/// Tag key holding the project name
pub const PROJECT_TAG_KEY: &str = "project";

/// Names of the resources created for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNameSet {
    pub resource_group: String,
    pub vm_name: String,
    pub nsg_name: String,
}

impl ResourceNameSet {
    /// Derive all names from an already-validated project name
    pub fn derive(project_name: &str) -> Self {
        let name = |suffix: &str| format!("{NAME_PREFIX}{project_name}-{suffix}");
        Self {
            resource_group: name("rg"),
            vm_name: name("vm"),
            nsg_name: name("nsg"),
        }
    }
}

/// Tags placed on the resource group, in `key=value` order
pub fn group_tags(project_name: &str) -> Vec<(String, String)> {
    vec![
        (CREATED_BY_TAG.0.to_string(), CREATED_BY_TAG.1.to_string()),
        (PROJECT_TAG_KEY.to_string(), project_name.to_string()),
    ]
}
