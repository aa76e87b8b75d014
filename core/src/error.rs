#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to parse template schema: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("template schema must be a mapping at the top level")]
    NotAMapping,
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("unknown resource type '{0}'")]
    UnknownType(String),
    #[error("failed to read inventory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse inventory {path}: {source}")]
    Inventory {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IamError {
    #[error("invalid IAM policy: {0}")]
    InvalidPolicy(String),
    #[error("invalid IAM policy binding: {0}")]
    InvalidBinding(String),
    #[error("invalid IAM policy member: {0}")]
    InvalidMember(String),
}
