pub mod docs;
pub mod error;
pub mod iam;
pub mod resource;
pub mod template;
pub mod validation;

pub use docs::{extract_links, lint_doc_index, DocLink, DEFAULT_QUICKSTART_TOPICS};
pub use error::{IamError, ResourceError, TemplateError};
pub use iam::{IamPolicy, IamPolicyBinding, IamPolicyMember, MemberType};
pub use resource::{create_resource, load_all, pluralize, type_from_name, Resource, ResourceType};
pub use template::{
    lint_template_schema, parse_parameter_value, parse_template_schema, resolve_parameters,
    ParameterResolution, PropertySchema, PropertyType, TemplateInfo, TemplateSchema,
};
pub use validation::{has_errors, Diagnostic, DiagnosticLevel, LintReport};
