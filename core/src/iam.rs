use crate::error::IamError;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const MEMBER_TYPES: &[&str] = &[
    "user",
    "group",
    "serviceAccount",
    "domain",
    "allUsers",
    "allAuthenticatedUsers",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberType {
    User,
    Group,
    ServiceAccount,
    Domain,
    AllUsers,
    AllAuthenticatedUsers,
}

impl MemberType {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberType::User => "user",
            MemberType::Group => "group",
            MemberType::ServiceAccount => "serviceAccount",
            MemberType::Domain => "domain",
            MemberType::AllUsers => "allUsers",
            MemberType::AllAuthenticatedUsers => "allAuthenticatedUsers",
        }
    }

    pub fn is_named(self) -> bool {
        !matches!(self, MemberType::AllUsers | MemberType::AllAuthenticatedUsers)
    }
}

impl FromStr for MemberType {
    type Err = IamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MemberType::User),
            "group" => Ok(MemberType::Group),
            "serviceAccount" => Ok(MemberType::ServiceAccount),
            "domain" => Ok(MemberType::Domain),
            "allUsers" => Ok(MemberType::AllUsers),
            "allAuthenticatedUsers" => Ok(MemberType::AllAuthenticatedUsers),
            other => Err(IamError::InvalidMember(format!(
                "unknown member type '{}' (expected one of {})",
                other,
                MEMBER_TYPES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for MemberType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Each `*` matches one or more characters.
fn wildcard_pattern(name: &str) -> Regex {
    let escaped = regex::escape(name).replace(r"\*", ".+");
    Regex::new(&format!("^{}$", escaped)).expect("escaped wildcard pattern is valid")
}

#[derive(Debug, Clone)]
pub struct IamPolicyMember {
    pub member_type: MemberType,
    pub name: Option<String>,
    pub name_pattern: Option<Regex>,
}

impl IamPolicyMember {
    pub fn new(member_type: &str, name: Option<&str>) -> Result<Self, IamError> {
        let member_type: MemberType = member_type.parse()?;
        let name = name.map(str::trim).filter(|name| !name.is_empty());
        if member_type.is_named() && name.is_none() {
            return Err(IamError::InvalidMember(format!(
                "member type '{}' requires a name",
                member_type
            )));
        }
        let name = if member_type.is_named() { name } else { None };

        Ok(Self {
            member_type,
            name: name.map(str::to_string),
            name_pattern: name.map(wildcard_pattern),
        })
    }

    pub fn create_from(member: &str) -> Result<Self, IamError> {
        match member.split_once(':') {
            Some((member_type, name)) => Self::new(member_type, Some(name)),
            None => Self::new(member, None),
        }
    }

    fn matches_domain(&self, other: &IamPolicyMember) -> bool {
        let (Some(domain), Some(other_name)) = (self.name.as_deref(), other.name.as_deref())
        else {
            return false;
        };
        match other.member_type {
            MemberType::Domain => other_name == domain,
            MemberType::User | MemberType::Group | MemberType::ServiceAccount => other_name
                .rsplit_once('@')
                .map(|(_, other_domain)| other_domain == domain)
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn matches(&self, other: &str) -> bool {
        match IamPolicyMember::create_from(other) {
            Ok(other) => self.matches_member(&other),
            Err(err) => {
                tracing::debug!(member = other, %err, "cannot match unparsable member");
                false
            }
        }
    }

    pub fn matches_member(&self, other: &IamPolicyMember) -> bool {
        match self.member_type {
            MemberType::AllUsers => true,
            MemberType::AllAuthenticatedUsers => other.member_type != MemberType::AllUsers,
            MemberType::Domain if self.matches_domain(other) => true,
            member_type => {
                member_type == other.member_type
                    && match (&self.name_pattern, other.name.as_deref()) {
                        (Some(pattern), Some(name)) => pattern.is_match(name),
                        _ => false,
                    }
            }
        }
    }
}

impl PartialEq for IamPolicyMember {
    fn eq(&self, other: &Self) -> bool {
        self.member_type == other.member_type && self.name == other.name
    }
}

impl Eq for IamPolicyMember {}

impl fmt::Display for IamPolicyMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{}", self.member_type, name),
            None => write!(f, "{}", self.member_type),
        }
    }
}

impl Serialize for IamPolicyMember {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IamPolicyBinding {
    #[serde(rename = "role")]
    pub role_name: String,
    #[serde(skip)]
    pub role_pattern: Regex,
    pub members: Vec<IamPolicyMember>,
}

impl IamPolicyBinding {
    pub fn new(role_name: &str, members: Vec<IamPolicyMember>) -> Result<Self, IamError> {
        let role_name = role_name.trim();
        if role_name.is_empty() {
            return Err(IamError::InvalidBinding("role is missing".to_string()));
        }
        if members.is_empty() {
            return Err(IamError::InvalidBinding(format!(
                "role '{}' has no members",
                role_name
            )));
        }
        Ok(Self {
            role_name: role_name.to_string(),
            role_pattern: wildcard_pattern(role_name),
            members,
        })
    }

    pub fn create_from(binding: &Value) -> Result<Self, IamError> {
        let role = binding
            .get("role")
            .and_then(Value::as_str)
            .ok_or_else(|| IamError::InvalidBinding("role is missing".to_string()))?;
        let members = match binding.get("members") {
            Some(Value::Array(members)) => members
                .iter()
                .map(|member| {
                    member
                        .as_str()
                        .ok_or_else(|| {
                            IamError::InvalidMember(format!("expected a string, got {}", member))
                        })
                        .and_then(IamPolicyMember::create_from)
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(IamError::InvalidBinding(format!(
                    "members of role '{}' must be a list, got {}",
                    role, other
                )))
            }
            None => Vec::new(),
        };
        Self::new(role, members)
    }

    pub fn matches_role(&self, role: &str) -> bool {
        self.role_pattern.is_match(role)
    }

    pub fn find_member(&self, member: &str) -> Option<&IamPolicyMember> {
        self.members.iter().find(|candidate| candidate.matches(member))
    }

    /// Returns false, leaving members untouched, when the roles differ.
    pub fn merge_members(&mut self, other: &IamPolicyBinding) -> bool {
        if self.role_name != other.role_name {
            return false;
        }
        for member in &other.members {
            if !self.members.contains(member) {
                self.members.push(member.clone());
            }
        }
        true
    }
}

impl PartialEq for IamPolicyBinding {
    fn eq(&self, other: &Self) -> bool {
        self.role_name == other.role_name && self.members == other.members
    }
}

impl fmt::Display for IamPolicyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<String> = self.members.iter().map(ToString::to_string).collect();
        write!(f, "{}: [{}]", self.role_name, members.join(", "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IamPolicy {
    pub bindings: Vec<IamPolicyBinding>,
}

impl IamPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_from(policy: &Value) -> Result<Self, IamError> {
        let Some(object) = policy.as_object() else {
            return Err(IamError::InvalidPolicy(format!(
                "expected an object, got {}",
                policy
            )));
        };
        let bindings = match object.get("bindings") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(bindings)) => bindings
                .iter()
                .map(IamPolicyBinding::create_from)
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(IamError::InvalidPolicy(format!(
                    "bindings must be a list, got {}",
                    other
                )))
            }
        };
        Ok(Self { bindings })
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn find_member_bindings(&self, member: &str) -> Vec<&IamPolicyBinding> {
        self.bindings
            .iter()
            .filter(|binding| binding.find_member(member).is_some())
            .collect()
    }
}
