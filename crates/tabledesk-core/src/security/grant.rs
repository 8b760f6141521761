//! Access grants and grant resolution.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use super::Role;

/// Error parsing a grant or a role.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseGrantError {
    /// The grant is not `subject:table:role`.
    #[error("invalid grant format '{0}', expected subject:table:role")]
    InvalidFormat(String),

    /// The role name is not known.
    #[error("unknown role: {0}")]
    UnknownRole(String),
}

/// Subject or table side of a grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum GrantScope {
    /// Wildcard `*`.
    Any,
    /// One named subject or table.
    Named(String),
}

impl GrantScope {
    /// Parse a scope, treating `*` as the wildcard.
    pub fn parse(s: &str) -> Self {
        match s {
            "*" => GrantScope::Any,
            name => GrantScope::Named(name.to_string()),
        }
    }

    /// Check if this scope matches the given name.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            GrantScope::Any => true,
            GrantScope::Named(n) => n == name,
        }
    }

    /// Check if this is the wildcard.
    pub fn is_any(&self) -> bool {
        matches!(self, GrantScope::Any)
    }

    /// Text form: `*` or the name.
    pub fn as_str(&self) -> &str {
        match self {
            GrantScope::Any => "*",
            GrantScope::Named(n) => n,
        }
    }
}

impl From<GrantScope> for String {
    fn from(scope: GrantScope) -> Self {
        scope.as_str().to_string()
    }
}

/// A role granted to a subject on a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AccessGrant {
    /// Subject identifier or `*`.
    pub subject: GrantScope,
    /// Table name or `*`.
    pub table: GrantScope,
    /// Granted role.
    pub role: Role,
}

impl AccessGrant {
    /// Create a grant from text scopes.
    pub fn new(subject: &str, table: &str, role: Role) -> Self {
        Self {
            subject: GrantScope::parse(subject),
            table: GrantScope::parse(table),
            role,
        }
    }

    /// Check if the grant applies to the subject and table.
    pub fn matches(&self, subject: &str, table: &str) -> bool {
        self.subject.matches(subject) && self.table.matches(table)
    }

    /// Precedence rank: a named subject outranks a named table, both outrank
    /// wildcards.
    pub fn specificity(&self) -> u8 {
        let subject = if self.subject.is_any() { 0 } else { 2 };
        let table = if self.table.is_any() { 0 } else { 1 };
        subject + table
    }
}

impl FromStr for AccessGrant {
    type Err = ParseGrantError;

    /// Parse `subject:table:role`. The subject may itself contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().rsplitn(3, ':');
        let role = parts.next();
        let table = parts.next();
        let subject = parts.next();

        match (subject, table, role) {
            (Some(subject), Some(table), Some(role))
                if !subject.is_empty() && !table.is_empty() =>
            {
                Ok(AccessGrant::new(subject, table, role.parse()?))
            }
            _ => Err(ParseGrantError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for AccessGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.subject.as_str(),
            self.table.as_str(),
            self.role
        )
    }
}

/// An ordered set of grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GrantSet {
    grants: Vec<AccessGrant>,
}

impl GrantSet {
    /// Create an empty grant set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a grant set from a list of grants.
    pub fn from_grants(grants: Vec<AccessGrant>) -> Self {
        Self { grants }
    }

    /// Parse grants from `subject:table:role` strings.
    pub fn from_strings(strings: &[&str]) -> Result<Self, ParseGrantError> {
        let grants = strings
            .iter()
            .map(|s| s.parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { grants })
    }

    /// Append a grant.
    pub fn add(&mut self, grant: AccessGrant) {
        self.grants.push(grant);
    }

    /// Effective role of a subject on a table.
    ///
    /// The most specific matching grant wins; among equally specific grants
    /// the later one wins. No match means `Role::None`.
    pub fn effective_role(&self, subject: &str, table: &str) -> Role {
        let mut best: Option<&AccessGrant> = None;
        for grant in self.grants.iter().filter(|g| g.matches(subject, table)) {
            if best.map_or(true, |b| grant.specificity() >= b.specificity()) {
                best = Some(grant);
            }
        }
        best.map(|g| g.role).unwrap_or(Role::None)
    }

    /// Iterate over the grants in order.
    pub fn iter(&self) -> impl Iterator<Item = &AccessGrant> {
        self.grants.iter()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Get the number of grants.
    pub fn len(&self) -> usize {
        self.grants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grant() {
        let grant: AccessGrant = "alice@example.com:orders:editor".parse().unwrap();
        assert_eq!(grant.subject, GrantScope::Named("alice@example.com".into()));
        assert_eq!(grant.table, GrantScope::Named("orders".into()));
        assert_eq!(grant.role, Role::Editor);
        assert_eq!(grant.to_string(), "alice@example.com:orders:editor");

        let grant: AccessGrant = "*:*:viewer".parse().unwrap();
        assert!(grant.subject.is_any() && grant.table.is_any());

        let grant: AccessGrant = "urn:svc:batch:orders:viewer".parse().unwrap();
        assert_eq!(grant.subject.as_str(), "urn:svc:batch");
    }

    #[test]
    fn test_parse_grant_errors() {
        assert!(matches!(
            "alice:orders".parse::<AccessGrant>(),
            Err(ParseGrantError::InvalidFormat(_))
        ));
        assert!(matches!(
            ":orders:viewer".parse::<AccessGrant>(),
            Err(ParseGrantError::InvalidFormat(_))
        ));
        assert!(matches!(
            "alice:orders:owner".parse::<AccessGrant>(),
            Err(ParseGrantError::UnknownRole(_))
        ));
    }

    #[test]
    fn test_specificity_order() {
        let ranks: Vec<u8> = ["a:t:viewer", "a:*:viewer", "*:t:viewer", "*:*:viewer"]
            .iter()
            .map(|s| s.parse::<AccessGrant>().unwrap().specificity())
            .collect();
        assert_eq!(ranks, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_most_specific_grant_wins() {
        let grants =
            GrantSet::from_strings(&["alice:orders:editor", "*:orders:viewer"]).unwrap();
        assert_eq!(grants.effective_role("alice", "orders"), Role::Editor);
        assert_eq!(grants.effective_role("bob", "orders"), Role::Viewer);
        assert_eq!(grants.effective_role("bob", "invoices"), Role::None);

        // A narrower grant may also lower the role.
        let grants = GrantSet::from_strings(&["*:*:editor", "carol:*:none"]).unwrap();
        assert_eq!(grants.effective_role("carol", "orders"), Role::None);
        assert_eq!(grants.effective_role("dave", "orders"), Role::Editor);
    }

    #[test]
    fn test_later_grant_wins_ties() {
        let grants = GrantSet::from_strings(&["alice:orders:viewer", "alice:orders:auditor"])
            .unwrap();
        assert_eq!(grants.effective_role("alice", "orders"), Role::Auditor);
    }

    #[test]
    fn test_anonymous_subject_matches_only_wildcards() {
        let grants = GrantSet::from_strings(&["alice:*:editor", "*:public:viewer"]).unwrap();
        assert_eq!(grants.effective_role("", "public"), Role::Viewer);
        assert_eq!(grants.effective_role("", "orders"), Role::None);
    }
}
