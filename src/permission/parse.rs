//! Permission strings: `resource_type[:resource_id].action`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid permission '{input}': {reason}")]
pub struct ParsePermissionError {
    pub input: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
}

impl Permission {
    /// Parse `resource_type[:resource_id].action`.
    ///
    /// The action follows the last `.`; the resource id follows the first `:`.
    pub fn parse(input: &str) -> Result<Self, ParsePermissionError> {
        let fail = |reason| ParsePermissionError {
            input: input.to_string(),
            reason,
        };

        let (resource, action) = input.rsplit_once('.').ok_or_else(|| fail("missing action"))?;
        let (resource_type, resource_id) = match resource.split_once(':') {
            Some((ty, id)) => (ty, Some(id)),
            None => (resource, None),
        };

        if !is_token(action) {
            return Err(fail("empty or invalid action"));
        }
        if !is_token(resource_type) {
            return Err(fail("empty or invalid resource type"));
        }
        if let Some(id) = resource_id {
            if !is_token(id) {
                return Err(fail("empty or invalid resource id"));
            }
        }

        Ok(Self {
            resource_type: resource_type.to_string(),
            resource_id: resource_id.map(str::to_string),
            action: action.to_string(),
        })
    }

    /// Whether a coarse granted permission covers this one.
    ///
    /// A grant without a resource id (or with `*`) covers every id of its type.
    pub fn covered_by(&self, granted: &Permission) -> bool {
        if granted.resource_type != self.resource_type || granted.action != self.action {
            return false;
        }
        match (&granted.resource_id, &self.resource_id) {
            (None, _) => true,
            (Some(g), _) if g == "*" => true,
            (Some(g), Some(r)) => g == r,
            (Some(_), None) => false,
        }
    }

    /// Check against token-embedded grants; unparseable grants are ignored.
    pub fn granted_by<S: AsRef<str>>(&self, grants: &[S]) -> bool {
        grants
            .iter()
            .filter_map(|g| Permission::parse(g.as_ref()).ok())
            .any(|g| self.covered_by(&g))
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && !s.chars().any(char::is_whitespace)
}

impl FromStr for Permission {
    type Err = ParsePermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::parse(s)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource_id {
            Some(id) => write!(f, "{}:{}.{}", self.resource_type, id, self.action),
            None => write!(f, "{}.{}", self.resource_type, self.action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let p = Permission::parse("document.read").unwrap();
        assert_eq!(p.resource_type, "document");
        assert_eq!(p.resource_id, None);
        assert_eq!(p.action, "read");

        let p = Permission::parse("document:42.write").unwrap();
        assert_eq!(p.resource_id.as_deref(), Some("42"));
        assert_eq!(p.action, "write");

        // Action follows the last dot.
        let p = Permission::parse("file:report.v2.pdf.download").unwrap();
        assert_eq!(p.resource_id.as_deref(), Some("report.v2.pdf"));
        assert_eq!(p.action, "download");
        assert_eq!(p.to_string(), "file:report.v2.pdf.download");
    }

    #[test]
    fn test_malformed() {
        for input in ["", "document", ".read", "document.", "document:.read", ":1.read", "doc ument.read"] {
            assert!(Permission::parse(input).is_err(), "{:?} should be rejected", input);
        }
    }

    #[test]
    fn test_coverage() {
        let wanted = Permission::parse("document:42.read").unwrap();
        assert!(wanted.granted_by(&["document.read"]));
        assert!(wanted.granted_by(&["document:*.read"]));
        assert!(wanted.granted_by(&["document:42.read"]));
        assert!(!wanted.granted_by(&["document:43.read"]));
        assert!(!wanted.granted_by(&["document.write"]));
        assert!(!wanted.granted_by(&["not a permission"]));

        let type_wide = Permission::parse("document.read").unwrap();
        assert!(!type_wide.granted_by(&["document:42.read"]));
    }
}
