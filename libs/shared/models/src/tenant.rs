use std::fmt;

use serde::{Deserialize, Serialize};

/// Clinic a request, row or background job belongs to.
///
/// Every store call takes one of these explicitly; nothing reads the tenant
/// from ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= 64
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        valid.then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_slugs_and_uuids() {
        assert!(TenantId::parse("clinic-a").is_some());
        assert!(TenantId::parse("3f1c9a7e-2b7d-4d0c-9a59-1a1d2f7c0e11").is_some());
        assert_eq!(TenantId::parse(" clinic_b ").unwrap().as_str(), "clinic_b");
    }

    #[test]
    fn test_parse_rejects_query_injection() {
        assert!(TenantId::parse("").is_none());
        assert!(TenantId::parse("a&tenant_id=eq.b").is_none());
        assert!(TenantId::parse("clinic a").is_none());
    }
}
