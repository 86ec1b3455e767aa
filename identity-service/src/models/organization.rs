//! Organization (tenant) and membership models.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Organization {
    pub organization_id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub created_utc: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: String, created_by: Uuid) -> Self {
        Self {
            organization_id: Uuid::new_v4(),
            name,
            created_by,
            created_utc: Utc::now(),
        }
    }
}

/// Association of an identity with the organization it belongs to.
#[derive(Debug, Clone, FromRow)]
pub struct OrganizationMember {
    pub membership_id: Uuid,
    pub organization_id: Uuid,
    pub identity_id: Uuid,
    pub is_admin: bool,
    pub is_billing: bool,
    pub can_invite: bool,
    pub created_utc: DateTime<Utc>,
}

impl OrganizationMember {
    /// Membership for the identity that created the organization: full rights.
    pub fn owner(organization_id: Uuid, identity_id: Uuid) -> Self {
        Self {
            membership_id: Uuid::new_v4(),
            organization_id,
            identity_id,
            is_admin: true,
            is_billing: true,
            can_invite: true,
            created_utc: Utc::now(),
        }
    }

    pub fn roles(&self) -> Vec<String> {
        let mut roles = Vec::new();
        if self.is_admin {
            roles.push("org:admin".to_string());
        }
        if self.is_billing {
            roles.push("org:billing".to_string());
        }
        if self.can_invite {
            roles.push("org:invite".to_string());
        }
        roles
    }
}
