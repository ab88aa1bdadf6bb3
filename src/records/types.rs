// Voucher aggregate, actors and audit entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::extraction::{ExtractionMethod, VoucherCode};

/// Lifecycle of a voucher. Only `Issued` vouchers can be verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Draft,
    InProgress,
    Issued,
    Verified,
    Paid,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Draft => "draft",
            LifecycleState::InProgress => "in_progress",
            LifecycleState::Issued => "issued",
            LifecycleState::Verified => "verified",
            LifecycleState::Paid => "paid",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown value '{value}' for {field}")]
pub struct UnknownVariant {
    pub field: &'static str,
    pub value: String,
}

impl FromStr for LifecycleState {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(LifecycleState::Draft),
            "in_progress" => Ok(LifecycleState::InProgress),
            "issued" => Ok(LifecycleState::Issued),
            "verified" => Ok(LifecycleState::Verified),
            "paid" => Ok(LifecycleState::Paid),
            other => Err(UnknownVariant {
                field: "lifecycle state",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherCategory {
    /// Delivered material (quantities and unit costs)
    Material,
    /// Equipment rental (hours or days)
    Rental,
}

impl VoucherCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherCategory::Material => "material",
            VoucherCategory::Rental => "rental",
        }
    }
}

impl FromStr for VoucherCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "material" => Ok(VoucherCategory::Material),
            "rental" => Ok(VoucherCategory::Rental),
            other => Err(UnknownVariant {
                field: "voucher category",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operator {
    pub id: i64,
    pub name: String,
    /// Organizational group the operator belongs to
    pub association_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub plate: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialLine {
    pub material: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalLine {
    pub description: String,
    pub hours: f64,
    pub days: f64,
    pub unit_cost: f64,
    pub total_cost: f64,
}

/// Fully hydrated voucher as returned by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherRecord {
    pub id: i64,
    pub code: VoucherCode,
    pub state: LifecycleState,
    pub category: VoucherCategory,
    pub operator: Operator,
    pub vehicle: Option<Vehicle>,
    pub created_by: Option<UserRef>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub material_lines: Vec<MaterialLine>,
    #[serde(default)]
    pub rental_lines: Vec<RentalLine>,
    #[serde(default)]
    pub verified: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl VoucherRecord {
    pub fn operator_association_id(&self) -> Option<i64> {
        self.operator.association_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Supervisor,
    Reviewer,
    /// Restricted: may only verify vouchers of its own association
    AssociationMember,
}

impl Role {
    pub fn is_restricted(&self) -> bool {
        matches!(self, Role::AssociationMember)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Supervisor => "supervisor",
            Role::Reviewer => "reviewer",
            Role::AssociationMember => "association_member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "admin" => Ok(Role::Admin),
            "supervisor" => Ok(Role::Supervisor),
            "reviewer" => Ok(Role::Reviewer),
            "association_member" | "association" => Ok(Role::AssociationMember),
            _ => Err(UnknownVariant {
                field: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// Identity performing a verification, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub association_id: Option<i64>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            association_id: None,
        }
    }

    pub fn with_association(mut self, association_id: i64) -> Self {
        self.association_id = Some(association_id);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Verification,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Verification => "verification",
        }
    }
}

/// Request-level details recorded alongside an audit entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Append-only audit record, written once per successful verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub record_id: i64,
    pub actor_id: String,
    pub action: AuditAction,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl AuditEntry {
    pub fn verification(
        record_id: i64,
        actor_id: &str,
        timestamp: DateTime<Utc>,
        client: &ClientMetadata,
        method: Option<ExtractionMethod>,
        correlation_id: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            record_id,
            actor_id: actor_id.to_string(),
            action: AuditAction::Verification,
            timestamp,
            metadata: serde_json::json!({
                "user_agent": client.user_agent,
                "ip_address": client.ip_address,
                "method": method.map(|m| m.as_str()).unwrap_or("manual"),
                "correlation_id": correlation_id,
            }),
        }
    }
}
