// Record builders shared by unit tests

use chrono::{TimeZone, Utc};

use super::types::*;
use crate::extraction::VoucherCode;

pub fn issued_record(code: &str, association_id: Option<i64>) -> VoucherRecord {
    VoucherRecord {
        id: 1,
        code: VoucherCode::parse(code).unwrap(),
        state: LifecycleState::Issued,
        category: VoucherCategory::Material,
        operator: Operator {
            id: 10,
            name: "Transportes del Valle".to_string(),
            association_id,
        },
        vehicle: Some(Vehicle {
            id: 5,
            plate: "ABC-1234".to_string(),
            description: Some("Volteo 14 m3".to_string()),
        }),
        created_by: Some(UserRef {
            id: "creator-1".to_string(),
            full_name: "Ana Ruiz".to_string(),
        }),
        created_at: Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap(),
        material_lines: vec![MaterialLine {
            material: "Grava".to_string(),
            quantity: 14.0,
            unit: "m3".to_string(),
            unit_cost: 250.0,
            total_cost: 3500.0,
        }],
        rental_lines: Vec::new(),
        verified: false,
        verified_by: None,
        verified_at: None,
        notes: None,
    }
}

pub fn restricted_actor(association_id: i64) -> Actor {
    Actor::new("member-1", Role::AssociationMember).with_association(association_id)
}
