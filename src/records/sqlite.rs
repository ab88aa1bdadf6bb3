// SQLite-backed voucher store and audit sink

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, warn};

use super::store::{AuditError, AuditSink, StoreError, VerifyOutcome, VoucherStore};
use super::types::{
    AuditEntry, LifecycleState, Operator, UserRef, Vehicle, VoucherCategory, VoucherRecord,
};
use crate::extraction::VoucherCode;

const SELECT_HYDRATED: &str = r#"
SELECT
    v.id, v.code, v.state, v.category, v.created_at, v.verified, v.verified_by, v.verified_at, v.notes,
    o.id AS operator_id, o.name AS operator_name, o.association_id,
    vh.id AS vehicle_id, vh.plate AS vehicle_plate, vh.description AS vehicle_description,
    u.id AS creator_id, u.full_name AS creator_name,
    (SELECT json_group_array(json_object(
        'material', m.material, 'quantity', m.quantity, 'unit', m.unit,
        'unit_cost', m.unit_cost, 'total_cost', m.total_cost))
     FROM material_lines m WHERE m.voucher_id = v.id) AS material_lines,
    (SELECT json_group_array(json_object(
        'description', r.description, 'hours', r.hours, 'days', r.days,
        'unit_cost', r.unit_cost, 'total_cost', r.total_cost))
     FROM rental_lines r WHERE r.voucher_id = v.id) AS rental_lines
FROM vouchers v
JOIN operators o ON o.id = v.operator_id
LEFT JOIN vehicles vh ON vh.id = v.vehicle_id
LEFT JOIN users u ON u.id = v.created_by
WHERE v.code = ?
"#;

pub struct SqliteVoucherStore {
    pool: SqlitePool,
}

impl SqliteVoucherStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a fully hydrated record together with its operator, vehicle,
    /// creator and line items. Used for seeding and tests.
    pub async fn insert(&self, record: &VoucherRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR REPLACE INTO operators (id, name, association_id) VALUES (?, ?, ?)")
            .bind(record.operator.id)
            .bind(&record.operator.name)
            .bind(record.operator.association_id)
            .execute(&mut *tx)
            .await?;

        if let Some(vehicle) = &record.vehicle {
            sqlx::query("INSERT OR REPLACE INTO vehicles (id, plate, description) VALUES (?, ?, ?)")
                .bind(vehicle.id)
                .bind(&vehicle.plate)
                .bind(&vehicle.description)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(user) = &record.created_by {
            sqlx::query("INSERT OR REPLACE INTO users (id, full_name) VALUES (?, ?)")
                .bind(&user.id)
                .bind(&user.full_name)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO vouchers (id, code, state, category, operator_id, vehicle_id, created_by, \
             created_at, verified, verified_by, verified_at, notes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(record.code.as_str())
        .bind(record.state.as_str())
        .bind(record.category.as_str())
        .bind(record.operator.id)
        .bind(record.vehicle.as_ref().map(|v| v.id))
        .bind(record.created_by.as_ref().map(|u| u.id.clone()))
        .bind(record.created_at.to_rfc3339())
        .bind(record.verified)
        .bind(&record.verified_by)
        .bind(record.verified_at.map(|t| t.to_rfc3339()))
        .bind(&record.notes)
        .execute(&mut *tx)
        .await?;

        for line in &record.material_lines {
            sqlx::query(
                "INSERT INTO material_lines (voucher_id, material, quantity, unit, unit_cost, total_cost) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(record.id)
            .bind(&line.material)
            .bind(line.quantity)
            .bind(&line.unit)
            .bind(line.unit_cost)
            .bind(line.total_cost)
            .execute(&mut *tx)
            .await?;
        }

        for line in &record.rental_lines {
            sqlx::query(
                "INSERT INTO rental_lines (voucher_id, description, hours, days, unit_cost, total_cost) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(record.id)
            .bind(&line.description)
            .bind(line.hours)
            .bind(line.days)
            .bind(line.unit_cost)
            .bind(line.total_cost)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn parse_lines<T: DeserializeOwned>(column: &str, raw: Option<String>) -> Result<Vec<T>, StoreError> {
    match raw {
        Some(json) => {
            serde_json::from_str(&json).map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
        }
        None => Ok(Vec::new()),
    }
}

fn record_from_row(row: &SqliteRow) -> Result<VoucherRecord, StoreError> {
    let code: String = row.try_get("code")?;
    let state: String = row.try_get("state")?;
    let category: String = row.try_get("category")?;
    let created_at: String = row.try_get("created_at")?;
    let verified_at: Option<String> = row.try_get("verified_at")?;

    let vehicle = match row.try_get::<Option<i64>, _>("vehicle_id")? {
        Some(id) => Some(Vehicle {
            id,
            plate: row.try_get("vehicle_plate")?,
            description: row.try_get("vehicle_description")?,
        }),
        None => None,
    };

    let created_by = match row.try_get::<Option<String>, _>("creator_id")? {
        Some(id) => Some(UserRef {
            id,
            full_name: row.try_get("creator_name")?,
        }),
        None => None,
    };

    Ok(VoucherRecord {
        id: row.try_get("id")?,
        code: VoucherCode::parse(&code).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        state: state
            .parse::<LifecycleState>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        category: category
            .parse::<VoucherCategory>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        operator: Operator {
            id: row.try_get("operator_id")?,
            name: row.try_get("operator_name")?,
            association_id: row.try_get("association_id")?,
        },
        vehicle,
        created_by,
        created_at: parse_timestamp("created_at", &created_at)?,
        material_lines: parse_lines("material_lines", row.try_get("material_lines")?)?,
        rental_lines: parse_lines("rental_lines", row.try_get("rental_lines")?)?,
        verified: row.try_get("verified")?,
        verified_by: row.try_get("verified_by")?,
        verified_at: verified_at
            .as_deref()
            .map(|raw| parse_timestamp("verified_at", raw))
            .transpose()?,
        notes: row.try_get("notes")?,
    })
}

#[async_trait]
impl VoucherStore for SqliteVoucherStore {
    async fn get_by_code(&self, code: &VoucherCode) -> Result<Option<VoucherRecord>, StoreError> {
        let row = sqlx::query(SELECT_HYDRATED)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn verify(&self, code: &VoucherCode, actor_id: &str) -> Result<VerifyOutcome, StoreError> {
        let verified_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE vouchers SET verified = 1, state = 'verified', verified_by = ?, verified_at = ? \
             WHERE code = ? AND state = 'issued' AND verified = 0",
        )
        .bind(actor_id)
        .bind(verified_at.to_rfc3339())
        .bind(code.as_str())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "SELECT id, state, verified, verified_by, verified_at FROM vouchers WHERE code = ?",
        )
        .bind(code.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        let Some(row) = row else {
            return Ok(VerifyOutcome::NotFound);
        };
        let record_id: i64 = row.try_get("id")?;

        if updated.rows_affected() == 1 {
            debug!(code = %code, record_id, "Voucher marked verified");
            return Ok(VerifyOutcome::Verified {
                record_id,
                verified_at,
            });
        }

        let verified: bool = row.try_get("verified")?;
        if verified {
            let stored_at: Option<String> = row.try_get("verified_at")?;
            return Ok(VerifyOutcome::AlreadyVerified {
                verified_by: row.try_get("verified_by")?,
                verified_at: stored_at
                    .as_deref()
                    .map(|raw| parse_timestamp("verified_at", raw))
                    .transpose()?,
            });
        }

        let state: String = row.try_get("state")?;
        let state = state
            .parse::<LifecycleState>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        warn!(code = %code, state = %state, "Verification re-check rejected voucher state");
        Ok(VerifyOutcome::InvalidState(state))
    }
}

#[async_trait]
impl AuditSink for SqliteVoucherStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            "INSERT INTO audit_log (id, voucher_id, actor_id, action, created_at, metadata) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.record_id)
        .bind(&entry.actor_id)
        .bind(entry.action.as_str())
        .bind(entry.timestamp.to_rfc3339())
        .bind(entry.metadata.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use crate::records::test_support::issued_record;
    use crate::records::ClientMetadata;

    async fn audit_count(store: &SqliteVoucherStore, record_id: i64) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_log WHERE voucher_id = ?")
            .bind(record_id)
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    async fn store_in(dir: &tempfile::TempDir) -> SqliteVoucherStore {
        let url = format!("sqlite://{}", dir.path().join("vouchers.db").display());
        let manager = DatabaseManager::new(&url, 4, true).await.unwrap();
        SqliteVoucherStore::new(manager.pool().clone())
    }

    #[tokio::test]
    async fn test_get_by_code_hydrates_relations() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let record = issued_record("CP-143-00001", Some(3));
        store.insert(&record).await.unwrap();

        let loaded = store.get_by_code(&record.code).await.unwrap().unwrap();
        assert_eq!(loaded, record);

        let missing = VoucherCode::parse("CP-143-99999").unwrap();
        assert!(store.get_by_code(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verify_is_conditional() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let record = issued_record("CP-143-00002", None);
        store.insert(&record).await.unwrap();

        let first = store.verify(&record.code, "user-1").await.unwrap();
        assert!(matches!(first, VerifyOutcome::Verified { record_id: 1, .. }));

        let second = store.verify(&record.code, "user-2").await.unwrap();
        match second {
            VerifyOutcome::AlreadyVerified { verified_by, .. } => {
                assert_eq!(verified_by.as_deref(), Some("user-1"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let loaded = store.get_by_code(&record.code).await.unwrap().unwrap();
        assert_eq!(loaded.state, LifecycleState::Verified);
        assert!(loaded.verified);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verify_has_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(store_in(&dir).await);
        let record = issued_record("CP-143-00005", None);
        store.insert(&record).await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let code = record.code.clone();
                tokio::spawn(async move { store.verify(&code, &format!("user-{i}")).await })
            })
            .collect();

        let mut verified = 0;
        let mut already = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                VerifyOutcome::Verified { .. } => verified += 1,
                VerifyOutcome::AlreadyVerified { .. } => already += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(verified, 1);
        assert_eq!(already, 15);

        let loaded = store.get_by_code(&record.code).await.unwrap().unwrap();
        assert!(loaded.verified);
        assert!(loaded.verified_by.unwrap().starts_with("user-"));
    }

    #[tokio::test]
    async fn test_verify_rejects_draft() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let mut record = issued_record("CP-143-00003", None);
        record.state = LifecycleState::Draft;
        store.insert(&record).await.unwrap();

        let outcome = store.verify(&record.code, "user-1").await.unwrap();
        assert_eq!(outcome, VerifyOutcome::InvalidState(LifecycleState::Draft));
    }

    #[tokio::test]
    async fn test_audit_append_persists_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let record = issued_record("CP-143-00004", None);
        store.insert(&record).await.unwrap();

        let entry = AuditEntry::verification(
            record.id,
            "user-1",
            Utc::now(),
            &ClientMetadata::default(),
            None,
            "corr-1",
        );
        store.append(entry).await.unwrap();
        assert_eq!(audit_count(&store, record.id).await, 1);
    }
}
