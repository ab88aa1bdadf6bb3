// Authorization guard: may this actor verify this record right now?

use tracing::debug;

use crate::error::AuthorizationError;
use crate::records::{Actor, LifecycleState, VoucherRecord};

/// Check, in order: not already verified, state is issued, and for
/// restricted roles the record's operator belongs to the actor's association.
/// The first failing check is reported.
pub fn authorize(actor: &Actor, record: &VoucherRecord) -> Result<(), AuthorizationError> {
    if record.verified {
        return Err(AuthorizationError::AlreadyVerified {
            code: record.code.clone(),
            verified_by: record.verified_by.clone(),
            verified_at: record.verified_at,
        });
    }

    if record.state != LifecycleState::Issued {
        return Err(AuthorizationError::InvalidState {
            code: record.code.clone(),
            state: record.state,
        });
    }

    if actor.role.is_restricted() {
        let record_association = record.operator_association_id();
        // A restricted actor without an association matches nothing
        let matches = actor.association_id.is_some() && actor.association_id == record_association;
        if !matches {
            return Err(AuthorizationError::ForbiddenAssociation {
                code: record.code.clone(),
                actor_association: actor.association_id,
                record_association,
            });
        }
    }

    debug!(actor = %actor.id, role = %actor.role, code = %record.code, "Actor authorized");
    Ok(())
}
