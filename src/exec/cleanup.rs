// src/exec/cleanup.rs

//! Environment cleanup: remove every unit podflow created.

use tracing::{info, warn};

use crate::errors::Result;
use crate::exec::backend::Executor;
use crate::exec::unit::Selector;

/// Delete every unit labelled `App=podflow`.
///
/// Units that disappear between listing and deletion are skipped. Other
/// failures are logged; the first one is returned after every unit was
/// attempted. Returns the number of deleted units.
pub async fn cleanup_environment(executor: &dyn Executor) -> Result<usize> {
    let units = executor.list_units(&Selector::app()).await?;
    info!(count = units.len(), "cleaning up podflow units");

    let mut deleted = 0;
    let mut first_err = None;
    for unit in units {
        match executor.delete_unit(&unit.name, &unit.namespace).await {
            Ok(()) => deleted += 1,
            Err(e) if e.is_not_found() => {
                info!(unit = %unit.name, "unit already gone");
            }
            Err(e) => {
                warn!(unit = %unit.name, error = %e, "failed to delete unit during cleanup");
                first_err.get_or_insert(e);
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(deleted),
    }
}
