//! Remote section start and stop.

use crate::area::TraceArea;
use crate::collector::CollectorShared;
use crate::session::OwnerKind;
use crate::tracing_compat::{trace, warn};
use crate::unit::{self, HeldArea, UnitSlot};

use super::RemoteHandle;

/// Starts a remote section for `raw` on the calling thread.
pub(crate) fn start(shared: &CollectorShared, raw: u64) {
    let _ = unit::with_current(|unit| start_on(shared, unit, raw));
}

fn start_on(shared: &CollectorShared, unit: &UnitSlot, raw: u64) {
    if !unit.in_task() {
        warn!(handle = raw, unit = %unit.id(), "remote start from interrupt context ignored");
        shared.stats.remote_start_rejected();
        return;
    }
    if unit.has_session() {
        warn!(handle = raw, unit = %unit.id(), "remote start on an already bound unit ignored");
        shared.stats.remote_start_rejected();
        return;
    }

    let handle = RemoteHandle::from_raw(raw);
    let (entry, pooled) = {
        let mut remote = shared.remote.lock();
        let Some(entry) = remote.directory.find(handle).cloned() else {
            shared.stats.remote_start_missed();
            return;
        };
        // Released in `finish`.
        entry.session.get(OwnerKind::RemoteSection);
        let pooled = remote.pool.take(entry.remote_words);
        (entry, pooled)
    };

    let area = if let Some(area) = pooled {
        shared.stats.scratch_reused();
        area
    } else {
        match TraceArea::zeroed(entry.remote_words) {
            Ok(area) => {
                shared.stats.scratch_allocated();
                area
            }
            Err(err) => {
                warn!(handle = %handle, error = %err, "scratch allocation failed, section not recorded");
                shared.stats.scratch_alloc_failed();
                entry.session.put(OwnerKind::RemoteSection);
                return;
            }
        }
    };
    area.reset_count();

    let (ptr, words) = (area.as_ptr(), area.len_words());
    unit.hold(HeldArea::Scratch(area));
    unit.set_session(entry.session);
    unit.start(words, ptr, entry.mode, entry.sequence, shared.config.address_bias);
    shared.stats.section_started();
    trace!(handle = %handle, unit = %unit.id(), sequence = entry.sequence, "remote section started");
}

/// Ends the calling thread's remote section.
pub(crate) fn stop() {
    let _ = unit::with_current(|unit| {
        if unit.in_task() {
            finish(unit);
        }
    });
}

/// Unbinds the unit's scratch area and hands it to the session for merging.
/// Does nothing unless the unit is inside a remote section.
pub(crate) fn finish(unit: &UnitSlot) {
    if !unit.in_remote_section() {
        return;
    }
    let sequence = unit.snapshot().sequence;
    unit.stop();
    let held = unit.take_held();
    let session = unit.take_session();
    if let (Some(HeldArea::Scratch(area)), Some(session)) = (held, session) {
        session.finish_section(area, sequence);
    }
}
