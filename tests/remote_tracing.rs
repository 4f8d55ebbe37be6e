//! Remote attribution: handle registration, remote sections and merging.

mod common;

use std::sync::mpsc;
use std::thread;

use covtrace::record::{record_cmp4, record_edge};
use covtrace::remote::in_remote_section;
use covtrace::unit;
use covtrace::{ErrorKind, RemoteHandle, SessionMode, TraceMode};

use common::{collector, init_test, mapped_session};

#[test]
fn section_entries_are_appended_after_existing_ones() {
    init_test("section_entries_are_appended_after_existing_ones");
    let collector = collector();
    let (handle, mapping) = mapped_session(&collector, 16);
    let usb = RemoteHandle::usb(1).raw();

    handle.enable(TraceMode::Edges).expect("enable");
    record_edge(0x1);
    record_edge(0x2);
    handle.disable().expect("disable");

    handle
        .remote_enable(TraceMode::Edges, 8, &[usb])
        .expect("remote enable");
    thread::scope(|scope| {
        scope.spawn(|| {
            collector.remote_start(usb);
            assert!(in_remote_section());
            assert_eq!(unit::current_mode(), SessionMode::TraceEdges);
            record_edge(0xa);
            record_edge(0xb);
            record_edge(0xc);
            collector.remote_stop();
            assert!(!in_remote_section());
        });
    });

    assert_eq!(mapping.edges(), vec![0x1, 0x2, 0xa, 0xb, 0xc]);
    let stats = collector.stats();
    assert_eq!(stats.sections_merged, 1);
    assert_eq!(stats.entries_merged, 3);
    handle.disable().expect("disable");
}

#[test]
fn merge_is_truncated_to_free_capacity() {
    init_test("merge_is_truncated_to_free_capacity");
    let collector = collector();
    let (handle, mapping) = mapped_session(&collector, 4);
    let usb = RemoteHandle::usb(2).raw();

    handle.enable(TraceMode::Edges).expect("enable");
    record_edge(0x1);
    record_edge(0x2);
    handle.disable().expect("disable");

    handle
        .remote_enable(TraceMode::Edges, 8, &[usb])
        .expect("remote enable");
    thread::scope(|scope| {
        scope.spawn(|| {
            collector.remote_start(usb);
            for site in 0x10..0x15 {
                record_edge(site);
            }
            collector.remote_stop();
        });
    });

    assert_eq!(mapping.snapshot(), vec![3, 0x1, 0x2, 0x10]);
    handle.disable().expect("disable");
}

#[test]
fn comparison_sections_merge_whole_entries() {
    init_test("comparison_sections_merge_whole_entries");
    let collector = collector();
    let (handle, mapping) = mapped_session(&collector, 1 + 4 * 2);
    let h = RemoteHandle::common(11).raw();

    handle
        .remote_enable(TraceMode::Comparisons, 1 + 4 * 3, &[h])
        .expect("remote enable");
    thread::scope(|scope| {
        scope.spawn(|| {
            collector.remote_start(h);
            record_cmp4(1, 2, 0x10);
            record_cmp4(3, 4, 0x20);
            record_cmp4(5, 6, 0x30);
            collector.remote_stop();
        });
    });

    let entries = mapping.comparisons();
    assert_eq!(entries.len(), 2);
    assert_eq!((entries[0].arg1, entries[1].arg1), (1, 3));
    handle.disable().expect("disable");
}

#[test]
fn section_outliving_its_epoch_is_discarded() {
    init_test("section_outliving_its_epoch_is_discarded");
    let collector = collector();
    let (handle, mapping) = mapped_session(&collector, 16);
    let usb = RemoteHandle::usb(3).raw();

    handle
        .remote_enable(TraceMode::Edges, 8, &[usb])
        .expect("remote enable");
    assert_eq!(handle.sequence(), 1);

    let (started_tx, started_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    thread::scope(|scope| {
        let collector = &collector;
        scope.spawn(move || {
            collector.remote_start(usb);
            record_edge(0xdead);
            started_tx.send(()).expect("send");
            stop_rx.recv().expect("recv");
            collector.remote_stop();
        });

        started_rx.recv().expect("recv");
        handle.disable().expect("disable");
        assert_eq!(handle.sequence(), 2);
        assert_eq!(handle.mode(), SessionMode::Init);
        // Handle, plus the in-flight section.
        assert_eq!(handle.refcount(), 2);
        stop_tx.send(()).expect("send");
    });

    assert_eq!(mapping.count(), 0);
    assert_eq!(handle.refcount(), 1);
    let stats = collector.stats();
    assert_eq!(stats.sections_discarded, 1);
    assert_eq!(stats.sections_merged, 0);
    assert_eq!(collector.idle_scratch_areas(), 1);
}

#[test]
fn duplicate_handle_never_moves_to_second_session() {
    init_test("duplicate_handle_never_moves_to_second_session");
    let collector = collector();
    let (first, _m1) = mapped_session(&collector, 16);
    let (second, _m2) = mapped_session(&collector, 16);
    let h1 = RemoteHandle::usb(5).raw();
    let h2 = RemoteHandle::usb(6).raw();
    let h3 = RemoteHandle::usb(7).raw();

    first
        .remote_enable(TraceMode::Edges, 8, &[h1, h2])
        .expect("remote enable");

    thread::scope(|scope| {
        scope.spawn(|| {
            let err = second
                .remote_enable(TraceMode::Edges, 8, &[h3, h2])
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AlreadyRegistered);
            assert!(err.kind().is_busy());
            assert!(!unit::is_bound());
        });
    });

    assert_eq!(
        first.remote_handles(),
        vec![RemoteHandle::usb(5), RemoteHandle::usb(6)]
    );
    assert!(second.remote_handles().is_empty());
    assert!(!collector.is_registered(h3));
    assert_eq!(second.mode(), SessionMode::Init);
    assert!(!second.is_remote());
    assert_eq!(second.owner(), None);
    assert_eq!(second.refcount(), 1);
    first.disable().expect("disable");
}

#[test]
fn bound_unit_cannot_start_a_section() {
    init_test("bound_unit_cannot_start_a_section");
    let collector = collector();
    let (remote, remote_map) = mapped_session(&collector, 16);
    let (local, local_map) = mapped_session(&collector, 16);
    let h = RemoteHandle::common(1).raw();

    thread::scope(|scope| {
        scope.spawn(|| {
            remote
                .remote_enable(TraceMode::Edges, 8, &[h])
                .expect("remote enable");
            // The registering unit is itself bound.
            collector.remote_start(h);
            assert!(!in_remote_section());
            remote.disable().expect("disable");
        });
    });
    remote
        .remote_enable(TraceMode::Edges, 8, &[h])
        .expect("remote enable");

    thread::scope(|scope| {
        scope.spawn(|| {
            local.enable(TraceMode::Edges).expect("enable");
            collector.remote_start(h);
            record_edge(0x77);
            collector.remote_stop();
            local.disable().expect("disable");
        });
    });

    assert_eq!(local_map.edges(), vec![0x77]);
    assert_eq!(remote_map.count(), 0);
    assert_eq!(collector.stats().remote_start_rejected, 2);
    remote.disable().expect("disable");
}

#[test]
fn interrupt_context_cannot_start_a_section() {
    init_test("interrupt_context_cannot_start_a_section");
    let collector = collector();
    let (handle, _mapping) = mapped_session(&collector, 16);
    let h = RemoteHandle::common(2).raw();
    handle
        .remote_enable(TraceMode::Edges, 8, &[h])
        .expect("remote enable");

    thread::scope(|scope| {
        scope.spawn(|| {
            let _irq = unit::enter_interrupt();
            collector.remote_start(h);
            assert!(!in_remote_section());
        });
    });

    let stats = collector.stats();
    assert_eq!(stats.remote_start_rejected, 1);
    assert_eq!(stats.sections_started, 0);
    assert_eq!(handle.refcount(), 2);
    handle.disable().expect("disable");
}

#[test]
fn scratch_areas_are_reused() {
    init_test("scratch_areas_are_reused");
    let collector = collector();
    let (handle, mapping) = mapped_session(&collector, 64);
    let h = RemoteHandle::common(3).raw();
    handle
        .remote_enable(TraceMode::Edges, 8, &[h])
        .expect("remote enable");

    thread::scope(|scope| {
        scope.spawn(|| {
            for round in 0..3u64 {
                collector.remote_start(h);
                record_edge(0x100 + round);
                collector.remote_stop();
            }
        });
    });

    assert_eq!(mapping.edges(), vec![0x100, 0x101, 0x102]);
    let stats = collector.stats();
    assert_eq!(stats.scratch_allocated, 1);
    assert_eq!(stats.scratch_reused, 2);
    assert_eq!(collector.idle_scratch_areas(), 1);
    handle.disable().expect("disable");
}

#[test]
fn stop_without_section_is_a_no_op() {
    init_test("stop_without_section_is_a_no_op");
    let collector = collector();
    let (handle, mapping) = mapped_session(&collector, 8);

    covtrace::remote_stop();
    handle.enable(TraceMode::Edges).expect("enable");
    // A local binding is not a remote section.
    covtrace::remote_stop();
    record_edge(0x1);
    handle.disable().expect("disable");
    assert_eq!(mapping.edges(), vec![0x1]);
}
