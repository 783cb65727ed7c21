//! End-to-end scheduling scenarios on a simulated machine
//!
//! Each test boots a kernel on `SimPlatform`, drives cores through
//! `monitor` / `thread_call_sched` the way interrupt and syscall paths
//! would, and checks who runs where.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use common::{boot, call, tick_through, C0};
use k2sched::kern::{
    CoreRun, EventChange, IciKind, ItemOutput, KernError, RunState, SchedItem, ThreadAttr,
    TlbRequest, WaitRequest,
};
use k2sched::types::{AffinityMask, CoreIndex, ObjRef, Priority};

fn attr(prio: u8) -> ThreadAttr {
    ThreadAttr::new(Priority(prio))
}

#[test]
fn test_sleep_resumes_after_deadline() {
    let k = boot(1);
    let p = k.create_process().expect("process");
    let a = k.create_thread(p, attr(10)).expect("thread");
    assert_eq!(k.monitor(C0), CoreRun::Thread(a));

    assert_eq!(
        call(&k, SchedItem::ThreadWait(WaitRequest::sleep(50))),
        CoreRun::Idle
    );
    assert_eq!(k.thread_info(a).unwrap().run_state, RunState::Waiting);
    assert_eq!(k.platform().armed.lock().unwrap().first(), Some(&50));

    assert_eq!(tick_through(&k, 1, 20), CoreRun::Idle);
    assert_eq!(k.wait_remaining_ms(a), Some(30));
    assert_eq!(tick_through(&k, 21, 49), CoreRun::Idle);
    assert_eq!(tick_through(&k, 50, 50), CoreRun::Thread(a));

    assert_eq!(k.item_result(a), Some(Err(KernError::Timeout)));
    assert_eq!(k.thread_info(a).unwrap().last_wait_ms, 50);
    assert_eq!(k.counters().timers_fired, 1);
    assert_eq!(k.counters().waits_blocked, 1);
}

#[test]
fn test_semaphore_release_wakes_waiter_ahead_of_ready_threads() {
    let k = boot(1);
    let p = k.create_process().expect("process");
    let sem = k.create_semaphore(0, 1).expect("semaphore");
    let h = k.create_thread(p, attr(2)).expect("h");
    let b = k.create_thread(p, attr(5)).expect("b");
    let r1 = k.create_thread(p, attr(10).with_quantum(1000)).expect("r1");
    let r2 = k.create_thread(p, attr(10).with_quantum(1000)).expect("r2");

    assert_eq!(k.monitor(C0), CoreRun::Thread(h));
    assert_eq!(
        call(&k, SchedItem::ThreadWait(WaitRequest::sleep(10))),
        CoreRun::Thread(b)
    );
    let on_sem = WaitRequest::any(&[ObjRef::Semaphore(sem)], None).unwrap();
    assert_eq!(call(&k, SchedItem::ThreadWait(on_sem)), CoreRun::Thread(r1));

    assert_eq!(tick_through(&k, 1, 9), CoreRun::Thread(r1));
    // h's sleep ends and it preempts r1, which goes back to the head
    assert_eq!(tick_through(&k, 10, 10), CoreRun::Thread(h));
    assert_eq!(k.ready_threads(), vec![r1, r2]);

    assert_eq!(
        call(&k, SchedItem::SemRelease { sem, count: 1 }),
        CoreRun::Thread(h)
    );
    assert_eq!(k.item_result(h), Some(Ok(ItemOutput::Count(0))));
    assert_eq!(k.thread_info(b).unwrap().run_state, RunState::Ready);
    assert_eq!(k.ready_threads(), vec![b, r1, r2]);
    assert_eq!(k.semaphore_count(sem), Some(0));

    assert_eq!(
        call(&k, SchedItem::ThreadWait(WaitRequest::sleep(100))),
        CoreRun::Thread(b)
    );
    assert_eq!(k.item_result(b), Some(Ok(ItemOutput::Signalled(0))));
    assert!(k.counters().preemptions >= 1);
}

#[test]
fn test_wait_all_blocks_without_consuming() {
    let k = boot(1);
    let p = k.create_process().expect("process");
    let e1 = k.create_event(false, false).expect("e1");
    let e2 = k.create_event(false, true).expect("e2");
    let a = k.create_thread(p, attr(5)).expect("a");
    let c = k.create_thread(p, attr(10)).expect("c");
    let both = [ObjRef::Event(e1), ObjRef::Event(e2)];

    assert_eq!(k.monitor(C0), CoreRun::Thread(a));

    // Zero timeout: fails without touching e2
    let peek = WaitRequest::all(&both, Some(0)).unwrap();
    assert_eq!(call(&k, SchedItem::ThreadWait(peek)), CoreRun::Thread(a));
    assert_eq!(k.item_result(a), Some(Err(KernError::Timeout)));
    assert_eq!(k.event_signalled(e2), Some(true));

    let wait = WaitRequest::all(&both, None).unwrap();
    assert_eq!(call(&k, SchedItem::ThreadWait(wait)), CoreRun::Thread(c));
    assert_eq!(k.event_signalled(e2), Some(true));

    let set = SchedItem::EventChange {
        event: e1,
        change: EventChange::Set,
    };
    assert_eq!(call(&k, set), CoreRun::Thread(a));
    assert_eq!(k.item_result(a), Some(Ok(ItemOutput::Signalled(0))));
    assert_eq!(k.item_result(c), Some(Ok(ItemOutput::None)));
    assert_eq!(k.event_signalled(e1), Some(false));
    assert_eq!(k.event_signalled(e2), Some(false));
    assert_eq!(k.ready_threads(), vec![c]);
}

#[test]
fn test_wait_all_leaves_semaphore_count_while_blocked() {
    let k = boot(1);
    let p = k.create_process().expect("process");
    let ev = k.create_event(false, true).expect("event");
    let sem = k.create_semaphore(0, 2).expect("semaphore");
    let a = k.create_thread(p, attr(5)).expect("a");
    let c = k.create_thread(p, attr(10)).expect("c");
    let both = [ObjRef::Event(ev), ObjRef::Semaphore(sem)];
    assert_eq!(k.monitor(C0), CoreRun::Thread(a));

    let now_only = WaitRequest::all(&both, Some(0)).unwrap();
    assert_eq!(call(&k, SchedItem::ThreadWait(now_only)), CoreRun::Thread(a));
    assert_eq!(k.item_result(a), Some(Err(KernError::Timeout)));
    assert_eq!(k.event_signalled(ev), Some(true));
    assert_eq!(k.semaphore_count(sem), Some(0));

    let wait = WaitRequest::all(&both, None).unwrap();
    assert_eq!(call(&k, SchedItem::ThreadWait(wait)), CoreRun::Thread(c));
    assert_eq!(k.event_signalled(ev), Some(true));

    let reset = SchedItem::EventChange {
        event: ev,
        change: EventChange::Reset,
    };
    assert_eq!(call(&k, reset), CoreRun::Thread(c));
    assert_eq!(
        call(&k, SchedItem::SemRelease { sem, count: 1 }),
        CoreRun::Thread(c)
    );
    assert_eq!(k.item_result(c), Some(Ok(ItemOutput::Count(0))));
    // a still needs the event: the released count is left alone
    assert_eq!(k.semaphore_count(sem), Some(1));
    assert_eq!(k.thread_info(a).unwrap().run_state, RunState::Waiting);

    let set = SchedItem::EventChange {
        event: ev,
        change: EventChange::Set,
    };
    assert_eq!(call(&k, set), CoreRun::Thread(a));
    assert_eq!(k.item_result(a), Some(Ok(ItemOutput::Signalled(0))));
    assert_eq!(k.semaphore_count(sem), Some(0));
    assert_eq!(k.event_signalled(ev), Some(false));
}

#[test]
fn test_wait_all_completes_with_pulsed_entry() {
    let k = boot(1);
    let p = k.create_process().expect("process");
    let ev = k.create_event(false, false).expect("event");
    let sem = k.create_semaphore(0, 1).expect("semaphore");
    let a = k.create_thread(p, attr(5)).expect("a");
    let c = k.create_thread(p, attr(10)).expect("c");
    assert_eq!(k.monitor(C0), CoreRun::Thread(a));

    let wait = WaitRequest::all(&[ObjRef::Event(ev), ObjRef::Semaphore(sem)], None).unwrap();
    assert_eq!(call(&k, SchedItem::ThreadWait(wait)), CoreRun::Thread(c));

    // The pulse counts for a's wait even though the event ends reset
    let pulse = SchedItem::EventChange {
        event: ev,
        change: EventChange::Pulse,
    };
    assert_eq!(call(&k, pulse), CoreRun::Thread(c));
    assert_eq!(k.event_signalled(ev), Some(false));
    assert_eq!(k.thread_info(a).unwrap().run_state, RunState::Waiting);

    let set = SchedItem::EventChange {
        event: ev,
        change: EventChange::Set,
    };
    assert_eq!(call(&k, set), CoreRun::Thread(c));
    assert_eq!(k.event_signalled(ev), Some(true));

    assert_eq!(
        call(&k, SchedItem::SemRelease { sem, count: 1 }),
        CoreRun::Thread(a)
    );
    assert_eq!(k.item_result(a), Some(Ok(ItemOutput::Signalled(0))));
    assert_eq!(k.semaphore_count(sem), Some(0));
    // Only the semaphore was consumed; the event keeps its later set
    assert_eq!(k.event_signalled(ev), Some(true));
}

#[test]
fn test_tlb_shootdown_reaches_every_core() {
    let k = boot(4);
    let p = k.create_process().expect("p");
    let q = k.create_process().expect("q");
    let a = k
        .create_thread(p, attr(10).with_affinity(AffinityMask::only(CoreIndex(0))))
        .expect("a");
    let c = k
        .create_thread(q, attr(10).with_affinity(AffinityMask::only(CoreIndex(1))))
        .expect("c");
    let b = k
        .create_thread(p, attr(10).with_affinity(AffinityMask::only(CoreIndex(2))))
        .expect("b");

    assert_eq!(k.monitor(C0), CoreRun::Thread(a));
    assert_eq!(k.monitor(CoreIndex(1)), CoreRun::Thread(c));
    assert_eq!(k.monitor(CoreIndex(2)), CoreRun::Thread(b));
    assert_eq!(k.monitor(CoreIndex(3)), CoreRun::Idle);
    assert_eq!(k.active_process(CoreIndex(2)), Some(p));
    assert_eq!(k.active_process(CoreIndex(1)), Some(q));

    let stop = AtomicBool::new(false);
    let req = TlbRequest::new(p, 0x10_000, 2);
    let run = std::thread::scope(|s| {
        for i in 1..4 {
            let (k, stop) = (&k, &stop);
            s.spawn(move || {
                let core = CoreIndex(i);
                while !stop.load(Ordering::SeqCst) {
                    if k.core_has_pending_events(core) {
                        k.monitor(core);
                    }
                    std::thread::yield_now();
                }
            });
        }
        let run = call(&k, SchedItem::InvalidateTlb(req));
        stop.store(true, Ordering::SeqCst);
        run
    });

    assert_eq!(run, CoreRun::Thread(a));
    assert_eq!(k.item_result(a), Some(Ok(ItemOutput::None)));
    assert_eq!(k.tlb_acks(), 4);
    assert_eq!(k.tlb_params(), None);

    let pages = vec![0x10_000, 0x11_000];
    assert_eq!(k.platform().flushes_on(C0), pages);
    assert_eq!(k.platform().flushes_on(CoreIndex(2)), pages);
    assert!(k.platform().flushes_on(CoreIndex(1)).is_empty());
    assert!(k.platform().flushes_on(CoreIndex(3)).is_empty());
    assert_eq!(k.counters().tlb_shootdowns, 1);
}

#[test]
fn test_tlb_kernel_range_flushes_everywhere() {
    let k = boot(2);
    let p = k.create_process().expect("p");
    let a = k
        .create_thread(p, attr(10).with_affinity(AffinityMask::only(C0)))
        .expect("a");
    assert_eq!(k.monitor(C0), CoreRun::Thread(a));
    assert_eq!(k.monitor(CoreIndex(1)), CoreRun::Idle);

    let kva = k.config().kernel_va_base;
    let stop = AtomicBool::new(false);
    std::thread::scope(|s| {
        s.spawn(|| {
            while !stop.load(Ordering::SeqCst) {
                if k.core_has_pending_events(CoreIndex(1)) {
                    k.monitor(CoreIndex(1));
                }
                std::thread::yield_now();
            }
        });
        call(&k, SchedItem::InvalidateTlb(TlbRequest::new(p, kva, 1)));
        stop.store(true, Ordering::SeqCst);
    });

    assert_eq!(k.platform().flushes_on(CoreIndex(1)), vec![kva]);
    assert_eq!(k.platform().flushes_on(C0), vec![kva]);
}

#[test]
fn test_tlb_rejects_misaligned_range() {
    let k = boot(1);
    let p = k.create_process().expect("p");
    let a = k.create_thread(p, attr(10)).expect("a");
    k.monitor(C0);
    let req = TlbRequest::new(p, 0x10_001, 1);
    assert_eq!(call(&k, SchedItem::InvalidateTlb(req)), CoreRun::Thread(a));
    assert_eq!(k.item_result(a), Some(Err(KernError::BadArgument)));
    assert_eq!(k.counters().tlb_shootdowns, 0);
}

#[test]
fn test_quantum_expiry_goes_to_tail() {
    let k = boot(1);
    let p = k.create_process().expect("process");
    let a = k.create_thread(p, attr(10)).expect("a");
    let b = k.create_thread(p, attr(10)).expect("b");

    assert_eq!(k.monitor(C0), CoreRun::Thread(a));
    assert_eq!(tick_through(&k, 1, 9), CoreRun::Thread(a));
    assert_eq!(tick_through(&k, 10, 10), CoreRun::Thread(b));
    assert_eq!(k.ready_threads(), vec![a]);
    assert_eq!(k.counters().quantum_expiries, 1);
    assert_eq!(k.thread_info(a).unwrap().total_run_time, 10);

    // Yield hands the core to the equal-priority thread
    assert_eq!(
        call(&k, SchedItem::ThreadWait(WaitRequest::yield_now())),
        CoreRun::Thread(a)
    );
    assert_eq!(k.item_result(b), Some(Ok(ItemOutput::None)));
    assert_eq!(k.ready_threads(), vec![b]);
}

#[test]
fn test_quantum_refilled_without_rival() {
    let k = boot(1);
    let p = k.create_process().expect("process");
    let a = k.create_thread(p, attr(10)).expect("a");
    let low = k.create_thread(p, attr(20)).expect("low");

    assert_eq!(k.monitor(C0), CoreRun::Thread(a));
    assert_eq!(tick_through(&k, 1, 25), CoreRun::Thread(a));
    assert_eq!(k.ready_threads(), vec![low]);
    assert_eq!(k.counters().quantum_expiries, 0);
}

#[test]
fn test_higher_priority_thread_takes_other_core() {
    let k = boot(2);
    let p = k.create_process().expect("process");
    let a = k.create_thread(p, attr(10)).expect("a");

    assert_eq!(k.monitor(C0), CoreRun::Thread(a));
    let spawn = SchedItem::ThreadCreate {
        process: p,
        attr: attr(4),
    };
    assert_eq!(call(&k, spawn), CoreRun::Thread(a));
    let Some(Ok(ItemOutput::Thread(n))) = k.item_result(a) else {
        panic!("thread create failed");
    };

    // Core 1 was idle, so the new thread went there and core 1 was woken
    assert_eq!(k.core_thread(CoreIndex(1)), Some(n));
    assert!(k
        .platform()
        .icis
        .lock()
        .unwrap()
        .contains(&(C0, CoreIndex(1))));
    assert!(k.core_has_pending_events(CoreIndex(1)));
    assert_eq!(k.monitor(CoreIndex(1)), CoreRun::Thread(n));
}

#[test]
fn test_preempting_remote_core_waits_for_release() {
    let k = boot(2);
    let p = k.create_process().expect("process");
    let a = k
        .create_thread(p, attr(10).with_affinity(AffinityMask::only(C0)))
        .expect("a");
    let r = k
        .create_thread(p, attr(12).with_affinity(AffinityMask::only(CoreIndex(1))))
        .expect("r");
    assert_eq!(k.monitor(C0), CoreRun::Thread(a));
    assert_eq!(k.monitor(CoreIndex(1)), CoreRun::Thread(r));

    let spawn = SchedItem::ThreadCreate {
        process: p,
        attr: attr(3).with_affinity(AffinityMask::only(CoreIndex(1))),
    };
    assert_eq!(call(&k, spawn), CoreRun::Thread(a));
    let Some(Ok(ItemOutput::Thread(n))) = k.item_result(a) else {
        panic!("thread create failed");
    };

    // Core 1 has not noticed yet: r is still executing there
    assert_eq!(k.thread_info(r).unwrap().run_state, RunState::Transition);
    assert!(!k.ready_threads().contains(&r));

    assert_eq!(k.monitor(CoreIndex(1)), CoreRun::Thread(n));
    assert_eq!(k.thread_info(r).unwrap().run_state, RunState::Ready);
    assert_eq!(k.ready_threads(), vec![r]);
}

#[test]
fn test_page_dir_and_debug_icis_reach_target_core() {
    let k = boot(2);
    let c1 = CoreIndex(1);

    k.send_ici_to_one_core(C0, c1, IciKind::PAGE_DIR_UPDATE | IciKind::DEBUG);
    assert!(k.core_has_pending_events(c1));
    assert_eq!(k.monitor(c1), CoreRun::Idle);

    let platform = k.platform();
    assert_eq!(*platform.page_dir_updates.lock().unwrap(), vec![c1]);
    assert_eq!(*platform.debug_breaks.lock().unwrap(), vec![c1]);
    assert_eq!(*platform.icis.lock().unwrap(), vec![(C0, c1)]);
    assert!(platform.flushes_on(c1).is_empty());
    assert!(!k.is_halted(c1));
}
