//! End-to-end scenarios for job collections: the completion barrier,
//! nesting and stopping.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{init_tracing, wait_until, FnJob};
use jobweaver_core::job::JobKey;
use jobweaver_core::{
    Job, JobCollection, JobPointer, JobStatus, Weaver, WeaverBuilder, WeaverObserver,
};

/// Records every job_done key it sees.
#[derive(Default)]
struct DoneRecorder {
    keys: Mutex<Vec<JobKey>>,
}

impl DoneRecorder {
    fn count_for(&self, key: JobKey) -> usize {
        self.keys.lock().unwrap().iter().filter(|k| **k == key).count()
    }

    fn total(&self) -> usize {
        self.keys.lock().unwrap().len()
    }
}

impl WeaverObserver for DoneRecorder {
    fn job_done(&self, job: &JobPointer) {
        self.keys.lock().unwrap().push(JobKey::of(job));
    }
}

fn two_workers() -> Weaver {
    WeaverBuilder::new()
        .thread_cap(2)
        .build()
        .expect("valid configuration")
}

#[test]
fn collection_completes_after_all_elements() {
    init_tracing();
    let weaver = two_workers();
    let recorder = Arc::new(DoneRecorder::default());
    weaver.register_observer(recorder.clone());

    let counter = Arc::new(AtomicUsize::new(0));
    let collection = JobCollection::new();
    for _ in 0..4 {
        let counter = counter.clone();
        collection.add_job(FnJob::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
    }

    let as_job: JobPointer = collection.clone();
    weaver.enqueue_job(as_job.clone());
    weaver.finish();

    assert_eq!(counter.load(Ordering::SeqCst), 4);
    assert_eq!(collection.status(), JobStatus::Success);
    // the collection reports done exactly once, after the last element
    assert_eq!(recorder.count_for(JobKey::of(&as_job)), 1);
    assert_eq!(recorder.total(), 5);
    weaver.shut_down();
}

#[test]
fn empty_collection_still_completes() {
    init_tracing();
    let weaver = two_workers();
    let collection = JobCollection::new();
    let as_job: JobPointer = collection.clone();

    weaver.enqueue_job(as_job);
    weaver.finish();

    assert_eq!(collection.status(), JobStatus::Success);
    assert!(weaver.is_idle());
    weaver.shut_down();
}

#[test]
fn collections_nest() {
    init_tracing();
    let weaver = two_workers();

    let counter = Arc::new(AtomicUsize::new(0));
    let leaf = |counter: &Arc<AtomicUsize>| {
        let counter = counter.clone();
        FnJob::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    let inner = JobCollection::new();
    inner.add_job(leaf(&counter));
    inner.add_job(leaf(&counter));

    let outer = JobCollection::new();
    outer.add_job(inner.clone());
    outer.add_job(leaf(&counter));

    weaver.enqueue_job(outer.clone());
    weaver.finish();

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(inner.status(), JobStatus::Success);
    assert_eq!(outer.status(), JobStatus::Success);
    weaver.shut_down();
}

#[test]
fn collection_priority_orders_its_pickup() {
    init_tracing();
    let weaver = WeaverBuilder::new()
        .thread_cap(1)
        .build()
        .expect("valid configuration");
    weaver.suspend();

    let order = Arc::new(Mutex::new(Vec::new()));
    let plain = {
        let order = order.clone();
        FnJob::with_priority(1, move |_, _| {
            order.lock().unwrap().push("plain");
            Ok(())
        })
    };
    let collection = JobCollection::with_priority(5);
    {
        let order = order.clone();
        collection.add_job(FnJob::new(move |_, _| {
            order.lock().unwrap().push("element");
            Ok(())
        }));
    }

    weaver.enqueue(vec![plain, collection.clone()]);
    weaver.resume();
    weaver.finish();

    // the collection is picked up first; its element is published behind
    // whatever is still queued
    assert_eq!(*order.lock().unwrap(), vec!["plain", "element"]);
    weaver.shut_down();
}

#[test]
fn stopping_a_queued_collection_returns_it_to_new() {
    init_tracing();
    let weaver = two_workers();
    weaver.suspend();

    let collection = JobCollection::new();
    collection.add_job(FnJob::new(|_, _| Ok(())));
    collection.add_job(FnJob::new(|_, _| Ok(())));
    weaver.enqueue_job(collection.clone());
    assert_eq!(weaver.queue_length(), 1);

    collection.stop();
    assert_eq!(weaver.queue_length(), 0);
    assert_eq!(collection.status(), JobStatus::New);
    weaver.shut_down();
}

#[test]
fn stopping_a_running_collection_dequeues_the_rest() {
    init_tracing();
    let weaver = WeaverBuilder::new()
        .thread_cap(1)
        .build()
        .expect("valid configuration");

    let started = Arc::new(AtomicBool::new(false));
    let released = Arc::new(AtomicBool::new(false));
    let executed = Arc::new(AtomicUsize::new(0));

    let collection = JobCollection::new();
    {
        // the first element blocks until the test says go
        let started = started.clone();
        let released = released.clone();
        let executed = executed.clone();
        collection.add_job(FnJob::new(move |_, _| {
            started.store(true, Ordering::SeqCst);
            while !released.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(2));
            }
            executed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
    }
    for _ in 0..9 {
        let executed = executed.clone();
        collection.add_job(FnJob::new(move |_, _| {
            executed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
    }

    weaver.enqueue_job(collection.clone());
    assert!(wait_until(Duration::from_secs(5), || {
        started.load(Ordering::SeqCst)
    }));

    // too late to dequeue the collection itself; the waiting elements go
    collection.stop();
    released.store(true, Ordering::SeqCst);
    weaver.finish();

    assert_eq!(executed.load(Ordering::SeqCst), 1);
    assert_eq!(collection.status(), JobStatus::Success);
    assert!(weaver.is_idle());
    weaver.shut_down();
}
