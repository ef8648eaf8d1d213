//! Conformance checks for queue backends.
//!
//! Every check takes a fresh [`Pipeline`] built over the backend under test
//! and panics on the first violated expectation. Backend authors call
//! [`run_all`] from their own test suite.

use chrono::{Duration, Utc};
use workshop_core::Job;
use workshop_core::testing::TestJob;

use crate::backend::DequeueOptions;
use crate::pipeline::Pipeline;

fn name(job: &dyn Job) -> String {
    job.attributes()["name"].as_str().unwrap_or_default().to_string()
}

fn next(pipeline: &mut Pipeline, options: &DequeueOptions) -> Option<String> {
    pipeline
        .dequeue(options)
        .expect("dequeue")
        .map(|job| name(job.as_ref()))
}

/// Runs every check against pipelines produced by `make`
pub fn run_all(make: impl Fn() -> Pipeline) {
    dequeues_in_fifo_order(&mut make());
    skips_jobs_not_yet_due(&mut make());
    reset_jobs_jump_the_queue(&mut make());
    complete_removes_job(&mut make());
    fail_retains_job(&mut make());
    filters_by_type(&mut make());
    clear_removes_everything(&mut make());
}

/// Jobs come out in the order they went in
pub fn dequeues_in_fifo_order(pipeline: &mut Pipeline) {
    for job in ["first", "second", "third"] {
        pipeline.enqueue(&TestJob::named(job)).expect("enqueue");
    }

    let any = DequeueOptions::any();
    assert_eq!(next(pipeline, &any).as_deref(), Some("first"));
    assert_eq!(next(pipeline, &any).as_deref(), Some("second"));
    assert_eq!(next(pipeline, &any).as_deref(), Some("third"));
    assert_eq!(next(pipeline, &any), None);
}

/// Jobs with a future `not_before` are skipped until due
pub fn skips_jobs_not_yet_due(pipeline: &mut Pipeline) {
    pipeline
        .enqueue_delayed(&TestJob::named("later"), Utc::now() + Duration::hours(1))
        .expect("enqueue");
    pipeline
        .enqueue_delayed(&TestJob::named("due"), Utc::now() - Duration::seconds(1))
        .expect("enqueue");
    pipeline.enqueue(&TestJob::named("now")).expect("enqueue");

    let any = DequeueOptions::any();
    assert_eq!(next(pipeline, &any).as_deref(), Some("due"));
    assert_eq!(next(pipeline, &any).as_deref(), Some("now"));
    assert_eq!(next(pipeline, &any), None);
}

/// A reset job is handed out before jobs that were already waiting
pub fn reset_jobs_jump_the_queue(pipeline: &mut Pipeline) {
    for job in ["a", "b", "c"] {
        pipeline.enqueue(&TestJob::named(job)).expect("enqueue");
    }

    let any = DequeueOptions::any();
    let a = pipeline.dequeue(&any).expect("dequeue").expect("job a");
    pipeline.fail(a.as_ref()).expect("fail");
    let failed = pipeline
        .find(&a.id().expect("id"))
        .expect("find")
        .expect("failed job is retained");
    pipeline.reset(failed.as_ref()).expect("reset");

    assert_eq!(next(pipeline, &any).as_deref(), Some("a"));
    assert_eq!(next(pipeline, &any).as_deref(), Some("b"));
}

/// Completed jobs cannot be found any more
pub fn complete_removes_job(pipeline: &mut Pipeline) {
    let id = pipeline
        .enqueue(&TestJob::named("a"))
        .expect("enqueue")
        .id()
        .expect("backend assigns an id");

    let stored = pipeline.find(&id).expect("find").expect("free job is found");
    assert_eq!(stored.data().status(), Some("free"));

    let job = pipeline
        .dequeue(&DequeueOptions::any())
        .expect("dequeue")
        .expect("job");
    assert_eq!(job.id().as_ref(), Some(&id));
    pipeline.complete(job.as_ref()).expect("complete");
    assert!(pipeline.find(&id).expect("find").is_none());
}

/// Failed jobs are kept with status `failed` and are not dequeued again
pub fn fail_retains_job(pipeline: &mut Pipeline) {
    let id = pipeline
        .enqueue(&TestJob::named("a"))
        .expect("enqueue")
        .id()
        .expect("backend assigns an id");

    let any = DequeueOptions::any();
    let job = pipeline.dequeue(&any).expect("dequeue").expect("job");
    pipeline.fail(job.as_ref()).expect("fail");

    let found = pipeline.find(&id).expect("find").expect("failed job");
    assert_eq!(found.data().status(), Some("failed"));
    assert_eq!(next(pipeline, &any), None);
}

/// `only` and `exclude` filters select by job type
pub fn filters_by_type(pipeline: &mut Pipeline) {
    pipeline.enqueue(&TestJob::named("plain")).expect("enqueue");
    pipeline
        .enqueue(&TestJob::named("special").with_type("special"))
        .expect("enqueue");

    assert_eq!(
        next(pipeline, &DequeueOptions::only(["special"])).as_deref(),
        Some("special")
    );
    assert_eq!(next(pipeline, &DequeueOptions::exclude(["job"])), None);
    assert_eq!(
        next(pipeline, &DequeueOptions::exclude(["special"])).as_deref(),
        Some("plain")
    );
}

/// `clear` empties every status
pub fn clear_removes_everything(pipeline: &mut Pipeline) {
    let a = pipeline.enqueue(&TestJob::named("a")).expect("enqueue");
    let b = pipeline.enqueue(&TestJob::named("b")).expect("enqueue");
    let any = DequeueOptions::any();
    assert_eq!(next(pipeline, &any).as_deref(), Some("a"));

    pipeline.clear().expect("clear");
    for job in [a, b] {
        let id = job.id().expect("id");
        assert!(pipeline.find(&id).expect("find").is_none());
    }
    assert_eq!(next(pipeline, &any), None);
}
