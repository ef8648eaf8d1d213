//! Conformance checks for schedule backends.
//!
//! Each check takes a fresh [`Scheduler`] built over the backend under test
//! and panics on the first violated expectation.

use chrono::{NaiveDate, NaiveDateTime};
use workshop_core::Job;
use workshop_core::testing::TestJob;

use crate::backend::EntryId;
use crate::calendar::CalendarFields;
use crate::scheduler::Scheduler;

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .and_then(|date| date.and_hms_opt(h, mi, 0))
        .expect("valid timestamp")
}

fn names(jobs: &[Box<dyn Job>]) -> Vec<String> {
    jobs.iter()
        .map(|job| {
            job.attributes()["name"]
                .as_str()
                .unwrap_or_default()
                .to_string()
        })
        .collect()
}

/// Runs every check against schedulers produced by `make`
pub fn run_all(make: impl Fn() -> Scheduler) {
    stores_and_finds_entries(&mut make());
    deletes_entries(&mut make());
    clear_removes_everything(&mut make());
    matches_calendar_fields(&mut make());
    returns_jobs_in_schedule_order(&mut make());
    locks_each_minute_once(&mut make());
}

/// Entries come back from `all_entries` and `find`
pub fn stores_and_finds_entries(scheduler: &mut Scheduler) {
    let first = scheduler
        .schedule(&TestJob::named("first"), CalendarFields::every_minute())
        .expect("schedule");
    let second = scheduler
        .schedule(
            &TestJob::named("second"),
            CalendarFields::every_minute().hour(2).minute(5),
        )
        .expect("schedule");
    assert_ne!(first.id, second.id);

    let all = scheduler.all_entries().expect("all entries");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, first.id);
    assert_eq!(all[1].fields, CalendarFields::every_minute().hour(2).minute(5));

    let found = scheduler.find(&second.id).expect("find").expect("entry");
    assert_eq!(found.job.attributes()["name"], "second");
    assert!(
        scheduler
            .find(&EntryId::new("missing"))
            .expect("find")
            .is_none()
    );
}

/// Deleted entries are gone, unknown ids are ignored
pub fn deletes_entries(scheduler: &mut Scheduler) {
    let entry = scheduler
        .schedule(&TestJob::named("doomed"), CalendarFields::every_minute())
        .expect("schedule");
    scheduler.delete(&entry.id).expect("delete");
    assert!(scheduler.find(&entry.id).expect("find").is_none());
    scheduler
        .delete(&EntryId::new("missing"))
        .expect("delete unknown");
}

/// `clear` leaves no entries behind
pub fn clear_removes_everything(scheduler: &mut Scheduler) {
    for name in ["a", "b"] {
        scheduler
            .schedule(&TestJob::named(name), CalendarFields::every_minute())
            .expect("schedule");
    }
    scheduler.clear().expect("clear");
    assert!(scheduler.all_entries().expect("all entries").is_empty());
}

/// Only entries whose set fields all match are due
pub fn matches_calendar_fields(scheduler: &mut Scheduler) {
    let entries = [
        ("every", CalendarFields::every_minute()),
        ("two_oh_five", CalendarFields::every_minute().hour(2).minute(5)),
        ("first_of_month", CalendarFields::every_minute().day_of_month(1)),
        ("second_of_month", CalendarFields::every_minute().day_of_month(2)),
        ("march", CalendarFields::every_minute().month(3)),
        ("saturday", CalendarFields::every_minute().day_of_week(6)),
        ("sunday", CalendarFields::every_minute().day_of_week(0)),
    ];
    for (name, fields) in entries {
        scheduler
            .schedule(&TestJob::named(name), fields)
            .expect("schedule");
    }

    // 2014-03-01 was a Saturday
    let saturday = scheduler
        .jobs_for(at(2014, 3, 1, 0, 0), false)
        .expect("jobs for");
    assert_eq!(
        names(&saturday),
        ["every", "first_of_month", "march", "saturday"]
    );

    let sunday = scheduler
        .jobs_for(at(2014, 3, 2, 0, 0), false)
        .expect("jobs for");
    assert_eq!(names(&sunday), ["every", "second_of_month", "march", "sunday"]);

    let nightly = scheduler
        .jobs_for(at(2014, 3, 1, 2, 5), false)
        .expect("jobs for");
    assert_eq!(
        names(&nightly),
        ["every", "two_oh_five", "first_of_month", "march", "saturday"]
    );

    let april = scheduler
        .jobs_for(at(2014, 4, 2, 2, 6), false)
        .expect("jobs for");
    assert_eq!(names(&april), ["every", "second_of_month"]);
}

/// Due jobs keep the order their entries were scheduled in
pub fn returns_jobs_in_schedule_order(scheduler: &mut Scheduler) {
    for name in ["c", "a", "b"] {
        scheduler
            .schedule(&TestJob::named(name), CalendarFields::every_minute())
            .expect("schedule");
    }
    let jobs = scheduler
        .jobs_for(at(2014, 5, 11, 2, 5), true)
        .expect("jobs for");
    assert_eq!(names(&jobs), ["c", "a", "b"]);
}

/// A locked read hands each entry out once per minute
pub fn locks_each_minute_once(scheduler: &mut Scheduler) {
    scheduler
        .schedule(
            &TestJob::named("nightly"),
            CalendarFields::every_minute().hour(2).minute(5),
        )
        .expect("schedule");
    scheduler
        .schedule(&TestJob::named("every"), CalendarFields::every_minute())
        .expect("schedule");

    let minute = at(2014, 5, 11, 2, 5);
    assert_eq!(
        names(&scheduler.jobs_for(minute, true).expect("jobs for")),
        ["nightly", "every"]
    );
    assert!(scheduler.jobs_for(minute, true).expect("jobs for").is_empty());
    assert_eq!(
        names(&scheduler.jobs_for(minute, false).expect("jobs for")),
        ["nightly", "every"]
    );

    let next = at(2014, 5, 11, 2, 6);
    assert_eq!(
        names(&scheduler.jobs_for(next, true).expect("jobs for")),
        ["every"]
    );
    assert!(scheduler.jobs_for(next, true).expect("jobs for").is_empty());
}
