//! Timer-triggered scheduling tests.

use cadence_core::build_cause::TriggerKind;
use cadence_core::pipeline::{Configuration, TimerSpec};
use cadence_core::ports::ScheduleQueue;
use cadence_core::{Error, PipelineName};
use cadence_scheduler::{Rejection, TimerScheduler};
use cadence_tests::{MaterialFixture, PipelineFixture, RevisionFixture, TestContext};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use tokio_test::assert_err;

fn p1() -> PipelineName {
    "p1".into()
}

#[tokio::test]
async fn test_only_on_changes_skips_same_revisions() {
    let git1 = MaterialFixture::git("git1");
    let ctx = TestContext::loaded(Configuration::new(vec![PipelineFixture::timed("p1", &git1, true)]))
        .await
        .unwrap();

    ctx.poller.check_in(&git1, RevisionFixture::scm("g11", 1));
    let first = ctx.engine.timer_schedule(&p1()).await.unwrap();
    let cause = first.build_cause().unwrap();
    assert_eq!(cause.trigger(), TriggerKind::Timer);
    assert_eq!(cause.approver(), "timer");

    let second = ctx.engine.timer_schedule(&p1()).await.unwrap();
    assert_eq!(second.rejection(), Some(&Rejection::NoNewMaterials));

    ctx.poller.check_in(&git1, RevisionFixture::scm("g12", 2));
    let third = ctx.engine.timer_schedule(&p1()).await.unwrap();
    assert_eq!(third.build_cause().unwrap().revision_ids(), vec!["g12"]);
}

#[tokio::test]
async fn test_only_on_changes_runs_when_any_material_moves() {
    let git1 = MaterialFixture::git("git1");
    let git2 = MaterialFixture::git("git2");
    let upstream = MaterialFixture::upstream("up1", "build");
    let ctx = TestContext::loaded(Configuration::new(vec![
        PipelineFixture::simple("up1", &git1),
        PipelineFixture::with_materials("p1", vec![git1.clone(), git2.clone(), upstream.clone()])
            .with_timer(TimerSpec::new("0 0 22 * * *", true)),
    ]))
    .await
    .unwrap();

    ctx.poller.check_in(&git1, RevisionFixture::scm("g11", 1));
    ctx.poller.check_in(&git2, RevisionFixture::scm("g21", 1));
    ctx.upstream.record(RevisionFixture::passed("up1", 1, "build"));
    let first = ctx.engine.timer_schedule(&p1()).await.unwrap();
    assert_eq!(
        first.build_cause().unwrap().revision_ids(),
        vec!["g11", "g21", "up1/1/build/1"]
    );

    let unchanged = ctx.engine.timer_schedule(&p1()).await.unwrap();
    assert_eq!(unchanged.rejection(), Some(&Rejection::NoNewMaterials));

    // Only the second repository moves.
    ctx.poller.check_in(&git2, RevisionFixture::scm("g22", 2));
    let second = ctx.engine.timer_schedule(&p1()).await.unwrap();
    assert_eq!(
        second.build_cause().unwrap().revision_ids(),
        vec!["g11", "g22", "up1/1/build/1"]
    );
    let unchanged = ctx.engine.timer_schedule(&p1()).await.unwrap();
    assert_eq!(unchanged.rejection(), Some(&Rejection::NoNewMaterials));

    // Then only the upstream stage.
    ctx.upstream.record(RevisionFixture::passed("up1", 2, "build"));
    let third = ctx.engine.timer_schedule(&p1()).await.unwrap();
    assert_eq!(
        third.build_cause().unwrap().revision_ids(),
        vec!["g11", "g22", "up1/2/build/1"]
    );
}

#[tokio::test]
async fn test_timer_without_only_on_changes_always_runs() {
    let git1 = MaterialFixture::git("git1");
    let ctx = TestContext::loaded(Configuration::new(vec![PipelineFixture::timed("p1", &git1, false)]))
        .await
        .unwrap();
    ctx.poller.check_in(&git1, RevisionFixture::scm("g11", 1));

    assert!(ctx.engine.timer_schedule(&p1()).await.unwrap().is_succeeded());
    assert!(ctx.engine.timer_schedule(&p1()).await.unwrap().is_succeeded());
}

#[tokio::test]
async fn test_auto_runs_do_not_feed_timer_debounce() {
    let git1 = MaterialFixture::git("git1");
    let ctx = TestContext::loaded(Configuration::new(vec![PipelineFixture::timed("p1", &git1, true)]))
        .await
        .unwrap();
    ctx.poller.check_in(&git1, RevisionFixture::scm("g11", 1));

    ctx.engine.auto_schedule(&p1()).await.unwrap();

    assert!(ctx.engine.timer_schedule(&p1()).await.unwrap().is_succeeded());
}

#[tokio::test]
async fn test_failed_resolution_keeps_debounce_state() {
    let git1 = MaterialFixture::git("git1");
    let ctx = TestContext::loaded(Configuration::new(vec![PipelineFixture::timed("p1", &git1, true)]))
        .await
        .unwrap();
    ctx.poller.check_in(&git1, RevisionFixture::scm("g11", 1));
    ctx.engine.timer_schedule(&p1()).await.unwrap();

    ctx.poller.fail_with("timeout talking to git");
    assert_err!(ctx.engine.timer_schedule(&p1()).await);
    ctx.poller.recover();

    let outcome = ctx.engine.timer_schedule(&p1()).await.unwrap();
    assert_eq!(outcome.rejection(), Some(&Rejection::NoNewMaterials));
}

#[tokio::test]
async fn test_timer_schedule_requires_timer() {
    let git1 = MaterialFixture::git("git1");
    let ctx = TestContext::loaded(Configuration::new(vec![PipelineFixture::simple("p1", &git1)]))
        .await
        .unwrap();

    let err = assert_err!(ctx.engine.timer_schedule(&p1()).await);
    assert!(matches!(err, Error::NoTimer(_)));
}

#[tokio::test]
async fn test_removed_pipeline_forgets_debounce() {
    let git1 = MaterialFixture::git("git1");
    let ctx = TestContext::loaded(Configuration::new(vec![PipelineFixture::timed("p1", &git1, true)]))
        .await
        .unwrap();
    ctx.poller.check_in(&git1, RevisionFixture::scm("g11", 1));
    ctx.engine.timer_schedule(&p1()).await.unwrap();
    assert_eq!(ctx.engine.debounce().tracked_pipelines(), vec![p1()]);

    ctx.engine
        .reload(&Configuration::new(vec![PipelineFixture::simple("p2", &git1)]))
        .await
        .unwrap();
    assert!(ctx.engine.debounce().tracked_pipelines().is_empty());
}

#[tokio::test]
async fn test_timer_scheduler_tick_fires_due_pipelines() {
    let git1 = MaterialFixture::git("git1");
    let ctx = TestContext::loaded(Configuration::new(vec![
        PipelineFixture::timed("p1", &git1, false),
        PipelineFixture::simple("p2", &git1),
    ]))
    .await
    .unwrap();
    ctx.poller.check_in(&git1, RevisionFixture::scm("g11", 1));
    let timers = TimerScheduler::new(ctx.engine.clone());

    let morning = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
    let noon = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    assert!(timers.tick(morning, noon).await.is_empty());

    let before = Utc.with_ymd_and_hms(2024, 3, 1, 21, 59, 59).unwrap();
    let after = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 1).unwrap();
    assert_eq!(timers.tick(before, after).await, vec![p1()]);
    assert!(ctx.queue.pending(&p1()).await.unwrap().unwrap().trigger() == TriggerKind::Timer);
}
