use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use linkup_server::analyzer::{AnalyzerError, CompatibilityAnalyzer, RankedMatch};
use linkup_server::config::ChatConfig;
use linkup_server::delivery::DeliveryCoordinator;
use linkup_server::directory::{InMemoryDirectory, UserDirectory};
use linkup_server::error::CoreError;
use linkup_server::matching::{MatchScheduler, SchedulerState, SweepReport, TickOutcome};
use linkup_server::models::{MessageTag, PrivateMessage, UserIdentity};

fn user(id: &str) -> UserIdentity {
    UserIdentity {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        bio: String::new(),
        avatar_ref: None,
    }
}

/// Analyzer with canned scores. Every candidate gets `default_score` unless
/// listed in `scores`; users in `fail_for` make `rank` fail.
#[derive(Default)]
struct ScriptedAnalyzer {
    default_score: f64,
    scores: HashMap<String, f64>,
    fail_for: HashSet<String>,
    /// Extra ranked entry pointing at a user that is not a candidate.
    phantom: Option<RankedMatch>,
    /// When set, `rank` waits for a permit before answering.
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl CompatibilityAnalyzer for ScriptedAnalyzer {
    async fn rank(
        &self,
        user: &UserIdentity,
        candidates: &[UserIdentity],
    ) -> Result<Vec<RankedMatch>, AnalyzerError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if self.fail_for.contains(&user.id) {
            return Err(AnalyzerError::Unavailable("scripted failure".to_string()));
        }
        if let Some(phantom) = &self.phantom {
            return Ok(vec![phantom.clone()]);
        }
        Ok(candidates
            .iter()
            .map(|c| RankedMatch {
                candidate_id: c.id.clone(),
                score: self.scores.get(&c.id).copied().unwrap_or(self.default_score),
                reasoning: String::new(),
            })
            .collect())
    }

    async fn generate_icebreaker(
        &self,
        _from: &UserIdentity,
        to: &UserIdentity,
    ) -> Result<String, AnalyzerError> {
        Ok(format!("Hi {}!", to.display_name))
    }
}

struct Harness {
    delivery: Arc<DeliveryCoordinator>,
    scheduler: Arc<MatchScheduler>,
}

fn harness(ids: &[&str], analyzer: ScriptedAnalyzer) -> Harness {
    let directory: Arc<dyn UserDirectory> =
        Arc::new(InMemoryDirectory::new(ids.iter().map(|id| user(id)).collect()));
    let delivery = Arc::new(DeliveryCoordinator::new(
        directory.clone(),
        &ChatConfig::default(),
    ));
    let scheduler = Arc::new(MatchScheduler::new(
        directory,
        Arc::new(analyzer),
        delivery.clone(),
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    ));
    Harness {
        delivery,
        scheduler,
    }
}

fn at(date: (i32, u32, u32), hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(date.0, date.1, date.2)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

/// Daily match messages sent by `from`, across every conversation.
fn matches_from(h: &Harness, from: &str, others: &[&str]) -> Vec<PrivateMessage> {
    others
        .iter()
        .flat_map(|other| h.delivery.conversation_history(from, other))
        .filter(|m| m.from_user_id == from && m.tag.match_score().is_some())
        .collect()
}

async fn wait_for_running(scheduler: &MatchScheduler) {
    for _ in 0..200 {
        if scheduler.status().state == SchedulerState::Running {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("scheduler never entered Running");
}

#[tokio::test]
async fn test_tick_before_schedule_is_not_due() {
    let h = harness(&["a", "b"], ScriptedAnalyzer::default());
    let outcome = h.scheduler.tick_at(at((2026, 3, 1), 8, 59)).await.unwrap();
    assert_eq!(outcome, TickOutcome::NotDue);
    assert_eq!(h.delivery.conversations().conversation_count(), 0);
}

#[tokio::test]
async fn test_sweep_runs_once_per_day() {
    let h = harness(&["a", "b", "c"], ScriptedAnalyzer::default());

    let first = h.scheduler.tick_at(at((2026, 3, 1), 9, 0)).await.unwrap();
    assert_eq!(
        first,
        TickOutcome::Swept(SweepReport {
            users: 3,
            delivered: 3,
            skipped: 0,
            failed: 0,
        })
    );
    let second = h.scheduler.tick_at(at((2026, 3, 1), 10, 0)).await.unwrap();
    assert_eq!(second, TickOutcome::AlreadyRanToday);

    for id in ["a", "b", "c"] {
        let others: Vec<&str> = ["a", "b", "c"].into_iter().filter(|o| *o != id).collect();
        assert_eq!(matches_from(&h, id, &others).len(), 1, "user {id}");
    }
    assert_eq!(
        h.scheduler.status().last_fired_date,
        NaiveDate::from_ymd_opt(2026, 3, 1)
    );

    let next_day = h.scheduler.tick_at(at((2026, 3, 2), 9, 30)).await.unwrap();
    assert!(matches!(next_day, TickOutcome::Swept(_)));
}

#[tokio::test]
async fn test_late_tick_catches_up_same_day() {
    let h = harness(&["a", "b"], ScriptedAnalyzer::default());
    let outcome = h.scheduler.tick_at(at((2026, 3, 1), 17, 45)).await.unwrap();
    assert!(matches!(outcome, TickOutcome::Swept(_)));
}

#[tokio::test]
async fn test_trigger_now_ignores_daily_marker() {
    let h = harness(&["a", "b"], ScriptedAnalyzer::default());
    h.scheduler.tick_at(at((2026, 3, 1), 9, 0)).await.unwrap();

    let report = h.scheduler.trigger_now().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(matches_from(&h, "a", &["b"]).len(), 2);
    assert_eq!(
        h.scheduler.status().last_fired_date,
        NaiveDate::from_ymd_opt(2026, 3, 1),
        "manual run leaves the marker alone"
    );
}

#[tokio::test]
async fn test_trigger_now_before_schedule_does_not_block_tick() {
    let h = harness(&["a", "b"], ScriptedAnalyzer::default());
    h.scheduler.trigger_now().await.unwrap();
    assert!(h.scheduler.status().last_fired_date.is_none());

    let outcome = h.scheduler.tick_at(at((2026, 3, 1), 9, 0)).await.unwrap();
    assert!(matches!(outcome, TickOutcome::Swept(_)));
}

#[tokio::test]
async fn test_daily_match_message_shape() {
    let analyzer = ScriptedAnalyzer {
        default_score: 6.0,
        scores: HashMap::from([("c".to_string(), 8.0)]),
        ..ScriptedAnalyzer::default()
    };
    let h = harness(&["a", "b", "c"], analyzer);
    h.scheduler.trigger_now().await.unwrap();

    let sent = matches_from(&h, "a", &["b", "c"]);
    assert_eq!(sent.len(), 1);
    let message = &sent[0];
    assert_eq!(message.to_user_id, "c");
    assert_eq!(message.tag, MessageTag::DailyMatch { match_score: 8.0 });
    assert_eq!(message.content, "🌟 Daily Match (Score: 8/10)\n\nHi C!");
}

#[tokio::test]
async fn test_ties_go_to_first_ranked_candidate() {
    let analyzer = ScriptedAnalyzer {
        default_score: 7.0,
        ..ScriptedAnalyzer::default()
    };
    let h = harness(&["a", "b", "c", "d"], analyzer);
    h.scheduler.trigger_now().await.unwrap();

    // Candidates keep directory order with the user removed.
    assert_eq!(matches_from(&h, "a", &["b", "c", "d"])[0].to_user_id, "b");
    assert_eq!(matches_from(&h, "b", &["a", "c", "d"])[0].to_user_id, "a");
    assert_eq!(matches_from(&h, "d", &["a", "b", "c"])[0].to_user_id, "a");
}

#[tokio::test]
async fn test_failing_user_does_not_stop_sweep() {
    let analyzer = ScriptedAnalyzer {
        default_score: 5.0,
        fail_for: HashSet::from(["b".to_string()]),
        ..ScriptedAnalyzer::default()
    };
    let h = harness(&["a", "b", "c"], analyzer);

    let report = h.scheduler.trigger_now().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 2);
    assert!(matches_from(&h, "b", &["a", "c"]).is_empty());
    assert_eq!(matches_from(&h, "c", &["a", "b"]).len(), 1);
}

#[tokio::test]
async fn test_single_user_has_no_candidates() {
    let h = harness(&["solo"], ScriptedAnalyzer::default());
    let report = h.scheduler.trigger_now().await.unwrap();
    assert_eq!(report.users, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.delivery.conversations().conversation_count(), 0);
}

#[tokio::test]
async fn test_unknown_candidate_skipped() {
    let analyzer = ScriptedAnalyzer {
        phantom: Some(RankedMatch {
            candidate_id: "nobody".to_string(),
            score: 10.0,
            reasoning: String::new(),
        }),
        ..ScriptedAnalyzer::default()
    };
    let h = harness(&["a", "b"], analyzer);
    let report = h.scheduler.trigger_now().await.unwrap();
    assert_eq!(report.skipped, 2);
    assert_eq!(h.delivery.conversations().conversation_count(), 0);
}

#[tokio::test]
async fn test_reschedule_moves_due_time() {
    let h = harness(&["a", "b"], ScriptedAnalyzer::default());
    h.scheduler
        .reschedule(NaiveTime::from_hms_opt(18, 30, 0).unwrap());
    assert_eq!(h.scheduler.status().scheduled_time, "18:30");

    let early = h.scheduler.tick_at(at((2026, 3, 1), 9, 0)).await.unwrap();
    assert_eq!(early, TickOutcome::NotDue);
    let due = h.scheduler.tick_at(at((2026, 3, 1), 18, 30)).await.unwrap();
    assert!(matches!(due, TickOutcome::Swept(_)));
}

#[tokio::test]
async fn test_overlapping_sweeps_refused() {
    let gate = Arc::new(Semaphore::new(0));
    let analyzer = ScriptedAnalyzer {
        gate: Some(gate.clone()),
        ..ScriptedAnalyzer::default()
    };
    let h = harness(&["a", "b"], analyzer);

    let scheduler = h.scheduler.clone();
    let running = tokio::spawn(async move { scheduler.trigger_now().await });
    wait_for_running(&h.scheduler).await;

    assert!(matches!(
        h.scheduler.trigger_now().await,
        Err(CoreError::SweepInProgress)
    ));
    assert_eq!(
        h.scheduler.tick_at(at((2026, 3, 1), 9, 0)).await.unwrap(),
        TickOutcome::Busy
    );

    gate.add_permits(2);
    let report = running.await.unwrap().unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(h.scheduler.status().state, SchedulerState::Idle);
}

#[tokio::test]
async fn test_cancelled_sweep_returns_to_idle() {
    let gate = Arc::new(Semaphore::new(0));
    let analyzer = ScriptedAnalyzer {
        gate: Some(gate),
        ..ScriptedAnalyzer::default()
    };
    let h = harness(&["a", "b"], analyzer);

    let scheduler = h.scheduler.clone();
    let running = tokio::spawn(async move { scheduler.trigger_now().await });
    wait_for_running(&h.scheduler).await;

    running.abort();
    let _ = running.await;
    assert_eq!(h.scheduler.status().state, SchedulerState::Idle);
}
