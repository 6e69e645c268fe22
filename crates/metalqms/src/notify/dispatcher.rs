//! Delivery of notifications: preference checks, quiet hours, rate
//! limiting and categorized retries, all reflected in the notification log.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::category::NotificationCategory;
use super::preferences::{Delivery, DropReason};
use super::rate_limit::RateLimiter;
use super::transport::{TelegramTransport, Transport};
use crate::clock::{Clock, Sleeper, SystemClock, ThreadSleeper};
use crate::config::NotificationsConfig;
use crate::db::notification_repo::{self, AttemptUpdate, LogEntry, NewLogEntry, NotificationStatus};
use crate::db::{Database, DatabaseError};
use crate::error::{MetalQmsError, TransportError};
use crate::sanitize;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Notification {0} not found")]
    NotFound(i64),

    #[error("Notification {id} is {status}, only failed notifications can be resent")]
    NotResendable { id: i64, status: NotificationStatus },
}

/// Retry schedule for transient delivery failures: retry `n` waits
/// `base_delay * 2^(n-1)`, and a transient failure once `max_retries`
/// retries were spent is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationRetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for NotificationRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(60),
        }
    }
}

impl NotificationRetryPolicy {
    pub fn from_config(config: &NotificationsConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(config.retry_base_delay_secs),
        }
    }

    /// Delay before the 1-based retry number `retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub user_id: i64,
    pub category: NotificationCategory,
    pub message: String,
    pub urgent: bool,
    /// Related object, e.g. `("certificate", 17)`.
    pub object: Option<(String, i64)>,
}

impl NotificationRequest {
    pub fn new(user_id: i64, category: NotificationCategory, message: impl Into<String>) -> Self {
        Self {
            user_id,
            category,
            message: message.into(),
            urgent: false,
            object: None,
        }
    }

    pub fn urgent(mut self) -> Self {
        self.urgent = true;
        self
    }

    pub fn about(mut self, object_type: impl Into<String>, object_id: i64) -> Self {
        self.object = Some((object_type.into(), object_id));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing was logged or sent.
    Dropped(DropReason),
    /// Logged `pending`, to be delivered after quiet hours.
    Suppressed { log_id: i64, until: DateTime<Utc> },
    Sent { log_id: i64 },
    Retrying {
        log_id: i64,
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
    },
    Failed { log_id: i64, error: TransportError },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DueReport {
    pub sent: usize,
    pub retrying: usize,
    pub failed: usize,
    pub suppressed: usize,
    pub dropped: usize,
    /// Due entries another dispatcher took first.
    pub claimed_elsewhere: usize,
}

impl DueReport {
    fn record(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Dropped(_) => self.dropped += 1,
            DispatchOutcome::Suppressed { .. } => self.suppressed += 1,
            DispatchOutcome::Sent { .. } => self.sent += 1,
            DispatchOutcome::Retrying { .. } => self.retrying += 1,
            DispatchOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

pub struct Dispatcher {
    db: Database,
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    policy: NotificationRetryPolicy,
}

impl Dispatcher {
    pub fn new(
        db: Database,
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            db,
            transport,
            limiter,
            clock,
            sleeper,
            policy: NotificationRetryPolicy::default(),
        }
    }

    /// Telegram transport with the resolved bot token, system clock and
    /// real sleeps.
    pub fn from_config(db: Database, config: &NotificationsConfig) -> Result<Self, MetalQmsError> {
        let transport = TelegramTransport::from_config(config)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let limiter = Arc::new(RateLimiter::new(config.rate_limit_per_second, clock.clone()));
        Ok(
            Self::new(db, Arc::new(transport), limiter, clock, Arc::new(ThreadSleeper))
                .with_policy(NotificationRetryPolicy::from_config(config)),
        )
    }

    pub fn with_policy(mut self, policy: NotificationRetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Decides, logs and (when allowed right now) delivers one message.
    pub fn send(&self, request: &NotificationRequest) -> Result<DispatchOutcome, DispatchError> {
        let now = self.clock.now();
        let Some(prefs) = notification_repo::find_preferences(&self.db, request.user_id)? else {
            debug!(user_id = request.user_id, "no notification preferences, dropping");
            return Ok(DispatchOutcome::Dropped(DropReason::NoPreferences));
        };

        let decision = prefs.evaluate(request.category, request.urgent, now);
        let chat_id = prefs.chat_id().unwrap_or_default();
        let (object_type, object_id) = match &request.object {
            Some((kind, id)) => (Some(kind.as_str()), Some(*id)),
            None => (None, None),
        };
        let mut entry = NewLogEntry {
            user_id: request.user_id,
            category: request.category,
            chat_id,
            message: &request.message,
            urgent: request.urgent,
            object_type,
            object_id,
            next_attempt_at: None,
        };

        match decision {
            Delivery::Drop(reason) => {
                debug!(
                    user_id = request.user_id,
                    category = %request.category,
                    reason = reason.as_str(),
                    "notification dropped"
                );
                Ok(DispatchOutcome::Dropped(reason))
            }
            Delivery::Suppress { until } => {
                entry.next_attempt_at = Some(until);
                let log_id = notification_repo::insert_log(&self.db, &entry, now)?;
                info!(
                    log_id,
                    user_id = request.user_id,
                    until = %until,
                    "quiet hours, notification held back"
                );
                Ok(DispatchOutcome::Suppressed { log_id, until })
            }
            Delivery::Deliver => {
                let log_id = notification_repo::insert_log(&self.db, &entry, now)?;
                let stored = notification_repo::find_log(&self.db, log_id)?
                    .ok_or(DispatchError::NotFound(log_id))?;
                self.deliver(&stored)
            }
        }
    }

    /// Delivers held-back and retry entries whose time has come.
    pub fn run_due(&self, limit: usize) -> Result<DueReport, DispatchError> {
        let now = self.clock.now();
        let entries = notification_repo::due(&self.db, now, limit)?;
        let mut report = DueReport::default();

        for entry in entries {
            if !notification_repo::claim_due(&self.db, entry.id, now)? {
                debug!(log_id = entry.id, "due notification already claimed");
                report.claimed_elsewhere += 1;
                continue;
            }

            let decision = match notification_repo::find_preferences(&self.db, entry.user_id)? {
                Some(prefs) => prefs.evaluate(entry.category, entry.urgent, now),
                None => Delivery::Drop(DropReason::NoPreferences),
            };

            let outcome = match decision {
                Delivery::Deliver => self.deliver(&entry)?,
                Delivery::Suppress { until } => {
                    notification_repo::reschedule(&self.db, entry.id, until, now)?;
                    DispatchOutcome::Suppressed {
                        log_id: entry.id,
                        until,
                    }
                }
                Delivery::Drop(reason) => {
                    notification_repo::record_attempt(
                        &self.db,
                        entry.id,
                        &AttemptUpdate {
                            status: NotificationStatus::Failed,
                            retry_count: entry.retry_count,
                            error_message: Some(reason.as_str().to_string()),
                            sent_at: None,
                            next_attempt_at: None,
                        },
                        now,
                    )?;
                    DispatchOutcome::Dropped(reason)
                }
            };
            report.record(&outcome);
        }

        if report != DueReport::default() {
            info!(
                sent = report.sent,
                retrying = report.retrying,
                failed = report.failed,
                suppressed = report.suppressed,
                dropped = report.dropped,
                claimed_elsewhere = report.claimed_elsewhere,
                "due notifications processed"
            );
        }
        Ok(report)
    }

    /// Sends a failed entry again with a fresh retry budget.
    pub fn resend(&self, log_id: i64) -> Result<DispatchOutcome, DispatchError> {
        if !notification_repo::reopen_failed(&self.db, log_id, self.clock.now())? {
            let entry = notification_repo::find_log(&self.db, log_id)?
                .ok_or(DispatchError::NotFound(log_id))?;
            return Err(DispatchError::NotResendable {
                id: log_id,
                status: entry.status,
            });
        }

        let entry = notification_repo::find_log(&self.db, log_id)?
            .ok_or(DispatchError::NotFound(log_id))?;
        info!(log_id, "resending notification");
        self.deliver(&entry)
    }

    /// Sends one message to several users, each under their own
    /// preferences. Repeated ids get a single message.
    pub fn send_many(
        &self,
        user_ids: &[i64],
        category: NotificationCategory,
        message: &str,
        urgent: bool,
    ) -> Result<Vec<(i64, DispatchOutcome)>, DispatchError> {
        let mut recipients = user_ids.to_vec();
        recipients.sort_unstable();
        recipients.dedup();

        let mut summary = DueReport::default();
        let mut outcomes = Vec::with_capacity(recipients.len());
        for user_id in recipients {
            let mut request = NotificationRequest::new(user_id, category, message);
            request.urgent = urgent;
            let outcome = self.send(&request)?;
            summary.record(&outcome);
            outcomes.push((user_id, outcome));
        }

        info!(
            recipients = outcomes.len(),
            sent = summary.sent,
            failed = summary.failed,
            dropped = summary.dropped,
            category = %category,
            "bulk notification dispatched"
        );
        Ok(outcomes)
    }

    /// Deletes log entries older than `days` days.
    pub fn cleanup(&self, days: u32) -> Result<usize, DispatchError> {
        let cutoff = self.clock.now() - chrono::Duration::days(i64::from(days));
        let deleted = notification_repo::delete_older_than(&self.db, cutoff)?;
        info!(deleted, days, "old notification log entries removed");
        Ok(deleted)
    }

    fn deliver(&self, entry: &LogEntry) -> Result<DispatchOutcome, DispatchError> {
        let wait = self.limiter.reserve();
        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "rate limit, waiting");
            self.sleeper.sleep(wait);
        }

        let result = self.transport.send(&entry.chat_id, &entry.message);
        let now = self.clock.now();
        let chat = sanitize::redact_chat_id(&entry.chat_id);

        let (update, outcome) = match result {
            Ok(()) => {
                info!(log_id = entry.id, chat_id = %chat, category = %entry.category, "notification sent");
                (
                    AttemptUpdate {
                        status: NotificationStatus::Sent,
                        retry_count: entry.retry_count,
                        error_message: None,
                        sent_at: Some(now),
                        next_attempt_at: None,
                    },
                    DispatchOutcome::Sent { log_id: entry.id },
                )
            }
            Err(err @ TransportError::Permanent(_)) => {
                warn!(
                    log_id = entry.id,
                    user_id = entry.user_id,
                    chat_id = %chat,
                    error = %err,
                    "recipient unreachable, disabling notifications"
                );
                notification_repo::disable_user(&self.db, entry.user_id)?;
                (
                    failed(entry.retry_count, &err),
                    DispatchOutcome::Failed {
                        log_id: entry.id,
                        error: err,
                    },
                )
            }
            Err(err @ TransportError::Malformed(_)) => {
                error!(log_id = entry.id, error = %err, "notification rejected as malformed");
                (
                    failed(entry.retry_count, &err),
                    DispatchOutcome::Failed {
                        log_id: entry.id,
                        error: err,
                    },
                )
            }
            Err(err @ TransportError::Transient(_)) => {
                if entry.retry_count < self.policy.max_retries {
                    let retry_count = entry.retry_count + 1;
                    let delay = self.policy.delay_for(retry_count);
                    let next_attempt_at = now
                        + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                    warn!(
                        log_id = entry.id,
                        retry_count,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "transient delivery failure, will retry"
                    );
                    (
                        AttemptUpdate {
                            status: NotificationStatus::Retry,
                            retry_count,
                            error_message: Some(err.to_string()),
                            sent_at: None,
                            next_attempt_at: Some(next_attempt_at),
                        },
                        DispatchOutcome::Retrying {
                            log_id: entry.id,
                            retry_count,
                            next_attempt_at,
                        },
                    )
                } else {
                    error!(
                        log_id = entry.id,
                        retry_count = entry.retry_count,
                        error = %err,
                        "retries exhausted, giving up"
                    );
                    (
                        failed(entry.retry_count, &err),
                        DispatchOutcome::Failed {
                            log_id: entry.id,
                            error: err,
                        },
                    )
                }
            }
        };

        notification_repo::record_attempt(&self.db, entry.id, &update, now)?;
        Ok(outcome)
    }
}

fn failed(retry_count: u32, err: &TransportError) -> AttemptUpdate {
    AttemptUpdate {
        status: NotificationStatus::Failed,
        retry_count,
        error_message: Some(err.to_string()),
        sent_at: None,
        next_attempt_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, RecordingSleeper};
    use crate::notify::preferences::{NotificationPreferences, QuietHours};
    use crate::notify::transport::RecordingTransport;
    use chrono::{NaiveTime, TimeZone};

    struct Fixture {
        db: Database,
        clock: Arc<ManualClock>,
        transport: Arc<RecordingTransport>,
        sleeper: Arc<RecordingSleeper>,
        dispatcher: Dispatcher,
    }

    fn fixture(per_second: u32) -> Fixture {
        let db = Database::open_in_memory().unwrap();
        // 12:00 in UTC+3
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()));
        let transport = Arc::new(RecordingTransport::new());
        let sleeper = Arc::new(RecordingSleeper::new());
        let limiter = Arc::new(RateLimiter::new(per_second, clock.clone()));
        let dispatcher = Dispatcher::new(
            db.clone(),
            transport.clone(),
            limiter,
            clock.clone(),
            sleeper.clone(),
        );
        Fixture {
            db,
            clock,
            transport,
            sleeper,
            dispatcher,
        }
    }

    fn subscribe(db: &Database, user_id: i64) {
        notification_repo::upsert_preferences(db, &NotificationPreferences::new(user_id, "100200300"))
            .unwrap();
    }

    fn status_update(user_id: i64) -> NotificationRequest {
        NotificationRequest::new(user_id, NotificationCategory::StatusUpdate, "status changed")
            .about("material", 4)
    }

    #[test]
    fn test_policy_delays_double() {
        let policy = NotificationRetryPolicy::default();
        let minutes: Vec<u64> = (1..=5).map(|n| policy.delay_for(n).as_secs() / 60).collect();
        assert_eq!(minutes, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn test_send_delivers_and_logs() {
        let f = fixture(30);
        subscribe(&f.db, 1);

        let outcome = f.dispatcher.send(&status_update(1)).unwrap();
        let DispatchOutcome::Sent { log_id } = outcome else {
            panic!("expected sent, got {outcome:?}");
        };

        let entry = notification_repo::find_log(&f.db, log_id).unwrap().unwrap();
        assert_eq!(entry.status, NotificationStatus::Sent);
        assert_eq!(entry.object_type.as_deref(), Some("material"));
        assert_eq!(entry.sent_at, Some(f.clock.now()));
        assert_eq!(f.transport.attempts(), vec![("100200300".to_string(), "status changed".to_string())]);
    }

    #[test]
    fn test_unknown_user_is_dropped_without_log() {
        let f = fixture(30);
        let outcome = f.dispatcher.send(&status_update(9)).unwrap();
        assert_eq!(outcome, DispatchOutcome::Dropped(DropReason::NoPreferences));
        assert!(f.transport.attempts().is_empty());
        assert!(notification_repo::count_by_status(&f.db).unwrap().is_empty());
    }

    #[test]
    fn test_quiet_hours_hold_then_run_due_delivers() {
        let f = fixture(30);
        let mut prefs = NotificationPreferences::new(1, "100200300");
        prefs.quiet_hours = QuietHours::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        );
        notification_repo::upsert_preferences(&f.db, &prefs).unwrap();
        // 23:00 local
        f.clock.set(Utc.with_ymd_and_hms(2024, 5, 10, 20, 0, 0).unwrap());

        let outcome = f.dispatcher.send(&status_update(1)).unwrap();
        let until = Utc.with_ymd_and_hms(2024, 5, 11, 5, 0, 0).unwrap();
        let DispatchOutcome::Suppressed { log_id, until: held } = outcome else {
            panic!("expected suppressed, got {outcome:?}");
        };
        assert_eq!(held, until);
        assert!(f.transport.attempts().is_empty());

        assert_eq!(f.dispatcher.run_due(10).unwrap(), DueReport::default());

        f.clock.set(until);
        let report = f.dispatcher.run_due(10).unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(
            notification_repo::find_log(&f.db, log_id).unwrap().unwrap().status,
            NotificationStatus::Sent
        );
    }

    #[test]
    fn test_blocked_recipient_disables_user() {
        let f = fixture(30);
        subscribe(&f.db, 1);
        f.transport
            .push_result(Err(TransportError::Permanent("Forbidden: bot was blocked by the user".into())));

        let outcome = f.dispatcher.send(&status_update(1)).unwrap();
        let DispatchOutcome::Failed { log_id, error } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(matches!(error, TransportError::Permanent(_)));

        let entry = notification_repo::find_log(&f.db, log_id).unwrap().unwrap();
        assert_eq!(entry.status, NotificationStatus::Failed);
        assert_eq!(entry.next_attempt_at, None);
        assert!(!notification_repo::find_preferences(&f.db, 1).unwrap().unwrap().enabled);

        // nothing is scheduled, and the user now gets nothing
        f.clock.advance(Duration::from_secs(3600));
        assert_eq!(f.dispatcher.run_due(10).unwrap(), DueReport::default());
        assert_eq!(
            f.dispatcher.send(&status_update(1)).unwrap(),
            DispatchOutcome::Dropped(DropReason::Disabled)
        );
        assert_eq!(f.transport.attempts().len(), 1);
    }

    #[test]
    fn test_malformed_fails_without_retry() {
        let f = fixture(30);
        subscribe(&f.db, 1);
        f.transport
            .push_result(Err(TransportError::Malformed("400 Bad Request: can't parse entities".into())));

        let outcome = f.dispatcher.send(&status_update(1)).unwrap();
        assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
        assert!(notification_repo::find_preferences(&f.db, 1).unwrap().unwrap().enabled);
    }

    #[test]
    fn test_transient_failure_schedules_retry() {
        let f = fixture(30);
        subscribe(&f.db, 1);
        f.transport.push_result(Err(TransportError::Transient("timeout".into())));

        let start = f.clock.now();
        let outcome = f.dispatcher.send(&status_update(1)).unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Retrying {
                log_id: 1,
                retry_count: 1,
                next_attempt_at: start + chrono::Duration::minutes(1),
            }
        );

        f.clock.advance(Duration::from_secs(60));
        let report = f.dispatcher.run_due(10).unwrap();
        assert_eq!(report.sent, 1);
        let entry = notification_repo::find_log(&f.db, 1).unwrap().unwrap();
        assert_eq!(entry.status, NotificationStatus::Sent);
        assert_eq!(entry.retry_count, 1);
    }

    #[test]
    fn test_resend_only_failed_entries() {
        let f = fixture(30);
        subscribe(&f.db, 1);
        f.transport.push_result(Err(TransportError::Malformed("bad".into())));
        f.dispatcher.send(&status_update(1)).unwrap();

        assert_eq!(f.dispatcher.resend(1).unwrap(), DispatchOutcome::Sent { log_id: 1 });
        assert!(matches!(
            f.dispatcher.resend(1),
            Err(DispatchError::NotResendable { id: 1, status: NotificationStatus::Sent })
        ));
        assert!(matches!(f.dispatcher.resend(77), Err(DispatchError::NotFound(77))));
    }

    /// Delivers after a fixed latency so that concurrent dispatchers overlap.
    struct SlowTransport {
        inner: RecordingTransport,
        latency: Duration,
    }

    impl Transport for SlowTransport {
        fn send(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
            std::thread::sleep(self.latency);
            self.inner.send(chat_id, text)
        }
    }

    #[test]
    fn test_concurrent_run_due_delivers_each_entry_once() {
        let db = Database::open_in_memory().unwrap();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()));
        let transport = Arc::new(SlowTransport {
            inner: RecordingTransport::new(),
            latency: Duration::from_millis(200),
        });
        transport
            .inner
            .push_result(Err(TransportError::Transient("502 Bad Gateway".into())));
        let dispatcher = Dispatcher::new(
            db.clone(),
            transport.clone(),
            Arc::new(RateLimiter::new(30, clock.clone())),
            clock.clone(),
            Arc::new(RecordingSleeper::new()),
        );
        subscribe(&db, 1);

        let outcome = dispatcher.send(&status_update(1)).unwrap();
        let DispatchOutcome::Retrying { log_id, .. } = outcome else {
            panic!("expected a retry, got {outcome:?}");
        };
        clock.advance(Duration::from_secs(60));

        let reports: Vec<DueReport> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..2)
                .map(|_| scope.spawn(|| dispatcher.run_due(10).unwrap()))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(reports.iter().map(|r| r.sent).sum::<usize>(), 1);
        assert_eq!(transport.inner.attempts().len(), 2);
        let entry = notification_repo::find_log(&db, log_id).unwrap().unwrap();
        assert_eq!(entry.status, NotificationStatus::Sent);
        assert_eq!(entry.retry_count, 1);
    }

    #[test]
    fn test_send_many_fans_out_once_per_user() {
        let f = fixture(30);
        subscribe(&f.db, 1);
        subscribe(&f.db, 2);

        let outcomes = f
            .dispatcher
            .send_many(&[2, 1, 2, 9], NotificationCategory::StatusUpdate, "plant stop at 14:00", false)
            .unwrap();

        let users: Vec<i64> = outcomes.iter().map(|(user, _)| *user).collect();
        assert_eq!(users, vec![1, 2, 9]);
        assert!(matches!(outcomes[0].1, DispatchOutcome::Sent { .. }));
        assert!(matches!(outcomes[1].1, DispatchOutcome::Sent { .. }));
        assert_eq!(outcomes[2].1, DispatchOutcome::Dropped(DropReason::NoPreferences));
        assert_eq!(f.transport.attempts().len(), 2);
    }

    #[test]
    fn test_rate_limit_waits_go_through_sleeper() {
        let f = fixture(1);
        subscribe(&f.db, 1);

        f.dispatcher.send(&status_update(1)).unwrap();
        f.dispatcher.send(&status_update(1)).unwrap();

        assert_eq!(f.sleeper.delays(), vec![Duration::from_secs(1)]);
        assert_eq!(f.transport.attempts().len(), 2);
    }

    #[test]
    fn test_cleanup_removes_old_entries() {
        let f = fixture(30);
        subscribe(&f.db, 1);
        f.dispatcher.send(&status_update(1)).unwrap();

        f.clock.advance(Duration::from_secs(31 * 24 * 3600));
        f.dispatcher.send(&status_update(1)).unwrap();

        assert_eq!(f.dispatcher.cleanup(30).unwrap(), 1);
        assert_eq!(notification_repo::count_by_status(&f.db).unwrap().get("sent"), Some(&1));
    }
}
