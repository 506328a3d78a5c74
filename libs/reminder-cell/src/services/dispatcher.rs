use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use shared_config::{AppConfig, STALE_SENDING_MINUTES_RANGE};

use crate::error::ReminderError;
use crate::models::ScheduledMessage;
use crate::services::notifier::{Notifier, OutboundMessage};
use crate::services::store::{MessageStore, PatientDirectory};
use crate::services::template::{patient_vars, render, render_json};

/// Error recorded on messages whose claim outlived the stale window.
pub const INTERRUPTED: &str = "dispatch interrupted";
pub const NO_DESTINATION: &str = "no destination id";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub batch_size: usize,
    pub stale_after: Duration,
}

impl DispatcherConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let (min_stale, max_stale) = STALE_SENDING_MINUTES_RANGE;
        Self {
            batch_size: config.reminder_batch_size.max(1),
            stale_after: Duration::minutes(config.reminder_stale_sending_minutes.clamp(min_stale, max_stale)),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            stale_after: Duration::minutes(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub selected: usize,
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    /// Due messages another run claimed first.
    pub lost_claims: usize,
    pub stale_failed: usize,
}

enum Delivery {
    Sent,
    Failed,
}

pub struct ReminderDispatcher {
    messages: Arc<dyn MessageStore>,
    patients: Arc<dyn PatientDirectory>,
    notifier: Arc<dyn Notifier>,
    config: DispatcherConfig,
}

impl ReminderDispatcher {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        patients: Arc<dyn PatientDirectory>,
        notifier: Arc<dyn Notifier>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            messages,
            patients,
            notifier,
            config,
        }
    }

    /// One dispatcher pass. Only the batch selection can fail the run; every
    /// per-message problem is recorded on that message and the batch goes on.
    #[instrument(skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<DispatchSummary, ReminderError> {
        let mut summary = DispatchSummary::default();

        match self
            .messages
            .fail_stale_sending_all_tenants(now - self.config.stale_after)
            .await
        {
            Ok(0) => {}
            Ok(count) => {
                warn!("Marked {} interrupted reminders as failed", count);
                summary.stale_failed = count;
            }
            Err(e) => error!("Stale claim sweep failed: {}", e),
        }

        let due = self
            .messages
            .due_messages_all_tenants(now, self.config.batch_size)
            .await?;
        summary.selected = due.len();

        for message in &due {
            match self.messages.claim_message(&message.tenant_id, message.id, now).await {
                Ok(true) => summary.claimed += 1,
                Ok(false) => {
                    debug!("Reminder {} already claimed", message.id);
                    summary.lost_claims += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Failed to claim reminder {}: {}", message.id, e);
                    continue;
                }
            }

            match self.deliver(message, now).await {
                Delivery::Sent => summary.sent += 1,
                Delivery::Failed => summary.failed += 1,
            }
        }

        if summary.selected > 0 || summary.stale_failed > 0 {
            info!(
                "Reminder dispatch: {} due, {} sent, {} failed, {} claimed elsewhere",
                summary.selected, summary.sent, summary.failed, summary.lost_claims
            );
        }
        Ok(summary)
    }

    /// Runs `run` on a fixed interval until the task is dropped.
    pub async fn run_forever(self: Arc<Self>, every: StdDuration) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(e) = self.run(Utc::now()).await {
                error!("Reminder dispatch run failed: {}", e);
            }
        }
    }

    async fn deliver(&self, message: &ScheduledMessage, now: DateTime<Utc>) -> Delivery {
        let Some(destination) = message.destination_id.as_deref().filter(|d| !d.is_empty()) else {
            warn!("Reminder {} has no destination, marking failed", message.id);
            self.record_failure(message, NO_DESTINATION).await;
            return Delivery::Failed;
        };

        let outbound = match self.compose(message).await {
            Ok(outbound) => outbound,
            Err(e) => {
                warn!("Could not compose reminder {}: {}", message.id, e);
                self.record_failure(message, &e.to_string()).await;
                return Delivery::Failed;
            }
        };

        match self.notifier.push(destination, &outbound).await {
            Ok(()) => {
                if let Err(e) = self.messages.mark_sent(&message.tenant_id, message.id, now).await {
                    error!("Reminder {} was delivered but could not be marked sent: {}", message.id, e);
                }
                info!("Reminder {} sent to {}", message.id, destination);
                Delivery::Sent
            }
            Err(e) => {
                warn!("Reminder {} delivery failed: {}", message.id, e);
                self.record_failure(message, &e.to_string()).await;
                Delivery::Failed
            }
        }
    }

    /// Fills patient variables from the current patient record.
    async fn compose(&self, message: &ScheduledMessage) -> Result<OutboundMessage, ReminderError> {
        let name = self
            .patients
            .get_name(&message.tenant_id, message.patient_id)
            .await?;
        let vars = patient_vars(message.patient_id, name.as_deref());

        match (&message.flex_payload, &message.content) {
            (Some(flex), content) => Ok(OutboundMessage::Flex {
                alt_text: content
                    .as_deref()
                    .map(|text| render(text, &vars))
                    .unwrap_or_default(),
                contents: render_json(flex, &vars),
            }),
            (None, Some(content)) => Ok(OutboundMessage::Text(render(content, &vars))),
            (None, None) => Err(ReminderError::validation("message has no content")),
        }
    }

    async fn record_failure(&self, message: &ScheduledMessage, reason: &str) {
        if let Err(e) = self
            .messages
            .mark_failed(&message.tenant_id, message.id, reason)
            .await
        {
            error!("Failed to mark reminder {} as failed: {}", message.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageStatus, NewScheduledMessage};
    use crate::services::memory::InMemoryReminderStore;
    use crate::services::store::MockPatientDirectory;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use mockall::predicate::eq;
    use serde_json::json;
    use shared_models::tenant::TenantId;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingNotifier {
        pushed: Mutex<Vec<(String, OutboundMessage)>>,
        fail_for: Option<String>,
    }

    impl RecordingNotifier {
        fn pushed(&self) -> Vec<(String, OutboundMessage)> {
            self.pushed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn push(&self, destination_id: &str, message: &OutboundMessage) -> Result<(), ReminderError> {
            if self.fail_for.as_deref() == Some(destination_id) {
                return Err(ReminderError::Dispatch("LINE push rejected (400): invalid to".to_string()));
            }
            self.pushed
                .lock()
                .unwrap()
                .push((destination_id.to_string(), message.clone()));
            Ok(())
        }
    }

    fn tenant() -> TenantId {
        TenantId::parse("clinic-a").unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap()
    }

    async fn schedule(
        store: &InMemoryReminderStore,
        patient_id: Uuid,
        destination: Option<&str>,
        scheduled_at: DateTime<Utc>,
    ) -> ScheduledMessage {
        store
            .schedule_once(
                &tenant(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                NewScheduledMessage {
                    patient_id,
                    destination_id: destination.map(str::to_string),
                    content: Some("{patient_name}様 明日 10:00".to_string()),
                    flex_payload: None,
                    scheduled_at,
                },
            )
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_config_clamps_stale_window() {
        let config = AppConfig {
            reminder_stale_sending_minutes: i64::MAX,
            ..AppConfig::default()
        };
        let dispatcher_config = DispatcherConfig::from_app_config(&config);
        assert_eq!(
            dispatcher_config.stale_after,
            Duration::minutes(STALE_SENDING_MINUTES_RANGE.1)
        );
    }

    fn named_patients(name: &'static str) -> MockPatientDirectory {
        let mut patients = MockPatientDirectory::new();
        patients
            .expect_get_name()
            .returning(move |_, _| Ok(Some(name.to_string())));
        patients
    }

    fn dispatcher(
        store: &Arc<InMemoryReminderStore>,
        patients: MockPatientDirectory,
        notifier: &Arc<RecordingNotifier>,
    ) -> ReminderDispatcher {
        ReminderDispatcher::new(
            store.clone(),
            Arc::new(patients),
            notifier.clone(),
            DispatcherConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_due_message_sent_with_current_name() {
        let store = Arc::new(InMemoryReminderStore::new());
        let patient = Uuid::new_v4();
        let message = schedule(&store, patient, Some("U1"), now() - Duration::minutes(1)).await;

        let mut patients = MockPatientDirectory::new();
        patients
            .expect_get_name()
            .with(eq(tenant()), eq(patient))
            .times(1)
            .returning(|_, _| Ok(Some("山田花子".to_string())));

        let notifier = Arc::new(RecordingNotifier::default());
        let summary = dispatcher(&store, patients, &notifier).run(now()).await.unwrap();

        assert_eq!(summary.sent, 1);
        assert_eq!(
            notifier.pushed(),
            vec![("U1".to_string(), OutboundMessage::Text("山田花子様 明日 10:00".to_string()))]
        );

        let stored = store.get_message(&tenant(), message.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Sent);
        assert_eq!(stored.sent_at, Some(now()));
    }

    #[tokio::test]
    async fn test_future_message_is_not_selected() {
        let store = Arc::new(InMemoryReminderStore::new());
        let message = schedule(&store, Uuid::new_v4(), Some("U1"), now() + Duration::minutes(5)).await;

        let notifier = Arc::new(RecordingNotifier::default());
        let summary = dispatcher(&store, MockPatientDirectory::new(), &notifier)
            .run(now())
            .await
            .unwrap();

        assert_eq!(summary.selected, 0);
        assert!(notifier.pushed().is_empty());
        let stored = store.get_message(&tenant(), message.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_missing_destination_fails_without_push() {
        let store = Arc::new(InMemoryReminderStore::new());
        let message = schedule(&store, Uuid::new_v4(), None, now()).await;

        let notifier = Arc::new(RecordingNotifier::default());
        let summary = dispatcher(&store, MockPatientDirectory::new(), &notifier)
            .run(now())
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert!(notifier.pushed().is_empty());
        let stored = store.get_message(&tenant(), message.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some(NO_DESTINATION));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_batch() {
        let store = Arc::new(InMemoryReminderStore::new());
        let bad = schedule(&store, Uuid::new_v4(), Some("bad"), now() - Duration::minutes(2)).await;
        let good = schedule(&store, Uuid::new_v4(), Some("U2"), now() - Duration::minutes(1)).await;

        let notifier = Arc::new(RecordingNotifier {
            fail_for: Some("bad".to_string()),
            ..RecordingNotifier::default()
        });
        let summary = dispatcher(&store, named_patients("Taro"), &notifier)
            .run(now())
            .await
            .unwrap();

        assert_eq!((summary.sent, summary.failed), (1, 1));
        let bad = store.get_message(&tenant(), bad.id).await.unwrap().unwrap();
        assert_eq!(bad.status, MessageStatus::Failed);
        assert!(bad.error_message.unwrap().contains("invalid to"));
        let good = store.get_message(&tenant(), good.id).await.unwrap().unwrap();
        assert_eq!(good.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_failed_message_is_not_retried() {
        let store = Arc::new(InMemoryReminderStore::new());
        schedule(&store, Uuid::new_v4(), Some("bad"), now()).await;

        let notifier = Arc::new(RecordingNotifier {
            fail_for: Some("bad".to_string()),
            ..RecordingNotifier::default()
        });
        let dispatcher = dispatcher(&store, named_patients("Taro"), &notifier);

        assert_eq!(dispatcher.run(now()).await.unwrap().failed, 1);
        let second = dispatcher.run(now() + Duration::minutes(5)).await.unwrap();
        assert_eq!(second.selected, 0);
    }

    #[tokio::test]
    async fn test_batch_is_bounded_and_oldest_first() {
        let store = Arc::new(InMemoryReminderStore::new());
        let oldest = schedule(&store, Uuid::new_v4(), Some("U-old"), now() - Duration::hours(3)).await;
        schedule(&store, Uuid::new_v4(), Some("U-mid"), now() - Duration::hours(2)).await;
        schedule(&store, Uuid::new_v4(), Some("U-new"), now() - Duration::hours(1)).await;

        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = ReminderDispatcher::new(
            store.clone(),
            Arc::new(named_patients("Taro")),
            notifier.clone(),
            DispatcherConfig {
                batch_size: 2,
                ..DispatcherConfig::default()
            },
        );

        let summary = dispatcher.run(now()).await.unwrap();
        assert_eq!(summary.selected, 2);
        let pushed: Vec<String> = notifier.pushed().into_iter().map(|(to, _)| to).collect();
        assert_eq!(pushed, vec!["U-old".to_string(), "U-mid".to_string()]);

        let stored = store.get_message(&tenant(), oldest.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_concurrent_runs_deliver_once() {
        let store = Arc::new(InMemoryReminderStore::new());
        schedule(&store, Uuid::new_v4(), Some("U1"), now()).await;

        let notifier = Arc::new(RecordingNotifier::default());
        let first = dispatcher(&store, named_patients("Taro"), &notifier);
        let second = dispatcher(&store, named_patients("Taro"), &notifier);

        let (a, b) = tokio::join!(first.run(now()), second.run(now()));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.sent + b.sent, 1);
        assert_eq!(notifier.pushed().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_sending_is_failed() {
        let store = Arc::new(InMemoryReminderStore::new());
        let message = schedule(&store, Uuid::new_v4(), Some("U1"), now() - Duration::hours(2)).await;
        assert!(store
            .claim_message(&tenant(), message.id, now() - Duration::hours(1))
            .await
            .unwrap());

        let notifier = Arc::new(RecordingNotifier::default());
        let summary = dispatcher(&store, MockPatientDirectory::new(), &notifier)
            .run(now())
            .await
            .unwrap();

        assert_eq!(summary.stale_failed, 1);
        let stored = store.get_message(&tenant(), message.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some(INTERRUPTED));
    }

    #[tokio::test]
    async fn test_flex_message_renders_patient_vars() {
        let store = Arc::new(InMemoryReminderStore::new());
        store
            .schedule_once(
                &tenant(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                NewScheduledMessage {
                    patient_id: Uuid::new_v4(),
                    destination_id: Some("U1".to_string()),
                    content: Some("{name}様へのお知らせ".to_string()),
                    flex_payload: Some(json!({ "type": "bubble", "text": "{patient_name}様" })),
                    scheduled_at: now(),
                },
            )
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        dispatcher(&store, named_patients("Hanako"), &notifier)
            .run(now())
            .await
            .unwrap();

        let pushed = notifier.pushed();
        assert_eq!(
            pushed[0].1,
            OutboundMessage::Flex {
                alt_text: "Hanako様へのお知らせ".to_string(),
                contents: json!({ "type": "bubble", "text": "Hanako様" }),
            }
        );
    }
}
