//! Routes fired scheduler jobs to the owning component.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use adjutant_classifier::ClassifierPipeline;
use adjutant_conversation::{ConversationHandler, Reporter};
use adjutant_scheduler::{FiredJob, JobName};
use adjutant_store::health::HealthStore;
use adjutant_tasks::TaskEngine;

pub struct JobRouter {
    pub engine: Arc<TaskEngine>,
    pub classifier: Arc<ClassifierPipeline>,
    pub conversation: Arc<ConversationHandler>,
    pub reporter: Arc<Reporter>,
    pub health: HealthStore,
}

impl JobRouter {
    /// Drain fired jobs until shutdown. Long jobs run detached so a slow
    /// briefing can never delay the per-minute reminder scan.
    pub async fn run(
        self: Arc<Self>,
        mut fired_rx: mpsc::Receiver<FiredJob>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("job router started");
        loop {
            tokio::select! {
                job = fired_rx.recv() => match job {
                    Some(job) => {
                        let router = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = router.dispatch(job.name).await {
                                error!(job = %job.name, error = %e, "job failed");
                            }
                        });
                    }
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("job router stopped");
    }

    async fn dispatch(&self, name: JobName) -> adjutant_core::Result<()> {
        match name {
            JobName::MorningBriefing => self.reporter.morning_briefing().await,
            JobName::DeadlineReview => self.engine.deadline_review().await,
            JobName::ConfidenceBatch => self.classifier.send_batch_review().await,
            JobName::EveningDigest => self.reporter.evening_digest().await,
            JobName::ReminderScan => {
                self.engine.fire_due_reminders(Utc::now()).await.map(|_| ())
            }
            JobName::TrackedTaskCheck => self.engine.check_all_tracked().await,
            JobName::HistoryCompaction => self.conversation.compact_history().map(|_| ()),
            JobName::WeeklyAnalysis => self.reporter.weekly_analysis().await,
            JobName::SchedulerHeartbeat => self
                .health
                .heartbeat("scheduler", "ok", None)
                .map_err(Into::into),
        }
    }
}
