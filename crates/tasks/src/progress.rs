use chrono::{DateTime, Utc};
use coordinator_core::DistributedTaskStatus;
use serde::{Deserialize, Serialize};

/// 长任务的公共进度状态
///
/// `percentage` 只增不减；到达最后一步不会自动完成，必须显式调用 `complete`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedTaskProgress {
    pub id: String,
    pub percentage: f64,
    pub is_completed: bool,
    pub exception: Option<String>,
    pub status: DistributedTaskStatus,
    pub step_count: u32,
    pub done_steps: u32,
    pub start_date_time: Option<DateTime<Utc>>,
    pub stop_date_time: Option<DateTime<Utc>>,
}

impl DistributedTaskProgress {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            percentage: 0.0,
            is_completed: false,
            exception: None,
            status: DistributedTaskStatus::Created,
            step_count: 0,
            done_steps: 0,
            start_date_time: None,
            stop_date_time: None,
        }
    }

    pub fn set_step_count(&mut self, step_count: u32) {
        self.step_count = step_count;
    }

    pub fn start(&mut self) {
        self.status = DistributedTaskStatus::Running;
        self.start_date_time.get_or_insert_with(Utc::now);
    }

    /// 完成一步并按 `done_steps / step_count` 重新计算百分比
    pub fn step_done(&mut self) {
        self.done_steps = self.done_steps.saturating_add(1);
        if self.step_count > 0 {
            let percentage = self.done_steps as f64 / self.step_count as f64 * 100.0;
            self.set_percentage(percentage);
        }
    }

    /// 设置百分比，限制在 0..=100 且不会回退
    pub fn set_percentage(&mut self, percentage: f64) {
        let percentage = percentage.clamp(0.0, 100.0);
        if percentage > self.percentage {
            self.percentage = percentage;
        }
    }

    pub fn complete(&mut self) {
        self.percentage = 100.0;
        self.is_completed = true;
        self.status = DistributedTaskStatus::Completed;
        self.stop_date_time = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.exception = Some(error.into());
        self.is_completed = true;
        self.status = DistributedTaskStatus::Failed;
        self.stop_date_time = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.is_completed = true;
        self.status = DistributedTaskStatus::Canceled;
        self.stop_date_time = Some(Utc::now());
    }
}
