use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::UnknownVariant;

/// Kind of notification, used for per-user opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    StatusUpdate,
    TaskAssignment,
    DailySummary,
    UrgentAlert,
    SlaWarning,
    QualityAlert,
    WorkflowComplete,
    CertificateProcessed,
}

impl NotificationCategory {
    pub const ALL: [NotificationCategory; 8] = [
        Self::StatusUpdate,
        Self::TaskAssignment,
        Self::DailySummary,
        Self::UrgentAlert,
        Self::SlaWarning,
        Self::QualityAlert,
        Self::WorkflowComplete,
        Self::CertificateProcessed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusUpdate => "status_update",
            Self::TaskAssignment => "task_assignment",
            Self::DailySummary => "daily_summary",
            Self::UrgentAlert => "urgent_alert",
            Self::SlaWarning => "sla_warning",
            Self::QualityAlert => "quality_alert",
            Self::WorkflowComplete => "workflow_complete",
            Self::CertificateProcessed => "certificate_processed",
        }
    }

    /// Human-readable label shown in settings screens.
    pub fn label(&self) -> &'static str {
        match self {
            Self::StatusUpdate => "Изменение статуса",
            Self::TaskAssignment => "Назначение задачи",
            Self::DailySummary => "Ежедневная сводка",
            Self::UrgentAlert => "Срочное уведомление",
            Self::SlaWarning => "Предупреждение SLA",
            Self::QualityAlert => "Проблема качества",
            Self::WorkflowComplete => "Завершение процесса",
            Self::CertificateProcessed => "Обработка сертификата",
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("notification category", s))
    }
}

crate::db::text_column!(NotificationCategory);
