use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::conversation::SenderId;
use crate::domain::employee::EmployeeId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaveApplicationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveApplication {
    pub id: LeaveApplicationId,
    pub sender_id: SenderId,
    pub employee_id: Option<EmployeeId>,
    /// Missing when the end date arrived before any start date (lenient step policy).
    pub start_date: Option<NaiveDate>,
    pub end_date: NaiveDate,
    pub status: LeaveApplicationStatus,
    pub submitted_at: DateTime<Utc>,
}

impl LeaveApplication {
    pub fn submit(
        sender_id: SenderId,
        employee_id: Option<EmployeeId>,
        start_date: Option<NaiveDate>,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            id: LeaveApplicationId(format!("LV-{}", Uuid::new_v4().simple())),
            sender_id,
            employee_id,
            start_date,
            end_date,
            status: LeaveApplicationStatus::Pending,
            submitted_at: Utc::now(),
        }
    }
}
