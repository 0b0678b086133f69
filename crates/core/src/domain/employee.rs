use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

/// An employee as held by the HR record store. The bot only ever reads these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub id: EmployeeId,
    pub first_name: String,
    pub surname: String,
    pub whatsapp_suffix: String,
    pub leave_approver_name: String,
    pub leave_days_balance: Option<Decimal>,
}

impl EmployeeRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.surname.trim()).trim().to_owned()
    }

    pub fn approver(&self) -> Option<&str> {
        let approver = self.leave_approver_name.trim();
        (!approver.is_empty()).then_some(approver)
    }
}
