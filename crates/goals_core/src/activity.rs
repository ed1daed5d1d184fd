use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A habit tracked by daily completion marks.
///
/// The id is the cross-month join key: monthly records are independent blobs,
/// and the aggregation layer matches entries between them by id alone, never
/// by position. `checks` holds only the owning month's marks; a `true` entry
/// means checked, absence (or `false`) means unchecked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Activity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub checks: BTreeMap<NaiveDate, bool>,
}

impl Activity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            checks: BTreeMap::new(),
        }
    }

    /// Same identity and label, no completion marks. Used when a roster is
    /// inherited into a month that has no stored record yet.
    pub fn carried_forward(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            checks: BTreeMap::new(),
        }
    }

    pub fn is_checked(&self, date: NaiveDate) -> bool {
        self.checks.get(&date).copied().unwrap_or(false)
    }

    pub fn toggle(&mut self, date: NaiveDate) {
        if self.is_checked(date) {
            self.checks.remove(&date);
        } else {
            self.checks.insert(date, true);
        }
    }

    pub fn checked_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.checks
            .iter()
            .filter(|(_, checked)| **checked)
            .map(|(date, _)| *date)
    }
}

/// The starter roster a brand-new store begins with.
pub fn default_roster() -> Vec<Activity> {
    ["Meditation", "Exercise", "Study"]
        .into_iter()
        .map(Activity::new)
        .collect()
}
