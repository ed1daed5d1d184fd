use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    #[default]
    Normal,
    Important,
}

/// A single day-scoped entry, one shape serving two roles: with a start time
/// it is a scheduled item (eligible for timed reminders and completion
/// tracking); without one it is an untimed event.
///
/// The serialized form is the original web app's stored JSON: camelCase
/// fields, `HH:MM` time strings, explicit nulls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayEvent {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, with = "opt_hhmm")]
    pub from_time: Option<NaiveTime>,
    #[serde(default, with = "opt_hhmm")]
    pub to_time: Option<NaiveTime>,
    #[serde(default)]
    pub notify_before: Option<u32>,
    #[serde(default)]
    pub is_completed: bool,
    /// Advisory only. Live timer bookkeeping is process-local in the
    /// reminder scheduler and never trusted from disk.
    #[serde(default)]
    pub reminder_scheduled: bool,
}

/// User-supplied fields of an event about to be created; id and completion
/// state are assigned by [`DayEvent::new`].
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub category: String,
    pub priority: Priority,
    pub from_time: Option<NaiveTime>,
    pub to_time: Option<NaiveTime>,
    pub notify_before: Option<u32>,
}

impl NewEvent {
    pub fn untimed(title: impl Into<String>, category: impl Into<String>, priority: Priority) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            priority,
            from_time: None,
            to_time: None,
            notify_before: None,
        }
    }

    pub fn scheduled(
        title: impl Into<String>,
        category: impl Into<String>,
        priority: Priority,
        from_time: NaiveTime,
        to_time: Option<NaiveTime>,
        notify_before: Option<u32>,
    ) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            priority,
            from_time: Some(from_time),
            to_time,
            notify_before,
        }
    }
}

impl DayEvent {
    pub fn new(draft: NewEvent) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            title: draft.title,
            category: draft.category,
            priority: draft.priority,
            from_time: draft.from_time,
            to_time: draft.to_time,
            notify_before: draft.notify_before,
            is_completed: false,
            reminder_scheduled: false,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.from_time.is_some()
    }

    pub fn is_untimed(&self) -> bool {
        self.from_time.is_none()
    }
}

/// `Option<NaiveTime>` as an `HH:MM` string or null. chrono's default serde
/// form writes seconds, which would break round-trips with existing exports.
mod opt_hhmm {
    use chrono::NaiveTime;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&time.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|text| NaiveTime::parse_from_str(&text, FORMAT).map_err(D::Error::custom))
            .transpose()
    }
}
