use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::id::{TaskId, UserId};

/// A single to-do item as stored in the task collection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Document key; never part of the document body.
    #[serde(skip)]
    pub id: TaskId,
    /// Short title, required by the entry form.
    #[serde(default)]
    pub title: String,
    /// Free-form notes.
    #[serde(default)]
    pub description: String,
    /// Completion flag.
    #[serde(default)]
    pub is_completed: bool,
    /// Urgency classification.
    #[serde(default)]
    pub priority: Priority,
    /// Grouping used by list filters.
    #[serde(default)]
    pub category: Category,
    /// Optional due date.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    /// Assigned by the store when the document is created.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    /// Stamped by the store on every write.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    /// Owning user; set once at creation.
    #[serde(default)]
    pub user_id: UserId,
}

impl Task {
    /// Start a new, unsaved task with the given title and default fields.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Builder-style priority setter.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Builder-style category setter.
    #[must_use]
    pub const fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Builder-style description setter.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder-style due date setter.
    #[must_use]
    pub const fn with_due_date(mut self, due: Option<OffsetDateTime>) -> Self {
        self.due_date = due;
        self
    }

    /// Returns true when the task belongs to `user`.
    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.user_id == user
    }

    /// High and urgent tasks count as high priority in summaries.
    #[must_use]
    pub const fn is_high_priority(&self) -> bool {
        matches!(self.priority, Priority::High | Priority::Urgent)
    }
}

/// Task urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Default urgency.
    #[default]
    Medium,
    /// Should be done soon.
    High,
    /// Needs attention now.
    Urgent,
}

impl Priority {
    /// Every priority in ascending urgency.
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }

    /// ARGB color used when rendering the priority badge.
    #[must_use]
    pub const fn color(self) -> u32 {
        match self {
            Self::Low => 0xFF4C_AF50,
            Self::Medium => 0xFFFF_9800,
            Self::High => 0xFFF4_4336,
            Self::Urgent => 0xFF9C_27B0,
        }
    }

    /// Parse a label or wire name, ignoring case.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL
            .into_iter()
            .find(|priority| priority.label().eq_ignore_ascii_case(token))
    }
}

/// Task grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Personal errands.
    #[default]
    Personal,
    /// Job related.
    Work,
    /// Health and fitness.
    Health,
    /// Learning.
    Education,
    /// Money matters.
    Finance,
    /// Things to buy.
    Shopping,
    /// Trips.
    Travel,
    /// Anything else.
    Other,
}

impl Category {
    /// Every category in display order.
    pub const ALL: [Self; 8] = [
        Self::Personal,
        Self::Work,
        Self::Health,
        Self::Education,
        Self::Finance,
        Self::Shopping,
        Self::Travel,
        Self::Other,
    ];

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Personal => "Personal",
            Self::Work => "Work",
            Self::Health => "Health",
            Self::Education => "Education",
            Self::Finance => "Finance",
            Self::Shopping => "Shopping",
            Self::Travel => "Travel",
            Self::Other => "Other",
        }
    }

    /// Icon tag understood by the presentation layer.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Personal => "person",
            Self::Work => "work",
            Self::Health => "favorite",
            Self::Education => "school",
            Self::Finance => "attach_money",
            Self::Shopping => "shopping_cart",
            Self::Travel => "flight",
            Self::Other => "category",
        }
    }

    /// Parse a label or wire name, ignoring case.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.label().eq_ignore_ascii_case(token))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use serde_json::{Value, json};
    use time::macros::datetime;

    #[test]
    fn new_task_uses_form_defaults() {
        let task = Task::new("Buy milk");
        assert!(task.id.is_unassigned());
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.category, Category::Personal);
        assert!(!task.is_completed);
        assert!(task.due_date.is_none());
        assert!(task.created_at.is_none());
    }

    #[test]
    fn document_body_uses_camel_case_and_upper_case_enums() {
        let mut task = Task::new("Buy milk")
            .with_priority(Priority::Low)
            .with_category(Category::Shopping)
            .with_due_date(Some(datetime!(2024-05-01 09:00 UTC)));
        task.id = TaskId::from("t1");
        task.user_id = UserId::from("alice");

        let value = serde_json::to_value(&task).expect("must serialize task");
        assert_eq!(value.get("id"), None);
        assert_eq!(value["isCompleted"], json!(false));
        assert_eq!(value["priority"], json!("LOW"));
        assert_eq!(value["category"], json!("SHOPPING"));
        assert_eq!(value["userId"], json!("alice"));
        assert_eq!(value["dueDate"], json!("2024-05-01T09:00:00Z"));
        assert_eq!(value["createdAt"], Value::Null);
    }

    #[test]
    fn sparse_documents_decode_with_defaults() {
        let task: Task = serde_json::from_value(json!({ "title": "sparse" })).expect("must decode");
        assert_eq!(task.title, "sparse");
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.user_id, UserId::default());
    }

    #[test]
    fn labels_and_colors_match_display_table() {
        assert_eq!(Priority::Urgent.label(), "Urgent");
        assert_eq!(Priority::Low.color(), 0xFF4C_AF50);
        assert_eq!(Category::Finance.icon(), "attach_money");
        assert_eq!(Category::parse("shopping"), Some(Category::Shopping));
        assert_eq!(Priority::parse(" HIGH "), Some(Priority::High));
        assert_eq!(Category::parse("groceries"), None);
    }

    #[test]
    fn high_priority_covers_high_and_urgent() {
        assert!(Task::new("a").with_priority(Priority::Urgent).is_high_priority());
        assert!(Task::new("b").with_priority(Priority::High).is_high_priority());
        assert!(!Task::new("c").with_priority(Priority::Medium).is_high_priority());
    }
}
