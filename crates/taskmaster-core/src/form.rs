//! Client-side validation for the task entry and credential forms.

use time::OffsetDateTime;

use crate::task::{Category, Priority, Task};

/// Validation failures raised before any provider call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    /// Title was empty after trimming.
    #[error("Title must not be empty")]
    EmptyTitle,
    /// Email was empty after trimming.
    #[error("Email must not be empty")]
    EmptyEmail,
    /// Password was blank.
    #[error("Password must not be empty")]
    EmptyPassword,
    /// Sign-up confirmation differs from the password.
    #[error("Passwords do not match")]
    PasswordMismatch,
}

/// Fields captured by the add/edit task form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskForm {
    /// Raw title input.
    pub title: String,
    /// Raw description input.
    pub description: String,
    /// Selected priority.
    pub priority: Priority,
    /// Selected category.
    pub category: Category,
    /// Picked due date.
    pub due_date: Option<OffsetDateTime>,
}

impl TaskForm {
    /// Prefill the form from an existing task.
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            category: task.category,
            due_date: task.due_date,
        }
    }

    /// Build an unsaved task, trimming text fields.
    ///
    /// # Errors
    /// Returns [`FormError::EmptyTitle`] when the trimmed title is empty.
    pub fn into_task(self) -> Result<Task, FormError> {
        self.apply_to(Task::default())
    }

    /// Overlay the form onto `task`, keeping identity, ownership, timestamps and completion.
    ///
    /// # Errors
    /// Returns [`FormError::EmptyTitle`] when the trimmed title is empty.
    pub fn apply_to(self, task: Task) -> Result<Task, FormError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(FormError::EmptyTitle);
        }
        Ok(Task {
            title: title.to_owned(),
            description: self.description.trim().to_owned(),
            priority: self.priority,
            category: self.category,
            due_date: self.due_date,
            ..task
        })
    }
}

/// Which credential flow the form is submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsMode {
    /// Existing account.
    SignIn,
    /// New account; requires confirmation.
    SignUp,
}

/// Email/password form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsForm {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
    /// Confirmation input, only read in sign-up mode.
    pub confirm_password: String,
    /// Flow being submitted.
    pub mode: CredentialsMode,
}

impl CredentialsForm {
    /// Sign-in form.
    pub fn sign_in(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            confirm_password: String::new(),
            mode: CredentialsMode::SignIn,
        }
    }

    /// Sign-up form with confirmation.
    pub fn sign_up(
        email: impl Into<String>,
        password: impl Into<String>,
        confirm_password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            confirm_password: confirm_password.into(),
            mode: CredentialsMode::SignUp,
        }
    }

    /// Check the form and return the trimmed email with the password.
    ///
    /// # Errors
    /// Returns the first [`FormError`] found.
    pub fn validate(&self) -> Result<(String, String), FormError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(FormError::EmptyEmail);
        }
        if self.password.trim().is_empty() {
            return Err(FormError::EmptyPassword);
        }
        if self.mode == CredentialsMode::SignUp && self.password != self.confirm_password {
            return Err(FormError::PasswordMismatch);
        }
        Ok((email.to_owned(), self.password.clone()))
    }
}
