//! Line-oriented command shell driving the state holders.

use std::io::Write;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use taskmaster_core::{Category, CredentialsForm, Priority, Task, TaskFilter, TaskForm, TaskId};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::context::AppContext;

/// Quiet period after which the task snapshot is considered settled.
const SETTLE: Duration = Duration::from_millis(50);
const SHORT_ID: usize = 8;

#[derive(Parser, Debug)]
#[command(name = "taskmaster", no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    cmd: ShellCommand,
}

/// One shell command.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ShellCommand {
    /// Create an account and sign in.
    Signup {
        email: String,
        password: String,
        /// Defaults to the password.
        confirm: Option<String>,
    },
    /// Sign in to an existing account.
    Login { email: String, password: String },
    /// Sign in without an account.
    Anon,
    /// Sign out.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Create a task.
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(short, long, value_parser = parse_category)]
        category: Option<Category>,
        /// `YYYY-MM-DD` or RFC 3339.
        #[arg(long, value_parser = parse_due)]
        due: Option<OffsetDateTime>,
    },
    /// Change fields of a task.
    Edit {
        id: String,
        #[command(flatten)]
        changes: TaskChanges,
    },
    /// Flip a task between pending and completed.
    Toggle { id: String },
    /// Delete a task.
    Rm { id: String },
    /// Print one task as JSON.
    Show { id: String },
    /// List tasks: all, pending, completed or a category name.
    Ls {
        #[arg(default_value = "all")]
        filter: TaskFilter,
    },
    /// Summary counters.
    Stats,
    /// Leave the shell.
    #[command(alias = "exit")]
    Quit,
}

/// Fields an `edit` may override; absent flags keep the stored value.
#[derive(Args, Debug, Default, PartialEq, Eq)]
pub struct TaskChanges {
    #[arg(short, long)]
    title: Option<String>,
    #[arg(short, long)]
    description: Option<String>,
    #[arg(short, long, value_parser = parse_priority)]
    priority: Option<Priority>,
    #[arg(short, long, value_parser = parse_category)]
    category: Option<Category>,
    #[arg(long, value_parser = parse_due)]
    due: Option<OffsetDateTime>,
}

impl TaskChanges {
    fn apply(self, form: &mut TaskForm) {
        if let Some(title) = self.title {
            form.title = title;
        }
        if let Some(description) = self.description {
            form.description = description;
        }
        form.priority = self.priority.unwrap_or(form.priority);
        form.category = self.category.unwrap_or(form.category);
        form.due_date = self.due.or(form.due_date);
    }
}

/// Whether the shell keeps reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Split a line with shell quoting rules and parse it; blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<ShellCommand>> {
    let words = shell_words::split(line).map_err(|err| anyhow!("cannot split command line: {err}"))?;
    if words.is_empty() {
        return Ok(None);
    }
    Ok(Some(ShellLine::try_parse_from(words)?.cmd))
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    Priority::parse(raw).ok_or_else(|| format!("unknown priority '{raw}'"))
}

fn parse_category(raw: &str) -> Result<Category, String> {
    Category::parse(raw).ok_or_else(|| format!("unknown category '{raw}'"))
}

fn parse_due(raw: &str) -> Result<OffsetDateTime, String> {
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_utc());
    }
    OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339)
        .map_err(|err| format!("invalid due date '{raw}': {err}"))
}

/// Executes commands against one [`AppContext`] and writes results to `out`.
pub struct Shell<W> {
    ctx: AppContext,
    out: W,
}

impl<W: Write> Shell<W> {
    pub const fn new(ctx: AppContext, out: W) -> Self {
        Self { ctx, out }
    }

    pub const fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub const fn output_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Parse and run one input line; parse errors are printed, not returned.
    pub async fn run_line(&mut self, line: &str) -> Result<Flow> {
        match parse(line) {
            Ok(Some(cmd)) => self.execute(cmd).await,
            Ok(None) => Ok(Flow::Continue),
            Err(err) => {
                writeln!(self.out, "{err}")?;
                Ok(Flow::Continue)
            }
        }
    }

    pub async fn execute(&mut self, cmd: ShellCommand) -> Result<Flow> {
        match cmd {
            ShellCommand::Signup {
                email,
                password,
                confirm,
            } => {
                let confirm = confirm.unwrap_or_else(|| password.clone());
                self.authenticate(CredentialsForm::sign_up(email, password, confirm)).await?;
            }
            ShellCommand::Login { email, password } => {
                self.authenticate(CredentialsForm::sign_in(email, password)).await?;
            }
            ShellCommand::Anon => {
                self.ctx.auth.sign_in_anonymously().await?;
                self.report_auth().await?;
            }
            ShellCommand::Logout => {
                self.ctx.auth.sign_out();
                self.settle().await;
                writeln!(self.out, "signed out")?;
            }
            ShellCommand::Whoami => self.whoami()?,
            ShellCommand::Add {
                title,
                description,
                priority,
                category,
                due,
            } => {
                let form = TaskForm {
                    title,
                    description: description.unwrap_or_default(),
                    priority: priority.unwrap_or_default(),
                    category: category.unwrap_or_default(),
                    due_date: due,
                };
                self.ctx.tasks.add_from_form(form).await?;
                self.report_tasks("created").await?;
            }
            ShellCommand::Edit { id, changes } => self.edit(&id, changes).await?,
            ShellCommand::Toggle { id } => {
                let id = self.resolve(&id);
                self.ctx.tasks.toggle_task_completion(id).await?;
                self.report_tasks("toggled").await?;
            }
            ShellCommand::Rm { id } => {
                let id = self.resolve(&id);
                self.ctx.tasks.delete_task(id).await?;
                self.report_tasks("deleted").await?;
            }
            ShellCommand::Show { id } => {
                let id = self.resolve(&id);
                match self.ctx.tasks.gateway().get_task(&id).await {
                    Ok(task) => {
                        writeln!(self.out, "{}", task.id)?;
                        writeln!(self.out, "{}", serde_json::to_string_pretty(&task)?)?;
                    }
                    Err(err) => writeln!(self.out, "error: {err}")?,
                }
            }
            ShellCommand::Ls { filter } => self.list(filter)?,
            ShellCommand::Stats => {
                let stats = self.ctx.tasks.snapshot().stats();
                writeln!(
                    self.out,
                    "total {} | pending {} | completed {} | high priority {}",
                    stats.total, stats.pending, stats.completed, stats.high_priority
                )?;
            }
            ShellCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    async fn edit(&mut self, raw_id: &str, changes: TaskChanges) -> Result<()> {
        let id = self.resolve(raw_id);
        let current = match self.ctx.tasks.gateway().get_task(&id).await {
            Ok(task) => task,
            Err(err) => {
                writeln!(self.out, "error: {err}")?;
                return Ok(());
            }
        };
        let mut form = TaskForm::from_task(&current);
        changes.apply(&mut form);
        self.ctx.tasks.edit_from_form(id, form).await?;
        self.report_tasks("updated").await
    }

    async fn authenticate(&mut self, form: CredentialsForm) -> Result<()> {
        self.ctx.auth.submit(form).await?;
        self.report_auth().await
    }

    async fn report_auth(&mut self) -> Result<()> {
        self.settle().await;
        let view = self.ctx.auth.snapshot();
        match (view.error, view.session) {
            (Some(error), _) => writeln!(self.out, "error: {error}")?,
            (None, Some(session)) => writeln!(self.out, "signed in as {}", session.display_name())?,
            (None, None) => writeln!(self.out, "not signed in")?,
        }
        Ok(())
    }

    async fn report_tasks(&mut self, done: &str) -> Result<()> {
        self.settle().await;
        match self.ctx.tasks.snapshot().error {
            Some(error) => writeln!(self.out, "error: {error}")?,
            None => writeln!(self.out, "{done}")?,
        }
        Ok(())
    }

    fn whoami(&mut self) -> Result<()> {
        match self.ctx.auth.snapshot().session {
            Some(session) => writeln!(self.out, "{} ({})", session.display_name(), session.user_id)?,
            None => writeln!(self.out, "not signed in")?,
        }
        Ok(())
    }

    fn list(&mut self, filter: TaskFilter) -> Result<()> {
        let tasks = self.ctx.tasks.snapshot().filtered(filter);
        if tasks.is_empty() {
            writeln!(self.out, "No tasks found")?;
            return Ok(());
        }
        for task in &tasks {
            writeln!(self.out, "{}", render(task))?;
        }
        Ok(())
    }

    /// Expand a unique id prefix against the current snapshot.
    fn resolve(&self, raw: &str) -> TaskId {
        let view = self.ctx.tasks.snapshot();
        let mut matches = view.tasks.iter().filter(|task| task.id.as_str().starts_with(raw));
        match (matches.next(), matches.next()) {
            (Some(task), None) => task.id.clone(),
            _ => TaskId::from(raw),
        }
    }

    /// Wait until the task snapshot stops changing.
    async fn settle(&self) {
        let mut rx = self.ctx.tasks.watch();
        while tokio::time::timeout(SETTLE, rx.changed())
            .await
            .is_ok_and(|changed| changed.is_ok())
        {}
    }
}

fn render(task: &Task) -> String {
    let mark = if task.is_completed { 'x' } else { ' ' };
    let short = task.id.as_str().get(..SHORT_ID).unwrap_or(task.id.as_str());
    let due = task
        .due_date
        .and_then(|due| due.format(format_description!("[year]-[month]-[day]")).ok())
        .map(|date| format!(" due {date}"))
        .unwrap_or_default();
    format!(
        "{short} [{mark}] {} ({}, {} {}){due}",
        task.title,
        task.priority.label(),
        task.category.icon(),
        task.category.label()
    )
}
