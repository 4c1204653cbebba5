//! Command-line front-end over [`LocalStore`].

use chrono::{Local, NaiveDate};
use colored::{ColoredString, Colorize};
use dialoguer::Confirm;

use crate::LocalStore;
use crate::cli::{CategoryCommand, Cli, Command, CreateTaskArgs, TaskCommand, UpdateTaskArgs};
use crate::error::{StoreError, StoreResult};
use crate::metadata::{PKG_NAME, PKG_VERSION};
use crate::types::{CategorySnapshot, NewTask, Task, TaskPatch, TaskPriority, TaskStatus};
use crate::watch::WatchOptions;

pub async fn run(cli: Cli) -> StoreResult<()> {
    cli.settings.validate()?;
    if let Command::Version = cli.command {
        println!("{PKG_NAME} {PKG_VERSION}");
        return Ok(());
    }

    let data_dir = cli.settings.resolved_data_dir()?;
    tracing::debug!(data_dir = %data_dir.display(), "opening store");
    let store = LocalStore::open(&data_dir)?;
    if !cli.settings.no_seed {
        store.seed()?;
    }

    match cli.command {
        Command::Tasks(command) => run_task_command(&store, command),
        Command::Categories(command) => run_category_command(&store, command),
        Command::Login { username, password } => {
            let user = store.session.login(&username, &password)?;
            println!("Signed in as {} <{}>", user.username.bold(), user.email);
            Ok(())
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let user = store.session.register(&username, &email, &password)?;
            println!("Registered {} <{}>", user.username.bold(), user.email);
            Ok(())
        }
        Command::Logout => {
            store.session.logout()?;
            println!("Signed out");
            Ok(())
        }
        Command::Whoami => {
            match store.session.current() {
                Some(user) => println!("{} <{}>", user.username.bold(), user.email),
                None => println!("{}", "Not signed in".dimmed()),
            }
            Ok(())
        }
        Command::Seed => {
            if store.seed()? {
                println!("Sample data created");
            } else {
                println!("Store already has data, nothing to do");
            }
            Ok(())
        }
        Command::Watch { category } => {
            let options = WatchOptions {
                interval: cli.settings.poll_interval(),
                category,
            };
            watch(&store, options).await
        }
        Command::Version => Ok(()),
    }
}

fn run_task_command(store: &LocalStore, command: TaskCommand) -> StoreResult<()> {
    match command {
        TaskCommand::List { status, category } => {
            let mut tasks = match category {
                Some(id) => store.tasks.get_by_category(id),
                None => store.tasks.get_all(),
            };
            if let Some(status) = status {
                tasks.retain(|t| t.status == status);
            }
            print!("{}", render_board(&tasks, today()));
            Ok(())
        }
        TaskCommand::Show { id } => {
            let task = store
                .tasks
                .get_by_id(id)
                .ok_or(StoreError::TaskNotFound(id))?;
            print!("{}", render_detail(&task, today()));
            Ok(())
        }
        TaskCommand::Create(args) => {
            let draft = new_task_from_args(store, args)?;
            let task = store.tasks.create(draft)?;
            println!("Created {} {}", task.key().bold(), task.title);
            Ok(())
        }
        TaskCommand::Update(args) => {
            let id = args.id;
            let patch = patch_from_args(store, args)?;
            if patch.is_empty() {
                return Err(StoreError::validation("Nothing to update"));
            }
            let task = store
                .tasks
                .update(id, patch)?
                .ok_or(StoreError::TaskNotFound(id))?;
            println!("Updated {} {}", task.key().bold(), task.title);
            Ok(())
        }
        TaskCommand::Delete { id, yes } => {
            let task = store
                .tasks
                .get_by_id(id)
                .ok_or(StoreError::TaskNotFound(id))?;
            if !yes && !confirm(&format!("Delete {} \"{}\"?", task.key(), task.title))? {
                println!("Aborted");
                return Ok(());
            }
            if store.tasks.delete(id)? {
                println!("Deleted {}", task.key());
            }
            Ok(())
        }
    }
}

fn run_category_command(store: &LocalStore, command: CategoryCommand) -> StoreResult<()> {
    match command {
        CategoryCommand::List => {
            let categories = store.categories.get_all();
            if categories.is_empty() {
                println!("{}", "No categories".dimmed());
            }
            for category in categories {
                let count = store.tasks.get_by_category(category.id).len();
                println!("{:>4}  {}  {}", category.id, category.name, format!("({count})").dimmed());
            }
            Ok(())
        }
        CategoryCommand::Create { name } => {
            let name = required(name, "Name is required")?;
            let category = store.categories.create_named(name)?;
            println!("Created category {} {}", category.id, category.name.bold());
            Ok(())
        }
        CategoryCommand::Rename { id, name } => {
            let name = required(name, "Name is required")?;
            let category = store
                .categories
                .rename(id, name)?
                .ok_or(StoreError::CategoryNotFound(id))?;
            println!("Renamed category {} to {}", category.id, category.name.bold());
            Ok(())
        }
        CategoryCommand::Delete { id } => {
            if !store.categories.delete(id)? {
                return Err(StoreError::CategoryNotFound(id));
            }
            println!("Deleted category {id}");
            Ok(())
        }
    }
}

async fn watch(store: &LocalStore, options: WatchOptions) -> StoreResult<()> {
    let watcher = store.watch_tasks(options);
    let mut updates = watcher.subscribe();
    print!("{}", render_board(&updates.borrow_and_update(), today()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let tasks = updates.borrow_and_update().clone();
                println!("{}", "── updated ──".dimmed());
                print!("{}", render_board(&tasks, today()));
            }
        }
    }
    watcher.stop().await
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn required(value: String, message: &str) -> StoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::validation(message));
    }
    Ok(trimmed.to_string())
}

fn confirm(prompt: &str) -> StoreResult<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| StoreError::Other(format!("confirmation failed: {e}")))
}

fn category_snapshot(store: &LocalStore, id: u64) -> StoreResult<CategorySnapshot> {
    store
        .categories
        .get_by_id(id)
        .map(|c| CategorySnapshot::from(&c))
        .ok_or(StoreError::CategoryNotFound(id))
}

pub fn new_task_from_args(store: &LocalStore, args: CreateTaskArgs) -> StoreResult<NewTask> {
    let title = required(args.title, "Title is required")?;
    let category = args
        .category
        .map(|id| category_snapshot(store, id))
        .transpose()?;
    Ok(NewTask {
        title,
        description: args.description,
        status: args.status,
        priority: args.priority,
        due_date: args.due,
        category,
        user: None,
    })
}

pub fn patch_from_args(store: &LocalStore, args: UpdateTaskArgs) -> StoreResult<TaskPatch> {
    let title = args
        .title
        .map(|t| required(t, "Title is required"))
        .transpose()?;
    let category = match (args.category, args.clear_category) {
        (Some(id), _) => Some(Some(category_snapshot(store, id)?)),
        (None, true) => Some(None),
        (None, false) => None,
    };
    Ok(TaskPatch {
        title,
        description: args.description,
        status: args.status,
        priority: clearable(args.priority, args.clear_priority),
        due_date: clearable(args.due, args.clear_due),
        category,
        user: None,
    })
}

fn clearable<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    match (value, clear) {
        (Some(v), _) => Some(Some(v)),
        (None, true) => Some(None),
        (None, false) => None,
    }
}

fn status_marker(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Todo => "○".normal(),
        TaskStatus::InProgress => "◐".yellow(),
        TaskStatus::Done => "●".green(),
        TaskStatus::Canceled => "⊘".dimmed(),
    }
}

fn priority_badge(priority: TaskPriority) -> ColoredString {
    let text = priority.as_str();
    match priority {
        TaskPriority::Low => text.dimmed(),
        TaskPriority::Medium => text.normal(),
        TaskPriority::High => text.yellow(),
        TaskPriority::Urgent => text.red().bold(),
    }
}

pub fn render_task_line(task: &Task, today: NaiveDate) -> String {
    let mut line = format!(
        "  {} {:<8} {}",
        status_marker(task.status),
        task.key(),
        if task.status == TaskStatus::Done {
            task.title.strikethrough()
        } else {
            task.title.normal()
        }
    );
    if let Some(priority) = task.priority {
        line.push_str(&format!("  [{}]", priority_badge(priority)));
    }
    if let Some(category) = &task.category {
        line.push_str(&format!("  #{}", category.name.cyan()));
    }
    if let Some(due) = task.due_date {
        let text = due.format("%b %-d").to_string();
        let text = if task.is_overdue(today) {
            text.red()
        } else {
            text.normal()
        };
        line.push_str(&format!("  {text}"));
    }
    line
}

/// Issue list grouped by status, empty groups omitted.
pub fn render_board(tasks: &[Task], today: NaiveDate) -> String {
    if tasks.is_empty() {
        return format!("{}\n", "No issues".dimmed());
    }
    let mut out = String::new();
    for status in TaskStatus::ALL {
        let group: Vec<&Task> = tasks.iter().filter(|t| t.status == status).collect();
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!(
            "{} {}\n",
            status.label().bold(),
            group.len().to_string().dimmed()
        ));
        for task in group {
            out.push_str(&render_task_line(task, today));
            out.push('\n');
        }
    }
    out
}

pub fn render_detail(task: &Task, today: NaiveDate) -> String {
    let mut out = format!("{} {}\n", task.key().dimmed(), task.title.bold());
    out.push_str(&format!("  Status:    {} {}\n", status_marker(task.status), task.status.label()));
    out.push_str(&format!(
        "  Priority:  {}\n",
        task.priority
            .map(|p| priority_badge(p).to_string())
            .unwrap_or_else(|| "None".to_string())
    ));
    out.push_str(&format!(
        "  Category:  {}\n",
        task.category
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "None".to_string())
    ));
    if let Some(due) = task.due_date {
        let overdue = if task.is_overdue(today) { " (overdue)" } else { "" };
        out.push_str(&format!("  Due:       {due}{overdue}\n"));
    }
    if let Some(user) = &task.user {
        out.push_str(&format!("  Assignee:  {}\n", user.username));
    }
    out.push_str(&format!("  Created:   {}\n", task.created_at.to_rfc3339()));
    out.push_str(&format!("  Updated:   {}\n", task.updated_at.to_rfc3339()));
    if !task.description.is_empty() {
        out.push('\n');
        out.push_str(&task.description);
        out.push('\n');
    }
    out
}
