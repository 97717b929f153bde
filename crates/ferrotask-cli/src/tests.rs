use ferrotask_core::db::{Database, SqliteTaskRepository, TaskRepository};
use ferrotask_core::models::{Priority, Task, TaskStatus};

use crate::commands::common::{
    format_task_lines, parse_due_date, parse_priority, resolve_task, resolve_task_content,
    status_mark,
};
use crate::error::CliError;

#[test]
fn resolve_task_content_joins_and_trims() {
    let parts = vec!["buy".to_string(), "milk".to_string()];
    assert_eq!(resolve_task_content(&parts).unwrap(), "buy milk");

    let blank = vec!["  ".to_string()];
    assert!(matches!(
        resolve_task_content(&blank),
        Err(CliError::EmptyContent)
    ));
}

#[test]
fn parse_priority_validates_range() {
    assert_eq!(parse_priority(1).unwrap(), Priority::Urgent);
    assert_eq!(parse_priority(4).unwrap(), Priority::Low);
    assert!(matches!(parse_priority(0), Err(CliError::InvalidPriority(0))));
    assert!(matches!(parse_priority(9), Err(CliError::InvalidPriority(9))));
}

#[test]
fn parse_due_date_accepts_iso_dates_only() {
    assert!(parse_due_date("2025-06-01").is_ok());
    assert!(parse_due_date("06/01/2025").is_err());
    assert!(parse_due_date("tomorrow").is_err());
}

#[test]
fn status_marks_are_distinct() {
    assert_eq!(status_mark(TaskStatus::Process), "[ ]");
    assert_eq!(status_mark(TaskStatus::Done), "[x]");
    assert_eq!(status_mark(TaskStatus::Ignore), "[-]");
}

#[test]
fn format_task_lines_flags_dirty_rows() {
    let task = Task::new("write tests", None);
    let lines = format_task_lines(&[task]);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("write tests"));
    assert!(lines[0].ends_with('*'));
}

#[test]
fn resolve_task_accepts_unique_prefix() {
    let db = Database::open_in_memory().unwrap();
    let repo = SqliteTaskRepository::new(db.connection());
    let task = Task::new("findable", None);
    repo.create(&task).unwrap();

    let by_full_id = resolve_task(&db, &task.id).unwrap();
    assert_eq!(by_full_id.id, task.id);

    let prefix: String = task.id.chars().take(8).collect();
    let by_prefix = resolve_task(&db, &prefix).unwrap();
    assert_eq!(by_prefix.id, task.id);
}

#[test]
fn resolve_task_rejects_unknown_and_reports_missing() {
    let db = Database::open_in_memory().unwrap();
    assert!(matches!(
        resolve_task(&db, "zzz"),
        Err(CliError::TaskNotFound(_))
    ));
}

#[test]
fn exit_codes_match_the_contract() {
    assert_eq!(CliError::Aborted.exit_code(), 2);
    assert_eq!(CliError::EmptyContent.exit_code(), 1);
    assert_eq!(
        CliError::Core(ferrotask_core::Error::Unauthorized).exit_code(),
        1
    );
}
