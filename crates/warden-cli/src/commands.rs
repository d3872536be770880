//! Handlers for the ops-facing subcommands (`reminder`/`routine`/`webhook`).
//! These talk to the schedule store directly; they never start the
//! orchestrator or touch the agent runtime.

use chrono::Utc;
use warden_core::policy::{ForkPolicy, ToolFilter, UpdateMainSession};
use warden_core::types::ShortId;
use warden_schedule::store::ScheduleStore;
use warden_schedule::types::{Reminder, Routine};

use crate::cli::{ReminderAdd, ReminderCommand, RoutineAdd, RoutineCommand, UpdateMainSessionArg, WebhookCommand};
use crate::error::{CliError, Result};

fn tool_filter(allowed: Option<Vec<String>>, blocked: Option<Vec<String>>) -> Result<ToolFilter> {
    ToolFilter::new(allowed.unwrap_or_default(), blocked.unwrap_or_default())
        .map_err(|e| CliError::InvalidArgument(e.to_string()))
}

fn update_main_session(arg: Option<UpdateMainSessionArg>) -> UpdateMainSession {
    match arg {
        None => UpdateMainSession::default(),
        Some(UpdateMainSessionArg::Always) => UpdateMainSession::Always,
        Some(UpdateMainSessionArg::OnPing) => UpdateMainSession::OnPing,
        Some(UpdateMainSessionArg::Freely) => UpdateMainSession::Freely,
        Some(UpdateMainSessionArg::Blocked) => UpdateMainSession::Blocked,
    }
}

pub fn reminder(store: &ScheduleStore, action: ReminderCommand) -> Result<()> {
    match action {
        ReminderCommand::Add(add) => reminder_add(store, add),
        ReminderCommand::List => reminder_list(store),
        ReminderCommand::Cancel { id } => reminder_cancel(store, &id),
    }
}

fn reminder_add(store: &ScheduleStore, add: ReminderAdd) -> Result<()> {
    let policy = ForkPolicy {
        update_main_session: update_main_session(add.update_main_session),
        allow_ping: !add.no_ping,
        tool_filter: tool_filter(add.allowed_tools, add.blocked_tools)?,
    };

    let run_at = Utc::now() + chrono::Duration::minutes(add.delay_minutes);
    let chain_parent = add.chain_parent.map(ShortId::from);

    let reminder = Reminder::new(
        ShortId::new(),
        add.message,
        run_at,
        add.description,
        add.background,
        false,
        add.model,
        add.isolated,
        !add.no_thinking,
        policy,
        add.chain_depth,
        add.max_chain,
        chain_parent,
    )?;

    let id = reminder.id.clone();
    store.save_reminder(&reminder)?;
    println!("created reminder {id} firing at {run_at}");
    Ok(())
}

fn reminder_list(store: &ScheduleStore) -> Result<()> {
    let reminders = store.list_reminders()?;
    if reminders.is_empty() {
        println!("no reminders scheduled");
        return Ok(());
    }
    for r in reminders {
        println!("{}  {}  \"{}\"", r.id, r.run_at, r.message);
    }
    Ok(())
}

fn reminder_cancel(store: &ScheduleStore, id: &str) -> Result<()> {
    store.remove_reminder(id)?;
    println!("cancelled reminder {id}");
    Ok(())
}

pub fn routine(store: &ScheduleStore, action: RoutineCommand) -> Result<()> {
    match action {
        RoutineCommand::Add(add) => routine_add(store, add),
        RoutineCommand::List => routine_list(store),
        RoutineCommand::Cancel { id } => routine_cancel(store, &id),
    }
}

fn routine_add(store: &ScheduleStore, add: RoutineAdd) -> Result<()> {
    let skip_if_busy = add.skip_if_busy && !add.no_skip_if_busy;

    let routine = Routine {
        id: ShortId::new(),
        message: add.message,
        cron: add.cron,
        description: add.description,
        background: add.background,
        skip_if_busy,
        model: add.model,
        isolated: add.isolated,
        thinking: true,
        policy: ForkPolicy::default(),
    };

    let id = routine.id.clone();
    let cron = routine.cron.clone();
    store.save_routine(&routine)?;
    println!("created routine {id} ({cron})");
    Ok(())
}

fn routine_list(store: &ScheduleStore) -> Result<()> {
    let routines = store.list_routines()?;
    if routines.is_empty() {
        println!("no routines scheduled");
        return Ok(());
    }
    for r in routines {
        println!("{}  {}  \"{}\"", r.id, r.cron, r.message);
    }
    Ok(())
}

fn routine_cancel(store: &ScheduleStore, id: &str) -> Result<()> {
    store.remove_routine(id)?;
    println!("cancelled routine {id}");
    Ok(())
}

pub fn webhook(store: &ScheduleStore, action: WebhookCommand) -> Result<()> {
    match action {
        WebhookCommand::List => webhook_list(store),
    }
}

fn webhook_list(store: &ScheduleStore) -> Result<()> {
    let webhooks = store.list_webhooks()?;
    if webhooks.is_empty() {
        println!("no webhooks configured");
        return Ok(());
    }
    for w in webhooks {
        println!("{}  fields: {}", w.id, w.fields.len());
    }
    Ok(())
}
