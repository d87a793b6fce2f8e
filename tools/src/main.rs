//! ledger-runner: boots the ledger store, runs the settlement sweep scheduler
//! and serves the engine over a JSON-lines protocol on stdin/stdout.
//!
//! Usage:
//!   ledger-runner --config ledger.json
//!   ledger-runner --db ledger.db --serve

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use splitledger_core::{
    balance_calculator::ExpenseScope,
    clock::{Clock, SystemClock},
    config::LedgerConfig,
    engine::LedgerEngine,
    error::LedgerResult,
    model::{NewExpense, NewSettlement},
    settlement_generator::GenerateOptions,
    settlement_lifecycle::SummaryWindow,
    shutdown::ShutdownSignal,
    split::SplitRule,
    store::LedgerStore,
    sweep_scheduler::SweepScheduler,
    types::{GroupId, Money, NotificationId, SettlementId, UserId},
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    AddUser {
        name: String,
    },
    CreateGroup {
        caller: UserId,
        name:   String,
    },
    AddMember {
        caller:   UserId,
        group_id: GroupId,
        user_id:  UserId,
        #[serde(default)]
        is_admin: bool,
    },
    RecordExpense {
        caller:  UserId,
        expense: NewExpense,
    },
    RecordSplitExpense {
        caller:  UserId,
        expense: NewExpense,
        rule:    SplitRule,
    },
    ComputeBalances {
        caller:   UserId,
        group_id: GroupId,
        #[serde(default)]
        scope:    ExpenseScope,
    },
    GenerateSettlements {
        caller:   UserId,
        group_id: GroupId,
        #[serde(default)]
        options:  GenerateOptions,
    },
    CreateSettlement {
        caller:     UserId,
        settlement: NewSettlement,
    },
    RecordPayment {
        caller:         UserId,
        settlement_id:  SettlementId,
        amount:         Money,
        #[serde(default)]
        payment_method: Option<String>,
    },
    ConfirmSettlement {
        caller:         UserId,
        settlement_id:  SettlementId,
        #[serde(default)]
        payment_method: Option<String>,
    },
    PendingSettlements {
        caller:  UserId,
        user_id: UserId,
    },
    GroupSettlements {
        caller:   UserId,
        group_id: GroupId,
    },
    SettlementSummary {
        caller:   UserId,
        group_id: GroupId,
        #[serde(default)]
        window:   SummaryWindow,
    },
    SetSettlementPeriod {
        caller:   UserId,
        group_id: GroupId,
        period:   String,
    },
    Notifications {
        caller: UserId,
    },
    MarkNotificationRead {
        caller:          UserId,
        notification_id: NotificationId,
    },
    RunSweep,
    MarkOverdue,
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let serve = args.iter().any(|a| a == "--serve");
    let mut config = match arg_value(&args, "--config") {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(db) = arg_value(&args, "--db") {
        config.database_path = db.to_string();
    }
    config.validate()?;

    // For :memory: use a shared-cache URI so the scheduler's connection
    // sees the same in-memory database as the engine's.
    let db_effective = if config.database_path == ":memory:" {
        LedgerStore::shared_memory_uri(&format!("ledger_{}", std::process::id()))
    } else {
        config.database_path.clone()
    };
    let store = LedgerStore::open(&db_effective)?;
    store.migrate()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let shutdown = ShutdownSignal::new();
    let scheduler = SweepScheduler::new(store.reopen()?, Arc::clone(&clock), &config);
    let scheduler_handle = {
        let _guard = runtime.enter();
        scheduler.spawn(shutdown.clone())
    };

    if serve {
        println!("ledger-runner");
        println!("  db:            {db_effective}");
        println!("  poll every:    {}s", config.sweep_poll_secs);
        println!("  due after:     {}d", config.settlement_due_days);
        println!();
        runtime.block_on(tokio::signal::ctrl_c())?;
        log::info!("Ctrl-C received, shutting down");
    } else {
        let engine = LedgerEngine::new(store, clock, config);
        run_ipc_loop(&engine)?;
    }

    shutdown.trigger();
    runtime.block_on(scheduler_handle)?;
    Ok(())
}

fn run_ipc_loop(engine: &LedgerEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        let reply = match handle_command(engine, cmd) {
            Ok(value) => json!({ "ok": value }),
            Err(e) => {
                log::debug!("command rejected: {e}");
                json!({ "error": e.to_string() })
            }
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(engine: &LedgerEngine, cmd: IpcCommand) -> LedgerResult<Value> {
    match cmd {
        IpcCommand::AddUser { name } => to_reply(engine.add_user(&name)?),
        IpcCommand::CreateGroup { caller, name } => to_reply(engine.create_group(caller, &name)?),
        IpcCommand::AddMember {
            caller,
            group_id,
            user_id,
            is_admin,
        } => to_reply(engine.add_member(caller, group_id, user_id, is_admin)?),
        IpcCommand::RecordExpense { caller, expense } => {
            to_reply(engine.record_expense(caller, &expense)?)
        }
        IpcCommand::RecordSplitExpense {
            caller,
            expense,
            rule,
        } => to_reply(engine.record_split_expense(caller, &expense, &rule)?),
        IpcCommand::ComputeBalances {
            caller,
            group_id,
            scope,
        } => to_reply(engine.compute_balances_with_scope(caller, group_id, scope)?),
        IpcCommand::GenerateSettlements {
            caller,
            group_id,
            options,
        } => to_reply(engine.generate_settlements(caller, group_id, options)?),
        IpcCommand::CreateSettlement { caller, settlement } => {
            to_reply(engine.create_settlement(caller, &settlement)?)
        }
        IpcCommand::RecordPayment {
            caller,
            settlement_id,
            amount,
            payment_method,
        } => to_reply(engine.record_payment(
            caller,
            settlement_id,
            amount,
            payment_method.as_deref(),
        )?),
        IpcCommand::ConfirmSettlement {
            caller,
            settlement_id,
            payment_method,
        } => to_reply(engine.confirm_settlement(caller, settlement_id, payment_method.as_deref())?),
        IpcCommand::PendingSettlements { caller, user_id } => {
            to_reply(engine.pending_settlements_for_user(caller, user_id)?)
        }
        IpcCommand::GroupSettlements { caller, group_id } => {
            to_reply(engine.group_settlements(caller, group_id)?)
        }
        IpcCommand::SettlementSummary {
            caller,
            group_id,
            window,
        } => to_reply(engine.settlement_summary(caller, group_id, window)?),
        IpcCommand::SetSettlementPeriod {
            caller,
            group_id,
            period,
        } => to_reply(engine.set_settlement_period(caller, group_id, &period)?),
        IpcCommand::Notifications { caller } => to_reply(engine.notifications_for(caller)?),
        IpcCommand::MarkNotificationRead {
            caller,
            notification_id,
        } => to_reply(engine.mark_notification_read(caller, notification_id)?),
        IpcCommand::RunSweep => to_reply(engine.run_settlement_sweep()?),
        IpcCommand::MarkOverdue => to_reply(engine.mark_overdue()?),
        IpcCommand::Quit => Ok(Value::Null),
    }
}

fn to_reply<T: serde::Serialize>(value: T) -> LedgerResult<Value> {
    Ok(serde_json::to_value(value)?)
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
