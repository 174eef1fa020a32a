// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Demo workflows served by `replayd`

use replay_engine::{
    ActivityContext, ActivityError, Client, Registry, RegistryError, RunContext, RunError,
};
use replay_storage::EventLog;
use std::sync::Arc;
use std::time::Duration;

pub const DEMO_NAMESPACE: &str = "demo";

pub const GREETING_WORKFLOW: &str = "greeting";
pub const SLEEP_WORKFLOW: &str = "sleep";
pub const SIGNAL_WORKFLOW: &str = "signal";

pub const ENRICH_GREETING: &str = "enrich_greeting";
pub const PRINT_GREETING: &str = "print_greeting";
pub const MAYBE_SIGNAL: &str = "maybe_signal";

/// Signal kind the signal workflow waits on
pub const DEMO_SIGNAL: &str = "demo";

const ENRICH_ROUNDS: usize = 5;
const SLEEP_ROUNDS: usize = 10;
const SIGNAL_ROUNDS: i64 = 10;
/// Rounds up to this one signal their own run
const LAST_SIGNALLED_ROUND: i64 = 3;
const SIGNAL_OFFSET: i64 = 100;
const YEAR: Duration = Duration::from_secs(60 * 60 * 24 * 365);
const SIGNAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Handles the demo activities work with
pub struct DemoBackends<L> {
    pub client: Client<L>,
}

/// Registry holding the demo workflows and their activities
pub fn registry<L>() -> Result<Registry<DemoBackends<L>>, RegistryError>
where
    L: EventLog + Clone,
{
    let mut registry = Registry::new();
    registry.register_workflow(DEMO_NAMESPACE, GREETING_WORKFLOW, greeting)?;
    registry.register_workflow(DEMO_NAMESPACE, SLEEP_WORKFLOW, sleepy)?;
    registry.register_workflow(DEMO_NAMESPACE, SIGNAL_WORKFLOW, signalled)?;
    registry.register_activity(DEMO_NAMESPACE, ENRICH_GREETING, enrich_greeting::<L>)?;
    registry.register_activity(DEMO_NAMESPACE, PRINT_GREETING, print_greeting::<L>)?;
    registry.register_activity(DEMO_NAMESPACE, MAYBE_SIGNAL, maybe_signal::<L>)?;
    Ok(registry)
}

/// Wraps `name` in brackets five times, then prints it
pub fn greeting(ctx: &mut RunContext, name: String) -> Result<String, RunError> {
    let mut greeting = name;
    for _ in 0..ENRICH_ROUNDS {
        greeting = ctx.execute_activity(ENRICH_GREETING, &greeting)?;
    }
    ctx.execute_activity::<_, ()>(PRINT_GREETING, &greeting)?;
    Ok(greeting)
}

/// Sleeps a year ten times over
pub fn sleepy(ctx: &mut RunContext, _: ()) -> Result<(), RunError> {
    for _ in 0..SLEEP_ROUNDS {
        ctx.sleep(YEAR)?;
    }
    ctx.execute_activity::<_, ()>(PRINT_GREETING, "sleepy head")?;
    Ok(())
}

/// Sums whatever signals arrive within a second of each round
pub fn signalled(ctx: &mut RunContext, _: ()) -> Result<i64, RunError> {
    let mut sum = 0;
    for round in 0..SIGNAL_ROUNDS {
        ctx.execute_activity::<_, ()>(MAYBE_SIGNAL, &round)?;
        if let Some(value) = ctx.await_signal::<i64>(DEMO_SIGNAL, SIGNAL_TIMEOUT)? {
            sum += value;
        }
    }
    ctx.execute_activity::<_, ()>(PRINT_GREETING, &format!("sum {sum}"))?;
    Ok(sum)
}

async fn enrich_greeting<L>(
    _ctx: ActivityContext,
    _backends: Arc<DemoBackends<L>>,
    message: String,
) -> Result<String, ActivityError> {
    Ok(format!("[{message}]"))
}

async fn print_greeting<L>(
    ctx: ActivityContext,
    _backends: Arc<DemoBackends<L>>,
    message: String,
) -> Result<(), ActivityError> {
    tracing::info!(key = %ctx.key(), "Hello {message}");
    Ok(())
}

async fn maybe_signal<L: EventLog + Clone>(
    ctx: ActivityContext,
    backends: Arc<DemoBackends<L>>,
    round: i64,
) -> Result<(), ActivityError> {
    if round > LAST_SIGNALLED_ROUND {
        return Ok(());
    }
    let value = round + SIGNAL_OFFSET;
    let run = ctx.key().run_key();
    backends
        .client
        .signal_run(
            &run.namespace,
            &run.workflow,
            &run.run,
            DEMO_SIGNAL,
            &value,
            &value.to_string(),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
#[path = "demo_tests.rs"]
mod tests;
