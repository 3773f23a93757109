use std::future::Future;
use std::pin::Pin;

use anyhow::anyhow;
use log::{info, warn};
use thiserror::Error;

use scenario_common::event::{self, Event};
use scenario_common::fetcher::{Interpreter, ScenarioError};
use scenario_common::world::World;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Line {}: '{}': {}", line, command, source)]
    Command {
        line: usize,
        command: String,
        source: ScenarioError,
    },
}

/// Result of a script run. On failure `world` is the state produced by
/// the last successful command, so completed registrations survive the
/// halt and can still be persisted.
pub struct ScriptOutcome {
    pub world: World,
    pub error: Option<ScriptError>,
}

/// Execute a scenario script: one command per line, `#` comments and
/// blank lines ignored, strictly sequential. The world produced by
/// command n is the only world command n+1 sees; the first failure
/// halts the run (fail-fast).
pub async fn run_source(interpreter: &Interpreter, world: World, source: &str) -> ScriptOutcome {
    let mut world = world;
    for (index, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let failed = |world: World, source: ScenarioError| ScriptOutcome {
            world,
            error: Some(ScriptError::Command {
                line: index + 1,
                command: line.to_owned(),
                source,
            }),
        };

        let event = match event::parse(line) {
            Ok(event) => event,
            Err(err) => return failed(world, err.into()),
        };
        match execute_event(interpreter, world.clone(), &event).await {
            Ok(next) => {
                info!("OK [{}] {}", index + 1, line);
                world = next;
            }
            Err(err) => return failed(world, err),
        }
    }
    ScriptOutcome { world, error: None }
}

/// Execute one event, handling the wrapper forms that scope or catch
/// around an inner command. Wrappers are resolved here, in the loop
/// layer, so catching an execution error is always explicit in the
/// script text and auditable in the logs.
pub fn execute_event<'a>(
    interpreter: &'a Interpreter,
    world: World,
    event: &'a Event,
) -> Pin<Box<dyn Future<Output = Result<World, ScenarioError>> + 'a>> {
    Box::pin(async move {
        match event.name() {
            // From <account> (<command>) - run the inner command with
            // the named account as sender, then restore the sender
            Some("From") => {
                let (account, inner) = match event.args() {
                    [account_token, inner_token] => match (account_token.as_atom(), inner_token.as_group()) {
                        (Some(account), Some(inner)) => (account, inner),
                        _ => return Err(usage_error("From <account> (<command>)")),
                    },
                    _ => return Err(usage_error("From <account> (<command>)")),
                };
                let previous = world.sender_name().map(str::to_owned);
                let scoped = world.with_sender(account)?;
                let result = execute_event(interpreter, scoped, inner).await?;
                Ok(match previous {
                    Some(name) => result.with_sender(&name)?,
                    None => result.without_sender(),
                })
            }
            // Expect Revert (<command>) - the opt-in catch: an inner
            // execution error is expected, anything else still halts
            Some("Expect") => {
                let inner = match event.args() {
                    [keyword, inner_token] if keyword.as_atom() == Some("Revert") => {
                        match inner_token.as_group() {
                            Some(inner) => inner,
                            None => return Err(usage_error("Expect Revert (<command>)")),
                        }
                    }
                    _ => return Err(usage_error("Expect Revert (<command>)")),
                };
                match execute_event(interpreter, world.clone(), inner).await {
                    Ok(_) => Err(ScenarioError::ExpectedRevert),
                    Err(ScenarioError::Execution(err)) => {
                        warn!("Caught expected execution error: {}", err);
                        Ok(world.record(event.to_string(), format!("reverted: {}", err)))
                    }
                    Err(other) => Err(other),
                }
            }
            _ => {
                let next = interpreter.dispatch(&world, event).await?;
                Ok(next.record(event.to_string(), "ok"))
            }
        }
    })
}

fn usage_error(usage: &str) -> ScenarioError {
    ScenarioError::Any(anyhow!("Usage: {}", usage))
}
