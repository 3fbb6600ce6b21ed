use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    logging::Logger,
    status::{StatusHandler, METRIC_CURRENT_STATE_MACHINE_STEP},
    steps::MachineStates,
    timer::Timer,
    types::StepIdentifier,
    Error,
};

const STOPPED: &str = "stopped";

pub struct ArgsStateMachine {
    pub state_machine_name: String,
    pub steps: MachineStates,
    pub start_state_identifier: StepIdentifier,
    pub duration_between_steps: Duration,
    pub logger: Option<Logger>,
    pub timer: Option<Arc<dyn Timer>>,
    pub status_handler: Option<Arc<dyn StatusHandler>>,
}

/// Drives the steps on a background task, pausing between two consecutive steps.
///
/// The loop ends when [`StateMachine::close`] is called or when a step returns an error.
pub struct StateMachine {
    name: String,
    cancel: CancellationToken,
    stopped: CancellationToken,
    running: Arc<AtomicBool>,
}

struct StateMachineLoop {
    name: String,
    steps: MachineStates,
    current_step: StepIdentifier,
    duration_between_steps: Duration,
    logger: Logger,
    timer: Arc<dyn Timer>,
    status_handler: Arc<dyn StatusHandler>,
}

impl StateMachine {
    /// Validates the arguments and spawns the loop. Must be called from within a tokio runtime.
    pub fn new(args: ArgsStateMachine) -> Result<Self, Error> {
        if args.steps.is_empty() {
            return Err(Error::NilStepsMap);
        }
        if !args.steps.contains_key(&args.start_state_identifier) {
            return Err(Error::StepNotFound(args.start_state_identifier));
        }
        let logger = args.logger.ok_or(Error::NilLogger)?;
        let timer = args.timer.ok_or(Error::NilTimer)?;
        let status_handler = args.status_handler.ok_or(Error::NilStatusHandler)?;

        let state_machine_loop = StateMachineLoop {
            name: args.state_machine_name.clone(),
            steps: args.steps,
            current_step: args.start_state_identifier,
            duration_between_steps: args.duration_between_steps,
            logger,
            timer,
            status_handler,
        };

        let state_machine = Self {
            name: args.state_machine_name,
            cancel: CancellationToken::new(),
            stopped: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(true)),
        };
        tokio::spawn(state_machine_loop.run(
            state_machine.cancel.clone(),
            state_machine.stopped.clone(),
            state_machine.running.clone(),
        ));

        Ok(state_machine)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Asks the loop to stop. Use [`StateMachine::wait`] to know when it did.
    pub fn close(&self) -> Result<(), Error> {
        self.cancel.cancel();
        Ok(())
    }

    /// Resolves once the loop has exited.
    pub async fn wait(&self) {
        self.stopped.cancelled().await
    }
}

impl Drop for StateMachine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl StateMachineLoop {
    async fn run(mut self, ctx: CancellationToken, stopped: CancellationToken, running: Arc<AtomicBool>) {
        self.logger.info(
            &format!("{}: state machine started", self.name),
            &[&"start step", &self.current_step],
        );

        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    self.logger.info(&format!("{}: state machine main loop is closing", self.name), &[]);
                    break;
                }
                _ = self.timer.after(self.duration_between_steps) => {}
            }

            match self.execute_step(&ctx).await {
                Ok(()) => {}
                Err(Error::Cancelled) => {
                    self.logger.info(
                        &format!("{}: state machine stopped while executing a step", self.name),
                        &[&"step", &self.current_step],
                    );
                    break;
                }
                Err(e) => {
                    self.logger.error(
                        &format!("{}: state machine stopped", self.name),
                        &[&"step", &self.current_step, &"error", &e],
                    );
                    break;
                }
            }
        }

        self.status_handler
            .set_string_metric(METRIC_CURRENT_STATE_MACHINE_STEP, STOPPED);
        running.store(false, Ordering::SeqCst);
        stopped.cancel();
    }

    async fn execute_step(&mut self, ctx: &CancellationToken) -> Result<(), Error> {
        let step = self
            .steps
            .get(&self.current_step)
            .ok_or(Error::StepNotFound(self.current_step))?;

        self.status_handler
            .set_string_metric(METRIC_CURRENT_STATE_MACHINE_STEP, step.identifier().as_str());
        let next_step = step.execute(ctx).await?;

        if next_step != self.current_step {
            self.logger.info(
                &format!("{}: switched step", self.name),
                &[&"from", &self.current_step, &"to", &next_step],
            );
        }
        self.current_step = next_step;

        Ok(())
    }
}
