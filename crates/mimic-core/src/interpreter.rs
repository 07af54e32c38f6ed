//! Replay executor for `VERB:arg` command sequences.
//!
//! Commands run strictly in order: each one is parsed, its element (if any) is
//! resolved against a fresh snapshot, and the injector's event sequence is
//! awaited to completion before the next command starts. A failing command is
//! logged and skipped; the sequence carries on.

use mimic_common::command::{Command, PointerTarget, ScrollDirection};
use mimic_common::knowledge::PlanStep;
use mimic_common::locator::Locator;
use mimic_common::parser::{ParseError, parse_command};
use mimic_common::protocol::{Element, MouseButton, Point};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError, WindowManager};
use crate::config::ReplayConfig;
use crate::injector::InputInjector;
use crate::resolution::ElementResolver;

#[derive(Debug, thiserror::Error)]
pub enum InterpreterError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("No element matches '{0}'")]
    Unresolved(String),

    #[error("Backend error: {0}")]
    Backend(BackendError),

    #[error("{0} needs a window manager, but the backend has none")]
    NoWindowManager(&'static str),

    #[error("Replay cancelled")]
    Cancelled,
}

impl From<BackendError> for InterpreterError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Cancelled => InterpreterError::Cancelled,
            other => InterpreterError::Backend(other),
        }
    }
}

/// Progress emitted for display while a replay runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayEvent {
    Log(String),
    Cursor(Point),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// `FINISHED` was reached; nothing after it runs.
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCommand {
    pub index: usize,
    pub command: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub executed: usize,
    pub skipped: Vec<SkippedCommand>,
    /// Steps that only succeeded through one of their fallbacks.
    pub fallbacks_used: usize,
    pub finished: bool,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        self.skipped.is_empty() && !self.cancelled
    }

    pub fn failure_reason(&self) -> Option<String> {
        if self.cancelled {
            return Some("cancelled".to_string());
        }
        self.skipped
            .first()
            .map(|s| format!("{}: {}", s.command, s.reason))
    }
}

pub struct CommandInterpreter {
    injector: InputInjector,
    events: Option<UnboundedSender<ReplayEvent>>,
    cancel: CancellationToken,
}

impl CommandInterpreter {
    pub fn new(config: ReplayConfig) -> Self {
        let cancel = CancellationToken::new();
        Self {
            injector: InputInjector::new(config, cancel.clone()),
            events: None,
            cancel,
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<ReplayEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Observe `token` between commands, inside staged actions and during `WAIT`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.injector.set_cancellation(token.clone());
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cursor(&self) -> Point {
        self.injector.cursor()
    }

    /// Run plain commands in order.
    pub async fn execute<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        commands: &[String],
    ) -> ExecutionReport {
        let steps: Vec<PlanStep> = commands.iter().map(PlanStep::new).collect();
        self.execute_plan(backend, &steps).await
    }

    /// Run plan steps in order, trying each step's fallbacks when its primary command fails.
    pub async fn execute_plan<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        steps: &[PlanStep],
    ) -> ExecutionReport {
        let started = Instant::now();
        let mut report = ExecutionReport::default();

        for (index, step) in steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            match self.run_step(backend, step).await {
                Ok((outcome, used_fallback)) => {
                    report.executed += 1;
                    if used_fallback {
                        report.fallbacks_used += 1;
                    }
                    if outcome == StepOutcome::Finished {
                        report.finished = true;
                        self.log("Plan finished".to_string());
                        break;
                    }
                }
                Err(InterpreterError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!("Skipping step {} '{}': {}", index, step.command, e);
                    self.log(format!("Skipped '{}': {}", step.command, e));
                    report.skipped.push(SkippedCommand {
                        index,
                        command: step.command.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if report.cancelled {
            self.log("Replay cancelled".to_string());
        }
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            "Replay done: {} executed, {} skipped, {} via fallback in {}ms",
            report.executed,
            report.skipped.len(),
            report.fallbacks_used,
            report.duration_ms
        );
        report
    }

    async fn run_step<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        step: &PlanStep,
    ) -> Result<(StepOutcome, bool), InterpreterError> {
        let primary_error = match self.execute_line(backend, &step.command).await {
            Ok(outcome) => return Ok((outcome, false)),
            Err(InterpreterError::Cancelled) => return Err(InterpreterError::Cancelled),
            Err(e) => e,
        };

        for fallback in &step.fallbacks {
            debug!("'{}' failed ({}), trying '{}'", step.command, primary_error, fallback);
            match self.execute_line(backend, fallback).await {
                Ok(outcome) => {
                    self.log(format!("Used fallback '{}' for '{}'", fallback, step.command));
                    return Ok((outcome, true));
                }
                Err(InterpreterError::Cancelled) => return Err(InterpreterError::Cancelled),
                Err(e) => debug!("Fallback '{}' failed: {}", fallback, e),
            }
        }
        Err(primary_error)
    }

    /// Parse and run a single command line.
    pub async fn execute_line<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        line: &str,
    ) -> Result<StepOutcome, InterpreterError> {
        let command = parse_command(line)?;
        self.execute_command(backend, &command).await
    }

    pub async fn execute_command<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        command: &Command,
    ) -> Result<StepOutcome, InterpreterError> {
        self.injector.checkpoint()?;
        self.log(format!("> {}", command));
        let cursor_before = self.injector.cursor();

        match command {
            Command::MouseMove(at) => self.injector.move_to(backend, *at).await?,
            Command::Click(target) => self.click(backend, target, MouseButton::Left, 1).await?,
            Command::RightClick(target) => {
                self.click(backend, target, MouseButton::Right, 1).await?
            }
            Command::DoubleClick(target) => {
                self.click(backend, target, MouseButton::Left, 2).await?
            }
            Command::Scroll {
                direction,
                amount,
                at,
            } => {
                let at = at.unwrap_or_else(|| self.injector.cursor());
                let delta = direction.signed(*amount);
                let (delta_x, delta_y) = match direction {
                    ScrollDirection::Left | ScrollDirection::Right => (delta, 0.0),
                    ScrollDirection::Up | ScrollDirection::Down => (0.0, delta),
                };
                let target = self.hit_test(backend, at).await?;
                self.injector
                    .scroll(backend, at, delta_x, delta_y, target)
                    .await?
            }
            Command::Drag { from, to } => self.injector.drag(backend, *from, *to).await?,
            Command::Type(text) => self.injector.type_text(backend, text).await?,
            Command::PressKey(key) => self.injector.press_key(backend, key, &[]).await?,
            Command::KeyCombo { modifiers, key } => {
                self.injector.press_key(backend, key, modifiers).await?
            }
            Command::Backspace(count) => self.injector.backspace(backend, *count).await?,
            Command::FocusElement(locator) => {
                let element = self.resolve(backend, locator).await?;
                self.injector.move_to(backend, element.center()).await?;
                backend.focus(element.id).await?;
            }
            Command::Wait(ms) => self.injector.pause(*ms).await?,
            Command::OpenApp(app_id) => {
                let window = window_manager(backend, command)?.open_app(app_id).await?;
                self.log(format!("Opened '{}' as window '{}'", app_id, window.id));
            }
            Command::CloseWindow(id) => window_manager(backend, command)?.close_window(id).await?,
            Command::FocusWindow(id) => window_manager(backend, command)?.focus_window(id).await?,
            Command::MoveWindow { id, to } => {
                window_manager(backend, command)?.move_window(id, *to).await?
            }
            Command::Finished => return Ok(StepOutcome::Finished),
        }

        let cursor = self.injector.cursor();
        if cursor != cursor_before {
            self.emit(ReplayEvent::Cursor(cursor));
        }
        Ok(StepOutcome::Done)
    }

    async fn click<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        target: &PointerTarget,
        button: MouseButton,
        click_count: u8,
    ) -> Result<(), InterpreterError> {
        let (at, id) = match target {
            PointerTarget::Current => {
                let at = self.injector.cursor();
                (at, self.hit_test(backend, at).await?)
            }
            PointerTarget::Point(at) => (*at, self.hit_test(backend, *at).await?),
            PointerTarget::Element(locator) => {
                let element = self.resolve(backend, locator).await?;
                (element.center(), Some(element.id))
            }
        };
        self.injector
            .click(backend, at, id, button, click_count)
            .await?;
        Ok(())
    }

    async fn resolve<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        locator: &Locator,
    ) -> Result<Element, InterpreterError> {
        let snapshot = backend.snapshot().await?;
        ElementResolver::resolve(locator, &snapshot, backend)
            .await
            .ok_or_else(|| InterpreterError::Unresolved(locator.to_string()))
    }

    async fn hit_test<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        at: Point,
    ) -> Result<Option<u32>, InterpreterError> {
        let snapshot = backend.snapshot().await?;
        Ok(snapshot.hit_test(&at).map(|e| e.id))
    }

    fn log(&self, message: String) {
        debug!("{}", message);
        self.emit(ReplayEvent::Log(message));
    }

    fn emit(&self, event: ReplayEvent) {
        if let Some(events) = &self.events {
            // Receiver gone means nobody is displaying progress; replay continues.
            let _ = events.send(event);
        }
    }
}

fn window_manager<'a, B: Backend + ?Sized>(
    backend: &'a mut B,
    command: &Command,
) -> Result<&'a mut dyn WindowManager, InterpreterError> {
    backend
        .window_manager()
        .ok_or(InterpreterError::NoWindowManager(command.verb()))
}
