//! Cooperative continuations.
//!
//! A handler that must outlive its dispatch tick returns a [`Task`]; the
//! server keeps it on the connection and advances it once per frame. Frame
//! yields and engine-clock deadlines are the only suspension points, so a
//! paused engine freezes timers exactly as the scheduling model requires.

use crate::bridge::{BridgeCtx, Reply};
use crate::input::inject::{self, KeyAction, SeqStep};
use crate::input::keys;
use crate::routes;
use crate::wait::WaitForTask;
use serde_json::{json, Value as Json};
use strand::contract::{InputEvent, MouseButton};
use strand::logging;

/// Observation flags a mutation endpoint carries so the client can fuse the
/// action with a fresh snapshot and/or screenshot in one round-trip.
#[derive(Copy, Clone, Debug, Default)]
pub struct Observe {
    pub snapshot: bool,
    pub screenshot: bool,
}

pub enum Progress {
    Pending,
    Ready(Reply),
}

pub enum Task {
    Wait(WaitTask),
    PressRelease(PressReleaseTask),
    Hold(HoldTask),
    Sequence(SequenceTask),
    WaitFor(WaitForTask),
}

impl Task {
    pub fn advance(&mut self, ctx: &mut BridgeCtx) -> Progress {
        match self {
            Task::Wait(task) => task.advance(ctx),
            Task::PressRelease(task) => task.advance(ctx),
            Task::Hold(task) => task.advance(ctx),
            Task::Sequence(task) => task.advance(ctx),
            Task::WaitFor(task) => task.advance(ctx),
        }
    }
}

fn finish(ctx: &mut BridgeCtx, mut base: Json, observe: Observe) -> Progress {
    routes::attach_observation(ctx, &mut base, observe);
    Progress::Ready(Reply::Json(base))
}

/// Fixed delay on the engine clock.
pub struct WaitTask {
    deadline: f64,
    seconds: f64,
    base: Json,
    observe: Observe,
}

impl WaitTask {
    pub fn new(ctx: &mut BridgeCtx, seconds: f64, base: Json, observe: Observe) -> WaitTask {
        WaitTask {
            deadline: ctx.engine.clock().seconds + seconds,
            seconds,
            base,
            observe,
        }
    }

    fn advance(&mut self, ctx: &mut BridgeCtx) -> Progress {
        if ctx.engine.clock().seconds < self.deadline {
            return Progress::Pending;
        }

        let mut base = self.base.take();
        if let Some(obj) = base.as_object_mut() {
            obj.insert("waited".into(), json!(self.seconds));
        }
        finish(ctx, base, self.observe)
    }
}

/// Press, yield exactly one frame, release.
pub struct PressReleaseTask {
    press: Option<InputEvent>,
    release: InputEvent,
    press_frame: Option<u64>,
    base: Json,
    observe: Observe,
}

impl PressReleaseTask {
    pub fn new(press: InputEvent, release: InputEvent, base: Json, observe: Observe) -> PressReleaseTask {
        PressReleaseTask {
            press: Some(press),
            release,
            press_frame: None,
            base,
            observe,
        }
    }

    /// The press/release pair for a point click.
    pub fn click(x: f32, y: f32, button: MouseButton, double: bool, base: Json, observe: Observe) -> PressReleaseTask {
        let (press, release) = inject::click_events(x, y, button, double);
        Self::new(press, release, base, observe)
    }

    fn advance(&mut self, ctx: &mut BridgeCtx) -> Progress {
        let frame = ctx.engine.clock().frame;

        match self.press_frame {
            None => {
                let press = self.press.take().expect("press dispatched twice");
                ctx.engine.dispatch_input(press);
                self.press_frame = Some(frame);
                Progress::Pending
            }
            Some(pressed_at) if frame > pressed_at => {
                ctx.engine.dispatch_input(self.release.clone());
                finish(ctx, self.base.take(), self.observe)
            }
            Some(_) => Progress::Pending,
        }
    }
}

/// Press, hold for an engine-clock duration, release. With a zero duration
/// the release still trails the press by one frame.
pub struct HoldTask {
    press: Option<InputEvent>,
    release: InputEvent,
    duration: f64,
    started: Option<(f64, u64)>,
    base: Json,
    observe: Observe,
}

impl HoldTask {
    pub fn new(press: InputEvent, release: InputEvent, duration: f64, base: Json, observe: Observe) -> HoldTask {
        HoldTask {
            press: Some(press),
            release,
            duration,
            started: None,
            base,
            observe,
        }
    }

    fn advance(&mut self, ctx: &mut BridgeCtx) -> Progress {
        let clock = ctx.engine.clock();

        match self.started {
            None => {
                let press = self.press.take().expect("press dispatched twice");
                ctx.engine.dispatch_input(press);
                self.started = Some((clock.seconds, clock.frame));
                Progress::Pending
            }
            Some((started_at, frame)) if clock.seconds - started_at >= self.duration && clock.frame > frame => {
                ctx.engine.dispatch_input(self.release.clone());
                finish(ctx, self.base.take(), self.observe)
            }
            Some(_) => Progress::Pending,
        }
    }
}

/// Scripted step list. Steps run strictly in order; every step completes
/// (and yields at least one frame) before the next begins. Steps that fail
/// to resolve emit a diagnostic and are skipped, the sequence proceeds.
pub struct SequenceTask {
    steps: Vec<SeqStep>,
    index: usize,
    executed: usize,
    inner: Option<Box<Task>>,
    started: Option<f64>,
    observe: Observe,
}

impl SequenceTask {
    pub fn new(steps: Vec<SeqStep>, observe: Observe) -> SequenceTask {
        SequenceTask {
            steps,
            index: 0,
            executed: 0,
            inner: None,
            started: None,
            observe,
        }
    }

    fn advance(&mut self, ctx: &mut BridgeCtx) -> Progress {
        let now = ctx.engine.clock().seconds;
        let started = *self.started.get_or_insert(now);

        if let Some(inner) = self.inner.as_mut() {
            match inner.advance(ctx) {
                Progress::Pending => return Progress::Pending,
                Progress::Ready(_) => {
                    self.inner = None;
                    self.index += 1;
                    self.executed += 1;
                    return Progress::Pending;
                }
            }
        }

        if self.index >= self.steps.len() {
            let base = json!({
                "steps_executed": self.executed,
                "steps_total": self.steps.len(),
                "elapsed": now - started,
                "_description": format!("Executed {} of {} sequence steps", self.executed, self.steps.len()),
            });
            return finish(ctx, base, self.observe);
        }

        let step = self.steps[self.index].clone();
        self.start_step(ctx, step);
        Progress::Pending
    }

    fn start_step(&mut self, ctx: &mut BridgeCtx, step: SeqStep) {
        let quiet = Observe::default();

        match step {
            SeqStep::Wait { seconds } => {
                self.inner = Some(Box::new(Task::Wait(WaitTask::new(ctx, seconds, json!({}), quiet))));
            }
            SeqStep::Key { name, action, duration } => {
                let keycode = match keys::resolve(&name) {
                    Some(keycode) => keycode,
                    None => {
                        logging::warn!(ctx.log, "sequence skipped unknown key";
                                       "context" => "start_step", "key" => %name);
                        self.skip_step();
                        return;
                    }
                };

                let press = inject::key_event(keycode, true);
                let release = inject::key_event(keycode, false);

                match action {
                    KeyAction::Tap => {
                        self.inner = Some(Box::new(Task::PressRelease(PressReleaseTask::new(
                            press,
                            release,
                            json!({}),
                            quiet,
                        ))));
                    }
                    KeyAction::Hold => {
                        self.inner = Some(Box::new(Task::Hold(HoldTask::new(press, release, duration, json!({}), quiet))));
                    }
                    KeyAction::Press => {
                        ctx.engine.dispatch_input(press);
                        self.complete_step();
                    }
                    KeyAction::Release => {
                        ctx.engine.dispatch_input(release);
                        self.complete_step();
                    }
                }
            }
            SeqStep::Action { name, pressed, strength } => {
                ctx.engine.dispatch_input(inject::action_event(&name, pressed, strength));
                self.complete_step();
            }
            SeqStep::Click { x, y } => {
                self.inner = Some(Box::new(Task::PressRelease(PressReleaseTask::click(
                    x,
                    y,
                    MouseButton::Left,
                    false,
                    json!({}),
                    quiet,
                ))));
            }
            SeqStep::ClickNode { key } => {
                let resolved = ctx.refs.resolve(&*ctx.engine, &key, None);
                let target = resolved.and_then(|id| inject::click_target(&*ctx.engine, id).ok());

                match target {
                    Some((x, y)) => {
                        self.inner = Some(Box::new(Task::PressRelease(PressReleaseTask::click(
                            x,
                            y,
                            MouseButton::Left,
                            false,
                            json!({}),
                            quiet,
                        ))));
                    }
                    None => {
                        logging::warn!(ctx.log, "sequence skipped unreachable click target";
                                       "context" => "start_step", "target" => %key);
                        self.skip_step();
                    }
                }
            }
            SeqStep::MouseMove { x, y } => {
                let (mx, my) = ctx.engine.mouse_position();
                ctx.engine
                    .dispatch_input(inject::mouse_move_event(x, y, x - mx, y - my));
                self.complete_step();
            }
        }
    }

    #[inline]
    fn complete_step(&mut self) {
        self.index += 1;
        self.executed += 1;
    }

    #[inline]
    fn skip_step(&mut self) {
        self.index += 1;
    }
}
