use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::agent::actions::{parse_actions, ActionKind};
use crate::agent::conversation::Conversation;
use crate::agent::state::{LoopState, RunReport, RunStatus};
use crate::config::SessionConfig;
use crate::errors::PilotResult;
use crate::executor::dispatcher::{ExecOutcome, Executor};
use crate::executor::input::InputDriver;
use crate::llm::openai::{build_messages, SYSTEM_PROMPT};
use crate::llm::provider::VisionModel;
use crate::perception::encode::encode_screenshot;
use crate::perception::screenshot::ScreenSource;

/// Drives the capture → model → parse → execute cycle for one objective.
/// Strictly sequential: one model call, one screenshot, one action at a time.
pub struct AgentEngine<M, S, D>
where
    M: VisionModel,
    S: ScreenSource,
    D: InputDriver,
{
    model: M,
    screen: S,
    executor: Executor<D>,
    conversation: Conversation,
    objective: String,
    screenshot_path: PathBuf,
    max_iterations: u32,
    stop: Arc<AtomicBool>,
    state: LoopState,
    iterations: u32,
}

impl<M, S, D> AgentEngine<M, S, D>
where
    M: VisionModel,
    S: ScreenSource,
    D: InputDriver,
{
    pub fn new(
        model: M,
        screen: S,
        executor: Executor<D>,
        objective: impl Into<String>,
        session: &SessionConfig,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let screenshot_path = session
            .resolve_screenshot_dir()
            .join(format!("capture_{}.png", uuid::Uuid::new_v4()));
        Self {
            model,
            screen,
            executor,
            conversation: Conversation::seeded(SYSTEM_PROMPT),
            objective: objective.into(),
            screenshot_path,
            max_iterations: session.max_iterations,
            stop,
            state: LoopState::Running,
            iterations: 0,
        }
    }

    /// The session log, for inspection after a run.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub async fn run(&mut self) -> RunReport {
        if let Some(dir) = self.screenshot_path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                return self.report(
                    RunStatus::Aborted,
                    format!("cannot create screenshot dir {}: {e}", dir.display()),
                );
            }
        }

        loop {
            if self.stop.load(Ordering::SeqCst)
                && !matches!(self.state, LoopState::Done { .. } | LoopState::Aborted { .. })
            {
                tracing::info!("stop requested, ending run at loop boundary");
                return self.report(RunStatus::Cancelled, "Run cancelled by operator");
            }

            match self.state.clone() {
                // ── Running: capture and encode the current screen ─────────
                LoopState::Running => {
                    if self.max_iterations > 0 && self.iterations >= self.max_iterations {
                        tracing::warn!(
                            iterations = self.iterations,
                            "iteration limit reached before the model declared completion"
                        );
                        self.state = LoopState::Done {
                            summary: format!(
                                "Stopped after {} iterations without the objective being declared complete",
                                self.iterations
                            ),
                        };
                        continue;
                    }

                    match self.observe() {
                        Ok(image_base64) => {
                            self.state = LoopState::AwaitingModel { image_base64 };
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "screen observation failed");
                            self.state = LoopState::Aborted {
                                error: e.to_string(),
                            };
                        }
                    }
                }

                // ── AwaitingModel: one model call, then record the exchange ─
                LoopState::AwaitingModel { image_base64 } => {
                    let messages = build_messages(
                        self.conversation.to_chat_messages(),
                        &self.objective,
                        &image_base64,
                    );
                    tracing::info!(
                        iteration = self.iterations + 1,
                        messages = messages.len(),
                        "calling vision model"
                    );

                    match self.model.complete(messages).await {
                        Ok(raw) => {
                            // History must reflect what was sent and received
                            // even when the response turns out to be garbage.
                            self.conversation
                                .push_user(self.objective.as_str(), image_base64.as_str());
                            self.conversation.push_assistant(raw.as_str());
                            self.iterations += 1;

                            let actions = parse_actions(&raw);
                            tracing::info!(actions = actions.len(), "model response parsed");
                            self.state = LoopState::Executing { actions };
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "model call failed after retries");
                            self.state = LoopState::Aborted {
                                error: e.to_string(),
                            };
                        }
                    }
                }

                // ── Executing: run the batch strictly in order ─────────────
                LoopState::Executing { actions } => {
                    // no `done` in the batch → another iteration
                    self.state = LoopState::Running;

                    for action in &actions {
                        if self.stop.load(Ordering::SeqCst) {
                            return self
                                .report(RunStatus::Cancelled, "Run cancelled by operator");
                        }

                        if let Some(thought) = &action.thought {
                            tracing::info!(thought = %thought, "model reasoning");
                        }

                        if let ActionKind::Done { summary } = &action.kind {
                            tracing::info!(summary = %summary, "model declared objective complete");
                            self.state = LoopState::Done {
                                summary: summary.clone(),
                            };
                            break;
                        }

                        match self.executor.execute(action) {
                            ExecOutcome::Completed => {
                                tracing::debug!(action = ?action.kind, "action executed");
                            }
                            ExecOutcome::Blocked { pattern } => {
                                tracing::warn!(
                                    pattern = %pattern,
                                    "write blocked by safety filter, action skipped"
                                );
                            }
                            ExecOutcome::Failed { reason } => {
                                tracing::warn!(reason = %reason, "action failed, continuing");
                            }
                        }
                    }
                }

                LoopState::Done { summary } => return self.report(RunStatus::Done, summary),
                LoopState::Aborted { error } => return self.report(RunStatus::Aborted, error),
            }
        }
    }

    fn observe(&mut self) -> PilotResult<String> {
        self.screen.capture(&self.screenshot_path)?;
        encode_screenshot(&self.screenshot_path)
    }

    fn report(&self, status: RunStatus, summary: impl Into<String>) -> RunReport {
        RunReport {
            status,
            summary: summary.into(),
            iterations: self.iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::conversation::Turn;
    use crate::errors::PilotError;
    use crate::llm::types::ChatMessage;
    use async_trait::async_trait;
    use image::{Rgba, RgbaImage};
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedModel {
        responses: Mutex<VecDeque<PilotResult<String>>>,
        seen_message_counts: Mutex<Vec<usize>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<PilotResult<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                seen_message_counts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VisionModel for ScriptedModel {
        async fn complete(&self, messages: Vec<ChatMessage>) -> PilotResult<String> {
            self.seen_message_counts.lock().unwrap().push(messages.len());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("model called more times than scripted")
        }
    }

    struct TinyScreen;

    impl ScreenSource for TinyScreen {
        fn capture(&mut self, path: &Path) -> PilotResult<()> {
            RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]))
                .save(path)
                .map_err(PilotError::from)
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Click(i32, i32),
        KeyDown(String),
        KeyUp(String),
        Char(char),
    }

    #[derive(Clone, Default)]
    struct SharedDriver {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl InputDriver for SharedDriver {
        fn screen_size(&mut self) -> PilotResult<(u32, u32)> {
            Ok((1920, 1080))
        }
        fn move_to(&mut self, _x: i32, _y: i32, _duration: Duration) -> PilotResult<()> {
            Ok(())
        }
        fn click(&mut self, x: i32, y: i32) -> PilotResult<()> {
            self.events.lock().unwrap().push(Event::Click(x, y));
            Ok(())
        }
        fn key_down(&mut self, key: &str) -> PilotResult<()> {
            self.events.lock().unwrap().push(Event::KeyDown(key.into()));
            Ok(())
        }
        fn key_up(&mut self, key: &str) -> PilotResult<()> {
            self.events.lock().unwrap().push(Event::KeyUp(key.into()));
            Ok(())
        }
        fn type_char(&mut self, ch: char) -> PilotResult<()> {
            self.events.lock().unwrap().push(Event::Char(ch));
            Ok(())
        }
    }

    fn session() -> SessionConfig {
        SessionConfig {
            max_iterations: 10,
            screenshot_dir: Some(std::env::temp_dir().join("deskpilot_engine_tests")),
        }
    }

    fn engine(
        responses: Vec<PilotResult<String>>,
        session: &SessionConfig,
    ) -> (
        AgentEngine<ScriptedModel, TinyScreen, SharedDriver>,
        Arc<Mutex<Vec<Event>>>,
    ) {
        let driver = SharedDriver::default();
        let events = driver.events.clone();
        let engine = AgentEngine::new(
            ScriptedModel::new(responses),
            TinyScreen,
            Executor::new(driver),
            "open search",
            session,
            Arc::new(AtomicBool::new(false)),
        );
        (engine, events)
    }

    fn pair_counts(conversation: &Conversation) -> (usize, usize, usize) {
        let mut system = 0;
        let mut user = 0;
        let mut assistant = 0;
        for turn in conversation.turns() {
            match turn {
                Turn::System { .. } => system += 1,
                Turn::User { .. } => user += 1,
                Turn::Assistant { .. } => assistant += 1,
            }
        }
        (system, user, assistant)
    }

    #[tokio::test]
    async fn fenced_done_response_terminates_the_loop() {
        let (mut engine, _) = engine(
            vec![Ok(
                "```json\n[{\"operation\":\"done\",\"summary\":\"Task complete\"}]\n```".into(),
            )],
            &session(),
        );
        let report = engine.run().await;

        assert_eq!(report.status, RunStatus::Done);
        assert_eq!(report.summary, "Task complete");
        assert_eq!(report.iterations, 1);
        assert_eq!(pair_counts(engine.conversation()), (1, 1, 1));
    }

    #[tokio::test]
    async fn press_batch_without_done_triggers_another_model_call() {
        let (mut engine, events) = engine(
            vec![
                Ok(r#"[{"operation":"press","keys":["cmd","space"],"thought":"open spotlight"}]"#
                    .into()),
                Ok(r#"[{"operation":"done","summary":"opened"}]"#.into()),
            ],
            &session(),
        );
        let report = engine.run().await;

        assert_eq!(report.status, RunStatus::Done);
        assert_eq!(report.iterations, 2);
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                Event::KeyDown("cmd".into()),
                Event::KeyDown("space".into()),
                Event::KeyUp("cmd".into()),
                Event::KeyUp("space".into()),
            ]
        );
        // one user and one assistant turn per iteration, in order
        assert_eq!(pair_counts(engine.conversation()), (1, 2, 2));
    }

    #[tokio::test]
    async fn second_call_carries_the_first_exchange_as_history() {
        let session = session();
        let driver = SharedDriver::default();
        let model = ScriptedModel::new(vec![
            Ok("[]".into()),
            Ok(r#"[{"operation":"done","summary":"ok"}]"#.into()),
        ]);
        let mut engine = AgentEngine::new(
            model,
            TinyScreen,
            Executor::new(driver),
            "open search",
            &session,
            Arc::new(AtomicBool::new(false)),
        );
        engine.run().await;

        let counts = engine.model.seen_message_counts.lock().unwrap().clone();
        // first call: system + fresh user; second adds the recorded pair
        assert_eq!(counts, vec![2, 4]);
    }

    #[tokio::test]
    async fn model_failure_aborts_the_run() {
        let (mut engine, _) = engine(
            vec![Err(PilotError::ModelCall("503 after 3 attempts".into()))],
            &session(),
        );
        let report = engine.run().await;

        assert_eq!(report.status, RunStatus::Aborted);
        assert!(report.summary.contains("503"));
        assert_eq!(report.iterations, 0);
        // the failed exchange is not recorded
        assert_eq!(pair_counts(engine.conversation()), (1, 0, 0));
    }

    #[tokio::test]
    async fn destructive_single_object_write_types_nothing_and_loop_continues() {
        let (mut engine, events) = engine(
            vec![
                Ok(r#"{"operation":"write","content":"rm -rf /"}"#.into()),
                Ok(r#"[{"operation":"done","summary":"gave up"}]"#.into()),
            ],
            &session(),
        );
        let report = engine.run().await;

        assert_eq!(report.status, RunStatus::Done);
        assert_eq!(report.iterations, 2);
        assert!(events.lock().unwrap().is_empty(), "no keystrokes may leak");
    }

    #[tokio::test]
    async fn malformed_response_ends_gracefully_but_is_recorded() {
        let (mut engine, _) = engine(vec![Ok("the model rambled instead".into())], &session());
        let report = engine.run().await;

        assert_eq!(report.status, RunStatus::Done);
        assert!(report.summary.contains("parse"));
        // the garbage exchange still lands in history
        assert_eq!(pair_counts(engine.conversation()), (1, 1, 1));
    }

    #[tokio::test]
    async fn done_mid_batch_stops_later_actions() {
        let (mut engine, events) = engine(
            vec![Ok(r#"[
                {"operation":"done","summary":"early exit"},
                {"operation":"write","content":"should never be typed"}
            ]"#
            .into())],
            &session(),
        );
        let report = engine.run().await;

        assert_eq!(report.status, RunStatus::Done);
        assert_eq!(report.summary, "early exit");
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn iteration_cap_ends_a_run_the_model_never_finishes() {
        let mut cfg = session();
        cfg.max_iterations = 3;
        let (mut engine, _) = engine(
            vec![Ok("[]".into()), Ok("[]".into()), Ok("[]".into())],
            &cfg,
        );
        let report = engine.run().await;

        assert_eq!(report.status, RunStatus::Done);
        assert_eq!(report.iterations, 3);
        assert!(report.summary.contains("3 iterations"));
        assert_eq!(pair_counts(engine.conversation()), (1, 3, 3));
    }

    #[tokio::test]
    async fn stop_flag_is_honored_before_any_model_call() {
        let driver = SharedDriver::default();
        let mut engine = AgentEngine::new(
            ScriptedModel::new(vec![]),
            TinyScreen,
            Executor::new(driver),
            "open search",
            &session(),
            Arc::new(AtomicBool::new(true)),
        );
        let report = engine.run().await;

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.iterations, 0);
    }
}
