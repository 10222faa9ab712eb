//! Monitoring session run loop

use std::sync::Arc;
use std::time::Duration;

use alerting::{dispatch, AlertCommand, AlertSink};
use camera_capture::{FrameReceiver, VideoFrame};
use dms::{FrameOutcome, FrameRecord};
use feature_engine::{ClassifierInput, FeatureExtractor};
use frame_scheduler::Admission;
use inference_engine::InferenceEngine;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::context::{SessionConfig, SessionContext, SessionStats, StateSnapshot};
use crate::{SessionCommand, SessionError, SessionHandle};

/// Capacity of the command channel
const COMMAND_BUFFER: usize = 16;

/// Result of running one admitted frame through the collaborators
#[derive(Debug)]
struct Analysis {
    record: FrameRecord,
    inference_ms: u64,
}

/// Final counters of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub generation: u64,
    pub stats: SessionStats,
}

/// One driver-monitoring session
pub struct MonitoringSession {
    config: SessionConfig,
    engine: InferenceEngine,
    sink: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    context: SessionContext,
    commands: mpsc::Receiver<SessionCommand>,
    snapshots: watch::Sender<Option<StateSnapshot>>,
}

impl MonitoringSession {
    /// Initialize the inference collaborators and create the session.
    ///
    /// Collaborator initialization failure is returned as a retryable
    /// [`SessionError::InferenceUnavailable`].
    pub fn start(
        config: SessionConfig,
        engine: InferenceEngine,
        sink: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, SessionHandle), SessionError> {
        let config = config.sanitized();
        let engine = engine.with_timeout(config.inference_timeout_ms.map(Duration::from_millis));

        if let Err(e) = engine.initialize() {
            error!("Cannot start monitoring session: {}", e);
            return Err(SessionError::InferenceUnavailable(e));
        }

        let context = SessionContext::new(&config, 0, clock.now_ms());
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (snapshots, snapshot_rx) = watch::channel(None);

        info!(session_id = %context.session_id, "Monitoring session started");

        let session = Self {
            config,
            engine,
            sink,
            clock,
            context,
            commands,
            snapshots,
        };
        Ok((session, SessionHandle::new(command_tx, snapshot_rx)))
    }

    /// Consume frames until the source closes or a stop is requested.
    ///
    /// Commands are served while inference is in flight; a reset or stop
    /// discards the in-flight frame.
    pub async fn run(mut self, mut frames: FrameReceiver) -> SessionSummary {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Stop) => break,
                    Some(command) => self.handle_command(command),
                    // All handles dropped; keep serving frames
                    None => {
                        self.drain_frames(&mut frames).await;
                        break;
                    }
                },
                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        info!("Frame source closed");
                        break;
                    };
                    if !self.run_frame(frame).await {
                        break;
                    }
                }
            }
        }

        let summary = SessionSummary {
            generation: self.context.generation,
            stats: self.context.stats,
        };
        info!(
            session_id = %self.context.session_id,
            received = summary.stats.frames_received,
            assessed = summary.stats.frames_assessed,
            "Monitoring session stopped"
        );
        summary
    }

    /// Serve frames with no command channel left to listen to
    async fn drain_frames(&mut self, frames: &mut FrameReceiver) {
        while let Some(frame) = frames.recv().await {
            self.process_frame(frame).await;
        }
    }

    /// Process one frame while listening for commands; false once stopped
    async fn run_frame(&mut self, frame: VideoFrame) -> bool {
        let Some((generation, now_ms)) = self.admit() else {
            return true;
        };

        let analysis = analyze(self.engine.clone(), frame, now_ms);
        tokio::pin!(analysis);

        loop {
            tokio::select! {
                result = &mut analysis => {
                    self.apply(generation, now_ms, result);
                    return true;
                }
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Acknowledge) => self.acknowledge(),
                    Some(SessionCommand::Reset) => {
                        debug!("Discarding in-flight frame on reset");
                        self.reset();
                        return true;
                    }
                    Some(SessionCommand::Stop) => {
                        debug!("Discarding in-flight frame on stop");
                        self.context.gate.abandon();
                        return false;
                    }
                    None => {
                        let result = (&mut analysis).await;
                        self.apply(generation, now_ms, result);
                        return true;
                    }
                },
            }
        }
    }

    /// Process one frame to completion without listening for commands
    pub async fn process_frame(&mut self, frame: VideoFrame) -> Option<FrameOutcome> {
        let (generation, now_ms) = self.admit()?;
        let analysis = analyze(self.engine.clone(), frame, now_ms).await;
        self.apply(generation, now_ms, analysis)
    }

    /// Admission check; returns the generation and time the frame was admitted at
    fn admit(&mut self) -> Option<(u64, u64)> {
        let now_ms = self.clock.now_ms();
        self.context.stats.frames_received += 1;

        let admission = self.context.gate.try_admit(now_ms);
        if admission != Admission::Admitted {
            metrics::counter!("dms_frames_total", "outcome" => admission.label()).increment(1);
            return None;
        }
        self.context.stats.frames_admitted += 1;
        Some((self.context.generation, now_ms))
    }

    /// Merge an analysis into the session unless it belongs to an older generation
    fn apply(
        &mut self,
        generation: u64,
        admitted_ms: u64,
        analysis: Analysis,
    ) -> Option<FrameOutcome> {
        if generation != self.context.generation {
            debug!("Dropping stale result from generation {}", generation);
            return None;
        }

        let outcome = self.context.pipeline.process(&analysis.record);
        self.context.last_inference_ms = analysis.inference_ms;
        metrics::counter!("dms_frames_total", "outcome" => outcome.label()).increment(1);
        metrics::histogram!("dms_inference_ms").record(analysis.inference_ms as f64);

        match &outcome {
            FrameOutcome::Assessed(assessment) => {
                self.context.stats.frames_assessed += 1;
                self.context.last_frame_error = None;
                metrics::gauge!("dms_fatigue_score").set(assessment.fatigue_score);
                let commands = self.context.alerts.evaluate(assessment, admitted_ms);
                self.dispatch_all(&commands);
            }
            FrameOutcome::NoFace => {
                self.context.stats.frames_without_face += 1;
                self.tick_alerts(admitted_ms);
            }
            FrameOutcome::Failed(e) => {
                warn!("Frame at {} skipped: {}", admitted_ms, e);
                self.context.stats.frames_failed += 1;
                self.context.last_frame_error = Some(e.to_string());
                self.tick_alerts(admitted_ms);
            }
        }

        let now_ms = self.clock.now_ms();
        self.context.gate.complete(now_ms.saturating_sub(admitted_ms));
        metrics::gauge!("dms_observed_fps").set(self.context.gate.current_fps());
        self.publish(now_ms);

        Some(outcome)
    }

    /// Advance running alert timers for a frame that produced no assessment
    fn tick_alerts(&mut self, now_ms: u64) {
        let commands = self.context.alerts.tick(now_ms);
        self.dispatch_all(&commands);
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Acknowledge => self.acknowledge(),
            SessionCommand::Reset => self.reset(),
            SessionCommand::Stop => {}
        }
    }

    /// Driver confirmed they are alert
    pub fn acknowledge(&mut self) {
        let now_ms = self.clock.now_ms();
        let level = self.context.pipeline.level();
        let commands = self.context.alerts.acknowledge(level, now_ms);
        self.dispatch_all(&commands);
        self.publish(now_ms);
    }

    /// Clear history, alert state and timers together
    pub fn reset(&mut self) {
        let now_ms = self.clock.now_ms();
        let had_alert = self.context.alerts.state().active.is_some();
        self.context.reset(&self.config, now_ms);
        if had_alert {
            self.dispatch_all(&[AlertCommand::Stop]);
        }
        info!(
            session_id = %self.context.session_id,
            generation = self.context.generation,
            "Session reset"
        );
        self.publish(now_ms);
    }

    fn dispatch_all(&self, commands: &[AlertCommand]) {
        for command in commands {
            match command {
                AlertCommand::Play { level, .. } => {
                    metrics::counter!("dms_alerts_fired_total", "level" => level.as_str())
                        .increment(1);
                }
                AlertCommand::NotifyEmergency { .. } => {
                    metrics::counter!("dms_emergency_notifications_total").increment(1);
                }
                AlertCommand::Stop => {}
            }
            if let Err(e) = dispatch(self.sink.as_ref(), command) {
                warn!("Alert sink failed: {}", e);
                metrics::counter!("dms_sink_failures_total").increment(1);
            }
        }
    }

    fn publish(&self, now_ms: u64) {
        self.snapshots.send_replace(Some(self.context.snapshot(now_ms)));
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }
}

/// Detect, extract and classify one frame
async fn analyze(engine: InferenceEngine, frame: VideoFrame, now_ms: u64) -> Analysis {
    let detected = match engine.detect(frame).await {
        Ok(detected) => detected,
        Err(e) => {
            return Analysis {
                record: FrameRecord::failed(now_ms, e.into()),
                inference_ms: 0,
            }
        }
    };
    if detected.output.is_empty() {
        return Analysis {
            record: FrameRecord::no_face(now_ms),
            inference_ms: detected.latency_ms,
        };
    }

    let features = match FeatureExtractor::new().extract(&detected.output) {
        Ok(features) => features,
        Err(e) => {
            return Analysis {
                record: FrameRecord::failed(now_ms, e.into()),
                inference_ms: detected.latency_ms,
            }
        }
    };

    match engine.classify(ClassifierInput::from_features(&features)).await {
        Ok(classified) => Analysis {
            record: FrameRecord::analyzed(now_ms, features, classified.output),
            inference_ms: detected.latency_ms + classified.latency_ms,
        },
        Err(e) => Analysis {
            record: FrameRecord::failed(now_ms, e.into()),
            inference_ms: detected.latency_ms,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use alerting::{AlertConfig, AlertIntensity, EmergencyConfig, EmergencyContact, SinkError};
    use camera_capture::CaptureHandle;
    use dms::DrowsinessLevel;
    use feature_engine::testing::frontal_face;
    use feature_engine::Landmark;
    use inference_engine::{
        InferenceError, LandmarkDetector, MockClassifier, RecordedLandmarks,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum SinkCall {
        Play(DrowsinessLevel),
        Stop,
        Emergency(String),
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<SinkCall>>,
        fail: bool,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<SinkCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AlertSink for RecordingSink {
        fn play_alert(
            &self,
            level: DrowsinessLevel,
            _intensity: AlertIntensity,
            _sound: bool,
            _haptic: bool,
        ) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push(SinkCall::Play(level));
            if self.fail {
                return Err(SinkError::Playback("speaker unplugged".to_string()));
            }
            Ok(())
        }

        fn stop_alert(&self) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push(SinkCall::Stop);
            Ok(())
        }

        fn notify_emergency(
            &self,
            _contact: &EmergencyContact,
            message: &str,
        ) -> Result<(), SinkError> {
            self.calls
                .lock()
                .unwrap()
                .push(SinkCall::Emergency(message.to_string()));
            Ok(())
        }
    }

    /// Detector that blocks for a while and flags when it was entered
    struct SlowDetector {
        entered: Arc<AtomicBool>,
    }

    impl LandmarkDetector for SlowDetector {
        fn detect_landmarks(&self, _frame: &VideoFrame) -> Result<Vec<Landmark>, InferenceError> {
            self.entered.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
            Ok(frontal_face(0.10))
        }
    }

    struct Fixture {
        session: MonitoringSession,
        handle: SessionHandle,
        landmarks: Arc<RecordedLandmarks>,
        sink: Arc<RecordingSink>,
        clock: ManualClock,
    }

    fn config_with_contact() -> SessionConfig {
        SessionConfig {
            alerts: AlertConfig {
                emergency: EmergencyConfig {
                    enabled: true,
                    contact: Some(EmergencyContact {
                        name: "Sam".to_string(),
                        phone: "+15550100".to_string(),
                    }),
                    driver_name: "Alex".to_string(),
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn fixture_with(config: SessionConfig, sink: RecordingSink) -> Fixture {
        let landmarks = Arc::new(RecordedLandmarks::new());
        let engine = InferenceEngine::new(landmarks.clone(), Arc::new(MockClassifier::new()));
        let sink = Arc::new(sink);
        let clock = ManualClock::new(0);
        let (session, handle) =
            MonitoringSession::start(config, engine, sink.clone(), Arc::new(clock.clone()))
                .unwrap();
        Fixture {
            session,
            handle,
            landmarks,
            sink,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(SessionConfig::default(), RecordingSink::default())
    }

    impl Fixture {
        /// Feed a face with `ear` at `t` ms
        async fn face(&mut self, seq: u32, t: u64, ear: f64) -> Option<FrameOutcome> {
            self.clock.set(t);
            self.landmarks.insert(seq, frontal_face(ear)).unwrap();
            self.session.process_frame(VideoFrame::empty(t, seq)).await
        }
    }

    #[tokio::test]
    async fn test_start_fails_when_classifier_unavailable() {
        let engine = InferenceEngine::new(
            Arc::new(RecordedLandmarks::new()),
            Arc::new(MockClassifier::unavailable()),
        );
        let result = MonitoringSession::start(
            SessionConfig::default(),
            engine,
            Arc::new(RecordingSink::default()),
            Arc::new(ManualClock::new(0)),
        );

        let Err(err) = result else {
            panic!("session must not start without its classifier");
        };
        assert!(matches!(err, SessionError::InferenceUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_alert_driver_publishes_normal_snapshot() {
        let mut fx = fixture();
        let outcome = fx.face(0, 0, 0.32).await;

        let Some(FrameOutcome::Assessed(assessment)) = outcome else {
            panic!("expected assessment, got {:?}", outcome);
        };
        assert_eq!(assessment.level, DrowsinessLevel::Normal);

        let snapshot = fx.handle.latest().unwrap();
        assert_eq!(snapshot.assessment, Some(assessment));
        assert_eq!(snapshot.stats.frames_assessed, 1);
        assert!(fx.sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_face_is_not_an_error() {
        let mut fx = fixture();
        fx.clock.set(0);
        let outcome = fx.session.process_frame(VideoFrame::empty(0, 7)).await;

        assert_eq!(outcome, Some(FrameOutcome::NoFace));
        let context = fx.session.context();
        assert!(context.pipeline.aggregator().is_empty());
        assert_eq!(context.stats.frames_without_face, 1);
        assert!(context.last_frame_error.is_none());
    }

    #[tokio::test]
    async fn test_bad_landmarks_skip_frame() {
        let mut fx = fixture();
        fx.landmarks.insert(1, vec![Landmark::default(); 10]).unwrap();
        let outcome = fx.session.process_frame(VideoFrame::empty(0, 1)).await;

        assert!(matches!(outcome, Some(FrameOutcome::Failed(_))));
        let snapshot = fx.handle.latest().unwrap();
        assert!(snapshot.last_frame_error.is_some());
        assert_eq!(snapshot.alert, Default::default());
    }

    #[tokio::test]
    async fn test_frames_too_close_are_not_admitted() {
        let mut fx = fixture();
        assert!(fx.face(0, 0, 0.30).await.is_some());
        assert!(fx.face(1, 10, 0.30).await.is_none());
        assert!(fx.face(2, 70, 0.30).await.is_some());
        assert_eq!(fx.session.context().stats.frames_dropped(), 1);
    }

    #[tokio::test]
    async fn test_sustained_closure_escalates_to_emergency() {
        let mut fx = fixture_with(config_with_contact(), RecordingSink::default());

        for i in 0..300u32 {
            fx.face(i, i as u64 * 100, 0.10).await;
        }

        let calls = fx.sink.calls();
        let plays: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                SinkCall::Play(level) => Some(*level),
                _ => None,
            })
            .collect();
        assert_eq!(plays, vec![DrowsinessLevel::Warning, DrowsinessLevel::Critical]);

        let emergencies: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                SinkCall::Emergency(message) => Some(message.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(emergencies.len(), 1);
        assert!(emergencies[0].contains("Alex"));

        let snapshot = fx.handle.latest().unwrap();
        assert!(snapshot.alert.emergency_triggered);
        let critical_since = snapshot.alert.critical_since_ms.unwrap();
        assert!(critical_since >= 10_000);
    }

    #[tokio::test]
    async fn test_emergency_escalates_after_face_is_lost() {
        let mut fx = fixture_with(config_with_contact(), RecordingSink::default());
        for i in 0..=110u32 {
            fx.face(i, i as u64 * 100, 0.10).await;
        }
        assert_eq!(fx.session.context().pipeline.level(), DrowsinessLevel::Critical);
        assert!(!fx.session.context().alerts.state().emergency_triggered);

        for i in 111..=400u32 {
            let t = i as u64 * 100;
            fx.clock.set(t);
            let outcome = fx.session.process_frame(VideoFrame::empty(t, i)).await;
            assert_eq!(outcome, Some(FrameOutcome::NoFace));
        }

        let emergencies = fx
            .sink
            .calls()
            .into_iter()
            .filter(|c| matches!(c, SinkCall::Emergency(_)))
            .count();
        assert_eq!(emergencies, 1);
        assert!(fx.handle.latest().unwrap().alert.emergency_triggered);
    }

    #[tokio::test]
    async fn test_warning_auto_dismissed_without_face() {
        let mut fx = fixture();
        fx.face(0, 0, 0.10).await;
        assert_eq!(fx.sink.calls(), vec![SinkCall::Play(DrowsinessLevel::Warning)]);

        for i in 1..=300u32 {
            let t = i as u64 * 100;
            fx.clock.set(t);
            fx.session.process_frame(VideoFrame::empty(t, i)).await;
        }

        assert_eq!(
            fx.sink.calls(),
            vec![SinkCall::Play(DrowsinessLevel::Warning), SinkCall::Stop]
        );
        assert!(fx.handle.latest().unwrap().alert.active.is_none());
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_pipeline() {
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let mut fx = fixture_with(SessionConfig::default(), sink);

        for i in 0..5u32 {
            let outcome = fx.face(i, i as u64 * 100, 0.10).await;
            assert!(matches!(outcome, Some(FrameOutcome::Assessed(_))));
        }
        assert_eq!(fx.sink.calls(), vec![SinkCall::Play(DrowsinessLevel::Warning)]);
    }

    #[tokio::test]
    async fn test_acknowledge_stops_alert() {
        let mut fx = fixture();
        fx.face(0, 0, 0.10).await;
        assert!(fx.handle.latest().unwrap().alert.active.is_some());

        fx.clock.set(500);
        fx.session.acknowledge();

        let snapshot = fx.handle.latest().unwrap();
        assert!(snapshot.alert.active.is_none());
        assert_eq!(snapshot.alert.last_alert_level, DrowsinessLevel::Normal);
        assert_eq!(fx.sink.calls().last(), Some(&SinkCall::Stop));
    }

    #[tokio::test]
    async fn test_reset_clears_session_together() {
        let mut fx = fixture_with(config_with_contact(), RecordingSink::default());
        for i in 0..150u32 {
            fx.face(i, i as u64 * 100, 0.10).await;
        }
        assert!(fx.session.context().alerts.state().critical_since_ms.is_some());

        fx.session.reset();

        let context = fx.session.context();
        assert_eq!(context.generation, 1);
        assert!(context.pipeline.aggregator().is_empty());
        assert!(context.pipeline.current().is_none());
        assert_eq!(context.alerts.state(), &Default::default());
        assert_eq!(fx.sink.calls().last(), Some(&SinkCall::Stop));

        let snapshot = fx.handle.latest().unwrap();
        assert_eq!(snapshot.generation, 1);
        assert!(snapshot.assessment.is_none());
    }

    #[tokio::test]
    async fn test_identical_frames_give_identical_snapshots() {
        let mut a = fixture();
        let mut b = fixture();
        let ears = [0.30, 0.28, 0.12, 0.10, 0.10, 0.25, 0.31, 0.09];

        for (i, ear) in ears.iter().enumerate() {
            let t = i as u64 * 100;
            let out_a = a.face(i as u32, t, *ear).await;
            let out_b = b.face(i as u32, t, *ear).await;
            assert_eq!(out_a, out_b);
        }
    }

    #[tokio::test]
    async fn test_reset_discards_in_flight_frame() {
        let entered = Arc::new(AtomicBool::new(false));
        let detector = SlowDetector {
            entered: entered.clone(),
        };
        let engine = InferenceEngine::new(Arc::new(detector), Arc::new(MockClassifier::new()));
        let clock = ManualClock::new(0);
        let (session, handle) = MonitoringSession::start(
            SessionConfig::default(),
            engine,
            Arc::new(RecordingSink::default()),
            Arc::new(clock),
        )
        .unwrap();

        let (capture, frames) = CaptureHandle::channel();
        let task = tokio::spawn(session.run(frames));

        assert!(capture.offer(VideoFrame::empty(0, 0)).unwrap());
        while !entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut updates = handle.subscribe();
        handle.reset().await.unwrap();
        updates.changed().await.unwrap();
        assert_eq!(handle.latest().unwrap().generation, 1);

        // Let the blocking call finish; its result must not be merged
        tokio::time::sleep(Duration::from_millis(400)).await;
        handle.stop().await.unwrap();
        let summary = task.await.unwrap();

        assert_eq!(summary.generation, 1);
        assert_eq!(summary.stats.frames_assessed, 0);
        assert!(handle.latest().unwrap().assessment.is_none());
    }

    #[tokio::test]
    async fn test_run_processes_frames_until_source_closes() {
        let landmarks = Arc::new(RecordedLandmarks::new());
        let engine = InferenceEngine::new(landmarks.clone(), Arc::new(MockClassifier::new()));
        let clock = ManualClock::new(0);
        let (session, handle) = MonitoringSession::start(
            SessionConfig::default(),
            engine,
            Arc::new(RecordingSink::default()),
            Arc::new(clock.clone()),
        )
        .unwrap();

        let (capture, frames) = CaptureHandle::channel();
        let task = tokio::spawn(session.run(frames));
        let mut updates = handle.subscribe();

        for i in 0..3u32 {
            clock.set(i as u64 * 100);
            landmarks.insert(i, frontal_face(0.30)).unwrap();
            assert!(capture.offer(VideoFrame::empty(i as u64 * 100, i)).unwrap());
            updates.changed().await.unwrap();
        }
        drop(capture);

        let summary = task.await.unwrap();
        assert_eq!(summary.stats.frames_assessed, 3);
        assert_eq!(handle.latest().unwrap().stats.frames_received, 3);
    }
}
