//! Integration tests for the voice coordinator
//!
//! Audio is synthetic: 100ms chunks of a loud sine for speech, zeros for silence.

use sirius_voice::{
    AudioChunk, CaptureState, CoordinatorEvent, PlaceholderStt, RecordingOutcome,
    RecordingTrigger, ScriptedReply, StopReason, SubmitDecision, Transcript, VoiceConfig,
    VoiceCoordinator, VoiceError, VoiceHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

const RATE: u32 = 16000;
const CHUNK: usize = 1600;

fn speech() -> AudioChunk {
    AudioChunk::new(
        (0..CHUNK).map(|i| 0.3 * (i as f32 * 0.1).sin()).collect(),
        RATE,
    )
}

fn silence() -> AudioChunk {
    AudioChunk::new(vec![0.0; CHUNK], RATE)
}

fn feed(tx: &mpsc::UnboundedSender<AudioChunk>, chunk: fn() -> AudioChunk, count: usize) {
    for _ in 0..count {
        tx.send(chunk()).unwrap();
    }
}

struct Rig {
    handle: VoiceHandle,
    task: JoinHandle<()>,
    audio: mpsc::UnboundedSender<AudioChunk>,
    events: broadcast::Receiver<CoordinatorEvent>,
    stt: Arc<PlaceholderStt>,
}

fn rig(config: VoiceConfig, stt: PlaceholderStt) -> Rig {
    let stt = Arc::new(stt);
    let (audio, audio_rx) = mpsc::unbounded_channel();
    let (handle, task) = VoiceCoordinator::spawn(config, stt.clone(), audio_rx);
    let events = handle.subscribe_events();
    Rig {
        handle,
        task,
        audio,
        events,
        stt,
    }
}

async fn next_event(
    events: &mut broadcast::Receiver<CoordinatorEvent>,
    wanted: impl Fn(&CoordinatorEvent) -> bool,
) -> CoordinatorEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if wanted(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn wait_state(handle: &VoiceHandle, state: CaptureState) {
    let mut rx = handle.watch_state();
    timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .expect("timed out waiting for state")
        .expect("coordinator gone");
}

async fn shutdown(rig: Rig) {
    rig.handle.shutdown().unwrap();
    timeout(Duration::from_secs(5), rig.task)
        .await
        .expect("coordinator did not stop")
        .unwrap();
}

#[tokio::test]
async fn wake_phrase_leads_to_auto_submitted_utterance() {
    let mut r = rig(
        VoiceConfig::default(),
        PlaceholderStt::scripted([
            ScriptedReply::text("えっと、シリウスくん！", 0.9),
            ScriptedReply::text("今日の天気は？", 0.85),
        ]),
    );
    let mut quality = r.handle.subscribe_quality();

    assert_ok!(r.handle.start_listening().await);
    wait_state(&r.handle, CaptureState::Monitoring).await;

    // 1.5s of audio fills half the wake buffer and reaches the probe cadence.
    feed(&r.audio, speech, 15);
    let event = next_event(&mut r.events, |e| matches!(e, CoordinatorEvent::WakeDetected { .. })).await;
    if let CoordinatorEvent::WakeDetected { detection } = event {
        assert_eq!(detection.phrase, "シリウスくん");
        assert_eq!(detection.acknowledgment, "はい、なんですか");
    }
    let event = next_event(&mut r.events, |e| matches!(e, CoordinatorEvent::RecordingStarted { .. })).await;
    assert!(matches!(
        event,
        CoordinatorEvent::RecordingStarted { trigger: RecordingTrigger::WakeWord, .. }
    ));
    wait_state(&r.handle, CaptureState::Recording).await;

    feed(&r.audio, speech, 15);
    feed(&r.audio, silence, 25);
    let event = next_event(&mut r.events, |e| matches!(e, CoordinatorEvent::UtteranceCaptured { .. })).await;
    if let CoordinatorEvent::UtteranceCaptured { utterance } = event {
        assert_eq!(utterance.reason, StopReason::Silence);
        assert_eq!(utterance.duration, Duration::from_millis(3600));
    }

    let event = next_event(&mut r.events, |e| matches!(e, CoordinatorEvent::Transcribed { .. })).await;
    let CoordinatorEvent::Transcribed { reading, .. } = event else {
        unreachable!()
    };
    assert_eq!(reading.result.text, "今日の天気は？");
    assert_eq!(reading.decision, SubmitDecision::AutoSubmit);

    let published = timeout(Duration::from_secs(5), quality.recv()).await.unwrap().unwrap();
    assert_eq!(published, reading);

    wait_state(&r.handle, CaptureState::Monitoring).await;
    assert_eq!(r.stt.calls(), 2);
    shutdown(r).await;
}

#[tokio::test]
async fn second_start_is_busy_and_first_session_survives() {
    let mut r = rig(
        VoiceConfig::default(),
        PlaceholderStt::with_response("はい", 0.9),
    );
    let first = assert_ok!(r.handle.start_recording().await);
    feed(&r.audio, speech, 15);

    let err = assert_err!(r.handle.start_recording().await);
    assert!(matches!(err, VoiceError::Busy { active } if active == first.0));
    assert_eq!(r.handle.state(), CaptureState::Recording);

    let outcome = assert_ok!(r.handle.stop_recording().await);
    match outcome {
        RecordingOutcome::Captured(info) => {
            assert_eq!(info.session_id, first);
            assert_eq!(info.duration, Duration::from_millis(1500));
            assert_eq!(info.reason, StopReason::Manual);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    next_event(&mut r.events, |e| matches!(e, CoordinatorEvent::Transcribed { .. })).await;
    wait_state(&r.handle, CaptureState::Idle).await;
    shutdown(r).await;
}

#[tokio::test]
async fn low_confidence_awaits_confirmation() {
    let mut r = rig(
        VoiceConfig::default(),
        PlaceholderStt::scripted([ScriptedReply::text("たぶんこう言った", 0.5)]),
    );
    assert_ok!(r.handle.start_recording().await);
    feed(&r.audio, speech, 15);
    assert!(matches!(
        r.handle.stop_recording().await,
        Ok(RecordingOutcome::Captured(_))
    ));
    let event = next_event(&mut r.events, |e| matches!(e, CoordinatorEvent::Transcribed { .. })).await;
    let CoordinatorEvent::Transcribed { reading, .. } = event else {
        unreachable!()
    };
    assert_eq!(reading.decision, SubmitDecision::AwaitConfirmation);
    shutdown(r).await;
}

#[tokio::test]
async fn short_manual_recording_is_discarded_not_failed() {
    let mut r = rig(VoiceConfig::default(), PlaceholderStt::new());
    let id = assert_ok!(r.handle.start_recording().await);
    feed(&r.audio, speech, 5);
    let outcome = assert_ok!(r.handle.stop_recording().await);
    assert_eq!(
        outcome,
        RecordingOutcome::Discarded {
            session_id: id,
            duration: Duration::from_millis(500),
        }
    );
    next_event(&mut r.events, |e| matches!(e, CoordinatorEvent::RecordingDiscarded { .. })).await;
    assert_eq!(r.stt.calls(), 0);
    assert!(matches!(
        r.handle.stop_recording().await,
        Err(VoiceError::NotRecording)
    ));
    shutdown(r).await;
}

#[tokio::test]
async fn superseded_transcription_is_discarded() {
    let mut r = rig(
        VoiceConfig::default(),
        PlaceholderStt::scripted([ScriptedReply::Slow(
            Duration::from_millis(300),
            Transcript::new("古い結果", 0.9),
        )]),
    );
    let first = assert_ok!(r.handle.start_recording().await);
    feed(&r.audio, speech, 15);
    assert_ok!(r.handle.stop_recording().await);
    let second = assert_ok!(r.handle.start_recording().await);
    assert!(second > first);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(r.stt.calls(), 1);
    while let Ok(event) = r.events.try_recv() {
        assert!(
            !matches!(event, CoordinatorEvent::Transcribed { .. }),
            "stale transcription was delivered"
        );
    }
    assert_eq!(r.handle.state(), CaptureState::Recording);
    assert_eq!(assert_ok!(r.handle.cancel_recording().await), Some(second));
    shutdown(r).await;
}

#[tokio::test]
async fn stalled_transcription_times_out() {
    let config = VoiceConfig {
        stt_timeout_ms: 100,
        ..Default::default()
    };
    let mut r = rig(
        config,
        PlaceholderStt::scripted([ScriptedReply::Slow(
            Duration::from_millis(800),
            Transcript::new("遅すぎ", 0.9),
        )]),
    );
    assert_ok!(r.handle.start_recording().await);
    feed(&r.audio, speech, 15);
    assert_ok!(r.handle.stop_recording().await);
    let event = next_event(&mut r.events, |e| {
        matches!(e, CoordinatorEvent::TranscriptionFailed { .. })
    })
    .await;
    if let CoordinatorEvent::TranscriptionFailed { error, .. } = event {
        assert!(error.contains("timed out"), "{error}");
    }
    wait_state(&r.handle, CaptureState::Idle).await;
    shutdown(r).await;
}

#[tokio::test]
async fn wake_buffering_is_muted_during_playback() {
    let r = rig(VoiceConfig::default(), PlaceholderStt::new());
    assert_ok!(r.handle.start_listening().await);
    assert_ok!(r.handle.playback_started());
    // Round trip so the playback command is applied before audio arrives.
    assert_ok!(r.handle.start_listening().await);

    feed(&r.audio, speech, 20);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(r.stt.calls(), 0);

    assert_ok!(r.handle.playback_finished());
    assert_ok!(r.handle.start_listening().await);
    feed(&r.audio, speech, 15);
    timeout(Duration::from_secs(5), async {
        while r.stt.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no probe after playback finished");
    shutdown(r).await;
}

#[tokio::test]
async fn start_listening_fails_once_audio_source_is_gone() {
    let r = rig(VoiceConfig::default(), PlaceholderStt::new());
    let Rig {
        handle, task, audio, ..
    } = r;
    drop(audio);
    let err = assert_err!(handle.start_listening().await);
    assert!(matches!(err, VoiceError::AudioDevice(_)));
    assert_eq!(handle.state(), CaptureState::Idle);
    handle.shutdown().unwrap();
    task.await.unwrap();
}
