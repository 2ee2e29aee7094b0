//! Sampling loop behaviour against scripted instruments and in-memory sinks

use instrument_adapters::test_utils::{reading, ScriptStep, ScriptedInstrument};
use record_sink::test_utils::{CollectorSink, FailingSink};
use record_sink::{RecordSink, SinkState};
use stage_logger::{
    LogSession, LoopState, Outcome, SamplerSettings, SamplingLoop, SessionLimits, StopHandle,
};
use std::time::Duration;

fn session_with(interval_ms: u64, limits: SessionLimits) -> LogSession {
    LogSession::new(
        "memory.csv",
        Duration::from_millis(interval_ms),
        StopHandle::new(),
    )
    .unwrap()
    .with_limits(limits)
}

fn max_samples(n: u64) -> SessionLimits {
    SessionLimits {
        max_samples: Some(n),
        max_duration: None,
    }
}

fn xs(sink: &CollectorSink) -> Vec<f64> {
    sink.samples().iter().map(|s| s.x).collect()
}

#[tokio::test(start_paused = true)]
async fn failed_read_is_skipped_and_logging_resumes() {
    let mut script: Vec<ScriptStep> = (1..=5).map(|i| ScriptStep::Reading(reading(i as f64))).collect();
    script.push(ScriptStep::Fail("stage controller busy".into()));
    let mut instrument = ScriptedInstrument::new(script);
    let mut sink = CollectorSink::new();
    let mut session = session_with(100, max_samples(8));

    let mut sampler = SamplingLoop::new(SamplerSettings::default());
    let report = sampler.run(&mut session, &mut instrument, &mut sink).await;

    assert_eq!(report.outcome, Outcome::Completed);
    // Read 6 failed; reads 7.. come from the fallback and carry their read number
    assert_eq!(xs(&sink), vec![1.0, 2.0, 3.0, 4.0, 5.0, 7.0, 8.0, 9.0]);
    assert_eq!(report.stats.read_failures, 1);
    assert_eq!(report.samples_written(), 8);
    assert_eq!(session.sample_count(), 8);
    assert!(session.started_at().is_some());
    assert_eq!(instrument.disconnect_calls(), 1);
    assert_eq!(sampler.state(), LoopState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn incomplete_readings_are_never_persisted() {
    let mut instrument = ScriptedInstrument::new([
        ScriptStep::Reading(vec![1.0, 2.0, 3.0]),
        ScriptStep::Reading(vec![1.0, f64::NAN, 0.0, 0.0, 0.0]),
        ScriptStep::Reading(vec![0.0; 6]),
        ScriptStep::Reading(reading(42.0)),
    ]);
    let mut sink = CollectorSink::new();
    let mut session = session_with(100, max_samples(1));

    let report = SamplingLoop::new(SamplerSettings::default())
        .run(&mut session, &mut instrument, &mut sink)
        .await;

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(xs(&sink), vec![42.0]);
    assert_eq!(report.stats.incomplete_readings, 3);
    assert_eq!(instrument.read_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn three_consecutive_write_failures_abort_with_teardown() {
    let mut instrument = ScriptedInstrument::new([]);
    let mut sink = CollectorSink::new();
    sink.fail_next_appends(3);
    let mut session = session_with(100, SessionLimits::default());

    let report = SamplingLoop::new(SamplerSettings::default())
        .run(&mut session, &mut instrument, &mut sink)
        .await;

    assert!(matches!(
        report.outcome,
        Outcome::WriteFailuresExceeded { consecutive: 3, .. }
    ));
    assert_ne!(report.outcome.exit_code(), 0);
    assert_eq!(instrument.read_calls(), 3);
    assert_eq!(instrument.disconnect_calls(), 1);
    assert!(sink.is_closed());
    assert_eq!(sink.close_calls(), 1);
    assert!(report.teardown.sink_closed);
    assert!(sink.samples().is_empty());
    assert_eq!(report.sink.sink_type, "collector");
    assert_eq!(report.sink.records_failed, 3);
    assert_eq!(report.sink.state, SinkState::Closed);
}

#[tokio::test(start_paused = true)]
async fn closed_sink_aborts_without_retrying() {
    let mut instrument = ScriptedInstrument::new([]);
    let mut sink = CollectorSink::new();
    sink.close().unwrap();
    let mut session = session_with(100, SessionLimits::default());

    let report = SamplingLoop::new(SamplerSettings::default())
        .run(&mut session, &mut instrument, &mut sink)
        .await;

    match &report.outcome {
        Outcome::WriteFailuresExceeded {
            consecutive,
            last_error,
        } => {
            assert_eq!(*consecutive, 1);
            assert_eq!(last_error, "Sink closed");
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(instrument.read_calls(), 1);
    assert_eq!(report.stats.write_failures, 1);
    assert_eq!(instrument.disconnect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn successful_write_resets_failure_streak() {
    let mut instrument = ScriptedInstrument::new([]);
    let mut sink = CollectorSink::new();
    sink.fail_next_appends(2);
    let mut session = session_with(100, max_samples(3));

    let report = SamplingLoop::new(SamplerSettings::default())
        .run(&mut session, &mut instrument, &mut sink)
        .await;

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.stats.write_failures, 2);
    assert_eq!(xs(&sink), vec![3.0, 4.0, 5.0]);
}

#[tokio::test(start_paused = true)]
async fn always_failing_sink_is_attempted_exactly_threshold_times() {
    let mut instrument = ScriptedInstrument::new([]);
    let mut sink = FailingSink::new("disk full");
    let mut session = session_with(100, SessionLimits::default());

    let report = SamplingLoop::new(SamplerSettings::default())
        .run(&mut session, &mut instrument, &mut sink)
        .await;

    match &report.outcome {
        Outcome::WriteFailuresExceeded {
            consecutive,
            last_error,
        } => {
            assert_eq!(*consecutive, 3);
            assert!(last_error.contains("disk full"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(sink.attempts(), 3);
    assert_eq!(sink.close_calls(), 1);
    assert_eq!(instrument.disconnect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn connection_failure_never_samples_but_still_tears_down() {
    let mut instrument = ScriptedInstrument::unreachable("no route to microscope");
    let mut sink = CollectorSink::new();
    let mut session = session_with(100, SessionLimits::default());

    let mut sampler = SamplingLoop::new(SamplerSettings::default());
    let report = sampler.run(&mut session, &mut instrument, &mut sink).await;

    match &report.outcome {
        Outcome::ConnectionFailed(reason) => assert!(reason.contains("no route")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(report.outcome.exit_code(), 1);
    assert_eq!(instrument.read_calls(), 0);
    assert_eq!(instrument.disconnect_calls(), 1);
    assert_eq!(sink.close_calls(), 1);
    assert!(session.started_at().is_none());
    assert_eq!(sampler.state(), LoopState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn stop_request_is_observed_at_next_iteration() {
    let stop = StopHandle::new();
    let mut session = LogSession::new("memory.csv", Duration::from_millis(100), stop.clone()).unwrap();
    let hook_stop = stop.clone();
    let mut instrument = ScriptedInstrument::new([]).with_read_hook(move |n| {
        if n == 4 {
            hook_stop.request_stop();
        }
    });
    let mut sink = CollectorSink::new();

    let report = SamplingLoop::new(SamplerSettings::default())
        .run(&mut session, &mut instrument, &mut sink)
        .await;

    assert_eq!(report.outcome, Outcome::StoppedByRequest);
    assert_eq!(report.outcome.exit_code(), 0);
    // The read in flight when the stop arrived still completes and is kept
    assert_eq!(xs(&sink), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(instrument.read_calls(), 4);
    assert!(sink.is_closed());
    assert_eq!(instrument.disconnect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_from_another_task_ends_session() {
    let stop = StopHandle::new();
    let mut session = LogSession::new("memory.csv", Duration::from_millis(100), stop.clone()).unwrap();
    let mut instrument = ScriptedInstrument::new([]);
    let mut sink = CollectorSink::new();

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1050)).await;
        stop.request_stop()
    });

    let report = SamplingLoop::new(SamplerSettings::default())
        .run(&mut session, &mut instrument, &mut sink)
        .await;

    assert!(stopper.await.unwrap());
    assert_eq!(report.outcome, Outcome::StoppedByRequest);
    assert_eq!(report.samples_written(), 11);
}

#[tokio::test(start_paused = true)]
async fn pacing_self_corrects_for_slow_reads() {
    let mut instrument = ScriptedInstrument::new([
        ScriptStep::Slow(Duration::from_millis(30), reading(1.0)),
        ScriptStep::Slow(Duration::from_millis(60), reading(2.0)),
        ScriptStep::Slow(Duration::from_millis(10), reading(3.0)),
        ScriptStep::Slow(Duration::from_millis(150), reading(4.0)),
        ScriptStep::Reading(reading(5.0)),
        ScriptStep::Reading(reading(6.0)),
    ]);
    let mut sink = CollectorSink::new();
    let mut session = session_with(100, max_samples(6));

    SamplingLoop::new(SamplerSettings::default())
        .run(&mut session, &mut instrument, &mut sink)
        .await;

    let gaps: Vec<Duration> = instrument
        .read_instants()
        .windows(2)
        .map(|w| w[1] - w[0])
        .collect();
    let expected = [100, 100, 100, 150, 100];
    assert_eq!(gaps.len(), expected.len());
    for (gap, want) in gaps.iter().zip(expected) {
        let want = Duration::from_millis(want);
        assert!(
            *gap >= want && *gap <= want + Duration::from_millis(2),
            "gap {:?}, expected {:?}",
            gap,
            want
        );
    }
}

#[tokio::test(start_paused = true)]
async fn hung_read_times_out_as_transient_failure() {
    let mut instrument = ScriptedInstrument::new([ScriptStep::Hang, ScriptStep::Reading(reading(9.0))]);
    let mut sink = CollectorSink::new();
    let mut session = session_with(100, max_samples(1));
    let settings = SamplerSettings {
        read_timeout: Duration::from_millis(250),
        ..SamplerSettings::default()
    };

    let report = SamplingLoop::new(settings)
        .run(&mut session, &mut instrument, &mut sink)
        .await;

    assert_eq!(report.outcome, Outcome::Completed);
    assert_eq!(report.stats.read_failures, 1);
    assert_eq!(xs(&sink), vec![9.0]);
}

#[tokio::test(start_paused = true)]
async fn panic_in_instrument_is_contained() {
    let mut instrument = ScriptedInstrument::new([
        ScriptStep::Reading(reading(1.0)),
        ScriptStep::Panic("driver assertion failed".into()),
    ]);
    let mut sink = CollectorSink::new();
    let mut session = session_with(100, SessionLimits::default());

    let mut sampler = SamplingLoop::new(SamplerSettings::default());
    let report = sampler.run(&mut session, &mut instrument, &mut sink).await;

    match &report.outcome {
        Outcome::Faulted(reason) => assert!(reason.contains("driver assertion failed")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(report.outcome.exit_code(), 1);
    assert_eq!(xs(&sink), vec![1.0]);
    assert_eq!(sink.close_calls(), 1);
    assert_eq!(instrument.disconnect_calls(), 1);
    assert_eq!(sampler.state(), LoopState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn duration_limit_completes_session() {
    let mut instrument = ScriptedInstrument::new([]);
    let mut sink = CollectorSink::new();
    let mut session = session_with(
        100,
        SessionLimits {
            max_samples: None,
            max_duration: Some(Duration::from_millis(450)),
        },
    );

    let report = SamplingLoop::new(SamplerSettings::default())
        .run(&mut session, &mut instrument, &mut sink)
        .await;

    assert_eq!(report.outcome, Outcome::Completed);
    // Reads at 0, 100, 200, 300, 400 ms
    assert_eq!(report.samples_written(), 5);
}

#[tokio::test(start_paused = true)]
async fn samples_are_ordered_and_throughput_is_published() {
    let mut instrument = ScriptedInstrument::new([]);
    let mut sink = CollectorSink::new();
    let mut session = session_with(100, max_samples(20));
    let settings = SamplerSettings {
        report_every: 5,
        ..SamplerSettings::default()
    };

    let mut sampler = SamplingLoop::new(settings);
    let live = sampler.stats();
    let report = sampler.run(&mut session, &mut instrument, &mut sink).await;

    assert!(sink
        .samples()
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(xs(&sink), (1..=20).map(|i| i as f64).collect::<Vec<_>>());
    assert!(report.stats.rate_per_sec > 9.0 && report.stats.rate_per_sec < 12.0);
    assert_eq!(live.snapshot(), report.stats);
}
