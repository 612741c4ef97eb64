use etude_domain_arrangement::{Arrangement, NoteEvent};
use etude_domain_eval::{
    NoteMismatch, PerformanceAnalyzer, PlayerNoteOn, PracticeScorer, ScoreEvent, ScorerConfig,
};
use pretty_assertions::assert_eq;

fn arrangement(notes: &[(u8, f64)]) -> Arrangement {
    Arrangement::new(
        notes
            .iter()
            .map(|&(pitch, start)| NoteEvent {
                pitch,
                velocity: 90,
                start,
                duration: 0.4,
            })
            .collect(),
    )
}

fn play(time_s: f64, pitch: u8) -> PlayerNoteOn {
    PlayerNoteOn {
        time_s,
        pitch,
        velocity: 90,
    }
}

#[test]
fn hit_inside_window_reports_signed_delta() {
    let mut scorer = PracticeScorer::new(ScorerConfig::default(), &arrangement(&[(60, 1.0)]));

    let events = scorer.on_note_on(play(0.9, 60));

    assert_eq!(
        events,
        vec![
            ScoreEvent::Hit {
                index: 0,
                pitch: 60,
                delta_ms: 0.9 * 1000.0 - 1000.0,
            },
            ScoreEvent::Stats {
                hit: 1,
                miss: 0,
                wrong: 0,
            },
        ]
    );
    assert!(scorer.is_complete());
}

#[test]
fn repeated_pitch_matches_nearest_pending_note() {
    let mut scorer = PracticeScorer::new(
        ScorerConfig::default(),
        &arrangement(&[(60, 0.0), (60, 0.5)]),
    );

    let events = scorer.on_note_on(play(0.48, 60));

    assert!(events
        .iter()
        .any(|e| matches!(e, ScoreEvent::Hit { index: 1, .. })));
}

#[test]
fn wrong_pitch_and_late_note_become_errors() {
    let mut scorer = PracticeScorer::new(
        ScorerConfig::default(),
        &arrangement(&[(60, 0.0), (62, 0.5), (64, 1.0)]),
    );

    scorer.on_note_on(play(0.0, 60));
    let events = scorer.on_note_on(play(0.5, 61));
    assert!(events
        .iter()
        .any(|e| matches!(e, ScoreEvent::WrongNote { pitch: 61, .. })));

    let events = scorer.advance_to(0.7);
    assert!(events
        .iter()
        .any(|e| matches!(e, ScoreEvent::Missed { index: 1, pitch: 62 })));

    let session = scorer.finish(1.5);

    assert_eq!(session.notes.len(), 2);
    assert_eq!(session.timing, vec![0.0, 500.0]);
    assert_eq!(session.duration, 1500.0);
    assert_eq!(
        session.errors,
        vec![
            NoteMismatch::WrongNote {
                pitch: 61,
                at_ms: 500.0
            },
            NoteMismatch::Missed {
                pitch: 62,
                expected_ms: 500.0
            },
            NoteMismatch::Missed {
                pitch: 64,
                expected_ms: 1000.0
            },
        ]
    );

    let result = PerformanceAnalyzer::new().analyze(&session);
    assert_eq!(result.metrics.accuracy, 0.0);
}

#[test]
fn looping_scores_each_pass_against_fresh_targets() {
    let mut scorer = PracticeScorer::new(
        ScorerConfig::default(),
        &arrangement(&[(60, 0.0), (62, 0.2)]),
    )
    .with_loop_span(0.4);
    scorer.set_final_pass(None);

    scorer.on_note_on(play(0.0, 60));
    scorer.on_note_on(play(0.2, 62));
    let events = scorer.on_note_on(play(0.41, 60));
    assert!(events
        .iter()
        .any(|e| matches!(e, ScoreEvent::Hit { index: 0, pitch: 60, .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ScoreEvent::WrongNote { .. })));

    scorer.set_final_pass(Some(1));
    let events = scorer.advance_to(2.0);
    assert!(events
        .iter()
        .any(|e| matches!(e, ScoreEvent::Missed { index: 1, pitch: 62 })));
    assert!(scorer.is_complete());

    let session = scorer.finish(0.8);
    assert_eq!(session.notes.len(), 3);
    assert_eq!(
        session.errors,
        vec![NoteMismatch::Missed {
            pitch: 62,
            expected_ms: 600.0
        }]
    );
}

#[test]
fn finishing_a_loop_ignores_passes_not_yet_due() {
    let mut scorer = PracticeScorer::new(
        ScorerConfig::default(),
        &arrangement(&[(60, 0.0), (62, 0.2)]),
    )
    .with_loop_span(0.4);
    scorer.set_final_pass(None);
    scorer.on_note_on(play(0.0, 60));

    let session = scorer.finish(0.3);

    assert_eq!(
        session.errors,
        vec![NoteMismatch::Missed {
            pitch: 62,
            expected_ms: 200.0
        }]
    );
}
