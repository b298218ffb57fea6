//! Integration tests for the playback controller driving the mock engine.
//!
//! Each test binds a small score document, runs the controller's event
//! pass, and inspects the engine-side state.

use std::sync::Arc;

use parking_lot::RwLock;

use segno_core::{
    Instrument, InstrumentTrackId, LoopBoundaryType, Note, Part, RepeatSpan, Score, ScoreElement,
    ScoreHandle, Segment, Tick,
};
use segno_playback::{
    ActionIntent, AudioEngine, AudioSettings, MockAudioEngine, PlaybackConfig,
    PlaybackController, PlaybackStatus,
};

// ═══════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════

fn quarter_chord(tick: Tick, track_index: usize, pitch: u8) -> Segment {
    Segment {
        tick,
        duration_ticks: 480,
        track_index,
        element: ScoreElement::Chord {
            notes: vec![Note::new(pitch)],
        },
    }
}

/// Piano + violin score with one note on each track
fn two_part_score() -> ScoreHandle {
    let mut score = Score::new();
    score.add_part(Part::new(
        "Piano",
        vec![Instrument::new("piano", "keyboards")],
    ));
    score.add_part(Part::new(
        "Violin",
        vec![Instrument::new("violin", "strings")],
    ));
    score.add_segment(quarter_chord(0, 0, 60));
    score.add_segment(quarter_chord(480, 1, 76));
    Arc::new(RwLock::new(score))
}

fn controller_with_engine() -> (PlaybackController, Arc<MockAudioEngine>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = Arc::new(MockAudioEngine::new());
    let controller = PlaybackController::new(
        engine.clone(),
        AudioSettings::default(),
        PlaybackConfig::default(),
    );
    (controller, engine)
}

/// Bind a document and run the event pass so track registrations resolve
fn bind(controller: &mut PlaybackController, score: &ScoreHandle) {
    controller.set_current_document(Some(Arc::clone(score)));
    controller.process_events();
}

// ═══════════════════════════════════════════════════════════════════════════
// SEQUENCE SETUP
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_setup_registers_tracks_in_part_order_metronome_last() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);

    let seq = controller.current_sequence().expect("sequence bound");
    assert_eq!(
        engine.track_titles(seq),
        vec!["Piano", "Violin", "Metronome"],
        "tracks must register in document part order with the metronome last"
    );

    let piano = score.read().track_id_at(0).unwrap();
    assert!(controller.engine_track_of(&piano).is_some());
    assert!(
        controller
            .engine_track_of(&InstrumentTrackId::metronome())
            .is_some()
    );
}

#[test]
fn test_metronome_starts_muted_and_unmutes_on_toggle() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);

    let seq = controller.current_sequence().unwrap();
    let metronome = controller
        .engine_track_of(&InstrumentTrackId::metronome())
        .unwrap();
    assert!(
        engine.output_params(seq, metronome).unwrap().muted,
        "metronome is muted while the setting is off"
    );

    controller.handle_action(ActionIntent::ToggleMetronome);
    assert!(controller.action_checked(ActionIntent::ToggleMetronome));
    assert!(!engine.output_params(seq, metronome).unwrap().muted);
}

#[test]
fn test_rejected_track_is_not_registered() {
    let (mut controller, engine) = controller_with_engine();
    engine.reject_instrument("piano");
    let score = two_part_score();
    bind(&mut controller, &score);

    let piano = score.read().track_id_at(0).unwrap();
    let violin = score.read().track_id_at(1).unwrap();
    assert!(
        controller.engine_track_of(&piano).is_none(),
        "rejected registration must not enter the track map"
    );
    assert!(controller.engine_track_of(&violin).is_some());
}

#[test]
fn test_document_rebind_discards_stale_registrations() {
    let (mut controller, engine) = controller_with_engine();

    let first = two_part_score();
    controller.set_current_document(Some(Arc::clone(&first)));
    // No event pass: the first document's registrations stay unresolved

    let mut second = Score::new();
    second.add_part(Part::new("Cello", vec![Instrument::new("cello", "strings")]));
    second.add_segment(quarter_chord(0, 0, 48));
    let second = Arc::new(RwLock::new(second));
    bind(&mut controller, &second);

    let cello = second.read().track_id_at(0).unwrap();
    assert!(controller.engine_track_of(&cello).is_some());

    let first_piano = first.read().track_id_at(0).unwrap();
    assert!(
        controller.engine_track_of(&first_piano).is_none(),
        "resolutions for the previous document must be discarded"
    );
    assert_eq!(engine.sequence_count(), 1, "previous sequence removed");
    assert_eq!(controller.tracked_instruments().len(), 2);
}

// ═══════════════════════════════════════════════════════════════════════════
// TRANSPORT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_transport_state_machine() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();

    assert_eq!(controller.playback_status(), PlaybackStatus::Stopped);

    controller.toggle_play();
    assert!(controller.is_playing());
    assert_eq!(engine.status(seq), PlaybackStatus::Running);

    controller.toggle_play();
    assert_eq!(controller.playback_status(), PlaybackStatus::Paused);

    controller.toggle_play();
    assert!(controller.is_playing());

    controller.stop();
    assert_eq!(controller.playback_status(), PlaybackStatus::Stopped);
    assert_eq!(engine.status(seq), PlaybackStatus::Stopped);
}

#[test]
fn test_engine_pause_reflects_into_state() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();

    controller.play();
    assert!(controller.is_playing());

    // Engine-side pause (e.g. device loss) arrives as a status event
    engine.pause(seq);
    controller.process_events();
    assert!(
        !controller.is_playing(),
        "engine-reported pause must reflect into the controller state"
    );
}

#[test]
fn test_play_after_stop_reseeks_to_retained_position() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();

    controller.seek_tick(480);
    assert_eq!(engine.position(seq), 500);

    controller.play();
    controller.stop();
    assert_eq!(engine.position(seq), 0, "engine stop resets its position");

    controller.play();
    assert_eq!(
        engine.position(seq),
        500,
        "play after stop must re-seek to the retained position"
    );
}

#[test]
fn test_rewind_seeks_while_running_stops_otherwise() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();

    controller.seek_tick(480);
    controller.play();
    controller.rewind(None);
    assert!(controller.is_playing(), "rewind while running keeps playing");
    assert_eq!(engine.position(seq), 0);

    controller.seek_tick(480);
    controller.stop();
    controller.rewind(None);
    assert_eq!(controller.playback_status(), PlaybackStatus::Stopped);
    assert_eq!(controller.current_tick(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// POSITION MAPPING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_seek_round_trip_within_one_tick() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();

    for tick in [0, 137, 480, 960, 1500] {
        controller.seek_tick(tick);
        engine.emit_position(seq, engine.position(seq));
        controller.process_events();

        let round = controller.current_score_tick();
        assert!(
            (round - tick).abs() <= 1,
            "seek round trip drifted: {tick} -> {round}"
        );
    }
}

#[test]
fn test_position_feedback_converts_through_document() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    score.write().set_tempo(960, 60.0);
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();
    let positions = controller.position_changed();
    while positions.try_recv().is_ok() {}

    // 960 ticks at 120 BPM = 1000 ms, then 480 ticks at 60 BPM = 1000 ms
    engine.emit_position(seq, 2000);
    controller.process_events();

    assert_eq!(controller.current_tick(), 1440);
    assert_eq!(positions.try_recv().unwrap(), 1440);
}

#[test]
fn test_beat_queries_follow_the_tempo_map() {
    let (mut controller, _engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);

    controller.seek_tick(480);
    assert_eq!(controller.current_tempo(), 120.0);
    assert_eq!(controller.current_beat().beat_index, 1);
    assert_eq!(controller.beat_to_msecs(1, 0), 2000);
}

// ═══════════════════════════════════════════════════════════════════════════
// LOOP CONTROL
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_loop_round_trip() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();

    controller.seek_tick(480);
    controller.add_loop_boundary(LoopBoundaryType::LoopIn);
    controller.seek_tick(960);
    controller.add_loop_boundary(LoopBoundaryType::LoopOut);

    assert!(controller.is_playback_looped());
    assert!(controller.is_loop_visible());
    assert_eq!(engine.loop_range(seq), Some((500, 1000)));

    controller.hide_loop();
    assert!(!controller.is_loop_visible());
    assert_eq!(engine.loop_range(seq), None);
    assert_eq!(
        controller.loop_boundaries().range(),
        Some((480, 960)),
        "hiding the loop keeps the stored boundaries"
    );
}

#[test]
fn test_toggle_loop_uses_selection_then_whole_score() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();

    // No selection, no boundaries: the loop spans the whole score
    controller.toggle_loop_playback();
    assert!(controller.is_playback_looped());
    assert_eq!(engine.loop_range(seq), Some((0, 2000)));

    // Re-toggling an active loop hides it
    controller.toggle_loop_playback();
    assert!(!controller.is_playback_looped());

    // With a selection present the loop follows it
    controller.set_selection(Some((480, 960)));
    controller.toggle_loop_playback();
    assert_eq!(engine.loop_range(seq), Some((500, 1000)));
}

// ═══════════════════════════════════════════════════════════════════════════
// TRACK LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_removed_part_is_reconciled_away() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();

    let piano = score.read().track_id_at(0).unwrap();
    let piano_part = piano.part_id;
    assert_eq!(engine.track_count(seq), 3);

    score.write().remove_part(piano_part);
    controller.process_events();

    assert!(
        controller.engine_track_of(&piano).is_none(),
        "removed part's tracks must leave the track map"
    );
    assert_eq!(engine.track_count(seq), 2, "engine track removed as well");
}

#[test]
fn test_content_edit_pushes_fresh_data_to_engine() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();

    let piano = score.read().track_id_at(0).unwrap();
    let track = controller.engine_track_of(&piano).unwrap();
    let before = engine.track_data(seq, track).unwrap();

    score.write().add_segment(quarter_chord(960, 0, 64));
    controller.process_events();

    let after = engine.track_data(seq, track).unwrap();
    assert_ne!(before.events, after.events, "engine data must be replaced");
    assert!(after.event_list(1000).is_some(), "new note present at 1000 ms");
}

#[test]
fn test_set_track_activity_only_mutes() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();

    let piano = score.read().track_id_at(0).unwrap();
    let track = controller.engine_track_of(&piano).unwrap();

    controller.set_track_activity(&piano, false);
    assert!(engine.output_params(seq, track).unwrap().muted);
    assert_eq!(engine.track_count(seq), 3, "muting must not remove tracks");

    controller.set_track_activity(&piano, true);
    assert!(!engine.output_params(seq, track).unwrap().muted);
}

// ═══════════════════════════════════════════════════════════════════════════
// REPEATS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_toggle_play_repeats_updates_duration() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    score.write().set_repeat_spans(vec![RepeatSpan {
        start_tick: 0,
        end_tick: 1920,
        times: 2,
    }]);
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();

    // One 4/4 measure at 120 BPM played twice
    assert_eq!(engine.duration(seq), 4000);
    assert!(controller.action_checked(ActionIntent::TogglePlayRepeats));

    controller.handle_action(ActionIntent::TogglePlayRepeats);
    assert_eq!(engine.duration(seq), 2000);
    assert!(!controller.action_checked(ActionIntent::TogglePlayRepeats));
}

// ═══════════════════════════════════════════════════════════════════════════
// AUDITION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_play_element_seeks_and_auditions() {
    let (mut controller, engine) = controller_with_engine();
    let score = two_part_score();
    bind(&mut controller, &score);
    let seq = controller.current_sequence().unwrap();
    let auditions = controller.audition_events();

    let piano = score.read().track_id_at(0).unwrap();
    controller.play_element(&piano, &quarter_chord(480, 0, 72));

    assert_eq!(engine.position(seq), 500, "play_element seeks to the item");
    let (track_id, events) = auditions.try_recv().expect("audition events emitted");
    assert_eq!(track_id, piano);
    assert_eq!(events.len(), 1);
}
