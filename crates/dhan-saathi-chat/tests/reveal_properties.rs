//! Property tests for the reveal scheduler.
//!
//! Invariants:
//! - Finishing shows exactly the concatenation of every pushed fragment,
//!   however the text was split and however many ticks ran in between.
//! - Each tick shows a prefix of the received text that never shrinks.

use dhan_saathi_chat::{RevealConfig, RevealScheduler};
use dhan_saathi_core::MessageId;
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

fn arb_config() -> impl Strategy<Value = RevealConfig> {
    (1usize..6, 0usize..40, 1usize..8).prop_map(|(chars_per_tick, catch_up_threshold, catch_up_divisor)| {
        RevealConfig {
            tick_interval_ms: 10,
            chars_per_tick,
            catch_up_threshold,
            catch_up_divisor,
        }
    })
}

/// Text, cut points into it, and the number of ticks to run after each piece.
fn arb_stream() -> impl Strategy<Value = (String, Vec<prop::sample::Index>, Vec<usize>)> {
    (
        "\\PC{0,120}",
        prop::collection::vec(any::<prop::sample::Index>(), 0..10),
        prop::collection::vec(0usize..5, 11),
    )
}

/// Split `text` on char boundaries picked by `cuts`.
fn split(text: &str, cuts: &[prop::sample::Index]) -> Vec<String> {
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let mut offsets: Vec<usize> = cuts.iter().map(|cut| boundaries[cut.index(boundaries.len())]).collect();
    offsets.sort_unstable();
    offsets.dedup();

    let mut pieces = Vec::new();
    let mut start = 0;
    for end in offsets {
        pieces.push(text[start..end].to_string());
        start = end;
    }
    pieces.push(text[start..].to_string());
    pieces
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn finish_shows_concatenation(config in arb_config(), (text, cuts, ticks) in arb_stream()) {
        let pieces = split(&text, &cuts);
        prop_assert_eq!(pieces.concat(), text.clone());

        let mut scheduler = RevealScheduler::new(config);
        let id = MessageId::generate();
        scheduler.begin(id).unwrap();

        for (piece, count) in pieces.iter().zip(ticks.iter().cycle()) {
            prop_assert!(scheduler.push(id, piece));
            for _ in 0..*count {
                scheduler.tick();
            }
        }

        let update = scheduler.finish(id).unwrap();
        prop_assert_eq!(update.content, text);
        prop_assert!(!update.streaming);
        prop_assert!(scheduler.active_id().is_none());
    }

    #[test]
    fn ticks_reveal_growing_prefix_of_pending(config in arb_config(), (text, cuts, ticks) in arb_stream()) {
        let pieces = split(&text, &cuts);
        let mut scheduler = RevealScheduler::new(config);
        let id = MessageId::generate();
        scheduler.begin(id).unwrap();

        let mut shown = String::new();
        for (piece, count) in pieces.iter().zip(ticks.iter().cycle()) {
            scheduler.push(id, piece);
            prop_assert_eq!(scheduler.buffer().unwrap().revealed(), shown.as_str());

            for _ in 0..*count {
                let Some(update) = scheduler.tick() else {
                    prop_assert!(scheduler.buffer().unwrap().is_drained());
                    continue;
                };
                let pending = scheduler.buffer().unwrap().pending();
                prop_assert!(update.streaming);
                prop_assert!(update.content.len() > shown.len());
                prop_assert!(update.content.starts_with(shown.as_str()));
                prop_assert!(pending.starts_with(update.content.as_str()));
                shown = update.content;
            }
        }

        // Draining reaches everything received.
        while let Some(update) = scheduler.tick() {
            prop_assert!(update.content.starts_with(shown.as_str()));
            shown = update.content;
        }
        prop_assert_eq!(shown, text);
    }
}
