//! Human-readable status of the memory document.

use std::fmt::Write;

use vritual_core::MemoryDocument;
use vritual_engine::mood;

const TOP_LOOPS: usize = 10;
const RECENT_REACTIONS: usize = 5;

pub fn render(doc: &MemoryDocument) -> String {
    let mut out = String::new();
    let state = &doc.system_state;

    let _ = writeln!(out, "Rituals ({}):", doc.rituals.len());
    for r in &doc.rituals {
        let _ = writeln!(
            out,
            "  {} [{}] {} → {} (uses: {})",
            r.name, r.importance, r.trigger, r.effect, r.usage_count
        );
    }

    let mut loops: Vec<_> = doc.loops.iter().collect();
    loops.sort_by(|a, b| b.1.count.cmp(&a.1.count).then_with(|| a.0.cmp(b.0)));
    let _ = writeln!(out, "\nTop loops:");
    for (phrase, r) in loops.into_iter().take(TOP_LOOPS) {
        let mark = if r.ritualized { " *" } else { "" };
        let _ = writeln!(
            out,
            "  {:<24} x{:<4} energy {:.2}{}",
            phrase, r.count, r.loop_energy, mark
        );
    }

    let _ = writeln!(out, "\nRecent reactions:");
    for r in doc.recent_reactions(RECENT_REACTIONS) {
        let emoji = r.emoji.as_deref().map(|e| format!(" {e}")).unwrap_or_default();
        let _ = writeln!(
            out,
            "  {} {}{} ← {}",
            r.timestamp.format("%H:%M:%S"),
            r.emotion,
            emoji,
            r.source
        );
    }

    let _ = writeln!(out);
    match &state.attention {
        Some(a) => {
            let _ = writeln!(
                out,
                "Attention:   {} (last phrase: {})",
                a.attention_state,
                a.last_phrase.as_deref().unwrap_or("none")
            );
        }
        None => {
            let _ = writeln!(out, "Attention:   not evaluated");
        }
    }
    match &state.environment {
        Some(e) => {
            let _ = writeln!(
                out,
                "Environment: light {}, sound {}, temperature {}",
                e.light_level, e.sound_level, e.temperature
            );
        }
        None => {
            let _ = writeln!(out, "Environment: unknown");
        }
    }

    let moods: Vec<String> = state
        .mood_score
        .iter()
        .map(|(emotion, v)| format!("{emotion}={v:.2}"))
        .collect();
    let _ = writeln!(
        out,
        "Mood:        {} [{}]",
        mood::top_mood(&state.mood_score),
        moods.join(", ")
    );

    match &state.current_mission {
        Some(m) => {
            let _ = write!(out, "Mission:     {} ({})", m.title, m.goal);
        }
        None => {
            let _ = write!(out, "Mission:     none");
        }
    }
    out
}
