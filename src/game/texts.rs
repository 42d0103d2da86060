//! Race passage library

use rand::seq::SliceRandom;

/// Candidate passages. Kept short enough that a race stays under a
/// couple of minutes at ordinary typing speeds.
const PASSAGES: &[&str] = &[
    "The quick brown fox jumps over the lazy dog.",
    "Typing fast is less about speed and more about rhythm; accuracy first, \
     and the pace follows on its own.",
    "A small leak will sink a great ship, and a single mistyped character \
     will sink a great streak.",
    "The keyboard waits patiently for your next word, indifferent to whether \
     it arrives in a hurry or not at all.",
    "Practice does not make perfect; practice makes permanent, so slow down \
     and type it right the first time.",
    "Somewhere between the first key and the last period, every race turns \
     into a quiet argument with your own fingers.",
    "It is not the strongest typist who wins, but the one who never has to \
     reach for the backspace key.",
    "Rain tapped against the window in a steady rhythm, as if the weather \
     itself were practicing its words per minute.",
];

/// Pick a passage uniformly at random.
pub fn pick_random_passage() -> String {
    PASSAGES
        .choose(&mut rand::thread_rng())
        .expect("passage library is non-empty")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picked_passage_comes_from_the_library() {
        for _ in 0..20 {
            let passage = pick_random_passage();
            assert!(PASSAGES.contains(&passage.as_str()));
        }
    }
}
