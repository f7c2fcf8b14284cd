use tracing::warn;

/// The estimation deck selected when a room is created.
///
/// The room's mode travels on the wire as a free string; this maps the known
/// mode names onto their card vocabularies. Unknown modes fall back to the
/// default Scrum deck so a newer client never strands an older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deck {
    Scrum,
    Fibonacci,
    Sequential,
    Hours,
}

const SCRUM_TOKENS: &[&str] = &[
    "0", "½", "1", "2", "3", "5", "8", "10", "20", "40", "?", "☕",
];
const FIBONACCI_TOKENS: &[&str] = &[
    "0", "½", "1", "2", "3", "5", "8", "13", "21", "34", "55", "?", "☕",
];
const SEQUENTIAL_TOKENS: &[&str] = &[
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "?", "☕",
];
const HOURS_TOKENS: &[&str] = &["1", "2", "4", "8", "16", "24", "40", "?", "☕"];

impl Deck {
    pub fn from_mode(mode: &str) -> Deck {
        match mode.trim().to_ascii_lowercase().as_str() {
            "scrum" => Deck::Scrum,
            "fibonacci" => Deck::Fibonacci,
            "sequential" => Deck::Sequential,
            "hours" => Deck::Hours,
            other => {
                warn!(mode = %other, "unknown estimation mode, using Scrum deck");
                Deck::Scrum
            }
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Deck::Scrum => "Scrum",
            Deck::Fibonacci => "Fibonacci",
            Deck::Sequential => "Sequential",
            Deck::Hours => "Hours",
        }
    }

    /// Display tokens in presentation order.
    pub fn tokens(&self) -> &'static [&'static str] {
        match self {
            Deck::Scrum => SCRUM_TOKENS,
            Deck::Fibonacci => FIBONACCI_TOKENS,
            Deck::Sequential => SEQUENTIAL_TOKENS,
            Deck::Hours => HOURS_TOKENS,
        }
    }
}

impl Default for Deck {
    fn default() -> Self {
        Deck::Scrum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::value::Vote;
    use rstest::rstest;

    #[rstest]
    #[case("Scrum", Deck::Scrum)]
    #[case("fibonacci", Deck::Fibonacci)]
    #[case("SEQUENTIAL", Deck::Sequential)]
    #[case("Hours", Deck::Hours)]
    #[case("T-shirt", Deck::Scrum)]
    #[case("", Deck::Scrum)]
    fn mode_names_map_to_decks(#[case] mode: &str, #[case] expected: Deck) {
        assert_eq!(Deck::from_mode(mode), expected);
    }

    #[test]
    fn mode_round_trips_for_known_decks() {
        for deck in [Deck::Scrum, Deck::Fibonacci, Deck::Sequential, Deck::Hours] {
            assert_eq!(Deck::from_mode(deck.mode()), deck);
        }
    }

    #[test]
    fn every_deck_token_normalizes() {
        // Every card in every deck must land on a well-defined vote value.
        for deck in [Deck::Scrum, Deck::Fibonacci, Deck::Sequential, Deck::Hours] {
            for token in deck.tokens() {
                match Vote::parse(token) {
                    Vote::Estimate(_) => assert_ne!(*token, "?"),
                    Vote::Unknown => assert_eq!(*token, "?"),
                    Vote::Break => assert_eq!(*token, "☕"),
                }
            }
        }
    }
}
