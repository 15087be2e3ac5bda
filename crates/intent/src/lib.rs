//! Turns noisy transcribed text into a structured playback intent: an
//! optional year range plus an artist, a random-mix request, or no
//! match at all. Matching is deliberately two-tier: exact containment
//! first, fuzzy fallback second, so ASR noise cannot promote a wild
//! guess over a literal hit.

use common::normalize;
use strsim::normalized_levenshtein;
use tracing::debug;

/// Minimum similarity for the fuzzy fallback to accept a candidate.
const FUZZY_CUTOFF: f64 = 0.6;

/// Imperative openers stripped before artist matching.
const COMMAND_WORDS: [&str; 3] = ["play", "start", "shuffle"];

/// Whole-utterance phrases that mean "anything, surprise me".
const RANDOM_PHRASES: [&str; 7] = [
    "play some music",
    "play music",
    "play some",
    "play something",
    "play something random",
    "surprise me",
    "random",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    Random,
    Artist {
        name: String,
        years: Option<YearRange>,
    },
    NoMatch,
}

pub fn parse(text: &str, artists: &[String]) -> Intent {
    let t = normalize(text);
    if t.is_empty() {
        return Intent::NoMatch;
    }
    if RANDOM_PHRASES.contains(&t.as_str()) {
        return Intent::Random;
    }

    let years = detect_decade(&t);
    match pick_artist(&t, artists) {
        Some(name) => Intent::Artist { name, years },
        None => Intent::NoMatch,
    }
}

/// Year/decade extraction in fixed priority order: two-digit decade
/// token ("80s"), four-digit decade token ("1980s"), bare four-digit
/// year ("1987"). First match wins.
pub fn detect_decade(text: &str) -> Option<YearRange> {
    let t = normalize(text);
    let tokens: Vec<&str> = t.split_whitespace().collect();

    for (i, token) in tokens.iter().enumerate() {
        if let Some(two) = two_digit_decade(token, tokens.get(i + 1).copied()) {
            let start = if two > 29 { 1900 + two } else { 2000 + two };
            return Some(decade_range(start));
        }
    }
    for (i, token) in tokens.iter().enumerate() {
        if let Some(year) = four_digit_decade(token, tokens.get(i + 1).copied()) {
            return Some(decade_range((year / 10) * 10));
        }
    }
    for token in &tokens {
        if let Some(year) = plausible_year(token) {
            return Some(YearRange {
                start: year,
                end: year,
                label: year.to_string(),
            });
        }
    }
    None
}

/// Best artist for an utterance, or `None` when nothing clears the
/// fuzzy cutoff. The leading command word and any year/decade tokens
/// are stripped first so they never pollute the comparison.
pub fn pick_artist(text: &str, artists: &[String]) -> Option<String> {
    let t = normalize(text);
    let mut tokens: Vec<&str> = t.split_whitespace().collect();
    strip_command_prefix(&mut tokens);
    let remaining = strip_year_tokens(&tokens).join(" ");
    if remaining.is_empty() {
        return None;
    }

    for artist in artists {
        let a_norm = normalize(artist);
        if !a_norm.is_empty() && remaining.contains(&a_norm) {
            return Some(artist.clone());
        }
    }

    let mut best: Option<(f64, &String)> = None;
    for artist in artists {
        let a_norm = normalize(artist);
        if a_norm.is_empty() {
            continue;
        }
        let score = normalized_levenshtein(&remaining, &a_norm);
        if best.map(|(s, _)| score > s).unwrap_or(true) {
            best = Some((score, artist));
        }
    }

    match best {
        Some((score, artist)) if score >= FUZZY_CUTOFF => {
            debug!("Fuzzy artist match: {:?} ({:.2})", artist, score);
            Some(artist.clone())
        }
        _ => None,
    }
}

fn decade_range(start: i32) -> YearRange {
    YearRange {
        start,
        end: start + 9,
        label: format!("{}s", start),
    }
}

/// "80s" as one token, or "80" followed by a lone "s" (the shape an
/// apostrophe leaves behind after normalization).
fn two_digit_decade(token: &str, next: Option<&str>) -> Option<i32> {
    if token.len() == 3 && token.ends_with('s') {
        return parse_digits(&token[..2]);
    }
    if token.len() == 2 && next == Some("s") {
        return parse_digits(token);
    }
    None
}

fn four_digit_decade(token: &str, next: Option<&str>) -> Option<i32> {
    if token.len() == 5 && token.ends_with('s') {
        return plausible_year(&token[..4]);
    }
    if token.len() == 4 && next == Some("s") {
        return plausible_year(token);
    }
    None
}

fn plausible_year(token: &str) -> Option<i32> {
    if token.len() != 4 {
        return None;
    }
    let year = parse_digits(token)?;
    if (1900..=2099).contains(&year) {
        Some(year)
    } else {
        None
    }
}

fn parse_digits(text: &str) -> Option<i32> {
    if text.chars().all(|c| c.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

fn strip_command_prefix(tokens: &mut Vec<&str>) {
    if tokens.len() >= 2 && tokens[0] == "put" && tokens[1] == "on" {
        tokens.drain(..2);
        return;
    }
    if let Some(first) = tokens.first() {
        if COMMAND_WORDS.contains(first) {
            tokens.remove(0);
        }
    }
}

fn strip_year_tokens(tokens: &[&str]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        let next = tokens.get(i + 1).copied();
        let split_decade = (token.len() == 2 || token.len() == 4)
            && parse_digits(token).is_some()
            && next == Some("s");
        if split_decade {
            i += 2;
            continue;
        }
        if two_digit_decade(token, None).is_some()
            || four_digit_decade(token, None).is_some()
            || plausible_year(token).is_some()
        {
            i += 1;
            continue;
        }
        out.push(token.to_string());
        i += 1;
    }
    out
}
