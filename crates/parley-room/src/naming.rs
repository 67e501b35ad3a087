//! Random nicknames for members who join without choosing one.

use rand::seq::IndexedRandom;

const ADJECTIVES: &[&str] = &[
    "Brave", "Calm", "Clever", "Curious", "Eager", "Gentle", "Honest", "Jolly",
    "Lucky", "Nimble", "Quiet", "Sharp", "Steady", "Swift", "Witty", "Bold",
];

const NOUNS: &[&str] = &[
    "Badger", "Falcon", "Fox", "Heron", "Lynx", "Otter", "Owl", "Panda",
    "Raven", "Seal", "Sparrow", "Tiger", "Turtle", "Whale", "Wolf", "Yak",
];

/// Draws `"<Adjective> <Noun>"`, appending ` 2`, ` 3`, … until `taken`
/// returns `false`.
pub fn generate_nickname(taken: impl Fn(&str) -> bool) -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Quiet");
    let noun = NOUNS.choose(&mut rng).copied().unwrap_or("Owl");
    let base = format!("{adjective} {noun}");

    if !taken(&base) {
        return base;
    }
    let mut suffix: u32 = 2;
    loop {
        let candidate = format!("{base} {suffix}");
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}
