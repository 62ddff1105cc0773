use rand::Rng;

/// Curated pool of short, drawable words. Selection is uniform with no
/// exclusion of recent picks; repeats across rounds are fine.
pub const WORD_POOL: &[&str] = &[
    "apple", "anchor", "balloon", "banana", "bridge", "butterfly", "cactus",
    "camera", "candle", "castle", "cloud", "crown", "dolphin", "dragon",
    "drum", "elephant", "feather", "fire", "flower", "fork", "ghost",
    "giraffe", "guitar", "hammer", "house", "igloo", "island", "kite",
    "ladder", "lighthouse", "mountain", "mushroom", "octopus", "penguin",
    "pizza", "pyramid", "rainbow", "robot", "rocket", "sandwich", "snail",
    "snowman", "spider", "sun", "train", "umbrella", "volcano", "whale",
];

pub fn pick(rng: &mut impl Rng) -> &'static str {
    WORD_POOL[rng.gen_range(0..WORD_POOL.len())]
}
