//! Test data generator.
//!
//! Produces files of `<number>. <words>` lines with numbers below 1000 and one to four words
//! from a fixed vocabulary, so that text parts repeat often and numbers decide the order.

use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::sort::SortError;

pub const WORDS: [&str; 78] = [
    "Apple", "Ant", "Art", "Bug", "Bunny", "Bee", "Cat", "Cold", "Count", "Dog", "Delta", "Deer", "Element",
    "Elephant", "Enemy", "For", "Focus", "File", "Gem", "Good", "Goal", "Horse", "House", "Hour", "Ice", "Idle",
    "Insect", "Join", "Jungle", "Joy", "King", "Kind", "Kangaroo", "Lemon", "Lost", "Less", "Moon", "More", "Mess",
    "Nice", "Need", "Noon", "Oak", "Odd", "Old", "Perfect", "Punish", "Pony", "Queen", "Queue", "Quarter", "Rabbit",
    "Rack", "Root", "Sun", "Soon", "Shine", "To", "Ten", "Teeth", "Union", "User", "Uber", "Violet", "Vector",
    "Vehicle", "Web", "Windows", "Walk", "X-ray", "Xenon", "Xerox", "Yacht", "Yummy", "Yard", "Zebra", "Zen", "Zoo",
];

const MAX_NUMBER: u32 = 1000;
const MAX_WORDS: usize = 4;

/// Writes random lines until at least `target_size` bytes are written.
/// Returns the number of lines written.
pub fn generate<W: Write, R: Rng>(writer: &mut W, target_size: u64, rng: &mut R) -> io::Result<u64> {
    let mut written: u64 = 0;
    let mut lines: u64 = 0;
    let mut line = String::new();

    while written < target_size {
        line.clear();
        line.push_str(&rng.gen_range(0..MAX_NUMBER).to_string());
        line.push('.');
        for _ in 0..rng.gen_range(1..=MAX_WORDS) {
            line.push(' ');
            line.push_str(WORDS.choose(rng).copied().unwrap_or("Apple"));
        }
        line.push('\n');

        writer.write_all(line.as_bytes())?;
        written += line.len() as u64;
        lines += 1;
    }

    Ok(lines)
}

/// Creates (or truncates) `path` and fills it with about `target_size` bytes of random lines.
pub fn generate_file(path: &Path, target_size: u64, buf_size: usize) -> Result<u64, SortError> {
    let mut writer = io::BufWriter::with_capacity(buf_size, fs::File::create(path)?);
    let lines = generate(&mut writer, target_size, &mut rand::thread_rng())?;
    writer.flush()?;

    log::info!("{} lines generated into {}", lines, path.display());

    Ok(lines)
}
