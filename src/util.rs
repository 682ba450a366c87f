use rand::Rng;
use std::time::Duration;

/// In-place Fisher–Yates: walk down from the last index, swapping each
/// element with a uniformly chosen one at or below it.
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// `mm:ss`, rounding down to the whole second
pub fn format_clock(remaining: Duration) -> String {
    let seconds = remaining.as_secs();
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
