use crate::{Context, Error};
use poise::command;
use rand::distributions::WeightedIndex;
use rand::prelude::*;

const TOP_OR_BOTTOM: &[(&str, u32)] = &[("Top 🔼", 45), ("Bottom 🔽", 45), ("Both ♾️", 10)];
const COINFLIP: &[(&str, u32)] = &[("Heads 🪙", 50), ("Tails 🪙", 50)];

fn pick<'a, R: Rng + ?Sized>(entries: &[(&'a str, u32)], rng: &mut R) -> &'a str {
    match WeightedIndex::new(entries.iter().map(|(_, weight)| *weight)) {
        Ok(dist) => entries[dist.sample(rng)].0,
        Err(_) => entries.first().map_or("", |(text, _)| *text),
    }
}

/// 🎲 Top, bottom or both?
#[command(slash_command, rename = "top_or_bottom")]
pub async fn top_or_bottom(ctx: Context<'_>) -> Result<(), Error> {
    let result = pick(TOP_OR_BOTTOM, &mut thread_rng());
    ctx.say(format!("🎲 **Result:** {}", result)).await?;
    Ok(())
}

/// 🪙 Flip a coin
#[command(slash_command)]
pub async fn coinflip(ctx: Context<'_>) -> Result<(), Error> {
    let result = pick(COINFLIP, &mut thread_rng());
    ctx.say(format!("🪙 **Coinflip:** {}", result)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    #[test]
    fn picks_only_configured_answers() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let answer = pick(TOP_OR_BOTTOM, &mut rng);
            assert!(TOP_OR_BOTTOM.iter().any(|(text, _)| *text == answer));
        }
    }

    #[test]
    fn zero_weight_is_never_picked() {
        let mut rng = StdRng::seed_from_u64(1);
        let entries = [("never", 0), ("always", 1)];
        for _ in 0..100 {
            assert_eq!(pick(&entries, &mut rng), "always");
        }
    }

    #[test]
    fn weights_are_roughly_respected() {
        let mut rng = StdRng::seed_from_u64(42);
        let both = (0..10_000)
            .filter(|_| pick(TOP_OR_BOTTOM, &mut rng) == "Both ♾️")
            .count();
        assert!((700..1300).contains(&both), "both picked {} times", both);
    }
}
